//! Canonical lesson schema.
//!
//! Everything downstream of generation sees only these types. The
//! generative service is free to misname keys or drop fields; the
//! normalizer in this module repairs its output into the fixed
//! six-key shape before anyone else touches it.

mod normalize;

pub use normalize::normalize;

use serde::{Deserialize, Serialize};

/// A complete, normalized lesson. All fields are always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub title: String,
    /// Human-readable length, e.g. `"30 min"`.
    pub duration: String,
    pub objectives: Vec<String>,
    pub plan: Vec<PlanStep>,
    pub image_prompts: Vec<ImagePrompt>,
    /// Opening lines the tutor sends before the first activity.
    pub first_tutor_messages: Vec<String>,
}

/// One activity block of the lesson plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub name: String,
    /// Stringly-typed on purpose; model output mixes `"5"` and `5`.
    pub minutes: String,
    pub teacher_script: String,
}

/// Prompt for one kid-safe illustration. Ids are unique per lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePrompt {
    pub id: String,
    pub prompt: String,
}
