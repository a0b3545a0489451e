//! Lesson generation.
//!
//! A chat-completion client asks the model for one strict-JSON lesson;
//! `recovery` repairs the common ways models break that contract
//! (code fences, prose around the object). Without an API key the
//! client serves a built-in demo lesson so the pipeline stays usable
//! offline.

mod openai;
mod recovery;

pub use openai::OpenAiGenerator;
pub use recovery::recover_json;

use async_trait::async_trait;

use crate::error::PipelineError;

/// Everything the model gets for one lesson.
#[derive(Debug, Clone)]
pub struct LessonRequest {
    pub topic_hint: String,
    /// Recovered document text, already trimmed to the excerpt limit.
    pub document_excerpt: String,
    pub image_descriptions: Vec<String>,
    pub age: u32,
}

impl Default for LessonRequest {
    fn default() -> Self {
        Self {
            topic_hint: String::new(),
            document_excerpt: String::new(),
            image_descriptions: Vec::new(),
            age: 11,
        }
    }
}

/// Produces the model's raw response text for one lesson request.
#[async_trait]
pub trait LessonGenerator: Send + Sync {
    async fn generate(&self, request: &LessonRequest) -> Result<String, PipelineError>;
}
