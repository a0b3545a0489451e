//! Defensive normalization of generated lesson JSON.
//!
//! The generator is asked for an exact schema but drifts between runs:
//! key synonyms (`lesson_title`, `activities`, `slides`), numbers where
//! strings belong, missing fields. `normalize` absorbs all of that in
//! one place. It is total for any JSON object and idempotent, so it can
//! safely run on already-normalized output.

use serde_json::Value;

use crate::error::PipelineError;

use super::{ImagePrompt, Lesson, PlanStep};

const DEFAULT_TITLE: &str = "Leçon";
const DEFAULT_DURATION: &str = "30 min";
const DEFAULT_STEP_NAME: &str = "Étape";
const DEFAULT_DURATION_MINUTES: i64 = 30;

/// Coerce an arbitrary JSON object into the canonical [`Lesson`].
///
/// Non-object input is the one rejection: everything else, including
/// `{}`, produces a lesson with every field populated or defaulted.
pub fn normalize(raw: &Value) -> Result<Lesson, PipelineError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| PipelineError::ModelOutputMalformed("expected a JSON object".to_string()))?;

    let title = first_truthy(obj, &["title", "lesson_title"])
        .and_then(scalar_string)
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());

    Ok(Lesson {
        duration: normalize_duration(obj),
        objectives: normalize_objectives(obj.get("objectives")),
        plan: normalize_plan(first_truthy(obj, &["plan", "activities", "sections"])),
        image_prompts: normalize_image_prompts(first_truthy(
            obj,
            &["image_prompts", "imagePrompts", "slides"],
        )),
        first_tutor_messages: normalize_first_messages(
            first_truthy(obj, &["first_tutor_messages", "firstTutorMessages"]),
            &title,
        ),
        title,
    })
}

/// Python-style truthiness: the original service treated empty strings,
/// zeros and empty containers as missing, and later iterations rely on
/// that to fall through synonym chains.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn first_truthy<'a>(
    obj: &'a serde_json::Map<String, Value>,
    keys: &[&str],
) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .find(|value| is_truthy(value))
}

/// Strings and numbers become strings; containers and booleans do not.
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn int_like(n: &serde_json::Number) -> i64 {
    n.as_i64()
        .or_else(|| n.as_f64().map(|f| f as i64))
        .unwrap_or(0)
}

fn normalize_duration(obj: &serde_json::Map<String, Value>) -> String {
    match obj.get("duration") {
        Some(Value::Number(n)) => format!("{} min", int_like(n)),
        // Free-form strings pass through untouched, even odd ones;
        // the schema only promises a string here.
        Some(Value::String(s)) => s.clone(),
        _ => match obj.get("duration_minutes") {
            Some(value) => {
                let minutes = duration_minutes(value);
                format!("{minutes} min")
            }
            None => DEFAULT_DURATION.to_string(),
        },
    }
}

fn duration_minutes(value: &Value) -> i64 {
    if !is_truthy(value) {
        return DEFAULT_DURATION_MINUTES;
    }
    match value {
        Value::Number(n) => int_like(n),
        Value::String(s) => s.trim().parse::<i64>().unwrap_or(DEFAULT_DURATION_MINUTES),
        _ => DEFAULT_DURATION_MINUTES,
    }
}

fn normalize_objectives(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(v) if !is_truthy(v) => Vec::new(),
        Some(Value::Array(items)) => items.iter().filter_map(scalar_string).collect(),
        Some(scalar) => scalar_string(scalar).map(|s| vec![s]).unwrap_or_default(),
        None => Vec::new(),
    }
}

fn normalize_plan(value: Option<&Value>) -> Vec<PlanStep> {
    let Some(Value::Array(steps)) = value else {
        return Vec::new();
    };

    steps
        .iter()
        .filter_map(|step| step.as_object())
        .map(|step| PlanStep {
            name: first_truthy(step, &["name", "title"])
                .and_then(scalar_string)
                .unwrap_or_else(|| DEFAULT_STEP_NAME.to_string()),
            minutes: first_truthy(step, &["minutes", "duration", "duration_minutes"])
                .map(|v| match v {
                    Value::Number(n) => int_like(n).to_string(),
                    other => scalar_string(other).unwrap_or_default(),
                })
                .unwrap_or_default(),
            teacher_script: teacher_script(step),
        })
        .collect()
}

fn teacher_script(step: &serde_json::Map<String, Value>) -> String {
    if let Some(script) = first_truthy(step, &["teacher_script", "script"]).and_then(scalar_string)
    {
        return script;
    }
    // A `steps` list takes precedence over `description`, even when it
    // joins to nothing.
    match step.get("steps") {
        Some(Value::Array(steps)) => steps
            .iter()
            .filter_map(scalar_string)
            .collect::<Vec<_>>()
            .join(" • "),
        _ => step
            .get("description")
            .filter(|v| is_truthy(v))
            .and_then(scalar_string)
            .unwrap_or_default(),
    }
}

fn normalize_image_prompts(value: Option<&Value>) -> Vec<ImagePrompt> {
    let Some(Value::Array(entries)) = value else {
        return Vec::new();
    };

    let mut prompts: Vec<ImagePrompt> = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        let Some(entry) = entry.as_object() else {
            continue;
        };
        let Some(prompt) = derive_prompt(entry) else {
            continue;
        };

        let given = first_truthy(entry, &["id"]).and_then(scalar_string);
        let id = unique_id(given, i, &prompts);
        prompts.push(ImagePrompt { id, prompt });
    }
    prompts
}

fn derive_prompt(entry: &serde_json::Map<String, Value>) -> Option<String> {
    if let Some(prompt) = first_truthy(entry, &["prompt", "image_prompt"]).and_then(scalar_string) {
        return Some(prompt);
    }
    match entry.get("bullets") {
        Some(Value::Array(bullets)) => {
            let summary = bullets
                .iter()
                .take(3)
                .filter_map(scalar_string)
                .collect::<Vec<_>>()
                .join(", ");
            Some(format!("Illustration pour: {summary}"))
        }
        _ => None,
    }
}

/// Keep a caller-supplied id unless it collides with an earlier one;
/// synthesized ids probe forward from `img{index+1}` until free.
fn unique_id(given: Option<String>, index: usize, taken: &[ImagePrompt]) -> String {
    let collides = |candidate: &str| taken.iter().any(|p| p.id == candidate);

    if let Some(id) = given {
        if !collides(&id) {
            return id;
        }
    }
    let mut n = index + 1;
    loop {
        let candidate = format!("img{n}");
        if !collides(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn normalize_first_messages(value: Option<&Value>, title: &str) -> Vec<String> {
    let messages: Vec<String> = match value {
        Some(Value::Array(items)) => items.iter().filter_map(scalar_string).collect(),
        _ => Vec::new(),
    };
    if messages.is_empty() {
        vec![format!("Bonjour ! {title}")]
    } else {
        messages
    }
}
