//! Model-output JSON recovery.
//!
//! Models asked for bare JSON still wrap it in code fences or
//! surrounding prose often enough that strict parsing alone loses
//! usable lessons. Recovery order: strip fences, strict parse, then
//! re-parse the outermost `{...}` span.

use serde_json::Value;

use crate::error::PipelineError;

/// Parse model output into a JSON value, repairing fenced or
/// prose-wrapped responses. Unrecoverable input is a malformed-output
/// error; the raw text is not echoed back to callers.
pub fn recover_json(text: &str) -> Result<Value, PipelineError> {
    let cleaned = strip_code_fences(text);

    if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
        return Ok(value);
    }

    if let Some(span) = outermost_object(cleaned) {
        if let Ok(value) = serde_json::from_str::<Value>(span) {
            return Ok(value);
        }
    }

    Err(PipelineError::ModelOutputMalformed(format!(
        "no JSON object found in {} chars of output",
        text.chars().count()
    )))
}

/// Drop a surrounding Markdown fence, with or without a language tag.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // The opening line may carry a language tag; body starts after it.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
