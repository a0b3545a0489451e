//! Error taxonomy for the lesson pipeline.
//!
//! Soft OCR failures are not represented here: the confidence gate
//! reports them as [`OcrOutcome::Unavailable`](crate::ocr::OcrOutcome)
//! and extraction continues with degraded text. Every variant in this
//! module fails the job it occurred in.

use thiserror::Error;

/// A job-level failure. The `Display` string is what pollers see, so
/// messages stay short and never carry internals.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input bytes could not be parsed as the declared media kind.
    #[error("unsupported or unreadable document: {0}")]
    DocumentFormat(String),

    /// Asset fetch failed on both the public and authenticated routes.
    #[error("document download failed: {0}")]
    Download(String),

    /// OCR text rejected under the strict confidence policy.
    #[error("ocr confidence {confidence:.2} below threshold {threshold:.2}")]
    OcrLowConfidence { confidence: f64, threshold: f64 },

    /// Generation output was not a JSON object even after recovery.
    #[error("model returned malformed lesson JSON: {0}")]
    ModelOutputMalformed(String),

    /// Generation service transport or API failure.
    #[error("lesson generation failed: {0}")]
    Generation(String),

    /// Any other failure during job execution.
    #[error("{0}")]
    Job(String),
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Job(err.to_string())
    }
}
