//! Confidence-gated OCR.
//!
//! One OCR call walks `submitted -> polling -> {completed, failed,
//! timed-out}` against the remote service, then pushes the recognized
//! text through a mean-confidence gate. Soft failures are values, not
//! errors: every outcome except a strict-policy rejection comes back as
//! `Ok`, and the caller decides what an [`OcrOutcome::Unavailable`]
//! page is worth (usually an empty string).

mod abbyy;

pub use abbyy::AbbyyClient;

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use crate::config::RejectionPolicy;
use crate::error::PipelineError;

/// Result of one OCR attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum OcrOutcome {
    /// Text accepted by the confidence gate. May still be empty if the
    /// service recognized nothing on the page.
    Recognized { text: String, confidence: f64 },
    /// No usable text. Extraction continues with degraded input.
    Unavailable(UnavailableReason),
}

impl OcrOutcome {
    /// The text a page gets: recognized text, or empty on soft failure.
    pub fn into_text(self) -> String {
        match self {
            OcrOutcome::Recognized { text, .. } => text,
            OcrOutcome::Unavailable(_) => String::new(),
        }
    }
}

/// Why an OCR attempt produced nothing. Logged, never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    /// No service credentials configured.
    NotConfigured,
    /// Submission failed or the service returned no task id.
    SubmitFailed,
    /// The task never reached a terminal status within the poll budget.
    TimedOut,
    /// The service reported the task as failed.
    ProcessingFailed,
    /// Network or decode error while talking to the service.
    TransportError,
    /// Mean token confidence fell below the threshold (degrade policy).
    LowConfidence,
}

/// Remote text recognition. The trait seam exists so extraction can be
/// exercised without a live OCR account.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognize `bytes` as a document (`multi_page`) or a single
    /// image. Only a strict-policy confidence rejection is an `Err`.
    async fn recognize(
        &self,
        bytes: &[u8],
        multi_page: bool,
        language: &str,
    ) -> Result<OcrOutcome, PipelineError>;
}

/// Accept or reject recognized text by mean confidence.
///
/// Below the threshold, `Degrade` reports the text as unavailable and
/// `Strict` escalates to a job-level failure. At or above it, the text
/// passes through trimmed.
pub fn apply_gate(
    text: String,
    confidence: f64,
    threshold: f64,
    policy: RejectionPolicy,
) -> Result<OcrOutcome, PipelineError> {
    if confidence < threshold {
        tracing::warn!(confidence, threshold, "OCR confidence below threshold");
        return match policy {
            RejectionPolicy::Degrade => {
                Ok(OcrOutcome::Unavailable(UnavailableReason::LowConfidence))
            }
            RejectionPolicy::Strict => Err(PipelineError::OcrLowConfidence {
                confidence,
                threshold,
            }),
        };
    }
    Ok(OcrOutcome::Recognized {
        text: text.trim().to_string(),
        confidence,
    })
}

static CONFIDENCE_ATTR: OnceLock<Option<Regex>> = OnceLock::new();

fn confidence_attr() -> Option<&'static Regex> {
    CONFIDENCE_ATTR
        .get_or_init(|| Regex::new(r#"confidence="(\d+(?:\.\d+)?)""#).ok())
        .as_ref()
}

/// Arithmetic mean of all `confidence="N"` attributes in the result
/// report, scaled to `[0, 1]`. A report with no per-token scores means
/// the service vouches for everything: `1.0`.
pub fn mean_confidence(report: &str) -> f64 {
    let Some(re) = confidence_attr() else {
        return 1.0;
    };

    let values: Vec<f64> = re
        .captures_iter(report)
        .filter_map(|captures| captures.get(1))
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .map(|v| v / 100.0)
        .collect();

    if values.is_empty() {
        1.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Backoff for task polling: 3s, growing by 1.2x per round, capped at
/// 10s, until the accumulated sleep time crosses the budget.
#[derive(Debug)]
pub struct PollSchedule {
    delay: f64,
    waited: f64,
    budget: f64,
}

const INITIAL_DELAY_SECS: f64 = 3.0;
const BACKOFF_FACTOR: f64 = 1.2;
const MAX_DELAY_SECS: f64 = 10.0;

impl PollSchedule {
    pub fn new(budget: Duration) -> Self {
        Self {
            delay: INITIAL_DELAY_SECS,
            waited: 0.0,
            budget: budget.as_secs_f64(),
        }
    }

    /// Next sleep before re-polling, or `None` once the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.waited >= self.budget {
            return None;
        }
        let current = self.delay;
        self.waited += current;
        self.delay = (self.delay * BACKOFF_FACTOR).min(MAX_DELAY_SECS);
        Some(Duration::from_secs_f64(current))
    }
}
