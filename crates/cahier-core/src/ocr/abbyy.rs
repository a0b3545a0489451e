//! ABBYY Cloud OCR client
//!
//! Submit-poll-fetch against the v2 HTTP API. Transport failures at any
//! step degrade to [`OcrOutcome::Unavailable`] so a flaky or
//! unconfigured OCR account never takes a lesson job down with it.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{apply_gate, mean_confidence, OcrEngine, OcrOutcome, PollSchedule, UnavailableReason};
use crate::config::{OcrConfig, RejectionPolicy};
use crate::error::PipelineError;

const PROCESS_DOCUMENT_PATH: &str = "/v2/processDocument";
const PROCESS_IMAGE_PATH: &str = "/v2/processImage";
const TASK_STATUS_PATH: &str = "/v2/getTaskStatus";
const EXPORT_FORMATS: &str = "txt,xml";

const STATUS_COMPLETED: &str = "Completed";
const STATUS_FAILED: &str = "ProcessingFailed";

/// Connect plus read, per request. Polling rounds are short; the
/// overall wait is bounded by the schedule, not by this.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// ABBYY Cloud OCR service client.
pub struct AbbyyClient {
    client: reqwest::Client,
    endpoint: String,
    credentials: Option<(String, String)>,
    confidence_threshold: f64,
    rejection_policy: RejectionPolicy,
    poll_budget: Duration,
}

impl AbbyyClient {
    pub fn new(config: &OcrConfig) -> Self {
        let credentials = match (&config.application_id, &config.password) {
            (Some(id), Some(password)) => Some((id.clone(), password.clone())),
            _ => None,
        };

        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            credentials,
            confidence_threshold: config.confidence_threshold,
            rejection_policy: config.rejection_policy,
            poll_budget: config.poll_budget,
        }
    }

    async fn submit(
        &self,
        bytes: &[u8],
        multi_page: bool,
        language: &str,
        app_id: &str,
        password: &str,
    ) -> Result<Option<String>, reqwest::Error> {
        let path = if multi_page {
            PROCESS_DOCUMENT_PATH
        } else {
            PROCESS_IMAGE_PATH
        };

        let response = self
            .client
            .post(format!("{}{}", self.endpoint, path))
            .query(&[("exportFormat", EXPORT_FORMATS), ("language", language)])
            .basic_auth(app_id, Some(password))
            .timeout(REQUEST_TIMEOUT)
            .body(bytes.to_vec())
            .send()
            .await?
            .error_for_status()?;

        let submitted: TaskResponse = response.json().await?;
        Ok(submitted.task_id.filter(|id| !id.is_empty()))
    }

    async fn poll_until_terminal(
        &self,
        task_id: &str,
        app_id: &str,
        password: &str,
    ) -> Result<PollResult, reqwest::Error> {
        let mut schedule = PollSchedule::new(self.poll_budget);

        loop {
            let status: TaskResponse = self
                .client
                .get(format!("{}{}", self.endpoint, TASK_STATUS_PATH))
                .query(&[("taskId", task_id)])
                .basic_auth(app_id, Some(password))
                .timeout(REQUEST_TIMEOUT)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            match status.status.as_deref() {
                Some(STATUS_COMPLETED) => return Ok(PollResult::Completed(status.result_urls)),
                Some(STATUS_FAILED) => return Ok(PollResult::Failed),
                other => debug!(task_id = %task_id, status = ?other, "OCR task still running"),
            }

            match schedule.next_delay() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return Ok(PollResult::TimedOut),
            }
        }
    }

    /// Result artifacts are served from pre-signed URLs; no auth header.
    async fn fetch_artifact(&self, url: &str) -> Result<String, reqwest::Error> {
        self.client
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

#[async_trait]
impl OcrEngine for AbbyyClient {
    async fn recognize(
        &self,
        bytes: &[u8],
        multi_page: bool,
        language: &str,
    ) -> Result<OcrOutcome, PipelineError> {
        let Some((app_id, password)) = &self.credentials else {
            debug!("OCR credentials not configured, skipping recognition");
            return Ok(OcrOutcome::Unavailable(UnavailableReason::NotConfigured));
        };

        let task_id = match self.submit(bytes, multi_page, language, app_id, password).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                warn!("OCR submission returned no task id");
                return Ok(OcrOutcome::Unavailable(UnavailableReason::SubmitFailed));
            }
            Err(err) => {
                warn!(error = %err, "OCR submission failed");
                return Ok(OcrOutcome::Unavailable(UnavailableReason::SubmitFailed));
            }
        };
        debug!(task_id = %task_id, multi_page, "OCR task submitted");

        let result_urls = match self.poll_until_terminal(&task_id, app_id, password).await {
            Ok(PollResult::Completed(urls)) => urls,
            Ok(PollResult::Failed) => {
                warn!(task_id = %task_id, "OCR task failed on the service side");
                return Ok(OcrOutcome::Unavailable(UnavailableReason::ProcessingFailed));
            }
            Ok(PollResult::TimedOut) => {
                warn!(
                    task_id = %task_id,
                    budget_secs = self.poll_budget.as_secs(),
                    "OCR task timed out"
                );
                return Ok(OcrOutcome::Unavailable(UnavailableReason::TimedOut));
            }
            Err(err) => {
                warn!(task_id = %task_id, error = %err, "OCR status polling failed");
                return Ok(OcrOutcome::Unavailable(UnavailableReason::TransportError));
            }
        };

        let text = match pick_result_url(&result_urls, ".txt") {
            Some(url) => match self.fetch_artifact(url).await {
                Ok(text) => text,
                Err(err) => {
                    warn!(task_id = %task_id, error = %err, "failed to fetch OCR text artifact");
                    return Ok(OcrOutcome::Unavailable(UnavailableReason::TransportError));
                }
            },
            None => String::new(),
        };

        let confidence = match pick_result_url(&result_urls, ".xml") {
            Some(url) => match self.fetch_artifact(url).await {
                Ok(report) => mean_confidence(&report),
                Err(err) => {
                    warn!(task_id = %task_id, error = %err, "failed to fetch OCR confidence report");
                    return Ok(OcrOutcome::Unavailable(UnavailableReason::TransportError));
                }
            },
            // No structured report means no evidence against the text.
            None => 1.0,
        };

        debug!(task_id = %task_id, confidence, chars = text.len(), "OCR task completed");
        apply_gate(
            text,
            confidence,
            self.confidence_threshold,
            self.rejection_policy,
        )
    }
}

fn pick_result_url<'a>(urls: &'a [String], extension: &str) -> Option<&'a str> {
    urls.iter()
        .find(|url| url.to_lowercase().ends_with(extension))
        .map(|url| url.as_str())
}

enum PollResult {
    Completed(Vec<String>),
    Failed,
    TimedOut,
}

// ============================================================================
// API Types
// ============================================================================

/// Shared shape of the submit and status responses.
#[derive(Debug, Deserialize)]
struct TaskResponse {
    #[serde(rename = "taskId")]
    task_id: Option<String>,
    status: Option<String>,
    #[serde(rename = "resultUrls", default)]
    result_urls: Vec<String>,
}
