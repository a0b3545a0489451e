//! Lesson job pipeline.
//!
//! Architecture:
//!
//! ```text
//! create(owner, document_ref)          worker pool (config.workers)
//!         │                                       │
//!         ▼                                       ▼
//!   insert queued ───────── mpsc ────────► mark processing
//!                                                 │
//!                                                 ▼
//!                                  fetch → extract → chunk/index
//!                                                 │
//!                                                 ▼
//!                                 generate → recover → normalize
//!                                                 │
//!                                                 ▼
//!                                  mark completed │ mark error
//! ```
//!
//! `create` returns a job id immediately; pollers follow progress
//! through `get_status`. Exactly one worker runs a given job, and the
//! chunk sink is the only best-effort step in it.

mod types;
mod worker;

pub use types::{JobRecord, JobStatus, JobTracker};
pub use worker::spawn_lesson_workers;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::chunker::{chunk_lesson, ChunkSink};
use crate::config::Config;
use crate::error::PipelineError;
use crate::generate::{recover_json, LessonGenerator, LessonRequest};
use crate::lesson::{normalize, Lesson};
use crate::ocr::OcrEngine;
use crate::pdf::{self, MediaKind};
use crate::storage::AssetFetcher;

/// Topic hint sent to the generator for document-driven jobs.
const FILE_TOPIC_HINT: &str = "Leçon depuis fichier";

/// Everything a lesson job needs, shared by all workers.
pub struct JobContext {
    pub fetcher: Arc<dyn AssetFetcher>,
    pub ocr: Arc<dyn OcrEngine>,
    pub generator: Arc<dyn LessonGenerator>,
    pub sink: Arc<dyn ChunkSink>,
    pub config: Config,
}

/// Accepts lesson jobs and serves their status.
pub struct LessonService {
    tracker: JobTracker,
    queue: mpsc::Sender<String>,
}

impl LessonService {
    /// Start the worker pool and return the service handle.
    pub fn spawn(context: JobContext, cancel: CancellationToken) -> Self {
        let workers = context.config.workers;
        let tracker = JobTracker::new();
        let queue = spawn_lesson_workers(workers, Arc::new(context), tracker.clone(), cancel);
        Self { tracker, queue }
    }

    /// Queue a new lesson job and return its id.
    ///
    /// A dead worker pool cannot leave the record `queued` forever: a
    /// failed enqueue marks it `error` before returning.
    pub async fn create(&self, owner_id: &str, document_ref: &str) -> String {
        let job_id = Uuid::new_v4().to_string();
        self.tracker
            .insert_queued(&job_id, owner_id, document_ref)
            .await;

        if self.queue.send(job_id.clone()).await.is_err() {
            warn!(job_id = %job_id, "job queue closed, failing job at submit");
            self.tracker
                .mark_error(&job_id, "job queue is closed".to_string())
                .await;
        }

        job_id
    }

    /// Current record for a job; `None` for unknown ids.
    pub async fn get_status(&self, job_id: &str) -> Option<JobRecord> {
        self.tracker.get(job_id).await
    }
}

/// The whole per-job pipeline, fetched bytes to normalized lesson.
///
/// Workers call this once per job; direct callers get identical
/// behavior. Chunk indexing never fails the job.
pub async fn build_lesson(
    context: &JobContext,
    job_id: &str,
    document_ref: &str,
) -> Result<Lesson, PipelineError> {
    let bytes = context.fetcher.fetch(document_ref).await?;
    let kind = MediaKind::guess(document_ref);
    let document = pdf::extract(
        &bytes,
        kind,
        context.ocr.as_ref(),
        &context.config.extract,
        &context.config.ocr.language,
    )
    .await?;

    let chunks = chunk_lesson(job_id, &document.text, &context.config.chunk);
    if !chunks.is_empty() {
        let chunk_count = chunks.len();
        match context.sink.index_chunks(chunks).await {
            Ok(()) => debug!(job_id = %job_id, chunk_count, "chunks handed to the index sink"),
            Err(err) => {
                warn!(job_id = %job_id, error = %err, "chunk indexing failed, continuing")
            }
        }
    }

    let request = LessonRequest {
        topic_hint: FILE_TOPIC_HINT.to_string(),
        document_excerpt: excerpt(&document.text, context.config.excerpt_limit),
        ..LessonRequest::default()
    };
    let raw = context.generator.generate(&request).await?;
    let value = recover_json(&raw)?;
    normalize(&value)
}

/// Trim recovered text to the generation excerpt budget without
/// splitting a character.
fn excerpt(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;

    use crate::chunker::LessonChunk;
    use crate::config::{GenerationConfig, RejectionPolicy};
    use crate::generate::OpenAiGenerator;
    use crate::ocr::{apply_gate, OcrOutcome};
    use crate::pdf::extractor::fixtures::{image_page_pdf, text_pdf};

    struct FixtureFetcher {
        bytes: Bytes,
    }

    #[async_trait]
    impl AssetFetcher for FixtureFetcher {
        async fn fetch(&self, _document_ref: &str) -> Result<Bytes, PipelineError> {
            Ok(self.bytes.clone())
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl AssetFetcher for FailingFetcher {
        async fn fetch(&self, _document_ref: &str) -> Result<Bytes, PipelineError> {
            Err(PipelineError::Download("HTTP 404 Not Found".to_string()))
        }
    }

    /// OCR stub running the real confidence gate on a scripted score.
    struct GatedOcr {
        text: &'static str,
        confidence: f64,
        calls: AtomicUsize,
    }

    impl GatedOcr {
        fn new(text: &'static str, confidence: f64) -> Arc<Self> {
            Arc::new(Self {
                text,
                confidence,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl OcrEngine for GatedOcr {
        async fn recognize(
            &self,
            _bytes: &[u8],
            _multi_page: bool,
            _language: &str,
        ) -> Result<OcrOutcome, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            apply_gate(
                self.text.to_string(),
                self.confidence,
                0.85,
                RejectionPolicy::Degrade,
            )
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        chunks: Mutex<Vec<LessonChunk>>,
    }

    #[async_trait]
    impl ChunkSink for RecordingSink {
        async fn index_chunks(&self, chunks: Vec<LessonChunk>) -> anyhow::Result<()> {
            self.chunks.lock().unwrap().extend(chunks);
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl ChunkSink for FailingSink {
        async fn index_chunks(&self, _chunks: Vec<LessonChunk>) -> anyhow::Result<()> {
            anyhow::bail!("index service offline")
        }
    }

    /// Context with a keyless generator, which serves the demo lesson.
    fn context(
        fetcher: Arc<dyn AssetFetcher>,
        ocr: Arc<dyn OcrEngine>,
        sink: Arc<dyn ChunkSink>,
    ) -> JobContext {
        JobContext {
            fetcher,
            ocr,
            generator: Arc::new(OpenAiGenerator::new(&GenerationConfig::default())),
            sink,
            config: Config::default(),
        }
    }

    async fn wait_terminal(service: &LessonService, job_id: &str) -> JobRecord {
        for _ in 0..500 {
            if let Some(record) = service.get_status(job_id).await {
                if record.status.is_terminal() {
                    return record;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} never reached a terminal status");
    }

    #[tokio::test]
    async fn text_rich_document_completes_without_ocr() {
        let page = "Bonjour, je m'appelle Marie. ".repeat(4);
        let ocr = GatedOcr::new("jamais utilise", 0.99);
        let sink = Arc::new(RecordingSink::default());

        let service = LessonService::spawn(
            context(
                Arc::new(FixtureFetcher {
                    bytes: text_pdf(&page).into(),
                }),
                ocr.clone(),
                sink.clone(),
            ),
            CancellationToken::new(),
        );

        let job_id = service.create("child-1", "uploads/manuel.pdf").await;
        let record = wait_terminal(&service, &job_id).await;

        let JobStatus::Completed { lesson } = record.status else {
            panic!("expected completion, got {:?}", record.status);
        };
        assert!(!lesson.title.is_empty());
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
        assert!(!sink.chunks.lock().unwrap().is_empty());
        assert!(record.started_at.is_some());
        assert!(record.completed_at.is_some());
    }

    #[tokio::test]
    async fn image_document_with_rejected_ocr_still_completes() {
        let ocr = GatedOcr::new("texte douteux", 0.40);
        let sink = Arc::new(RecordingSink::default());

        let service = LessonService::spawn(
            context(
                Arc::new(FixtureFetcher {
                    bytes: image_page_pdf("Voir").into(),
                }),
                ocr.clone(),
                sink.clone(),
            ),
            CancellationToken::new(),
        );

        let job_id = service.create("child-1", "uploads/scan.pdf").await;
        let record = wait_terminal(&service, &job_id).await;

        // Rejected OCR degrades to an empty document; generation still
        // runs and the job completes.
        assert!(matches!(record.status, JobStatus::Completed { .. }));
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
        assert!(sink.chunks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn download_failure_marks_the_job_error() {
        let service = LessonService::spawn(
            context(
                Arc::new(FailingFetcher),
                GatedOcr::new("", 1.0),
                Arc::new(RecordingSink::default()),
            ),
            CancellationToken::new(),
        );

        let job_id = service.create("child-1", "uploads/absent.pdf").await;
        let record = wait_terminal(&service, &job_id).await;

        let JobStatus::Error { error } = record.status else {
            panic!("expected error, got {:?}", record.status);
        };
        assert!(error.contains("download"));
    }

    #[tokio::test]
    async fn sink_failure_does_not_fail_the_job() {
        let page = "Le chat dort sur le tapis. ".repeat(5);
        let service = LessonService::spawn(
            context(
                Arc::new(FixtureFetcher {
                    bytes: text_pdf(&page).into(),
                }),
                GatedOcr::new("", 1.0),
                Arc::new(FailingSink),
            ),
            CancellationToken::new(),
        );

        let job_id = service.create("child-1", "uploads/manuel.pdf").await;
        let record = wait_terminal(&service, &job_id).await;

        assert!(matches!(record.status, JobStatus::Completed { .. }));
    }

    #[tokio::test]
    async fn closed_queue_fails_the_job_at_submit() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let service = LessonService {
            tracker: JobTracker::new(),
            queue: tx,
        };

        let job_id = service.create("child-1", "uploads/doc.pdf").await;
        let record = service.get_status(&job_id).await.unwrap();
        assert!(matches!(record.status, JobStatus::Error { .. }));
    }

    #[tokio::test]
    async fn unknown_job_id_has_no_status() {
        let service = LessonService::spawn(
            context(
                Arc::new(FailingFetcher),
                GatedOcr::new("", 1.0),
                Arc::new(RecordingSink::default()),
            ),
            CancellationToken::new(),
        );

        assert!(service.get_status("absent").await.is_none());
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        assert_eq!(excerpt("éléphants", 3), "élé");
        assert_eq!(excerpt("court", 100), "court");
        assert_eq!(excerpt("", 10), "");
    }
}
