//! Cahier Core - document-to-lesson pipeline
//!
//! This crate turns an uploaded document into a structured French
//! lesson, asynchronously:
//! - Job queue with polled status tracking (tokio)
//! - Document download from a Supabase-style object store (reqwest)
//! - PDF text extraction and page rasterization (lopdf, mupdf)
//! - Cloud OCR with a confidence gate (ABBYY protocol)
//! - Sentence-aware chunking for retrieval indexing
//! - Lesson generation and defensive schema normalization (async-openai)

pub mod chunker;
pub mod config;
pub mod error;
pub mod generate;
pub mod jobs;
pub mod lesson;
pub mod ocr;
pub mod pdf;
pub mod storage;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub use chunker::{ChunkSink, LessonChunk, NoOpSink};
pub use config::Config;
pub use error::PipelineError;
pub use generate::{LessonGenerator, OpenAiGenerator};
pub use jobs::{JobContext, JobRecord, JobStatus, LessonService};
pub use lesson::Lesson;
pub use ocr::{AbbyyClient, OcrEngine};
pub use storage::{AssetFetcher, StorageClient};

/// Wire the production collaborators and start the lesson service.
///
/// Credentials missing from `config` switch the respective client into
/// its soft mode (OCR reports unavailable, generation serves the demo
/// lesson) instead of failing construction.
pub fn start_lesson_service(config: Config, cancel: CancellationToken) -> LessonService {
    let context = JobContext {
        fetcher: Arc::new(StorageClient::new(&config.storage)),
        ocr: Arc::new(AbbyyClient::new(&config.ocr)),
        generator: Arc::new(OpenAiGenerator::new(&config.generation)),
        sink: Arc::new(NoOpSink),
        config,
    };
    LessonService::spawn(context, cancel)
}
