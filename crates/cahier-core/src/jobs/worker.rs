//! Lesson worker pool.
//!
//! A fixed number of tasks drain one shared job queue. Each worker
//! runs its job end to end sequentially; cancellation is observed
//! between jobs, never inside one.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use super::types::JobTracker;
use super::{build_lesson, JobContext};

/// Depth of the shared job queue. Submitting past this backpressures
/// `create` callers.
const QUEUE_DEPTH: usize = 64;

/// Spawns `count` workers and returns the sender for job ids.
///
/// Workers stop when cancelled or when every sender is dropped.
pub fn spawn_lesson_workers(
    count: usize,
    context: Arc<JobContext>,
    tracker: JobTracker,
    cancel: CancellationToken,
) -> mpsc::Sender<String> {
    let (tx, rx) = mpsc::channel::<String>(QUEUE_DEPTH);
    let rx = Arc::new(Mutex::new(rx));

    for worker_id in 0..count.max(1) {
        let rx = Arc::clone(&rx);
        let context = Arc::clone(&context);
        let tracker = tracker.clone();
        let cancel = cancel.clone();

        tokio::spawn(async move {
            loop {
                // Hold the receiver lock only while waiting for a job.
                let job_id = {
                    let mut queue = rx.lock().await;
                    tokio::select! {
                        biased;

                        _ = cancel.cancelled() => None,
                        job = queue.recv() => job,
                    }
                };

                let Some(job_id) = job_id else {
                    tracing::debug!(worker_id, "lesson worker stopped");
                    break;
                };

                run_job(&context, &tracker, &job_id).await;
            }
        });
    }

    tx
}

/// One job, start to terminal status. Failures land in the tracker,
/// never in the worker loop.
async fn run_job(context: &JobContext, tracker: &JobTracker, job_id: &str) {
    let Some(job) = tracker.get(job_id).await else {
        tracing::warn!(job_id = %job_id, "job submitted but never registered");
        return;
    };

    tracker.mark_processing(job_id).await;
    tracing::info!(
        job_id = %job_id,
        document_ref = %job.document_ref,
        "lesson job started"
    );

    match build_lesson(context, job_id, &job.document_ref).await {
        Ok(lesson) => {
            tracing::info!(job_id = %job_id, title = %lesson.title, "lesson job completed");
            tracker.mark_completed(job_id, lesson).await;
        }
        Err(err) => {
            tracing::error!(job_id = %job_id, error = %err, "lesson job failed");
            tracker.mark_error(job_id, err.to_string()).await;
        }
    }
}
