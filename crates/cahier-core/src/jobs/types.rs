//! Job records and in-memory status tracking.
//!
//! Tracks lesson jobs for the lifetime of the process. No persistence;
//! a restart forgets finished and pending jobs alike.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::lesson::Lesson;

/// Lifecycle of a lesson job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum JobStatus {
    /// Accepted, waiting for a worker.
    Queued,
    /// A worker is running the job.
    Processing,
    /// Finished with a lesson.
    Completed { lesson: Lesson },
    /// Failed; the message is safe to show pollers.
    Error { error: String },
}

impl JobStatus {
    /// Terminal statuses never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed { .. } | JobStatus::Error { .. })
    }
}

/// One lesson job as pollers see it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub owner_id: String,
    pub document_ref: String,
    #[serde(flatten)]
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Tracks every job in memory.
///
/// Each transition takes the write lock once, so pollers never observe
/// a half-applied update. Terminal statuses are sticky; a late marker
/// cannot revive a finished job.
#[derive(Clone, Default)]
pub struct JobTracker {
    jobs: Arc<RwLock<HashMap<String, JobRecord>>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job in `Queued`.
    pub async fn insert_queued(&self, id: &str, owner_id: &str, document_ref: &str) {
        let mut jobs = self.jobs.write().await;
        jobs.insert(
            id.to_string(),
            JobRecord {
                id: id.to_string(),
                owner_id: owner_id.to_string(),
                document_ref: document_ref.to_string(),
                status: JobStatus::Queued,
                created_at: Utc::now(),
                started_at: None,
                completed_at: None,
            },
        );
    }

    /// Snapshot of one job; `None` for ids never registered.
    pub async fn get(&self, id: &str) -> Option<JobRecord> {
        self.jobs.read().await.get(id).cloned()
    }

    /// Mark a job as picked up by a worker.
    pub async fn mark_processing(&self, id: &str) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(id) {
            if job.status.is_terminal() {
                return;
            }
            job.status = JobStatus::Processing;
            job.started_at = Some(Utc::now());
        }
    }

    /// Finish a job with its lesson.
    pub async fn mark_completed(&self, id: &str, lesson: Lesson) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(id) {
            if job.status.is_terminal() {
                return;
            }
            job.status = JobStatus::Completed { lesson };
            job.completed_at = Some(Utc::now());
        }
    }

    /// Fail a job with a short message.
    pub async fn mark_error(&self, id: &str, error: String) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(id) {
            if job.status.is_terminal() {
                return;
            }
            job.status = JobStatus::Error { error };
            job.completed_at = Some(Utc::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lesson(title: &str) -> Lesson {
        Lesson {
            title: title.to_string(),
            duration: "30 min".to_string(),
            objectives: Vec::new(),
            plan: Vec::new(),
            image_prompts: Vec::new(),
            first_tutor_messages: vec!["Bonjour !".to_string()],
        }
    }

    #[tokio::test]
    async fn jobs_walk_the_status_ladder() {
        let tracker = JobTracker::new();
        tracker
            .insert_queued("job-1", "child-1", "uploads/livre.pdf")
            .await;

        let record = tracker.get("job-1").await.unwrap();
        assert_eq!(record.status, JobStatus::Queued);
        assert_eq!(record.owner_id, "child-1");
        assert!(record.started_at.is_none());
        assert!(record.completed_at.is_none());

        tracker.mark_processing("job-1").await;
        let record = tracker.get("job-1").await.unwrap();
        assert_eq!(record.status, JobStatus::Processing);
        assert!(record.started_at.is_some());

        tracker.mark_completed("job-1", lesson("Les couleurs")).await;
        let record = tracker.get("job-1").await.unwrap();
        assert!(matches!(record.status, JobStatus::Completed { .. }));
        assert!(record.completed_at.is_some());
    }

    #[tokio::test]
    async fn terminal_statuses_are_sticky() {
        let tracker = JobTracker::new();
        tracker.insert_queued("done", "child-1", "a.pdf").await;
        tracker.mark_completed("done", lesson("Fini")).await;

        tracker.mark_error("done", "trop tard".to_string()).await;
        tracker.mark_processing("done").await;
        let record = tracker.get("done").await.unwrap();
        assert!(matches!(record.status, JobStatus::Completed { .. }));

        tracker.insert_queued("failed", "child-1", "b.pdf").await;
        tracker.mark_error("failed", "panne".to_string()).await;
        tracker.mark_completed("failed", lesson("Jamais")).await;
        let record = tracker.get("failed").await.unwrap();
        assert_eq!(
            record.status,
            JobStatus::Error {
                error: "panne".to_string()
            }
        );
    }

    #[tokio::test]
    async fn unknown_ids_are_none_and_markers_are_no_ops() {
        let tracker = JobTracker::new();
        assert!(tracker.get("ghost").await.is_none());

        tracker.mark_processing("ghost").await;
        tracker.mark_error("ghost", "x".to_string()).await;
        assert!(tracker.get("ghost").await.is_none());
    }

    #[tokio::test]
    async fn records_serialize_with_a_flat_status_tag() {
        let tracker = JobTracker::new();
        tracker.insert_queued("job-1", "child-1", "a.pdf").await;

        let record = tracker.get("job-1").await.unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "queued");
        assert_eq!(json["id"], "job-1");

        tracker.mark_completed("job-1", lesson("Les animaux")).await;
        let json = serde_json::to_value(tracker.get("job-1").await.unwrap()).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["lesson"]["title"], "Les animaux");

        tracker.insert_queued("job-2", "child-1", "b.pdf").await;
        tracker.mark_error("job-2", "panne réseau".to_string()).await;
        let json = serde_json::to_value(tracker.get("job-2").await.unwrap()).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "panne réseau");
    }
}
