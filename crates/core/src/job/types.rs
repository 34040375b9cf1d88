//! Status enums and read-only summaries rendered by the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Job lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Downloading,
    Working,
    Waiting,
    Complete,
    Incomplete,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Complete | JobStatus::Incomplete | JobStatus::Failed
        )
    }
}

/// Transcode task lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    WaitingOnFirstPass,
    Processing,
    Complete,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            TaskStatus::Complete | TaskStatus::Failed | TaskStatus::Skipped
        )
    }
}

/// Snapshot of one transcode task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub job_id: String,
    pub task_id: String,
    pub status: TaskStatus,
    pub percent_complete: u8,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Output file name.
    pub output_file: Option<String>,
    /// Public URL of the output.
    pub result_video: Option<String>,
    /// Public URL of the segment manifest.
    pub playlist: Option<String>,
    pub segments: Vec<String>,
    pub bit_rate: u64,
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
    pub file_size: u64,
}

/// Snapshot of a job and all of its tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: String,
    pub status: JobStatus,
    pub message: Option<String>,
    pub tag: Option<String>,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub failed: bool,
    pub cleaned: bool,
    pub is_complete: bool,
    pub submitted_tasks: usize,
    pub acknowledged_tasks: usize,
    pub tasks: Vec<TaskSummary>,
    pub thumbnails: Vec<String>,
    pub adaptive: Option<String>,
}
