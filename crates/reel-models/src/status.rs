//! Job status read model.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{JobId, JobStatus};

/// Snapshot of a job as seen by status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub progress_message: String,
    /// Present only for completed jobs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    /// `"<category>: <message>"` for failed jobs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl JobStatusView {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
