//! Job definitions and the job state machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use crate::{AspectRatio, JobStatusView, SceneContext, Segment, SubtitleStyle};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Input parameters of a generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct JobParams {
    /// Topic the narrative is written about
    #[validate(length(min = 3, max = 500))]
    pub topic: String,

    /// Target video duration in seconds
    #[validate(range(min = 10, max = 600))]
    pub target_duration_secs: u32,

    /// Voice identifier passed to the voice collaborator
    #[validate(length(min = 1, max = 100))]
    pub voice: String,

    /// Visual art style ("photorealism", "anime", ...)
    #[validate(length(min = 1, max = 100))]
    pub art_style: String,

    /// Narrative style ("documentary", "viral", ...)
    #[serde(default = "default_narrative_style")]
    pub narrative_style: String,

    /// Narration language (ISO 639-1)
    #[serde(default = "default_language")]
    pub language: String,

    /// Output aspect ratio
    #[serde(default)]
    pub aspect_ratio: AspectRatio,

    /// Burned-in subtitle preset; unknown names are rejected on parse
    #[serde(default)]
    pub subtitle_style: SubtitleStyle,
}

fn default_narrative_style() -> String {
    "documentary".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

impl JobParams {
    /// Parameters with defaults for everything except the topic and duration.
    pub fn new(topic: impl Into<String>, target_duration_secs: u32) -> Self {
        Self {
            topic: topic.into(),
            target_duration_secs,
            voice: "alloy".to_string(),
            art_style: "photorealism".to_string(),
            narrative_style: default_narrative_style(),
            language: default_language(),
            aspect_ratio: AspectRatio::default(),
            subtitle_style: SubtitleStyle::default(),
        }
    }
}

/// Job lifecycle state.
///
/// The pipeline states advance strictly in declaration order. `Failed` and
/// `Cancelled` are reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    ScriptGeneration,
    ContextAnalysis,
    AssetGeneration,
    Assembly,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::ScriptGeneration => "script_generation",
            JobStatus::ContextAnalysis => "context_analysis",
            JobStatus::AssetGeneration => "asset_generation",
            JobStatus::Assembly => "assembly",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// The pipeline successor of this state, if any.
    pub fn next(&self) -> Option<JobStatus> {
        match self {
            JobStatus::Pending => Some(JobStatus::ScriptGeneration),
            JobStatus::ScriptGeneration => Some(JobStatus::ContextAnalysis),
            JobStatus::ContextAnalysis => Some(JobStatus::AssetGeneration),
            JobStatus::AssetGeneration => Some(JobStatus::Assembly),
            JobStatus::Assembly => Some(JobStatus::Completed),
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => None,
        }
    }

    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match to {
            JobStatus::Failed | JobStatus::Cancelled => true,
            other => self.next() == Some(other),
        }
    }

    /// Progress reported on entering this state.
    pub fn progress_floor(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::ScriptGeneration => 5,
            JobStatus::ContextAnalysis => 15,
            JobStatus::AssetGeneration => 25,
            JobStatus::Assembly => 75,
            JobStatus::Completed => 100,
            JobStatus::Failed | JobStatus::Cancelled => 0,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected state transition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid job transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Human-readable cause category of a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    GenerationFailed,
    DurationMismatch,
    SegmentIndexCorruption,
    Timeout,
    MediaFailed,
    StorageFailed,
    Internal,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::GenerationFailed => "generation_failed",
            FailureCategory::DurationMismatch => "duration_mismatch",
            FailureCategory::SegmentIndexCorruption => "segment_index_corruption",
            FailureCategory::Timeout => "timeout",
            FailureCategory::MediaFailed => "media_failed",
            FailureCategory::StorageFailed => "storage_failed",
            FailureCategory::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recorded failure of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobFailure {
    pub category: FailureCategory,
    /// Short summary safe to show to users
    pub message: String,
    /// State the job was in when it failed
    pub failed_in: JobStatus,
}

/// One generation request and everything produced for it so far.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Owner (user ID)
    pub owner: String,

    /// Input parameters
    pub params: JobParams,

    /// Current state
    #[serde(default)]
    pub status: JobStatus,

    /// Progress (0-100)
    #[serde(default)]
    pub progress: u8,

    /// Short description of the current step
    #[serde(default)]
    pub progress_message: String,

    /// Full narrative produced by the script stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,

    /// Global scene context produced by the context stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene_context: Option<SceneContext>,

    /// Ordered segments, index == position
    #[serde(default)]
    pub segments: Vec<Segment>,

    /// Concatenated narration track
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narration_path: Option<PathBuf>,

    /// Measured duration of the narration track in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narration_duration: Option<f64>,

    /// Final muxed video
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,

    /// Failure detail (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Started at timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Reached a terminal state at
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(owner: impl Into<String>, params: JobParams) -> Self {
        let now = Utc::now();

        Self {
            id: JobId::new(),
            owner: owner.into(),
            params,
            status: JobStatus::Pending,
            progress: 0,
            progress_message: "Queued".to_string(),
            narrative: None,
            scene_context: None,
            segments: Vec::new(),
            narration_path: None,
            narration_duration: None,
            output_path: None,
            failure: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    /// Move to `to`, raising progress to the state's floor.
    pub fn transition(&mut self, to: JobStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(TransitionError {
                from: self.status,
                to,
            });
        }

        let now = Utc::now();
        if self.status == JobStatus::Pending && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        self.status = to;
        if to.is_terminal() {
            self.finished_at = Some(now);
        }
        if to == JobStatus::Completed {
            self.progress = 100;
        } else {
            self.progress = self.progress.max(to.progress_floor());
        }
        self.updated_at = now;
        Ok(())
    }

    /// Update progress. Progress never moves backwards.
    pub fn set_progress(&mut self, progress: u8, message: impl Into<String>) {
        self.progress = self.progress.max(progress.min(100));
        self.progress_message = message.into();
        self.updated_at = Utc::now();
    }

    /// Mark the job as failed.
    pub fn fail(
        &mut self,
        category: FailureCategory,
        message: impl Into<String>,
    ) -> Result<(), TransitionError> {
        let failed_in = self.status;
        self.transition(JobStatus::Failed)?;
        let message = message.into();
        self.progress_message = format!("Failed: {}", category);
        self.failure = Some(JobFailure {
            category,
            message,
            failed_in,
        });
        Ok(())
    }

    /// Mark the job as cancelled by its owner.
    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Cancelled)?;
        self.progress_message = "Cancelled".to_string();
        self.output_path = None;
        Ok(())
    }

    /// Human-readable error detail for the read model.
    pub fn error_detail(&self) -> Option<String> {
        self.failure
            .as_ref()
            .map(|f| format!("{}: {}", f.category, f.message))
    }

    /// Snapshot for status queries.
    pub fn status_view(&self) -> JobStatusView {
        JobStatusView {
            job_id: self.id.clone(),
            status: self.status,
            progress: self.progress,
            progress_message: self.progress_message.clone(),
            output_path: match self.status {
                JobStatus::Completed => self.output_path.clone(),
                _ => None,
            },
            error_detail: self.error_detail(),
            updated_at: self.updated_at,
        }
    }
}
