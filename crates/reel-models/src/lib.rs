//! Shared data models for the StoryReel pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, their parameters and the closed job state machine
//! - Timed narrative segments and their derived tags
//! - The global scene context shared by every segment of a job
//! - Output aspect ratios and subtitle styles
//! - The job status read model exposed to outer layers

pub mod job;
pub mod scene;
pub mod segment;
pub mod status;
pub mod style;

// Re-export common types
pub use job::{FailureCategory, Job, JobFailure, JobId, JobParams, JobStatus, TransitionError};
pub use scene::{SceneContext, Subject};
pub use segment::{Segment, SegmentTags, ShotType};
pub use status::JobStatusView;
pub use style::{AspectRatio, AspectRatioParseError, SubtitleStyle, SubtitleStyleParseError};
