//! Narrated video generation.
//!
//! This crate provides:
//! - Script synthesis and scene context analysis
//! - Cross-segment visual consistency rules
//! - Duration reconciliation against the measured narration
//! - Bounded-concurrency image and voice generation
//! - Still-image animation, burned-in subtitles and final assembly
//! - A job orchestrator with cancellation, resume and graceful shutdown

pub mod assembly;
pub mod cancel;
pub mod config;
pub mod consistency;
pub mod durations;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod pipeline;
pub mod prompts;
pub mod retry;
pub mod scene_context;
pub mod scheduler;
pub mod script;
pub mod subtitles;

pub use cancel::{CancelFlag, Control};
pub use config::WorkerConfig;
pub use consistency::{ConsistencyEngine, ConsistencyReport};
pub use durations::{reconcile, DurationPolicy};
pub use error::{PipelineError, PipelineResult};
pub use logging::JobLogger;
pub use orchestrator::JobOrchestrator;
pub use pipeline::{verify_segment_order, Collaborators, Pipeline};
pub use scene_context::SceneContextAnalyzer;
pub use scheduler::{AssetEvent, AssetScheduler};
pub use script::{Script, ScriptSynthesizer};
