//! FFmpeg CLI wrapper for still-image animation.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with multiple inputs
//! - A runner with timeout and kill-on-drop semantics
//! - FFprobe duration probing for audio and video
//! - Low-amplitude pan/zoom trajectories and frame allocation
//! - ASS subtitle files for burned-in captions
//! - The [`MediaEncoder`] trait and its FFmpeg implementation

pub mod command;
pub mod encoder;
pub mod error;
pub mod probe;
pub mod subtitles;
pub mod trajectory;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use encoder::{concat_list, AnimateRequest, FfmpegEncoder, MediaEncoder};
pub use error::{MediaError, MediaResult};
pub use probe::{get_duration, probe_media, MediaInfo};
pub use subtitles::{generate_ass, AssStyle, Cue, CueAnimation};
pub use trajectory::{frame_counts, Effect, Trajectory};
