//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Per-job scratch directories live under here
    pub work_dir: PathBuf,
    /// Final videos are written here
    pub output_dir: PathBuf,
    /// Job documents for the file repository
    pub store_dir: PathBuf,
    /// Maximum jobs running a pipeline at the same time
    pub max_concurrent_jobs: usize,
    /// Maximum in-flight image requests per job
    pub max_parallel_images: usize,
    /// Maximum in-flight voice requests per job
    pub max_parallel_voices: usize,
    /// Maximum concurrent FFmpeg animations per job
    pub max_parallel_encodes: usize,
    /// Retries per collaborator call (not counting the first attempt)
    pub asset_max_retries: u32,
    /// Base delay for exponential backoff
    pub retry_base_delay: Duration,
    /// Bound on a single collaborator call
    pub collaborator_timeout: Duration,
    /// Bound on a single FFmpeg invocation
    pub encode_timeout: Duration,
    /// Minimum reconciled segment length in seconds
    pub min_segment_secs: f64,
    /// Allowed gap between summed durations and narration length
    pub duration_tolerance_secs: f64,
    /// Jaccard threshold for near-duplicate descriptors
    pub similarity_threshold: f64,
    /// Output frame rate
    pub fps: u32,
    /// Speaking rate passed to voice synthesis
    pub voice_rate: f32,
    /// How long shutdown waits for running jobs to stop
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/storyreel"),
            output_dir: PathBuf::from("output"),
            store_dir: PathBuf::from("jobs"),
            max_concurrent_jobs: 2,
            max_parallel_images: 5,
            max_parallel_voices: 5,
            max_parallel_encodes: 2,
            asset_max_retries: 2,
            retry_base_delay: Duration::from_millis(500),
            collaborator_timeout: Duration::from_secs(120),
            encode_timeout: Duration::from_secs(600),
            min_segment_secs: 2.0,
            duration_tolerance_secs: 0.1,
            similarity_threshold: 0.90,
            fps: 30,
            voice_rate: 1.0,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            work_dir: env_or("REEL_WORK_DIR", d.work_dir),
            output_dir: env_or("REEL_OUTPUT_DIR", d.output_dir),
            store_dir: env_or("REEL_STORE_DIR", d.store_dir),
            max_concurrent_jobs: env_or("REEL_MAX_JOBS", d.max_concurrent_jobs).max(1),
            max_parallel_images: env_or("REEL_MAX_PARALLEL_IMAGES", d.max_parallel_images).max(1),
            max_parallel_voices: env_or("REEL_MAX_PARALLEL_VOICES", d.max_parallel_voices).max(1),
            max_parallel_encodes: env_or("REEL_MAX_PARALLEL_ENCODES", d.max_parallel_encodes).max(1),
            asset_max_retries: env_or("REEL_ASSET_MAX_RETRIES", d.asset_max_retries),
            retry_base_delay: Duration::from_millis(env_or("REEL_RETRY_BASE_DELAY_MS", 500)),
            collaborator_timeout: Duration::from_secs(env_or("REEL_COLLABORATOR_TIMEOUT_SECS", 120)),
            encode_timeout: Duration::from_secs(env_or("REEL_ENCODE_TIMEOUT_SECS", 600)),
            min_segment_secs: env_or("REEL_MIN_SEGMENT_SECS", d.min_segment_secs),
            duration_tolerance_secs: env_or("REEL_DURATION_TOLERANCE_SECS", d.duration_tolerance_secs),
            similarity_threshold: env_or("REEL_SIMILARITY_THRESHOLD", d.similarity_threshold),
            fps: env_or("REEL_FPS", d.fps).max(1),
            voice_rate: env_or("REEL_VOICE_RATE", d.voice_rate),
            shutdown_timeout: Duration::from_secs(env_or("REEL_SHUTDOWN_TIMEOUT_SECS", 30)),
        }
    }

    /// Scratch directory of one job.
    pub fn job_dir(&self, job_id: &reel_models::JobId) -> PathBuf {
        self.work_dir.join(job_id.as_str())
    }

    /// Final video path of one job.
    pub fn output_path(&self, job_id: &reel_models::JobId) -> PathBuf {
        self.output_dir.join(format!("{}.mp4", job_id))
    }
}
