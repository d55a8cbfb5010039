//! In-process collaborators for end-to-end tests.

#![allow(dead_code)]

use async_trait::async_trait;
use reel_media::{AnimateRequest, MediaEncoder, MediaResult};
use reel_models::{Job, JobId, JobStatus, Segment};
use reel_providers::{
    ImageSynthesizer, ProviderError, ProviderResult, TextCompleter, VoiceClip, VoiceSynthesizer,
};
use reel_store::{InMemoryJobRepository, JobRepository, StoreResult};
use reel_worker::{Collaborators, JobOrchestrator, WorkerConfig};
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub const SCENE_JSON: &str = r#"{
    "era": "1950s",
    "time_of_day": "afternoon",
    "lighting": "natural light",
    "color_palette": "warm sepia",
    "atmosphere": "clear",
    "primary_location": "Dartmouth College",
    "subjects": []
}"#;

pub fn history_of_ai_script() -> String {
    json!({
        "title": "The history of AI",
        "segments": [
            {"text": "In 1956, ten scientists met at Dartmouth.", "duration": 5,
             "visual_prompt": "Wide shot of a 1950s college campus, afternoon"},
            {"text": "They believed machines could think.", "duration": 5,
             "visual_prompt": "Scientists gathered around a wooden blackboard covered in handwritten equations in a classroom"},
            {"text": "The discussion went on for weeks.", "duration": 5,
             "visual_prompt": "Scientists gathered around a wooden blackboard covered in handwritten equations in a classroom today"},
            {"text": "Leaders took notice of the new field.", "duration": 5,
             "visual_prompt": "President A and President B shaking hands"},
            {"text": "Early programs played checkers.", "duration": 5,
             "visual_prompt": "A room-sized computer with blinking panels"},
            {"text": "The field had begun.", "duration": 5,
             "visual_prompt": "Close-up of a punched card in an operator's hand"}
        ]
    })
    .to_string()
}

/// Answers script prompts with a fixed script and scene prompts with a
/// fixed context.
pub struct FakeText {
    pub script: String,
    pub scene: Option<String>,
    pub script_calls: AtomicUsize,
    pub scene_calls: AtomicUsize,
}

impl FakeText {
    pub fn new(script: String) -> Self {
        Self {
            script,
            scene: Some(SCENE_JSON.to_string()),
            script_calls: AtomicUsize::new(0),
            scene_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TextCompleter for FakeText {
    async fn complete(&self, system: &str, _: &str, _: f32, _: u32) -> ProviderResult<String> {
        if system.contains("production designer") {
            self.scene_calls.fetch_add(1, Ordering::SeqCst);
            return self
                .scene
                .clone()
                .ok_or_else(|| ProviderError::ServiceUnavailable("scene model down".into()));
        }
        self.script_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.script.clone())
    }
}

#[derive(Default)]
pub struct FakeImages {
    pub prompts: Mutex<Vec<String>>,
    /// Calls that fail before any succeeds
    pub failures: AtomicUsize,
    pub always_fail: bool,
    pub delay: Duration,
}

impl FakeImages {
    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ImageSynthesizer for FakeImages {
    async fn generate_image(&self, prompt: &str, _: &str, output: &Path) -> ProviderResult<PathBuf> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        tokio::time::sleep(self.delay).await;
        if self.always_fail {
            return Err(ProviderError::ServiceUnavailable("image model down".into()));
        }
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ProviderError::ServiceUnavailable("try again".into()));
        }
        tokio::fs::create_dir_all(output.parent().unwrap()).await?;
        tokio::fs::write(output, b"png").await?;
        Ok(output.to_path_buf())
    }
}

/// Every clip lasts `clip_secs`.
pub struct FakeVoices {
    pub clip_secs: f64,
    pub calls: AtomicUsize,
}

impl FakeVoices {
    pub fn new(clip_secs: f64) -> Self {
        Self {
            clip_secs,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VoiceSynthesizer for FakeVoices {
    async fn synthesize(&self, _: &str, _: &str, _: f32, output: &Path) -> ProviderResult<VoiceClip> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::fs::create_dir_all(output.parent().unwrap()).await?;
        tokio::fs::write(output, b"mp3").await?;
        Ok(VoiceClip {
            path: output.to_path_buf(),
            duration: self.clip_secs,
        })
    }
}

/// Writes placeholder files and tracks durations by frame count.
pub struct FakeEncoder {
    pub narration_secs: f64,
    pub fps: u32,
    pub durations: Mutex<HashMap<PathBuf, f64>>,
    pub concat_order: Mutex<Vec<PathBuf>>,
    pub subtitles: Mutex<Option<String>>,
}

impl FakeEncoder {
    pub fn new(narration_secs: f64) -> Self {
        Self {
            narration_secs,
            fps: 30,
            durations: Mutex::new(HashMap::new()),
            subtitles: Mutex::new(None),
            concat_order: Mutex::new(Vec::new()),
        }
    }

    fn known(&self, path: &Path) -> Option<f64> {
        self.durations.lock().unwrap().get(path).copied()
    }
}

#[async_trait]
impl MediaEncoder for FakeEncoder {
    async fn animate(&self, request: &AnimateRequest) -> MediaResult<PathBuf> {
        tokio::fs::write(&request.output, b"clip").await?;
        self.durations
            .lock()
            .unwrap()
            .insert(request.output.clone(), request.duration());
        Ok(request.output.clone())
    }

    async fn concat(&self, clips: &[PathBuf], output: &Path) -> MediaResult<PathBuf> {
        let total: f64 = clips.iter().filter_map(|c| self.known(c)).sum();
        *self.concat_order.lock().unwrap() = clips.to_vec();
        tokio::fs::write(output, b"video").await?;
        self.durations.lock().unwrap().insert(output.to_path_buf(), total);
        Ok(output.to_path_buf())
    }

    async fn concat_audio(&self, _: &[PathBuf], output: &Path) -> MediaResult<f64> {
        tokio::fs::write(output, b"wav").await?;
        self.durations
            .lock()
            .unwrap()
            .insert(output.to_path_buf(), self.narration_secs);
        Ok(self.narration_secs)
    }

    async fn mux(
        &self,
        video: &Path,
        audio: &Path,
        subtitles: Option<&Path>,
        output: &Path,
    ) -> MediaResult<PathBuf> {
        if let Some(path) = subtitles {
            let ass = tokio::fs::read_to_string(path).await?;
            *self.subtitles.lock().unwrap() = Some(ass);
        }
        let length = self
            .known(video)
            .unwrap_or_default()
            .max(self.known(audio).unwrap_or_default());
        tokio::fs::write(output, b"final").await?;
        self.durations.lock().unwrap().insert(output.to_path_buf(), length);
        Ok(output.to_path_buf())
    }

    async fn duration(&self, path: &Path) -> MediaResult<f64> {
        Ok(self.known(path).unwrap_or_default())
    }
}

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub repo: Arc<InMemoryJobRepository>,
    pub text: Arc<FakeText>,
    pub images: Arc<FakeImages>,
    pub voices: Arc<FakeVoices>,
    pub encoder: Arc<FakeEncoder>,
}

impl Harness {
    pub fn new(images: FakeImages) -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            repo: Arc::new(InMemoryJobRepository::new()),
            text: Arc::new(FakeText::new(history_of_ai_script())),
            images: Arc::new(images),
            voices: Arc::new(FakeVoices::new(4.7)),
            encoder: Arc::new(FakeEncoder::new(28.4)),
        }
    }

    pub fn config(&self) -> WorkerConfig {
        WorkerConfig {
            work_dir: self.dir.path().join("work"),
            output_dir: self.dir.path().join("output"),
            store_dir: self.dir.path().join("jobs"),
            max_parallel_images: 2,
            max_parallel_voices: 2,
            asset_max_retries: 2,
            retry_base_delay: Duration::from_millis(1),
            collaborator_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
            ..WorkerConfig::default()
        }
    }

    pub fn orchestrator(&self) -> JobOrchestrator {
        self.orchestrator_with(self.repo.clone())
    }

    pub fn orchestrator_with(&self, repo: Arc<dyn JobRepository>) -> JobOrchestrator {
        JobOrchestrator::new(
            self.config(),
            repo,
            Collaborators {
                text: self.text.clone(),
                images: self.images.clone(),
                voices: self.voices.clone(),
                encoder: self.encoder.clone(),
            },
        )
    }

    pub fn output_path(&self, id: &JobId) -> PathBuf {
        self.config().output_path(id)
    }
}

/// Poll until the job reaches `status`.
pub async fn wait_for_status(orchestrator: &JobOrchestrator, id: &JobId, status: JobStatus) {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if orchestrator.status(id).await.unwrap().status == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("job never reached {}", status));
}

/// Holds back the first save of a completed job until `release` is notified.
pub struct GatedRepository {
    pub inner: Arc<InMemoryJobRepository>,
    pub reached: Notify,
    pub release: Notify,
    armed: AtomicBool,
}

impl GatedRepository {
    pub fn new(inner: Arc<InMemoryJobRepository>) -> Self {
        Self {
            inner,
            reached: Notify::new(),
            release: Notify::new(),
            armed: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl JobRepository for GatedRepository {
    async fn save(&self, job: &Job) -> StoreResult<()> {
        if job.status == JobStatus::Completed && self.armed.swap(false, Ordering::SeqCst) {
            self.reached.notify_one();
            self.release.notified().await;
        }
        self.inner.save(job).await
    }

    async fn load(&self, id: &JobId) -> StoreResult<Option<Job>> {
        self.inner.load(id).await
    }

    async fn append_segment(&self, id: &JobId, segment: &Segment) -> StoreResult<()> {
        self.inner.append_segment(id, segment).await
    }

    async fn list(&self, owner: Option<&str>) -> StoreResult<Vec<Job>> {
        self.inner.list(owner).await
    }
}
