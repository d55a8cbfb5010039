//! Bounded fan-out of image and voice requests.
//!
//! Images and voices have independent per-job limits. Results are reported
//! over a channel as they complete, keyed by segment index, so completion
//! order never affects which segment a file belongs to.

use futures::future::{try_join, try_join_all};
use reel_models::Segment;
use reel_providers::{ImageSynthesizer, VoiceClip, VoiceSynthesizer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info};

use crate::cancel::CancelFlag;
use crate::error::{PipelineError, PipelineResult};
use crate::metrics;
use crate::prompts::art_style_description;
use crate::retry::{retry_async, RetryConfig};

/// A finished asset.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetEvent {
    /// One image shared by every listed segment
    ImageReady { indices: Vec<usize>, path: PathBuf },
    VoiceReady { index: usize, clip: VoiceClip },
}

/// One image request, shared by every segment with the same descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTask {
    pub visual: String,
    pub indices: Vec<usize>,
    /// File already generated for one of the segments
    pub existing: Option<PathBuf>,
}

/// Work still missing for a job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetPlan {
    pub images: Vec<ImageTask>,
    pub voices: Vec<usize>,
}

impl AssetPlan {
    /// Number of events `generate` will report.
    pub fn total(&self) -> usize {
        self.images.len() + self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Image requests that will actually reach the collaborator.
    pub fn image_requests(&self) -> usize {
        self.images.iter().filter(|task| task.existing.is_none()).count()
    }
}

/// Per-job output settings.
pub struct AssetRequest<'a> {
    pub job_dir: &'a Path,
    pub voice: &'a str,
    pub image_size: &'a str,
    pub art_style: &'a str,
}

pub struct AssetScheduler {
    images: Arc<dyn ImageSynthesizer>,
    voices: Arc<dyn VoiceSynthesizer>,
    max_parallel_images: usize,
    max_parallel_voices: usize,
    voice_rate: f32,
    retry: RetryConfig,
}

fn on_disk(path: &Option<PathBuf>) -> bool {
    path.as_ref().is_some_and(|p| p.exists())
}

pub fn image_path(job_dir: &Path, index: usize) -> PathBuf {
    job_dir.join("images").join(format!("segment_{:03}.png", index))
}

pub fn voice_path(job_dir: &Path, index: usize) -> PathBuf {
    job_dir.join("voice").join(format!("segment_{:03}.mp3", index))
}

impl AssetScheduler {
    pub fn new(
        images: Arc<dyn ImageSynthesizer>,
        voices: Arc<dyn VoiceSynthesizer>,
        max_parallel_images: usize,
        max_parallel_voices: usize,
        voice_rate: f32,
        retry: RetryConfig,
    ) -> Self {
        Self {
            images,
            voices,
            max_parallel_images: max_parallel_images.max(1),
            max_parallel_voices: max_parallel_voices.max(1),
            voice_rate,
            retry,
        }
    }

    /// Group segments by final descriptor and leave out assets already on disk.
    pub fn plan(&self, segments: &[Segment]) -> AssetPlan {
        let mut groups: Vec<ImageTask> = Vec::new();
        for segment in segments {
            match groups.iter_mut().find(|task| task.visual == segment.visual) {
                Some(task) => task.indices.push(segment.index),
                None => groups.push(ImageTask {
                    visual: segment.visual.clone(),
                    indices: vec![segment.index],
                    existing: None,
                }),
            }
        }

        let images = groups
            .into_iter()
            .filter_map(|mut task| {
                let members: Vec<&Segment> = task
                    .indices
                    .iter()
                    .filter_map(|i| segments.get(*i))
                    .collect();
                if members.iter().all(|s| on_disk(&s.image_path)) {
                    return None;
                }
                task.existing = members
                    .iter()
                    .find(|s| on_disk(&s.image_path))
                    .and_then(|s| s.image_path.clone());
                Some(task)
            })
            .collect();

        let voices = segments
            .iter()
            .filter(|s| !(on_disk(&s.voice_path) && s.voice_duration.is_some()))
            .map(|s| s.index)
            .collect();

        AssetPlan { images, voices }
    }

    /// Generate everything in `plan`, reporting each result on `events`.
    ///
    /// Fails on the first asset whose retry budget is exhausted.
    pub async fn generate(
        &self,
        plan: &AssetPlan,
        segments: &[Segment],
        request: &AssetRequest<'_>,
        cancel: &CancelFlag,
        events: mpsc::Sender<AssetEvent>,
    ) -> PipelineResult<()> {
        let image_permits = Arc::new(Semaphore::new(self.max_parallel_images));
        let voice_permits = Arc::new(Semaphore::new(self.max_parallel_voices));

        let reused: usize = plan.images.iter().map(|task| task.indices.len() - 1).sum();
        metrics::record_assets_reused("image", reused);
        info!(
            images = plan.image_requests(),
            shared_segments = reused,
            voices = plan.voices.len(),
            "Scheduling assets"
        );

        let image_work = plan.images.iter().map(|task| {
            let permits = image_permits.clone();
            let events = events.clone();
            async move {
                let path = match &task.existing {
                    Some(path) => path.clone(),
                    None => {
                        let _permit = permits
                            .acquire_owned()
                            .await
                            .map_err(|_| PipelineError::Cancelled)?;
                        self.generate_image(task, request, cancel).await?
                    }
                };
                events
                    .send(AssetEvent::ImageReady {
                        indices: task.indices.clone(),
                        path,
                    })
                    .await
                    .map_err(|_| PipelineError::Cancelled)
            }
        });

        let voice_work = plan.voices.iter().map(|index| {
            let permits = voice_permits.clone();
            let events = events.clone();
            async move {
                let segment = segments
                    .get(*index)
                    .ok_or_else(|| PipelineError::index_corruption(format!("no segment {}", index)))?;
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| PipelineError::Cancelled)?;
                let clip = self.generate_voice(segment, request, cancel).await?;
                events
                    .send(AssetEvent::VoiceReady { index: *index, clip })
                    .await
                    .map_err(|_| PipelineError::Cancelled)
            }
        });

        try_join(try_join_all(image_work), try_join_all(voice_work)).await?;
        Ok(())
    }

    async fn generate_image(
        &self,
        task: &ImageTask,
        request: &AssetRequest<'_>,
        cancel: &CancelFlag,
    ) -> PipelineResult<PathBuf> {
        let index = task.indices.first().copied().unwrap_or_default();
        let output = image_path(request.job_dir, index);
        let prompt = format!("{}, {}", task.visual, art_style_description(request.art_style));
        debug!(segment = index, "Requesting image");

        let retry = self.retry.named(format!("image[{}]", index));
        let images = &self.images;
        let prompt = prompt.as_str();
        let output = output.as_path();
        let size = request.image_size;
        let result = retry_async(&retry, cancel, || async move {
            images
                .generate_image(prompt, size, output)
                .await
                .map_err(PipelineError::from)
        })
        .await;

        let attempts = result.attempts();
        metrics::record_asset_attempts("image", attempts);
        result
            .into_result()
            .map_err(|e| exhausted("image", index, attempts, e))
    }

    async fn generate_voice(
        &self,
        segment: &Segment,
        request: &AssetRequest<'_>,
        cancel: &CancelFlag,
    ) -> PipelineResult<VoiceClip> {
        let index = segment.index;
        let output = voice_path(request.job_dir, index);
        debug!(segment = index, "Requesting narration");

        let retry = self.retry.named(format!("voice[{}]", index));
        let voices = &self.voices;
        let text = segment.text.as_str();
        let output = output.as_path();
        let voice = request.voice;
        let rate = self.voice_rate;
        let result = retry_async(&retry, cancel, || async move {
            let clip = voices
                .synthesize(text, voice, rate, output)
                .await
                .map_err(PipelineError::from)?;
            if !clip.duration.is_finite() || clip.duration <= 0.0 {
                return Err(PipelineError::malformed(format!(
                    "voice clip has duration {}",
                    clip.duration
                )));
            }
            Ok(clip)
        })
        .await;

        let attempts = result.attempts();
        metrics::record_asset_attempts("voice", attempts);
        result
            .into_result()
            .map_err(|e| exhausted("voice", index, attempts, e))
    }
}

fn exhausted(kind: &str, index: usize, attempts: u32, error: PipelineError) -> PipelineError {
    match error {
        PipelineError::Cancelled => PipelineError::Cancelled,
        e => PipelineError::generation_failed(format!(
            "{} for segment {} failed after {} attempts: {}",
            kind,
            index,
            attempts,
            e.summary()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reel_providers::{ProviderError, ProviderResult};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Tracking {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        prompts: Mutex<Vec<String>>,
        failures_left: AtomicUsize,
    }

    impl Tracking {
        async fn enter(&self) {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ImageSynthesizer for Tracking {
        async fn generate_image(&self, prompt: &str, _: &str, output: &Path) -> ProviderResult<PathBuf> {
            self.enter().await;
            self.prompts.lock().unwrap().push(prompt.to_string());
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(ProviderError::ServiceUnavailable("busy".into()));
            }
            tokio::fs::create_dir_all(output.parent().unwrap()).await?;
            tokio::fs::write(output, b"png").await?;
            Ok(output.to_path_buf())
        }
    }

    #[async_trait]
    impl VoiceSynthesizer for Tracking {
        async fn synthesize(&self, text: &str, _: &str, _: f32, output: &Path) -> ProviderResult<VoiceClip> {
            self.enter().await;
            tokio::fs::create_dir_all(output.parent().unwrap()).await?;
            tokio::fs::write(output, b"mp3").await?;
            Ok(VoiceClip {
                path: output.to_path_buf(),
                duration: text.split_whitespace().count() as f64 / 2.5,
            })
        }
    }

    fn segments(visuals: &[&str]) -> Vec<Segment> {
        visuals
            .iter()
            .enumerate()
            .map(|(i, v)| Segment::new(i, format!("narration number {}", i), 5.0, *v))
            .collect()
    }

    fn scheduler(fake: &Arc<Tracking>, limit: usize, retries: u32) -> AssetScheduler {
        AssetScheduler::new(
            fake.clone(),
            fake.clone(),
            limit,
            limit,
            1.0,
            RetryConfig::new("test")
                .with_max_retries(retries)
                .with_base_delay(Duration::from_millis(1)),
        )
    }

    async fn run(
        scheduler: &AssetScheduler,
        segments: &[Segment],
        dir: &Path,
    ) -> (PipelineResult<()>, Vec<AssetEvent>) {
        let plan = scheduler.plan(segments);
        let (tx, mut rx) = mpsc::channel(64);
        let request = AssetRequest {
            job_dir: dir,
            voice: "alloy",
            image_size: "1024x1792",
            art_style: "photorealism",
        };
        let result = scheduler
            .generate(&plan, segments, &request, &CancelFlag::never(), tx)
            .await;
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        (result, events)
    }

    #[test]
    fn test_plan_groups_identical_descriptors() {
        let fake = Arc::new(Tracking::default());
        let plan = scheduler(&fake, 5, 0).plan(&segments(&["a lab", "a lab", "a street", "a lab"]));
        assert_eq!(plan.images.len(), 2);
        assert_eq!(plan.images[0].indices, vec![0, 1, 3]);
        assert_eq!(plan.images[1].indices, vec![2]);
        assert_eq!(plan.voices, vec![0, 1, 2, 3]);
        assert_eq!(plan.total(), 6);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(Tracking::default());
        let visuals: Vec<String> = (0..12).map(|i| format!("scene {}", i)).collect();
        let visuals: Vec<&str> = visuals.iter().map(String::as_str).collect();

        let (result, events) = run(&scheduler(&fake, 3, 0), &segments(&visuals), dir.path()).await;

        assert!(result.is_ok());
        assert_eq!(events.len(), 24);
        // Images and voices share the fake, each type is limited to 3.
        assert!(fake.peak.load(Ordering::SeqCst) <= 6);
        assert!(fake.peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_shared_descriptor_requests_one_image() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(Tracking::default());
        let segs = segments(&["a lab at night", "a lab at night", "a street"]);

        let (result, events) = run(&scheduler(&fake, 5, 0), &segs, dir.path()).await;

        assert!(result.is_ok());
        assert_eq!(fake.prompts.lock().unwrap().len(), 2);
        let shared = events.iter().find_map(|e| match e {
            AssetEvent::ImageReady { indices, path } if indices.len() == 2 => Some(path.clone()),
            _ => None,
        });
        assert_eq!(shared, Some(image_path(dir.path(), 0)));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(Tracking::default());
        fake.failures_left.store(2, Ordering::SeqCst);

        let (result, _) = run(&scheduler(&fake, 1, 2), &segments(&["a lab"]), dir.path()).await;

        assert!(result.is_ok());
        assert_eq!(fake.prompts.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_budget_fails() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(Tracking::default());
        fake.failures_left.store(10, Ordering::SeqCst);

        let (result, _) = run(&scheduler(&fake, 1, 2), &segments(&["a lab"]), dir.path()).await;

        match result {
            Err(PipelineError::GenerationFailed(msg)) => {
                assert!(msg.contains("image for segment 0 failed after 3 attempts"))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_existing_assets_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(Tracking::default());
        let mut segs = segments(&["a lab", "a street"]);

        let image = image_path(dir.path(), 0);
        let voice = voice_path(dir.path(), 0);
        tokio::fs::create_dir_all(image.parent().unwrap()).await.unwrap();
        tokio::fs::create_dir_all(voice.parent().unwrap()).await.unwrap();
        tokio::fs::write(&image, b"png").await.unwrap();
        tokio::fs::write(&voice, b"mp3").await.unwrap();
        segs[0].image_path = Some(image);
        segs[0].voice_path = Some(voice);
        segs[0].voice_duration = Some(2.0);

        let plan = scheduler(&fake, 5, 0).plan(&segs);
        assert_eq!(plan.images.len(), 1);
        assert_eq!(plan.images[0].indices, vec![1]);
        assert_eq!(plan.voices, vec![1]);
    }
}
