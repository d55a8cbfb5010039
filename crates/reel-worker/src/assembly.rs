//! Narration concatenation, clip animation and the final mux.

use futures::future::try_join_all;
use reel_media::{frame_counts, generate_ass, AnimateRequest, AssStyle, MediaEncoder, Trajectory};
use reel_models::Segment;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::cancel::CancelFlag;
use crate::error::{PipelineError, PipelineResult};

/// Called with `(clips_done, clips_total)` as clips finish.
pub type ClipProgress<'a> = &'a (dyn Fn(usize, usize) + Send + Sync);

pub struct Assembler {
    encoder: Arc<dyn MediaEncoder>,
    fps: u32,
    max_parallel: usize,
    tolerance: f64,
}

impl Assembler {
    pub fn new(encoder: Arc<dyn MediaEncoder>, fps: u32, max_parallel: usize, tolerance: f64) -> Self {
        Self {
            encoder,
            fps: fps.max(1),
            max_parallel: max_parallel.max(1),
            tolerance,
        }
    }

    /// Concatenate the per-segment voice clips in index order into the single
    /// narration track. Returns the track and its measured duration.
    pub async fn narration(&self, segments: &[Segment], job_dir: &Path) -> PipelineResult<(PathBuf, f64)> {
        let clips = segments
            .iter()
            .map(|s| {
                s.voice_path.clone().ok_or_else(|| {
                    PipelineError::index_corruption(format!("segment {} has no narration clip", s.index))
                })
            })
            .collect::<PipelineResult<Vec<_>>>()?;

        tokio::fs::create_dir_all(job_dir).await?;
        let output = job_dir.join("narration.wav");
        let measured = self.encoder.concat_audio(&clips, &output).await?;
        if !measured.is_finite() || measured <= 0.0 {
            return Err(PipelineError::duration_mismatch(format!(
                "narration measured {} seconds",
                measured
            )));
        }

        info!(clips = clips.len(), duration = measured, "Narration track ready");
        Ok((output, measured))
    }

    /// Animate every segment for exactly its reconciled duration, concatenate
    /// in index order and mux with the narration, burning in `subtitles`
    /// when given. No stream is trimmed; the video is checked against the
    /// narration before muxing instead.
    #[allow(clippy::too_many_arguments)]
    pub async fn assemble(
        &self,
        segments: &[Segment],
        size: (u32, u32),
        narration: &Path,
        narration_duration: f64,
        job_dir: &Path,
        output: &Path,
        subtitles: Option<&AssStyle>,
        cancel: &CancelFlag,
        on_clip: ClipProgress<'_>,
    ) -> PipelineResult<PathBuf> {
        let durations: Vec<f64> = segments.iter().map(|s| s.duration).collect();
        let frames = frame_counts(&durations, self.fps);
        let frame = 1.0 / self.fps as f64;

        let total_secs = frames.iter().sum::<u64>() as f64 * frame;
        if (total_secs - narration_duration).abs() > self.tolerance + frame {
            return Err(PipelineError::duration_mismatch(format!(
                "clips span {:.3}s but narration is {:.3}s",
                total_secs, narration_duration
            )));
        }

        let clips_dir = job_dir.join("clips");
        tokio::fs::create_dir_all(&clips_dir).await?;

        let requests = segments
            .iter()
            .zip(&frames)
            .map(|(segment, &frames)| {
                if frames == 0 {
                    return Err(PipelineError::duration_mismatch(format!(
                        "segment {} spans no frames",
                        segment.index
                    )));
                }
                let image = segment.image_path.clone().ok_or_else(|| {
                    PipelineError::index_corruption(format!("segment {} has no image", segment.index))
                })?;
                Ok(AnimateRequest {
                    image,
                    output: clips_dir.join(format!("clip_{:03}.mp4", segment.index)),
                    frames,
                    fps: self.fps,
                    size,
                    trajectory: Trajectory::for_segment(segment.index, frames),
                })
            })
            .collect::<PipelineResult<Vec<_>>>()?;

        let total = requests.len();
        let done = Arc::new(AtomicUsize::new(0));
        let permits = Arc::new(Semaphore::new(self.max_parallel));
        let work = requests.into_iter().map(|request| {
            let encoder = self.encoder.clone();
            let permits = permits.clone();
            let done = done.clone();
            let cancel = cancel.clone();
            async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| PipelineError::Cancelled)?;
                cancel.check()?;
                let clip = encoder.animate(&request).await?;
                debug!(
                    segment = ?clip.file_name(),
                    frames = request.frames,
                    effect = request.trajectory.effect.as_str(),
                    "Clip animated"
                );
                on_clip(done.fetch_add(1, Ordering::SeqCst) + 1, total);
                Ok::<_, PipelineError>(clip)
            }
        });
        // Results come back in index order whatever the completion order.
        let clips: Vec<PathBuf> = try_join_all(work).await?;

        cancel.check()?;
        let video = job_dir.join("video.mp4");
        self.encoder.concat(&clips, &video).await?;
        let _ = tokio::fs::remove_dir_all(&clips_dir).await;

        let video_secs = self.encoder.duration(&video).await?;
        if (video_secs - narration_duration).abs() > self.tolerance + frame {
            return Err(PipelineError::duration_mismatch(format!(
                "video is {:.3}s but narration is {:.3}s",
                video_secs, narration_duration
            )));
        }

        let subtitle_file = match subtitles {
            Some(style) => {
                let cues = crate::subtitles::cues(segments);
                let path = job_dir.join("subtitles.ass");
                tokio::fs::write(&path, generate_ass(&cues, style, size)).await?;
                debug!(cues = cues.len(), "Subtitles written");
                Some(path)
            }
            None => None,
        };

        cancel.check()?;
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let output = self
            .encoder
            .mux(&video, narration, subtitle_file.as_deref(), output)
            .await?;
        let _ = tokio::fs::remove_file(&video).await;

        info!(
            output = %output.display(),
            clips = total,
            duration = video_secs,
            "Video assembled"
        );
        Ok(output)
    }
}
