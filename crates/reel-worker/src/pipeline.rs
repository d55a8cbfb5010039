//! The per-job stage pipeline.
//!
//! `run` is a loop over the persisted status, so a job loaded from the
//! repository re-enters at the stage it was interrupted in. Every
//! transition is saved before it is published.

use reel_media::MediaEncoder;
use reel_models::{Job, JobStatus, JobStatusView, Segment};
use reel_providers::{ImageSynthesizer, TextCompleter, VoiceSynthesizer};
use reel_store::JobRepository;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::Instrument;

use crate::assembly::Assembler;
use crate::cancel::CancelFlag;
use crate::config::WorkerConfig;
use crate::consistency::ConsistencyEngine;
use crate::durations::{reconcile, DurationPolicy};
use crate::error::{PipelineError, PipelineResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::retry::RetryConfig;
use crate::scene_context::SceneContextAnalyzer;
use crate::scheduler::{AssetEvent, AssetRequest, AssetScheduler};
use crate::script::ScriptSynthesizer;

/// The external services a pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub text: Arc<dyn TextCompleter>,
    pub images: Arc<dyn ImageSynthesizer>,
    pub voices: Arc<dyn VoiceSynthesizer>,
    pub encoder: Arc<dyn MediaEncoder>,
}

/// Fail unless `segments` holds exactly `expected` segments indexed `0..expected`.
pub fn verify_segment_order(segments: &[Segment], expected: usize) -> PipelineResult<()> {
    if segments.len() != expected {
        return Err(PipelineError::index_corruption(format!(
            "expected {} segments, found {}",
            expected,
            segments.len()
        )));
    }
    match segments.iter().enumerate().find(|(i, s)| s.index != *i) {
        Some((position, segment)) => Err(PipelineError::index_corruption(format!(
            "position {} holds segment {}",
            position, segment.index
        ))),
        None => Ok(()),
    }
}

/// Progress within `[start, end)` after `done` of `total` units.
fn band(start: u8, end: u8, done: usize, total: usize) -> u8 {
    if total == 0 {
        return start;
    }
    let span = (end - start) as usize;
    start + (span * done.min(total) / total) as u8
}

pub struct Pipeline {
    config: Arc<WorkerConfig>,
    repo: Arc<dyn JobRepository>,
    script: ScriptSynthesizer,
    analyzer: SceneContextAnalyzer,
    consistency: ConsistencyEngine,
    scheduler: AssetScheduler,
    assembler: Assembler,
    policy: DurationPolicy,
}

impl Pipeline {
    pub fn new(config: Arc<WorkerConfig>, repo: Arc<dyn JobRepository>, collaborators: Collaborators) -> Self {
        let retry = RetryConfig::new("collaborator")
            .with_max_retries(config.asset_max_retries)
            .with_base_delay(config.retry_base_delay)
            .with_attempt_timeout(config.collaborator_timeout);

        Self {
            script: ScriptSynthesizer::new(collaborators.text.clone(), retry.clone()),
            analyzer: SceneContextAnalyzer::new(collaborators.text, config.collaborator_timeout),
            consistency: ConsistencyEngine::new(config.similarity_threshold),
            scheduler: AssetScheduler::new(
                collaborators.images,
                collaborators.voices,
                config.max_parallel_images,
                config.max_parallel_voices,
                config.voice_rate,
                retry,
            ),
            assembler: Assembler::new(
                collaborators.encoder,
                config.fps,
                config.max_parallel_encodes,
                config.duration_tolerance_secs,
            ),
            policy: DurationPolicy::new(config.min_segment_secs, config.duration_tolerance_secs),
            config,
            repo,
        }
    }

    /// Drive `job` from its current status to `Completed`.
    ///
    /// Returns `Err(Cancelled)` when the flag is raised between steps; the
    /// caller decides what a stop means for the stored job.
    pub async fn run(
        &self,
        job: &mut Job,
        cancel: &CancelFlag,
        status: &watch::Sender<JobStatusView>,
    ) -> PipelineResult<()> {
        let logger = JobLogger::new(&job.id, "video_generation");
        let span = logger.create_span();
        self.run_stages(job, cancel, status, &logger)
            .instrument(span)
            .await
    }

    async fn run_stages(
        &self,
        job: &mut Job,
        cancel: &CancelFlag,
        status: &watch::Sender<JobStatusView>,
        logger: &JobLogger,
    ) -> PipelineResult<()> {
        logger.log_start(&format!("entering at {}", job.status));
        loop {
            cancel.check()?;
            let stage = job.status;
            let started = Instant::now();

            let span = logger.scoped(stage.as_str()).create_span();
            match stage {
                JobStatus::Pending => {
                    self.advance(job, JobStatus::ScriptGeneration, "Writing script", status, logger)
                        .await?
                }
                JobStatus::ScriptGeneration => {
                    self.script_stage(job, cancel, status, logger)
                        .instrument(span)
                        .await?
                }
                JobStatus::ContextAnalysis => {
                    self.context_stage(job, status, logger).instrument(span).await?
                }
                JobStatus::AssetGeneration => {
                    self.asset_stage(job, cancel, status, logger)
                        .instrument(span)
                        .await?
                }
                JobStatus::Assembly => {
                    self.assembly_stage(job, cancel, status, logger)
                        .instrument(span)
                        .await?
                }
                JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => return Ok(()),
            }

            if stage != JobStatus::Pending {
                metrics::record_stage_duration(stage.as_str(), started.elapsed().as_secs_f64());
            }
        }
    }

    async fn advance(
        &self,
        job: &mut Job,
        to: JobStatus,
        message: &str,
        status: &watch::Sender<JobStatusView>,
        logger: &JobLogger,
    ) -> PipelineResult<()> {
        let from = job.status;
        job.transition(to)?;
        job.progress_message = message.to_string();
        self.repo.save(job).await?;
        status.send_replace(job.status_view());
        logger.log_transition(from, to, job.progress);
        Ok(())
    }

    async fn report(
        &self,
        job: &mut Job,
        progress: u8,
        message: String,
        status: &watch::Sender<JobStatusView>,
    ) -> PipelineResult<()> {
        job.set_progress(progress, message);
        self.repo.save(job).await?;
        status.send_replace(job.status_view());
        Ok(())
    }

    async fn script_stage(
        &self,
        job: &mut Job,
        cancel: &CancelFlag,
        status: &watch::Sender<JobStatusView>,
        logger: &JobLogger,
    ) -> PipelineResult<()> {
        let script = self.script.synthesize(&job.params, cancel).await?;
        verify_segment_order(&script.segments, script.segments.len())?;
        logger.log_progress(&format!(
            "Script '{}' with {} segments",
            script.title,
            script.segments.len()
        ));

        // A retried stage starts from an empty segment list.
        job.narrative = Some(script.narrative);
        job.scene_context = None;
        job.segments.clear();
        job.narration_path = None;
        job.narration_duration = None;
        self.repo.save(job).await?;

        for segment in script.segments {
            self.repo.append_segment(&job.id, &segment).await?;
            job.segments.push(segment);
        }

        let count = job.segments.len();
        self.report(job, 12, format!("Script ready: {} segments", count), status)
            .await?;
        self.advance(job, JobStatus::ContextAnalysis, "Analyzing scene context", status, logger)
            .await
    }

    async fn context_stage(
        &self,
        job: &mut Job,
        status: &watch::Sender<JobStatusView>,
        logger: &JobLogger,
    ) -> PipelineResult<()> {
        let expected = job.segments.len();
        if expected == 0 {
            return Err(PipelineError::index_corruption("no segments to analyze"));
        }
        verify_segment_order(&job.segments, expected)?;

        let narrative = match &job.narrative {
            Some(narrative) => narrative.clone(),
            None => job
                .segments
                .iter()
                .map(|s| s.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        };
        let context = self.analyzer.analyze(&narrative, &job.params.art_style).await;
        if context.is_fallback {
            logger.log_warning("Scene context unavailable, using heuristic defaults");
        }

        let report = self.consistency.apply(&mut job.segments, &context)?;
        verify_segment_order(&job.segments, expected)?;
        job.scene_context = Some(context);

        self.report(
            job,
            22,
            format!("Scenes checked: {} corrections", report.corrections.len()),
            status,
        )
        .await?;
        self.advance(
            job,
            JobStatus::AssetGeneration,
            "Generating images and narration",
            status,
            logger,
        )
        .await
    }

    async fn asset_stage(
        &self,
        job: &mut Job,
        cancel: &CancelFlag,
        status: &watch::Sender<JobStatusView>,
        logger: &JobLogger,
    ) -> PipelineResult<()> {
        let expected = job.segments.len();
        verify_segment_order(&job.segments, expected)?;

        let job_dir = self.config.job_dir(&job.id);
        let snapshot = job.segments.clone();
        let plan = self.scheduler.plan(&snapshot);
        let total = plan.total();
        if total < expected * 2 {
            logger.log_progress(&format!("Resuming with {} assets outstanding", total));
        }

        let voice = job.params.voice.clone();
        let art_style = job.params.art_style.clone();
        let request = AssetRequest {
            job_dir: &job_dir,
            voice: &voice,
            image_size: job.params.aspect_ratio.image_size(),
            art_style: &art_style,
        };

        let (tx, mut rx) = mpsc::channel(expected.max(1) * 2);
        let work = self.scheduler.generate(&plan, &snapshot, &request, cancel, tx);
        tokio::pin!(work);

        let mut done = 0;
        let outcome = loop {
            tokio::select! {
                result = &mut work => break result,
                Some(event) = rx.recv() => {
                    done += 1;
                    self.checkpoint(job, event, done, total, status).await?;
                }
            }
        };
        while let Ok(event) = rx.try_recv() {
            done += 1;
            self.checkpoint(job, event, done, total, status).await?;
        }
        outcome?;

        verify_segment_order(&job.segments, expected)?;
        if let Some(missing) = job.segments.iter().find(|s| !s.has_assets()) {
            return Err(PipelineError::index_corruption(format!(
                "segment {} is missing assets",
                missing.index
            )));
        }

        self.reconcile_stage(job, &job_dir, status, logger).await
    }

    async fn checkpoint(
        &self,
        job: &mut Job,
        event: AssetEvent,
        done: usize,
        total: usize,
        status: &watch::Sender<JobStatusView>,
    ) -> PipelineResult<()> {
        match event {
            AssetEvent::ImageReady { indices, path } => {
                for index in indices {
                    let segment = job.segments.get_mut(index).ok_or_else(|| {
                        PipelineError::index_corruption(format!("image for unknown segment {}", index))
                    })?;
                    segment.image_path = Some(path.clone());
                }
            }
            AssetEvent::VoiceReady { index, clip } => {
                let segment = job.segments.get_mut(index).ok_or_else(|| {
                    PipelineError::index_corruption(format!("voice for unknown segment {}", index))
                })?;
                segment.voice_path = Some(clip.path);
                segment.voice_duration = Some(clip.duration);
            }
        }

        self.report(
            job,
            band(25, 73, done, total),
            format!("Generated {}/{} assets", done, total),
            status,
        )
        .await
    }

    /// Measure the joined narration and fit segment durations to it.
    async fn reconcile_stage(
        &self,
        job: &mut Job,
        job_dir: &std::path::Path,
        status: &watch::Sender<JobStatusView>,
        logger: &JobLogger,
    ) -> PipelineResult<()> {
        let (narration, measured) = self.assembler.narration(&job.segments, job_dir).await?;

        let voiced: Option<Vec<f64>> = job.segments.iter().map(|s| s.voice_duration).collect();
        let estimates = match voiced {
            Some(durations) if durations.iter().all(|d| *d > 0.0) => durations,
            _ => job.segments.iter().map(|s| s.duration).collect(),
        };
        let durations = reconcile(&estimates, measured, self.policy)?;
        for (segment, duration) in job.segments.iter_mut().zip(durations) {
            segment.duration = duration;
        }
        job.narration_path = Some(narration);
        job.narration_duration = Some(measured);
        logger.log_progress(&format!("Narration measured at {:.2}s", measured));

        self.report(job, 74, format!("Narration is {:.1}s", measured), status)
            .await?;
        self.advance(job, JobStatus::Assembly, "Animating and assembling", status, logger)
            .await
    }

    async fn assembly_stage(
        &self,
        job: &mut Job,
        cancel: &CancelFlag,
        status: &watch::Sender<JobStatusView>,
        logger: &JobLogger,
    ) -> PipelineResult<()> {
        verify_segment_order(&job.segments, job.segments.len())?;
        let (narration, narration_duration) = match (&job.narration_path, job.narration_duration) {
            (Some(path), Some(duration)) if path.exists() => (path.clone(), duration),
            _ => {
                return Err(PipelineError::duration_mismatch(
                    "no measured narration track to assemble against",
                ))
            }
        };

        let job_dir = self.config.job_dir(&job.id);
        let output = self.config.output_path(&job.id);
        let subtitles = crate::subtitles::preset(job.params.subtitle_style);
        let base = job.status_view();
        let on_clip = |done: usize, total: usize| {
            let mut view = base.clone();
            view.progress = view.progress.max(band(75, 98, done, total));
            view.progress_message = format!("Animated {}/{} clips", done, total);
            status.send_replace(view);
        };

        let path = self
            .assembler
            .assemble(
                &job.segments,
                job.params.aspect_ratio.frame_size(),
                &narration,
                narration_duration,
                &job_dir,
                &output,
                subtitles.as_ref(),
                cancel,
                &on_clip,
            )
            .await?;

        job.output_path = Some(path);
        self.report(job, 99, "Finalizing".to_string(), status).await?;
        self.advance(job, JobStatus::Completed, "Done", status, logger)
            .await?;
        logger.log_completion(&format!(
            "{} ({:.2}s)",
            self.config.output_path(&job.id).display(),
            narration_duration
        ));
        Ok(())
    }
}
