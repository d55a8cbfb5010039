//! Job orchestration.
//!
//! Every running job is one tokio task whose `JoinHandle` and control sender
//! stay in the orchestrator's map until the task has persisted a final
//! state. Callers never hold the task themselves; dropping the `JobId`
//! returned by `submit` has no effect on the job.

use reel_models::{Job, JobId, JobParams, JobStatus, JobStatusView};
use reel_store::JobRepository;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};
use validator::Validate;

use crate::cancel::{CancelFlag, Control};
use crate::config::WorkerConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::pipeline::{Collaborators, Pipeline};

struct JobHandle {
    control: watch::Sender<Control>,
    status: watch::Receiver<JobStatusView>,
    task: JoinHandle<()>,
}

struct Inner {
    config: Arc<WorkerConfig>,
    repo: Arc<dyn JobRepository>,
    pipeline: Pipeline,
    handles: Mutex<HashMap<JobId, JobHandle>>,
    permits: Arc<Semaphore>,
    running: AtomicUsize,
}

/// How a job task stopped.
enum Outcome {
    Finished(PipelineResult<()>),
    Stopped(Control),
}

/// Owns every job task for its whole lifetime.
#[derive(Clone)]
pub struct JobOrchestrator {
    inner: Arc<Inner>,
}

impl JobOrchestrator {
    pub fn new(config: WorkerConfig, repo: Arc<dyn JobRepository>, collaborators: Collaborators) -> Self {
        let config = Arc::new(config);
        let pipeline = Pipeline::new(config.clone(), repo.clone(), collaborators);
        Self {
            inner: Arc::new(Inner {
                permits: Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1))),
                config,
                repo,
                pipeline,
                handles: Mutex::new(HashMap::new()),
                running: AtomicUsize::new(0),
            }),
        }
    }

    /// Validate, persist and start a job.
    pub async fn submit(&self, owner: &str, params: JobParams) -> PipelineResult<JobId> {
        params
            .validate()
            .map_err(|e| PipelineError::InvalidRequest(e.to_string()))?;

        let job = Job::new(owner, params);
        self.inner.repo.save(&job).await?;
        metrics::record_job_submitted();
        info!(job_id = %job.id, owner, topic = %job.params.topic, "Job submitted");

        let id = job.id.clone();
        self.spawn(job).await;
        Ok(id)
    }

    /// Start a task for `job` unless one is already live. Returns whether a
    /// task was started.
    async fn spawn(&self, job: Job) -> bool {
        let mut handles = self.inner.handles.lock().await;
        if handles.contains_key(&job.id) {
            return false;
        }

        let (control, flag) = CancelFlag::channel();
        let (status_tx, status_rx) = watch::channel(job.status_view());
        let id = job.id.clone();
        let span = JobLogger::new(&id, "job").create_span();
        let task = tokio::spawn(drive(self.inner.clone(), job, flag, status_tx).instrument(span));

        handles.insert(
            id,
            JobHandle {
                control,
                status: status_rx,
                task,
            },
        );
        true
    }

    async fn load(&self, id: &JobId) -> PipelineResult<Job> {
        self.inner
            .repo
            .load(id)
            .await?
            .ok_or_else(|| PipelineError::not_found(id.as_str()))
    }

    /// Current status. Live jobs report their in-memory progress.
    pub async fn status(&self, id: &JobId) -> PipelineResult<JobStatusView> {
        if let Some(handle) = self.inner.handles.lock().await.get(id) {
            return Ok(handle.status.borrow().clone());
        }
        self.load(id).await.map(|job| job.status_view())
    }

    /// The stored job document.
    pub async fn job(&self, id: &JobId) -> PipelineResult<Job> {
        self.load(id).await
    }

    /// Wait until the job's task has finished and return the stored status.
    /// An interrupted job comes back in its non-terminal state.
    pub async fn wait(&self, id: &JobId) -> PipelineResult<JobStatusView> {
        let receiver = {
            let handles = self.inner.handles.lock().await;
            handles.get(id).map(|handle| handle.status.clone())
        };
        if let Some(mut receiver) = receiver {
            // Errors once the task is gone, which also ends the wait.
            let _ = receiver.wait_for(|view| view.is_terminal()).await;
        }
        self.load(id).await.map(|job| job.status_view())
    }

    /// Cancel a job. Returns `false` if it had already finished.
    pub async fn cancel(&self, id: &JobId) -> PipelineResult<bool> {
        let handles = self.inner.handles.lock().await;
        if let Some(handle) = handles.get(id) {
            if handle.status.borrow().is_terminal() {
                return Ok(false);
            }
            info!(job_id = %id, "Cancelling running job");
            handle.control.send_replace(Control::Cancel);
            return Ok(true);
        }

        let mut job = self.load(id).await?;
        if job.status.is_terminal() {
            return Ok(false);
        }
        self.inner.finish_cancelled(&mut job).await;
        Ok(true)
    }

    /// Re-enter the state machine of a stored, unfinished job at its
    /// persisted status. Returns `false` if the job is finished or live.
    pub async fn resume(&self, id: &JobId) -> PipelineResult<bool> {
        let job = self.load(id).await?;
        if job.status.is_terminal() {
            return Ok(false);
        }
        info!(job_id = %id, status = %job.status, "Resuming job");
        Ok(self.spawn(job).await)
    }

    /// Resume every stored job that did not reach a terminal state.
    pub async fn resume_interrupted(&self) -> PipelineResult<Vec<JobId>> {
        let mut resumed = Vec::new();
        for job in self.inner.repo.list(None).await? {
            if job.status.is_terminal() {
                continue;
            }
            let id = job.id.clone();
            if self.spawn(job).await {
                resumed.push(id);
            }
        }
        if !resumed.is_empty() {
            info!(count = resumed.len(), "Resumed interrupted jobs");
        }
        Ok(resumed)
    }

    /// Jobs, newest first, optionally for one owner.
    pub async fn list_jobs(&self, owner: Option<&str>) -> PipelineResult<Vec<JobStatusView>> {
        let jobs = self.inner.repo.list(owner).await?;
        Ok(jobs.iter().map(Job::status_view).collect())
    }

    /// Delete the work directory of a finished job, and its video unless
    /// `keep_final` is set.
    pub async fn cleanup_job(&self, id: &JobId, keep_final: bool) -> PipelineResult<()> {
        let mut job = self.load(id).await?;
        if !job.status.is_terminal() {
            return Err(PipelineError::InvalidRequest(format!(
                "job {} is still {}",
                id, job.status
            )));
        }

        remove_dir(&self.inner.config.job_dir(id)).await?;
        for segment in &mut job.segments {
            segment.image_path = None;
            segment.voice_path = None;
        }
        job.narration_path = None;
        if !keep_final {
            if let Some(output) = job.output_path.take() {
                remove_file(&output).await?;
            }
        }
        self.inner.repo.save(&job).await?;
        info!(job_id = %id, keep_final, "Job cleaned up");
        Ok(())
    }

    /// Interrupt every live job and wait for the tasks to stop. Interrupted
    /// jobs keep their persisted status and can be resumed later.
    pub async fn shutdown(&self) {
        let handles: Vec<(JobId, JobHandle)> = self.inner.handles.lock().await.drain().collect();
        if handles.is_empty() {
            return;
        }
        info!(jobs = handles.len(), "Interrupting running jobs");

        for (_, handle) in &handles {
            handle.control.send_replace(Control::Interrupt);
        }
        for (id, handle) in handles {
            let abort = handle.task.abort_handle();
            match tokio::time::timeout(self.inner.config.shutdown_timeout, handle.task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(job_id = %id, "Job task ended abnormally: {}", e),
                Err(_) => {
                    warn!(job_id = %id, "Job did not stop in time, aborting");
                    abort.abort();
                }
            }
        }
    }
}

/// Body of one job task.
async fn drive(inner: Arc<Inner>, mut job: Job, flag: CancelFlag, status: watch::Sender<JobStatusView>) {
    let logger = JobLogger::new(&job.id, "video_generation");

    let acquire = inner.permits.clone().acquire_owned();
    let stopped = flag.stopped();
    tokio::pin!(acquire, stopped);
    let permit = tokio::select! {
        permit = &mut acquire => permit.ok(),
        _ = &mut stopped => None,
    };

    let outcome = match permit {
        None => Outcome::Stopped(flag.state()),
        Some(_permit) => {
            let running = inner.running.fetch_add(1, Ordering::SeqCst) + 1;
            metrics::set_jobs_running(running);

            let outcome = {
                let run = inner.pipeline.run(&mut job, &flag, &status);
                tokio::pin!(run);
                tokio::select! {
                    result = &mut run => Outcome::Finished(result),
                    control = &mut stopped => Outcome::Stopped(control),
                }
            };

            let running = inner.running.fetch_sub(1, Ordering::SeqCst) - 1;
            metrics::set_jobs_running(running);
            outcome
        }
    };

    match outcome {
        Outcome::Finished(Ok(())) => {
            metrics::record_job_finished(job.status.as_str(), None);
        }
        Outcome::Finished(Err(PipelineError::Cancelled)) | Outcome::Stopped(_) => match flag.state() {
            // The stop raced the final save; the job is done in memory.
            Control::Cancel if job.status.is_terminal() => inner.persist_final(&job, &logger).await,
            Control::Cancel => inner.finish_cancelled(&mut job).await,
            Control::Interrupt | Control::Run => {
                logger.log_warning(&format!("Interrupted in {}, resumable", job.status));
            }
        },
        Outcome::Finished(Err(e)) => inner.finish_failed(&mut job, e, &logger).await,
    }

    status.send_replace(job.status_view());
    inner.handles.lock().await.remove(&job.id);
}

impl Inner {
    async fn persist_final(&self, job: &Job, logger: &JobLogger) {
        logger.log_warning(&format!("Stop requested after the job was {}", job.status));
        if let Err(e) = self.repo.save(job).await {
            logger.log_error(&format!("Failed to persist final state: {}", e));
        }
        metrics::record_job_finished(job.status.as_str(), None);
    }

    async fn finish_cancelled(&self, job: &mut Job) {
        let logger = JobLogger::new(&job.id, "video_generation");
        if let Err(e) = job.cancel() {
            logger.log_warning(&format!("Cannot cancel: {}", e));
            return;
        }
        self.discard_outputs(job, &logger).await;
        if let Err(e) = self.repo.save(job).await {
            logger.log_error(&format!("Failed to persist cancellation: {}", e));
        }
        metrics::record_job_finished(JobStatus::Cancelled.as_str(), None);
        logger.log_completion("cancelled");
    }

    async fn finish_failed(&self, job: &mut Job, error: PipelineError, logger: &JobLogger) {
        let category = error.category();
        logger.log_error(&format!("{} failed in {}: {}", category, job.status, error));

        if let Err(e) = job.fail(category, error.summary()) {
            logger.log_warning(&format!("Cannot mark failed: {}", e));
            return;
        }
        job.output_path = None;
        self.discard_outputs(job, logger).await;
        if let Err(e) = self.repo.save(job).await {
            logger.log_error(&format!("Failed to persist failure: {}", e));
        }
        metrics::record_job_finished(JobStatus::Failed.as_str(), Some(category.as_str()));
    }

    /// Remove the final video and the work directory of a stopped job.
    async fn discard_outputs(&self, job: &Job, logger: &JobLogger) {
        let output = self.config.output_path(&job.id);
        if let Err(e) = remove_file(&output).await {
            logger.log_warning(&format!("Failed to remove {}: {}", output.display(), e));
        }
        let job_dir = self.config.job_dir(&job.id);
        if let Err(e) = remove_dir(&job_dir).await {
            logger.log_warning(&format!("Failed to remove {}: {}", job_dir.display(), e));
        }
    }
}

async fn remove_file(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

async fn remove_dir(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
