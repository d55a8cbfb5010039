//! Repository contract.

use async_trait::async_trait;
use chrono::Utc;
use reel_models::{Job, JobId, Segment};

use crate::error::{StoreError, StoreResult};

/// Persistence for jobs. The pipeline never assumes a storage engine.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert or replace the full job document.
    async fn save(&self, job: &Job) -> StoreResult<()>;

    /// Load a job, `None` if it does not exist.
    async fn load(&self, id: &JobId) -> StoreResult<Option<Job>>;

    /// Append a segment to a stored job. `segment.index` must equal the
    /// number of segments already stored.
    async fn append_segment(&self, id: &JobId, segment: &Segment) -> StoreResult<()>;

    /// Jobs, newest first, optionally restricted to one owner.
    async fn list(&self, owner: Option<&str>) -> StoreResult<Vec<Job>>;
}

pub(crate) fn push_segment(job: &mut Job, segment: &Segment) -> StoreResult<()> {
    let expected = job.segments.len();
    if segment.index != expected {
        return Err(StoreError::SegmentOutOfOrder {
            expected,
            got: segment.index,
        });
    }
    job.segments.push(segment.clone());
    job.updated_at = Utc::now();
    Ok(())
}

pub(crate) fn sort_newest_first(jobs: &mut [Job]) {
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
