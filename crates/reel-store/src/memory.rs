//! In-process job repository.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use reel_models::{Job, JobId, Segment};

use crate::error::{StoreError, StoreResult};
use crate::repository::{push_segment, sort_newest_first, JobRepository};

/// Repository backed by a map. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryJobRepository {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn save(&self, job: &Job) -> StoreResult<()> {
        self.jobs.write().await.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn load(&self, id: &JobId) -> StoreResult<Option<Job>> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn append_segment(&self, id: &JobId, segment: &Segment) -> StoreResult<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(id.as_str()))?;
        push_segment(job, segment)
    }

    async fn list(&self, owner: Option<&str>) -> StoreResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| owner.map_or(true, |o| job.owner == o))
            .cloned()
            .collect();
        sort_newest_first(&mut jobs);
        Ok(jobs)
    }
}
