//! JSON-file job repository.
//!
//! One document per job at `<root>/<job_id>.json`. Writes go to a sibling
//! temp file that is renamed over the document, so readers never observe a
//! partially written job.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use reel_models::{Job, JobId, Segment};

use crate::error::{StoreError, StoreResult};
use crate::repository::{push_segment, sort_newest_first, JobRepository};

/// Repository storing each job as a JSON document on disk.
#[derive(Debug)]
pub struct FileJobRepository {
    root: PathBuf,
    /// Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl FileJobRepository {
    /// Open (and create if needed) a repository rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, id: &JobId) -> StoreResult<PathBuf> {
        let valid = !id.as_str().is_empty()
            && id
                .as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.root.join(format!("{}.json", id)))
    }

    async fn read_document(&self, path: &Path) -> StoreResult<Option<Job>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_document(&self, job: &Job) -> StoreResult<()> {
        let path = self.document_path(&job.id)?;
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(job)?;

        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(job_id = %job.id, status = %job.status, "Persisted job");
        Ok(())
    }
}

#[async_trait]
impl JobRepository for FileJobRepository {
    async fn save(&self, job: &Job) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        self.write_document(job).await
    }

    async fn load(&self, id: &JobId) -> StoreResult<Option<Job>> {
        let path = self.document_path(id)?;
        self.read_document(&path).await
    }

    async fn append_segment(&self, id: &JobId, segment: &Segment) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.document_path(id)?;
        let mut job = self
            .read_document(&path)
            .await?
            .ok_or_else(|| StoreError::not_found(id.as_str()))?;
        push_segment(&mut job, segment)?;
        self.write_document(&job).await
    }

    async fn list(&self, owner: Option<&str>) -> StoreResult<Vec<Job>> {
        let mut jobs = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.read_document(&path).await {
                Ok(Some(job)) if owner.map_or(true, |o| job.owner == o) => jobs.push(job),
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable job document"),
            }
        }

        sort_newest_first(&mut jobs);
        Ok(jobs)
    }
}
