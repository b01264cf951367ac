//! Persistence for analysis requests.
//!
//! Repositories enforce the lifecycle at the storage boundary as well:
//! an update that would move a request backwards, or touch one that has
//! already finished, is rejected with the stored record left intact.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sanzero_core::{AnalysisRequest, AnalysisStatus, RequestId, TransitionError};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::StoreError;

#[async_trait]
pub trait RequestRepository: Send + Sync {
    /// Store a new request. Fails if the id is already present.
    async fn insert(&self, request: &AnalysisRequest) -> Result<(), StoreError>;

    async fn get(&self, id: RequestId) -> Result<Option<AnalysisRequest>, StoreError>;

    /// Overwrite a stored request with a later state of itself.
    async fn update(&self, request: &AnalysisRequest) -> Result<(), StoreError>;

    /// A user's requests, newest first, optionally filtered by status.
    async fn list_for_user(
        &self,
        user_id: &str,
        limit: usize,
        status: Option<AnalysisStatus>,
    ) -> Result<Vec<AnalysisRequest>, StoreError>;
}

fn check_update(stored: &AnalysisRequest, next: &AnalysisRequest) -> Result<(), StoreError> {
    let allowed = !stored.is_terminal()
        && (stored.status == next.status || stored.status.can_transition_to(next.status));
    if allowed {
        Ok(())
    } else {
        Err(TransitionError {
            id: stored.id,
            from: stored.status,
            to: next.status,
        }
        .into())
    }
}

fn select_for_user<'a>(
    requests: impl Iterator<Item = &'a AnalysisRequest>,
    user_id: &str,
    limit: usize,
    status: Option<AnalysisStatus>,
) -> Vec<AnalysisRequest> {
    let mut selected: Vec<AnalysisRequest> = requests
        .filter(|r| r.user_id == user_id)
        .filter(|r| status.is_none_or(|s| r.status == s))
        .cloned()
        .collect();
    selected.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
    selected.truncate(limit);
    selected
}

// ── In-memory ──

#[derive(Default)]
pub struct InMemoryRequestRepository {
    requests: RwLock<HashMap<RequestId, AnalysisRequest>>,
}

impl InMemoryRequestRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn insert(&self, request: &AnalysisRequest) -> Result<(), StoreError> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(&request.id) {
            return Err(StoreError::RequestExists(request.id));
        }
        requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn get(&self, id: RequestId) -> Result<Option<AnalysisRequest>, StoreError> {
        Ok(self.requests.read().await.get(&id).cloned())
    }

    async fn update(&self, request: &AnalysisRequest) -> Result<(), StoreError> {
        let mut requests = self.requests.write().await;
        let stored = requests
            .get_mut(&request.id)
            .ok_or(StoreError::RequestNotFound(request.id))?;
        check_update(stored, request)?;
        *stored = request.clone();
        Ok(())
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        limit: usize,
        status: Option<AnalysisStatus>,
    ) -> Result<Vec<AnalysisRequest>, StoreError> {
        let requests = self.requests.read().await;
        Ok(select_for_user(requests.values(), user_id, limit, status))
    }
}

// ── JSON directory ──

/// One `<id>.json` file per request.
pub struct JsonDirRepository {
    dir: PathBuf,
    /// Serializes read-check-write sequences.
    write_lock: Mutex<()>,
}

impl JsonDirRepository {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        debug!(dir = %dir.display(), "opened request directory");
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: RequestId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    async fn read(&self, id: RequestId) -> Result<Option<AnalysisRequest>, StoreError> {
        match tokio::fs::read(self.path_for(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write via a temporary file so readers never see a partial record.
    async fn write(&self, request: &AnalysisRequest) -> Result<(), StoreError> {
        let path = self.path_for(request.id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(request)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl RequestRepository for JsonDirRepository {
    async fn insert(&self, request: &AnalysisRequest) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        if tokio::fs::try_exists(self.path_for(request.id)).await? {
            return Err(StoreError::RequestExists(request.id));
        }
        self.write(request).await
    }

    async fn get(&self, id: RequestId) -> Result<Option<AnalysisRequest>, StoreError> {
        self.read(id).await
    }

    async fn update(&self, request: &AnalysisRequest) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let stored = self
            .read(request.id)
            .await?
            .ok_or(StoreError::RequestNotFound(request.id))?;
        check_update(&stored, request)?;
        self.write(request).await
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        limit: usize,
        status: Option<AnalysisStatus>,
    ) -> Result<Vec<AnalysisRequest>, StoreError> {
        let mut all = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            all.push(serde_json::from_slice::<AnalysisRequest>(&bytes)?);
        }
        Ok(select_for_user(all.iter(), user_id, limit, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sanzero_core::{AnalysisResult, AnalysisType, FailureKind};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn request(user: &str) -> AnalysisRequest {
        AnalysisRequest::new(user, None, "fell from scaffolding", AnalysisType::Comprehensive)
    }

    async fn lifecycle_rules(repo: Arc<dyn RequestRepository>) {
        let mut r = request("u1");
        repo.insert(&r).await.unwrap();
        assert!(matches!(
            repo.insert(&r).await,
            Err(StoreError::RequestExists(_))
        ));

        r.start().unwrap();
        repo.update(&r).await.unwrap();
        r.complete(AnalysisResult::default(), 12).unwrap();
        repo.update(&r).await.unwrap();

        let stored = repo.get(r.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AnalysisStatus::Completed);
        assert_eq!(stored.processing_time_ms, Some(12));

        // A stale copy cannot overwrite the finished record.
        let mut stale = request("u1");
        stale.id = r.id;
        stale.start().unwrap();
        stale.fail(FailureKind::Internal, "late failure", 1).unwrap();
        assert!(matches!(
            repo.update(&stale).await,
            Err(StoreError::Transition(_))
        ));
        assert_eq!(
            repo.get(r.id).await.unwrap().unwrap().status,
            AnalysisStatus::Completed
        );

        let unknown = request("u1");
        assert!(matches!(
            repo.update(&unknown).await,
            Err(StoreError::RequestNotFound(_))
        ));
    }

    async fn listing(repo: Arc<dyn RequestRepository>) {
        let mut ids = Vec::new();
        for i in 0..4 {
            let mut r = request("u1");
            r.created_at += chrono::Duration::seconds(i);
            if i % 2 == 0 {
                r.start().unwrap();
            }
            repo.insert(&r).await.unwrap();
            ids.push(r.id);
        }
        repo.insert(&request("u2")).await.unwrap();

        let listed = repo.list_for_user("u1", 10, None).await.unwrap();
        let listed_ids: Vec<RequestId> = listed.iter().map(|r| r.id).collect();
        let expected: Vec<RequestId> = ids.iter().rev().copied().collect();
        assert_eq!(listed_ids, expected, "newest first");

        assert_eq!(repo.list_for_user("u1", 2, None).await.unwrap().len(), 2);
        let processing = repo
            .list_for_user("u1", 10, Some(AnalysisStatus::Processing))
            .await
            .unwrap();
        assert_eq!(processing.len(), 2);
        assert!(repo.list_for_user("nobody", 10, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn in_memory_lifecycle() {
        lifecycle_rules(Arc::new(InMemoryRequestRepository::new())).await;
    }

    #[tokio::test]
    async fn in_memory_listing() {
        listing(Arc::new(InMemoryRequestRepository::new())).await;
    }

    #[tokio::test]
    async fn json_dir_lifecycle() {
        let tmp = TempDir::new().unwrap();
        let repo = JsonDirRepository::open(tmp.path().join("requests")).await.unwrap();
        lifecycle_rules(Arc::new(repo)).await;
    }

    #[tokio::test]
    async fn json_dir_listing() {
        let tmp = TempDir::new().unwrap();
        let repo = JsonDirRepository::open(tmp.path()).await.unwrap();
        listing(Arc::new(repo)).await;
    }

    #[tokio::test]
    async fn json_dir_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let r = request("u1");
        {
            let repo = JsonDirRepository::open(tmp.path()).await.unwrap();
            repo.insert(&r).await.unwrap();
        }
        let repo = JsonDirRepository::open(tmp.path()).await.unwrap();
        let stored = repo.get(r.id).await.unwrap().unwrap();
        assert_eq!(stored, r);
        assert!(repo.get(RequestId::new()).await.unwrap().is_none());
    }
}
