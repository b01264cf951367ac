//! Request lifecycle manager.
//!
//! `submit_analysis` persists a pending request and returns its id at once;
//! the analysis runs on its own tokio task. Each task races the analysis
//! against its cancellation signal and the soft deadline, then writes exactly
//! one terminal state. Repository writes are retried a few times; a request
//! whose processing state cannot be recorded fails as `Internal` rather than
//! being left pending.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use sanzero_core::{
    AnalysisRequest, AnalysisStatus, AnalysisType, FailureKind, RequestId, validate_query_text,
};
use sanzero_store::{RequestRepository, StoreError};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{Instrument, error, info, info_span, warn};

use crate::{AnalysisFailure, Engine, EngineError, ServiceContext};

/// Repository writes per state change before giving up.
const PERSIST_ATTEMPTS: u32 = 3;
const PERSIST_BACKOFF: Duration = Duration::from_millis(50);

/// Handle to an in-flight request.
struct Running {
    cancel: watch::Sender<bool>,
    done: watch::Receiver<bool>,
}

pub struct AnalysisManager {
    engine: Engine,
    running: Arc<DashMap<RequestId, Running>>,
    tasks: Mutex<JoinSet<()>>,
    shutdown: watch::Sender<bool>,
}

impl AnalysisManager {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self {
            engine: Engine::new(ctx),
            running: Arc::new(DashMap::new()),
            tasks: Mutex::new(JoinSet::new()),
            shutdown: watch::Sender::new(false),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    fn ctx(&self) -> &ServiceContext {
        self.engine.context()
    }

    /// Create a pending request and start processing it in the background.
    pub async fn submit_analysis(
        &self,
        user_id: &str,
        query_text: &str,
        analysis_type: AnalysisType,
    ) -> Result<RequestId, EngineError> {
        self.submit(user_id, None, query_text, analysis_type).await
    }

    pub async fn submit(
        &self,
        user_id: &str,
        application_id: Option<String>,
        query_text: &str,
        analysis_type: AnalysisType,
    ) -> Result<RequestId, EngineError> {
        if *self.shutdown.borrow() {
            return Err(EngineError::ShuttingDown);
        }
        validate_query_text(query_text)?;

        let request = AnalysisRequest::new(user_id, application_id, query_text.trim(), analysis_type);
        let id = request.id;
        self.ctx().requests.insert(&request).await?;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);
        self.running.insert(
            id,
            Running {
                cancel: cancel_tx,
                done: done_rx,
            },
        );
        let shutdown_rx = self.shutdown.subscribe();

        let span = info_span!("analysis", request_id = %id, user_id = %user_id, kind = %analysis_type);
        let engine = self.engine.clone();
        let running = Arc::clone(&self.running);
        let deadline = Duration::from_secs(self.ctx().config.lifecycle.soft_deadline_secs);
        let task = async move {
            process(&engine, request, cancelled(cancel_rx, shutdown_rx), deadline).await;
            running.remove(&id);
            let _ = done_tx.send(true);
        };
        if let Err(task) = self.track(task.instrument(span)) {
            // Shutdown started after the check above. The shutdown signal is
            // already set, so this records the request as cancelled.
            task.await;
            return Err(EngineError::ShuttingDown);
        }

        info!(request_id = %id, kind = %analysis_type, "analysis submitted");
        Ok(id)
    }

    /// Current snapshot of a request.
    pub async fn get_analysis(&self, id: RequestId) -> Result<AnalysisRequest, EngineError> {
        self.ctx()
            .requests
            .get(id)
            .await?
            .ok_or(EngineError::RequestNotFound(id))
    }

    /// Spawn onto the task set, or hand the task back once shutdown has begun.
    ///
    /// The flag is read under the set's lock, and `shutdown` raises it before
    /// taking that lock, so every spawned task is one `shutdown` awaits.
    fn track<F>(&self, task: F) -> Result<(), F>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if *self.shutdown.borrow() {
            return Err(task);
        }
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
        Ok(())
    }

    /// Request cancellation. Returns `false` if the request had already finished.
    pub async fn cancel(&self, id: RequestId) -> Result<bool, EngineError> {
        if let Some(running) = self.running.get(&id) {
            running.cancel.send_replace(true);
            info!(request_id = %id, "cancellation requested");
            return Ok(true);
        }
        self.get_analysis(id).await?;
        Ok(false)
    }

    /// Wait until a request reaches a terminal state, then return it.
    pub async fn wait(&self, id: RequestId) -> Result<AnalysisRequest, EngineError> {
        let done = self.running.get(&id).map(|r| r.done.clone());
        if let Some(mut done) = done {
            // A closed channel means the task is gone and the record is final.
            let _ = done.wait_for(|finished| *finished).await;
        }
        self.get_analysis(id).await
    }

    /// A user's recent requests, newest first.
    pub async fn list_for_user(
        &self,
        user_id: &str,
        limit: Option<usize>,
        status: Option<AnalysisStatus>,
    ) -> Result<Vec<AnalysisRequest>, EngineError> {
        let limit = limit.unwrap_or(self.ctx().config.lifecycle.history_limit);
        Ok(self
            .ctx()
            .requests
            .list_for_user(user_id, limit, status)
            .await?)
    }

    /// Number of requests still being processed.
    pub fn in_flight(&self) -> usize {
        self.running.len()
    }

    /// Cancel outstanding work and wait for every task to record its outcome.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let mut tasks =
            std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "analysis task aborted");
            }
        }
        info!("analysis manager stopped");
    }
}

/// Resolves once the request or the whole manager is cancelled.
async fn cancelled(mut request: watch::Receiver<bool>, mut shutdown: watch::Receiver<bool>) {
    // `wait_for` yields a borrow guard; drop it inside each branch so the
    // future stays `Send`.
    tokio::select! {
        Ok(()) = async { request.wait_for(|c| *c).await.map(|_| ()) } => {}
        Ok(()) = async { shutdown.wait_for(|s| *s).await.map(|_| ()) } => {}
        else => std::future::pending::<()>().await,
    }
}

/// Write `request`, retrying transient repository failures.
async fn persist(repo: &dyn RequestRepository, request: &AnalysisRequest) -> Result<(), StoreError> {
    let mut attempt = 1;
    loop {
        match repo.update(request).await {
            Ok(()) => return Ok(()),
            Err(e @ StoreError::Transition(_)) => return Err(e),
            Err(e) if attempt < PERSIST_ATTEMPTS => {
                warn!(attempt, status = %request.status, error = %e, "request update failed, retrying");
                tokio::time::sleep(PERSIST_BACKOFF * attempt).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn process(
    engine: &Engine,
    mut request: AnalysisRequest,
    cancel: impl Future<Output = ()>,
    deadline: Duration,
) {
    let repo = engine.context().requests.as_ref();
    let started = Instant::now();

    if let Err(e) = request.start() {
        error!(error = %e, "request could not start");
        return;
    }
    let processing = match persist(repo, &request).await {
        Ok(()) => {
            info!(status = %request.status, "processing");
            None
        }
        Err(e) => {
            error!(error = %e, "failed to persist processing state");
            Some((request.clone(), e))
        }
    };

    let outcome = match &processing {
        Some((_, e)) => Err(AnalysisFailure::new(
            FailureKind::Internal,
            format!("could not record processing state: {e}"),
        )),
        None => tokio::select! {
            biased;
            _ = cancel => Err(AnalysisFailure::new(
                FailureKind::Cancelled,
                "cancelled before completion",
            )),
            r = tokio::time::timeout(deadline, engine.analyze(&request.query_text, request.analysis_type)) => {
                match r {
                    Ok(result) => result,
                    Err(_) => Err(AnalysisFailure::new(
                        FailureKind::DeadlineExceeded,
                        format!("processing exceeded {}s", deadline.as_secs()),
                    )),
                }
            }
        },
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let transition = match outcome {
        Ok(result) => request.complete(result, elapsed_ms),
        Err(failure) => {
            warn!(kind = ?failure.kind, error = %failure.message, "analysis failed");
            request.fail(failure.kind, failure.message, elapsed_ms)
        }
    };
    if let Err(e) = transition {
        error!(error = %e, "invalid terminal transition");
        return;
    }

    // The stored record is still pending; it has to pass through processing.
    if let Some((snapshot, _)) = &processing {
        if let Err(e) = persist(repo, snapshot).await {
            error!(error = %e, "request left pending, repository unavailable");
            return;
        }
    }
    match persist(repo, &request).await {
        Ok(()) => info!(status = %request.status, elapsed_ms, "analysis finished"),
        Err(e) => error!(error = %e, "failed to persist terminal state"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        CountingClassifier, FixedEmbedder, FlakyRepository, PendingEmbedder, SlowSummarizer,
        UnavailableIndex, precedent, store_with,
    };
    use std::sync::atomic::{AtomicBool, Ordering};
    use sanzero_core::{EngineConfig, SummarySource, Tier};

    fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.embedding.dim = 4;
        config
    }

    fn manager(ctx: ServiceContext) -> AnalysisManager {
        AnalysisManager::new(Arc::new(ctx))
    }

    fn similarity_ctx() -> ServiceContext {
        ServiceContext::builder(config())
            .embedder(Arc::new(FixedEmbedder(vec![1.0, 0.0, 0.0, 0.0])))
            .index(store_with(vec![
                precedent("2019-001", [1.0, 0.0, 0.0, 0.0], 8),
                precedent("2019-002", [0.9, 0.1, 0.0, 0.0], 8),
            ]))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn submitted_request_completes() {
        let m = manager(similarity_ctx());
        let id = m
            .submit_analysis("u1", "crushed hand in press", AnalysisType::Comprehensive)
            .await
            .unwrap();

        let done = m.wait(id).await.unwrap();
        assert_eq!(done.status, AnalysisStatus::Completed);
        assert!(done.processing_time_ms.is_some());
        assert!(done.started_at.is_some() && done.finished_at.is_some());
        assert!(done.error_message.is_none());
        let result = done.result.unwrap();
        assert_eq!(result.prediction.unwrap().tier_used, Tier::Similarity);
        assert_eq!(m.in_flight(), 0);
    }

    #[tokio::test]
    async fn invalid_query_rejected_without_record() {
        let m = manager(similarity_ctx());
        let err = m
            .submit_analysis("u1", "1234", AnalysisType::Comprehensive)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidQuery(_)));
        assert!(m.list_for_user("u1", None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_fails_with_cancelled_kind() {
        let classifier = Arc::new(CountingClassifier::default());
        let ctx = ServiceContext::builder(config())
            .embedder(Arc::new(PendingEmbedder))
            .classifier(classifier.clone())
            .build()
            .unwrap();
        let m = manager(ctx);

        let id = m
            .submit_analysis("u1", "fell from scaffolding", AnalysisType::Comprehensive)
            .await
            .unwrap();
        assert!(m.cancel(id).await.unwrap());

        let done = m.wait(id).await.unwrap();
        assert_eq!(done.status, AnalysisStatus::Failed);
        assert_eq!(done.failure, Some(FailureKind::Cancelled));
        assert_eq!(done.user_message(), Some(FailureKind::Cancelled.user_message()));
        assert!(done.result.is_none());
        assert_eq!(classifier.calls(), 0, "no tier runs after cancellation");

        assert!(!m.cancel(id).await.unwrap(), "finished requests cannot be cancelled");
        assert!(matches!(
            m.cancel(RequestId::new()).await,
            Err(EngineError::RequestNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn soft_deadline_fails_request() {
        let mut config = config();
        config.lifecycle.soft_deadline_secs = 5;
        let ctx = ServiceContext::builder(config)
            .embedder(Arc::new(PendingEmbedder))
            .build()
            .unwrap();
        let m = manager(ctx);

        let id = m
            .submit_analysis("u1", "fell from scaffolding", AnalysisType::Comprehensive)
            .await
            .unwrap();
        let done = m.wait(id).await.unwrap();
        assert_eq!(done.failure, Some(FailureKind::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_summarizer_still_completes() {
        let ctx = ServiceContext::builder(config())
            .embedder(Arc::new(FixedEmbedder(vec![1.0, 0.0, 0.0, 0.0])))
            .index(store_with(vec![precedent("2019-001", [1.0, 0.0, 0.0, 0.0], 8)]))
            .summarizer(Arc::new(SlowSummarizer))
            .build()
            .unwrap();
        let m = manager(ctx);

        let id = m
            .submit_analysis("u1", "crushed hand in press", AnalysisType::Comprehensive)
            .await
            .unwrap();
        let done = m.wait(id).await.unwrap();
        assert_eq!(done.status, AnalysisStatus::Completed);
        let summary = done.result.unwrap().summary.unwrap();
        assert_eq!(summary.source, SummarySource::Templated);
        assert!(summary.text.contains("2019-001"));
    }

    #[tokio::test]
    async fn history_lists_newest_first() {
        let m = manager(similarity_ctx());
        let mut ids = Vec::new();
        for text in ["first injury case", "second injury case", "third injury case"] {
            let id = m
                .submit_analysis("u1", text, AnalysisType::DisabilityPrediction)
                .await
                .unwrap();
            m.wait(id).await.unwrap();
            ids.push(id);
        }
        m.submit_analysis("u2", "other user case", AnalysisType::PrecedentSearch)
            .await
            .unwrap();

        let history = m.list_for_user("u1", Some(2), None).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, ids[2]);
        assert_eq!(history[1].id, ids[1]);

        let completed = m
            .list_for_user("u1", None, Some(AnalysisStatus::Completed))
            .await
            .unwrap();
        assert_eq!(completed.len(), 3);
    }

    #[tokio::test]
    async fn shutdown_cancels_outstanding_work() {
        let ctx = ServiceContext::builder(config())
            .embedder(Arc::new(PendingEmbedder))
            .build()
            .unwrap();
        let m = manager(ctx);

        let id = m
            .submit_analysis("u1", "fell from scaffolding", AnalysisType::Comprehensive)
            .await
            .unwrap();
        m.shutdown().await;

        let done = m.get_analysis(id).await.unwrap();
        assert_eq!(done.failure, Some(FailureKind::Cancelled));
        assert!(matches!(
            m.submit_analysis("u1", "fell from scaffolding", AnalysisType::Comprehensive)
                .await,
            Err(EngineError::ShuttingDown)
        ));
    }

    #[tokio::test]
    async fn concurrent_requests_are_independent() {
        let m = Arc::new(manager(similarity_ctx()));
        let submits = (0..8).map(|i| {
            let m = Arc::clone(&m);
            async move {
                m.submit_analysis("u1", &format!("case number {i} crushed hand"), AnalysisType::Comprehensive)
                    .await
                    .unwrap()
            }
        });
        let ids = futures::future::join_all(submits).await;
        for id in ids {
            let done = m.wait(id).await.unwrap();
            assert_eq!(done.status, AnalysisStatus::Completed);
        }
    }

    #[test]
    fn cancellation_future_is_send() {
        fn assert_send<T: Send>(_: &T) {}
        let (_cancel, cancel_rx) = watch::channel(false);
        let (_shutdown, shutdown_rx) = watch::channel(false);
        assert_send(&cancelled(cancel_rx, shutdown_rx));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_repository_failure_is_retried() {
        let repo = Arc::new(FlakyRepository::new(1));
        let ctx = ServiceContext::builder(config())
            .embedder(Arc::new(FixedEmbedder(vec![1.0, 0.0, 0.0, 0.0])))
            .index(store_with(vec![precedent("2019-001", [1.0, 0.0, 0.0, 0.0], 8)]))
            .requests(repo.clone())
            .build()
            .unwrap();
        let m = manager(ctx);

        let id = m
            .submit_analysis("u1", "crushed hand in press", AnalysisType::Comprehensive)
            .await
            .unwrap();
        let done = m.wait(id).await.unwrap();
        assert_eq!(done.status, AnalysisStatus::Completed);
        assert_eq!(repo.updates(), 3, "one failed and one retried processing write, one terminal");
    }

    #[tokio::test(start_paused = true)]
    async fn unrecordable_processing_state_fails_internal() {
        let repo = Arc::new(FlakyRepository::new(PERSIST_ATTEMPTS as usize));
        let classifier = Arc::new(CountingClassifier::default());
        let ctx = ServiceContext::builder(config())
            .classifier(classifier.clone())
            .requests(repo)
            .build()
            .unwrap();
        let m = manager(ctx);

        let id = m
            .submit_analysis("u1", "fell from scaffolding", AnalysisType::Comprehensive)
            .await
            .unwrap();
        let done = m.wait(id).await.unwrap();
        assert!(done.is_terminal());
        assert_eq!(done.status, AnalysisStatus::Failed);
        assert_eq!(done.failure, Some(FailureKind::Internal));
        assert!(done.processing_time_ms.is_some());
        assert_eq!(classifier.calls(), 0, "analysis skipped when state is not recorded");
    }

    #[tokio::test]
    async fn unavailable_index_completes_from_model_tier() {
        let ctx = ServiceContext::builder(config())
            .embedder(Arc::new(FixedEmbedder(vec![1.0, 0.0, 0.0, 0.0])))
            .index(Arc::new(UnavailableIndex))
            .classifier(Arc::new(CountingClassifier::default()))
            .build()
            .unwrap();
        let m = manager(ctx);

        let id = m
            .submit_analysis("u1", "slipped on wet floor", AnalysisType::Comprehensive)
            .await
            .unwrap();
        let done = m.wait(id).await.unwrap();
        assert_eq!(done.status, AnalysisStatus::Completed);
        let result = done.result.unwrap();
        assert_eq!(result.prediction.unwrap().tier_used, Tier::Model);
        assert!(result.citations.is_empty());
    }

    #[tokio::test]
    async fn tasks_not_tracked_after_shutdown() {
        let m = manager(similarity_ctx());
        m.shutdown().await;

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let rejected = m.track(async move { flag.store(true, Ordering::SeqCst) });
        assert!(rejected.is_err());
        assert!(m.tasks.lock().unwrap().is_empty());
        assert!(!ran.load(Ordering::SeqCst));
    }
}
