// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! The inbox pipeline
//!
//! watcher -> extraction -> suggestion -> pending decision -> operator ->
//! decision log -> placement. Classification runs on a small worker pool fed
//! by the bounded job queue; operator requests call straight into
//! [`Pipeline::resolve_and_place`].

use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audit::AuditLog;
use crate::categories::CategorySet;
use crate::config::AppConfig;
use crate::db::DecisionLog;
use crate::extract::{calculate_file_hash, ExtractorRegistry};
use crate::models::{DecisionRecord, InboxItem, Suggestion};
use crate::placement::Placer;
use crate::store::DecisionStore;
use crate::suggest::{InferenceBackend, RetryPolicy, SuggestionContext, SuggestionEngine};
use crate::watcher::{scan_existing, Dispatcher, FileWatcher, InboxEvent, Job};
use crate::{AblageError, Result};

/// Where a resolved file ended up
#[derive(Debug, Clone, Serialize)]
pub struct Placement {
    pub record: DecisionRecord,
    pub destination: PathBuf,
}

pub struct Pipeline {
    inbox: PathBuf,
    extractors: Arc<ExtractorRegistry>,
    engine: SuggestionEngine,
    store: Arc<DecisionStore>,
    placer: Arc<Placer>,
    history_sample: usize,
}

impl Pipeline {
    /// Build the pipeline from configuration, opening the decision log
    pub fn new(config: &AppConfig, backend: Arc<dyn InferenceBackend>) -> Result<Self> {
        let paths = config.paths.canonicalized()?;
        let categories = CategorySet::load(&config.categories, &paths.ablage)?;
        info!(
            "Categories ({}): {}",
            categories.len(),
            categories.iter().collect::<Vec<_>>().join(", ")
        );

        let log = DecisionLog::open(paths.database())?;
        info!("Decision log: {:?}", paths.database());

        let engine = SuggestionEngine::new(
            backend,
            RetryPolicy::from(&config.ai_engine),
            config.pipeline.allow_novel_folders,
        );

        Ok(Self {
            inbox: paths.inbox.clone(),
            extractors: Arc::new(ExtractorRegistry::new(config.pipeline.max_text_chars)),
            engine,
            store: Arc::new(DecisionStore::new(log, categories)),
            placer: Arc::new(Placer::new(paths.ablage.clone(), AuditLog::new(paths.audit_log()))),
            history_sample: config.pipeline.history_sample,
        })
    }

    pub fn inbox(&self) -> &Path {
        &self.inbox
    }

    pub fn store(&self) -> &DecisionStore {
        &self.store
    }

    pub fn extractors(&self) -> &ExtractorRegistry {
        &self.extractors
    }

    /// Read, extract and hash one inbox file
    pub async fn inspect(&self, path: &Path) -> Result<InboxItem> {
        let path = &item_id(path)?;
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|_| AblageError::NotFound(path.to_path_buf()))?;

        let extractors = Arc::clone(&self.extractors);
        let owned = path.to_path_buf();
        let (extraction, hash) = tokio::task::spawn_blocking(move || {
            let extraction = extractors.extract(&owned);
            let hash = calculate_file_hash(&owned);
            (extraction, hash)
        })
        .await
        .map_err(|e| AblageError::Store(format!("extraction task failed: {}", e)))?;

        if let Some(diagnostic) = &extraction.diagnostic {
            debug!("{:?}: {}", path, diagnostic);
        }

        Ok(InboxItem {
            id: path.to_path_buf(),
            kind: extraction.kind,
            size: metadata.len(),
            text: extraction.text,
            diagnostic: extraction.diagnostic,
            content_hash: hash?,
            discovered_at: Utc::now(),
        })
    }

    /// Suggest without publishing; used by the one-shot CLI
    pub async fn suggest_for(&self, path: &Path) -> Result<(InboxItem, Suggestion)> {
        let item = self.inspect(path).await?;
        let history = self.store.recent_decisions(self.history_sample)?;
        let frequencies = self.store.folder_frequencies()?;
        let ctx = SuggestionContext {
            categories: self.store.categories(),
            history: &history,
            frequencies: &frequencies,
        };
        let suggestion = self.engine.suggest(&item, &ctx).await;
        Ok((item, suggestion))
    }

    /// Classify an inbox file and publish the pending decision
    pub async fn classify(&self, path: &Path) -> Result<Suggestion> {
        info!("Classifying: {:?}", path);
        let (item, suggestion) = self.suggest_for(path).await?;

        // Removed while the model was thinking
        if !item.id.exists() {
            return Err(AblageError::NotFound(item.id));
        }

        self.store.put_pending(item, suggestion.clone())?;
        Ok(suggestion)
    }

    /// Record the operator's choice, then move the file
    ///
    /// The decision is committed before the move; a failed move is kept for
    /// retry and reported as `PlacementFailed`.
    pub async fn resolve_and_place(&self, id: &Path, folder: &str) -> Result<Placement> {
        let store = Arc::clone(&self.store);
        let (id, folder) = (item_id(id)?, folder.to_string());
        let resolution = tokio::task::spawn_blocking(move || store.resolve(&id, &folder))
            .await
            .map_err(|e| AblageError::Store(format!("resolve task failed: {}", e)))??;
        self.place(resolution.record, 0).await
    }

    /// Retry a placement that failed earlier
    pub async fn retry_placement(&self, id: &Path) -> Result<Placement> {
        let failure = self.store.take_placement_failure(&item_id(id)?)?;
        info!("Retrying placement of {:?} (attempt {})", id, failure.attempts + 1);
        self.place(failure.record, failure.attempts).await
    }

    async fn place(&self, record: DecisionRecord, previous_attempts: u32) -> Result<Placement> {
        let placer = Arc::clone(&self.placer);
        let moved = record.clone();
        let outcome = tokio::task::spawn_blocking(move || placer.place(&moved))
            .await
            .map_err(|e| AblageError::Store(format!("placement task failed: {}", e)))?;

        match outcome {
            Ok(destination) => Ok(Placement { record, destination }),
            Err(e) => {
                let reason = match &e {
                    AblageError::PlacementFailed { reason, .. } => reason.clone(),
                    other => other.to_string(),
                };
                error!("Placement of {:?} failed: {}", record.item, reason);
                let item = record.item.clone();
                self.store
                    .record_placement_failure(record, reason.clone(), previous_attempts + 1)?;
                Err(AblageError::PlacementFailed { item, reason })
            }
        }
    }

    /// Source file went away before a decision
    pub fn withdraw(&self, id: &Path) -> Result<bool> {
        self.store.withdraw(&item_id(id)?)
    }

    async fn process_job(&self, job: Job) {
        let path = job.path();
        match self.store.has_placement_failure(path) {
            Ok(true) => {
                debug!("Awaiting placement retry, not reclassifying: {:?}", path);
                return;
            }
            Ok(false) => {}
            Err(e) => warn!("{}", e),
        }

        match self.classify(path).await {
            Ok(suggestion) if suggestion.is_degraded() => {
                warn!("Degraded suggestion for {:?}", path)
            }
            Ok(_) => {}
            Err(AblageError::NotFound(_)) => debug!("File disappeared before classification: {:?}", path),
            Err(e) => error!("Failed to classify {:?}: {}", path, e),
        }
        // job dropped here, releasing the in-flight claim
    }
}

/// Items are keyed by absolute path with a canonical directory part
///
/// Relative input is taken against the working directory. The file itself
/// may already be gone, so only its directory is canonicalized.
fn item_id(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    match (absolute.parent(), absolute.file_name()) {
        (Some(dir), Some(name)) => match std::fs::canonicalize(dir) {
            Ok(dir) => Ok(dir.join(name)),
            Err(_) => Ok(absolute),
        },
        _ => Ok(absolute),
    }
}

/// Start `workers` classification workers sharing one job queue
pub fn spawn_workers(pipeline: Arc<Pipeline>, jobs: mpsc::Receiver<Job>, workers: usize) -> Vec<JoinHandle<()>> {
    let jobs = Arc::new(Mutex::new(jobs));

    (0..workers.max(1))
        .map(|n| {
            let pipeline = Arc::clone(&pipeline);
            let jobs = Arc::clone(&jobs);
            tokio::spawn(async move {
                debug!("Worker {} started", n);
                loop {
                    let job = jobs.lock().await.recv().await;
                    match job {
                        Some(job) => pipeline.process_job(job).await,
                        None => break,
                    }
                }
                debug!("Worker {} stopped", n);
            })
        })
        .collect()
}

/// Watch the inbox until shutdown, feeding the dispatcher
///
/// Files already in the inbox are offered first.
pub async fn watch_inbox(
    pipeline: Arc<Pipeline>,
    dispatcher: Dispatcher,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let mut watcher = FileWatcher::new(event_tx)?;
    watcher.watch(pipeline.inbox())?;

    let existing = scan_existing(pipeline.inbox())?;
    if !existing.is_empty() {
        info!("Processing {} existing inbox files", existing.len());
    }
    for path in existing {
        dispatcher.offer(path);
    }

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            event = event_rx.recv() => match event {
                Some(InboxEvent::Appeared(path)) => {
                    dispatcher.offer(path);
                }
                Some(InboxEvent::Vanished(path)) => {
                    if let Err(e) = pipeline.withdraw(&path) {
                        warn!("Failed to withdraw {:?}: {}", path, e);
                    }
                }
                Some(InboxEvent::Error(e)) => warn!("Watch error: {}", e),
                None => break,
            },
        }
    }

    info!("Inbox watcher stopped");
    Ok(())
}
