// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! End-to-end runs of the inbox pipeline against a scripted model

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

use ablage::audit::AuditLog;
use ablage::config::AppConfig;
use ablage::models::{FallbackReason, SuggestionSource};
use ablage::pipeline::{spawn_workers, Pipeline};
use ablage::suggest::InferenceBackend;
use ablage::watcher::{scan_existing, Dispatcher};
use ablage::{AblageError, Result};

const INVOICE: &str = r#"{"suggestions":[{"folder":"Rechnungen","reason":"invoice detected","confidence":0.9},{"folder":"Bank","reason":"IBAN present","confidence":0.4},{"folder":"Sonstiges","reason":"fallback","confidence":0.1}]}"#;

/// Answers every prompt the same way and remembers the prompts
struct Model {
    reply: String,
    delay: Duration,
    prompts: Mutex<Vec<String>>,
}

impl Model {
    fn answering(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            delay: Duration::ZERO,
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn hanging(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: INVOICE.to_string(),
            delay,
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceBackend for Model {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.reply.clone())
    }
}

struct Nas {
    dir: TempDir,
    config: AppConfig,
}

impl Nas {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.paths.inbox = dir.path().join("inbox");
        config.paths.ablage = dir.path().join("ablage");
        config.paths.processed = dir.path().join("processed");
        config.ai_engine.backoff_ms = 1;
        config.pipeline.debounce_ms = 20;

        std::fs::create_dir_all(&config.paths.inbox).unwrap();
        for folder in ["Rechnungen", "Bank", "Versicherung", "Sonstiges"] {
            std::fs::create_dir_all(config.paths.ablage.join(folder)).unwrap();
        }
        Self { dir, config }
    }

    fn drop_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.config.paths.inbox.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn ablage(&self, folder: &str) -> PathBuf {
        self.config.paths.ablage.join(folder)
    }

    fn pipeline(&self, model: Arc<Model>) -> Arc<Pipeline> {
        Arc::new(Pipeline::new(&self.config, model).unwrap())
    }
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn invoice_accepted_as_suggested() {
    let nas = Nas::new();
    let pipeline = nas.pipeline(Model::answering(INVOICE));
    let path = nas.drop_file(
        "scan_0815.txt",
        "Rechnung Nr. 2024-117\nBetrag: 89,90 EUR\nIBAN: DE02 1203 0000 0000 2020 51",
    );

    let suggestion = pipeline.classify(&path).await.unwrap();
    assert_eq!(suggestion.source, SuggestionSource::Model);
    let top = suggestion.top().unwrap();
    assert_eq!(top.folder, "Rechnungen");
    assert_eq!(top.reason, "invoice detected");
    assert_eq!(top.confidence, 0.9);

    let placement = pipeline.resolve_and_place(&path, "Rechnungen").await.unwrap();
    assert!(placement.record.matched_top);
    assert_eq!(pipeline.store().log().count().unwrap(), 1);
    assert_eq!(placement.destination, nas.ablage("Rechnungen").join("scan_0815.txt"));
    assert!(!path.exists());
    assert!(pipeline.store().list_pending().unwrap().is_empty());

    let audit = AuditLog::new(nas.config.paths.audit_log()).read_all().unwrap();
    assert_eq!(audit.len(), 1);
    assert!(audit[0].matched);
    assert_eq!(audit[0].original_filename, "scan_0815.txt");
    assert_eq!(audit[0].top_suggested_folder.as_deref(), Some("Rechnungen"));
}

#[tokio::test]
async fn hanging_backend_degrades_to_fallback() {
    let mut nas = Nas::new();
    nas.config.ai_engine.timeout_secs = 1;
    let model = Model::hanging(Duration::from_secs(5));
    let pipeline = nas.pipeline(model.clone());
    let path = nas.drop_file("brief.txt", "Sehr geehrte Damen und Herren");

    let suggestion = pipeline.classify(&path).await.unwrap();

    assert_eq!(model.prompts().len(), 3);
    assert_eq!(
        suggestion.source,
        SuggestionSource::Fallback { reason: FallbackReason::BackendUnavailable }
    );
    assert_eq!(suggestion.candidates.len(), 3);
    assert_eq!(suggestion.top().unwrap().folder, "Sonstiges");

    // degraded items are still decidable
    let pending = pipeline.store().list_pending().unwrap();
    assert!(pending[0].suggestion.is_degraded());
    let placement = pipeline.resolve_and_place(&path, "Versicherung").await.unwrap();
    assert!(placement.record.degraded);
    assert!(nas.ablage("Versicherung").join("brief.txt").exists());
}

#[tokio::test]
async fn choice_outside_categories_is_rejected() {
    let nas = Nas::new();
    let pipeline = nas.pipeline(Model::answering(INVOICE));
    let path = nas.drop_file("rechnung.txt", "Rechnung");
    pipeline.classify(&path).await.unwrap();

    let err = pipeline.resolve_and_place(&path, "Urlaub").await.unwrap_err();
    assert!(matches!(err, AblageError::InvalidChoice { .. }));

    assert!(path.exists());
    assert_eq!(pipeline.store().list_pending().unwrap().len(), 1);
    assert_eq!(pipeline.store().log().count().unwrap(), 0);
    assert!(!nas.config.paths.ablage.join("Urlaub").exists());
}

#[tokio::test]
async fn second_resolve_is_refused() {
    let nas = Nas::new();
    let pipeline = nas.pipeline(Model::answering(INVOICE));
    let path = nas.drop_file("a.txt", "Rechnung");
    pipeline.classify(&path).await.unwrap();

    pipeline.resolve_and_place(&path, "Bank").await.unwrap();
    let err = pipeline.resolve_and_place(&path, "Bank").await.unwrap_err();
    assert!(matches!(err, AblageError::AlreadyResolved(_)));
    assert_eq!(pipeline.store().log().count().unwrap(), 1);
}

#[tokio::test]
async fn same_name_twice_keeps_both_files() {
    let nas = Nas::new();
    let pipeline = nas.pipeline(Model::answering(INVOICE));

    let path = nas.drop_file("scan.txt", "erste Rechnung");
    pipeline.classify(&path).await.unwrap();
    pipeline.resolve_and_place(&path, "Rechnungen").await.unwrap();

    let path = nas.drop_file("scan.txt", "zweite Rechnung");
    pipeline.classify(&path).await.unwrap();
    pipeline.resolve_and_place(&path, "Rechnungen").await.unwrap();

    assert_eq!(files_in(&nas.ablage("Rechnungen")), vec!["scan.txt", "scan_1.txt"]);
    assert_eq!(
        std::fs::read_to_string(nas.ablage("Rechnungen").join("scan.txt")).unwrap(),
        "erste Rechnung"
    );
}

#[tokio::test]
async fn past_decisions_reach_the_prompt() {
    let nas = Nas::new();
    let model = Model::answering(INVOICE);
    let pipeline = nas.pipeline(model.clone());

    let first = nas.drop_file("kfz_police.txt", "Kfz-Versicherung Police 12345");
    pipeline.classify(&first).await.unwrap();
    pipeline.resolve_and_place(&first, "Versicherung").await.unwrap();

    let second = nas.drop_file("hausrat.txt", "Hausratversicherung Beitrag");
    pipeline.classify(&second).await.unwrap();

    let prompts = model.prompts();
    assert!(!prompts[0].contains("Frühere Entscheidungen"));
    assert!(prompts[1].contains("kfz_police.txt"));
    assert!(prompts[1].contains("-> Versicherung"));
}

#[tokio::test]
async fn unusable_output_falls_back_after_reprompt() {
    let nas = Nas::new();
    let model = Model::answering("Ich denke, das ist eine Rechnung.");
    let pipeline = nas.pipeline(model.clone());
    let path = nas.drop_file("x.txt", "Rechnung");

    let suggestion = pipeline.classify(&path).await.unwrap();
    assert_eq!(
        suggestion.source,
        SuggestionSource::Fallback { reason: FallbackReason::UnusableOutput }
    );
    assert_eq!(model.prompts().len(), 2);
}

#[tokio::test]
async fn vanished_file_is_withdrawn() {
    let nas = Nas::new();
    let pipeline = nas.pipeline(Model::answering(INVOICE));
    let path = nas.drop_file("a.txt", "Rechnung");
    pipeline.classify(&path).await.unwrap();

    std::fs::remove_file(&path).unwrap();
    assert!(pipeline.withdraw(&path).unwrap());

    let err = pipeline.resolve_and_place(&path, "Bank").await.unwrap_err();
    assert!(matches!(err, AblageError::NotFound(_)));
}

#[tokio::test]
async fn duplicate_events_classify_once() {
    let nas = Nas::new();
    let model = Model::answering(INVOICE);
    let pipeline = nas.pipeline(model.clone());
    let path = nas.drop_file("doppelt.txt", "Rechnung");

    let (tx, rx) = mpsc::channel(8);
    let workers = spawn_workers(Arc::clone(&pipeline), rx, 2);
    let dispatcher = Dispatcher::new(tx, Duration::from_millis(20));

    assert!(dispatcher.offer(path.clone()));
    assert!(!dispatcher.offer(path.clone()));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while pipeline.store().list_pending().unwrap().is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "item never classified");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    drop(dispatcher);
    for worker in workers {
        worker.await.unwrap();
    }

    assert_eq!(model.prompts().len(), 1);
    assert_eq!(pipeline.store().list_pending().unwrap().len(), 1);
}

#[tokio::test]
async fn relative_inbox_gives_absolute_ids() {
    // a relative root, as with the default configuration
    let dir = TempDir::new_in(".").unwrap();
    let cwd = std::env::current_dir().unwrap();
    let root = dir.path().strip_prefix(&cwd).unwrap_or(dir.path()).to_path_buf();
    assert!(root.is_relative());

    let mut config = AppConfig::default();
    config.paths.inbox = root.join("inbox");
    config.paths.ablage = root.join("ablage");
    config.paths.processed = root.join("processed");
    config.pipeline.debounce_ms = 20;
    for folder in ["Rechnungen", "Bank", "Auto"] {
        std::fs::create_dir_all(config.paths.ablage.join(folder)).unwrap();
    }

    let pipeline = Arc::new(Pipeline::new(&config, Model::answering(INVOICE)).unwrap());
    assert!(pipeline.inbox().is_absolute());

    let relative_file = config.paths.inbox.join("r.txt");
    std::fs::write(&relative_file, "Kontoauszug").unwrap();

    let (tx, rx) = mpsc::channel(8);
    let workers = spawn_workers(Arc::clone(&pipeline), rx, 1);
    let dispatcher = Dispatcher::new(tx, Duration::from_millis(20));
    for path in scan_existing(pipeline.inbox()).unwrap() {
        dispatcher.offer(path);
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while pipeline.store().list_pending().unwrap().is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "item never classified");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    drop(dispatcher);
    for worker in workers {
        worker.await.unwrap();
    }

    let id = pipeline.store().list_pending().unwrap()[0].item.id.clone();
    assert!(id.is_absolute());
    assert_eq!(id, std::fs::canonicalize(&relative_file).unwrap());

    let placement = pipeline.resolve_and_place(&id, "Bank").await.unwrap();
    assert!(placement.record.item.is_absolute());
    assert!(placement.destination.is_absolute());
    assert!(config.paths.ablage.join("Bank/r.txt").exists());

    // the relative spelling names the same, now resolved, item
    let err = pipeline.resolve_and_place(&relative_file, "Bank").await.unwrap_err();
    assert!(matches!(err, AblageError::AlreadyResolved(_)));
}
