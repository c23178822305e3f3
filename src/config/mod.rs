// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for Ablage

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Inbox, ablage and processed directories
    #[serde(default)]
    pub paths: PathConfig,

    /// AI engine configuration
    #[serde(default)]
    pub ai_engine: EngineConfig,

    /// Worker pool and prompt sizing
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Destination folders
    #[serde(default)]
    pub categories: CategoryConfig,

    /// Decision API settings
    #[serde(default)]
    pub web: WebConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PathConfig {
    #[serde(default = "default_inbox")]
    pub inbox: PathBuf,
    #[serde(default = "default_ablage")]
    pub ablage: PathBuf,
    #[serde(default = "default_processed")]
    pub processed: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Total inference attempts per prompt before falling back
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Base delay for exponential backoff between attempts
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Re-prompts with a stricter instruction after unusable output
    #[serde(default = "default_parse_retries")]
    pub parse_retries: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Past decisions embedded in each prompt as examples
    #[serde(default = "default_history_sample")]
    pub history_sample: usize,
    /// Accept model proposals for folders that do not exist yet
    #[serde(default)]
    pub allow_novel_folders: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CategoryConfig {
    /// Valid destination folders; empty means "every folder under the ablage root"
    #[serde(default)]
    pub folders: Vec<String>,
    #[serde(default = "default_uncategorized")]
    pub uncategorized: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_web_host")]
    pub host: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
}

// Default value functions
fn default_inbox() -> PathBuf { PathBuf::from("NAS/inbox") }
fn default_ablage() -> PathBuf { PathBuf::from("NAS/ablage") }
fn default_processed() -> PathBuf { PathBuf::from("NAS/processed") }
fn default_url() -> String { "http://localhost:11434/api/generate".to_string() }
fn default_model() -> String { "qwen2.5:7b-instruct".to_string() }
fn default_timeout() -> u64 { 30 }
fn default_attempts() -> u32 { 3 }
fn default_backoff_ms() -> u64 { 1000 }
fn default_parse_retries() -> u32 { 1 }
fn default_debounce_ms() -> u64 { 500 }
fn default_max_text_chars() -> usize { 2000 }
fn default_workers() -> usize { 1 }
fn default_queue_capacity() -> usize { 64 }
fn default_history_sample() -> usize { 10 }
fn default_uncategorized() -> String { "Sonstiges".to_string() }
fn default_true() -> bool { true }
fn default_web_host() -> String { "127.0.0.1".to_string() }
fn default_web_port() -> u16 { 8080 }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            paths: PathConfig::default(),
            ai_engine: EngineConfig::default(),
            pipeline: PipelineConfig::default(),
            categories: CategoryConfig::default(),
            web: WebConfig::default(),
        }
    }
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            inbox: default_inbox(),
            ablage: default_ablage(),
            processed: default_processed(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            model: default_model(),
            timeout_secs: default_timeout(),
            attempts: default_attempts(),
            backoff_ms: default_backoff_ms(),
            parse_retries: default_parse_retries(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            max_text_chars: default_max_text_chars(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            history_sample: default_history_sample(),
            allow_novel_folders: false,
        }
    }
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self {
            folders: Vec::new(),
            uncategorized: default_uncategorized(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_web_host(),
            port: default_web_port(),
        }
    }
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl PipelineConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl PathConfig {
    /// SQLite decision log
    pub fn database(&self) -> PathBuf {
        self.processed.join("ablage.db")
    }

    /// JSONL audit log of completed placements
    pub fn audit_log(&self) -> PathBuf {
        self.processed.join("decisions.jsonl")
    }

    /// Create the three directories and return them as absolute paths
    ///
    /// Item ids are derived from the inbox path, so it must not depend on the
    /// working directory.
    pub fn canonicalized(&self) -> crate::Result<PathConfig> {
        let absolute = |dir: &Path| -> crate::Result<PathBuf> {
            std::fs::create_dir_all(dir)?;
            Ok(std::fs::canonicalize(dir)?)
        };
        Ok(PathConfig {
            inbox: absolute(&self.inbox)?,
            ablage: absolute(&self.ablage)?,
            processed: absolute(&self.processed)?,
        })
    }
}

impl AppConfig {
    /// Load configuration from a JSON file, then apply environment overrides
    pub fn load(path: &Path) -> crate::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)
                .map_err(|e| crate::AblageError::Config(format!("Failed to parse config: {}", e)))?
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `ABLAGE_ROOT`, `OLLAMA_URL`, `OLLAMA_MODEL` and `OLLAMA_TIMEOUT`.
    pub fn apply_env<F>(&mut self, lookup: F) -> crate::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup("ABLAGE_ROOT") {
            let root = PathBuf::from(root);
            self.paths.inbox = root.join("inbox");
            self.paths.ablage = root.join("ablage");
            self.paths.processed = root.join("processed");
        }
        if let Some(url) = lookup("OLLAMA_URL") {
            self.ai_engine.url = url;
        }
        if let Some(model) = lookup("OLLAMA_MODEL") {
            self.ai_engine.model = model;
        }
        if let Some(timeout) = lookup("OLLAMA_TIMEOUT") {
            self.ai_engine.timeout_secs = timeout.trim().parse().map_err(|_| {
                crate::AblageError::Config(format!("OLLAMA_TIMEOUT is not a number: {}", timeout))
            })?;
        }
        Ok(())
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.ai_engine.attempts == 0 {
            return Err(crate::AblageError::Config("ai_engine.attempts must be at least 1".into()));
        }
        if self.pipeline.workers == 0 || self.pipeline.queue_capacity == 0 {
            return Err(crate::AblageError::Config(
                "pipeline.workers and pipeline.queue_capacity must be at least 1".into(),
            ));
        }
        if self.categories.uncategorized.trim().is_empty() {
            return Err(crate::AblageError::Config("categories.uncategorized must not be empty".into()));
        }
        Ok(())
    }
}
