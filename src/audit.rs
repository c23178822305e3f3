// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! JSONL audit log of completed placements

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::models::DecisionRecord;
use crate::Result;

/// One placed file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub decision_id: String,
    pub original_filename: String,
    pub chosen_folder: String,
    pub top_suggested_folder: Option<String>,
    pub matched: bool,
    pub destination: PathBuf,
}

impl AuditEntry {
    pub fn for_placement(record: &DecisionRecord, destination: &Path) -> Self {
        Self {
            timestamp: Utc::now(),
            decision_id: record.id.clone(),
            original_filename: record.file_name.clone(),
            chosen_folder: record.chosen_folder.clone(),
            top_suggested_folder: record.top_folder.clone(),
            matched: record.matched_top,
            destination: destination.to_path_buf(),
        }
    }
}

/// Append-only audit log under the processed directory
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Append an entry to the log
    pub fn append(&self, entry: &AuditEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let json = serde_json::to_string(entry)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }

    /// Read all entries, skipping lines that do not parse
    pub fn read_all(&self) -> Result<Vec<AuditEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);

        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!("Failed to parse audit entry: {}", e);
                }
            }
        }

        Ok(entries)
    }

    /// Get the most recent N entries (newest first)
    pub fn get_recent(&self, count: usize) -> Result<Vec<AuditEntry>> {
        let mut entries = self.read_all()?;
        entries.reverse();
        entries.truncate(count);
        Ok(entries)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(id: &str) -> AuditEntry {
        AuditEntry {
            timestamp: Utc::now(),
            decision_id: id.into(),
            original_filename: "rechnung.pdf".into(),
            chosen_folder: "Rechnungen".into(),
            top_suggested_folder: Some("Rechnungen".into()),
            matched: true,
            destination: PathBuf::from("/nas/ablage/Rechnungen/rechnung.pdf"),
        }
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::new(dir.path().join("processed").join("decisions.jsonl"));

        log.append(&entry("1")).unwrap();
        log.append(&entry("2")).unwrap();

        let recent = log.get_recent(1).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].decision_id, "2");

        let raw = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(raw.lines().count(), 2);
        assert!(raw.contains("\"top_suggested_folder\":\"Rechnungen\""));
    }

    #[test]
    fn test_corrupt_lines_skipped() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::new(dir.path().join("decisions.jsonl"));
        log.append(&entry("1")).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(log.path())
            .unwrap()
            .write_all(b"{not json\n")
            .unwrap();

        assert_eq!(log.read_all().unwrap().len(), 1);
    }
}
