// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Decision store: pending suggestions and the decision log
//!
//! Readers share the lock; `resolve` holds the write lock from the pending
//! lookup to the log append, so two submissions for the same item can never
//! both succeed.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use crate::categories::CategorySet;
use crate::db::{DecisionLog, LogStats};
use crate::models::{preview, DecisionRecord, InboxItem, ItemId, PendingDecision, PlacementFailure, Suggestion};
use crate::{AblageError, Result};

const PREVIEW_CHARS: usize = 300;

struct PendingEntry {
    decision: PendingDecision,
    seq: u64,
}

#[derive(Default)]
struct StoreState {
    pending: HashMap<ItemId, PendingEntry>,
    failures: HashMap<ItemId, PlacementFailure>,
    next_seq: u64,
}

/// A committed decision, ready to be placed
#[derive(Debug, Clone)]
pub struct Resolution {
    pub record: DecisionRecord,
    pub item: InboxItem,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub pending: usize,
    pub placement_failures: usize,
    pub log: LogStats,
}

pub struct DecisionStore {
    state: RwLock<StoreState>,
    log: DecisionLog,
    categories: CategorySet,
}

impl DecisionStore {
    pub fn new(log: DecisionLog, categories: CategorySet) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            log,
            categories,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|_| AblageError::Store("Pending map lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|_| AblageError::Store("Pending map lock poisoned".to_string()))
    }

    pub fn categories(&self) -> &CategorySet {
        &self.categories
    }

    pub fn log(&self) -> &DecisionLog {
        &self.log
    }

    /// Publish a suggestion, replacing any earlier one for the same item
    pub fn put_pending(&self, item: InboxItem, suggestion: Suggestion) -> Result<()> {
        let mut state = self.write()?;
        let seq = state.next_seq;
        state.next_seq += 1;

        let id = item.id.clone();
        let decision = PendingDecision {
            preview: preview(&item.text, PREVIEW_CHARS),
            item,
            suggestion,
            created_at: Utc::now(),
        };

        if state.pending.insert(id.clone(), PendingEntry { decision, seq }).is_some() {
            debug!("Replaced pending suggestion for {:?}", id);
        }
        Ok(())
    }

    /// All pending decisions, most recent first
    pub fn list_pending(&self) -> Result<Vec<PendingDecision>> {
        let state = self.read()?;
        let mut entries: Vec<&PendingEntry> = state.pending.values().collect();
        entries.sort_by(|a, b| b.seq.cmp(&a.seq));
        Ok(entries.into_iter().map(|e| e.decision.clone()).collect())
    }

    pub fn pending_count(&self) -> Result<usize> {
        Ok(self.read()?.pending.len())
    }

    /// Commit the operator's choice
    ///
    /// The folder must be one of the offered candidates or a known category.
    /// On success the pending entry is gone and exactly one record was appended.
    pub fn resolve(&self, id: &Path, folder: &str) -> Result<Resolution> {
        let mut state = self.write()?;

        let entry = match state.pending.get(id) {
            Some(entry) => entry,
            None => {
                // The log survives restarts; it alone answers this
                if self.log.latest_for_item(id)?.is_some() {
                    return Err(AblageError::AlreadyResolved(id.to_path_buf()));
                }
                return Err(AblageError::NotFound(id.to_path_buf()));
            }
        };

        let suggestion = &entry.decision.suggestion;
        if !suggestion.offers(folder) && !self.categories.contains(folder) {
            return Err(AblageError::InvalidChoice {
                folder: folder.to_string(),
            });
        }

        let item = entry.decision.item.clone();
        let top_folder = suggestion.top().map(|c| c.folder.clone());
        let record = DecisionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            item: item.id.clone(),
            file_name: item.file_name(),
            summary: item.summary(),
            content_hash: item.content_hash.clone(),
            chosen_folder: folder.to_string(),
            matched_top: top_folder.as_deref() == Some(folder),
            top_folder,
            degraded: suggestion.is_degraded(),
            decided_at: Utc::now(),
        };

        // Log first: if the append fails the item stays pending
        self.log.append(&record)?;
        state.pending.remove(id);

        info!(
            "Resolved {} -> {} (top suggestion {})",
            record.file_name,
            record.chosen_folder,
            if record.matched_top { "accepted" } else { "overridden" }
        );
        Ok(Resolution { record, item })
    }

    /// Drop a pending decision whose source file disappeared
    pub fn withdraw(&self, id: &Path) -> Result<bool> {
        let removed = self.write()?.pending.remove(id).is_some();
        if removed {
            info!("Withdrew pending decision for {:?}", id);
        }
        Ok(removed)
    }

    pub fn recent_decisions(&self, limit: usize) -> Result<Vec<DecisionRecord>> {
        self.log.recent(limit)
    }

    pub fn folder_frequencies(&self) -> Result<Vec<(String, u64)>> {
        self.log.folder_frequencies()
    }

    /// Keep a committed decision whose move failed, for the operator to retry
    pub fn record_placement_failure(&self, record: DecisionRecord, error: String, attempts: u32) -> Result<()> {
        let mut state = self.write()?;
        state.failures.insert(
            record.item.clone(),
            PlacementFailure {
                record,
                error,
                attempts,
                failed_at: Utc::now(),
            },
        );
        Ok(())
    }

    pub fn placement_failures(&self) -> Result<Vec<PlacementFailure>> {
        let state = self.read()?;
        let mut failures: Vec<PlacementFailure> = state.failures.values().cloned().collect();
        failures.sort_by(|a, b| b.failed_at.cmp(&a.failed_at));
        Ok(failures)
    }

    pub fn has_placement_failure(&self, id: &Path) -> Result<bool> {
        Ok(self.read()?.failures.contains_key(id))
    }

    /// Remove a failure so it can be retried
    pub fn take_placement_failure(&self, id: &Path) -> Result<PlacementFailure> {
        self.write()?
            .failures
            .remove(id)
            .ok_or_else(|| AblageError::NotFound(id.to_path_buf()))
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let (pending, placement_failures) = {
            let state = self.read()?;
            (state.pending.len(), state.failures.len())
        };
        Ok(StoreStats {
            pending,
            placement_failures,
            log: self.log.stats()?,
        })
    }
}
