// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Move resolved files into the ablage tree

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, error, info};

use crate::audit::{AuditEntry, AuditLog};
use crate::categories::validate_folder_name;
use crate::models::DecisionRecord;
use crate::{AblageError, Result};

/// Executes placements one at a time
pub struct Placer {
    ablage_root: PathBuf,
    audit: AuditLog,
    lock: Mutex<()>,
}

impl Placer {
    pub fn new(ablage_root: PathBuf, audit: AuditLog) -> Self {
        Self {
            ablage_root,
            audit,
            lock: Mutex::new(()),
        }
    }

    pub fn ablage_root(&self) -> &Path {
        &self.ablage_root
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Move the decided file to `<ablage>/<folder>/<name>` and return where it landed
    ///
    /// Existing files are never overwritten; a `_N` suffix is added instead.
    pub fn place(&self, record: &DecisionRecord) -> Result<PathBuf> {
        let failed = |reason: String| AblageError::PlacementFailed {
            item: record.item.clone(),
            reason,
        };

        validate_folder_name(&record.chosen_folder)?;

        // Collision check and move must not interleave with another placement
        let _guard = self
            .lock
            .lock()
            .map_err(|_| AblageError::Store("Placement lock poisoned".to_string()))?;

        let source = &record.item;
        if !source.is_file() {
            return Err(failed("source file no longer exists".to_string()));
        }
        let file_name = source
            .file_name()
            .ok_or_else(|| failed("source has no file name".to_string()))?;

        let folder = self.ablage_root.join(&record.chosen_folder);
        if !folder.is_dir() {
            info!("Creating folder {:?}", folder);
        }
        std::fs::create_dir_all(&folder).map_err(|e| failed(format!("cannot create {:?}: {}", folder, e)))?;

        let destination = unique_destination(&folder, file_name);
        move_file(source, &destination).map_err(|e| failed(e.to_string()))?;
        info!("Placed {:?} -> {:?}", source, destination);

        // The file has moved; a lost audit line must not turn this into a failure
        if let Err(e) = self.audit.append(&AuditEntry::for_placement(record, &destination)) {
            error!("Failed to write audit entry for {}: {}", record.id, e);
        }

        Ok(destination)
    }
}

/// First free path among `name.ext`, `name_1.ext`, `name_2.ext`, ...
pub fn unique_destination(dir: &Path, file_name: &OsStr) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let name = Path::new(file_name);
    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = name.extension().map(|e| e.to_string_lossy().to_string());

    let mut n = 1u32;
    loop {
        let next = match &ext {
            Some(ext) => format!("{}_{}.{}", stem, n, ext),
            None => format!("{}_{}", stem, n),
        };
        let candidate = dir.join(next);
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Rename, or copy and delete when the rename crosses filesystems
fn move_file(source: &Path, destination: &Path) -> io::Result<()> {
    match std::fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            debug!("Rename failed ({}), trying copy", rename_err);
            if let Err(copy_err) = std::fs::copy(source, destination) {
                let _ = std::fs::remove_file(destination);
                return Err(io::Error::new(
                    copy_err.kind(),
                    format!("rename failed: {}; copy failed: {}", rename_err, copy_err),
                ));
            }
            std::fs::remove_file(source)
        }
    }
}
