// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! The set of valid destination folders

use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

use crate::config::CategoryConfig;
use crate::{AblageError, Result};

/// Minimum size so that a three-entry fallback can always be built
pub const MIN_CATEGORIES: usize = 3;

/// Destination folder names, always including the uncategorized escape value
#[derive(Debug, Clone, Serialize)]
pub struct CategorySet {
    folders: BTreeSet<String>,
    uncategorized: String,
}

impl CategorySet {
    /// Build a set from explicit names
    pub fn new<I, S>(folders: I, uncategorized: &str) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = BTreeSet::new();
        for folder in folders {
            let folder = folder.into().trim().to_string();
            if folder.is_empty() {
                continue;
            }
            validate_folder_name(&folder)?;
            set.insert(folder);
        }
        validate_folder_name(uncategorized)?;
        set.insert(uncategorized.to_string());

        if set.len() < MIN_CATEGORIES {
            return Err(AblageError::Config(format!(
                "At least {} destination folders are required, found: {:?}",
                MIN_CATEGORIES, set
            )));
        }

        Ok(Self {
            folders: set,
            uncategorized: uncategorized.to_string(),
        })
    }

    /// Use configured folders, or every visible directory under the ablage root
    pub fn load(config: &CategoryConfig, ablage_root: &Path) -> Result<Self> {
        if !config.folders.is_empty() {
            return Self::new(config.folders.iter().cloned(), &config.uncategorized);
        }

        let mut discovered = Vec::new();
        if ablage_root.exists() {
            for entry in std::fs::read_dir(ablage_root)? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().to_string();
                if entry.file_type()?.is_dir() && !name.starts_with('.') {
                    debug!("Discovered destination folder: {}", name);
                    discovered.push(name);
                }
            }
        }
        info!("Discovered {} folders under {:?}", discovered.len(), ablage_root);
        Self::new(discovered, &config.uncategorized)
    }

    /// Is this a known destination (including the uncategorized value)?
    pub fn contains(&self, folder: &str) -> bool {
        self.folders.contains(folder)
    }

    pub fn uncategorized(&self) -> &str {
        &self.uncategorized
    }

    /// Folder names in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.folders.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.folders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }
}

/// A folder name must be a single path component
pub fn validate_folder_name(folder: &str) -> Result<()> {
    let invalid = folder.trim().is_empty()
        || folder == "."
        || folder == ".."
        || folder.contains('/')
        || folder.contains('\\')
        || folder.contains('\0');
    if invalid {
        return Err(AblageError::InvalidChoice {
            folder: folder.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_uncategorized_always_present() {
        let set = CategorySet::new(["Rechnungen", "Bank"], "Sonstiges").unwrap();
        assert!(set.contains("Sonstiges"));
        assert_eq!(set.len(), 3);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["Bank", "Rechnungen", "Sonstiges"]);
    }

    #[test]
    fn test_too_few_folders() {
        assert!(CategorySet::new(["Bank"], "Sonstiges").is_err());
        assert!(CategorySet::new(["Sonstiges", "Bank"], "Sonstiges").is_err());
    }

    #[test]
    fn test_path_like_names_rejected() {
        assert!(CategorySet::new(["../etc", "Bank", "Auto"], "Sonstiges").is_err());
        assert!(validate_folder_name("Steuer/2024").is_err());
        assert!(validate_folder_name("Steuer 2024").is_ok());
    }

    #[test]
    fn test_discovery_skips_hidden_and_files() {
        let dir = TempDir::new().unwrap();
        for name in ["Rechnungen", "Bank", ".trash"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let set = CategorySet::load(&CategoryConfig::default(), dir.path()).unwrap();
        assert!(set.contains("Rechnungen"));
        assert!(set.contains("Bank"));
        assert!(!set.contains(".trash"));
        assert!(!set.contains("notes.txt"));
    }

    #[test]
    fn test_configured_folders_win() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("Other")).unwrap();
        let config = CategoryConfig {
            folders: vec!["Auto".into(), "Arbeit".into()],
            uncategorized: "Sonstiges".into(),
        };
        let set = CategorySet::load(&config, dir.path()).unwrap();
        assert!(!set.contains("Other"));
        assert!(set.contains("Auto"));
    }
}
