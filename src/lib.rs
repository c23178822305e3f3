// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Ablage: local AI-assisted inbox sorting
//!
//! Documents dropped into an inbox are read, a local language model proposes
//! three destination folders, and a human picks one. The choice is logged,
//! the file is moved, and recent choices steer the next suggestions.

pub mod audit;
pub mod categories;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod models;
pub mod ollama;
pub mod pipeline;
pub mod placement;
pub mod store;
pub mod suggest;
pub mod watcher;
pub mod web;

pub use config::AppConfig;
pub use error::{AblageError, Result};
