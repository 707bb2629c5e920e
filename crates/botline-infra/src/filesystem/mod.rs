//! Filesystem adapters for botline.
//!
//! Data directory resolution and the on-disk credential store.

pub mod auth;

use std::path::PathBuf;

pub use auth::FileAuthStore;

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `BOTLINE_DATA_DIR` environment variable
/// 2. `~/.botline` under the user's home directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("BOTLINE_DATA_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".botline");
    }

    // Last resort: current directory
    PathBuf::from(".botline")
}
