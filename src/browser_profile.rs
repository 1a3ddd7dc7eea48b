//! Per-engine Chrome profile directories
//!
//! Each launched engine gets a fresh UUID-named profile directory so
//! concurrent crawler processes never contend for Chrome's SingletonLock,
//! and no cookies leak between batches.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Profile prefix used for every engine the crawler launches.
pub const PROFILE_PREFIX: &str = "news_crawler_chrome";

/// RAII guard for a profile directory.
///
/// The directory is removed on drop unless ownership is handed to the engine
/// with [`BrowserProfile::into_path`].
#[derive(Debug)]
pub struct BrowserProfile {
    path: PathBuf,
    cleanup_on_drop: bool,
}

impl BrowserProfile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Disable auto-cleanup and return the path.
    pub fn into_path(mut self) -> PathBuf {
        self.cleanup_on_drop = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for BrowserProfile {
    fn drop(&mut self) {
        if self.cleanup_on_drop && self.path.exists() {
            debug!("Removing unused profile directory {}", self.path.display());
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!("Failed to remove profile directory {}: {e}", self.path.display());
            }
        }
    }
}

/// Create `<tmp>/<prefix>_<uuid>`.
///
/// `create_dir` (not `create_dir_all`) so a collision fails loudly.
pub fn create_unique_profile_with_prefix(prefix: &str) -> Result<BrowserProfile> {
    let path = std::env::temp_dir().join(format!("{prefix}_{}", Uuid::new_v4()));
    std::fs::create_dir(&path)
        .with_context(|| format!("Failed to create profile directory: {}", path.display()))?;
    debug!("Created Chrome profile directory: {}", path.display());
    Ok(BrowserProfile {
        path,
        cleanup_on_drop: true,
    })
}

/// Remove a profile directory after its engine has exited.
pub fn remove_profile_dir(path: &Path) -> std::io::Result<()> {
    if path.exists() {
        std::fs::remove_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_removed_on_drop() {
        let profile = create_unique_profile_with_prefix("news_crawler_test").expect("create profile");
        let path = profile.path().to_path_buf();
        assert!(path.exists());
        drop(profile);
        assert!(!path.exists());
    }

    #[test]
    fn test_into_path_keeps_directory() {
        let profile = create_unique_profile_with_prefix("news_crawler_test").expect("create profile");
        let path = profile.into_path();
        assert!(path.exists());
        remove_profile_dir(&path).expect("remove profile");
        assert!(!path.exists());
    }
}
