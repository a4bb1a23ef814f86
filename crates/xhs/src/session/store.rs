//! Persistent session cookie storage.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Serialize, Deserialize)]
struct StoredSession {
    cookie: String,
}

/// Stores the authenticated session cookie as a small JSON file.
///
/// A missing or malformed file means "no saved session"; read failures are
/// swallowed so a corrupt file degrades to a fresh login instead of an error.
/// The system is single-process, single-session, so no concurrent-writer
/// protection is needed.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved cookie, if any.
    pub fn load(&self) -> Option<String> {
        let content = fs::read_to_string(&self.path).ok()?;
        let stored: StoredSession = serde_json::from_str(&content).ok()?;
        Some(stored.cookie)
    }

    /// Save the cookie, creating parent directories as needed.
    pub fn save(&self, cookie: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string(&StoredSession {
            cookie: cookie.to_string(),
        })?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    /// Delete the saved cookie. A missing file is not an error.
    pub fn clear(&self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to clear saved session");
            }
        }
    }
}
