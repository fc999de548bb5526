//! Durable credential storage
//!
//! Only the session manager reads or writes these. Both tokens are stored as
//! one JSON object keyed by `token` and `refreshToken`, and every save
//! replaces the whole object so a reader never sees one token without the
//! other.

use crate::auth::models::Credentials;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Persistent home of the session's token pair
pub trait CredentialStore: Send + Sync {
    /// Stored credentials, or `None` when nothing (valid) is stored
    fn load(&self) -> Result<Option<Credentials>>;

    /// Replace the stored credentials
    fn save(&self, credentials: &Credentials) -> Result<()>;

    /// Remove stored credentials. Clearing an empty store succeeds.
    fn clear(&self) -> Result<()>;
}

/// JSON file on disk, surviving process restarts
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "credentials".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<Credentials>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Storage(format!("{}: {}", self.path.display(), e))),
        };

        match serde_json::from_str::<Credentials>(&content) {
            Ok(credentials) => Ok(Some(credentials)),
            Err(e) => {
                warn!(path = %self.path.display(), "Ignoring unreadable credential file: {}", e);
                Ok(None)
            }
        }
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("{}: {}", parent.display(), e)))?;
        }

        let content = serde_json::to_vec_pretty(credentials)?;
        let temp = self.temp_path();
        write_private(&temp, &content)
            .map_err(|e| Error::Storage(format!("{}: {}", temp.display(), e)))?;
        fs::rename(&temp, &self.path)
            .map_err(|e| Error::Storage(format!("{}: {}", self.path.display(), e)))?;

        debug!(path = %self.path.display(), "Saved credentials");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Cleared credentials");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!("{}: {}", self.path.display(), e))),
        }
    }
}

#[cfg(unix)]
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(content)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(content)?;
    file.sync_all()
}

/// Process-local store, lost on exit
#[derive(Default)]
pub struct MemoryCredentialStore {
    credentials: Mutex<Option<Credentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            credentials: Mutex::new(Some(credentials)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<Credentials>> {
        Ok(self.credentials.lock().clone())
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        *self.credentials.lock() = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.credentials.lock() = None;
        Ok(())
    }
}
