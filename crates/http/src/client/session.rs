//! Session state and its storage backends
//!
//! The store is read synchronously before every outbound request. Only the
//! refresh path and login/logout write to it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// File permissions for the session file (Unix only): owner read/write.
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Current credentials of the signed-in user
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub access_token: Option<String>,
    /// `None` when the refresh token lives in an HTTP-only cookie
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl Session {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token,
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |token: &Option<String>| token.as_ref().map(|_| "<redacted>");
        f.debug_struct("Session")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .finish()
    }
}

/// Storage for the current [`Session`]
pub trait SessionStore: Send + Sync {
    fn get(&self) -> Session;

    fn set(&self, session: Session);

    fn clear(&self);
}

impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    fn get(&self) -> Session {
        (**self).get()
    }
    fn set(&self, session: Session) {
        (**self).set(session);
    }
    fn clear(&self) {
        (**self).clear();
    }
}

/// In-memory store, lost when the process exits
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: RwLock<Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            session: RwLock::new(session),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self) -> Session {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, session: Session) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    fn clear(&self) {
        self.set(Session::default());
    }
}

/// JSON file store that survives restarts
///
/// Reads are served from memory; every write goes through to disk. A write
/// failure is logged and the in-memory copy stays authoritative for this process.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    cached: RwLock<Session>,
}

impl FileSessionStore {
    /// Open the store at `path`, loading any previously persisted session
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cached = load_session(&path);
        Self {
            path,
            cached: RwLock::new(cached),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, session: &Session) -> std::io::Result<()> {
        if session.is_empty() {
            return match std::fs::remove_file(&self.path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
                _ => Ok(()),
            };
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_vec_pretty(session)?;

        // Write then rename so a crash never leaves a truncated file behind.
        let temp_path = self.path.with_extension("tmp");
        write_private(&temp_path, &content)?;
        std::fs::rename(&temp_path, &self.path).inspect_err(|_| {
            let _ = std::fs::remove_file(&temp_path);
        })
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self) -> Session {
        self.cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, session: Session) {
        // Held across the write so disk and memory change together
        let mut cached = self.cached.write().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = self.persist(&session) {
            warn!(path = %self.path.display(), error = %e, "Failed to persist session");
        }
        *cached = session;
    }

    fn clear(&self) {
        self.set(Session::default());
    }
}

fn load_session(path: &Path) -> Session {
    let content = match std::fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Session::default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read session file");
            return Session::default();
        }
    };

    match serde_json::from_slice(&content) {
        Ok(session) => {
            debug!(path = %path.display(), "Loaded persisted session");
            session
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable session file");
            Session::default()
        }
    }
}

#[cfg(unix)]
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(FILE_MODE)
        .open(path)?;
    file.write_all(content)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_set_get_clear() {
        let store = MemorySessionStore::new();
        assert!(store.get().is_empty());

        store.set(Session::new("access", Some("refresh".into())));
        assert_eq!(store.get().access_token.as_deref(), Some("access"));
        assert_eq!(store.get().refresh_token.as_deref(), Some("refresh"));

        store.clear();
        assert!(store.get().is_empty());
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let session = Session::new("secret-access", Some("secret-refresh".into()));
        let rendered = format!("{session:?}");
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let store = FileSessionStore::open(&path);
        assert!(store.get().is_empty());
        store.set(Session::new("access", Some("refresh".into())));
        drop(store);

        let reopened = FileSessionStore::open(&path);
        assert_eq!(
            reopened.get(),
            Session::new("access", Some("refresh".into()))
        );
    }

    #[test]
    fn file_store_clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = FileSessionStore::open(&path);
        store.set(Session::new("access", None));
        assert!(path.exists());

        store.clear();
        assert!(!path.exists());
        assert!(FileSessionStore::open(&path).get().is_empty());
    }

    #[test]
    fn file_store_ignores_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store = FileSessionStore::open(&path);
        assert!(store.get().is_empty());
    }

    #[test]
    fn concurrent_writers_leave_disk_and_memory_in_agreement() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = FileSessionStore::open(&path);

        std::thread::scope(|scope| {
            for writer in 0..8 {
                let store = &store;
                scope.spawn(move || {
                    for round in 0..25 {
                        store.set(Session::new(
                            format!("access-{writer}-{round}"),
                            Some(format!("refresh-{writer}")),
                        ));
                    }
                });
            }
        });

        assert_eq!(FileSessionStore::open(&path).get(), store.get());
        assert!(!path.with_extension("tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        FileSessionStore::open(&path).set(Session::new("access", None));

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, FILE_MODE);
    }
}
