use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use super::{CredentialStore, StoreError, StoredSession};

const SESSION_FILE_NAME: &str = "session.json";

/// Store persisting the session as a JSON document inside a directory.
///
/// Updates are serialized through an in-process lock, so concurrent requests of one client never
/// lose each other's writes.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(SESSION_FILE_NAME),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<StoredSession, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => {
                serde_json::from_str(&content).map_err(|e| StoreError::Serde(e.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(StoredSession::default()),
            Err(e) => Err(StoreError::Io(format!("{}: {e}", self.path.display()))),
        }
    }

    fn write(&self, session: &StoredSession) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| StoreError::Io(format!("{}: {e}", dir.display())))?;
        }
        let content =
            serde_json::to_vec_pretty(session).map_err(|e| StoreError::Serde(e.to_string()))?;
        fs::write(&self.path, content)
            .map_err(|e| StoreError::Io(format!("{}: {e}", self.path.display())))
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<StoredSession, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::PoisonError)?;
        self.read()
    }

    fn update(&self, apply: &mut dyn FnMut(&mut StoredSession)) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::PoisonError)?;
        let mut session = self.read()?;
        apply(&mut session);
        self.write(&session)
    }

    fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::PoisonError)?;
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "stored credentials removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(format!("{}: {e}", self.path.display()))),
        }
    }
}
