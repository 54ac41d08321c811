use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::WatchError;

/// Where a client remembers the payment it is waiting on.
pub trait WatchPersistence: Send + Sync {
    fn get(&self) -> Option<String>;
    fn set(&self, public_id: &str) -> Result<(), WatchError>;
    fn clear(&self) -> Result<(), WatchError>;
}

#[derive(Debug, Default)]
pub struct MemoryPersistence {
    slot: Mutex<Option<String>>,
}

impl MemoryPersistence {
    pub fn with(public_id: &str) -> Self {
        MemoryPersistence {
            slot: Mutex::new(Some(public_id.to_string())),
        }
    }
}

impl WatchPersistence for MemoryPersistence {
    fn get(&self) -> Option<String> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set(&self, public_id: &str) -> Result<(), WatchError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(public_id.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), WatchError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Single-file persistence, so a restarted CLI can resume watching.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    path: PathBuf,
}

impl FilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FilePersistence { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WatchPersistence for FilePersistence {
    fn get(&self) -> Option<String> {
        let contents = std::fs::read_to_string(&self.path).ok()?;
        let public_id = contents.trim();
        (!public_id.is_empty()).then(|| public_id.to_string())
    }

    fn set(&self, public_id: &str) -> Result<(), WatchError> {
        std::fs::write(&self.path, public_id)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), WatchError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_round_trip() {
        let persistence = MemoryPersistence::default();
        assert_eq!(persistence.get(), None);
        persistence.set("abc").unwrap();
        assert_eq!(persistence.get().as_deref(), Some("abc"));
        persistence.clear().unwrap();
        assert_eq!(persistence.get(), None);
    }

    #[test]
    fn file_survives_new_instance_and_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payment_public_id");

        FilePersistence::new(&path).set("abc").unwrap();
        let reopened = FilePersistence::new(&path);
        assert_eq!(reopened.get().as_deref(), Some("abc"));

        reopened.clear().unwrap();
        reopened.clear().unwrap();
        assert_eq!(reopened.get(), None);
    }
}
