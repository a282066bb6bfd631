//! Durable homes for the client's bearer token.

use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use super::error::ClientError;

/// Key the token is kept under.
pub const TOKEN_KEY: &str = "auth_token";

pub trait TokenStorage: Send + Sync {
    fn load(&self) -> Result<Option<String>, ClientError>;
    fn store(&self, token: &str) -> Result<(), ClientError>;
    fn clear(&self) -> Result<(), ClientError>;
}

/// Keeps the token for the lifetime of the process only.
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStorage for MemoryTokenStorage {
    fn load(&self) -> Result<Option<String>, ClientError> {
        Ok(self.token.lock().clone())
    }

    fn store(&self, token: &str) -> Result<(), ClientError> {
        *self.token.lock() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        *self.token.lock() = None;
        Ok(())
    }
}

/// A JSON object on disk. The token lives under `auth_token`; other keys are preserved.
#[derive(Debug, Clone)]
pub struct FileTokenStorage {
    path: PathBuf,
}

impl FileTokenStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(&self) -> Result<Map<String, Value>, ClientError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(Map::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| storage_error(&self.path, e)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(storage_error(&self.path, e)),
        }
    }

    fn write(&self, entries: &Map<String, Value>) -> Result<(), ClientError> {
        let bytes = serde_json::to_vec_pretty(entries).map_err(|e| storage_error(&self.path, e))?;
        fs::write(&self.path, bytes).map_err(|e| storage_error(&self.path, e))
    }
}

impl TokenStorage for FileTokenStorage {
    fn load(&self) -> Result<Option<String>, ClientError> {
        Ok(self
            .read()?
            .get(TOKEN_KEY)
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    fn store(&self, token: &str) -> Result<(), ClientError> {
        let mut entries = self.read()?;
        entries.insert(TOKEN_KEY.to_string(), Value::String(token.to_string()));
        self.write(&entries)
    }

    fn clear(&self) -> Result<(), ClientError> {
        let mut entries = self.read()?;
        if entries.remove(TOKEN_KEY).is_some() {
            self.write(&entries)?;
        }
        Ok(())
    }
}

fn storage_error(path: &std::path::Path, error: impl std::fmt::Display) -> ClientError {
    ClientError::Storage(format!("{}: {}", path.display(), error))
}
