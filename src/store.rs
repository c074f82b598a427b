//! Single-value records kept in the working directory.
//!
//! Each record is one line of UTF-8 text. Writes land in a temp file next to
//! the record and are renamed over it, so a reader only ever sees the
//! previous value or the new one.

use std::fmt::Display;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to remove {}: {source}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A durable, optional value of type `T` stored as text.
#[derive(Debug, Clone)]
pub struct Record<T> {
    path: PathBuf,
    _value: PhantomData<fn() -> T>,
}

impl<T: FromStr + Display> Record<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _value: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing, empty and unparsable records all read as `None`.
    pub fn get(&self) -> Option<T> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring unreadable record {}: {raw:?}", self.path.display());
                None
            }
        }
    }

    pub fn set(&self, value: &T) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(write_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        write!(tmp, "{value}").map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(())
    }

    /// Removing a record that does not exist is not an error.
    pub fn clear(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Remove {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// Which model name requests are sent with.
#[derive(Debug, Clone)]
pub struct ActiveModelStore(Record<String>);

impl ActiveModelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(Record::new(path))
    }

    pub fn path(&self) -> &Path {
        self.0.path()
    }

    pub fn get(&self) -> Option<String> {
        self.0.get()
    }

    pub fn set(&self, name: &str) -> Result<(), StoreError> {
        self.0.set(&name.trim().to_string())
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.0.clear()
    }
}

/// OS process id of the server this tool spawned. Liveness is not checked here.
#[derive(Debug, Clone)]
pub struct ServerHandleStore(Record<u32>);

impl ServerHandleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(Record::new(path))
    }

    pub fn path(&self) -> &Path {
        self.0.path()
    }

    /// Pid 0 is never a real server (`kill 0` signals our own process
    /// group), so a record holding it reads as absent.
    pub fn get(&self) -> Option<u32> {
        self.0.get().filter(|&pid| pid != 0)
    }

    pub fn set(&self, pid: u32) -> Result<(), StoreError> {
        self.0.set(&pid)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.0.clear()
    }
}
