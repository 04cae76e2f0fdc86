use std::{fs::File, path::Path};

use fs4::fs_std::FileExt;
use log::debug;
use thiserror::Error;

/// Advisory lock on a file, released when dropped.
pub struct FileLock {
    _file: File,
}

#[derive(Error, Debug)]
#[error("Could not lock {path}: {source}")]
pub struct Error {
    path: String,
    source: std::io::Error,
}

impl FileLock {
    /// Blocks until no other process holds the lock.
    pub fn new(path: &Path) -> Result<Self, Error> {
        let io_error = |source| Error {
            path: path.display().to_string(),
            source,
        };
        let file = File::create(path).map_err(io_error)?;
        debug!("Acquiring a lock on {}", path.display());
        file.lock_exclusive().map_err(io_error)?;
        debug!("Acquired a lock on {}", path.display());
        Ok(Self { _file: file })
    }
}
