//! Pidfile for the `events` command
//!
//! Only one guard owns the file. An existing pidfile is never overwritten or
//! removed; the guard removes the file it wrote when dropped.

use crate::error::CliResult;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Guard owning a pidfile
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Write the current process id to `path` unless a pidfile already exists.
    ///
    /// Returns `None` when another pidfile is in place.
    pub fn acquire(path: &Path) -> CliResult<Option<Self>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                warn!(path = %path.display(), "Pidfile already exists, leaving it in place");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        write!(file, "{}", std::process::id())?;
        debug!(path = %path.display(), "Pidfile written");
        Ok(Some(Self {
            path: path.to_path_buf(),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Could not remove pidfile");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_writes_pid_and_drop_removes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run").join("events.pid");

        let guard = PidFile::acquire(&path).unwrap().unwrap();
        let contents = std::fs::read_to_string(guard.path()).unwrap();
        assert_eq!(contents, std::process::id().to_string());

        drop(guard);
        assert!(!path.exists());
    }

    #[test]
    fn test_existing_pidfile_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.pid");
        std::fs::write(&path, "4242").unwrap();

        assert!(PidFile::acquire(&path).unwrap().is_none());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "4242");
    }
}
