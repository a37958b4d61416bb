//! Advisory single-writer lock for upload destinations.
//!
//! The lock is a zero-byte marker `.<name>.lock` next to the destination,
//! created with create-new semantics so two uploads racing for the same path
//! cannot both succeed. The marker is removed when the [`UploadLock`] is
//! released or dropped.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Result, ShareError};

/// Marker path guarding uploads to `dest`.
pub fn marker_path(dest: &Path) -> Option<PathBuf> {
    let name = dest.file_name()?;
    let mut marker = std::ffi::OsString::from(".");
    marker.push(name);
    marker.push(".lock");
    Some(dest.with_file_name(marker))
}

/// Exclusive claim on an upload destination.
#[derive(Debug)]
pub struct UploadLock {
    dest: PathBuf,
    marker: PathBuf,
    released: bool,
}

impl UploadLock {
    /// Claim `dest`, failing with [`ShareError::LockContention`] if another
    /// upload already holds it.
    pub fn acquire(dest: &Path) -> Result<Self> {
        if dest.is_dir() {
            return Err(ShareError::DestinationIsDirectory(dest.to_path_buf()));
        }
        let marker = marker_path(dest).ok_or_else(|| {
            std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("no file name in upload destination {:?}", dest),
            )
        })?;

        match OpenOptions::new().write(true).create_new(true).open(&marker) {
            Ok(_) => {
                debug!(marker = %marker.display(), "upload lock acquired");
                Ok(Self {
                    dest: dest.to_path_buf(),
                    marker,
                    released: false,
                })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(ShareError::LockContention(dest.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn destination(&self) -> &Path {
        &self.dest
    }

    pub fn marker(&self) -> &Path {
        &self.marker
    }

    /// Remove the marker, reporting failure to the caller.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        std::fs::remove_file(&self.marker)?;
        debug!(marker = %self.marker.display(), "upload lock released");
        Ok(())
    }
}

impl Drop for UploadLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.marker) {
            warn!(marker = %self.marker.display(), "failed to remove upload lock: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_marker_is_hidden_sibling() {
        let m = marker_path(Path::new("shared/out.bin")).unwrap();
        assert_eq!(m, Path::new("shared/.out.bin.lock"));
        assert!(marker_path(Path::new("/")).is_none());
    }

    #[test]
    fn test_second_acquire_contends() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.bin");

        let first = UploadLock::acquire(&dest).unwrap();
        assert!(first.marker().exists());
        assert!(matches!(
            UploadLock::acquire(&dest),
            Err(ShareError::LockContention(p)) if p == dest
        ));

        first.release().unwrap();
        assert!(!dir.path().join(".out.bin.lock").exists());
        // Free again once released
        UploadLock::acquire(&dest).unwrap().release().unwrap();
    }

    #[test]
    fn test_drop_removes_marker() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("file.txt");
        let marker = {
            let lock = UploadLock::acquire(&dest).unwrap();
            lock.marker().to_path_buf()
        };
        assert!(!marker.exists());
    }

    #[test]
    fn test_marker_removed_when_holder_panics() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("panicky.bin");
        let d = dest.clone();
        let res = thread::spawn(move || {
            let _lock = UploadLock::acquire(&d).unwrap();
            panic!("upload handler blew up");
        })
        .join();
        assert!(res.is_err());
        assert!(!marker_path(&dest).unwrap().exists());
    }

    #[test]
    fn test_directory_destination_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            UploadLock::acquire(dir.path()),
            Err(ShareError::DestinationIsDirectory(_))
        ));
    }

    #[test]
    fn test_missing_parent_is_io_error() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("nope").join("x.bin");
        assert!(matches!(UploadLock::acquire(&dest), Err(ShareError::Io(_))));
    }

    #[test]
    fn test_concurrent_acquire_has_one_winner() {
        let dir = TempDir::new().unwrap();
        let dest = Arc::new(dir.path().join("race.bin"));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dest = Arc::clone(&dest);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    UploadLock::acquire(&dest)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let winners = results.iter().filter(|r| r.is_ok()).count();
        let contended = results
            .iter()
            .filter(|r| matches!(r, Err(ShareError::LockContention(_))))
            .count();
        assert_eq!(winners, 1);
        assert_eq!(contended, 7);
    }
}
