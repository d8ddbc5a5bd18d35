/*! Validity markers and cross-process locks.

Every cached artifact (download or extraction) at `target` has:

- `target._valid`: written only after the artifact is completely produced. Its absence means
  "not completed", even if `target` exists.
- `target._lock`: a lock file, held exclusively while the artifact is being produced.

[ensure] implements the check / lock / re-check / produce / mark protocol.
!*/
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use log::{debug, info, warn};

use crate::error::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

fn with_suffix(target: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    target.with_file_name(name)
}

pub fn marker_path(target: &Path) -> PathBuf {
    with_suffix(target, "._valid")
}

pub fn lock_path(target: &Path) -> PathBuf {
    with_suffix(target, "._lock")
}

/// `true` when both the artifact and its validity marker exist.
pub fn is_valid(target: &Path) -> bool {
    target.exists() && marker_path(target).exists()
}

/// Exclusive lock on a lock file, released on drop.
pub struct FileLock {
    path: PathBuf,
    file: File,
}

impl FileLock {
    /// Blocks until the lock is acquired, or fails with [Error::LockTimeout].
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, Error> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;
        let start = Instant::now();
        let mut warned = false;
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    debug!("acquired lock {:?}", path);
                    return Ok(Self {
                        path: path.to_path_buf(),
                        file,
                    });
                }
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    if start.elapsed() >= timeout {
                        return Err(Error::LockTimeout {
                            path: path.to_path_buf(),
                            timeout,
                        });
                    }
                    if !warned {
                        info!("waiting for lock {:?} held by another process", path);
                        warned = true;
                    }
                    thread::sleep(POLL_INTERVAL.min(timeout.saturating_sub(start.elapsed())));
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    /// Releases the lock and removes the lock file.
    ///
    /// Only called once the validity marker is written: anyone acquiring a lock
    /// afterwards (even on a fresh lock file) sees the marker and does nothing.
    fn release_and_remove(self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("could not remove lock file {:?}: {}", self.path, e);
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("could not release lock {:?}: {}", self.path, e);
        }
    }
}

/// Produces `target` at most once across threads and processes.
///
/// `produce` is only called when no valid artifact exists, while holding the lock.
/// On failure the marker stays absent, so a later call starts over.
pub fn ensure<F>(target: &Path, timeout: Duration, produce: F) -> Result<(), Error>
where
    F: FnOnce(&Path) -> Result<(), Error>,
{
    if is_valid(target) {
        return Ok(());
    }
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let lock = FileLock::acquire(&lock_path(target), timeout)?;
    if is_valid(target) {
        debug!("{:?} was produced while waiting for the lock", target);
        return Ok(());
    }
    produce(target)?;
    File::create(marker_path(target))?;
    lock.release_and_remove();
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_paths() {
        let target = Path::new("/tmp/cache/a.tar.gz");
        assert_eq!(marker_path(target), Path::new("/tmp/cache/a.tar.gz._valid"));
        assert_eq!(lock_path(target), Path::new("/tmp/cache/a.tar.gz._lock"));
    }

    #[test]
    fn test_ensure_once() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("sub").join("file.txt");
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            ensure(&target, Duration::from_secs(5), |t| {
                calls.fetch_add(1, Ordering::SeqCst);
                std::fs::write(t, "content")?;
                Ok(())
            })
            .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(is_valid(&target));
        assert!(!lock_path(&target).exists());
    }

    #[test]
    fn test_failure_leaves_no_marker() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("file.txt");
        let res = ensure(&target, Duration::from_secs(5), |t| {
            std::fs::write(t, "partial")?;
            Err(Error::Custom("network went away".to_string()))
        });
        assert!(res.is_err());
        assert!(target.exists());
        assert!(!is_valid(&target));

        // a partial file without marker is redone
        ensure(&target, Duration::from_secs(5), |t| {
            std::fs::write(t, "complete")?;
            Ok(())
        })
        .unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "complete");
    }

    #[test]
    fn test_concurrent_ensure() {
        let dir = tempdir().unwrap();
        let target = Arc::new(dir.path().join("shared.bin"));
        let calls = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let target = Arc::clone(&target);
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    ensure(&target, Duration::from_secs(30), |t| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(200));
                        std::fs::write(t, "done")?;
                        Ok(())
                    })
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read_to_string(target.as_ref()).unwrap(), "done");
    }

    #[test]
    fn test_lock_timeout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("held._lock");
        let _held = FileLock::acquire(&path, Duration::from_secs(1)).unwrap();
        let res = FileLock::acquire(&path, Duration::from_millis(600));
        assert!(matches!(res, Err(Error::LockTimeout { .. })));
    }
}
