use crate::CoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Exclusive advisory lock on the local sync directory.
pub struct SyncLock {
    lock_file: File,
}

impl SyncLock {
    fn open(lock_path: &Path) -> Result<File, CoreError> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)?)
    }

    /// Block until the lock is held.
    pub fn acquire(lock_path: &Path) -> Result<Self, CoreError> {
        let file = Self::open(lock_path)?;
        file.lock_exclusive()?;
        Ok(Self { lock_file: file })
    }

    /// Take the lock if it is free, `None` if another process holds it.
    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>, CoreError> {
        let file = Self::open(lock_path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { lock_file: file })),
            Err(e) if is_contended(&e) => Ok(None),
            Err(e) => Err(CoreError::Io(e)),
        }
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl Drop for SyncLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}

/// Shared cancellation request, checked before each transfer starts.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Route Ctrl-C to `flag`. A second Ctrl-C exits immediately.
pub fn install_signal_handler(flag: &CancelFlag) {
    let flag = flag.clone();
    let _ = ctrlc::set_handler(move || {
        if flag.is_cancelled() {
            std::process::exit(130);
        }
        flag.cancel();
        eprintln!("\ninterrupt received, stopping before the next transfer...");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("sync").join(".lock");
        {
            let _lock = SyncLock::acquire(&lock_path).unwrap();
            assert!(lock_path.exists());
        }
        assert!(SyncLock::try_acquire(&lock_path).unwrap().is_some());
    }

    #[test]
    fn try_acquire_returns_none_when_held() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join(".lock");
        let _lock = SyncLock::acquire(&lock_path).unwrap();
        assert!(SyncLock::try_acquire(&lock_path).unwrap().is_none());
    }

    #[test]
    fn only_contention_counts_as_held() {
        assert!(is_contended(&fs2::lock_contended_error()));
        assert!(is_contended(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(!is_contended(&io::Error::from(io::ErrorKind::PermissionDenied)));
        assert!(!is_contended(&io::Error::from_raw_os_error(9)));
    }

    #[test]
    fn unusable_lock_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("sync");
        std::fs::write(&blocker, "not a directory").unwrap();
        let result = SyncLock::try_acquire(&blocker.join(".lock"));
        assert!(matches!(result, Err(CoreError::Io(_))));
    }

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
    }
}
