//! Advisory file locks serializing mutations of the on-disk store.
//!
//! Uses `fs2` (`flock` / `LockFileEx`), so a lock held by one `cropsort`
//! process blocks every other process and thread that opens the same file.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::session::domain::session_error::SessionError;
use crate::session::domain::store_layout::StoreLayout;

/// Lock file guarding dataset index allocation, inside the persons root.
const PROMOTION_LOCK_FILE: &str = ".promotion.lock";

/// Lock registry for the session store.
///
/// Every mutation of one session runs under `<temp_root>/<session>.lock`;
/// sessions never contend with each other. Promotion additionally takes
/// `<persons_root>/.promotion.lock` while it allocates a dataset index.
/// The registry keeps no per-session state in memory.
#[derive(Clone, Debug)]
pub struct SessionLocks {
    sessions_dir: PathBuf,
    promotion_file: PathBuf,
}

/// An exclusive lock, released when dropped.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            log::debug!("Releasing {}: {e}", self.path.display());
        }
    }
}

impl SessionLocks {
    pub fn new(layout: &StoreLayout) -> Self {
        Self {
            sessions_dir: layout.temp_root.clone(),
            promotion_file: layout.persons_root.join(PROMOTION_LOCK_FILE),
        }
    }

    /// Blocks until the session's lock is held. `session_id` must already
    /// be a validated path component.
    pub fn lock_session(&self, session_id: &str) -> Result<LockGuard, SessionError> {
        acquire(self.session_lock_path(session_id))
    }

    /// Blocks until the promotion lock is held.
    pub fn lock_store(&self) -> Result<LockGuard, SessionError> {
        acquire(self.promotion_file.clone())
    }

    /// Removes the lock file of a session that no longer exists. Call it
    /// after the session's guard is dropped.
    pub fn forget(&self, session_id: &str) {
        match fs::remove_file(self.session_lock_path(session_id)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => log::debug!("Could not remove lock of {session_id}: {e}"),
        }
    }

    fn session_lock_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(format!("{session_id}.lock"))
    }
}

fn acquire(path: PathBuf) -> Result<LockGuard, SessionError> {
    let file = open_lock_file(&path)?;
    file.lock_exclusive()?;
    Ok(LockGuard { file, path })
}

fn open_lock_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn layout() -> (tempfile::TempDir, StoreLayout) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::under(dir.path());
        layout.ensure_dirs().unwrap();
        (dir, layout)
    }

    #[test]
    fn test_session_lock_file_lives_beside_sessions() {
        let (_dir, layout) = layout();
        let locks = SessionLocks::new(&layout);

        let guard = locks.lock_session("abc").unwrap();
        assert!(layout.temp_root.join("abc.lock").is_file());
        drop(guard);

        locks.forget("abc");
        assert!(!layout.temp_root.join("abc.lock").exists());
        locks.forget("abc");
    }

    #[test]
    fn test_promotion_lock_file_is_not_a_dataset_dir() {
        let (_dir, layout) = layout();
        let _guard = SessionLocks::new(&layout).lock_store().unwrap();
        assert!(layout.persons_root.join(PROMOTION_LOCK_FILE).is_file());
    }

    #[test]
    fn test_distinct_sessions_do_not_contend() {
        let (_dir, layout) = layout();
        let a = SessionLocks::new(&layout);
        let b = SessionLocks::new(&layout);
        let _held = a.lock_session("s1").unwrap();
        let _other = b.lock_session("s2").unwrap();
        let _store = b.lock_store().unwrap();
    }

    #[test]
    fn test_separate_registries_serialize_one_session() {
        let (_dir, layout) = layout();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = SessionLocks::new(&layout);
                let inside = inside.clone();
                let max_seen = max_seen.clone();
                thread::spawn(move || {
                    let _guard = locks.lock_session("shared").unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(2));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_temp_root_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let locks = SessionLocks::new(&StoreLayout::under(&dir.path().join("absent")));
        let err = locks.lock_session("s1").unwrap_err();
        assert_eq!(err.status_code(), 500);
    }
}
