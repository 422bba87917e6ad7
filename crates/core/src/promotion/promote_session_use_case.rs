use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::session::domain::session_error::SessionError;
use crate::session::infrastructure::fs_session_store::FsSessionStore;
use crate::session::infrastructure::session_locks::SessionLocks;
use crate::shared::constants::{DATASET_PREFIX, PERSONS_URI_PREFIX};

/// `EXDEV` on Unix, `ERROR_NOT_SAME_DEVICE` on Windows.
#[cfg(unix)]
const CROSS_DEVICE_ERROR: Option<i32> = Some(18);
#[cfg(windows)]
const CROSS_DEVICE_ERROR: Option<i32> = Some(17);
#[cfg(not(any(unix, windows)))]
const CROSS_DEVICE_ERROR: Option<i32> = None;

/// Moves a finished session out of the temp store into the next free
/// `dataset_<N>` slot of the permanent store.
///
/// The index is chosen under the promotion file lock and claimed with an
/// exclusive `create_dir`, so two promotions (even from different
/// processes) never land in the same slot. The slot stays claimed until
/// the session is fully inside it.
pub struct PromoteSessionUseCase {
    store: Arc<FsSessionStore>,
    locks: Arc<SessionLocks>,
}

impl PromoteSessionUseCase {
    pub fn new(store: Arc<FsSessionStore>, locks: Arc<SessionLocks>) -> Self {
        Self { store, locks }
    }

    /// Promotes `session_id` and returns the dataset location as
    /// `/persons/dataset_<N>`.
    pub fn execute(&self, session_id: &str) -> Result<String, SessionError> {
        if session_id.is_empty() {
            return Err(SessionError::validation("session_id required"));
        }
        self.store.session_dir(session_id)?;

        let result = self.promote_locked(session_id);
        if matches!(result, Ok(_) | Err(SessionError::NotFound(_))) {
            self.locks.forget(session_id);
        }
        let index = result?;

        let name = format!("{DATASET_PREFIX}{index}");
        log::info!("Promoted session {session_id} to {name}");
        Ok(format!("{PERSONS_URI_PREFIX}/{name}"))
    }

    fn promote_locked(&self, session_id: &str) -> Result<u64, SessionError> {
        let _session_guard = self.locks.lock_session(session_id)?;
        let source = self.store.session_dir(session_id)?;

        let persons_root = &self.store.layout().persons_root;
        fs::create_dir_all(persons_root)?;
        let _store_guard = self.locks.lock_store()?;
        let (index, dest) = reserve_dataset_slot(persons_root)?;

        if let Err(e) = relocate(&source, &dest) {
            log::error!(
                "Promotion of {session_id} into {} failed: {e}",
                dest.display()
            );
            return Err(e.into());
        }
        Ok(index)
    }
}

/// `max(k) + 1` over existing `dataset_<k>` directories, at least 1.
fn next_dataset_index(persons_root: &Path) -> io::Result<u64> {
    let mut next = 1;
    for entry in fs::read_dir(persons_root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let index = name
            .to_str()
            .and_then(|n| n.strip_prefix(DATASET_PREFIX))
            .and_then(|n| n.parse::<u64>().ok());
        if let Some(k) = index {
            next = next.max(k + 1);
        }
    }
    Ok(next)
}

/// Claims the next dataset directory, stepping past slots that appear
/// between the scan and the create.
fn reserve_dataset_slot(persons_root: &Path) -> io::Result<(u64, PathBuf)> {
    let mut index = next_dataset_index(persons_root)?;
    loop {
        let dest = persons_root.join(format!("{DATASET_PREFIX}{index}"));
        match fs::create_dir(&dest) {
            Ok(()) => return Ok((index, dest)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => index += 1,
            Err(e) => return Err(e),
        }
    }
}

fn is_cross_device(e: &io::Error) -> bool {
    CROSS_DEVICE_ERROR.is_some() && e.raw_os_error() == CROSS_DEVICE_ERROR
}

/// Moves `source` onto the reserved, empty `dest`.
///
/// A rename replaces the empty slot on Unix. Across filesystems the session
/// is copied into the slot while it is still held. Windows refuses to
/// rename onto a directory, so there the slot is dropped right before the
/// rename; the promotion lock covers that gap.
fn relocate(source: &Path, dest: &Path) -> io::Result<()> {
    let err = match fs::rename(source, dest) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };
    if is_cross_device(&err) {
        log::debug!("{} is on another filesystem, copying", source.display());
        return copy_into_slot(source, dest);
    }
    if cfg!(windows) {
        fs::remove_dir(dest)?;
        return fs::rename(source, dest);
    }
    if let Err(e) = fs::remove_dir(dest) {
        log::warn!("Could not release dataset slot {}: {e}", dest.display());
    }
    Err(err)
}

/// Copies the session's contents into the held slot, then removes the
/// session. A failed copy empties and releases the slot.
fn copy_into_slot(source: &Path, dest: &Path) -> io::Result<()> {
    if let Err(e) = copy_entries(source, dest) {
        if let Err(cleanup) = fs::remove_dir_all(dest) {
            log::warn!("Could not release dataset slot {}: {cleanup}", dest.display());
        }
        return Err(e);
    }
    fs::remove_dir_all(source)
}

/// Copies `source` to a new directory `dest`; an existing `dest` is
/// `AlreadyExists`, never merged into.
fn copy_dir_recursive(source: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir(dest)?;
    copy_entries(source, dest)
}

fn copy_entries(source: &Path, dest: &Path) -> io::Result<()> {
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::domain::store_layout::StoreLayout;

    fn setup() -> (tempfile::TempDir, Arc<FsSessionStore>, PromoteSessionUseCase) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::under(dir.path());
        layout.ensure_dirs().unwrap();
        let store = Arc::new(FsSessionStore::new(layout));
        let use_case = PromoteSessionUseCase::new(store.clone(), Arc::new(SessionLocks::new(store.layout())));
        (dir, store, use_case)
    }

    fn session_with_image(store: &FsSessionStore) -> String {
        let id = store.create_session().unwrap();
        let group = store.session_dir(&id).unwrap().join("person_1");
        fs::create_dir(&group).unwrap();
        fs::write(group.join("f0_id1.jpg"), b"jpeg").unwrap();
        id
    }

    #[test]
    fn test_first_promotion_is_dataset_1() {
        let (_dir, store, use_case) = setup();
        let id = session_with_image(&store);

        let location = use_case.execute(&id).unwrap();

        assert_eq!(location, "/persons/dataset_1");
        let promoted = store.layout().persons_root.join("dataset_1");
        assert!(promoted.join("person_1/f0_id1.jpg").is_file());
        assert_eq!(store.session_dir(&id).unwrap_err().status_code(), 404);
    }

    #[test]
    fn test_promoting_twice_is_not_found() {
        let (_dir, store, use_case) = setup();
        let id = session_with_image(&store);
        use_case.execute(&id).unwrap();
        assert_eq!(use_case.execute(&id).unwrap_err().status_code(), 404);
    }

    #[test]
    fn test_numbering_continues_after_highest() {
        let (_dir, store, use_case) = setup();
        let root = &store.layout().persons_root;
        fs::create_dir(root.join("dataset_1")).unwrap();
        fs::create_dir(root.join("dataset_4")).unwrap();
        fs::create_dir(root.join("dataset_x")).unwrap();
        fs::write(root.join("dataset_99"), b"file, not a slot").unwrap();

        let id = session_with_image(&store);
        assert_eq!(use_case.execute(&id).unwrap(), "/persons/dataset_5");
    }

    #[test]
    fn test_sequential_promotions_get_distinct_slots() {
        let (_dir, store, use_case) = setup();
        let a = session_with_image(&store);
        let b = session_with_image(&store);
        assert_eq!(use_case.execute(&a).unwrap(), "/persons/dataset_1");
        assert_eq!(use_case.execute(&b).unwrap(), "/persons/dataset_2");
    }

    #[test]
    fn test_unknown_session_not_found() {
        let (_dir, store, use_case) = setup();
        let err = use_case
            .execute("0123456789abcdef0123456789abcdef")
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert_eq!(fs::read_dir(&store.layout().persons_root).unwrap().count(), 0);
    }

    #[test]
    fn test_rejects_traversal_id() {
        let (_dir, _store, use_case) = setup();
        assert_eq!(use_case.execute("..").unwrap_err().status_code(), 400);
        assert_eq!(use_case.execute("").unwrap_err().status_code(), 400);
    }

    #[test]
    fn test_reserve_skips_taken_slot() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("dataset_1"), b"").unwrap();
        let (index, path) = reserve_dataset_slot(dir.path()).unwrap();
        assert_eq!(index, 2);
        assert!(path.is_dir());
    }

    #[test]
    fn test_copy_dir_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("a/b")).unwrap();
        fs::write(src.join("a/b/c.jpg"), b"c").unwrap();
        fs::write(src.join("top.json"), b"{}").unwrap();

        let dest = dir.path().join("dest");
        copy_dir_recursive(&src, &dest).unwrap();

        assert_eq!(fs::read(dest.join("a/b/c.jpg")).unwrap(), b"c");
        assert_eq!(fs::read(dest.join("top.json")).unwrap(), b"{}");
    }

    #[test]
    fn test_copy_dir_recursive_never_merges() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("mine.jpg"), b"mine").unwrap();
        let dest = dir.path().join("dataset_3");
        fs::create_dir(&dest).unwrap();
        fs::write(dest.join("theirs.jpg"), b"theirs").unwrap();

        let err = copy_dir_recursive(&src, &dest).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert!(!dest.join("mine.jpg").exists());
        assert_eq!(fs::read(dest.join("theirs.jpg")).unwrap(), b"theirs");
    }

    #[test]
    fn test_copy_into_slot_fills_held_slot() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("session");
        fs::create_dir_all(src.join("person_1")).unwrap();
        fs::write(src.join("person_1/f0_id1.jpg"), b"jpeg").unwrap();
        let (_, slot) = reserve_dataset_slot(dir.path()).unwrap();

        copy_into_slot(&src, &slot).unwrap();

        assert_eq!(fs::read(slot.join("person_1/f0_id1.jpg")).unwrap(), b"jpeg");
        assert!(!src.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_exdev_is_cross_device() {
        assert!(is_cross_device(&io::Error::from_raw_os_error(18)));
        assert!(!is_cross_device(&io::Error::from_raw_os_error(2)));
        assert!(!is_cross_device(&io::Error::new(ErrorKind::Other, "x")));
    }

    #[test]
    fn test_promotion_removes_session_lock_file() {
        let (_dir, store, use_case) = setup();
        let id = session_with_image(&store);
        use_case.execute(&id).unwrap();
        assert!(!store.layout().temp_root.join(format!("{id}.lock")).exists());
    }

    #[test]
    fn test_concurrent_promotions_get_distinct_slots() {
        let (_dir, store, _use_case) = setup();
        let ids: Vec<String> = (0..6).map(|_| session_with_image(&store)).collect();
        let use_cases: Vec<PromoteSessionUseCase> = ids
            .iter()
            .map(|_| {
                PromoteSessionUseCase::new(store.clone(), Arc::new(SessionLocks::new(store.layout())))
            })
            .collect();

        let mut locations: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = use_cases
                .iter()
                .zip(&ids)
                .map(|(use_case, id)| scope.spawn(move || use_case.execute(id).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        locations.sort_by_key(|l| l.rsplit('_').next().unwrap().parse::<u64>().unwrap());
        let expected: Vec<String> = (1..=6).map(|n| format!("/persons/dataset_{n}")).collect();
        assert_eq!(locations, expected);
        for n in 1..=6 {
            let slot = store.layout().persons_root.join(format!("dataset_{n}"));
            assert!(slot.join("person_1/f0_id1.jpg").is_file());
        }
        assert!(store.list_sessions().unwrap().is_empty());
    }
}
