use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::Path;
use std::sync::Arc;

use uuid::Uuid;

use crate::session::domain::image_uri::ImageUri;
use crate::session::domain::path_component::{sanitize_group_name, validate_component};
use crate::session::domain::session_error::SessionError;
use crate::session::infrastructure::fs_session_store::FsSessionStore;
use crate::session::infrastructure::session_locks::SessionLocks;
use crate::shared::constants::GROUP_PREFIX;

/// Hex digits appended to a moved file whose name is already taken.
const COLLISION_SUFFIX_LEN: usize = 6;

/// Human corrections applied to a live session.
///
/// Every operation validates its inputs before touching the disk and runs
/// under the session's file lock, so scan-then-create sequences (auto-naming,
/// collision suffixes) cannot interleave on one session, even between
/// processes. Entries are only ever created exclusively; nothing is replaced.
pub struct CorrectionEngine {
    store: Arc<FsSessionStore>,
    locks: Arc<SessionLocks>,
}

impl CorrectionEngine {
    pub fn new(store: Arc<FsSessionStore>, locks: Arc<SessionLocks>) -> Self {
        Self { store, locks }
    }

    /// Creates an empty group and returns its name.
    ///
    /// An explicit name is trimmed and has whitespace replaced by `_`. With
    /// no name (or a blank one) the next free `person_<n>` is chosen.
    pub fn create_group(
        &self,
        session_id: &str,
        name: Option<&str>,
    ) -> Result<String, SessionError> {
        let session = self.store.session_dir(session_id)?;
        let explicit = name.map(sanitize_group_name).filter(|n| !n.is_empty());
        if let Some(name) = &explicit {
            validate_component("group", name)?;
        }

        let _guard = self.locks.lock_session(session_id)?;

        let group = match explicit {
            Some(name) => name,
            None => format!("{GROUP_PREFIX}{}", next_group_index(&session)?),
        };

        match fs::create_dir(session.join(&group)) {
            Ok(()) => {
                log::info!("Session {session_id}: created group {group}");
                Ok(group)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(SessionError::conflict("Person folder exists"))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Moves one image into `dest_group` and returns its new URI.
    ///
    /// The destination group is created on demand, but only once the source
    /// is known to exist. A name clash in the destination gets a random
    /// `_<hex>` suffix before the extension; nothing is ever overwritten.
    pub fn move_image(&self, src: &str, dest_group: &str) -> Result<String, SessionError> {
        if src.is_empty() || dest_group.is_empty() {
            return Err(SessionError::validation("src and dest_person required"));
        }
        let source = ImageUri::parse(src)?;
        validate_component("dest_person", dest_group)?;

        let session_id = source.session_id.as_str();
        let src_path = self.store.image_path(&source)?;
        let dest_dir = self.store.group_dir(session_id, dest_group)?;

        let _guard = self.locks.lock_session(session_id)?;

        if !src_path.is_file() {
            return Err(SessionError::not_found("Source file not found"));
        }
        if source.group == dest_group {
            return Ok(source.to_string());
        }

        match fs::create_dir(&dest_dir) {
            Err(e) if e.kind() == ErrorKind::AlreadyExists && !dest_dir.is_dir() => {
                return Err(SessionError::conflict(format!(
                    "{dest_group} exists and is not a group"
                )));
            }
            Err(e) if e.kind() != ErrorKind::AlreadyExists => return Err(e.into()),
            _ => {}
        }

        let file = relocate_file(&src_path, &dest_dir, &source.file)?;

        let moved = ImageUri::new(session_id, dest_group, file);
        log::info!("Moved {source} to {moved}");
        Ok(moved.to_string())
    }

    /// Deletes one image and returns its URI. Deleting an image that is
    /// already gone is `NotFound`.
    pub fn delete_image(&self, uri: &str) -> Result<String, SessionError> {
        let image = ImageUri::parse(uri)?;
        let path = self.store.image_path(&image)?;

        let _guard = self.locks.lock_session(&image.session_id)?;

        if !path.is_file() {
            return Err(SessionError::not_found("File not found"));
        }
        fs::remove_file(&path)?;
        log::info!("Deleted {image}");
        Ok(image.to_string())
    }

    /// Renames a group directory. Returns `(old, new)`.
    pub fn rename_group(
        &self,
        session_id: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<(String, String), SessionError> {
        if session_id.is_empty() || old_name.is_empty() || new_name.is_empty() {
            return Err(SessionError::validation("Missing parameters"));
        }
        validate_component("old_name", old_name)?;
        validate_component("new_name", new_name)?;
        let session = self.store.session_dir(session_id)?;

        let _guard = self.locks.lock_session(session_id)?;

        let old_path = session.join(old_name);
        let new_path = session.join(new_name);
        if !old_path.is_dir() {
            return Err(SessionError::not_found("Old person not found"));
        }
        match fs::create_dir(&new_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(SessionError::conflict("Target name exists"));
            }
            Err(e) => return Err(e.into()),
        }
        if let Err(e) = rename_onto_claim(&old_path, &new_path) {
            let _ = fs::remove_dir(&new_path);
            return Err(e.into());
        }

        log::info!("Session {session_id}: renamed {old_name} to {new_name}");
        Ok((old_name.to_string(), new_name.to_string()))
    }
}

/// `max(n) + 1` over the session's `person_<n>` groups, or 0 when there are
/// none. Names whose suffix is not a number are ignored.
fn next_group_index(session: &Path) -> Result<u64, SessionError> {
    let mut next = 0;
    for entry in fs::read_dir(session)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let index = name
            .to_str()
            .and_then(|n| n.strip_prefix(GROUP_PREFIX))
            .and_then(|n| n.parse::<u64>().ok());
        if let Some(n) = index {
            next = next.max(n + 1);
        }
    }
    Ok(next)
}

/// Links `src` into `dest_dir` under `file`, or a suffixed variant when
/// that name is taken, then unlinks the source. Returns the name used.
fn relocate_file(src: &Path, dest_dir: &Path, file: &str) -> Result<String, SessionError> {
    let mut name = file.to_string();
    loop {
        match link_no_clobber(src, &dest_dir.join(&name)) {
            Ok(()) => break,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => name = suffixed_name(file),
            Err(e) => return Err(e.into()),
        }
    }
    if let Err(e) = fs::remove_file(src) {
        let _ = fs::remove_file(dest_dir.join(&name));
        return Err(e.into());
    }
    Ok(name)
}

/// Creates `target` as a hard link to `src`, or as an exclusive copy where
/// the filesystem has no hard links. Fails with `AlreadyExists` instead of
/// replacing an entry.
fn link_no_clobber(src: &Path, target: &Path) -> io::Result<()> {
    match fs::hard_link(src, target) {
        Err(e) if e.kind() != ErrorKind::AlreadyExists => {
            log::debug!("Hard link to {} failed ({e}), copying", target.display());
            let mut out = OpenOptions::new().write(true).create_new(true).open(target)?;
            if let Err(e) = io::copy(&mut File::open(src)?, &mut out) {
                drop(out);
                let _ = fs::remove_file(target);
                return Err(e);
            }
            Ok(())
        }
        result => result,
    }
}

/// Moves group directory `old` onto the empty directory `claimed`.
///
/// Unix replaces an empty directory on rename. Elsewhere the claim is
/// dropped first; the session lock covers that gap.
fn rename_onto_claim(old: &Path, claimed: &Path) -> io::Result<()> {
    if fs::rename(old, claimed).is_ok() {
        return Ok(());
    }
    fs::remove_dir(claimed)?;
    fs::rename(old, claimed)
}

/// `f3_id1.jpg` → `f3_id1_<6 hex>.jpg`.
fn suffixed_name(file: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    let suffix = &suffix[..COLLISION_SUFFIX_LEN];
    let path = Path::new(file);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(file);
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_{suffix}.{ext}"),
        None => format!("{stem}_{suffix}"),
    }
}
