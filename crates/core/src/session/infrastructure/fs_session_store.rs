use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

use crate::session::domain::image_uri::ImageUri;
use crate::session::domain::path_component::validate_component;
use crate::session::domain::person_map::PersonMap;
use crate::session::domain::session_error::SessionError;
use crate::session::domain::store_layout::StoreLayout;
use crate::shared::constants::{SNAPSHOT_FILE_NAME, SUMMARY_SUFFIX, UPLOAD_EXTENSION};

/// Attempts at drawing a fresh session id before giving up.
const MAX_ID_ATTEMPTS: usize = 8;

/// Directory-per-session store rooted at `StoreLayout::temp_root`.
///
/// The directory tree is the only authoritative state: every listing is
/// read live from disk. All lookups go through [`FsSessionStore::session_dir`]
/// so no caller can resolve a path outside the temp root.
#[derive(Clone, Debug)]
pub struct FsSessionStore {
    layout: StoreLayout,
}

impl FsSessionStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Allocates a new session id and creates its directory.
    ///
    /// Creation is exclusive, so an id that collides with an existing
    /// session (or one created concurrently by another process) is
    /// redrawn rather than shared.
    pub fn create_session(&self) -> Result<String, SessionError> {
        fs::create_dir_all(&self.layout.temp_root)?;
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = Uuid::new_v4().simple().to_string();
            match fs::create_dir(self.layout.temp_root.join(&id)) {
                Ok(()) => {
                    log::debug!("Created session {id}");
                    return Ok(id);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    log::warn!("Session id {id} already taken, drawing another");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(SessionError::conflict("could not allocate a unique session id"))
    }

    /// Deletes a session directory and everything under it. Missing
    /// sessions are ignored.
    pub fn remove_session(&self, session_id: &str) -> Result<(), SessionError> {
        validate_component("session_id", session_id)?;
        match fs::remove_dir_all(self.layout.temp_root.join(session_id)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Resolves an existing session directory.
    ///
    /// The id must be a single path component, and the canonical path must
    /// still lie under the canonical temp root (a symlinked session that
    /// points elsewhere is rejected).
    pub fn session_dir(&self, session_id: &str) -> Result<PathBuf, SessionError> {
        validate_component("session_id", session_id)?;
        let path = self.layout.temp_root.join(session_id);
        if !path.is_dir() {
            return Err(SessionError::not_found("Session not found"));
        }

        let root = fs::canonicalize(&self.layout.temp_root)?;
        let resolved = fs::canonicalize(&path)?;
        if resolved == root || !resolved.starts_with(&root) {
            return Err(SessionError::validation("Invalid session path"));
        }
        Ok(path)
    }

    /// Path of a group directory inside an existing session. The group
    /// itself may not exist yet.
    pub fn group_dir(&self, session_id: &str, group: &str) -> Result<PathBuf, SessionError> {
        let session = self.session_dir(session_id)?;
        Ok(session.join(validate_component("group", group)?))
    }

    /// Filesystem path an image URI refers to. The file may not exist.
    pub fn image_path(&self, uri: &ImageUri) -> Result<PathBuf, SessionError> {
        let group = self.group_dir(&uri.session_id, &uri.group)?;
        Ok(group.join(validate_component("file name", &uri.file)?))
    }

    /// Session ids currently in the temp store, sorted.
    pub fn list_sessions(&self) -> Result<Vec<String>, SessionError> {
        let entries = match fs::read_dir(&self.layout.temp_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut sessions = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    sessions.push(name.to_string());
                }
            }
        }
        sessions.sort();
        Ok(sessions)
    }

    /// Live group listing: subdirectories only, each with its regular files,
    /// both sorted by name.
    pub fn list_persons(&self, session_id: &str) -> Result<PersonMap, SessionError> {
        let session = self.session_dir(session_id)?;
        let mut persons = PersonMap::new();

        for group in sorted_entries(&session)? {
            if !group.is_dir() {
                continue;
            }
            let Some(group_name) = file_name(&group) else {
                continue;
            };
            let mut images = Vec::new();
            for image in sorted_entries(&group)? {
                if !image.is_file() {
                    continue;
                }
                if let Some(file) = file_name(&image) {
                    images.push(ImageUri::new(session_id, group_name, file).to_string());
                }
            }
            persons.insert(group_name.to_string(), images);
        }
        Ok(persons)
    }

    /// Writes `annotation.json` into the session directory.
    pub fn write_snapshot(&self, session_id: &str, persons: &PersonMap) -> Result<(), SessionError> {
        let path = self.session_dir(session_id)?.join(SNAPSHOT_FILE_NAME);
        write_json(&path, persons)
    }

    /// Reads back the ingest-time snapshot. It is not updated by
    /// corrections, so it may disagree with [`Self::list_persons`].
    pub fn read_snapshot(&self, session_id: &str) -> Result<PersonMap, SessionError> {
        let path = self.session_dir(session_id)?.join(SNAPSHOT_FILE_NAME);
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SessionError::not_found("Snapshot not found"));
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&json).map_err(|e| SessionError::Io(e.into()))
    }

    /// Stores the raw upload as `<uploads_dir>/<session>.mp4`.
    pub fn write_upload(&self, session_id: &str, video: &[u8]) -> Result<PathBuf, SessionError> {
        validate_component("session_id", session_id)?;
        fs::create_dir_all(&self.layout.uploads_dir)?;
        let path = self
            .layout
            .uploads_dir
            .join(format!("{session_id}.{UPLOAD_EXTENSION}"));
        fs::write(&path, video)?;
        Ok(path)
    }

    /// Writes `<annotations_dir>/<session>_summary.json`.
    pub fn write_summary<T: Serialize>(&self, session_id: &str, summary: &T) -> Result<PathBuf, SessionError> {
        validate_component("session_id", session_id)?;
        fs::create_dir_all(&self.layout.annotations_dir)?;
        let path = self
            .layout
            .annotations_dir
            .join(format!("{session_id}{SUMMARY_SUFFIX}"));
        write_json(&path, summary)?;
        Ok(path)
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), SessionError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| SessionError::Io(e.into()))?;
    fs::write(path, json)?;
    Ok(())
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, SessionError> {
    let mut paths = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    paths.sort();
    Ok(paths)
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FsSessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::under(dir.path());
        layout.ensure_dirs().unwrap();
        (dir, FsSessionStore::new(layout))
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"jpeg").unwrap();
    }

    #[test]
    fn test_create_session_makes_directory() {
        let (_dir, store) = store();
        let id = store.create_session().unwrap();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(store.layout().temp_root.join(&id).is_dir());
    }

    #[test]
    fn test_create_session_ids_are_unique() {
        let (_dir, store) = store();
        let a = store.create_session().unwrap();
        let b = store.create_session().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_list_sessions_sorted_dirs_only() {
        let (_dir, store) = store();
        let root = &store.layout().temp_root;
        fs::create_dir(root.join("bbb")).unwrap();
        fs::create_dir(root.join("aaa")).unwrap();
        fs::write(root.join("stray.txt"), b"x").unwrap();
        assert_eq!(store.list_sessions().unwrap(), vec!["aaa", "bbb"]);
    }

    #[test]
    fn test_list_sessions_without_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSessionStore::new(StoreLayout::under(&dir.path().join("missing")));
        assert!(store.list_sessions().unwrap().is_empty());
    }

    #[test]
    fn test_list_persons_groups_and_files_sorted() {
        let (_dir, store) = store();
        let id = store.create_session().unwrap();
        let session = store.session_dir(&id).unwrap();
        touch(&session.join("person_2/f1_id2.jpg"));
        touch(&session.join("person_1/f1_id1.jpg"));
        touch(&session.join("person_1/f0_id1.jpg"));
        fs::create_dir(session.join("empty")).unwrap();
        fs::create_dir(session.join("person_1/nested")).unwrap();
        fs::write(session.join(SNAPSHOT_FILE_NAME), b"{}").unwrap();

        let persons = store.list_persons(&id).unwrap();

        assert_eq!(
            persons.keys().collect::<Vec<_>>(),
            vec!["empty", "person_1", "person_2"]
        );
        assert!(persons["empty"].is_empty());
        assert_eq!(
            persons["person_1"],
            vec![
                format!("/temp/{id}/person_1/f0_id1.jpg"),
                format!("/temp/{id}/person_1/f1_id1.jpg"),
            ]
        );
    }

    #[test]
    fn test_list_persons_unknown_session_not_found() {
        let (_dir, store) = store();
        let err = store.list_persons("0123456789abcdef0123456789abcdef").unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_session_dir_rejects_traversal() {
        let (_dir, store) = store();
        for bad in ["..", ".", "a/b", "../temp"] {
            assert_eq!(store.session_dir(bad).unwrap_err().status_code(), 400);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_session_dir_rejects_symlink_out_of_root() {
        let (dir, store) = store();
        let outside = dir.path().join("outside");
        fs::create_dir(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, store.layout().temp_root.join("evil")).unwrap();
        assert_eq!(store.session_dir("evil").unwrap_err().status_code(), 400);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let (_dir, store) = store();
        let id = store.create_session().unwrap();
        let mut persons = PersonMap::new();
        persons.insert(
            "person_1".into(),
            vec![format!("/temp/{id}/person_1/f0_id1.jpg")],
        );
        store.write_snapshot(&id, &persons).unwrap();
        assert_eq!(store.read_snapshot(&id).unwrap(), persons);
    }

    #[test]
    fn test_read_missing_snapshot_not_found() {
        let (_dir, store) = store();
        let id = store.create_session().unwrap();
        assert_eq!(store.read_snapshot(&id).unwrap_err().status_code(), 404);
    }

    #[test]
    fn test_remove_session() {
        let (_dir, store) = store();
        let id = store.create_session().unwrap();
        touch(&store.session_dir(&id).unwrap().join("person_1/a.jpg"));
        store.remove_session(&id).unwrap();
        assert_eq!(store.session_dir(&id).unwrap_err().status_code(), 404);
        store.remove_session(&id).unwrap();
    }

    #[test]
    fn test_write_upload_and_summary_outside_temp_root() {
        let (_dir, store) = store();
        let id = store.create_session().unwrap();

        let upload = store.write_upload(&id, b"video").unwrap();
        assert_eq!(upload, store.layout().uploads_dir.join(format!("{id}.mp4")));
        assert_eq!(fs::read(&upload).unwrap(), b"video");

        let summary = store
            .write_summary(&id, &serde_json::json!({"session_id": id}))
            .unwrap();
        assert!(summary.ends_with(format!("{id}_summary.json")));
        assert_eq!(store.list_sessions().unwrap(), vec![id]);
    }

    #[test]
    fn test_image_path_resolves_inside_session() {
        let (_dir, store) = store();
        let id = store.create_session().unwrap();
        let uri = ImageUri::new(id.clone(), "person_1", "f0_id1.jpg");
        let path = store.image_path(&uri).unwrap();
        assert_eq!(
            path,
            store.layout().temp_root.join(&id).join("person_1").join("f0_id1.jpg")
        );
    }
}
