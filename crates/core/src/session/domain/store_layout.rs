use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Directory roots of the on-disk store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreLayout {
    /// Editable sessions: `<temp_root>/<session>/<group>/<file>`.
    pub temp_root: PathBuf,
    /// Promoted datasets: `<persons_root>/dataset_<N>`.
    pub persons_root: PathBuf,
    /// Raw uploads, one `<session>.mp4` per ingest.
    pub uploads_dir: PathBuf,
    /// Ingest summaries, one `<session>_summary.json` per ingest.
    pub annotations_dir: PathBuf,
}

impl StoreLayout {
    /// Conventional layout with every root under `base`.
    pub fn under(base: &Path) -> Self {
        Self {
            temp_root: base.join("temp"),
            persons_root: base.join("persons"),
            uploads_dir: base.join("uploads"),
            annotations_dir: base.join("annotations"),
        }
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            &self.temp_root,
            &self.persons_root,
            &self.uploads_dir,
            &self.annotations_dir,
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}
