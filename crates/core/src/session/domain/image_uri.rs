use std::fmt;

use crate::session::domain::path_component::validate_component;
use crate::session::domain::session_error::SessionError;
use crate::shared::constants::TEMP_URI_PREFIX;

/// Client-facing address of one crop: `/temp/<session>/<group>/<file>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImageUri {
    pub session_id: String,
    pub group: String,
    pub file: String,
}

impl ImageUri {
    pub fn new(
        session_id: impl Into<String>,
        group: impl Into<String>,
        file: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            group: group.into(),
            file: file.into(),
        }
    }

    /// Parses a URI, accepting only the exact four-segment temp form with
    /// every segment a single safe path component.
    pub fn parse(uri: &str) -> Result<Self, SessionError> {
        if uri.is_empty() {
            return Err(SessionError::validation("path required"));
        }
        let rest = uri
            .strip_prefix(TEMP_URI_PREFIX)
            .and_then(|r| r.strip_prefix('/'))
            .ok_or_else(|| SessionError::validation("Only /temp/ paths supported"))?;

        let parts: Vec<&str> = rest.split('/').collect();
        let [session_id, group, file] = parts.as_slice() else {
            return Err(SessionError::validation(format!("Invalid path: {uri}")));
        };

        Ok(Self::new(
            validate_component("session_id", session_id)?,
            validate_component("group", group)?,
            validate_component("file name", file)?,
        ))
    }
}

impl fmt::Display for ImageUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{TEMP_URI_PREFIX}/{}/{}/{}",
            self.session_id, self.group, self.file
        )
    }
}
