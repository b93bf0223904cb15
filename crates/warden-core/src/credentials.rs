use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::{domain::SessionCredentials, errors::Error, Result};

/// Durable home of the session credentials blob.
///
/// Saves go through a sibling temp file and a rename, so readers only ever see
/// the previous or the new snapshot, never a partial write.
#[derive(Clone, Debug)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the blob. Missing, blank or non-JSON files are configuration errors.
    pub fn load(&self) -> Result<SessionCredentials> {
        let raw = fs::read_to_string(&self.path).map_err(|e| self.invalid(e.to_string()))?;
        if raw.trim().is_empty() {
            return Err(self.invalid("file empty".to_string()));
        }
        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| self.invalid(e.to_string()))?;
        Ok(SessionCredentials(value))
    }

    pub fn save(&self, credentials: &SessionCredentials) -> Result<()> {
        let txt = serde_json::to_string_pretty(credentials)?;
        let tmp = self.temp_path();

        let write = || -> Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(txt.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)?;
            Ok(())
        };

        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "appstate.json".to_string());
        self.path.with_file_name(format!(".{name}.tmp"))
    }

    fn invalid(&self, reason: String) -> Error {
        Error::InvalidFile {
            path: self.path.clone(),
            reason,
        }
    }
}
