//! Persistence of Emporia session tokens
//!
//! The Cognito tokens are written to a small JSON file so a restart reuses
//! the existing session instead of logging in with the password again.

use crate::error::Result;
use crate::logging::get_logger;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Stored session tokens
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Account the tokens belong to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl StoredTokens {
    /// Whether there is enough to authenticate requests or refresh
    pub fn is_usable(&self) -> bool {
        self.id_token.as_deref().is_some_and(|t| !t.is_empty())
            || self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Token file manager
pub struct TokenStore {
    path: PathBuf,
    logger: crate::logging::StructuredLogger,
}

impl TokenStore {
    /// Create a new token store backed by `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            logger: get_logger("persistence"),
        }
    }

    /// Load tokens from disk; a missing or unreadable file yields empty tokens
    pub fn load(&self) -> StoredTokens {
        if !self.path.exists() {
            self.logger
                .info("No stored session tokens found, will log in");
            return StoredTokens::default();
        }
        match self.try_load() {
            Ok(tokens) => {
                self.logger.debug("Loaded stored session tokens");
                tokens
            }
            Err(e) => {
                self.logger.warn(&format!(
                    "Ignoring unreadable token file {}: {}",
                    self.path.display(),
                    e
                ));
                StoredTokens::default()
            }
        }
    }

    fn try_load(&self) -> Result<StoredTokens> {
        let contents = std::fs::read_to_string(&self.path)?;
        let tokens = serde_json::from_str(&contents)?;
        Ok(tokens)
    }

    /// Save tokens to disk, creating the parent directory if needed
    pub fn save(&self, tokens: &StoredTokens) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(tokens)?;
        let mut file = open_private(&self.path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        self.logger.debug("Saved session tokens to disk");
        Ok(())
    }
}

/// Open for writing, readable by the owner only from the first byte
#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // `mode` only applies when the file is created
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}
