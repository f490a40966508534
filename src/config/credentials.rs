//! Portal credentials
//!
//! Credentials come from the command line or from a JSON file. The file may
//! use either `username`/`password` or the portal's `univ_id`/`univ_pw` keys.

use crate::ConfigError;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Default file name searched for credentials
pub const DEFAULT_CREDENTIALS_FILE: &str = "credentials.json";

/// Values shipped in the credentials template that must be replaced
const PLACEHOLDERS: &[&str] = &["학번 또는 ID", "비밀번호", "your-id", "your-password"];

/// Username and password for the portal login
#[derive(Clone, Deserialize)]
pub struct Credentials {
    #[serde(alias = "univ_id")]
    pub username: String,
    #[serde(alias = "univ_pw")]
    pub password: String,
}

impl Credentials {
    /// Creates credentials, rejecting empty or placeholder values
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self, ConfigError> {
        let credentials = Self {
            username: username.into().trim().to_string(),
            password: password.into().trim().to_string(),
        };
        credentials.validate()?;
        Ok(credentials)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.username.is_empty() || self.password.is_empty() {
            return Err(ConfigError::Credentials(
                "username and password must both be set".to_string(),
            ));
        }

        if PLACEHOLDERS.contains(&self.username.as_str())
            || PLACEHOLDERS.contains(&self.password.as_str())
        {
            return Err(ConfigError::Credentials(
                "credentials file still contains template placeholders".to_string(),
            ));
        }

        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Loads credentials from a JSON file
pub fn load_credentials(path: &Path) -> Result<Credentials, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let parsed: Credentials = serde_json::from_str(&content).map_err(|e| {
        ConfigError::Credentials(format!("invalid credentials file {}: {}", path.display(), e))
    })?;
    Credentials::new(parsed.username, parsed.password)
}

/// Resolves credentials from explicit values, falling back to a file
///
/// Explicit values win field by field; the file fills in whatever is missing.
/// Without an explicit path, `credentials.json` is looked up in the working
/// directory and then next to the executable.
pub fn resolve_credentials(
    username: Option<String>,
    password: Option<String>,
    file: Option<&Path>,
) -> Result<Credentials, ConfigError> {
    if let (Some(username), Some(password)) = (&username, &password) {
        return Credentials::new(username.clone(), password.clone());
    }

    let path = match file {
        Some(path) if path.exists() => path.to_path_buf(),
        Some(path) => {
            return Err(ConfigError::Credentials(format!(
                "credentials file {} not found",
                path.display()
            )))
        }
        None => find_credentials_file(&default_search_dirs()).ok_or_else(|| {
            ConfigError::Credentials(format!(
                "no credentials given and no {} in the working directory or next to the executable \
                 (use --username/--password or --credentials)",
                DEFAULT_CREDENTIALS_FILE
            ))
        })?,
    };

    tracing::debug!("Reading credentials from {}", path.display());
    let from_file = load_credentials(&path)?;
    Credentials::new(
        username.unwrap_or(from_file.username),
        password.unwrap_or(from_file.password),
    )
}

/// Working directory first, then the directory holding the executable
fn default_search_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![PathBuf::from(".")];
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        dirs.push(exe_dir);
    }
    dirs
}

/// First `credentials.json` found in `dirs`, in order
fn find_credentials_file(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .map(|dir| dir.join(DEFAULT_CREDENTIALS_FILE))
        .find(|candidate| candidate.is_file())
}
