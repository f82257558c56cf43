//! Configuration and credential storage

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::{StoredToken, TokenStore};
use crate::models::CurrentUser;

/// Polling period for live queries against stores without push.
const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

/// Application configuration
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Firebase project ID
    pub project_id: Option<String>,
    /// Firebase web API key (Identity Toolkit)
    pub api_key: Option<String>,
    /// Firestore REST base URL override (e.g. the local emulator)
    pub firestore_url: Option<String>,
    /// Live query polling period in milliseconds
    pub poll_interval_ms: Option<u64>,
    /// Stored Firebase ID token
    pub id_token: Option<StoredToken>,
    /// Stored refresh token
    pub refresh_token: Option<String>,
    /// Profile of the signed-in account
    pub profile: Option<CurrentUser>,
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "firechat", "firechat")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        Self::parse(&content)
    }

    fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir).context("Failed to create config directory")?;

        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;

        // Set restrictive permissions on config file (contains tokens)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }

    pub fn require_project_id(&self) -> Result<&str> {
        self.project_id
            .as_deref()
            .context("No Firebase project configured. Run 'firechat init'.")
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .context("No Firebase API key configured. Run 'firechat init'.")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS))
    }

    /// Point the config at a Firebase project. Switching projects drops any
    /// stored session, since its tokens belong to the old project.
    pub fn set_project(
        &mut self,
        project_id: &str,
        api_key: &str,
        firestore_url: Option<String>,
        poll_interval_ms: Option<u64>,
    ) {
        if self.project_id.as_deref().is_some_and(|p| p != project_id) {
            self.clear_tokens();
        }
        self.project_id = Some(project_id.to_string());
        self.api_key = Some(api_key.to_string());
        self.firestore_url = firestore_url;
        if poll_interval_ms.is_some() {
            self.poll_interval_ms = poll_interval_ms;
        }
    }
}

/// Store project settings (`firechat init`).
pub fn init(
    project_id: &str,
    api_key: &str,
    firestore_url: Option<String>,
    poll_interval_ms: Option<u64>,
) -> Result<()> {
    let mut config = Config::load()?;
    config.set_project(project_id, api_key, firestore_url, poll_interval_ms);
    config.save()?;

    println!("Configured project {}", project_id);
    if let Some(ref url) = config.firestore_url {
        println!("Firestore endpoint: {}", url);
    }
    println!("Next: firechat login --email <address>");
    Ok(())
}

impl TokenStore for Config {
    fn get_id_token(&self) -> Option<StoredToken> {
        self.id_token.clone()
    }

    fn set_id_token(&mut self, token: String, expires_in: Option<u64>) {
        self.id_token = Some(StoredToken::new(token, expires_in));
    }

    fn get_refresh_token(&self) -> Option<String> {
        self.refresh_token.clone()
    }

    fn set_refresh_token(&mut self, token: String) {
        self.refresh_token = Some(token);
    }

    fn clear_tokens(&mut self) {
        self.id_token = None;
        self.refresh_token = None;
        self.profile = None;
    }
}
