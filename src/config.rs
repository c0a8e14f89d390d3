//! Configuration for Bookshelf

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable holding the service account JSON
pub const CREDENTIALS_VAR: &str = "FIREBASE_CREDENTIALS";
pub const PROJECT_VAR: &str = "FIRESTORE_PROJECT_ID";
pub const EMULATOR_VAR: &str = "FIRESTORE_EMULATOR_HOST";
pub const PORT_VAR: &str = "BOOKSHELF_PORT";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Firestore connection settings
    #[serde(default)]
    pub firestore: FirestoreConfig,

    /// Where books are read from and written to
    #[serde(default)]
    pub books: BooksConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirestoreConfig {
    /// Google Cloud project that owns the database
    #[serde(default = "default_project_id")]
    pub project_id: String,

    /// Database name within the project
    #[serde(default = "default_database")]
    pub database: String,

    /// host:port of a local Firestore emulator
    #[serde(default)]
    pub emulator_host: Option<String>,

    /// Documents requested per list page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Service account JSON. Only ever read from the environment.
    #[serde(skip)]
    pub credentials: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BooksConfig {
    /// Collection used by list, create and update
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Collection used by delete
    #[serde(default = "default_delete_collection")]
    pub delete_collection: String,

    /// Document written by create and update and targeted by delete
    #[serde(default = "default_document_id")]
    pub document_id: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            firestore: FirestoreConfig::default(),
            books: BooksConfig::default(),
        }
    }
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            project_id: default_project_id(),
            database: default_database(),
            emulator_host: None,
            page_size: default_page_size(),
            credentials: None,
        }
    }
}

impl Default for BooksConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            delete_collection: default_delete_collection(),
            document_id: default_document_id(),
        }
    }
}

impl Config {
    /// Load config from the default location (if present) and the environment
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::read_file(&path)?,
            _ => Config::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Load config from an explicit file, then apply the environment
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let mut config = Self::read_file(path)?;
        config.apply_env()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Default config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("bookshelf").join("config.toml"))
    }

    /// Apply overrides from process environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides using `lookup` to resolve variable names
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(credentials) = lookup(CREDENTIALS_VAR).filter(|v| !v.trim().is_empty()) {
            self.firestore.credentials = Some(credentials);
        }
        if let Some(project_id) = lookup(PROJECT_VAR).filter(|v| !v.is_empty()) {
            self.firestore.project_id = project_id;
        }
        if let Some(host) = lookup(EMULATOR_VAR).filter(|v| !v.is_empty()) {
            self.firestore.emulator_host = Some(host);
        }
        if let Some(port) = lookup(PORT_VAR) {
            self.http_port = port
                .parse()
                .map_err(|_| Error::Config(format!("{} is not a valid port: {}", PORT_VAR, port)))?;
        }
        Ok(())
    }

    /// Root URL of the Firestore REST API
    pub fn firestore_base_url(&self) -> String {
        match &self.firestore.emulator_host {
            Some(host) => format!("http://{}/v1", host.trim_end_matches('/')),
            None => "https://firestore.googleapis.com/v1".to_string(),
        }
    }

    /// Save config to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// Default value functions

fn default_http_port() -> u16 {
    8000
}

fn default_project_id() -> String {
    "gdgoc-backend-6ba98".to_string()
}

fn default_database() -> String {
    "(default)".to_string()
}

fn default_page_size() -> u32 {
    300
}

fn default_collection() -> String {
    "gdgoc".to_string()
}

fn default_delete_collection() -> String {
    "items".to_string()
}

fn default_document_id() -> String {
    "2".to_string()
}
