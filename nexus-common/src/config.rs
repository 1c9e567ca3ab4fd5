//! Bootstrap configuration and root folder resolution
//!
//! Root folder priority:
//! 1. `--root-folder` command-line argument
//! 2. `NEXUS_ROOT_FOLDER` environment variable
//! 3. `root_folder` in the TOML config file
//! 4. OS-dependent compiled default
//!
//! Nothing here fails startup: a missing or malformed config file falls back
//! to defaults with a warning.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{Error, Result};

pub const ROOT_FOLDER_ENV: &str = "NEXUS_ROOT_FOLDER";
pub const CONFIG_PATH_ENV: &str = "NEXUS_CONFIG";

const APP_DIR: &str = "crm-nexus";
const DATABASE_FILE: &str = "crm-nexus.db";
const DOCUMENTS_DIR: &str = "documents";

/// Defaults compiled into the binary
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub bind_address: String,
    pub port: u16,
    pub log_level: String,
    pub max_upload_bytes: usize,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            bind_address: default_bind_address(),
            port: default_port(),
            log_level: default_log_level(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(format!("./{}-data", APP_DIR)))
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5780
}

fn default_true() -> bool {
    true
}

fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Contents of `config.toml`; every key is optional
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Require a bearer token on `/api/*`
    #[serde(default = "default_true")]
    pub require_auth: bool,

    /// Largest accepted document upload
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Allowed CORS origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            bind_address: default_bind_address(),
            port: default_port(),
            require_auth: true,
            max_upload_bytes: default_max_upload_bytes(),
            logging: LoggingConfig::default(),
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error; `RUST_LOG` wins when set
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// `<config_dir>/crm-nexus/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
}

/// Parse a config file, reporting why it could not be used
pub fn read_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
}

/// Load the config from `path`, `NEXUS_CONFIG`, or the default location
///
/// Never fails: a missing file yields defaults silently, an unreadable or
/// malformed one yields defaults with a warning.
pub fn load_toml_config(path: Option<&Path>) -> TomlConfig {
    let path = path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
        .or_else(default_config_path);

    let Some(path) = path else {
        return TomlConfig::default();
    };
    if !path.exists() {
        info!("No config file at {}, using defaults", path.display());
        return TomlConfig::default();
    }

    match read_toml_config(&path) {
        Ok(config) => {
            info!("Loaded config from {}", path.display());
            config
        }
        Err(e) => {
            warn!("Ignoring config file: {}", e);
            TomlConfig::default()
        }
    }
}

/// Decides which root folder the service uses
#[derive(Debug, Clone, Default)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    config_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(cli_arg: Option<PathBuf>) -> Self {
        Self {
            cli_arg,
            config_root: None,
        }
    }

    /// Consider `root_folder` from a loaded config file
    pub fn with_config(mut self, config: &TomlConfig) -> Self {
        self.config_root = config.root_folder.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Some(path) = std::env::var_os(ROOT_FOLDER_ENV).filter(|v| !v.is_empty()) {
            return PathBuf::from(path);
        }

        if let Some(path) = &self.config_root {
            return path.clone();
        }

        default_root_folder()
    }
}

/// Creates the root folder layout and names the files inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root and documents folders if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        let documents = self.documents_path();
        if !documents.exists() {
            std::fs::create_dir_all(&documents).map_err(|e| {
                Error::Config(format!("Cannot create {}: {}", documents.display(), e))
            })?;
            info!("Created {}", documents.display());
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_FILE)
    }

    pub fn documents_path(&self) -> PathBuf {
        self.root.join(DOCUMENTS_DIR)
    }
}
