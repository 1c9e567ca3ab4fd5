//! Configuration resolution and graceful degradation
//!
//! Uses serial_test: tests that touch NEXUS_ROOT_FOLDER or NEXUS_CONFIG are
//! marked #[serial] so they never run in parallel.

use nexus_common::config::{
    load_toml_config, read_toml_config, CompiledDefaults, RootFolderInitializer,
    RootFolderResolver, TomlConfig, CONFIG_PATH_ENV, ROOT_FOLDER_ENV,
};
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::PathBuf;
use tempfile::{NamedTempFile, TempDir};

#[test]
fn test_compiled_defaults() {
    let defaults = CompiledDefaults::for_current_platform();

    assert!(!defaults.root_folder.as_os_str().is_empty());
    assert!(defaults.root_folder.to_string_lossy().contains("crm-nexus"));
    assert_eq!(defaults.bind_address, "127.0.0.1");
    assert_eq!(defaults.port, 5780);
    assert_eq!(defaults.log_level, "info");
    assert_eq!(defaults.max_upload_bytes, 25 * 1024 * 1024);
}

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    env::remove_var(ROOT_FOLDER_ENV);

    let root_folder = RootFolderResolver::new(None).resolve();
    assert_eq!(root_folder, CompiledDefaults::for_current_platform().root_folder);
}

#[test]
#[serial]
fn test_resolver_env_var() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/nexus-test-env-root");

    let root_folder = RootFolderResolver::new(None).resolve();
    assert_eq!(root_folder, PathBuf::from("/tmp/nexus-test-env-root"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_resolver_cli_beats_env() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/nexus-from-env");

    let resolver = RootFolderResolver::new(Some(PathBuf::from("/tmp/nexus-from-cli")));
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/nexus-from-cli"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_resolver_env_beats_config_file() {
    env::remove_var(ROOT_FOLDER_ENV);
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/nexus-from-toml")),
        ..Default::default()
    };

    let resolver = RootFolderResolver::new(None).with_config(&config);
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/nexus-from-toml"));

    env::set_var(ROOT_FOLDER_ENV, "/tmp/nexus-from-env");
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/nexus-from-env"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
fn test_initializer_paths() {
    let initializer = RootFolderInitializer::new(PathBuf::from("/srv/crm"));

    assert_eq!(initializer.database_path(), PathBuf::from("/srv/crm/crm-nexus.db"));
    assert_eq!(initializer.documents_path(), PathBuf::from("/srv/crm/documents"));
    assert_eq!(initializer.root(), PathBuf::from("/srv/crm").as_path());
}

#[test]
fn test_initializer_creates_nested_directories() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("a").join("b").join("crm");
    let initializer = RootFolderInitializer::new(root.clone());

    initializer.ensure_directory_exists().unwrap();
    assert!(root.is_dir());
    assert!(initializer.documents_path().is_dir());

    // second call is a no-op
    initializer.ensure_directory_exists().unwrap();
}

#[test]
fn test_toml_all_keys() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
root_folder = "/var/lib/crm"
bind_address = "0.0.0.0"
port = 8080
require_auth = false
max_upload_bytes = 1048576
cors_origins = ["http://localhost:3000"]

[logging]
level = "debug"
"#
    )
    .unwrap();

    let config = read_toml_config(file.path()).unwrap();
    assert_eq!(config.root_folder, Some(PathBuf::from("/var/lib/crm")));
    assert_eq!(config.bind_address, "0.0.0.0");
    assert_eq!(config.port, 8080);
    assert!(!config.require_auth);
    assert_eq!(config.max_upload_bytes, 1_048_576);
    assert_eq!(config.cors_origins, vec!["http://localhost:3000".to_string()]);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_toml_missing_keys_use_defaults() {
    let config: TomlConfig = toml::from_str("port = 9000").unwrap();

    assert_eq!(config.port, 9000);
    assert_eq!(config.bind_address, "127.0.0.1");
    assert!(config.require_auth);
    assert!(config.root_folder.is_none());
    assert!(config.cors_origins.is_empty());
    assert_eq!(config.logging.level, "info");
}

#[test]
#[serial]
fn test_missing_config_file_does_not_error() {
    env::remove_var(CONFIG_PATH_ENV);
    let temp_dir = TempDir::new().unwrap();

    let config = load_toml_config(Some(&temp_dir.path().join("absent.toml")));
    assert_eq!(config.port, 5780);
}

#[test]
#[serial]
fn test_malformed_config_falls_back_to_defaults() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "port = \"not a number").unwrap();

    assert!(read_toml_config(file.path()).is_err());

    env::set_var(CONFIG_PATH_ENV, file.path());
    let config = load_toml_config(None);
    assert_eq!(config.port, 5780);
    env::remove_var(CONFIG_PATH_ENV);
}

#[test]
#[serial]
fn test_config_path_from_env() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "port = 6001").unwrap();

    env::set_var(CONFIG_PATH_ENV, file.path());
    assert_eq!(load_toml_config(None).port, 6001);
    env::remove_var(CONFIG_PATH_ENV);
}
