// Integration tests for configuration loading

use std::fs;
use switchyard_engine::config::Config;
use tempfile::TempDir;

#[test]
fn test_create_default_writes_loadable_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("nested").join("config.toml");

    let created = Config::create_default(&config_path).unwrap();
    assert!(config_path.exists());

    let loaded = Config::load_from_path(&config_path).unwrap();
    assert_eq!(created, loaded);
    assert_eq!(loaded, Config::default());
}

#[test]
fn test_partial_config_gets_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    fs::write(
        &config_path,
        r#"
[backend]
base_url = "http://gpu-box:11434"

[routing]
default_model = "mid-8b"
preferred_code_models = ["qwen-coder-14b"]

[memory]
max_pairs = 4
history_pairs = 2
"#,
    )
    .unwrap();

    let config = Config::load_from_path(&config_path).unwrap();
    let defaults = Config::default();

    assert_eq!(config.backend.base_url, "http://gpu-box:11434");
    assert_eq!(config.backend.request_timeout_secs, defaults.backend.request_timeout_secs);
    assert_eq!(config.routing.default_model, "mid-8b");
    assert_eq!(config.routing.preferred_code_models, vec!["qwen-coder-14b".to_string()]);
    assert_eq!(config.routing.general_model, defaults.routing.general_model);
    assert!(config.routing.fast_router_enabled);
    assert_eq!(config.memory.max_pairs, 4);
    assert_eq!(config.memory.max_turn_chars, defaults.memory.max_turn_chars);
    assert_eq!(config.heuristics, defaults.heuristics);
    assert_eq!(config.prompts, defaults.prompts);
    assert_eq!(config.core.log_level, "info");
}

#[test]
fn test_history_window_larger_than_capacity_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    fs::write(
        &config_path,
        r#"
[memory]
max_pairs = 2
history_pairs = 5
"#,
    )
    .unwrap();

    let err = Config::load_from_path(&config_path).unwrap_err();
    assert!(err.to_string().contains("history_pairs"));
}

#[test]
fn test_invalid_log_level_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    fs::write(&config_path, "[core]\nlog_level = \"loud\"\n").unwrap();

    let err = Config::load_from_path(&config_path).unwrap_err();
    assert!(err.to_string().contains("Invalid log level"));
}

#[test]
fn test_malformed_toml_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    fs::write(&config_path, "[routing\ndefault_model = ").unwrap();

    let err = Config::load_from_path(&config_path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config"));
}

#[test]
fn test_missing_file_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let err = Config::load_from_path(&temp_dir.path().join("absent.toml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
