use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;
use weft_core::config::{
    ConfigError, DEFAULT_CONNECT_BASE_DELAY_MS, DEFAULT_FLUSH_MAX_ROUNDS, DEFAULT_GRAPH_DATABASE,
    DEFAULT_RESOURCE_DATABASE, ENV_EXTRACT_CONCURRENCY, ENV_LANGUAGE,
};
use weft_core::graph::Label;
use weft_core::{Config, Language};

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.graph.database, DEFAULT_GRAPH_DATABASE);
    assert_eq!(config.retry.flush_max_rounds, DEFAULT_FLUSH_MAX_ROUNDS);
    assert_eq!(config.retry.connect_base_delay_ms, DEFAULT_CONNECT_BASE_DELAY_MS);
    assert_eq!(config.extraction.resource_database, DEFAULT_RESOURCE_DATABASE);
    assert!(config.project.language.is_none());
    assert!(config.project.exclude_dirs.iter().any(|d| d == "node_modules"));
}

#[test]
fn test_config_to_toml_omits_password() {
    let mut config = Config::default();
    config.graph.password = Some("hunter2".to_string());
    let toml_str = config.to_toml_string();
    assert!(toml_str.contains("[graph]"));
    assert!(toml_str.contains("[project]"));
    assert!(toml_str.contains("[retry]"));
    assert!(!toml_str.contains("hunter2"));
}

#[test]
fn test_config_from_toml() {
    let toml_str = r#"
[graph]
endpoint = "bolt://graph:7687"
user = "neo4j"

[project]
name = "Shop"
language = "java"
exclude_dirs = ["build"]

[retry]
flush_max_rounds = 2

[palette]
Class = "white"
"#;
    let config = Config::from_toml(toml_str).unwrap();
    assert_eq!(config.graph.endpoint.as_deref(), Some("bolt://graph:7687"));
    assert_eq!(config.project.name, "Shop");
    assert_eq!(config.project.language, Some(Language::Java));
    assert_eq!(config.project.exclude_dirs, vec!["build".to_string()]);
    assert_eq!(config.retry.flush_max_rounds, 2);
    assert_eq!(config.retry.connect_base_delay_ms, DEFAULT_CONNECT_BASE_DELAY_MS);
    assert_eq!(config.palette.color(Label::Class), Some("white"));
    assert_eq!(config.palette.color(Label::Root), Some("orange"));
}

#[test]
fn test_environment_overrides_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("weft.toml");
    fs::write(
        &path,
        "[project]\nname = \"FromFile\"\nsource_root = \"/srv/code\"\n\n[extraction]\nconcurrency = 2\n",
    )
    .unwrap();

    let mut config = Config::from_file(&path).unwrap();
    config
        .apply_overrides(env(&[
            ("PROJECT_NAME", "FromEnv"),
            ("LANGUAGE", "golang"),
            ("EXTRACT_CONCURRENCY", "8"),
        ]))
        .unwrap();

    assert_eq!(config.project.name, "FromEnv");
    assert_eq!(config.project.source_root, PathBuf::from("/srv/code"));
    assert_eq!(config.project.language, Some(Language::Go));
    assert_eq!(config.extraction.concurrency(), 8);
    config.validate_settings().unwrap();
    assert!(matches!(config.validate(), Err(ConfigError::Missing(_))));
}

#[test]
fn test_unknown_language_is_invalid() {
    let mut config = Config::default();
    let result = config.apply_overrides(env(&[("LANGUAGE", "cobol")]));
    assert!(matches!(result, Err(ConfigError::Invalid { key: ENV_LANGUAGE, .. })));
}

#[test]
fn test_zero_concurrency_is_rejected() {
    let mut config = Config::default();
    config.apply_overrides(env(&[("EXTRACT_CONCURRENCY", "0")])).unwrap();
    assert!(matches!(
        config.validate_settings(),
        Err(ConfigError::Invalid { key: ENV_EXTRACT_CONCURRENCY, .. })
    ));
}

#[test]
fn test_malformed_file_is_a_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("weft.toml");
    fs::write(&path, "[project\nname = ").unwrap();
    assert!(matches!(Config::from_file(&path), Err(ConfigError::ParseError(_))));
}
