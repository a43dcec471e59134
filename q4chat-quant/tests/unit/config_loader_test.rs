use super::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_load_valid_config() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("config.json"),
        r#"{"dim": 16, "hidden_dim": 32, "n_layers": 2}"#,
    )
    .unwrap();

    let config = load_export_config(dir.path()).unwrap();
    assert_eq!(
        config,
        ExportConfig {
            dim: 16,
            hidden_dim: 32,
            n_layers: 2
        }
    );
}

#[test]
fn test_missing_config_fails() {
    let dir = TempDir::new().unwrap();
    assert!(load_export_config(dir.path()).is_err());
}

#[test]
fn test_malformed_config_fails() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("config.json"), r#"{"dim": 16}"#).unwrap();
    assert!(load_export_config(dir.path()).is_err());
}

#[test]
fn test_zero_dimension_rejected() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("config.json"),
        r#"{"dim": 16, "hidden_dim": 0, "n_layers": 2}"#,
    )
    .unwrap();
    assert!(load_export_config(dir.path()).is_err());
}
