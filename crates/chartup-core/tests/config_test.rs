use chartup_core::{ChartupConfig, InvalidEntryPolicy};
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn load_returns_defaults_when_no_config_file() {
    let tmp = TempDir::new().unwrap();
    let config = ChartupConfig::load(tmp.path()).unwrap();

    assert_eq!(config.project.chart_dir, "helm");
    assert!(config.project.release_name.is_none());
    assert_eq!(config.manifest.file, "images.yaml");
    assert_eq!(config.manifest.on_invalid_entry, InvalidEntryPolicy::Fail);
    assert_eq!(config.build.tool, "docker");
    assert!(config.build.timeout().is_none());
    assert!(config.watch.debounce().is_none());
    assert_eq!(config.release.helm_bin, "helm");
    assert!(config.release.timeout().is_none());
    assert!(!config.release.dry_run);
}

#[test]
fn load_parses_full_config() {
    let tmp = TempDir::new().unwrap();
    let toml = r#"
[project]
chart_dir = "deploy/chart"
release_name = "shop"

[manifest]
file = "images.dev.yaml"
on_invalid_entry = "skip"

[build]
tool = "podman"
timeout_secs = 600

[watch]
debounce_ms = 250

[release]
helm_bin = "/usr/local/bin/helm3"
timeout_secs = 90
dry_run = true
"#;
    std::fs::write(tmp.path().join("chartup.toml"), toml).unwrap();

    let config = ChartupConfig::load(tmp.path()).unwrap();

    assert_eq!(config.project.chart_dir, "deploy/chart");
    assert_eq!(config.project.release_name.as_deref(), Some("shop"));
    assert_eq!(config.manifest.file, "images.dev.yaml");
    assert_eq!(config.manifest.on_invalid_entry, InvalidEntryPolicy::Skip);
    assert_eq!(config.build.tool, "podman");
    assert_eq!(config.build.timeout(), Some(Duration::from_secs(600)));
    assert_eq!(config.watch.debounce(), Some(Duration::from_millis(250)));
    assert_eq!(config.release.helm_bin, "/usr/local/bin/helm3");
    assert_eq!(config.release.timeout(), Some(Duration::from_secs(90)));
    assert!(config.release.dry_run);
}

#[test]
fn load_partial_config_fills_defaults() {
    let tmp = TempDir::new().unwrap();
    let toml = r#"
[build]
tool = "podman"
"#;
    std::fs::write(tmp.path().join("chartup.toml"), toml).unwrap();

    let config = ChartupConfig::load(tmp.path()).unwrap();

    assert_eq!(config.build.tool, "podman");
    // Defaults preserved
    assert_eq!(config.project.chart_dir, "helm");
    assert_eq!(config.manifest.file, "images.yaml");
    assert_eq!(config.release.helm_bin, "helm");
}

#[test]
fn load_invalid_toml_returns_parse_error() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("chartup.toml"), "not valid {{{{ toml").unwrap();

    let result = ChartupConfig::load(tmp.path());
    assert!(result.is_err());

    let err = result.unwrap_err().to_string();
    assert!(err.contains("parse"));
}

#[test]
fn load_empty_config_returns_defaults() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("chartup.toml"), "").unwrap();

    let config = ChartupConfig::load(tmp.path()).unwrap();
    assert_eq!(config.project.chart_dir, "helm");
}

#[test]
fn load_rejects_unknown_invalid_entry_policy() {
    let tmp = TempDir::new().unwrap();
    let toml = r#"
[manifest]
on_invalid_entry = "ignore"
"#;
    std::fs::write(tmp.path().join("chartup.toml"), toml).unwrap();

    assert!(ChartupConfig::load(tmp.path()).is_err());
}

#[test]
fn load_rejects_empty_tool() {
    let tmp = TempDir::new().unwrap();
    let toml = r#"
[build]
tool = "  "
"#;
    std::fs::write(tmp.path().join("chartup.toml"), toml).unwrap();

    let err = ChartupConfig::load(tmp.path()).unwrap_err().to_string();
    assert!(err.contains("build.tool"));
}

#[test]
fn load_rejects_blank_release_name() {
    let tmp = TempDir::new().unwrap();
    let toml = r#"
[project]
release_name = ""
"#;
    std::fs::write(tmp.path().join("chartup.toml"), toml).unwrap();

    let err = ChartupConfig::load(tmp.path()).unwrap_err().to_string();
    assert!(err.contains("project.release_name"));
}

#[test]
fn zero_debounce_disables_coalescing() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(
        tmp.path().join("chartup.toml"),
        "[watch]\ndebounce_ms = 0\n",
    )
    .unwrap();

    let config = ChartupConfig::load(tmp.path()).unwrap();
    assert!(config.watch.debounce().is_none());
}
