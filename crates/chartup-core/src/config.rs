use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Name of the optional project configuration file.
pub const CONFIG_FILE: &str = "chartup.toml";

/// chartup.toml configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChartupConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub manifest: ManifestConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub release: ReleaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Chart directory used by `chartup up` (defaults to helm)
    #[serde(default = "default_chart_dir")]
    pub chart_dir: String,
    /// Release name (defaults to the working directory name)
    pub release_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    /// Image manifest file name inside the chart directory
    #[serde(default = "default_manifest_file")]
    pub file: String,
    /// What to do with an entry missing `reference` or `sourcePath`
    #[serde(default)]
    pub on_invalid_entry: InvalidEntryPolicy,
}

/// Handling of manifest entries that are mappings but lack a required field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidEntryPolicy {
    /// The whole resolution fails.
    #[default]
    Fail,
    /// The entry is dropped with a warning and resolution continues.
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Container tool invoked as `<tool> build` / `<tool> push`
    #[serde(default = "default_tool")]
    pub tool: String,
    /// Upper bound for a single build or push invocation
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Quiet period used to coalesce bursts of events (0 disables coalescing)
    #[serde(default)]
    pub debounce_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseConfig {
    /// helm binary
    #[serde(default = "default_helm_bin")]
    pub helm_bin: String,
    /// Upper bound for a single helm invocation
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Pass --dry-run to every helm invocation
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            chart_dir: default_chart_dir(),
            release_name: None,
        }
    }
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            file: default_manifest_file(),
            on_invalid_entry: InvalidEntryPolicy::default(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            tool: default_tool(),
            timeout_secs: None,
        }
    }
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            helm_bin: default_helm_bin(),
            timeout_secs: None,
            dry_run: false,
        }
    }
}

impl BuildConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl WatchConfig {
    /// `None` when coalescing is disabled.
    pub fn debounce(&self) -> Option<Duration> {
        (self.debounce_ms > 0).then(|| Duration::from_millis(self.debounce_ms))
    }
}

impl ReleaseConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl ChartupConfig {
    /// Load from chartup.toml at the given path, or return defaults if not found.
    pub fn load(project_dir: &Path) -> crate::Result<Self> {
        let config_path = project_dir.join(CONFIG_FILE);
        let config: Self = if config_path.exists() {
            let content =
                std::fs::read_to_string(&config_path).map_err(|e| crate::Error::ConfigLoad {
                    path: config_path.clone(),
                    source: e,
                })?;
            toml::from_str(&content).map_err(|e| crate::Error::ConfigParse {
                path: config_path,
                source: e,
            })?
        } else {
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> crate::Result<()> {
        let required = [
            ("project.chart_dir", &self.project.chart_dir),
            ("manifest.file", &self.manifest.file),
            ("build.tool", &self.build.tool),
            ("release.helm_bin", &self.release.helm_bin),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(crate::Error::InvalidConfig {
                    field,
                    reason: "must not be empty".to_owned(),
                });
            }
        }

        if let Some(name) = &self.project.release_name
            && name.trim().is_empty()
        {
            return Err(crate::Error::InvalidConfig {
                field: "project.release_name",
                reason: "must not be empty when set".to_owned(),
            });
        }

        Ok(())
    }
}

fn default_chart_dir() -> String {
    "helm".to_owned()
}

fn default_manifest_file() -> String {
    "images.yaml".to_owned()
}

fn default_tool() -> String {
    "docker".to_owned()
}

fn default_helm_bin() -> String {
    "helm".to_owned()
}
