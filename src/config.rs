// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the download metrics reports.

use crate::cache::DEFAULT_TTL_HOURS;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub warehouse: WarehouseSource,
    #[serde(default)]
    pub projects: ProjectsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Where daily download counts are read from.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WarehouseSource {
    Sqlite {
        path: Utf8PathBuf,
    },
    Bigquery {
        /// Google Cloud project that runs (and pays for) the query.
        project: String,
        /// Fully qualified table, e.g. `dataset_project.dataset.table`.
        table: String,
        /// Environment variable holding an OAuth access token.
        #[serde(default = "default_token_env")]
        token_env: String,
        #[serde(default)]
        location: Option<String>,
    },
}

fn default_token_env() -> String {
    "BIGQUERY_ACCESS_TOKEN".to_string()
}

impl Default for WarehouseSource {
    fn default() -> Self {
        WarehouseSource::Sqlite {
            path: Utf8PathBuf::from("pypi-downloads.db"),
        }
    }
}

/// The allow-list of tracked packages and the default selections.
///
/// Omitted selections are derived from `tracked`, so a section that only
/// changes the allow-list stays valid.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(from = "RawProjectsConfig")]
pub struct ProjectsConfig {
    pub tracked: Vec<String>,
    /// Packages preselected in the comparison view.
    pub default_selection: Vec<String>,
    /// Package shown in the trend view.
    pub featured: String,
}

impl Default for ProjectsConfig {
    fn default() -> Self {
        Self {
            tracked: ["pandas", "keras", "torch", "tensorflow", "numpy", "scikit-learn"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            default_selection: vec!["pandas".to_string(), "keras".to_string()],
            featured: "pandas".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawProjectsConfig {
    tracked: Option<Vec<String>>,
    default_selection: Option<Vec<String>>,
    featured: Option<String>,
}

impl From<RawProjectsConfig> for ProjectsConfig {
    fn from(raw: RawProjectsConfig) -> Self {
        let defaults = ProjectsConfig::default();
        let Some(tracked) = raw.tracked else {
            return ProjectsConfig {
                default_selection: raw.default_selection.unwrap_or(defaults.default_selection),
                featured: raw.featured.unwrap_or(defaults.featured),
                ..defaults
            };
        };

        let is_tracked = |name: &String| tracked.contains(name);
        let default_selection = raw.default_selection.unwrap_or_else(|| {
            let kept: Vec<String> = defaults
                .default_selection
                .iter()
                .filter(|name| is_tracked(name))
                .cloned()
                .collect();
            if kept.is_empty() {
                tracked.iter().take(1).cloned().collect()
            } else {
                kept
            }
        });
        let featured = raw.featured.unwrap_or_else(|| {
            if is_tracked(&defaults.featured) {
                defaults.featured.clone()
            } else {
                tracked.first().cloned().unwrap_or(defaults.featured.clone())
            }
        });

        ProjectsConfig {
            tracked,
            default_selection,
            featured,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Hours to reuse query results; 0 disables caching.
    pub ttl_hours: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_hours: DEFAULT_TTL_HOURS,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let content = fs::read_to_string(path.as_std_path())
            .with_context(|| format!("failed to read config file at {}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file at {}", path))?;
        config
            .validate()
            .with_context(|| format!("invalid config file at {}", path))?;
        Ok(config)
    }

    /// Load configuration, falling back to the defaults when the file does
    /// not exist.
    pub fn load_or_default(path: &Utf8Path) -> Result<Self> {
        if path.as_std_path().exists() {
            Self::load(path)
        } else {
            tracing::info!(%path, "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Check that the selections refer to tracked packages.
    pub fn validate(&self) -> Result<()> {
        let projects = &self.projects;
        if projects.tracked.is_empty() {
            anyhow::bail!("projects.tracked must list at least one package");
        }
        if !projects.tracked.contains(&projects.featured) {
            anyhow::bail!(
                "featured package '{}' is not in projects.tracked",
                projects.featured
            );
        }
        for name in &projects.default_selection {
            if !projects.tracked.contains(name) {
                anyhow::bail!("default selection '{}' is not in projects.tracked", name);
            }
        }
        Ok(())
    }
}
