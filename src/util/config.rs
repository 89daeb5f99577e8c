//! Configuration file support for capgen.
//!
//! capgen supports two configuration file locations:
//! - Global: `~/.capgen/config.toml` - User-wide defaults
//! - Project: `.capgen/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config, and command-line
//! flags take precedence over both.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::emitter::{EmitOptions, ManifestFormat};
use crate::resolver::ResolvePolicy;

/// capgen configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Manifest rendering
    pub emit: EmitConfig,

    /// Required/advisory overrides for derivation rules
    pub policy: PolicyConfig,

    /// Alternate probe registry
    pub registry: RegistryConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitConfig {
    /// Include guard macro
    pub guard: Option<String>,

    /// Emit per-fact doc comments
    pub comments: Option<bool>,

    /// Default output format (header, json)
    pub format: Option<ManifestFormat>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Derived facts whose rules must have every input defined
    pub required: Vec<String>,

    /// Derived facts whose rules tolerate undefined inputs
    pub advisory: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Catalog file replacing the builtin registry
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.emit.guard.is_some() {
            self.emit.guard = other.emit.guard;
        }
        if other.emit.comments.is_some() {
            self.emit.comments = other.emit.comments;
        }
        if other.emit.format.is_some() {
            self.emit.format = other.emit.format;
        }

        if !other.policy.required.is_empty() {
            self.policy.required = other.policy.required;
        }
        if !other.policy.advisory.is_empty() {
            self.policy.advisory = other.policy.advisory;
        }

        if other.registry.path.is_some() {
            self.registry.path = other.registry.path;
        }
    }

    /// Emit options with configured values over the defaults.
    pub fn emit_options(&self) -> EmitOptions {
        let mut options = EmitOptions::default();
        if let Some(ref guard) = self.emit.guard {
            options.guard = Some(guard.clone());
        }
        if let Some(comments) = self.emit.comments {
            options.comments = comments;
        }
        if let Some(format) = self.emit.format {
            options.format = format;
        }
        options
    }

    pub fn policy(&self) -> ResolvePolicy {
        let mut policy = ResolvePolicy::default();
        for name in &self.policy.required {
            policy = policy.require(name.clone());
        }
        for name in &self.policy.advisory {
            policy = policy.relax(name.clone());
        }
        policy
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.capgen/config.toml)
/// 2. Global config (~/.capgen/config.toml)
/// 3. Defaults
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Config {
    let mut config = Config::default();

    if let Some(global_path) = global_path {
        if global_path.exists() {
            config.merge(Config::load_or_default(global_path));
        }
    }

    if project_path.exists() {
        config.merge(Config::load_or_default(project_path));
    }

    config
}

/// Get the global capgen config directory (~/.capgen).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".capgen"))
}

/// Get the global config path (~/.capgen/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.capgen/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".capgen").join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.emit.guard.is_none());
        assert!(config.registry.path.is_none());
        assert_eq!(config.emit_options(), EmitOptions::default());
    }

    #[test]
    fn test_config_load() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");

        std::fs::write(
            &config_path,
            r#"
[emit]
guard = "PYCONFIG_H"
comments = false
format = "json"

[policy]
required = ["WITH_EDITLINE"]
advisory = ["HAVE_LARGEFILE_SUPPORT"]

[registry]
path = "catalog.toml"
"#,
        )
        .unwrap();

        let config = Config::load(&config_path).unwrap();
        let options = config.emit_options();
        assert_eq!(options.guard.as_deref(), Some("PYCONFIG_H"));
        assert!(!options.comments);
        assert_eq!(options.format, ManifestFormat::Json);
        assert_eq!(config.registry.path, Some(PathBuf::from("catalog.toml")));

        let policy = config.policy();
        assert!(policy.required.contains("WITH_EDITLINE"));
        assert!(policy.advisory.contains("HAVE_LARGEFILE_SUPPORT"));
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config::default();
        base.emit.guard = Some("GLOBAL_H".to_string());
        base.emit.comments = Some(false);

        let mut override_cfg = Config::default();
        override_cfg.emit.guard = Some("PROJECT_H".to_string());

        base.merge(override_cfg);

        assert_eq!(base.emit.guard, Some("PROJECT_H".to_string()));
        assert_eq!(base.emit.comments, Some(false));
    }

    #[test]
    fn test_load_config_precedence() {
        let tmp = TempDir::new().unwrap();
        let global = tmp.path().join("global.toml");
        let project = project_config_path(tmp.path());
        std::fs::create_dir_all(project.parent().unwrap()).unwrap();

        std::fs::write(&global, "[emit]\nguard = \"GLOBAL_H\"\nformat = \"json\"\n").unwrap();
        std::fs::write(&project, "[emit]\nguard = \"PROJECT_H\"\n").unwrap();

        let config = load_config(Some(&global), &project);
        assert_eq!(config.emit.guard.as_deref(), Some("PROJECT_H"));
        assert_eq!(config.emit.format, Some(ManifestFormat::Json));
    }

    #[test]
    fn test_unreadable_config_falls_back() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[emit\nguard = ").unwrap();

        let config = Config::load_or_default(&path);
        assert!(config.emit.guard.is_none());
    }
}
