//! flowide configuration.
//!
//! Read from `~/.flowide/config.toml`, or from the file named by
//! `FLOWIDE_CONFIG`. A missing file means defaults.
//!
//! ```toml
//! [checker]
//! enabled = true
//! path_to_flow = "${HOME}/bin/flow"
//! search_path = false
//!
//! [completion]
//! use_code_snippets_on_function_suggest = true
//!
//! [coverage]
//! decorations = true
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::{env, fs};

use flowide_checker::CheckerOptions;
use flowide_ide::ProviderSettings;
use serde::Deserialize;

pub const CONFIG_ENV: &str = "FLOWIDE_CONFIG";

const fn default_true() -> bool {
    true
}

fn default_package() -> String {
    "flow-bin".to_string()
}

fn default_binary() -> String {
    "flow".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowideConfig {
    #[serde(default)]
    pub checker: CheckerConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub coverage: CoverageConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckerConfig {
    /// When false every provider returns no result.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Explicit checker binary. `${VAR}` references are expanded.
    #[serde(default)]
    pub path_to_flow: Option<String>,
    /// Fall back to the binary on `PATH` when no package provides one.
    #[serde(default)]
    pub search_path: bool,
    #[serde(default = "default_package")]
    pub package: String,
    #[serde(default = "default_binary")]
    pub binary: String,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path_to_flow: None,
            search_path: false,
            package: default_package(),
            binary: default_binary(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompletionConfig {
    #[serde(default)]
    pub use_code_snippets_on_function_suggest: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoverageConfig {
    #[serde(default)]
    pub decorations: bool,
}

/// Replace `${VAR}` with the variable's value. Unset variables become empty;
/// an unterminated `${` is kept as is.
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &rest[start + 2..start + 2 + len];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &rest[start + 2 + len + 1..];
    }
    out.push_str(rest);
    out
}

impl FlowideConfig {
    /// Load from the default location. `Ok(None)` when there is no file.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path).map_err(|source| {
            tracing::warn!("Failed to read config at {}: {source}", path.display());
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;

        toml::from_str(&content).map(Some).map_err(|source| {
            tracing::warn!("Failed to parse config at {}: {source}", path.display());
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    #[must_use]
    pub fn checker_options(&self) -> CheckerOptions {
        let checker = &self.checker;
        CheckerOptions {
            enabled: checker.enabled,
            binary_override: checker
                .path_to_flow
                .as_deref()
                .map(expand_env_vars)
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
            search_path: checker.search_path,
            package: checker.package.clone(),
            binary: checker.binary.clone(),
        }
    }

    #[must_use]
    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings {
            function_snippets: self.completion.use_code_snippets_on_function_suggest,
            coverage_decorations: self.coverage.decorations,
        }
    }
}

fn resolve_config_path(env_override: Option<OsString>, home: Option<PathBuf>) -> Option<PathBuf> {
    env_override
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(|| home.map(|home| home.join(".flowide").join("config.toml")))
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    resolve_config_path(env::var_os(CONFIG_ENV), dirs::home_dir())
}
