// External crates
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Environment variables override file values, e.g.
/// `VES_ROUTE__LOGGING__LEVEL=debug`.
pub const ENV_PREFIX: &str = "VES_ROUTE";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory relative module specifiers resolve against. Defaults to the
    /// working directory.
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
    /// Enables a daily rolling JSON log file in this directory.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Pretty,
            directory: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Settings {
    /// Load settings from defaults, an optional TOML file and the environment.
    #[instrument(
        name = "settings_loader",
        target = "helpers::load_config",
        level = "trace",
        skip_all
    )]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, environment())
    }

    fn load_with(path: Option<&Path>, environment: Environment) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            tracing::trace!(settings_file_path = %path.display(), "Loading settings file");
            builder = builder.add_source(File::new(&path.to_string_lossy(), FileFormat::Toml).required(true));
        }

        let settings = builder
            .add_source(environment)
            .build()
            .with_context(|| match path {
                Some(path) => format!("Failed to read settings from {}", path.display()),
                None => "Failed to read settings from the environment".to_string(),
            })?
            .try_deserialize::<Settings>()
            .context("Failed to parse settings")?;

        tracing::trace!(?settings, "Settings loaded successfully");
        Ok(settings)
    }

    /// Base directory for module resolution.
    pub fn base_dir(&self) -> Result<PathBuf> {
        match &self.general.base_dir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().context("Failed to determine the working directory"),
        }
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_SEPARATOR)
        .separator(ENV_SEPARATOR)
}
