//! Application configuration.
//!
//! Layered with the `config` crate: built-in defaults, then the TOML config
//! file, then `DELTAFOLD__SECTION__KEY` environment variables.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ::config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auxiliary::{AuxiliaryRoutes, EXECUTION_PREFIX, EXTENSION_PREFIX};
use crate::error::RegistryError;
use crate::kinds::{KindRegistry, VisibilityPolicy};
use crate::persist::FileDocumentStore;

pub const APP_NAME: &str = "deltafold";

/// Prefix for environment overrides (`DELTAFOLD__KINDS__TEXT_BAND`, ...).
pub const ENV_PREFIX: &str = "DELTAFOLD";

/// Errors from loading or applying configuration.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("loading configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("expanding path {path:?}: {message}")]
    Path { path: String, message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub kinds: KindsConfig,
    pub auxiliary: AuxiliaryConfig,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Reveal bands, `[lower, upper)` in characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KindsConfig {
    pub text_band: [usize; 2],
    pub code_band: [usize; 2],
}

impl Default for KindsConfig {
    fn default() -> Self {
        Self {
            text_band: [400, 450],
            code_band: [300, 310],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuxiliaryConfig {
    /// Tag prefixes forwarded verbatim to the auxiliary sink.
    pub prefixes: Vec<String>,
}

impl Default for AuxiliaryConfig {
    fn default() -> Self {
        Self {
            prefixes: vec![EXTENSION_PREFIX.to_string(), EXECUTION_PREFIX.to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Directory for finished documents. Unset disables persistence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

/// `DELTAFOLD__SECTION__KEY` overrides. List values are comma separated.
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("auxiliary.prefixes")
        .with_list_parse_key("kinds.text_band")
        .with_list_parse_key("kinds.code_band")
        .try_parsing(true)
}

fn band(kind: &str, [lower, upper]: [usize; 2]) -> Result<VisibilityPolicy, RegistryError> {
    if lower >= upper {
        return Err(RegistryError::InvalidBand {
            kind: kind.to_string(),
            lower,
            upper,
        });
    }
    Ok(VisibilityPolicy::Band { lower, upper })
}

impl AppConfig {
    /// Load defaults, the optional TOML file at `path`, then env overrides.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        Self::load_with(path, environment())
    }

    fn load_with(path: &Path, env: Environment) -> Result<Self, SettingsError> {
        let defaults = Config::try_from(&AppConfig::default())?;
        let built = Config::builder()
            .add_source(defaults)
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .add_source(env)
            .build()?;
        Ok(built.try_deserialize()?)
    }

    /// Kind registry with the configured reveal bands.
    pub fn registry(&self) -> Result<Arc<KindRegistry>, SettingsError> {
        let text = band("text", self.kinds.text_band)?;
        let code = band("code", self.kinds.code_band)?;
        Ok(Arc::new(KindRegistry::standard(text, code)))
    }

    pub fn auxiliary_routes(&self) -> AuxiliaryRoutes {
        AuxiliaryRoutes::new(self.auxiliary.prefixes.iter().cloned())
    }

    /// File store for the configured directory, if any.
    pub fn document_store(&self) -> Result<Option<FileDocumentStore>, SettingsError> {
        self.persistence
            .dir
            .as_deref()
            .map(|dir| expand_path(dir).map(FileDocumentStore::new))
            .transpose()
    }
}

/// Expand `~` and environment variables in a configured path.
pub fn expand_path(text: &str) -> Result<PathBuf, SettingsError> {
    let expanded = shellexpand::full(text).map_err(|e| SettingsError::Path {
        path: text.to_string(),
        message: e.to_string(),
    })?;
    Ok(PathBuf::from(expanded.into_owned()))
}

/// `$XDG_CONFIG_HOME/deltafold`, falling back to the platform config dir.
pub fn default_config_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(dir).join(APP_NAME));
    }
    dirs::config_dir()
        .map(|dir| dir.join(APP_NAME))
        .or_else(|| dirs::home_dir().map(|home| home.join(".config").join(APP_NAME)))
}
