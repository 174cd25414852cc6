#![allow(clippy::str_to_string)]
use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde::Deserialize;
use serde_valid::toml::FromTomlStr;
use serde_valid::Validate;

use crate::consts::{CFG_ENV, DEFAULT_CFG_PATH};
use crate::file::FileKind;
use crate::prune::SortOrder;

#[derive(Deserialize, Validate, Default, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Prune {
    /// Keep this many of the newest kernels.
    #[validate(minimum = 1)]
    pub num: Option<usize>,
    pub all: bool,
    pub sort: SortOrder,
    pub destructive: bool,
    pub exclude: Vec<FileKind>,
    pub layout: Option<String>,
}

#[derive(Deserialize, Validate, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Mount {
    pub enabled: bool,
}

impl Default for Mount {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Deserialize, Validate, Default, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct KernpruneConfig {
    #[validate]
    pub prune: Prune,
    #[validate]
    pub mount: Mount,
}

/// Read the config at `path`. Defaults apply when `path` is the default
/// location and nothing is there.
fn load_cfg(path: &str) -> Result<KernpruneConfig> {
    let toml = match std::fs::read_to_string(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && path == DEFAULT_CFG_PATH => {
            tracing::trace!("No config at {DEFAULT_CFG_PATH}, using defaults");
            return Ok(KernpruneConfig::default());
        }
        r => r.map_err(|e| eyre!("Cannot read config file at {path:?}").wrap_err(e))?,
    };
    KernpruneConfig::from_toml_str(&toml)
        .map_err(|e| eyre!("Invalid config file at {path:?}: {e}"))
}

/// # Errors
/// - cannot read config file
/// - config file is invalid
#[allow(clippy::module_name_repetitions)]
#[tracing::instrument]
pub fn get_cfg() -> Result<KernpruneConfig> {
    let path = std::env::var(CFG_ENV);
    match &path {
        Err(std::env::VarError::NotUnicode(s)) => {
            tracing::error!(?s, "Cannot parse {CFG_ENV} due to invalid unicode");
            tracing::debug!("Falling back to {DEFAULT_CFG_PATH}");
        }
        Ok(p) => tracing::debug!("Using {CFG_ENV}={p}"),
        Err(std::env::VarError::NotPresent) => tracing::trace!("Using {DEFAULT_CFG_PATH}"),
    }
    load_cfg(path.as_deref().unwrap_or(DEFAULT_CFG_PATH))
}
