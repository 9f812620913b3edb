use anyhow::{bail, Context, Result};
use kphttp_core::server::DEFAULT_HOST;
use kphttp_core::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::paths;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationPolicy {
    /// Every presented key is stored and given a fresh id.
    Accept,
    /// No new clients; previously associated ones keep working.
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorSettings {
    pub length: usize,
    pub charset: String,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            length: 20,
            charset: "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_!@#$%^&*"
                .into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub log_traffic: bool,
    pub association: AssociationPolicy,
    pub generator: GeneratorSettings,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            log_traffic: false,
            association: AssociationPolicy::Accept,
            generator: GeneratorSettings::default(),
        }
    }
}

impl ServiceConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("open config {}", path.display()))?;
        let config: ServiceConfig = serde_json::from_reader(file)
            .with_context(|| format!("parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Explicit path (flag or `KPHTTP_CONFIG`) wins; otherwise
    /// `<data_dir>/config.json` if present, else defaults.
    pub fn resolve(explicit: Option<PathBuf>, data_dir: &Path) -> Result<Self> {
        let explicit = explicit.or_else(|| std::env::var("KPHTTP_CONFIG").ok().map(PathBuf::from));
        if let Some(path) = explicit {
            return Self::load(&path);
        }
        let default_path = paths::config_path(data_dir);
        if default_path.exists() {
            return Self::load(&default_path);
        }
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            bail!("host must not be empty");
        }
        if self.generator.length < 8 || self.generator.length > 256 {
            bail!("generator length must be between 8 and 256");
        }
        let mut distinct: Vec<char> = self.generator.charset.chars().collect();
        distinct.sort_unstable();
        distinct.dedup();
        if distinct.len() < 2 {
            bail!("generator charset needs at least two distinct characters");
        }
        Ok(())
    }
}
