use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::error::{ConfigError, Result};

/// `~/.devtls/config.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GlobalConfig {
    /// Set after the CA was added to the browser trust stores
    #[serde(default)]
    pub ca_installed: bool,

    /// Directory the router sees the CA root under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router_cert_root: Option<String>,
}

impl GlobalConfig {
    pub fn default_path() -> Result<PathBuf> {
        let home = devtls_core::paths::devtls_home_dir().map_err(ConfigError::HomeDir)?;
        Ok(home.join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from_file(path)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(path.as_ref().to_path_buf(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let parsed: Self = toml::from_str(content)?;
        Ok(parsed)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::default_path()?;
        self.save_to_file(path)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ConfigError::FileWrite(parent.to_path_buf(), e))?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| ConfigError::FileWrite(path.to_path_buf(), e))?;
        Ok(())
    }

    pub fn router_cert_root(&self) -> &str {
        self.router_cert_root
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(devtls_core::router::DEFAULT_CONTAINER_CERT_ROOT)
    }
}
