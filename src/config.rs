use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Optional user configuration from `~/.config/logscope/config.toml`.
///
/// CLI flags override anything set here.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Log service base URL
    pub api_url: Option<String>,

    /// Default deployment target
    pub deployment_target_id: Option<String>,

    /// Name of the environment variable holding the API token
    pub token_env: Option<String>,
}

impl Config {
    /// Load the config file, or defaults when none exists.
    pub fn load() -> Result<Self> {
        let Some(path) = Self::path() else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("logscope").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let config: Config = toml::from_str(
            r#"
            api_url = "https://logs.example.com/"
            deployment_target_id = "prod"
            token_env = "LOGSCOPE_TOKEN"
            "#,
        )
        .unwrap();

        assert_eq!(config.api_url.as_deref(), Some("https://logs.example.com/"));
        assert_eq!(config.deployment_target_id.as_deref(), Some("prod"));
        assert_eq!(config.token_env.as_deref(), Some("LOGSCOPE_TOKEN"));
    }

    #[test]
    fn test_empty_config_is_all_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.api_url.is_none());
        assert!(config.deployment_target_id.is_none());
        assert!(config.token_env.is_none());
    }
}
