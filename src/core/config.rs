use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use url::Url;

/// Environment override for the backend address, checked after config.yml.
pub const BASE_URL_ENV: &str = "NOVELCRAFT_API_BASE_URL";

const CONFIG_FILE: &str = "config.yml";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Connect and total request budget, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Where the login token is persisted between runs.
    #[serde(default = "default_session_file")]
    pub session_file: String,

    /// Name given to projects the workflow creates on its own.
    #[serde(default = "default_project_name")]
    pub default_project_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            session_file: default_session_file(),
            default_project_name: default_project_name(),
        }
    }
}

impl Config {
    /// Reads config.yml from the working directory, falling back to defaults
    /// when the file does not exist. `NOVELCRAFT_API_BASE_URL` wins over both.
    pub fn load() -> Result<Self> {
        let path = Path::new(CONFIG_FILE);
        let mut config: Config = if path.exists() {
            let content = fs::read_to_string(path).context("Failed to read config.yml")?;
            serde_yaml_ng::from_str(&content).context("Failed to parse config.yml")?
        } else {
            Config::default()
        };

        if let Ok(base) = std::env::var(BASE_URL_ENV) {
            if !base.trim().is_empty() {
                config.base_url = base;
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        Url::parse(&self.base_url)
            .with_context(|| format!("Invalid base_url: {}", self.base_url))?;
        Ok(())
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:23004/api/v1".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_session_file() -> String {
    ".novelcraft/session.json".to_string()
}

fn default_project_name() -> String {
    "终端创作项目".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.base_url, "http://127.0.0.1:23004/api/v1");
        assert_eq!(config.timeout_ms, 5000);
        assert_eq!(config.session_file, ".novelcraft/session.json");
        assert_eq!(config.default_project_name, "终端创作项目");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "base_url: https://api.example.com/api/v1\n";
        let config: Config = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(config.base_url, "https://api.example.com/api/v1");
        assert_eq!(config.timeout_ms, 5000, "omitted fields take defaults");
        assert_eq!(config.default_project_name, "终端创作项目");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let config = Config {
            base_url: "not a url".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_roundtrip_through_yaml() {
        let config = Config {
            base_url: "http://10.0.0.2:23004/api/v1".to_string(),
            timeout_ms: 8000,
            session_file: "/tmp/session.json".to_string(),
            default_project_name: "测试项目".to_string(),
        };
        let yaml = serde_yaml_ng::to_string(&config).unwrap();
        let parsed: Config = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(parsed.base_url, config.base_url);
        assert_eq!(parsed.timeout_ms, 8000);
        assert_eq!(parsed.default_project_name, "测试项目");
    }
}
