use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedConfigError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, SharedConfigError>;

/// Layered crawl configuration: CLI flags override `config.toml`, which
/// overrides `CRAWLER_`-prefixed environment variables, which override
/// these defaults (`spec.md` §2, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    pub seed: String,
    pub username: String,
    pub password: Option<String>,
    pub workers: usize,
    pub db_path: String,
    pub max_retries: i64,
    pub debug: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            seed: String::new(),
            username: String::new(),
            password: None,
            workers: 4,
            db_path: "network_crawl.db".to_string(),
            max_retries: 3,
            debug: false,
        }
    }
}

/// One field per `CrawlerConfig` entry, all optional: this is what
/// `clap` parses into and what `CrawlerConfig::load` layers on top of
/// `config.toml`/environment defaults. `None` means "not given on the
/// command line, fall through".
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub seed: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub workers: Option<usize>,
    pub db_path: Option<String>,
    pub max_retries: Option<i64>,
    pub debug: Option<bool>,
}

impl CrawlerConfig {
    /// Loads `config.toml` (if present at the workspace root) and
    /// `CRAWLER_`-prefixed environment variables, then layers `cli` on
    /// top. Validates the result before returning it.
    pub fn load(cli: CliOverrides) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("workers", 4i64)?
            .set_default("db_path", "network_crawl.db")?
            .set_default("max_retries", 3i64)?
            .set_default("debug", false)?;

        if let Ok(root) = find_workspace_root() {
            let config_file = root.join("config.toml");
            if config_file.exists() {
                builder = builder.add_source(File::from(config_file));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("CRAWLER")
                .separator("_")
                .try_parsing(true),
        );

        let layered = builder.build()?;

        let mut config = CrawlerConfig {
            seed: layered.get("seed").unwrap_or_default(),
            username: layered.get("username").unwrap_or_default(),
            password: layered.get("password").ok(),
            workers: layered.get("workers").unwrap_or(4),
            db_path: layered
                .get("db_path")
                .unwrap_or_else(|_| "network_crawl.db".to_string()),
            max_retries: layered.get("max_retries").unwrap_or(3),
            debug: layered.get("debug").unwrap_or(false),
        };

        config.apply_overrides(cli);
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&mut self, cli: CliOverrides) {
        if let Some(v) = cli.seed {
            self.seed = v;
        }
        if let Some(v) = cli.username {
            self.username = v;
        }
        if cli.password.is_some() {
            self.password = cli.password;
        }
        if let Some(v) = cli.workers {
            self.workers = v;
        }
        if let Some(v) = cli.db_path {
            self.db_path = v;
        }
        if let Some(v) = cli.max_retries {
            self.max_retries = v;
        }
        if let Some(v) = cli.debug {
            self.debug = v;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.seed.trim().is_empty() {
            return Err(SharedConfigError::Invalid(
                "seed address is required (pass --seed or set CRAWLER_SEED)".to_string(),
            ));
        }
        if self.username.trim().is_empty() {
            return Err(SharedConfigError::Invalid(
                "username is required (pass --username or set CRAWLER_USERNAME)".to_string(),
            ));
        }
        if self.password.as_deref().unwrap_or("").is_empty() {
            return Err(SharedConfigError::Invalid(
                "password is required (pass --password or set CRAWLER_PASSWORD)".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(SharedConfigError::Invalid(
                "workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Finds the nearest ancestor directory whose `Cargo.toml` declares
/// `[workspace]`, so `config.toml` can be found regardless of the
/// binary's working directory.
fn find_workspace_root() -> Result<PathBuf> {
    let mut current_dir = std::env::current_dir()?;

    loop {
        let cargo_toml = current_dir.join("Cargo.toml");
        if cargo_toml.exists() {
            let content = std::fs::read_to_string(&cargo_toml)?;
            if content.contains("[workspace]") {
                return Ok(current_dir);
            }
        }

        if let Some(parent) = current_dir.parent() {
            current_dir = parent.to_path_buf();
        } else {
            break;
        }
    }

    Err(SharedConfigError::Invalid(
        "could not find workspace root directory".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_win_over_defaults() {
        let mut config = CrawlerConfig::default();
        config.apply_overrides(CliOverrides {
            seed: Some("10.0.0.1".to_string()),
            workers: Some(8),
            ..Default::default()
        });
        assert_eq!(config.seed, "10.0.0.1");
        assert_eq!(config.workers, 8);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn validate_rejects_missing_seed() {
        let config = CrawlerConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_complete_config() {
        let config = CrawlerConfig {
            seed: "10.0.0.1".to_string(),
            username: "admin".to_string(),
            password: Some("secret".to_string()),
            ..CrawlerConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
