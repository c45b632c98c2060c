use crate::error::AppError;
use crate::fs_guard::write_atomic_text_file;
use dirs::{config_dir, home_dir};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_YAML: &str = include_str!("../config/default.yaml");
pub const CONFIG_ENV: &str = "LARADEV_CONFIG";
const CONFIG_VERSION: u32 = 1;

/// Upper bound for every `*_sec` setting: one day.
pub const MAX_TIMEOUT_SECS: u64 = 86_400;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub version: u32,
    pub docker: Docker,
    pub app: App,
    pub health: Health,
    pub projects: Projects,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Docker {
    pub binary: String,
    pub compose_file: String,
    pub app_service: String,
    pub up_timeout_sec: u64,
    pub command_timeout_sec: u64,
    pub install_timeout_sec: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct App {
    pub cli: Vec<String>,
    pub composer: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Health {
    pub service: String,
    pub timeout_sec: u64,
    pub poll_interval_sec: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Projects {
    pub root: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            docker: Docker::default(),
            app: App::default(),
            health: Health::default(),
            projects: Projects::default(),
        }
    }
}

impl Default for Docker {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
            compose_file: "docker-compose.yml".to_string(),
            app_service: "app".to_string(),
            up_timeout_sec: 300,
            command_timeout_sec: 120,
            install_timeout_sec: 300,
        }
    }
}

impl Default for App {
    fn default() -> Self {
        Self {
            cli: vec!["php".to_string(), "artisan".to_string()],
            composer: vec!["composer".to_string()],
        }
    }
}

impl Default for Health {
    fn default() -> Self {
        Self {
            service: "mysql".to_string(),
            timeout_sec: 60,
            poll_interval_sec: 3,
        }
    }
}

impl Docker {
    pub fn up_timeout(&self) -> Duration {
        Duration::from_secs(self.up_timeout_sec)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_sec)
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_sec)
    }
}

impl Health {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_sec)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_sec)
    }
}

impl Projects {
    pub fn root_path(&self) -> Option<PathBuf> {
        let trimmed = self.root.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(PathBuf::from(expand_path(trimmed)))
        }
    }
}

pub fn resolve_config_path(override_path: Option<&PathBuf>) -> PathBuf {
    if let Some(path) = override_path {
        return path.clone();
    }
    if let Ok(path) = env::var(CONFIG_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    default_config_dir().join("config.yaml")
}

pub fn default_config_dir() -> PathBuf {
    config_dir()
        .or_else(|| home_dir().map(|home| home.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("laradev")
}

/// Loads the config at `path`; a missing file means all defaults.
pub fn load_config(path: &Path) -> Result<Config, AppError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = fs::read_to_string(path)?;
    read_config_from_str(&content)
}

pub fn read_config_from_str(content: &str) -> Result<Config, AppError> {
    let cfg: Config = serde_yaml::from_str(content)?;
    if cfg.version != CONFIG_VERSION {
        return Err(AppError::Config(format!(
            "unsupported config version {}",
            cfg.version
        )));
    }
    validate_config(&cfg)?;
    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> Result<(), AppError> {
    let required = [
        ("docker.binary", &cfg.docker.binary),
        ("docker.compose_file", &cfg.docker.compose_file),
        ("docker.app_service", &cfg.docker.app_service),
        ("health.service", &cfg.health.service),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(AppError::Config(format!("{field} must be non-empty")));
        }
    }
    if cfg.app.cli.iter().all(|part| part.trim().is_empty()) {
        return Err(AppError::Config(
            "app.cli must contain at least one word".to_string(),
        ));
    }
    if cfg.app.composer.iter().all(|part| part.trim().is_empty()) {
        return Err(AppError::Config(
            "app.composer must contain at least one word".to_string(),
        ));
    }
    let timeouts = [
        ("docker.up_timeout_sec", cfg.docker.up_timeout_sec),
        ("docker.command_timeout_sec", cfg.docker.command_timeout_sec),
        ("docker.install_timeout_sec", cfg.docker.install_timeout_sec),
        ("health.timeout_sec", cfg.health.timeout_sec),
        ("health.poll_interval_sec", cfg.health.poll_interval_sec),
    ];
    for (field, value) in timeouts {
        if value == 0 {
            return Err(AppError::Config(format!("{field} must be greater than 0")));
        }
        if value > MAX_TIMEOUT_SECS {
            return Err(AppError::Config(format!(
                "{field} must be at most {MAX_TIMEOUT_SECS}"
            )));
        }
    }
    if cfg.health.poll_interval_sec > cfg.health.timeout_sec {
        return Err(AppError::Config(
            "health.poll_interval_sec must not exceed health.timeout_sec".to_string(),
        ));
    }
    Ok(())
}

/// Writes the bundled default config unless one already exists.
pub fn init_config(path: &Path) -> Result<bool, AppError> {
    if path.exists() {
        return Ok(false);
    }
    write_atomic_text_file(path, DEFAULT_CONFIG_YAML, None)?;
    Ok(true)
}

pub fn expand_path(input: &str) -> String {
    if let Some(stripped) = input.strip_prefix("~/") {
        if let Some(home) = home_dir() {
            return home.join(stripped).to_string_lossy().to_string();
        }
    }
    input.to_string()
}
