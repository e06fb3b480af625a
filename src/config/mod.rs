// src/config/mod.rs - Bot configuration loaded from bot.yaml with environment overrides

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use url::Url;

use crate::types::GuardError;

pub const CONFIG_FILE: &str = "bot.yaml";

/// Master configuration document (`bot.yaml`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfiguration {
    pub version: String,
    pub commands: CommandSettings,
    /// Configured owners as bare numbers, e.g. `6281234567890`
    pub owners: Vec<String>,
    pub moderation: ModerationSettings,
    pub bridge: BridgeSettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSettings {
    pub prefix_enabled: bool,
    /// Checked in this order; the first prefix that yields a known command wins
    pub prefixes: Vec<String>,
}

/// Term lists and every threshold used by the classifiers and the warning ladder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationSettings {
    pub toxic_terms: Vec<String>,
    pub nsfw_terms: Vec<String>,
    pub max_message_length: usize,
    /// A character followed by at least this many repeats
    pub repeated_char_run: usize,
    pub blank_line_run: usize,
    pub unbroken_token_length: usize,
    pub combining_mark_run: usize,
    pub flood_window_seconds: u64,
    pub flood_threshold: usize,
    pub flood_cleanup_seconds: u64,
    pub warning_window_minutes: u64,
    pub warning_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeSettings {
    pub url: String,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    pub database_path: PathBuf,
}

impl Default for BotConfiguration {
    fn default() -> Self {
        Self {
            version: "2.0".to_string(),
            commands: CommandSettings::default(),
            owners: Vec::new(),
            moderation: ModerationSettings::default(),
            bridge: BridgeSettings {
                url: "ws://127.0.0.1:8765".to_string(),
                request_timeout_seconds: 30,
            },
            storage: StorageSettings {
                database_path: PathBuf::from("database/db.json"),
            },
        }
    }
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            prefix_enabled: true,
            prefixes: vec![".".to_string(), "!".to_string(), "#".to_string()],
        }
    }
}

impl Default for ModerationSettings {
    fn default() -> Self {
        let words = |list: &[&str]| -> Vec<String> { list.iter().map(|w| w.to_string()).collect() };
        Self {
            toxic_terms: words(&[
                "anjing", "bangsat", "kontol", "memek", "asu", "jancok", "goblok", "tolol", "babi",
                "peler",
            ]),
            nsfw_terms: words(&[
                "seks", "bugil", "porno", "telanjang", "xxx", "bokep", "bocil", "cabul", "hentai",
                "lonte", "sange",
            ]),
            max_message_length: 5000,
            repeated_char_run: 20,
            blank_line_run: 25,
            unbroken_token_length: 3000,
            combining_mark_run: 4,
            flood_window_seconds: 10,
            flood_threshold: 5,
            flood_cleanup_seconds: 60,
            warning_window_minutes: 30,
            warning_limit: 5,
        }
    }
}

impl BotConfiguration {
    /// Apply `GUARD_*` environment overrides on top of the file values
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var("GUARD_BRIDGE_URL") {
            debug!("Bridge URL overridden from environment");
            self.bridge.url = url;
        }
        if let Ok(owners) = env::var("GUARD_OWNERS") {
            self.owners = split_list(&owners);
        }
        if let Ok(prefixes) = env::var("GUARD_PREFIXES") {
            self.commands.prefixes = split_list(&prefixes);
        }
        if let Ok(path) = env::var("GUARD_DATABASE_PATH") {
            self.storage.database_path = PathBuf::from(path);
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Rejects configurations the engine cannot run with
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &BotConfiguration) -> Result<(), GuardError> {
        let commands = &config.commands;
        if commands.prefix_enabled && commands.prefixes.iter().all(|p| p.is_empty()) {
            return Err(GuardError::Config(
                "prefix mode is enabled but no prefix is configured".to_string(),
            ));
        }

        let m = &config.moderation;
        let thresholds = [
            ("max_message_length", m.max_message_length as u64),
            ("repeated_char_run", m.repeated_char_run as u64),
            ("blank_line_run", m.blank_line_run as u64),
            ("unbroken_token_length", m.unbroken_token_length as u64),
            ("combining_mark_run", m.combining_mark_run as u64),
            ("flood_window_seconds", m.flood_window_seconds),
            ("flood_threshold", m.flood_threshold as u64),
            ("flood_cleanup_seconds", m.flood_cleanup_seconds),
            ("warning_window_minutes", m.warning_window_minutes),
            ("warning_limit", m.warning_limit as u64),
        ];
        if let Some((name, _)) = thresholds.iter().find(|(_, value)| *value == 0) {
            return Err(GuardError::Config(format!("moderation.{} must be greater than zero", name)));
        }

        let url = Url::parse(&config.bridge.url)
            .map_err(|e| GuardError::Config(format!("bridge.url is invalid: {}", e)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(GuardError::Config(format!(
                "bridge.url must use ws:// or wss://, got {}://",
                url.scheme()
            )));
        }
        if config.bridge.request_timeout_seconds == 0 {
            return Err(GuardError::Config(
                "bridge.request_timeout_seconds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loads, validates and caches `bot.yaml`
#[derive(Clone)]
pub struct ConfigurationManager {
    config_dir: PathBuf,
    bot_config: Arc<RwLock<BotConfiguration>>,
}

impl ConfigurationManager {
    pub fn new<P: AsRef<Path>>(config_dir: P) -> Self {
        Self {
            config_dir: config_dir.as_ref().to_path_buf(),
            bot_config: Arc::new(RwLock::new(BotConfiguration::default())),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// Load the configuration, writing the default file when none is usable
    pub async fn initialize(&self) -> Result<()> {
        if !self.config_dir.exists() {
            fs::create_dir_all(&self.config_dir).await.with_context(|| {
                format!("Failed to create configuration directory {}", self.config_dir.display())
            })?;
            info!("Created configuration directory: {}", self.config_dir.display());
        }

        if let Err(e) = self.load_bot_config().await {
            warn!("Failed to load bot config, using defaults: {}", e);
            self.create_default_bot_config().await?;
        }

        let mut config = self.bot_config.write().await;
        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;

        info!("Configuration loaded from {}", self.config_path().display());
        Ok(())
    }

    async fn load_bot_config(&self) -> Result<()> {
        let config_path = self.config_path();
        if !config_path.exists() {
            return Err(anyhow::anyhow!("Bot config file not found"));
        }

        let content = fs::read_to_string(&config_path).await?;
        let config: BotConfiguration = serde_yaml::from_str(&content)?;
        ConfigValidator::validate(&config)?;

        *self.bot_config.write().await = config;

        debug!("Loaded bot configuration from {}", config_path.display());
        Ok(())
    }

    async fn create_default_bot_config(&self) -> Result<()> {
        let config = BotConfiguration::default();
        let content = serde_yaml::to_string(&config)?;
        fs::write(self.config_path(), content)
            .await
            .with_context(|| format!("Failed to write {}", self.config_path().display()))?;

        *self.bot_config.write().await = config;
        info!("Created default bot configuration at {}", self.config_path().display());
        Ok(())
    }

    pub async fn get_bot_config(&self) -> BotConfiguration {
        self.bot_config.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_config_manager_creates_default_file() {
        let temp_dir = tempdir().unwrap();
        let config_manager = ConfigurationManager::new(temp_dir.path());

        config_manager.initialize().await.unwrap();

        assert!(temp_dir.path().join(CONFIG_FILE).exists());
        let config = config_manager.get_bot_config().await;
        assert_eq!(config.moderation.warning_limit, 5);
        assert_eq!(config.moderation.max_message_length, 5000);
    }

    #[tokio::test]
    async fn test_config_manager_reads_existing_file() {
        let temp_dir = tempdir().unwrap();
        let mut custom = BotConfiguration::default();
        custom.commands.prefixes = vec!["/".to_string()];
        custom.moderation.flood_threshold = 8;
        fs::write(temp_dir.path().join(CONFIG_FILE), serde_yaml::to_string(&custom).unwrap())
            .await
            .unwrap();

        let config_manager = ConfigurationManager::new(temp_dir.path());
        config_manager.initialize().await.unwrap();

        let config = config_manager.get_bot_config().await;
        assert_eq!(config.moderation.flood_threshold, 8);
    }

    #[tokio::test]
    async fn test_invalid_file_falls_back_to_defaults() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join(CONFIG_FILE), "commands: [not, a, map]")
            .await
            .unwrap();

        let config_manager = ConfigurationManager::new(temp_dir.path());
        config_manager.initialize().await.unwrap();

        let written = fs::read_to_string(temp_dir.path().join(CONFIG_FILE)).await.unwrap();
        let reparsed: BotConfiguration = serde_yaml::from_str(&written).unwrap();
        assert_eq!(reparsed.version, "2.0");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = BotConfiguration::default();
        assert!(ConfigValidator::validate(&config).is_ok());

        config.commands.prefixes = vec![String::new()];
        assert!(ConfigValidator::validate(&config).is_err());

        let mut config = BotConfiguration::default();
        config.moderation.warning_limit = 0;
        assert!(ConfigValidator::validate(&config).is_err());

        let mut config = BotConfiguration::default();
        config.bridge.url = "http://localhost:8765".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_split_list_drops_blanks() {
        assert_eq!(split_list(" 6281, ,6282 ,"), vec!["6281".to_string(), "6282".to_string()]);
        assert!(split_list("").is_empty());
    }
}
