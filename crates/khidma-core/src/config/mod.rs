//! Configuration management with file persistence

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

/// Khidma configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub chat: ChatConfig,
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Unread-count poll interval in seconds
    pub unread_poll_secs: u64,
    /// Debounce window for coalescing invalidations, in milliseconds
    pub invalidation_debounce_ms: u64,
    /// Broadcast channel capacity for the change feed
    pub feed_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Minutes a message must stay unread before an email reminder
    pub reminder_threshold_mins: i64,
    /// Maximum characters in a toast message preview
    pub toast_preview_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chat: ChatConfig {
                unread_poll_secs: 30,
                invalidation_debounce_ms: 250,
                feed_capacity: 256,
            },
            notifications: NotificationConfig {
                reminder_threshold_mins: 120,
                toast_preview_chars: 80,
            },
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("KHIDMA_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("khidma")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or create default if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chat.unread_poll_secs == 0 {
            return Err(anyhow!("chat.unread_poll_secs must be at least 1"));
        }
        if self.chat.feed_capacity == 0 {
            return Err(anyhow!("chat.feed_capacity must be at least 1"));
        }
        if self.notifications.reminder_threshold_mins <= 0 {
            return Err(anyhow!("notifications.reminder_threshold_mins must be positive"));
        }
        if self.notifications.toast_preview_chars == 0 {
            return Err(anyhow!("notifications.toast_preview_chars must be at least 1"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "chat.unread_poll_secs" => Ok(self.chat.unread_poll_secs.to_string()),
            "chat.invalidation_debounce_ms" => Ok(self.chat.invalidation_debounce_ms.to_string()),
            "chat.feed_capacity" => Ok(self.chat.feed_capacity.to_string()),
            "notifications.reminder_threshold_mins" => {
                Ok(self.notifications.reminder_threshold_mins.to_string())
            }
            "notifications.toast_preview_chars" => {
                Ok(self.notifications.toast_preview_chars.to_string())
            }
            _ => Err(anyhow!("Unknown configuration key: {}", key)),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "chat.unread_poll_secs" => {
                self.chat.unread_poll_secs = value
                    .parse()
                    .with_context(|| format!("Invalid unread_poll_secs value: {}", value))?;
            }
            "chat.invalidation_debounce_ms" => {
                self.chat.invalidation_debounce_ms = value
                    .parse()
                    .with_context(|| format!("Invalid invalidation_debounce_ms value: {}", value))?;
            }
            "chat.feed_capacity" => {
                self.chat.feed_capacity = value
                    .parse()
                    .with_context(|| format!("Invalid feed_capacity value: {}", value))?;
            }
            "notifications.reminder_threshold_mins" => {
                self.notifications.reminder_threshold_mins = value
                    .parse()
                    .with_context(|| format!("Invalid reminder_threshold_mins value: {}", value))?;
            }
            "notifications.toast_preview_chars" => {
                self.notifications.toast_preview_chars = value
                    .parse()
                    .with_context(|| format!("Invalid toast_preview_chars value: {}", value))?;
            }
            _ => return Err(anyhow!("Unknown configuration key: {}", key)),
        }
        self.validate()?;
        Ok(())
    }
}
