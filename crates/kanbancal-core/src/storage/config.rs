//! TOML-based application configuration.
//!
//! Stores:
//! - Scheduler tunables (poll interval, notification thresholds)
//! - Telegram credentials (token/chat id, overridable via environment)
//! - Frontend settings (deep-link base URL, display timezone offset)
//!
//! Configuration is stored at `~/.config/kanbancal/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::notify::{SchedulerSettings, ThresholdSet};

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSection {
    /// Poll interval in minutes.
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    /// Notification thresholds in hours before deadline, descending.
    #[serde(default)]
    pub thresholds: ThresholdSet,
}

/// Telegram delivery configuration.
///
/// `TELEGRAM_TOKEN` and `TELEGRAM_CHAT_ID` environment variables take
/// precedence over the file values.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelegramSection {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub chat_id: String,
}

/// Frontend/display configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontendSection {
    /// Base URL used to build deep links in notifications.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Offset in minutes applied when rendering deadline timestamps in
    /// messages. Replaces any hardcoded server timezone assumption.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/kanbancal/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub telegram: TelegramSection,
    #[serde(default)]
    pub frontend: FrontendSection,
}

fn default_interval_minutes() -> u64 {
    5
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            thresholds: ThresholdSet::default(),
        }
    }
}

impl Default for FrontendSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            utc_offset_minutes: 0,
        }
    }
}

impl Config {
    fn path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk (creating a default file if absent), then apply
    /// environment overrides for the Telegram credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = Self::path()?;
        let mut cfg = match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str::<Config>(&content)?,
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                cfg
            }
        };

        if let Ok(token) = std::env::var("TELEGRAM_TOKEN") {
            if !token.is_empty() {
                cfg.telegram.token = token;
            }
        }
        if let Ok(chat_id) = std::env::var("TELEGRAM_CHAT_ID") {
            if !chat_id.is_empty() {
                cfg.telegram.chat_id = chat_id;
            }
        }

        Ok(cfg)
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(Self::path()?, content)?;
        Ok(())
    }

    /// Scheduler settings derived from this configuration.
    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            interval_minutes: self.scheduler.interval_minutes,
            thresholds: self.scheduler.thresholds.clone(),
            frontend_url: self.frontend.base_url.clone(),
        }
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        Some(match val {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Set a config value by dot-separated key, parsing the string to the
    /// existing value's type.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), Box<dyn std::error::Error>> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json)?;
        Ok(())
    }

    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() {
            return Err("config key is empty".into());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| format!("unknown config key: {key}"))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| format!("unknown config key: {key}"))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(value.parse::<bool>()?),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<i64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| format!("cannot parse '{value}' as number"))?
                        } else {
                            return Err(format!("cannot parse '{value}' as number").into());
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value)?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| format!("unknown config key: {key}"))?;
        }

        Err(format!("unknown config key: {key}").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = Config::default();
        assert_eq!(cfg.scheduler.interval_minutes, 5);
        assert_eq!(cfg.scheduler.thresholds.hours(), &[48, 24, 12, 6, 3, 0]);
        assert_eq!(cfg.frontend.base_url, "http://localhost:3000");
        assert_eq!(cfg.frontend.utc_offset_minutes, 0);
    }

    #[test]
    fn toml_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let decoded: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(decoded.scheduler.interval_minutes, cfg.scheduler.interval_minutes);
        assert_eq!(decoded.scheduler.thresholds, cfg.scheduler.thresholds);
    }

    #[test]
    fn invalid_thresholds_rejected_on_parse() {
        let toml_str = "[scheduler]\nthresholds = [6, 24, 48]\n";
        assert!(toml::from_str::<Config>(toml_str).is_err());
    }

    #[test]
    fn get_and_set_by_dot_key() {
        let mut cfg = Config::default();
        cfg.set("scheduler.interval_minutes", "10").unwrap();
        assert_eq!(cfg.scheduler.interval_minutes, 10);
        assert_eq!(cfg.get("scheduler.interval_minutes").unwrap(), "10");

        cfg.set("frontend.base_url", "https://board.example.com").unwrap();
        assert_eq!(cfg.frontend.base_url, "https://board.example.com");

        assert!(cfg.set("scheduler.no_such_key", "1").is_err());
    }

    #[test]
    fn set_threshold_array_by_dot_key() {
        let mut cfg = Config::default();
        cfg.set("scheduler.thresholds", "[24, 12, 0]").unwrap();
        assert_eq!(cfg.scheduler.thresholds.hours(), &[24, 12, 0]);
        // Unsorted arrays fail ThresholdSet validation during re-decode.
        assert!(cfg.set("scheduler.thresholds", "[1, 2, 3]").is_err());
    }
}
