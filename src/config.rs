use chrono::{Datelike, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Catalog years to keep in sync.
    #[serde(default = "default_years")]
    pub years: Vec<i32>,

    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_hours: u64,

    #[serde(default = "default_startup_delay")]
    pub startup_delay_secs: u64,

    /// Local hour of the daily broadcast.
    #[serde(default = "default_send_hour")]
    pub send_hour: u32,

    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,

    /// Only this user may trigger a manual refresh.
    #[serde(default)]
    pub admin_id: Option<i64>,

    #[serde(default = "default_cover_size")]
    pub cover_size: u32,

    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default = "default_rate_limit_cooldown")]
    pub rate_limit_cooldown_secs: u64,

    #[serde(default = "default_release_api_url")]
    pub release_api_url: String,

    #[serde(default = "default_history_url")]
    pub history_url: String,

    #[serde(default = "default_cover_api_url")]
    pub cover_api_url: String,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hiphop-geek");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("releases.db").to_string_lossy().to_string()
}

fn default_years() -> Vec<i32> {
    vec![Utc::now().year()]
}

fn default_refresh_interval() -> u64 {
    8
}

fn default_startup_delay() -> u64 {
    30
}

fn default_send_hour() -> u32 {
    9
}

fn default_utc_offset() -> i32 {
    7
}

fn default_cover_size() -> u32 {
    600
}

fn default_page_size() -> u32 {
    10
}

fn default_rate_limit_cooldown() -> u64 {
    60
}

fn default_release_api_url() -> String {
    "https://app.hiphopdx.com/wp-json/hiphopdx-api/v1/get_posts".to_string()
}

fn default_history_url() -> String {
    "https://todayinhiphophistory.com".to_string()
}

fn default_cover_api_url() -> String {
    "https://itunes.apple.com/search".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            years: default_years(),
            refresh_interval_hours: default_refresh_interval(),
            startup_delay_secs: default_startup_delay(),
            send_hour: default_send_hour(),
            utc_offset_hours: default_utc_offset(),
            admin_id: None,
            cover_size: default_cover_size(),
            page_size: default_page_size(),
            rate_limit_cooldown_secs: default_rate_limit_cooldown(),
            release_api_url: default_release_api_url(),
            history_url: default_history_url(),
            cover_api_url: default_cover_api_url(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config = Self::from_toml(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hiphop-geek")
            .join("config.toml")
    }

    fn validate(&self) -> Result<()> {
        if self.send_hour > 23 {
            return Err(AppError::Config(format!("send_hour {} is not an hour of the day", self.send_hour)));
        }
        if self.page_size == 0 {
            return Err(AppError::Config("page_size must be positive".to_string()));
        }
        self.utc_offset()?;
        Ok(())
    }

    pub fn utc_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_hours * 3600)
            .ok_or_else(|| AppError::Config(format!("utc_offset_hours {} out of range", self.utc_offset_hours)))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_hours * 3600)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config = Config::from_toml(
            r#"
            db_path = "/tmp/releases.db"
            years = [2023, 2024]
            admin_id = 42
            "#,
        )
        .unwrap();

        assert_eq!(config.db_path, "/tmp/releases.db");
        assert_eq!(config.years, [2023, 2024]);
        assert_eq!(config.admin_id, Some(42));
        assert_eq!(config.refresh_interval(), Duration::from_secs(8 * 3600));
        assert_eq!(config.startup_delay(), Duration::from_secs(30));
        assert_eq!(config.send_hour, 9);
        assert_eq!(config.cover_size, 600);
        assert_eq!(config.page_size, 10);
        assert_eq!(config.utc_offset().unwrap().local_minus_utc(), 7 * 3600);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(matches!(Config::from_toml("send_hour = 24"), Err(AppError::Config(_))));
        assert!(matches!(Config::from_toml("page_size = 0"), Err(AppError::Config(_))));
        assert!(matches!(Config::from_toml("utc_offset_hours = 30"), Err(AppError::Config(_))));
    }

    #[test]
    fn saved_defaults_parse_back() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        let config = Config::from_toml(&text).unwrap();

        assert_eq!(config.cover_api_url, default_cover_api_url());
        assert_eq!(config.admin_id, None);
    }
}
