//! Configuration types for the day replay service

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::classifier::EntityRule;
use crate::time_math::{offset_from_minutes, DayOffset};
use crate::timeline::{PlaybackDefaults, TrackedEntity, TrackedSensor};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub home_assistant: HomeAssistantConfig,
    #[serde(default)]
    pub entities: Vec<EntityConfig>,
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub timers: TimerConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub timezone: TimezoneConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Connection to the Home Assistant instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeAssistantConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_ha_port")]
    pub port: u16,
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default)]
    pub access_token: String,
    /// Name of an environment variable holding the access token
    #[serde(default)]
    pub access_token_env: Option<String>,
}

impl Default for HomeAssistantConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_ha_port(),
            use_tls: false,
            access_token: String::new(),
            access_token_env: None,
        }
    }
}

impl HomeAssistantConfig {
    pub fn base_url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    pub fn websocket_url(&self) -> String {
        let scheme = if self.use_tls { "wss" } else { "ws" };
        format!("{}://{}:{}/api/websocket", scheme, self.host, self.port)
    }
}

/// An on/off entity to reconstruct
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityConfig {
    pub entity: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub on_states: Option<Vec<String>>,
    #[serde(default)]
    pub on_state: Option<String>,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default = "default_layer")]
    pub layer: u32,
}

impl EntityConfig {
    /// Resolve the classification rule and label once.
    pub fn tracked(&self) -> TrackedEntity {
        TrackedEntity {
            entity_id: self.entity.clone(),
            device_label: self.name.clone().unwrap_or_else(|| self.entity.clone()),
            rule: EntityRule::resolve(
                &self.entity,
                self.on_states.as_deref(),
                self.on_state.as_deref(),
            ),
            room: self.room.clone(),
            layer: self.layer,
        }
    }
}

/// A continuous sensor sampled at the playback position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    pub entity: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
}

impl SensorConfig {
    pub fn tracked(&self) -> TrackedSensor {
        TrackedSensor {
            entity_id: self.entity.clone(),
            name: self.name.clone(),
            unit: self.unit.clone(),
        }
    }
}

/// Live update source selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    /// Try the event subscription before falling back to polling
    #[serde(default = "default_true")]
    pub subscribe: bool,
    #[serde(default = "default_poll_interval_millis")]
    pub poll_interval_millis: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            subscribe: true,
            poll_interval_millis: default_poll_interval_millis(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_tick_interval_millis")]
    pub tick_interval_millis: u64,
    #[serde(default = "default_speed")]
    pub default_speed: f64,
    #[serde(default = "default_past_day_start_seconds")]
    pub past_day_start_seconds: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_interval_millis: default_tick_interval_millis(),
            default_speed: default_speed(),
            past_day_start_seconds: default_past_day_start_seconds(),
        }
    }
}

impl PlaybackConfig {
    pub fn defaults(&self) -> PlaybackDefaults {
        PlaybackDefaults {
            speed: self.default_speed,
            past_day_start_seconds: self.past_day_start_seconds,
        }
    }
}

/// Refresh periods of the live-day display timers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerConfig {
    #[serde(default = "default_live_refresh_seconds")]
    pub live_refresh_seconds: u64,
    #[serde(default = "default_ongoing_refresh_seconds")]
    pub ongoing_refresh_seconds: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            live_refresh_seconds: default_live_refresh_seconds(),
            ongoing_refresh_seconds: default_ongoing_refresh_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimezoneConfig {
    /// Minutes east of UTC; the host's local offset when absent
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
}

/// HTTP API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_api_port(),
        }
    }
}

impl Config {
    /// Read secrets referenced by environment variable name into the config.
    pub fn resolve_secrets(&mut self) -> crate::Result<()> {
        if let Some(var) = &self.home_assistant.access_token_env {
            self.home_assistant.access_token = std::env::var(var).map_err(|_| {
                crate::ReplayError::Config(format!(
                    "Environment variable {} for the access token is not set",
                    var
                ))
            })?;
        }
        Ok(())
    }

    /// Offset used to map timestamps onto seconds-of-day. Without a
    /// configured offset the host zone is resolved for each day.
    pub fn offset(&self) -> crate::Result<DayOffset> {
        match self.timezone.utc_offset_minutes {
            Some(minutes) => offset_from_minutes(minutes).map(DayOffset::Fixed).ok_or_else(|| {
                crate::ReplayError::Config(format!("UTC offset out of range: {} minutes", minutes))
            }),
            None => Ok(DayOffset::HostLocal),
        }
    }

    pub fn tracked_entities(&self) -> Vec<TrackedEntity> {
        self.entities.iter().map(EntityConfig::tracked).collect()
    }

    pub fn tracked_sensors(&self) -> Vec<TrackedSensor> {
        self.sensors.iter().map(SensorConfig::tracked).collect()
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_ha_port() -> u16 {
    8123
}

fn default_layer() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_millis() -> u64 {
    2000
}

fn default_tick_interval_millis() -> u64 {
    100
}

fn default_speed() -> f64 {
    1.0
}

fn default_past_day_start_seconds() -> u32 {
    60
}

fn default_live_refresh_seconds() -> u64 {
    1
}

fn default_ongoing_refresh_seconds() -> u64 {
    60
}

fn default_request_timeout_seconds() -> u64 {
    10
}

fn default_api_port() -> u16 {
    11120
}

/// Load configuration from a JSON file
pub fn load_config(path: &Path) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::ReplayError::Config(format!("Failed to read config file {:?}: {}", path, e))
    })?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}
