//! Engine configuration (~/.donorsync/config.json).
//!
//! Every field has a serde default so a partial file is enough.

use std::fs;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub business_hours: BusinessHours,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub booking: BookingConfig,
    #[serde(default)]
    pub invitations: InvitationConfig,
}

// =============================================================================
// Platform
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_session_path")]
    pub session_path: String,
    /// Locally cached token; consulted before the session endpoint.
    #[serde(default)]
    pub token_path: Option<PathBuf>,
    #[serde(default)]
    pub schemas: SchemaConfig,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            session_path: default_session_path(),
            token_path: None,
            schemas: SchemaConfig::default(),
        }
    }
}

impl PlatformConfig {
    pub fn resolved_token_path(&self) -> PathBuf {
        self.token_path
            .clone()
            .unwrap_or_else(|| state_dir().join("token.json"))
    }
}

/// Schema URLs identifying each document type on the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaConfig {
    #[serde(default = "default_calendar_schema")]
    pub calendar_event: String,
    #[serde(default = "default_hospital_schema")]
    pub hospital: String,
    #[serde(default = "default_donor_schema")]
    pub donor: String,
    #[serde(default = "default_invitation_schema")]
    pub invitation: String,
    #[serde(default = "default_connection_schema")]
    pub connection_profile: String,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            calendar_event: default_calendar_schema(),
            hospital: default_hospital_schema(),
            donor: default_donor_schema(),
            invitation: default_invitation_schema(),
            connection_profile: default_connection_schema(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_session_path() -> String {
    "/auth/session".to_string()
}

fn default_calendar_schema() -> String {
    "https://schemas.donorsync.app/calendar-event.json".to_string()
}

fn default_hospital_schema() -> String {
    "https://schemas.donorsync.app/hospital.json".to_string()
}

fn default_donor_schema() -> String {
    "https://schemas.donorsync.app/donor.json".to_string()
}

fn default_invitation_schema() -> String {
    "https://schemas.donorsync.app/invitation.json".to_string()
}

fn default_connection_schema() -> String {
    "https://schemas.donorsync.app/connection-profile.json".to_string()
}

// =============================================================================
// Business hours
// =============================================================================

/// The fixed template the slot grid is generated from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessHours {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_start_hour")]
    pub start_hour: u8,
    #[serde(default = "default_end_hour")]
    pub end_hour: u8,
    #[serde(default = "default_slot_minutes")]
    pub slot_minutes: u32,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            start_hour: default_start_hour(),
            end_hour: default_end_hour(),
            slot_minutes: default_slot_minutes(),
        }
    }
}

impl BusinessHours {
    pub fn tz(&self) -> Result<Tz, EngineError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| EngineError::Configuration(format!("Unknown timezone: {}", self.timezone)))
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_start_hour() -> u8 {
    9
}

fn default_end_hour() -> u8 {
    17
}

fn default_slot_minutes() -> u32 {
    60
}

// =============================================================================
// Generation / booking / invitations
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingConfig {
    #[serde(default = "default_reservation_ttl_secs")]
    pub reservation_ttl_secs: u64,
    #[serde(default = "default_duration_minutes")]
    pub default_duration_minutes: u32,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            reservation_ttl_secs: default_reservation_ttl_secs(),
            default_duration_minutes: default_duration_minutes(),
        }
    }
}

fn default_reservation_ttl_secs() -> u64 {
    120
}

fn default_duration_minutes() -> u32 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationConfig {
    #[serde(default = "default_expiry_days")]
    pub expiry_days: i64,
    #[serde(default = "default_preference_query")]
    pub preference_query: String,
    #[serde(default = "default_search_limit")]
    pub search_limit: u32,
}

impl Default for InvitationConfig {
    fn default() -> Self {
        Self {
            expiry_days: default_expiry_days(),
            preference_query: default_preference_query(),
            search_limit: default_search_limit(),
        }
    }
}

fn default_expiry_days() -> i64 {
    7
}

fn default_preference_query() -> String {
    "fertility donation preferences schedule compensation requirements".to_string()
}

fn default_search_limit() -> u32 {
    20
}

// =============================================================================
// Loading
// =============================================================================

fn state_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".donorsync")
}

/// Get the canonical config file path (~/.donorsync/config.json)
pub fn config_path() -> PathBuf {
    state_dir().join("config.json")
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        let hours = &self.business_hours;
        if hours.start_hour >= hours.end_hour || hours.end_hour > 24 {
            return Err(EngineError::Configuration(format!(
                "Business hours {}..{} are not a valid range",
                hours.start_hour, hours.end_hour
            )));
        }
        if hours.slot_minutes == 0 {
            return Err(EngineError::Configuration(
                "slotMinutes must be greater than zero".to_string(),
            ));
        }
        hours.tz()?;
        if self.platform.base_url.trim().is_empty() {
            return Err(EngineError::Configuration("platform.baseUrl is empty".to_string()));
        }
        Ok(())
    }
}

/// Load and validate configuration from `path`.
pub fn load_config_from(path: &Path) -> Result<EngineConfig, EngineError> {
    let content = fs::read_to_string(path).map_err(|e| {
        EngineError::Configuration(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let config: EngineConfig = serde_json::from_str(&content).map_err(|e| {
        EngineError::Configuration(format!("Failed to parse {}: {}", path.display(), e))
    })?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from ~/.donorsync/config.json
pub fn load_config() -> Result<EngineConfig, EngineError> {
    load_config_from(&config_path())
}

/// Like [`load_config`], but a missing file yields defaults.
pub fn load_config_or_default() -> Result<EngineConfig, EngineError> {
    let path = config_path();
    if !path.exists() {
        log::info!("No config at {}; using defaults", path.display());
        return Ok(EngineConfig::default());
    }
    load_config_from(&path)
}
