//! # Bridge Configuration
//!
//! Configuration management for the sync bridge.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     YUMI_LEADER_TOKEN=y0_...                                           │
//! │     YUMI_PARTICIPANT_TOKENS=y0_a,y0_b                                  │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/yumi/bridge.toml (Linux)                                 │
//! │     ~/Library/Application Support/ru.yumi.bridge/bridge.toml (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     100ms broadcast floor, 10s health tick, generated device id        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # bridge.toml
//! [device]
//! id = "27b61b24-cb43-46b9-bab8-5460f6cef678"
//! title = "Bridge"
//!
//! [leader]
//! token = "y0_leader_token"
//! name = "Leader"
//!
//! [[participants]]
//! token = "y0_participant_token"
//! name = "Participant-1"
//!
//! [sync]
//! min_broadcast_interval_ms = 100
//! health_check_interval_secs = 10
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use uuid::Uuid;

use yumi_core::model::DeviceIdentity;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Device Settings
// =============================================================================

/// The device identity presented by every bridge session.
///
/// One stable id is shared by all identities for the whole process run:
/// the service registers a new device per unknown id, so regenerating it
/// per session or per run pollutes the account's device list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Stable device identifier (UUID v4).
    /// Auto-generated on first run if not provided.
    pub id: String,

    /// Human-readable base title for the device list.
    #[serde(default = "default_device_title")]
    pub title: String,
}

fn default_device_title() -> String {
    "Bridge".to_string()
}

impl Default for DeviceSettings {
    fn default() -> Self {
        DeviceSettings {
            id: Uuid::new_v4().to_string(),
            title: default_device_title(),
        }
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// One identity's credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialSettings {
    /// Pre-obtained OAuth token (token acquisition is out of scope).
    pub token: String,

    /// Display name used until account info is fetched.
    #[serde(default)]
    pub name: String,
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Sync behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Minimum interval between accepted broadcasts (milliseconds).
    /// Leader updates arriving inside the window are dropped, not queued.
    #[serde(default = "default_min_broadcast_interval")]
    pub min_broadcast_interval_ms: i64,

    /// Interval between health-check ticks (seconds).
    /// Each tick reconnects disconnected participants.
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_secs: u64,

    /// Redirect handshake ceiling (seconds).
    #[serde(default = "default_redirect_timeout")]
    pub redirect_timeout_secs: u64,

    /// State channel connection timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_min_broadcast_interval() -> i64 {
    100
}
fn default_health_check_interval() -> u64 {
    10
}
fn default_redirect_timeout() -> u64 {
    30
}
fn default_connect_timeout() -> u64 {
    30
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            min_broadcast_interval_ms: default_min_broadcast_interval(),
            health_check_interval_secs: default_health_check_interval(),
            redirect_timeout_secs: default_redirect_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

// =============================================================================
// Endpoint Settings
// =============================================================================

/// Remote service endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSettings {
    /// Fixed redirector endpoint (wss).
    #[serde(default = "default_redirect_url")]
    pub redirect_url: String,

    /// Origin header the service expects from its front-end.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Base URL of the read-only metadata API.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

fn default_redirect_url() -> String {
    "wss://ynison.music.yandex.ru/redirector.YnisonRedirectService/GetRedirectToYnison".to_string()
}

fn default_origin() -> String {
    "http://music.yandex.ru".to_string()
}

fn default_api_base_url() -> String {
    "https://api.music.yandex.net".to_string()
}

impl Default for EndpointSettings {
    fn default() -> Self {
        EndpointSettings {
            redirect_url: default_redirect_url(),
            origin: default_origin(),
            api_base_url: default_api_base_url(),
        }
    }
}

// =============================================================================
// Main Bridge Configuration
// =============================================================================

/// Complete bridge configuration.
///
/// ## Example Config File
/// ```toml
/// [device]
/// id = "27b61b24-cb43-46b9-bab8-5460f6cef678"
///
/// [leader]
/// token = "y0_leader"
///
/// [[participants]]
/// token = "y0_first"
///
/// [[participants]]
/// token = "y0_second"
///
/// [sync]
/// min_broadcast_interval_ms = 100
/// health_check_interval_secs = 10
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Device identity settings.
    #[serde(default)]
    pub device: DeviceSettings,

    /// The authoritative identity.
    #[serde(default)]
    pub leader: CredentialSettings,

    /// Dependent identities, in broadcast order.
    #[serde(default)]
    pub participants: Vec<CredentialSettings>,

    /// Sync behavior settings.
    #[serde(default)]
    pub sync: SyncSettings,

    /// Remote service endpoints.
    #[serde(default)]
    pub endpoints: EndpointSettings,
}

impl BridgeConfig {
    /// Creates a new config with defaults and a generated device id.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (bridge.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        // Try to load from config file
        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading bridge config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                // First run: persist the generated device id immediately,
                // or every restart would register a fresh ghost device.
                // Written before env overrides so env-held secrets never
                // land on disk.
                info!(?path, "Config file not found, writing initial config");
                if let Err(e) = config.save(Some(path)) {
                    warn!(error = %e, "Could not persist initial config");
                }
            }
        }

        // Override with environment variables
        config.apply_env_overrides();

        // Validate the configuration
        config.validate()?;

        Ok(config)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Bridge config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.device.id.is_empty() {
            return Err(SyncError::InvalidConfig("device id must not be empty".into()));
        }

        if self.leader.token.is_empty() {
            return Err(SyncError::MissingLeaderToken);
        }

        if let Some(idx) = self.participants.iter().position(|p| p.token.is_empty()) {
            return Err(SyncError::InvalidConfig(format!(
                "participant {} has an empty token",
                idx + 1
            )));
        }

        let redirect = url::Url::parse(&self.endpoints.redirect_url)?;
        if redirect.scheme() != "wss" {
            return Err(SyncError::InvalidUrl(format!(
                "Redirect URL must use the wss scheme, got: {}",
                self.endpoints.redirect_url
            )));
        }

        if self.sync.min_broadcast_interval_ms < 0 {
            return Err(SyncError::InvalidConfig(
                "min_broadcast_interval_ms must not be negative".into(),
            ));
        }

        if self.sync.health_check_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "health_check_interval_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        // Device id
        if let Ok(id) = std::env::var("YUMI_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device id from environment");
            self.device.id = id;
        }

        // Leader token
        if let Ok(token) = std::env::var("YUMI_LEADER_TOKEN") {
            debug!("Overriding leader token from environment");
            self.leader.token = token;
        }

        // Participant tokens (comma-separated, replaces the configured list)
        if let Ok(tokens) = std::env::var("YUMI_PARTICIPANT_TOKENS") {
            debug!("Overriding participant tokens from environment");
            self.participants = tokens
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(|t| CredentialSettings {
                    token: t.to_string(),
                    name: String::new(),
                })
                .collect();
        }

        // Broadcast floor
        if let Ok(ms) = std::env::var("YUMI_MIN_BROADCAST_INTERVAL_MS") {
            if let Ok(parsed) = ms.parse::<i64>() {
                self.sync.min_broadcast_interval_ms = parsed;
            } else {
                warn!(value = %ms, "Ignoring unparsable broadcast interval in environment");
            }
        }

        // Health tick
        if let Ok(secs) = std::env::var("YUMI_HEALTH_CHECK_INTERVAL_SECS") {
            if let Ok(parsed) = secs.parse::<u64>() {
                self.sync.health_check_interval_secs = parsed;
            }
        }

        // Redirect endpoint (useful against a staging environment)
        if let Ok(url) = std::env::var("YUMI_REDIRECT_URL") {
            debug!(url = %url, "Overriding redirect URL from environment");
            self.endpoints.redirect_url = url;
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("ru", "yumi", "bridge").map(|dirs| {
            let config_dir = dirs.config_dir();
            config_dir.join("bridge.toml")
        })
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the shared device id.
    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    /// Builds the device identity for a named session.
    pub fn identity_for(&self, name: &str) -> DeviceIdentity {
        DeviceIdentity {
            device_id: self.device.id.clone(),
            title: name.to_string(),
        }
    }

    /// Returns the leader's display name ("Leader" when unset).
    pub fn leader_name(&self) -> String {
        if self.leader.name.is_empty() {
            "Leader".to_string()
        } else {
            self.leader.name.clone()
        }
    }

    /// Returns the display name for participant `index` (0-based),
    /// defaulting to "Participant-N".
    pub fn participant_name(&self, index: usize) -> String {
        match self.participants.get(index) {
            Some(p) if !p.name.is_empty() => p.name.clone(),
            _ => format!("Participant-{}", index + 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard};

    /// Process environment is shared across the test harness threads;
    /// every test that reads or writes YUMI_* vars holds this lock.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: [&str; 6] = [
        "YUMI_DEVICE_ID",
        "YUMI_LEADER_TOKEN",
        "YUMI_PARTICIPANT_TOKENS",
        "YUMI_MIN_BROADCAST_INTERVAL_MS",
        "YUMI_HEALTH_CHECK_INTERVAL_SECS",
        "YUMI_REDIRECT_URL",
    ];

    fn env_guard() -> MutexGuard<'static, ()> {
        let guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
        guard
    }

    fn valid_config() -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.leader.token = "leader-token".to_string();
        config.participants.push(CredentialSettings {
            token: "p1-token".to_string(),
            name: String::new(),
        });
        config
    }

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert!(!config.device.id.is_empty()); // Auto-generated
        assert_eq!(config.sync.min_broadcast_interval_ms, 100);
        assert_eq!(config.sync.health_check_interval_secs, 10);
        assert_eq!(config.sync.redirect_timeout_secs, 30);
        assert!(config.endpoints.redirect_url.starts_with("wss://"));
    }

    #[test]
    fn test_config_validation() {
        let mut config = valid_config();
        assert!(config.validate().is_ok());

        // Missing leader token should fail
        config.leader.token = String::new();
        assert!(matches!(
            config.validate(),
            Err(SyncError::MissingLeaderToken)
        ));

        // Empty participant token should fail
        let mut config = valid_config();
        config.participants[0].token = String::new();
        assert!(config.validate().is_err());

        // Non-wss redirect URL should fail
        let mut config = valid_config();
        config.endpoints.redirect_url = "https://example.com".to_string();
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        // A redirect URL that is not a URL at all should fail too
        let mut config = valid_config();
        config.endpoints.redirect_url = "not a url".to_string();
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));
    }

    #[test]
    fn test_env_overrides() {
        let _guard = env_guard();
        std::env::set_var("YUMI_DEVICE_ID", "env-device");
        std::env::set_var("YUMI_LEADER_TOKEN", "env-leader");
        std::env::set_var("YUMI_PARTICIPANT_TOKENS", " y0_a, ,y0_b ");
        std::env::set_var("YUMI_MIN_BROADCAST_INTERVAL_MS", "250");
        std::env::set_var("YUMI_HEALTH_CHECK_INTERVAL_SECS", "junk");

        let mut config = valid_config();
        config.apply_env_overrides();

        assert_eq!(config.device.id, "env-device");
        assert_eq!(config.leader.token, "env-leader");
        // The env list replaces the configured participants; blanks are
        // dropped and tokens trimmed.
        let tokens: Vec<&str> = config
            .participants
            .iter()
            .map(|p| p.token.as_str())
            .collect();
        assert_eq!(tokens, vec!["y0_a", "y0_b"]);
        assert_eq!(config.sync.min_broadcast_interval_ms, 250);
        // Unparsable values keep the configured value.
        assert_eq!(config.sync.health_check_interval_secs, 10);

        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_first_run_persists_device_id() {
        let _guard = env_guard();
        let path = std::env::temp_dir().join(format!("yumi-bridge-{}.toml", Uuid::new_v4()));

        // First load writes the generated config, then still fails
        // validation because no leader token is configured anywhere.
        let err = BridgeConfig::load(Some(path.clone())).unwrap_err();
        assert!(matches!(err, SyncError::MissingLeaderToken));
        assert!(path.exists());

        // The persisted file carries the generated device id; a later
        // run with credentials filled in keeps that same id instead of
        // registering a new device.
        let contents = std::fs::read_to_string(&path).unwrap();
        let mut persisted: BridgeConfig = toml::from_str(&contents).unwrap();
        let device_id = persisted.device.id.clone();
        assert!(!device_id.is_empty());

        persisted.leader.token = "leader-token".to_string();
        persisted.save(Some(path.clone())).unwrap();

        let reloaded = BridgeConfig::load(Some(path.clone())).unwrap();
        assert_eq!(reloaded.device_id(), device_id);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_participant_names() {
        let mut config = valid_config();
        config.participants.push(CredentialSettings {
            token: "p2-token".to_string(),
            name: "Dima".to_string(),
        });

        assert_eq!(config.participant_name(0), "Participant-1");
        assert_eq!(config.participant_name(1), "Dima");
        assert_eq!(config.participant_name(7), "Participant-8");
        assert_eq!(config.leader_name(), "Leader");
    }

    #[test]
    fn test_identity_shares_device_id() {
        let config = valid_config();
        let a = config.identity_for("Leader");
        let b = config.identity_for("Participant-1");
        assert_eq!(a.device_id, b.device_id);
        assert_ne!(a.title, b.title);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = valid_config();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[device]"));
        assert!(toml_str.contains("[sync]"));
        assert!(toml_str.contains("[[participants]]"));

        let parsed: BridgeConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.leader.token, "leader-token");
        assert_eq!(parsed.participants.len(), 1);
    }
}
