//! Application-level configuration loading for the lobby dev harness.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::session::CoordinatorSettings;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "LOBBY_COORDINATOR_CONFIG_PATH";

const DEFAULT_MAX_MEMBERS: usize = 4;
const DEFAULT_TICK_INTERVAL_MS: u64 = 50;
const DEFAULT_COUNTDOWN_SECS: u64 = 5;
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_HOST_NAME: &str = "host";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Capacity of the lobby created at startup.
    pub max_members: usize,
    /// Period of the update loop driving every coordinator.
    pub tick_interval: Duration,
    /// Lobby countdown once everybody is ready.
    pub countdown: Duration,
    /// Whether the host starts the game when the countdown expires.
    pub auto_start: bool,
    /// Display name of the session owner.
    pub host_name: String,
    /// Simulated participants joining the host's lobby.
    pub peers: Vec<String>,
    /// HTTP port; the `PORT` environment variable takes precedence.
    pub port: u16,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        peers = app_config.peers.len(),
                        max_members = app_config.max_members,
                        "loaded lobby configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Subset handed to every coordinator.
    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            max_members: self.max_members,
            countdown: self.countdown,
            auto_start: self.auto_start,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    max_members: Option<usize>,
    tick_interval_ms: Option<u64>,
    countdown_secs: Option<u64>,
    auto_start: Option<bool>,
    host_name: Option<String>,
    peers: Vec<String>,
    port: Option<u16>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let max_members = value.max_members.unwrap_or(DEFAULT_MAX_MEMBERS).max(1);
        let host_name = value
            .host_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_HOST_NAME.to_string());

        let mut peers: Vec<String> = value
            .peers
            .into_iter()
            .filter(|name| !name.trim().is_empty() && *name != host_name)
            .collect();
        if peers.len() >= max_members {
            warn!(
                configured = peers.len(),
                max_members, "more peers than the lobby can hold; dropping the extra ones"
            );
            peers.truncate(max_members - 1);
        }

        Self {
            max_members,
            tick_interval: Duration::from_millis(
                value
                    .tick_interval_ms
                    .unwrap_or(DEFAULT_TICK_INTERVAL_MS)
                    .max(1),
            ),
            countdown: Duration::from_secs(value.countdown_secs.unwrap_or(DEFAULT_COUNTDOWN_SECS)),
            auto_start: value.auto_start.unwrap_or(true),
            host_name,
            peers,
            port: value.port.unwrap_or(DEFAULT_PORT),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_a_four_seat_lobby() {
        let config = AppConfig::default();
        assert_eq!(config.max_members, 4);
        assert_eq!(config.countdown, Duration::from_secs(5));
        assert_eq!(config.tick_interval, Duration::from_millis(50));
        assert!(config.auto_start);
        assert!(config.peers.is_empty());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let raw: RawConfig =
            serde_json::from_str(r#"{"host_name":"Ada","peers":["Bob","Cy"]}"#).unwrap();
        let config = AppConfig::from(raw);
        assert_eq!(config.host_name, "Ada");
        assert_eq!(config.peers, vec!["Bob".to_string(), "Cy".to_string()]);
        assert_eq!(config.max_members, 4);
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn peers_are_capped_by_capacity() {
        let raw: RawConfig = serde_json::from_str(
            r#"{"max_members":2,"host_name":"Ada","peers":["Ada","Bob","Cy",""]}"#,
        )
        .unwrap();
        let config = AppConfig::from(raw);
        assert_eq!(config.peers, vec!["Bob".to_string()]);
    }

    #[test]
    fn settings_are_forwarded() {
        let raw: RawConfig =
            serde_json::from_str(r#"{"countdown_secs":3,"auto_start":false}"#).unwrap();
        let settings = AppConfig::from(raw).coordinator_settings();
        assert_eq!(settings.countdown, Duration::from_secs(3));
        assert!(!settings.auto_start);
    }
}
