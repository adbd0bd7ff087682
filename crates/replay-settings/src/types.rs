//! Settings types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeSettings {
    /// Identity and listening address of this app.
    pub app: AppSettings,
    /// Where and how to reach the orchestrator.
    pub sidecar: SidecarSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Identity and listening address of this app.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    /// App name reported at registration.
    pub name: String,
    /// Bind address of the front door.
    pub host: String,
    /// Fixed port. When absent a free port is picked from `port_range_start..=port_range_end`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// First port of the search range.
    pub port_range_start: u16,
    /// Last port of the search range.
    pub port_range_end: u16,
    /// Random probes before giving up on the range.
    pub port_attempts: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            host: "0.0.0.0".to_string(),
            port: None,
            port_range_start: 7001,
            port_range_end: 7999,
            port_attempts: 300,
        }
    }
}

/// Name of the working directory, or `replay-app` when it has none.
fn default_app_name() -> String {
    std::env::current_dir()
        .ok()
        .and_then(|dir| dir.file_name().map(|n| n.to_string_lossy().into_owned()))
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "replay-app".to_string())
}

/// Orchestrator connection settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SidecarSettings {
    /// Base URL of the orchestrator API.
    pub base_url: String,
    /// Whole-request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Pause between registration attempts in milliseconds.
    pub register_retry_delay_ms: u64,
}

impl SidecarSettings {
    /// [`Self::request_timeout_ms`] as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// [`Self::connect_timeout_ms`] as a duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// [`Self::register_retry_delay_ms`] as a duration.
    pub fn register_retry_delay(&self) -> Duration {
        Duration::from_millis(self.register_retry_delay_ms)
    }
}

impl Default for SidecarSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9999".to_string(),
            request_timeout_ms: 30_000,
            connect_timeout_ms: 5_000,
            register_retry_delay_ms: 1_000,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` overrides it.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = RuntimeSettings::default();
        assert_eq!(s.sidecar.base_url, "http://localhost:9999");
        assert_eq!(s.sidecar.request_timeout(), Duration::from_secs(30));
        assert_eq!(s.app.port, None);
        assert_eq!((s.app.port_range_start, s.app.port_range_end), (7001, 7999));
        assert_eq!(s.app.port_attempts, 300);
        assert!(!s.app.name.is_empty());
        assert_eq!(s.logging.level, "info");
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(RuntimeSettings::default()).unwrap();
        assert!(json["sidecar"]["baseUrl"].is_string());
        assert!(json["app"]["portRangeStart"].is_number());
        assert!(json["app"].get("port").is_none());
    }
}
