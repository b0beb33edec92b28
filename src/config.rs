//! Configuration for registry replication.
//!
//! Configuration can be constructed programmatically or deserialized from
//! YAML/JSON. Durations are duration strings (`"30s"`, `"500ms"`) parsed
//! with `humantime`.
//!
//! # Quick Start
//!
//! ```rust
//! use registry_replication::config::RemoteRegionConfig;
//!
//! let config = RemoteRegionConfig {
//!     region_name: "eu-west-1".into(),
//!     base_url: "http://registry.eu-west-1.example:8080/v2/".into(),
//!     ..Default::default()
//! };
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! RemoteRegionConfig
//! ├── region_name: String          # Remote region being mirrored
//! ├── base_url: String             # Registry base URL (trailing slash)
//! ├── fetch: FetchConfig           # Refresh cycle tuning
//! └── transport: TransportConfig   # HTTP client timeouts
//!
//! PeerNodeConfig                   # One per cluster peer (push path)
//! ├── node_name: String
//! ├── base_url: String
//! ├── batch_path: String           # Batch replication endpoint
//! └── transport: TransportConfig
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// RemoteRegionConfig: the pull path (registry cache refresh)
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration for mirroring one remote-region registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteRegionConfig {
    /// Name of the remote region (used in logs and metrics labels).
    pub region_name: String,

    /// Base URL of the remote registry, with trailing slash.
    /// Fetch paths (`apps/`, `apps/delta`) are joined onto it.
    pub base_url: String,

    /// Refresh cycle tuning.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// HTTP client timeouts.
    #[serde(default)]
    pub transport: TransportConfig,
}

impl Default for RemoteRegionConfig {
    fn default() -> Self {
        Self {
            region_name: "default".to_string(),
            base_url: "http://localhost:8080/v2/".to_string(),
            fetch: FetchConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl RemoteRegionConfig {
    /// Create a config for testing against a local mock server.
    pub fn for_testing(region_name: &str, base_url: &str) -> Self {
        Self {
            region_name: region_name.to_string(),
            base_url: base_url.to_string(),
            fetch: FetchConfig::testing(),
            transport: TransportConfig::testing(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FetchConfig: refresh cycle settings
// ═══════════════════════════════════════════════════════════════════════════════

/// Refresh cycle tuning for the remote registry cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Disable delta fetches entirely; every cycle does a full fetch.
    #[serde(default = "default_false")]
    pub disable_delta: bool,

    /// Interval between refresh cycles, as a duration string (e.g. "30s").
    #[serde(default = "default_fetch_interval")]
    pub fetch_interval: String,

    /// Exponential backoff bound: after repeated failures the effective
    /// delay grows up to `fetch_interval * backoff_bound`.
    #[serde(default = "default_backoff_bound")]
    pub backoff_bound: u32,

    /// Worker slots for concurrent refresh cycles (direct handoff; a cycle
    /// that finds no free slot is skipped, never queued).
    #[serde(default = "default_worker_slots")]
    pub worker_slots: usize,
}

fn default_false() -> bool {
    false
}

fn default_fetch_interval() -> String {
    "30s".to_string()
}

fn default_backoff_bound() -> u32 {
    5
}

fn default_worker_slots() -> usize {
    2
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            disable_delta: false,
            fetch_interval: "30s".to_string(),
            backoff_bound: 5,
            worker_slots: 2,
        }
    }
}

impl FetchConfig {
    /// Fast cycles for tests.
    pub fn testing() -> Self {
        Self {
            disable_delta: false,
            fetch_interval: "50ms".to_string(),
            backoff_bound: 3,
            worker_slots: 2,
        }
    }

    /// Parse the fetch interval string to a Duration.
    pub fn fetch_interval_duration(&self) -> Duration {
        humantime::parse_duration(&self.fetch_interval).unwrap_or(Duration::from_secs(30))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TransportConfig: HTTP client timeouts
// ═══════════════════════════════════════════════════════════════════════════════

/// HTTP client settings shared by the pull and push paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// TCP connect timeout, as a duration string.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,

    /// Whole-request timeout (connect + read), as a duration string.
    #[serde(default = "default_read_timeout")]
    pub read_timeout: String,

    /// Whether to negotiate gzip content encoding on responses.
    #[serde(default = "default_true")]
    pub gzip: bool,
}

fn default_connect_timeout() -> String {
    "1s".to_string()
}

fn default_read_timeout() -> String {
    "5s".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: "1s".to_string(),
            read_timeout: "5s".to_string(),
            gzip: true,
        }
    }
}

impl TransportConfig {
    /// Fast timeouts for tests.
    pub fn testing() -> Self {
        Self {
            connect_timeout: "500ms".to_string(),
            read_timeout: "2s".to_string(),
            gzip: false,
        }
    }

    pub fn connect_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.connect_timeout).unwrap_or(Duration::from_secs(1))
    }

    pub fn read_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.read_timeout).unwrap_or(Duration::from_secs(5))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PeerNodeConfig: the push path (peer replication)
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration for one cluster peer receiving replicated events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerNodeConfig {
    /// Peer's node name (for logging and metrics labels).
    pub node_name: String,

    /// Peer registry base URL, with trailing slash.
    pub base_url: String,

    /// Path of the batch replication endpoint, relative to `base_url`.
    #[serde(default = "default_batch_path")]
    pub batch_path: String,

    /// HTTP client timeouts.
    #[serde(default)]
    pub transport: TransportConfig,
}

fn default_batch_path() -> String {
    "peerreplication/batch/".to_string()
}

impl PeerNodeConfig {
    /// Create a peer config for testing.
    pub fn for_testing(node_name: &str, base_url: &str) -> Self {
        Self {
            node_name: node_name.to_string(),
            base_url: base_url.to_string(),
            batch_path: default_batch_path(),
            transport: TransportConfig::testing(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_config_defaults() {
        let config = FetchConfig::default();
        assert!(!config.disable_delta);
        assert_eq!(config.fetch_interval, "30s");
        assert_eq!(config.backoff_bound, 5);
        assert_eq!(config.worker_slots, 2);
    }

    #[test]
    fn test_fetch_interval_parsing() {
        let config = FetchConfig {
            fetch_interval: "2m".to_string(),
            ..Default::default()
        };
        assert_eq!(config.fetch_interval_duration(), Duration::from_secs(120));
    }

    #[test]
    fn test_fetch_interval_invalid_fallback() {
        let config = FetchConfig {
            fetch_interval: "soon".to_string(),
            ..Default::default()
        };
        assert_eq!(config.fetch_interval_duration(), Duration::from_secs(30));
    }

    #[test]
    fn test_transport_timeout_parsing() {
        let config = TransportConfig {
            connect_timeout: "250ms".to_string(),
            read_timeout: "10s".to_string(),
            gzip: true,
        };
        assert_eq!(config.connect_timeout_duration(), Duration::from_millis(250));
        assert_eq!(config.read_timeout_duration(), Duration::from_secs(10));
    }

    #[test]
    fn test_remote_region_for_testing() {
        let config = RemoteRegionConfig::for_testing("test-region", "http://127.0.0.1:9999/");
        assert_eq!(config.region_name, "test-region");
        assert_eq!(config.fetch.fetch_interval, "50ms");
        assert!(!config.transport.gzip);
    }

    #[test]
    fn test_peer_node_default_batch_path() {
        let config = PeerNodeConfig::for_testing("peer-1", "http://peer1:8080/");
        assert_eq!(config.batch_path, "peerreplication/batch/");
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = RemoteRegionConfig {
            region_name: "us-east-1".to_string(),
            base_url: "http://registry:8080/v2/".to_string(),
            fetch: FetchConfig {
                disable_delta: true,
                fetch_interval: "10s".to_string(),
                backoff_bound: 4,
                worker_slots: 1,
            },
            transport: TransportConfig::default(),
        };

        let json = serde_json::to_string(&config).unwrap();
        let parsed: RemoteRegionConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.region_name, "us-east-1");
        assert!(parsed.fetch.disable_delta);
        assert_eq!(parsed.fetch.fetch_interval, "10s");
        assert_eq!(parsed.fetch.worker_slots, 1);
    }

    #[test]
    fn test_config_deserializes_with_field_defaults() {
        let json = r#"{
            "region_name": "ap-south-1",
            "base_url": "http://registry:8080/v2/"
        }"#;
        let parsed: RemoteRegionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.fetch.fetch_interval, "30s");
        assert!(parsed.transport.gzip);
    }
}
