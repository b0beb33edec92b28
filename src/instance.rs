//! Service instance value types.
//!
//! An [`InstanceInfo`] describes one registered service instance as reported
//! by a registry peer: identity, network location, health endpoints, status,
//! and the `lastDirtyTimestamp` optimistic version marker.
//!
//! Instances are immutable once decoded from a network response; the cache
//! copies them wholesale and never mutates them in place.
//!
//! # Status precedence
//!
//! An instance carries two statuses: the self-reported [`InstanceInfo::status`]
//! and an optional operator-level [`InstanceInfo::overridden_status`]. When an
//! override is present it takes precedence; see
//! [`InstanceInfo::effective_status()`].

use serde::{Deserialize, Serialize};

/// Health status of a service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    /// Instance is starting up, not yet ready for traffic.
    Starting,
    /// Instance is healthy and serving.
    Up,
    /// Instance reported itself unhealthy.
    Down,
    /// Instance was taken out of rotation (operator action).
    OutOfService,
    /// Status could not be determined. Catch-all for unrecognized values.
    #[serde(other)]
    Unknown,
}

impl InstanceStatus {
    /// Wire name, as used in query parameters and the reconcile hash.
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Starting => "STARTING",
            InstanceStatus::Up => "UP",
            InstanceStatus::Down => "DOWN",
            InstanceStatus::OutOfService => "OUT_OF_SERVICE",
            InstanceStatus::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of an auto-scaling group, used by peer replication only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AsgStatus {
    Enabled,
    Disabled,
}

impl AsgStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AsgStatus::Enabled => "ENABLED",
            AsgStatus::Disabled => "DISABLED",
        }
    }
}

/// How a delta payload wants an instance merged into the local cache.
///
/// Only present on instances inside a delta response; a full snapshot
/// carries no action tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    /// Upsert: the instance is new to the registry.
    Added,
    /// Upsert: the instance changed (status, metadata, lease renewal).
    Modified,
    /// Remove the instance from the containing application.
    Deleted,
}

/// Lease contract for an instance: how often it must renew and how long
/// the registry waits before expiring it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseInfo {
    /// Seconds between expected heartbeat renewals.
    #[serde(default = "default_renewal_interval")]
    pub renewal_interval_secs: u32,
    /// Seconds without a renewal before the lease expires.
    #[serde(default = "default_lease_duration")]
    pub duration_secs: u32,
    /// Epoch millis of initial registration.
    #[serde(default)]
    pub registration_timestamp: u64,
    /// Epoch millis of the most recent renewal.
    #[serde(default)]
    pub last_renewal_timestamp: u64,
}

fn default_renewal_interval() -> u32 {
    30
}

fn default_lease_duration() -> u32 {
    90
}

impl Default for LeaseInfo {
    fn default() -> Self {
        Self {
            renewal_interval_secs: 30,
            duration_secs: 90,
            registration_timestamp: 0,
            last_renewal_timestamp: 0,
        }
    }
}

/// One registered service instance, as decoded from a registry response.
///
/// Identity is the `(app_name, instance_id)` pair. `last_dirty_timestamp`
/// is a monotonically non-decreasing marker used for optimistic conflict
/// detection on heartbeats and status updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceInfo {
    /// Owning application name. Matches the containing `Application`'s name.
    pub app_name: String,
    /// Unique instance id within the application.
    pub instance_id: String,
    #[serde(default)]
    pub host_name: String,
    #[serde(default)]
    pub ip_addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub secure_port: Option<u16>,
    /// Self-reported status.
    pub status: InstanceStatus,
    /// Operator/ASG-level override; takes precedence over `status`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overridden_status: Option<InstanceStatus>,
    #[serde(default)]
    pub health_check_url: String,
    #[serde(default)]
    pub status_page_url: String,
    #[serde(default)]
    pub home_page_url: String,
    /// Optimistic version marker; monotonically non-decreasing.
    #[serde(default)]
    pub last_dirty_timestamp: u64,
    #[serde(default)]
    pub lease_info: LeaseInfo,
    /// Delta merge tag. Present only inside delta payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<ActionType>,
}

fn default_port() -> u16 {
    8080
}

impl InstanceInfo {
    /// Minimal instance for tests and examples.
    pub fn for_testing(app_name: &str, instance_id: &str, status: InstanceStatus) -> Self {
        Self {
            app_name: app_name.to_string(),
            instance_id: instance_id.to_string(),
            host_name: format!("{}.example.test", instance_id),
            ip_addr: "127.0.0.1".to_string(),
            port: 8080,
            secure_port: None,
            status,
            overridden_status: None,
            health_check_url: String::new(),
            status_page_url: String::new(),
            home_page_url: String::new(),
            last_dirty_timestamp: 0,
            lease_info: LeaseInfo::default(),
            action_type: None,
        }
    }

    /// Same instance tagged with a delta action.
    pub fn with_action(mut self, action: ActionType) -> Self {
        self.action_type = Some(action);
        self
    }

    /// The status to act on: the override when present, otherwise the
    /// self-reported status.
    pub fn effective_status(&self) -> InstanceStatus {
        self.overridden_status.unwrap_or(self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_as_str() {
        assert_eq!(InstanceStatus::Up.as_str(), "UP");
        assert_eq!(InstanceStatus::OutOfService.as_str(), "OUT_OF_SERVICE");
        assert_eq!(InstanceStatus::Unknown.to_string(), "UNKNOWN");
    }

    #[test]
    fn test_status_deserialize_unrecognized_falls_back_to_unknown() {
        let status: InstanceStatus = serde_json::from_str("\"SOMETHING_NEW\"").unwrap();
        assert_eq!(status, InstanceStatus::Unknown);
    }

    #[test]
    fn test_effective_status_prefers_override() {
        let mut info = InstanceInfo::for_testing("app", "i-1", InstanceStatus::Up);
        assert_eq!(info.effective_status(), InstanceStatus::Up);

        info.overridden_status = Some(InstanceStatus::OutOfService);
        assert_eq!(info.effective_status(), InstanceStatus::OutOfService);
    }

    #[test]
    fn test_instance_json_roundtrip() {
        let info = InstanceInfo::for_testing("SEARCH", "i-abc123", InstanceStatus::Up)
            .with_action(ActionType::Added);

        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"appName\":\"SEARCH\""));
        assert!(json.contains("\"actionType\":\"ADDED\""));

        let parsed: InstanceInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, info);
    }

    #[test]
    fn test_instance_omits_absent_optionals() {
        let info = InstanceInfo::for_testing("SEARCH", "i-abc123", InstanceStatus::Up);
        let json = serde_json::to_string(&info).unwrap();
        assert!(!json.contains("overriddenStatus"));
        assert!(!json.contains("actionType"));
    }

    #[test]
    fn test_instance_decodes_with_missing_lease() {
        let json = r#"{
            "appName": "SEARCH",
            "instanceId": "i-1",
            "status": "UP"
        }"#;
        let parsed: InstanceInfo = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.lease_info.renewal_interval_secs, 30);
        assert_eq!(parsed.lease_info.duration_secs, 90);
        assert_eq!(parsed.port, 8080);
        assert_eq!(parsed.last_dirty_timestamp, 0);
    }

    #[test]
    fn test_asg_status_as_str() {
        assert_eq!(AsgStatus::Enabled.as_str(), "ENABLED");
        assert_eq!(AsgStatus::Disabled.as_str(), "DISABLED");
    }
}
