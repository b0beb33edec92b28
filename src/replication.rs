//! Replication client: typed instance-level operations against one peer.
//!
//! [`ReplicationClient`] sends register/cancel/heartbeat/status/batch events
//! to a single named peer and interprets its responses uniformly. It is the
//! push half of the protocol; the pull half lives in
//! [`RemoteRegistryCache`](crate::cache::RemoteRegistryCache).
//!
//! # Contract
//!
//! Every operation returns `Result<PeerResponse<...>>`:
//!
//! - `Err(..)` only for transport or decode failures: the request never
//!   reached the peer, or the body was unusable where one was required.
//! - Non-2xx statuses come back as values; callers branch on
//!   [`PeerResponse::status`] and decide retry/ignore.
//!
//! The single most important case is the heartbeat conflict: on HTTP 409 the
//! peer returns its current copy of the instance, which is how a lagging
//! node learns it is stale. See [`ReplicationClient::send_heartbeat`].

use crate::apps::Applications;
use crate::error::{RegistryError, Result};
use crate::instance::{AsgStatus, InstanceInfo, InstanceStatus};
use crate::metrics;
use crate::transport::{PeerResponse, RegistryTransport};
use crate::config::{PeerNodeConfig, RemoteRegionConfig};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

// ═══════════════════════════════════════════════════════════════════════════════
// Batch replication protocol types
// ═══════════════════════════════════════════════════════════════════════════════

/// Kind of instance-level event carried in a replication batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Heartbeat,
    Register,
    Cancel,
    StatusUpdate,
    DeleteStatusOverride,
}

/// One instance-level event inside a replication batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationInstance {
    pub app_name: String,
    pub id: String,
    #[serde(default)]
    pub last_dirty_timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overridden_status: Option<InstanceStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<InstanceStatus>,
    /// Full instance payload; required for `Register`, optional otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_info: Option<InstanceInfo>,
    pub action: Action,
}

/// A batch of events pushed to a peer in one round trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationList {
    pub replication_list: Vec<ReplicationInstance>,
}

impl ReplicationList {
    pub fn new(events: Vec<ReplicationInstance>) -> Self {
        Self {
            replication_list: events,
        }
    }

    pub fn len(&self) -> usize {
        self.replication_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replication_list.is_empty()
    }
}

/// Per-event outcome inside a batch response.
///
/// Carries the peer's instance copy when the event conflicted (the same
/// recovery contract as a heartbeat 409).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationInstanceResponse {
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_entity: Option<InstanceInfo>,
}

/// Peer's reply to a batch: one outcome per submitted event, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationListResponse {
    pub response_list: Vec<ReplicationInstanceResponse>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ReplicationClient
// ═══════════════════════════════════════════════════════════════════════════════

/// Client for instance-level registry operations against one peer.
///
/// Construct with [`remote_region`](Self::remote_region) for pull-style
/// traffic or [`cluster_peer`](Self::cluster_peer) for peer replication
/// (which marks every request so the receiver does not replicate it onward).
pub struct ReplicationClient {
    transport: RegistryTransport,
    batch_path: String,
}

impl ReplicationClient {
    /// Client for fetching registry state from a remote region.
    pub fn remote_region(config: &RemoteRegionConfig) -> Result<Self> {
        Ok(Self {
            transport: RegistryTransport::remote_region(config)?,
            batch_path: "peerreplication/batch/".to_string(),
        })
    }

    /// Client for replicating events to a cluster peer.
    pub fn cluster_peer(config: &PeerNodeConfig) -> Result<Self> {
        Ok(Self {
            transport: RegistryTransport::cluster_peer(config)?,
            batch_path: config.batch_path.clone(),
        })
    }

    /// Name of the peer this client talks to.
    pub fn node_name(&self) -> &str {
        self.transport.node_name()
    }

    /// Register an instance with the peer.
    pub async fn register(&self, info: &InstanceInfo) -> Result<PeerResponse<()>> {
        let path = format!("apps/{}", info.app_name);
        let builder = self.transport.request(Method::POST, &path)?.json(info);
        let response = self.transport.execute("register", builder).await?;
        let status = response.status().as_u16();
        debug!(node = %self.node_name(), path, status, instance = %info.instance_id, "register");
        metrics::record_replication_request(self.node_name(), "register", status);
        Ok(PeerResponse::of(status))
    }

    /// Cancel (deregister) an instance.
    pub async fn cancel(&self, app_name: &str, id: &str) -> Result<PeerResponse<()>> {
        let path = format!("apps/{}/{}", app_name, id);
        let builder = self.transport.request(Method::DELETE, &path)?;
        let response = self.transport.execute("cancel", builder).await?;
        let status = response.status().as_u16();
        debug!(node = %self.node_name(), path, status, "cancel");
        metrics::record_replication_request(self.node_name(), "cancel", status);
        Ok(PeerResponse::of(status))
    }

    /// Renew an instance lease.
    ///
    /// On HTTP 409 the peer returns its current copy of the instance in the
    /// response entity so the caller can reconcile locally; a 409 without a
    /// body yields `entity: None`.
    pub async fn send_heartbeat(
        &self,
        app_name: &str,
        id: &str,
        info: &InstanceInfo,
        overridden_status: Option<InstanceStatus>,
    ) -> Result<PeerResponse<InstanceInfo>> {
        let path = format!("apps/{}/{}", app_name, id);
        let mut query: Vec<(&str, String)> = vec![
            ("status", info.status.to_string()),
            ("lastDirtyTimestamp", info.last_dirty_timestamp.to_string()),
        ];
        if let Some(overridden) = overridden_status {
            query.push(("overriddenstatus", overridden.to_string()));
        }

        let builder = self.transport.request(Method::PUT, &path)?.query(&query);
        let response = self.transport.execute("heartbeat", builder).await?;
        let status = response.status().as_u16();
        debug!(node = %self.node_name(), path, status, "heartbeat");
        metrics::record_replication_request(self.node_name(), "heartbeat", status);

        if status == StatusCode::CONFLICT.as_u16() {
            let peer_instance: Option<InstanceInfo> =
                decode_optional_body("heartbeat", response).await?;
            if peer_instance.is_some() {
                metrics::record_heartbeat_conflict(self.node_name());
            }
            return Ok(PeerResponse {
                status,
                entity: peer_instance,
            });
        }
        Ok(PeerResponse::of(status))
    }

    /// Replicate a status change for an instance.
    pub async fn status_update(
        &self,
        app_name: &str,
        id: &str,
        new_status: InstanceStatus,
        last_dirty_timestamp: u64,
    ) -> Result<PeerResponse<()>> {
        let path = format!("apps/{}/{}/status", app_name, id);
        let builder = self.transport.request(Method::PUT, &path)?.query(&[
            ("value", new_status.to_string()),
            ("lastDirtyTimestamp", last_dirty_timestamp.to_string()),
        ]);
        let response = self.transport.execute("statusUpdate", builder).await?;
        let status = response.status().as_u16();
        debug!(node = %self.node_name(), path, status, "statusUpdate");
        metrics::record_replication_request(self.node_name(), "statusUpdate", status);
        Ok(PeerResponse::of(status))
    }

    /// Remove an operator status override from an instance.
    pub async fn delete_status_override(
        &self,
        app_name: &str,
        id: &str,
        last_dirty_timestamp: u64,
    ) -> Result<PeerResponse<()>> {
        let path = format!("apps/{}/{}/status", app_name, id);
        let builder = self
            .transport
            .request(Method::DELETE, &path)?
            .query(&[("lastDirtyTimestamp", last_dirty_timestamp.to_string())]);
        let response = self.transport.execute("deleteStatusOverride", builder).await?;
        let status = response.status().as_u16();
        debug!(node = %self.node_name(), path, status, "deleteStatusOverride");
        metrics::record_replication_request(self.node_name(), "deleteStatusOverride", status);
        Ok(PeerResponse::of(status))
    }

    /// Fetch the peer's full registry snapshot.
    pub async fn get_applications(&self) -> Result<PeerResponse<Applications>> {
        self.get_decoded("getApplications", "apps/").await
    }

    /// Fetch the peer's incremental delta since its last snapshot window.
    pub async fn get_delta(&self) -> Result<PeerResponse<Applications>> {
        self.get_decoded("getDelta", "apps/delta").await
    }

    /// Fetch a single instance.
    pub async fn get_instance(&self, app_name: &str, id: &str) -> Result<PeerResponse<InstanceInfo>> {
        let path = format!("apps/{}/{}", app_name, id);
        self.get_decoded("getInstance", &path).await
    }

    /// Push a batch of replication events in one round trip.
    ///
    /// The call itself reports the transport-level status; individual event
    /// outcomes are inside [`ReplicationListResponse`] and only decoded on
    /// a 2xx status.
    pub async fn submit_batch_updates(
        &self,
        list: &ReplicationList,
    ) -> Result<PeerResponse<ReplicationListResponse>> {
        let path = self.batch_path.clone();
        let builder = self.transport.request(Method::POST, &path)?.json(list);
        let response = self.transport.execute("submitBatchUpdates", builder).await?;
        let status = response.status().as_u16();
        debug!(node = %self.node_name(), path, status, events = list.len(), "submitBatchUpdates");
        metrics::record_replication_request(self.node_name(), "submitBatchUpdates", status);

        if !(200..300).contains(&status) {
            return Ok(PeerResponse::of(status));
        }
        let batch: ReplicationListResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::decode("submitBatchUpdates", e.to_string()))?;
        Ok(PeerResponse::with_entity(status, batch))
    }

    /// Replicate an auto-scaling group status change (peer replication only).
    pub async fn asg_status_update(
        &self,
        asg_name: &str,
        new_status: AsgStatus,
    ) -> Result<PeerResponse<()>> {
        let path = format!("asg/{}/status", asg_name);
        let builder = self
            .transport
            .request(Method::PUT, &path)?
            .query(&[("value", new_status.as_str())]);
        let response = self.transport.execute("asgStatusUpdate", builder).await?;
        let status = response.status().as_u16();
        debug!(node = %self.node_name(), path, status, "asgStatusUpdate");
        metrics::record_replication_request(self.node_name(), "asgStatusUpdate", status);
        Ok(PeerResponse::of(status))
    }

    /// Release the underlying connection resources.
    ///
    /// Consumes the client, so it can only run once per instance.
    pub fn shutdown(self) {
        debug!(node = %self.transport.node_name(), "Replication client shut down");
        drop(self.transport);
    }

    /// GET `path` and decode the body only on 200; any other status (or an
    /// empty body) yields `entity: None`.
    async fn get_decoded<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
    ) -> Result<PeerResponse<T>> {
        let builder = self.transport.request(Method::GET, path)?;
        let response = self.transport.execute(operation, builder).await?;
        let status = response.status().as_u16();
        debug!(node = %self.node_name(), path, status, "{}", operation);
        metrics::record_replication_request(self.node_name(), operation, status);

        if status != StatusCode::OK.as_u16() {
            return Ok(PeerResponse::of(status));
        }
        let entity = decode_optional_body(operation, response).await?;
        Ok(PeerResponse { status, entity })
    }
}

/// Decode a JSON body that may legitimately be absent.
///
/// Empty body ⇒ `None` (not an error); present but unparseable ⇒
/// [`RegistryError::Decode`].
async fn decode_optional_body<T: DeserializeOwned>(
    operation: &str,
    response: Response,
) -> Result<Option<T>> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| RegistryError::transport(operation, e))?;
    if bytes.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| RegistryError::decode(operation, e.to_string()))
}
