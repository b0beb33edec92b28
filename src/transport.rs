//! HTTP transport to a peer registry node.
//!
//! [`RegistryTransport`] is a thin wrapper over a `reqwest` client bound to
//! one peer's base URL. It owns everything that differs between peer kinds:
//!
//! - **Remote region** ([`RegistryTransport::remote_region`]): plain client
//!   traffic, no replication marker.
//! - **Cluster peer** ([`RegistryTransport::cluster_peer`]): every request
//!   carries the replication marker header so the receiving node can tell
//!   peer-originated traffic from client traffic and not re-replicate it.
//!
//! Both kinds attach identity headers naming the sending node, so peers can
//! attribute traffic in their logs. Gzip response decoding is negotiated by
//! the underlying client and is transparent to callers.
//!
//! Non-2xx statuses are **not** errors at this layer; operations return the
//! raw response and interpretation happens in
//! [`ReplicationClient`](crate::replication::ReplicationClient).

use crate::config::{PeerNodeConfig, RemoteRegionConfig, TransportConfig};
use crate::error::{RegistryError, Result};
use reqwest::{Method, RequestBuilder, Response};
use tracing::warn;
use url::Url;

/// Replication marker header: set to `"true"` on all peer-originated
/// requests, absent on ordinary client traffic.
pub const HEADER_REPLICATION: &str = "x-registry-replication";

/// Identity headers describing the sending node.
pub const HEADER_IDENTITY_NAME: &str = "x-registry-identity-name";
pub const HEADER_IDENTITY_VERSION: &str = "x-registry-identity-version";
pub const HEADER_IDENTITY_ID: &str = "x-registry-identity-id";

/// A peer's reply: transport-level status plus an optional decoded payload.
///
/// Mirrors the rule that non-2xx statuses are values, not errors. Callers
/// branch on [`status`](Self::status).
#[derive(Debug, Clone, PartialEq)]
pub struct PeerResponse<T> {
    /// HTTP status code as returned by the peer.
    pub status: u16,
    /// Decoded payload, when the status and body allowed one.
    pub entity: Option<T>,
}

impl<T> PeerResponse<T> {
    /// A response with no payload.
    pub fn of(status: u16) -> Self {
        Self {
            status,
            entity: None,
        }
    }

    /// A response carrying a decoded payload.
    pub fn with_entity(status: u16, entity: T) -> Self {
        Self {
            status,
            entity: Some(entity),
        }
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Identity of the local node, sent on every request.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    pub name: String,
    pub version: String,
    /// Local host address; empty when resolution failed at construction.
    pub id: String,
}

impl NodeIdentity {
    /// Resolve the local node identity.
    ///
    /// Host-address resolution failure is logged and degraded to an empty
    /// id; the node keeps operating with a partial identity rather than
    /// refusing to start.
    pub fn resolve(name: impl Into<String>) -> Self {
        let id = local_host_address().unwrap_or_else(|e| {
            warn!(error = %e, "Cannot resolve local host address, sending empty identity id");
            String::new()
        });
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            id,
        }
    }
}

/// Best-effort local address discovery: the address a UDP socket would use
/// to reach a public host. No packet is actually sent.
fn local_host_address() -> std::result::Result<String, std::io::Error> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0")?;
    socket.connect("203.0.113.1:53")?;
    Ok(socket.local_addr()?.ip().to_string())
}

/// HTTP transport bound to one peer registry.
#[derive(Debug)]
pub struct RegistryTransport {
    client: reqwest::Client,
    base_url: Url,
    /// Peer name, used for logs and metrics labels.
    node_name: String,
    identity: NodeIdentity,
    /// Whether requests carry the replication marker.
    replication: bool,
}

impl RegistryTransport {
    /// Transport for pulling registry state from another region.
    ///
    /// No replication marker: this is ordinary client traffic from the
    /// receiving registry's point of view.
    pub fn remote_region(config: &RemoteRegionConfig) -> Result<Self> {
        Self::build(
            &config.region_name,
            &config.base_url,
            &config.transport,
            "RegistryClient-RemoteRegion",
            false,
        )
    }

    /// Transport for pushing replicated events to a cluster peer.
    ///
    /// Every request carries the replication marker so the peer does not
    /// re-replicate what it receives.
    pub fn cluster_peer(config: &PeerNodeConfig) -> Result<Self> {
        Self::build(
            &config.node_name,
            &config.base_url,
            &config.transport,
            "RegistryClient-Replication",
            true,
        )
    }

    fn build(
        node_name: &str,
        base_url: &str,
        transport: &TransportConfig,
        user_agent: &str,
        replication: bool,
    ) -> Result<Self> {
        // Paths are joined onto the base URL, so it must end with a slash
        // or the last segment would be dropped by Url::join.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| RegistryError::Config(format!("invalid base url {normalized:?}: {e}")))?;

        let client = reqwest::Client::builder()
            .connect_timeout(transport.connect_timeout_duration())
            .timeout(transport.read_timeout_duration())
            .gzip(transport.gzip)
            .user_agent(user_agent)
            .build()
            .map_err(|e| RegistryError::Config(format!("cannot build http client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            node_name: node_name.to_string(),
            identity: NodeIdentity::resolve("RegistryReplication"),
            replication,
        })
    }

    /// Name of the peer this transport talks to.
    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// The configured base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Whether this transport marks its traffic as replication.
    pub fn is_replication(&self) -> bool {
        self.replication
    }

    /// Build a request to `path` (relative to the base URL) with identity
    /// and replication headers attached.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| RegistryError::Config(format!("invalid request path {path:?}: {e}")))?;

        let mut builder = self
            .client
            .request(method, url)
            .header(HEADER_IDENTITY_NAME, &self.identity.name)
            .header(HEADER_IDENTITY_VERSION, &self.identity.version)
            .header(HEADER_IDENTITY_ID, &self.identity.id);
        if self.replication {
            builder = builder.header(HEADER_REPLICATION, "true");
        }
        Ok(builder)
    }

    /// Execute a request, mapping transport failures to
    /// [`RegistryError::Transport`] tagged with `operation`.
    pub async fn execute(&self, operation: &str, builder: RequestBuilder) -> Result<Response> {
        builder
            .send()
            .await
            .map_err(|e| RegistryError::transport(operation, e))
    }
}
