//! Transport contracts the core depends on (§6.1).
//!
//! The QUIC/HTTP3 transport itself is out of scope (§1): this module only
//! states the operations the core assumes it exposes, as a small set of
//! `async_trait` traits the rest of the crate programs against.

pub mod fake;

use std::{fmt, net::SocketAddr};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The four protocol variants plus the client-only proactive flavor of Explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MigrationProtocol {
    Explicit,
    /// Client-side-only flag: "force a probe-timeout after the triggering request".
    /// On the wire this is indistinguishable from `Explicit` (§4.A).
    ProactiveExplicit,
    PoolOfAddresses,
    Symmetric,
    SynchronizedSymmetric,
}

impl MigrationProtocol {
    #[must_use]
    pub fn is_explicit_family(self) -> bool {
        matches!(self, Self::Explicit | Self::ProactiveExplicit)
    }
}

impl fmt::Display for MigrationProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Explicit => "Explicit",
            Self::ProactiveExplicit => "ProactiveExplicit",
            Self::PoolOfAddresses => "PoolOfAddresses",
            Self::Symmetric => "Symmetric",
            Self::SynchronizedSymmetric => "SynchronizedSymmetric",
        };
        f.write_str(s)
    }
}

/// Per-connection migration progress, tracked by the server coordinator (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMigrationState {
    NotReady,
    Ready,
    Completed,
}

/// Opaque per-connection identifier handed out by the `TransportFactory` (§4.J).
/// Stands in for the QUIC connection id, which belongs to the out-of-scope
/// transport implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Ack'd frame kinds surfaced to `ServerMigrationEventSink::on_ack_received` (§4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckedFrame {
    PoolMigrationAddress,
    ServerMigration,
    ServerMigrated,
}

/// Reported by the transport when a server-migration attempt fails (§7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationError {
    pub reason: String,
}

/// Settings applied uniformly to every transport instance (§6.1).
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub idle_timeout_ms: u64,
    pub advertised_initial_max_streams_bidi: u32,
    pub advertised_initial_max_streams_uni: u32,
    pub max_num_ptos: u32,
    pub self_active_connection_id_limit: u32,
    pub disable_migration: bool,
    pub enable_keepalive: bool,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 60_000,
            advertised_initial_max_streams_bidi: u32::MAX,
            advertised_initial_max_streams_uni: u32::MAX,
            max_num_ptos: 100,
            self_active_connection_id_limit: 30,
            disable_migration: false,
            enable_keepalive: true,
        }
    }
}

/// Client-lifecycle events fan into the coordinator (§4.G).
pub trait ClientStateSink: Send + Sync {
    fn on_handshake_finished(&self, connection: ConnectionId, peer: SocketAddr);
    fn on_client_migration_detected(&self, connection: ConnectionId, new_peer: SocketAddr);
    fn on_connection_close(&self, connection: ConnectionId);
}

/// Server-migration lifecycle events fan into the coordinator (§4.G).
pub trait ServerMigrationEventSink: Send + Sync {
    fn on_server_migration_ready(&self, connection: ConnectionId);
    fn on_server_migration_completed(&self, connection: ConnectionId);
    fn on_server_migration_failed(&self, connection: ConnectionId, error: MigrationError);
    fn on_ack_received(&self, connection: ConnectionId, frame: AckedFrame);
}

/// The operations the core drives on a connection's transport once migration is underway.
#[async_trait]
pub trait ServerQuicTransport: Send + Sync {
    /// Prepares every connection owned by this transport for the upcoming migration.
    async fn on_imminent_server_migration(
        &self,
        protocol: MigrationProtocol,
        address: Option<SocketAddr>,
    );

    /// Signals that the server has switched to its new network address.
    async fn on_network_switch(&self);

    fn allow_server_migration(&mut self, protocols: Vec<MigrationProtocol>);
    fn add_pool_migration_address(&mut self, addr: SocketAddr);
}

/// The operations the client driver needs from its single connection's transport.
#[async_trait]
pub trait ClientQuicTransport: Send + Sync {
    /// Forces the transport's probe-timeout handler to run now (Proactive Explicit, §4.E).
    async fn on_probe_timeout(&self);

    fn get_num_openable_bidirectional_streams(&self) -> u64;

    fn get_peer_address(&self) -> SocketAddr;

    /// Starts a new bidirectional stream, sends headers (+ body for POST), and
    /// immediately sends end-of-message. Returns the observed peer address at
    /// the time the response was received along with the response body length.
    async fn send_request(
        &self,
        method: &'static str,
        path: &'static str,
        body: Vec<u8>,
    ) -> Result<RequestOutcome, MigrationError>;
}

/// What the client driver observes once a request/response round-trip completes.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub peer_address: SocketAddr,
    pub response_body_len: usize,
}
