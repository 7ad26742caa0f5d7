//! Server migration coordinator (component G, §4.G) — the central
//! multi-transport readiness/completion state machine.
//!
//! Implements the Idle -> PreparingMigration -> AwaitingCompletion -> Idle
//! transitions, their counters, and the empty-map/emptiness latch
//! shortcuts described in §4.G, one transition per public method below.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    error::HarnessError,
    transport::{
        AckedFrame, ConnectionId, MigrationError, MigrationProtocol, ServerQuicTransport,
        TransportMigrationState,
    },
};

/// Records a monotonic event count. Compiled out entirely unless
/// `metrics-instrumentation` is enabled, in which case it goes through
/// whatever recorder the binary installed via `metrics::set_recorder`
/// (never wired up directly to a concrete exporter here).
#[cfg_attr(not(feature = "metrics-instrumentation"), allow(unused_variables))]
fn record_counter(name: &'static str) {
    #[cfg(feature = "metrics-instrumentation")]
    metrics::counter!(name).increment(1);
}

#[cfg_attr(not(feature = "metrics-instrumentation"), allow(unused_variables))]
fn record_gauge(name: &'static str, value: f64) {
    #[cfg(feature = "metrics-instrumentation")]
    metrics::gauge!(name).set(value);
}

struct Inner {
    transports: HashMap<ConnectionId, TransportMigrationState>,
    migration_in_progress: bool,
    transports_ready: bool,
    network_switched: bool,
    number_of_transports_ready: usize,
    number_of_transports_migrated: usize,
    migration_notification_reception_time: Option<Instant>,
    migration_ready_time: Option<Instant>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            transports: HashMap::new(),
            migration_in_progress: false,
            transports_ready: false,
            network_switched: false,
            number_of_transports_ready: 0,
            number_of_transports_migrated: 0,
            migration_notification_reception_time: None,
            migration_ready_time: None,
        }
    }
}

impl Inner {
    fn reset_migration_state(&mut self) {
        self.migration_in_progress = false;
        self.transports_ready = false;
        self.network_switched = false;
        self.number_of_transports_ready = 0;
        self.number_of_transports_migrated = 0;
    }
}

/// Guards the coordinator's entire state tuple behind a single mutex
/// (`migrationMutex`, §5). Callbacks never hold the lock across an `.await`.
pub struct MigrationCoordinator {
    inner: Mutex<Inner>,
    transport: Arc<dyn ServerQuicTransport>,
}

impl MigrationCoordinator {
    #[must_use]
    pub fn new(transport: Arc<dyn ServerQuicTransport>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            transport,
        }
    }

    /// Idle -> PreparingMigration. Idempotent: a repeat while migration is
    /// already in progress is a no-op (L2).
    pub async fn on_imminent_server_migration(
        &self,
        protocol: MigrationProtocol,
        address: Option<SocketAddr>,
    ) {
        let should_invoke = {
            let mut inner = self.inner.lock();
            if inner.migration_in_progress {
                false
            } else {
                inner.migration_notification_reception_time = Some(Instant::now());
                inner.migration_in_progress = true;
                true
            }
        };

        if !should_invoke {
            debug!("onImminentServerMigration is a no-op: migration already in progress");
            return;
        }

        record_counter("coordinator_imminent_migration_total");
        self.transport
            .on_imminent_server_migration(protocol, address)
            .await;

        let mut inner = self.inner.lock();
        if inner.transports.is_empty() && !inner.transports_ready {
            info!("server ready for migration (no transports to prepare)");
            inner.transports_ready = true;
            inner.migration_ready_time = Some(Instant::now());
            record_counter("coordinator_fleet_ready_total");
        }
    }

    /// PreparingMigration -> AwaitingCompletion.
    ///
    /// # Errors
    /// B1: if called before `on_imminent_server_migration`, returns an error
    /// and does not mutate coordinator state.
    pub async fn on_network_switch(&self) -> Result<(), HarnessError> {
        let should_invoke = {
            let mut inner = self.inner.lock();
            if !inner.migration_in_progress {
                return Err(HarnessError::internal(
                    "server migration is not in progress",
                ));
            }
            if inner.network_switched {
                false
            } else {
                inner.network_switched = true;
                true
            }
        };

        if !should_invoke {
            debug!("onNetworkSwitch is a no-op: network already switched");
            return Ok(());
        }

        self.transport.on_network_switch().await;

        let mut inner = self.inner.lock();
        if inner.number_of_transports_migrated == inner.transports.len() {
            info!("server migration completed (no pending transports)");
            inner.reset_migration_state();
        }
        Ok(())
    }

    pub fn on_handshake_finished(&self, connection: ConnectionId, peer: SocketAddr) {
        debug!(%connection, %peer, "new client connected");
        let mut inner = self.inner.lock();
        inner
            .transports
            .insert(connection, TransportMigrationState::NotReady);
        if inner.network_switched {
            // The handshake completed while we're waiting for the rest of the
            // fleet to finish migrating; treat it as already-migrated so it
            // doesn't block completion detection (B2).
            inner.number_of_transports_migrated += 1;
        }
    }

    pub fn on_client_migration_detected(&self, connection: ConnectionId, new_peer: SocketAddr) {
        debug!(%connection, %new_peer, "client migration detected");
    }

    pub fn on_connection_close(&self, connection: ConnectionId) {
        let mut inner = self.inner.lock();

        if !inner.migration_in_progress {
            inner.transports.remove(&connection);
            return;
        }

        if inner.network_switched {
            if inner.transports.get(&connection) == Some(&TransportMigrationState::Completed) {
                inner.number_of_transports_migrated =
                    inner.number_of_transports_migrated.saturating_sub(1);
            }
            inner.transports.remove(&connection);
            if inner.number_of_transports_migrated == inner.transports.len() {
                info!("server migration completed (last transport closed)");
                inner.reset_migration_state();
            }
            return;
        }

        if inner.transports.get(&connection) == Some(&TransportMigrationState::Ready) {
            inner.number_of_transports_ready = inner.number_of_transports_ready.saturating_sub(1);
        }
        inner.transports.remove(&connection);
        if inner.number_of_transports_ready == inner.transports.len() && !inner.transports_ready {
            info!("server ready for migration (last outstanding transport closed)");
            inner.transports_ready = true;
            inner.migration_ready_time = Some(Instant::now());
        }
    }

    pub fn on_server_migration_ready(&self, connection: ConnectionId) {
        let mut inner = self.inner.lock();
        inner
            .transports
            .insert(connection, TransportMigrationState::Ready);
        inner.number_of_transports_ready += 1;
        record_gauge("coordinator_transports_ready", inner.number_of_transports_ready as f64);
        if inner.number_of_transports_ready == inner.transports.len() {
            inner.migration_ready_time = Some(Instant::now());
            inner.transports_ready = true;
            info!("server ready for migration");
            record_counter("coordinator_fleet_ready_total");
        }
    }

    pub fn on_server_migration_completed(&self, connection: ConnectionId) {
        let mut inner = self.inner.lock();
        inner
            .transports
            .insert(connection, TransportMigrationState::Completed);
        inner.number_of_transports_migrated += 1;
        record_gauge(
            "coordinator_transports_migrated",
            inner.number_of_transports_migrated as f64,
        );
        if inner.number_of_transports_migrated == inner.transports.len() {
            info!("server migration completed");
            inner.reset_migration_state();
            record_counter("coordinator_fleet_migrated_total");
        }
    }

    pub fn on_server_migration_failed(&self, connection: ConnectionId, error: MigrationError) {
        // The transport closes the connection right after this; accounting
        // happens in `on_connection_close`, not here.
        warn!(%connection, reason = %error.reason, "server migration failed on transport");
    }

    pub fn on_ack_received(&self, connection: ConnectionId, frame: AckedFrame) {
        debug!(%connection, ?frame, "migration frame acknowledged");
    }

    /// The duration between `on_imminent_server_migration` and the moment
    /// every transport first latched `transportsReady`, or `None` if that
    /// point was never reached (§6.5).
    #[must_use]
    pub fn migration_notification_time(&self) -> Option<Duration> {
        let inner = self.inner.lock();
        let ready = inner.migration_ready_time?;
        let notified = inner.migration_notification_reception_time?;
        Some(ready.saturating_duration_since(notified))
    }

    #[must_use]
    pub fn snapshot(&self) -> CoordinatorSnapshot {
        let inner = self.inner.lock();
        CoordinatorSnapshot {
            migration_in_progress: inner.migration_in_progress,
            transports_ready: inner.transports_ready,
            network_switched: inner.network_switched,
            number_of_transports_ready: inner.number_of_transports_ready,
            number_of_transports_migrated: inner.number_of_transports_migrated,
            number_of_transports: inner.transports.len(),
        }
    }
}

/// A read-only view of coordinator state, for tests and observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSnapshot {
    pub migration_in_progress: bool,
    pub transports_ready: bool,
    pub network_switched: bool,
    pub number_of_transports_ready: usize,
    pub number_of_transports_migrated: usize,
    pub number_of_transports: usize,
}
