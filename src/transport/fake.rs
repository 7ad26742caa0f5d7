//! A deterministic in-memory double for the transport traits, used by tests.
//! Not a QUIC implementation — a fully in-process fixture standing in for
//! the transport layer.

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{MigrationError, MigrationProtocol, RequestOutcome};

/// A fake client transport whose peer address and openable-stream budget
/// can be driven by a test.
pub struct FakeClientTransport {
    peer_address: Mutex<SocketAddr>,
    openable_streams: AtomicU64,
    probe_timeout_calls: AtomicU64,
    response_body_len: usize,
}

impl FakeClientTransport {
    #[must_use]
    pub fn new(initial_peer: SocketAddr, openable_streams: u64) -> Arc<Self> {
        Arc::new(Self {
            peer_address: Mutex::new(initial_peer),
            openable_streams: AtomicU64::new(openable_streams),
            probe_timeout_calls: AtomicU64::new(0),
            response_body_len: 0,
        })
    }

    pub async fn set_peer_address(&self, addr: SocketAddr) {
        *self.peer_address.lock().await = addr;
    }

    pub fn probe_timeout_calls(&self) -> u64 {
        self.probe_timeout_calls.load(Ordering::SeqCst)
    }

    pub fn set_openable_streams(&self, n: u64) {
        self.openable_streams.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl super::ClientQuicTransport for FakeClientTransport {
    async fn on_probe_timeout(&self) {
        self.probe_timeout_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn get_num_openable_bidirectional_streams(&self) -> u64 {
        let current = self.openable_streams.load(Ordering::SeqCst);
        if current > 0 {
            self.openable_streams.store(current - 1, Ordering::SeqCst);
        }
        current
    }

    fn get_peer_address(&self) -> SocketAddr {
        // Test-only best-effort snapshot; callers needing the async form use `set_peer_address`.
        *self.peer_address.try_lock().expect("uncontended in tests")
    }

    async fn send_request(
        &self,
        _method: &'static str,
        _path: &'static str,
        _body: Vec<u8>,
    ) -> Result<RequestOutcome, MigrationError> {
        let peer = *self.peer_address.lock().await;
        Ok(RequestOutcome {
            peer_address: peer,
            response_body_len: self.response_body_len,
        })
    }
}

/// A fake server transport recording the migration hooks invoked on it.
#[derive(Default)]
pub struct FakeServerTransport {
    pub imminent_calls: Mutex<Vec<(MigrationProtocol, Option<SocketAddr>)>>,
    pub network_switch_calls: Mutex<u64>,
}

impl FakeServerTransport {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl super::ServerQuicTransport for FakeServerTransport {
    async fn on_imminent_server_migration(
        &self,
        protocol: MigrationProtocol,
        address: Option<SocketAddr>,
    ) {
        self.imminent_calls.lock().await.push((protocol, address));
    }

    async fn on_network_switch(&self) {
        *self.network_switch_calls.lock().await += 1;
    }

    fn allow_server_migration(&mut self, _protocols: Vec<MigrationProtocol>) {}

    fn add_pool_migration_address(&mut self, _addr: SocketAddr) {}
}
