//! Control-plane endpoint, server side (component H, §4.H): decodes
//! management commands off a UDP socket and dispatches them to the
//! migration coordinator.

use std::{net::SocketAddr, sync::Arc};

use tokio::{net::UdpSocket, sync::Notify};
use tracing::{error, info, warn};

use crate::{control_plane::codec::ManagementCommand, server::coordinator::MigrationCoordinator};

const READ_BUFFER_SIZE: usize = 2048;
const OK_REPLY: &[u8] = b"OK";

/// Owns the management UDP socket and drives the dispatch loop.
pub struct ManagementServer {
    socket: UdpSocket,
    coordinator: Arc<MigrationCoordinator>,
    shutdown: Arc<Notify>,
}

impl ManagementServer {
    /// Binds `(host, managementPort)`.
    ///
    /// # Errors
    /// If the socket can't be bound.
    pub async fn bind(
        addr: SocketAddr,
        coordinator: Arc<MigrationCoordinator>,
    ) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        info!(%addr, "management endpoint listening");
        Ok(Self {
            socket,
            coordinator,
            shutdown: Arc::new(Notify::new()),
        })
    }

    /// A handle other tasks can await to learn when `shutdown` was processed.
    #[must_use]
    pub fn shutdown_signal(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Runs the dispatch loop until a `shutdown` command is received.
    ///
    /// # Errors
    /// Only on a fatal socket I/O failure; malformed datagrams are logged and
    /// skipped.
    pub async fn run(self) -> std::io::Result<()> {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        loop {
            let (len, src) = self.socket.recv_from(&mut buf).await?;
            let command = match ManagementCommand::decode(&buf[..len]) {
                Ok(cmd) => cmd,
                Err(e) => {
                    warn!(%src, error = %e, "malformed management command");
                    self.reply(src, format!("Bad request. Error: {e}").as_bytes())
                        .await;
                    continue;
                }
            };

            match command {
                ManagementCommand::OnImminentServerMigration { protocol, address } => {
                    self.coordinator
                        .on_imminent_server_migration(protocol, address)
                        .await;
                    self.reply(src, OK_REPLY).await;
                }
                ManagementCommand::OnNetworkSwitch => match self.coordinator.on_network_switch().await {
                    Ok(()) => self.reply(src, OK_REPLY).await,
                    Err(e) => self.reply(src, e.to_string().as_bytes()).await,
                },
                ManagementCommand::Shutdown => {
                    self.reply(src, OK_REPLY).await;
                    info!("shutdown command received, stopping management loop");
                    self.shutdown.notify_waiters();
                    return Ok(());
                }
            }
        }
    }

    async fn reply(&self, dest: SocketAddr, payload: &[u8]) {
        if let Err(e) = self.socket.send_to(payload, dest).await {
            error!(%dest, error = %e, "failed to reply to management command");
        }
    }
}
