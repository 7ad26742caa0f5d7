//! Control-plane endpoint, client side (component F, §4.F): a reliable
//! request/response protocol over UDP with retransmission and response
//! correlation, all I/O on a dedicated event-loop task.

use std::{
    collections::HashSet,
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};

use tokio::{net::UdpSocket, sync::Mutex, task::JoinHandle};
use tracing::{debug, warn};

use crate::{error::HarnessError, sync_util::SingleShotBaton};

const RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);
const MAX_RETRANSMISSIONS: usize = 5;
const READ_BUFFER_SIZE: usize = 2048;

/// Reliable sender half of the client-side control plane.
///
/// Sends are initiated from the request-loop thread and synchronize with a
/// background receive task via a single reusable [`SingleShotBaton`]; there
/// is no queue of pending responses, since commands are sent one at a time.
pub struct ControlPlaneClient {
    socket: Arc<UdpSocket>,
    response_baton: Arc<SingleShotBaton>,
    allowed_senders: Arc<Mutex<HashSet<SocketAddr>>>,
    _recv_task: JoinHandle<()>,
}

impl ControlPlaneClient {
    /// Binds a UDP socket and starts the background receive loop.
    ///
    /// # Errors
    /// If the socket can't be bound.
    pub async fn bind(local_addr: SocketAddr) -> std::io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(local_addr).await?);
        let response_baton = Arc::new(SingleShotBaton::new());
        let allowed_senders = Arc::new(Mutex::new(HashSet::new()));

        let recv_task = tokio::spawn(Self::recv_loop(
            socket.clone(),
            response_baton.clone(),
            allowed_senders.clone(),
        ));

        Ok(Self {
            socket,
            response_baton,
            allowed_senders,
            _recv_task: recv_task,
        })
    }

    /// Registers a peer address whose datagrams count as a response. Reads
    /// from any other source are ignored.
    pub async fn allow_sender(&self, addr: SocketAddr) {
        self.allowed_senders.lock().await.insert(addr);
    }

    async fn recv_loop(
        socket: Arc<UdpSocket>,
        baton: Arc<SingleShotBaton>,
        allowed_senders: Arc<Mutex<HashSet<SocketAddr>>>,
    ) {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        loop {
            let (_len, src) = match socket.recv_from(&mut buf).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "control plane client recv failed");
                    continue;
                }
            };
            if allowed_senders.lock().await.contains(&src) {
                debug!(%src, "control plane response received");
                baton.post();
            } else {
                debug!(%src, "ignoring datagram from unrecognized sender");
            }
        }
    }

    /// Sends `payload` to `dest`, retrying on a 1s timeout up to
    /// [`MAX_RETRANSMISSIONS`] times (6 sends total). There is no response
    /// payload schema: any reply from `dest` ends the wait.
    ///
    /// # Errors
    /// `ControlPlaneLoss` if no reply is observed after the final attempt.
    pub async fn send_with_retry(
        &self,
        dest: SocketAddr,
        payload: &[u8],
    ) -> Result<(), HarnessError> {
        self.allow_sender(dest).await;
        self.response_baton.reset();

        for attempt in 0..=MAX_RETRANSMISSIONS {
            if attempt > 0 {
                debug!(%dest, attempt, "retransmitting control plane command");
            }
            self.socket
                .send_to(payload, dest)
                .await
                .map_err(|e| HarnessError::internal(format!("send failed: {e}")))?;

            if self.response_baton.wait_timeout(RESPONSE_TIMEOUT).await {
                return Ok(());
            }
        }

        Err(HarnessError::ControlPlaneLoss { dest })
    }
}
