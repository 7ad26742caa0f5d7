//! Client experiment driver (component E, §4.E): the request-submission
//! loop and the per-variant hooks that notify, trigger, and stop the
//! migration experiment.

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::{
    control_plane::{client::ControlPlaneClient, ManagementCommand},
    output::ServiceTimesReport,
    request::RequestScheduler,
    transport::{ClientQuicTransport, MigrationProtocol, RequestOutcome},
};

/// Sleep before sending `onNetworkSwitch`, to let control-stream frames
/// drain so a spurious PTO doesn't contaminate the measurement.
const DRAIN_PERIOD: Duration = Duration::from_secs(2);

/// How many responses from a new peer address end the experiment in the
/// "K responses after a new peer" variants (2 and 4). Not part of the
/// configuration surface in §6.6, which names this threshold only
/// descriptively ("K responses") without exposing a knob for it.
const NEW_PEER_RESPONSE_STOP_COUNT: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperimentVariant {
    Baseline,
    One,
    Two,
    Three,
    Four,
    FiveOrSix,
}

impl ExperimentVariant {
    #[must_use]
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(Self::Baseline),
            1 => Some(Self::One),
            2 => Some(Self::Two),
            3 => Some(Self::Three),
            4 => Some(Self::Four),
            5 | 6 => Some(Self::FiveOrSix),
            _ => None,
        }
    }
}

pub struct ExperimentParams {
    pub variant: ExperimentVariant,
    pub notify_after: Option<u64>,
    pub trigger_after: Option<u64>,
    pub shutdown_after: Option<u64>,
    pub is_last_client: bool,
    pub protocol: MigrationProtocol,
    pub server_migration_address: Option<SocketAddr>,
    pub seed: u64,
}

#[derive(Default)]
struct DriverState {
    request_index: u64,
    trigger_pto_next: bool,
    notified: bool,
    triggered: bool,
    first_new_peer_response_index: Option<u64>,
    responses_since_new_peer: u64,
    initial_peer_address: Option<SocketAddr>,
    pending_new_server_address: Option<SocketAddr>,
}

/// Drives the synthetic request loop described in §4.E. Generic over the
/// transport so tests can supply `transport::fake::FakeClientTransport`.
pub struct ExperimentDriver {
    transport: Arc<dyn ClientQuicTransport>,
    scheduler: AsyncMutex<RequestScheduler>,
    control_plane: Arc<ControlPlaneClient>,
    management_dest: AsyncMutex<SocketAddr>,
    original_management_port: u16,
    params: ExperimentParams,
    state: SyncMutex<DriverState>,
    session_closed: AtomicBool,
    report: AsyncMutex<ServiceTimesReport>,
}

impl ExperimentDriver {
    #[must_use]
    pub fn new(
        transport: Arc<dyn ClientQuicTransport>,
        scheduler: RequestScheduler,
        control_plane: Arc<ControlPlaneClient>,
        management_dest: SocketAddr,
        params: ExperimentParams,
    ) -> Self {
        let seed = params.seed;
        let experiment_id = match params.variant {
            ExperimentVariant::Baseline => 0,
            ExperimentVariant::One => 1,
            ExperimentVariant::Two => 2,
            ExperimentVariant::Three => 3,
            ExperimentVariant::Four => 4,
            ExperimentVariant::FiveOrSix => 5,
        };
        Self {
            transport,
            scheduler: AsyncMutex::new(scheduler),
            control_plane,
            original_management_port: management_dest.port(),
            management_dest: AsyncMutex::new(management_dest),
            params,
            state: SyncMutex::new(DriverState::default()),
            session_closed: AtomicBool::new(false),
            report: AsyncMutex::new(ServiceTimesReport {
                experiment: experiment_id,
                seed,
                ..Default::default()
            }),
        }
    }

    /// Called from the transport's callback thread when a migration
    /// completes and the connection is now talking to `new_peer`.
    pub fn on_server_migration_completed(&self, new_peer: SocketAddr) {
        self.state.lock().pending_new_server_address = Some(new_peer);
    }

    /// Called from the transport's callback thread to signal the session
    /// has been torn down; the request loop observes this on its own
    /// thread before the next submission.
    pub fn close_session(&self) {
        self.session_closed.store(true, Ordering::SeqCst);
    }

    /// Runs the request loop to completion and returns the accumulated
    /// report, per §4.E steps 1-8.
    pub async fn run(&self) -> ServiceTimesReport {
        loop {
            if self.transport.get_num_openable_bidirectional_streams() == 0 {
                debug!("no openable bidirectional streams remaining, stopping");
                break;
            }

            let mut request = {
                let mut scheduler = self.scheduler.lock().await;
                scheduler.next_request().await
            };

            if self.session_closed.load(Ordering::SeqCst) {
                self.stop_experiment_due_to_timeout().await;
                break;
            }

            let trigger_now = {
                let mut state = self.state.lock();
                std::mem::take(&mut state.trigger_pto_next)
            };
            if trigger_now {
                self.transport.on_probe_timeout().await;
            }

            let start = Instant::now();
            let start_timestamp_micros = i64::try_from(
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_micros(),
            )
            .unwrap_or(i64::MAX);
            let method = request.method;
            let request_body_len = request.body.len();
            let body = std::mem::take(&mut request.body);
            let outcome = match self
                .transport
                .send_request(request.method, request.path, body)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(error = %e.reason, "request failed, ending experiment");
                    self.stop_experiment_due_to_timeout().await;
                    break;
                }
            };
            let service_time = start.elapsed();

            let request_index = {
                let mut state = self.state.lock();
                state.request_index += 1;
                if state.initial_peer_address.is_none() {
                    state.initial_peer_address = Some(outcome.peer_address);
                }
                state.request_index
            };

            self.maybe_notify_imminent_migration(request_index).await;
            self.maybe_save_service_time(
                request_index,
                service_time,
                &outcome,
                method,
                start_timestamp_micros,
                request_body_len,
            )
            .await;
            let trigger_pto_next = self.maybe_trigger_server_migration(request_index).await;
            {
                let mut state = self.state.lock();
                state.trigger_pto_next = trigger_pto_next;
            }
            self.maybe_update_server_management_address().await;

            if self.maybe_stop_experiment(request_index, &outcome) {
                break;
            }
        }
        self.report.lock().await.clone()
    }

    async fn maybe_notify_imminent_migration(&self, request_index: u64) {
        if matches!(
            self.params.variant,
            ExperimentVariant::Baseline | ExperimentVariant::Four | ExperimentVariant::FiveOrSix
        ) {
            return;
        }
        let Some(notify_after) = self.params.notify_after else {
            return;
        };
        if request_index != notify_after {
            return;
        }
        if matches!(self.params.variant, ExperimentVariant::Three) && !self.params.is_last_client {
            return;
        }
        {
            let mut state = self.state.lock();
            if state.notified {
                return;
            }
            state.notified = true;
        }

        let command = ManagementCommand::OnImminentServerMigration {
            protocol: self.params.protocol,
            address: self.params.server_migration_address,
        };
        let Ok(payload) = command.encode() else {
            warn!("failed to encode onImminentServerMigration command");
            return;
        };
        let dest = *self.management_dest.lock().await;
        if let Err(e) = self.control_plane.send_with_retry(dest, &payload).await {
            warn!(error = %e, "onImminentServerMigration delivery failed");
        }
    }

    async fn maybe_save_service_time(
        &self,
        request_index: u64,
        service_time: Duration,
        outcome: &RequestOutcome,
        method: &'static str,
        start_timestamp_micros: i64,
        request_body_len: usize,
    ) {
        let should_save = match self.params.variant {
            ExperimentVariant::Baseline => request_index == 5,
            ExperimentVariant::One => self.params.trigger_after == Some(request_index - 1),
            ExperimentVariant::Three => false,
            _ => true,
        };
        if !should_save {
            return;
        }
        let mut report = self.report.lock().await;
        report
            .service_times
            .push(service_time.as_micros() as i64);
        report.server_addresses.push(outcome.peer_address.to_string());
        if matches!(self.params.variant, ExperimentVariant::One) {
            report.first_request_after_migration_triggered = Some(request_index);
        }
        if matches!(self.params.variant, ExperimentVariant::Four) {
            report.request_timestamps.push(start_timestamp_micros);
            report.request_methods.push(method.to_string());
            report.request_body_sizes.push(request_body_len);
            report.response_body_sizes.push(outcome.response_body_len);
        }
    }

    async fn maybe_trigger_server_migration(&self, request_index: u64) -> bool {
        let Some(trigger_after) = self.params.trigger_after else {
            return false;
        };
        if request_index != trigger_after {
            return false;
        }
        if !matches!(
            self.params.variant,
            ExperimentVariant::One | ExperimentVariant::Two
        ) {
            return false;
        }
        {
            let mut state = self.state.lock();
            if state.triggered {
                return false;
            }
            state.triggered = true;
        }

        tokio::time::sleep(DRAIN_PERIOD).await;

        let dest = *self.management_dest.lock().await;
        let Ok(payload) = ManagementCommand::OnNetworkSwitch.encode() else {
            return false;
        };
        if let Err(e) = self.control_plane.send_with_retry(dest, &payload).await {
            warn!(error = %e, "onNetworkSwitch delivery failed");
        }

        matches!(self.params.protocol, MigrationProtocol::ProactiveExplicit)
    }

    async fn maybe_update_server_management_address(&self) {
        let new_address = {
            let mut state = self.state.lock();
            state.pending_new_server_address.take()
        };
        let Some(new_address) = new_address else {
            return;
        };
        let rewritten = SocketAddr::new(new_address.ip(), self.original_management_port);
        *self.management_dest.lock().await = rewritten;
        info!(%rewritten, "rewrote control plane destination after server migration");
    }

    fn maybe_stop_experiment(&self, request_index: u64, outcome: &RequestOutcome) -> bool {
        match self.params.variant {
            ExperimentVariant::Baseline | ExperimentVariant::Three => {
                self.params.shutdown_after == Some(request_index)
            }
            ExperimentVariant::One => self.params.shutdown_after == Some(request_index),
            ExperimentVariant::Two | ExperimentVariant::Four => {
                let mut state = self.state.lock();
                let initial = state.initial_peer_address;
                if Some(outcome.peer_address) != initial {
                    if state.first_new_peer_response_index.is_none() {
                        state.first_new_peer_response_index = Some(request_index);
                    }
                    state.responses_since_new_peer += 1;
                    state.responses_since_new_peer >= NEW_PEER_RESPONSE_STOP_COUNT
                } else {
                    false
                }
            }
            ExperimentVariant::FiveOrSix => false,
        }
    }

    async fn stop_experiment_due_to_timeout(&self) {
        let mut report = self.report.lock().await;
        report.connection_ended_due_to_timeout = true;
    }

    /// Whether this driver's variant sends a `shutdown` command at the end
    /// of the run (variant 4 deliberately does not, §4.E table).
    #[must_use]
    pub fn sends_shutdown(&self) -> bool {
        !matches!(self.params.variant, ExperimentVariant::Four)
            && (!matches!(self.params.variant, ExperimentVariant::Three)
                || self.params.is_last_client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        request::{RequestBodyMode, RequestPattern},
        transport::fake::FakeClientTransport,
    };

    fn scheduler() -> RequestScheduler {
        RequestScheduler::new(RequestPattern::BackToBack, RequestBodyMode::Fixed, 1, 2)
    }

    async fn control_plane_pair() -> (Arc<ControlPlaneClient>, SocketAddr, tokio::net::UdpSocket) {
        let client = Arc::new(
            ControlPlaneClient::bind("127.0.0.1:0".parse().unwrap())
                .await
                .unwrap(),
        );
        let server = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();
        (client, server_addr, server)
    }

    #[tokio::test]
    async fn baseline_stops_at_shutdown_after_and_saves_only_request_five() {
        let peer: SocketAddr = "10.0.0.1:9000".parse().unwrap();
        let transport = FakeClientTransport::new(peer, 10);
        let (control_plane, dest, server) = control_plane_pair().await;
        tokio::spawn(async move {
            let mut buf = vec![0u8; 64];
            loop {
                let Ok((len, src)) = server.recv_from(&mut buf).await else {
                    return;
                };
                let _ = server.send_to(b"OK", src).await;
                let _ = len;
            }
        });

        let driver = ExperimentDriver::new(
            transport,
            scheduler(),
            control_plane,
            dest,
            ExperimentParams {
                variant: ExperimentVariant::Baseline,
                notify_after: None,
                trigger_after: None,
                shutdown_after: Some(5),
                is_last_client: true,
                protocol: MigrationProtocol::Symmetric,
                server_migration_address: None,
                seed: 7,
            },
        );

        let report = driver.run().await;
        assert_eq!(report.service_times.len(), 1);
    }

    #[tokio::test]
    async fn proactive_explicit_sets_trigger_pto_for_the_next_iteration() {
        let peer: SocketAddr = "10.0.0.1:9000".parse().unwrap();
        let transport = FakeClientTransport::new(peer, 10);
        let (control_plane, dest, server) = control_plane_pair().await;
        tokio::spawn(async move {
            let mut buf = vec![0u8; 64];
            loop {
                let Ok((_len, src)) = server.recv_from(&mut buf).await else {
                    return;
                };
                let _ = server.send_to(b"OK", src).await;
            }
        });

        let driver = ExperimentDriver::new(
            transport.clone(),
            scheduler(),
            control_plane,
            dest,
            ExperimentParams {
                variant: ExperimentVariant::One,
                notify_after: Some(1),
                trigger_after: Some(3),
                shutdown_after: Some(5),
                is_last_client: true,
                protocol: MigrationProtocol::ProactiveExplicit,
                server_migration_address: Some("10.0.0.2:9000".parse().unwrap()),
                seed: 7,
            },
        );

        let _ = driver.run().await;
        assert_eq!(transport.probe_timeout_calls(), 1);
    }

    fn driver_for_guard_test(
        variant: ExperimentVariant,
        notify_after: Option<u64>,
        control_plane: Arc<ControlPlaneClient>,
        dest: SocketAddr,
    ) -> ExperimentDriver {
        let peer: SocketAddr = "10.0.0.1:9000".parse().unwrap();
        let transport = FakeClientTransport::new(peer, 10);
        ExperimentDriver::new(
            transport,
            scheduler(),
            control_plane,
            dest,
            ExperimentParams {
                variant,
                notify_after,
                trigger_after: None,
                shutdown_after: None,
                is_last_client: true,
                protocol: MigrationProtocol::Symmetric,
                server_migration_address: None,
                seed: 7,
            },
        )
    }

    #[tokio::test]
    async fn baseline_never_notifies_even_when_notify_after_is_configured() {
        let (control_plane, dest, server) = control_plane_pair().await;
        // No responder: if a datagram were sent, send_with_retry would retry
        // for several seconds and the test would time out instead of
        // completing immediately.
        drop(server);

        let driver = driver_for_guard_test(ExperimentVariant::Baseline, Some(1), control_plane, dest);
        tokio::time::timeout(
            Duration::from_millis(200),
            driver.maybe_notify_imminent_migration(1),
        )
        .await
        .expect("Baseline must never send onImminentServerMigration");
        assert!(!driver.state.lock().notified);
    }

    #[tokio::test]
    async fn four_never_notifies_even_when_notify_after_is_configured() {
        let (control_plane, dest, server) = control_plane_pair().await;
        drop(server);

        let driver = driver_for_guard_test(ExperimentVariant::Four, Some(1), control_plane, dest);
        tokio::time::timeout(
            Duration::from_millis(200),
            driver.maybe_notify_imminent_migration(1),
        )
        .await
        .expect("variant Four must never send onImminentServerMigration");
        assert!(!driver.state.lock().notified);
    }

    #[tokio::test]
    async fn five_or_six_never_notifies_even_when_notify_after_is_configured() {
        let (control_plane, dest, server) = control_plane_pair().await;
        drop(server);

        let driver =
            driver_for_guard_test(ExperimentVariant::FiveOrSix, Some(1), control_plane, dest);
        tokio::time::timeout(
            Duration::from_millis(200),
            driver.maybe_notify_imminent_migration(1),
        )
        .await
        .expect("variants Five/Six must never send onImminentServerMigration");
        assert!(!driver.state.lock().notified);
    }

    #[tokio::test]
    async fn variant_one_records_first_request_after_migration_triggered() {
        let peer: SocketAddr = "10.0.0.1:9000".parse().unwrap();
        let transport = FakeClientTransport::new(peer, 10);
        let (control_plane, dest, server) = control_plane_pair().await;
        tokio::spawn(async move {
            let mut buf = vec![0u8; 64];
            loop {
                let Ok((_len, src)) = server.recv_from(&mut buf).await else {
                    return;
                };
                let _ = server.send_to(b"OK", src).await;
            }
        });

        let driver = ExperimentDriver::new(
            transport,
            scheduler(),
            control_plane,
            dest,
            ExperimentParams {
                variant: ExperimentVariant::One,
                notify_after: Some(1),
                trigger_after: Some(3),
                shutdown_after: Some(5),
                is_last_client: true,
                protocol: MigrationProtocol::Symmetric,
                server_migration_address: None,
                seed: 7,
            },
        );

        let report = driver.run().await;
        assert_eq!(report.first_request_after_migration_triggered, Some(4));
    }
}
