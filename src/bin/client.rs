use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use clap::Parser;
use quic_migration_harness::{
    cli::Verbosity,
    client::{
        driver::{ExperimentParams, ExperimentVariant},
        ExperimentDriver,
    },
    config::Config,
    control_plane::client::ControlPlaneClient,
    output::ServiceTimesReport,
    request::{RequestBodyMode, RequestPattern, RequestScheduler},
    seed::SeedExpander,
    transport::fake::FakeClientTransport,
};
use tracing::{error, info, warn};

#[cfg(all(not(target_env = "msvc"), not(target_os = "macos")))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// Runs the client side of a QUIC migration experiment: the synthetic
/// request loop, the control-plane sender, and the handover listener.
/// Pending a real QUIC transport, requests are driven against an in-memory
/// stand-in transport that exercises the same driver wiring a production
/// transport would.
#[derive(Debug, Parser)]
#[clap(name = "client", about = "QUIC server-migration harness, client role")]
struct Args {
    #[clap(flatten)]
    logging: Verbosity,

    /// Path to the JSON (or TOML) configuration document.
    #[arg(short, long)]
    config: PathBuf,

    /// Directory to write the `service_times*.json` report into.
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// This client's position in a multi-client experiment; the last
    /// client is the one responsible for sending `shutdown` in variant 3.
    #[arg(long)]
    is_last_client: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    args.logging.setup_logging();

    let config = Config::from_file(&args.config)?;
    let experiment = &config.experiment;
    let variant = ExperimentVariant::from_id(experiment.id)
        .ok_or_else(|| format!("unsupported experiment id {}", experiment.id))?;
    let protocol = experiment.protocol()?;

    let mut seeds = SeedExpander::new(config.seed);
    let [request_type_seed, post_body_seed] = <[u32; 2]>::try_from(seeds.next_seeds(2)).unwrap();

    let pattern = if config.request_pattern.sporadic {
        RequestPattern::Sporadic {
            interval: std::time::Duration::from_secs(config.request_pattern.sporadic_interval),
        }
    } else {
        RequestPattern::BackToBack
    };
    let body_mode = if config.request_body.from_distribution {
        RequestBodyMode::FromDistribution
    } else {
        RequestBodyMode::Fixed
    };
    let scheduler = RequestScheduler::new(pattern, body_mode, request_type_seed, post_body_seed);

    let server_addr = SocketAddr::new(config.server_host, config.server_port);
    let transport = FakeClientTransport::new(server_addr, u64::MAX);

    let management_addr = SocketAddr::new(
        experiment
            .server_migration_host
            .unwrap_or(config.server_host),
        experiment.server_management_port,
    );
    let control_plane = Arc::new(ControlPlaneClient::bind("0.0.0.0:0".parse().unwrap()).await?);

    let server_migration_address = match (experiment.server_migration_host, experiment.server_migration_port) {
        (Some(host), Some(port)) => Some(SocketAddr::new(host, port)),
        _ => None,
    };

    let params = ExperimentParams {
        variant,
        notify_after: experiment.notify_imminent_migration_after_request,
        trigger_after: experiment.trigger_migration_after_request,
        shutdown_after: experiment.shutdown_after_request,
        is_last_client: args.is_last_client,
        protocol,
        server_migration_address,
        seed: config.seed,
    };

    if let (Some(host), Some(port)) = (
        experiment.container_migration_script_host,
        experiment.container_migration_script_port,
    ) {
        let handover_addr = SocketAddr::new(host, port);
        info!(%handover_addr, "handover listener configured but not started: no real transport to hand sockets to");
    }

    let driver = ExperimentDriver::new(
        transport,
        scheduler,
        control_plane.clone(),
        management_addr,
        params,
    );

    let report = driver.run().await;

    if driver.sends_shutdown() {
        let dest = management_addr;
        let payload = quic_migration_harness::control_plane::ManagementCommand::Shutdown.encode();
        match payload {
            Ok(bytes) => {
                if let Err(e) = control_plane.send_with_retry(dest, &bytes).await {
                    warn!(error = %e, "shutdown command delivery failed");
                }
            }
            Err(e) => error!(error = %e, "failed to encode shutdown command"),
        }
    }

    write_report(&args.output_dir, &report, experiment.id == 3).await;

    Ok(())
}

async fn write_report(output_dir: &std::path::Path, report: &ServiceTimesReport, multi_client: bool) {
    let seed = multi_client.then_some(report.seed);
    let path = output_dir.join(ServiceTimesReport::file_name(seed));
    if let Err(e) = report.write_to_path(&path).await {
        error!(error = %e, ?path, "failed to write service times report");
    } else {
        info!(?path, "wrote service times report");
    }
}
