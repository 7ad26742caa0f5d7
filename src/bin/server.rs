use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use quic_migration_harness::{
    cli::Verbosity,
    config::Config,
    control_plane::server::ManagementServer,
    output::MigrationNotificationReport,
    server::{coordinator::MigrationCoordinator, transport_factory::TransportFactory},
    transport::fake::FakeServerTransport,
};
use tracing::{error, info};

#[cfg(all(not(target_env = "msvc"), not(target_os = "macos")))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// Runs the server side of a QUIC migration experiment: the management
/// endpoint, the migration coordinator, and (pending a real QUIC
/// transport) an in-memory stand-in transport that exercises the same
/// coordinator wiring a production transport would drive.
#[derive(Debug, Parser)]
#[clap(name = "server", about = "QUIC server-migration harness, server role")]
struct Args {
    #[clap(flatten)]
    logging: Verbosity,

    /// Path to the JSON (or TOML) configuration document.
    #[arg(short, long)]
    config: PathBuf,

    /// Where to write `migration_notification_time.json` on shutdown.
    #[arg(long, default_value = "migration_notification_time.json")]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    args.logging.setup_logging();

    let config = Config::from_file(&args.config)?;
    info!(experiment_id = config.experiment.id, "starting server");

    let transport = FakeServerTransport::new();
    let coordinator = Arc::new(MigrationCoordinator::new(transport));
    // Allocated for future use by a real transport factory wiring
    // per-connection session controllers; not yet exercised by the fake
    // transport, which has no accept loop of its own.
    let _transport_factory = TransportFactory::new(config.seed);

    let management_addr = std::net::SocketAddr::new(config.server_host, config.management_port);
    let management_server = ManagementServer::bind(management_addr, coordinator.clone()).await?;

    if let Err(e) = management_server.run().await {
        error!(error = %e, "management endpoint terminated unexpectedly");
    }

    let report = MigrationNotificationReport::from_duration(coordinator.migration_notification_time());
    report.write_to_path(&args.output).await?;
    info!(path = ?args.output, "wrote migration notification report");

    Ok(())
}
