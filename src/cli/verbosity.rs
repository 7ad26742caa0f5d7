use clap::Args;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Repeatable `-v`/`-q` logging verbosity, flattened into both binaries' `Args`.
#[derive(Debug, Args)]
pub struct Verbosity {
    /// Increase logging verbosity. May be repeated (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Decrease logging verbosity. May be repeated (-q, -qq).
    #[arg(short, long, action = clap::ArgAction::Count, global = true, conflicts_with = "verbose")]
    quiet: u8,
}

impl Verbosity {
    fn level_filter(&self) -> &'static str {
        match i16::from(self.verbose) - i16::from(self.quiet) {
            i16::MIN..=-2 => "error",
            -1 => "warn",
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Installs a global `tracing` subscriber at the configured level,
    /// honoring `RUST_LOG` when set.
    pub fn setup_logging(&self) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level_filter()));
        let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
        if tracing::subscriber::set_global_default(subscriber).is_err() {
            tracing::debug!("global tracing subscriber already installed");
        }
    }
}
