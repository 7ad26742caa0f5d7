//! Crate-wide error taxonomy, per spec §7.

use std::net::SocketAddr;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The five error kinds enumerated in §7. `ConfigError` is fatal at startup and
/// non-fatal (log + reply) at runtime for commands; the rest are never fatal.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport timed out waiting for a response from {peer:?}")]
    TransportTimeout { peer: Option<SocketAddr> },

    #[error("migration failed on transport {connection:?}: {reason}")]
    MigrationFailure { connection: String, reason: String },

    #[error("control plane command lost after retransmission to {dest}")]
    ControlPlaneLoss { dest: SocketAddr },

    #[error("internal error: {0}")]
    Internal(String),
}

impl HarnessError {
    #[must_use]
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    #[must_use]
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;
