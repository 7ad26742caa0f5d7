//! Client-side components: the pool-of-addresses scheduler (C), the
//! experiment driver (E), and the handover manager (K).

pub mod driver;
pub mod handover;
pub mod pool_scheduler;

pub use driver::{ExperimentDriver, ExperimentParams, ExperimentVariant};
pub use handover::{HandoverManager, HandoverSink};
pub use pool_scheduler::{PoolScheduler, QuicIpAddress};
