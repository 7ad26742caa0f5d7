//! Server-side components: the migration coordinator (G), the per-connection
//! session controller (I), and the transport factory (J).

pub mod coordinator;
pub mod session_controller;
pub mod transport_factory;

pub use coordinator::{CoordinatorSnapshot, MigrationCoordinator};
