//! Control-plane message format and endpoints (§4.A, §4.F, §4.H).

pub mod client;
pub mod codec;
pub mod server;

pub use codec::{CodecError, ManagementCommand, MIGRATE_TOKEN};
