//! Command-line ambient plumbing: a `cli::Verbosity` struct flattened into
//! both binaries' `Args`, installing a `tracing` subscriber at startup.

mod verbosity;

pub use verbosity::Verbosity;
