//! Process-level plumbing shared by the device and controller binaries:
//! logging, metrics, their command-line flags, and termination signals.

pub mod args;
pub mod logging;
pub mod metrics;
pub mod signal;

pub use args::TelemetryArgs;
pub use logging::{LogConfig, LogLevel};
pub use metrics::{REGISTRY, gather, write_snapshot};
pub use signal::{Termination, TerminationSignals, cancel_on_termination};
