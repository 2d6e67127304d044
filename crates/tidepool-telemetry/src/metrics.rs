use std::path::Path;

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Registry every tidepool crate registers its counters into.
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Creates a labelled counter and registers it with [`REGISTRY`].
///
/// Registration failures (a duplicate name) are ignored so that a counter
/// touched from several test binaries never panics the process.
pub fn counter_vec(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    let counter = IntCounterVec::new(Opts::new(name, help), labels)
        .expect("metric name and labels are static and valid");
    REGISTRY.register(Box::new(counter.clone())).ok();
    counter
}

pub fn counter(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::with_opts(Opts::new(name, help))
        .expect("metric name is static and valid");
    REGISTRY.register(Box::new(counter.clone())).ok();
    counter
}

pub fn gather() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&families, &mut buffer) {
        tracing::warn!(error = %err, "metrics encode error");
    }
    buffer
}

/// Writes the current text exposition to `path`, replacing any previous snapshot.
pub fn write_snapshot(path: &Path) -> std::io::Result<()> {
    std::fs::write(path, gather())
}
