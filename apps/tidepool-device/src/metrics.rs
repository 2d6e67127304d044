use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntCounterVec};
use tidepool_telemetry::metrics::{counter, counter_vec};

pub static ACTIONS_APPLIED: Lazy<IntCounterVec> = Lazy::new(|| {
    counter_vec(
        "tidepool_device_actions_total",
        "Actions applied to the device, by kind",
        &["kind"],
    )
});

pub static CAPTURE_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    counter_vec(
        "tidepool_device_capture_attempts_total",
        "Snapshot attempts, by result (ok, retry, exhausted, fatal)",
        &["result"],
    )
});

pub static OBSERVATIONS_PUBLISHED: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "tidepool_device_observations_total",
        "Observations published to the observation queue",
    )
});
