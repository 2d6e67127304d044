use once_cell::sync::Lazy;
use prometheus::IntCounterVec;
use tidepool_telemetry::metrics::counter_vec;

pub static QUEUE_PUSHED: Lazy<IntCounterVec> = Lazy::new(|| {
    counter_vec(
        "tidepool_queue_pushed_total",
        "Messages pushed onto an exchange queue",
        &["queue"],
    )
});

pub static QUEUE_POPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    counter_vec(
        "tidepool_queue_popped_total",
        "Messages popped from an exchange queue",
        &["queue"],
    )
});

pub static QUEUE_DECODE_DROPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    counter_vec(
        "tidepool_queue_decode_dropped_total",
        "Malformed messages discarded by a blocking pop",
        &["queue"],
    )
});

pub static QUEUE_CLEARED: Lazy<IntCounterVec> = Lazy::new(|| {
    counter_vec(
        "tidepool_queue_cleared_total",
        "Stale messages removed by clear",
        &["queue"],
    )
});
