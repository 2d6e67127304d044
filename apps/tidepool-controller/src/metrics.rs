use once_cell::sync::Lazy;
use prometheus::IntCounter;
use tidepool_telemetry::metrics::counter;

pub static STEPS: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "tidepool_controller_steps_total",
        "Touch actions exchanged for an observation",
    )
});

pub static RESETS: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "tidepool_controller_resets_total",
        "Episode resets issued by the controller",
    )
});
