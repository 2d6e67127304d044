use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser};
use thiserror::Error;
use tidepool_queue::QueueArgs;
use tidepool_telemetry::TelemetryArgs;

use crate::control_loop::{
    DEFAULT_CAPTURE_RETRIES, DEFAULT_OBSERVATION_DELTA, DEFAULT_RESET_SETTLE, LoopConfig,
};
use crate::driver::AdbConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("observation delta {delta:?} exceeds the {max:?} maximum")]
    ObservationDeltaTooLarge { delta: Duration, max: Duration },
    #[error("capture retries must be at least 1")]
    NoCaptureAttempts,
}

#[derive(Parser, Debug)]
#[command(
    name = "tidepool-device",
    about = "Apply queued actions to an Android device and publish screen observations",
    version
)]
pub struct Cli {
    #[command(flatten)]
    pub queue: QueueArgs,

    #[command(flatten)]
    pub device_loop: LoopArgs,

    #[command(flatten)]
    pub adb: AdbArgs,

    #[arg(
        long = "commands-dir",
        value_name = "DIR",
        env = "TIDEPOOL_COMMANDS_DIR",
        help = "Directory of <name>.sh files overriding the built-in device commands"
    )]
    pub commands_dir: Option<PathBuf>,

    #[command(flatten)]
    pub telemetry: TelemetryArgs,
}

#[derive(Args, Debug, Clone)]
pub struct LoopArgs {
    #[arg(
        long = "observation-delta-ms",
        env = "TIDEPOOL_OBSERVATION_DELTA_MS",
        default_value_t = DEFAULT_OBSERVATION_DELTA.as_millis() as u64,
        help = "Milliseconds to wait after an action before capturing the screen (max 5000)"
    )]
    pub observation_delta_ms: u64,

    #[arg(
        long = "capture-retries",
        env = "TIDEPOOL_CAPTURE_RETRIES",
        default_value_t = DEFAULT_CAPTURE_RETRIES,
        help = "Snapshot attempts per observation before the loop gives up"
    )]
    pub capture_retries: u32,

    #[arg(
        long = "reset-settle-ms",
        env = "TIDEPOOL_RESET_SETTLE_MS",
        default_value_t = DEFAULT_RESET_SETTLE.as_millis() as u64,
        help = "Milliseconds to let the device settle after closing applications"
    )]
    pub reset_settle_ms: u64,
}

impl LoopArgs {
    pub fn to_config(&self) -> Result<LoopConfig, ConfigError> {
        let config = LoopConfig {
            observation_delta: Duration::from_millis(self.observation_delta_ms),
            capture_retries: self.capture_retries,
            reset_settle: Duration::from_millis(self.reset_settle_ms),
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Args, Debug, Clone)]
pub struct AdbArgs {
    #[arg(
        long = "adb",
        value_name = "PATH",
        env = "TIDEPOOL_ADB",
        default_value = "adb",
        help = "adb binary used to reach the device"
    )]
    pub adb: PathBuf,

    #[arg(
        long,
        env = "TIDEPOOL_DEVICE_SERIAL",
        help = "Device serial, when more than one device is attached"
    )]
    pub serial: Option<String>,

    #[arg(
        long = "connect-timeout-ms",
        env = "TIDEPOOL_CONNECT_TIMEOUT_MS",
        default_value_t = 60_000
    )]
    pub connect_timeout_ms: u64,

    #[arg(
        long = "capture-timeout-ms",
        env = "TIDEPOOL_CAPTURE_TIMEOUT_MS",
        default_value_t = 10_000,
        help = "A snapshot slower than this counts as a transient failure"
    )]
    pub capture_timeout_ms: u64,

    #[arg(
        long = "command-timeout-ms",
        env = "TIDEPOOL_COMMAND_TIMEOUT_MS",
        default_value_t = 30_000
    )]
    pub command_timeout_ms: u64,
}

impl AdbArgs {
    pub fn to_config(&self) -> AdbConfig {
        AdbConfig {
            adb: self.adb.clone(),
            serial: self.serial.clone(),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            capture_timeout: Duration::from_millis(self.capture_timeout_ms),
            command_timeout: Duration::from_millis(self.command_timeout_ms),
        }
    }
}
