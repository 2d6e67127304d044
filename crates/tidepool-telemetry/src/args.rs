use std::path::PathBuf;

use clap::Args;

use crate::logging::{LogConfig, LogLevel};

#[derive(Args, Debug, Clone, Default)]
pub struct TelemetryArgs {
    #[arg(
        long = "log-level",
        value_enum,
        env = "TIDEPOOL_LOG_LEVEL",
        default_value_t = LogLevel::Info,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        env = "TIDEPOOL_LOG_FILE",
        help = "Write structured logs to the specified file instead of stderr"
    )]
    pub file: Option<PathBuf>,

    #[arg(
        long = "metrics-file",
        value_name = "PATH",
        env = "TIDEPOOL_METRICS_FILE",
        help = "Write a prometheus text snapshot here when the process exits"
    )]
    pub metrics_file: Option<PathBuf>,
}

impl TelemetryArgs {
    pub fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone(),
        }
    }

    /// Writes the metrics snapshot if one was requested. Failures are logged.
    pub fn flush_metrics(&self) {
        let Some(path) = self.metrics_file.as_deref() else {
            return;
        };
        match crate::metrics::write_snapshot(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "metrics snapshot written"),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to write metrics snapshot")
            }
        }
    }
}
