use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::process::Command;
use tracing::{debug, info};

use super::{DeviceDriver, DriverError};

const DISCONNECT_MARKERS: &[&str] = &[
    "no devices/emulators found",
    "device offline",
    "device not found",
    "not found",
    "closed",
];

#[derive(Clone, Debug)]
pub struct AdbConfig {
    pub adb: PathBuf,
    pub serial: Option<String>,
    pub connect_timeout: Duration,
    pub capture_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for AdbConfig {
    fn default() -> Self {
        Self {
            adb: PathBuf::from("adb"),
            serial: None,
            connect_timeout: Duration::from_secs(60),
            capture_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
        }
    }
}

/// Drives an Android device through the `adb` binary.
pub struct AdbDriver {
    config: AdbConfig,
}

impl AdbDriver {
    /// Blocks until the device is reachable. Called once at process start.
    pub async fn wait_for_connection(config: AdbConfig) -> Result<Self, DriverError> {
        let driver = Self { config };
        let serial = driver.config.serial.as_deref().unwrap_or("<default>");
        info!(serial, adb = %driver.config.adb.display(), "waiting for device");
        driver
            .run(&["wait-for-device"], driver.config.connect_timeout)
            .await?;
        info!(serial, "device connected");
        Ok(driver)
    }

    pub fn config(&self) -> &AdbConfig {
        &self.config
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.config.adb);
        if let Some(serial) = &self.config.serial {
            cmd.arg("-s").arg(serial);
        }
        cmd.args(args).stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    async fn run(&self, args: &[&str], timeout: Duration) -> Result<Vec<u8>, DriverError> {
        let mut cmd = self.command(args);
        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Err(_) => return Err(DriverError::Timeout(timeout)),
            Ok(Err(err)) if err.kind() == ErrorKind::NotFound => {
                return Err(DriverError::Disconnected(format!(
                    "adb binary {} not found",
                    self.config.adb.display()
                )));
            }
            Ok(result) => result?,
        };
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            if is_disconnect(&stderr) {
                return Err(DriverError::Disconnected(stderr));
            }
            return Err(DriverError::Command {
                command: format!("adb {}", args.join(" ")),
                status: output.status.code().unwrap_or(-1),
                stderr,
            });
        }
        Ok(output.stdout)
    }
}

fn is_disconnect(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    stderr.starts_with("error:") && DISCONNECT_MARKERS.iter().any(|marker| stderr.contains(marker))
}

#[async_trait]
impl DeviceDriver for AdbDriver {
    async fn touch(&mut self, x: i32, y: i32) -> Result<(), DriverError> {
        let (x, y) = (x.to_string(), y.to_string());
        self.run(&["shell", "input", "tap", x.as_str(), y.as_str()], self.config.command_timeout)
            .await?;
        Ok(())
    }

    async fn snapshot(&mut self) -> Result<Bytes, DriverError> {
        let frame = self
            .run(&["exec-out", "screencap", "-p"], self.config.capture_timeout)
            .await?;
        if frame.is_empty() {
            return Err(DriverError::EmptyFrame);
        }
        debug!(bytes = frame.len(), "captured frame");
        Ok(Bytes::from(frame))
    }

    async fn shell(&mut self, command: &str) -> Result<(), DriverError> {
        self.run(&["shell", command], self.config.command_timeout)
            .await?;
        Ok(())
    }
}
