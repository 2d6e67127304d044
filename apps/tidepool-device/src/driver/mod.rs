//! The device the control loop drives.
//!
//! A [`DeviceDriver`] is owned by exactly one [`ControlLoop`](crate::control_loop::ControlLoop);
//! methods take `&mut self` so nothing else can interleave calls.

pub mod adb;
pub mod commands;
pub mod scripted;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use adb::{AdbConfig, AdbDriver};
pub use commands::{CLOSE_APPLICATIONS, CommandError, SHUTDOWN_AUTOMATION, ShellCommands};
pub use scripted::{ScriptedDriver, ScriptedHandle};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("device did not respond within {0:?}")]
    Timeout(Duration),
    #[error("device returned an empty frame")]
    EmptyFrame,
    #[error("device disconnected: {0}")]
    Disconnected(String),
    #[error("`{command}` exited with status {status}: {stderr}")]
    Command {
        command: String,
        status: i32,
        stderr: String,
    },
    #[error("device io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    /// Transient errors are worth another attempt; everything else means the
    /// device or its tooling is gone.
    pub fn is_transient(&self) -> bool {
        matches!(self, DriverError::Timeout(_) | DriverError::EmptyFrame)
    }
}

#[async_trait]
pub trait DeviceDriver: Send {
    async fn touch(&mut self, x: i32, y: i32) -> Result<(), DriverError>;

    /// Captures the current screen as an encoded image.
    async fn snapshot(&mut self) -> Result<Bytes, DriverError>;

    async fn shell(&mut self, command: &str) -> Result<(), DriverError>;
}

#[async_trait]
impl<D: DeviceDriver + ?Sized> DeviceDriver for Box<D> {
    async fn touch(&mut self, x: i32, y: i32) -> Result<(), DriverError> {
        (**self).touch(x, y).await
    }

    async fn snapshot(&mut self) -> Result<Bytes, DriverError> {
        (**self).snapshot().await
    }

    async fn shell(&mut self, command: &str) -> Result<(), DriverError> {
        (**self).shell(command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn only_timeouts_and_empty_frames_are_transient() {
        assert!(DriverError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(DriverError::EmptyFrame.is_transient());
        assert!(!DriverError::Disconnected("gone".into()).is_transient());
        assert!(
            !DriverError::Command {
                command: "adb shell input tap 1 2".into(),
                status: 1,
                stderr: "error: no devices".into(),
            }
            .is_transient()
        );
    }
}
