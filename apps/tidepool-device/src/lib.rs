//! Device side of the tidepool exchange.
//!
//! [`ControlLoop`] owns a [`DeviceDriver`] and the two exchange queues; the
//! binary wires it to adb and Redis.

pub mod config;
pub mod control_loop;
pub mod driver;
mod metrics;

pub use control_loop::{ControlLoop, LoopConfig, LoopError, LoopReport, LoopState};
pub use driver::{AdbConfig, AdbDriver, DeviceDriver, DriverError, ScriptedDriver, ShellCommands};
