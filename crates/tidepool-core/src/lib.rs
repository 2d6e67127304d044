//! Core primitives shared by the tidepool device loop and the controller.
//!
//! Both processes link this crate so they agree on a single definition of the
//! messages that cross the queues, the binary schema those messages travel in,
//! and the elapsed-time clock used to sequence log output. Nothing here
//! depends on an async runtime or a transport.

pub mod clock;
pub mod message;
pub mod wire;

pub use clock::{Clock, ClockError};
pub use message::{Action, Coordinate, Observation};
pub use wire::{SCHEMA_VERSION, WireError, WireMessage};
