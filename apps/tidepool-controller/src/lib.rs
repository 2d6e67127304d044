//! Controller side of the tidepool exchange.
//!
//! [`ExchangeClient`] speaks the step/reset protocol over the exchange
//! queues; [`Session`] drives it with an [`Agent`] and a [`RewardFn`].

pub mod agent;
pub mod config;
pub mod exchange;
mod metrics;
pub mod reward;
pub mod session;
pub mod space;

pub use agent::{Agent, AgentKind, RandomAgent};
pub use exchange::{ExchangeClient, ExchangeError, StepInfo, StepOutcome};
pub use reward::{MeanPixelDifference, RewardFn};
pub use session::{MAX_STEPS, Session, SessionError, SessionReport, SessionStatus};
pub use space::{ActionSpace, FrameDimensions};
