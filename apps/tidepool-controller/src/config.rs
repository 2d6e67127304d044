use clap::Parser;
use thiserror::Error;
use tidepool_queue::QueueArgs;
use tidepool_telemetry::TelemetryArgs;

use crate::agent::AgentKind;
use crate::session::MAX_STEPS;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("--steps must be between 1 and {max}, got {0}", max = MAX_STEPS)]
    Steps(u64),
}

#[derive(Parser, Debug)]
#[command(
    name = "tidepool-controller",
    about = "Drive a tidepool device with an agent over the action/observation queues",
    version
)]
pub struct Cli {
    #[command(flatten)]
    pub queue: QueueArgs,

    #[arg(
        long,
        env = "TIDEPOOL_STEPS",
        default_value_t = 100,
        help = "Touches to perform after the initial reset"
    )]
    pub steps: u64,

    #[arg(
        long,
        value_enum,
        env = "TIDEPOOL_AGENT",
        default_value_t = AgentKind::Random,
        help = "Agent choosing where to touch"
    )]
    pub agent: AgentKind,

    #[arg(
        long,
        env = "TIDEPOOL_SEED",
        help = "Seed for the agent's random number generator"
    )]
    pub seed: Option<u64>,

    #[command(flatten)]
    pub telemetry: TelemetryArgs,
}

impl Cli {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_STEPS).contains(&self.steps) {
            return Err(ConfigError::Steps(self.steps));
        }
        Ok(())
    }
}
