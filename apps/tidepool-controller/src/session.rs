use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::Agent;
use crate::exchange::{ExchangeClient, ExchangeError};
use crate::reward::RewardFn;
use crate::space::ActionSpace;

pub const MAX_STEPS: u64 = 10_000;
const PROGRESS_EVERY: u64 = 100;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("step count {0} must be between 1 and {max}", max = MAX_STEPS)]
    InvalidSteps(u64),
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    #[error("agent failed: {0:#}")]
    Agent(anyhow::Error),
    #[error("session cancelled after {0} steps")]
    Cancelled(u64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Success,
    Failed,
}

#[derive(Debug)]
pub struct SessionReport {
    pub steps: u64,
    pub total_reward: f64,
    pub average_reward: f64,
    pub status: SessionStatus,
    pub failure: Option<SessionError>,
}

/// Runs one agent for a fixed number of steps against the device:
/// initialize, reset, then `steps` predict/step rounds.
pub struct Session<R> {
    client: ExchangeClient<R>,
    steps: u64,
}

impl<R: RewardFn> Session<R> {
    pub fn new(client: ExchangeClient<R>, steps: u64) -> Result<Self, SessionError> {
        if !(1..=MAX_STEPS).contains(&steps) {
            return Err(SessionError::InvalidSteps(steps));
        }
        Ok(Self { client, steps })
    }

    pub fn client(&self) -> &ExchangeClient<R> {
        &self.client
    }

    pub fn into_client(self) -> ExchangeClient<R> {
        self.client
    }

    /// Never returns early without flushing the queues; failures are folded
    /// into the report.
    pub async fn run<A, F>(&mut self, make_agent: F, cancel: &CancellationToken) -> SessionReport
    where
        A: Agent,
        F: FnOnce(ActionSpace) -> anyhow::Result<A>,
    {
        let mut total_reward = 0.0;
        let mut completed = 0;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            outcome = self.drive(make_agent, &mut total_reward, &mut completed) => Some(outcome),
        };
        let outcome = outcome.unwrap_or_else(|| Err(SessionError::Cancelled(completed)));

        match self.client.flush().await {
            Ok((actions, observations)) if actions + observations > 0 => {
                info!(actions, observations, "flushed leftover messages");
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "failed to flush exchange queues"),
        }

        let average_reward = if completed == 0 {
            0.0
        } else {
            total_reward / completed as f64
        };
        let (status, failure) = match outcome {
            Ok(()) => (SessionStatus::Success, None),
            Err(err) => {
                warn!(error = %err, steps = completed, "session failed");
                (SessionStatus::Failed, Some(err))
            }
        };
        info!(
            steps = completed,
            total_reward,
            average_reward,
            status = ?status,
            "session finished"
        );
        SessionReport {
            steps: completed,
            total_reward,
            average_reward,
            status,
            failure,
        }
    }

    async fn drive<A, F>(
        &mut self,
        make_agent: F,
        total_reward: &mut f64,
        completed: &mut u64,
    ) -> Result<(), SessionError>
    where
        A: Agent,
        F: FnOnce(ActionSpace) -> anyhow::Result<A>,
    {
        self.client.initialize().await?;
        let space = self
            .client
            .action_space()
            .ok_or(SessionError::Exchange(ExchangeError::NotInitialized))?;
        let mut agent = make_agent(space).map_err(SessionError::Agent)?;

        info!("resetting the device");
        let mut observation = self.client.reset().await?;

        for step in 1..=self.steps {
            let coordinate = agent.predict(&observation).map_err(SessionError::Agent)?;
            let outcome = self.client.step(coordinate).await?;
            *total_reward += outcome.reward;
            *completed = step;
            observation = outcome.observation;

            if step % PROGRESS_EVERY == 0 {
                info!(
                    step,
                    of = self.steps,
                    total_reward = *total_reward,
                    elapsed_ms = self.client.clock().elapsed_ms().unwrap_or_default(),
                    "session progress"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tidepool_core::Observation;
    use tidepool_queue::ExchangeQueues;

    use super::*;

    fn zero_reward(_: &Observation, _: &Observation) -> anyhow::Result<f64> {
        Ok(0.0)
    }

    #[test_timeout::timeout]
    fn step_count_is_bounded() {
        let client = || ExchangeClient::new(ExchangeQueues::in_memory(), zero_reward);
        assert!(matches!(
            Session::new(client(), 0),
            Err(SessionError::InvalidSteps(0))
        ));
        assert!(matches!(
            Session::new(client(), MAX_STEPS + 1),
            Err(SessionError::InvalidSteps(_))
        ));
        assert!(Session::new(client(), MAX_STEPS).is_ok());
    }
}
