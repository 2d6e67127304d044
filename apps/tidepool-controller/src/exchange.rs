//! Controller half of the step/reset protocol.
//!
//! Every protocol call pushes at most one action and then performs exactly one
//! blocking pop before returning. The methods take `&mut self`, so a second
//! push cannot start while the first one is still waiting for its frame.

use thiserror::Error;
use tidepool_core::{Action, Clock, Coordinate, Observation};
use tidepool_queue::{ExchangeQueues, QueueError};
use tracing::{debug, info};

use crate::metrics::{RESETS, STEPS};
use crate::reward::RewardFn;
use crate::space::{ActionSpace, FrameDimensions};

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("exchange client used before initialize")]
    NotInitialized,
    #[error("exchange client already initialized")]
    AlreadyInitialized,
    #[error("coordinate ({x}, {y}) is outside the {width}x{height} action space")]
    OutOfBounds {
        x: f64,
        y: f64,
        width: u32,
        height: u32,
    },
    #[error("initial frame is not a readable image: {0}")]
    Frame(#[source] image::ImageError),
    #[error(transparent)]
    Reward(anyhow::Error),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepInfo {
    pub steps: u64,
}

#[derive(Clone, Debug)]
pub struct StepOutcome {
    pub observation: Observation,
    pub reward: f64,
    pub info: StepInfo,
}

struct Episode {
    space: ActionSpace,
    previous: Observation,
}

pub struct ExchangeClient<R> {
    queues: ExchangeQueues,
    reward_fn: R,
    clock: Clock,
    episode: Option<Episode>,
    steps: u64,
}

impl<R: RewardFn> ExchangeClient<R> {
    pub fn new(queues: ExchangeQueues, reward_fn: R) -> Self {
        Self {
            queues,
            reward_fn,
            clock: Clock::new(),
            episode: None,
            steps: 0,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Consumes the frame the device loop publishes at startup and sizes the
    /// action space from it. No action is pushed.
    pub async fn initialize(&mut self) -> Result<Observation, ExchangeError> {
        if self.episode.is_some() {
            return Err(ExchangeError::AlreadyInitialized);
        }
        if !self.clock.is_started() {
            self.clock.start().ok();
        }

        let frame = self.queues.observations.blocking_pop().await?;
        let dimensions = FrameDimensions::of(&frame).map_err(ExchangeError::Frame)?;
        info!(
            width = dimensions.width,
            height = dimensions.height,
            elapsed_ms = self.elapsed_ms(),
            "initial frame received"
        );
        self.episode = Some(Episode {
            space: ActionSpace::new(dimensions),
            previous: frame.clone(),
        });
        Ok(frame)
    }

    /// Drops anything left over from an earlier episode, resets the device and
    /// returns the first frame of the new episode.
    pub async fn reset(&mut self) -> Result<Observation, ExchangeError> {
        let Some(episode) = self.episode.as_mut() else {
            return Err(ExchangeError::NotInitialized);
        };

        let (stale_actions, stale_observations) = self.queues.flush().await?;
        if stale_actions + stale_observations > 0 {
            info!(stale_actions, stale_observations, "dropped stale messages before reset");
        }
        self.queues.actions.push(&Action::Reset).await?;
        let frame = self.queues.observations.blocking_pop().await?;

        self.steps = 0;
        episode.previous = frame.clone();
        RESETS.inc();
        info!(elapsed_ms = self.clock.elapsed_ms().unwrap_or_default(), "episode reset");
        Ok(frame)
    }

    pub async fn step(&mut self, coordinate: Coordinate) -> Result<StepOutcome, ExchangeError> {
        let Some(episode) = self.episode.as_mut() else {
            return Err(ExchangeError::NotInitialized);
        };
        if !episode.space.contains(coordinate) {
            let dims = episode.space.dimensions();
            return Err(ExchangeError::OutOfBounds {
                x: coordinate.x,
                y: coordinate.y,
                width: dims.width,
                height: dims.height,
            });
        }

        self.queues.actions.push(&Action::Touch(coordinate)).await?;
        let observation = self.queues.observations.blocking_pop().await?;
        self.steps += 1;
        STEPS.inc();

        let previous = std::mem::replace(&mut episode.previous, observation.clone());
        let reward = self
            .reward_fn
            .reward(&previous, &observation)
            .map_err(ExchangeError::Reward)?;
        debug!(
            x = coordinate.x,
            y = coordinate.y,
            steps = self.steps,
            reward,
            elapsed_ms = self.clock.elapsed_ms().unwrap_or_default(),
            "step"
        );
        Ok(StepOutcome {
            observation,
            reward,
            info: StepInfo { steps: self.steps },
        })
    }

    /// Empties both queues. Used at session end.
    pub async fn flush(&self) -> Result<(usize, usize), ExchangeError> {
        Ok(self.queues.flush().await?)
    }

    pub fn dimensions(&self) -> Option<FrameDimensions> {
        self.episode.as_ref().map(|episode| episode.space.dimensions())
    }

    pub fn action_space(&self) -> Option<ActionSpace> {
        self.episode.as_ref().map(|episode| episode.space)
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn last_observation(&self) -> Option<&Observation> {
        self.episode.as_ref().map(|episode| &episode.previous)
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    fn elapsed_ms(&self) -> f64 {
        self.clock.elapsed_ms().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::tests::png;

    fn zero_reward(_: &Observation, _: &Observation) -> anyhow::Result<f64> {
        Ok(0.0)
    }

    #[test_timeout::tokio_timeout_test(10)]
    async fn step_and_reset_require_initialize() {
        let mut client = ExchangeClient::new(ExchangeQueues::in_memory(), zero_reward);
        assert!(matches!(
            client.step(Coordinate::new(1.0, 1.0)).await,
            Err(ExchangeError::NotInitialized)
        ));
        assert!(matches!(
            client.reset().await,
            Err(ExchangeError::NotInitialized)
        ));
    }

    #[test_timeout::tokio_timeout_test(10)]
    async fn initialize_reads_primed_frame_once() {
        let queues = ExchangeQueues::in_memory();
        queues.observations.push(&png(20, 10, [1, 2, 3])).await.expect("push");
        let mut client = ExchangeClient::new(queues.clone(), zero_reward);

        client.initialize().await.expect("initialize");
        assert_eq!(
            client.dimensions(),
            Some(FrameDimensions { width: 20, height: 10 })
        );
        assert!(queues.actions.is_empty().await.expect("len"));
        assert!(matches!(
            client.initialize().await,
            Err(ExchangeError::AlreadyInitialized)
        ));
    }

    #[test_timeout::tokio_timeout_test(10)]
    async fn unreadable_primed_frame_is_reported() {
        let queues = ExchangeQueues::in_memory();
        queues
            .observations
            .push(&Observation::new(vec![0u8; 8]))
            .await
            .expect("push");
        let mut client = ExchangeClient::new(queues, zero_reward);
        assert!(matches!(
            client.initialize().await,
            Err(ExchangeError::Frame(_))
        ));
    }

    #[test_timeout::tokio_timeout_test(10)]
    async fn out_of_bounds_step_pushes_nothing() {
        let queues = ExchangeQueues::in_memory();
        queues.observations.push(&png(20, 10, [0, 0, 0])).await.expect("push");
        let mut client = ExchangeClient::new(queues.clone(), zero_reward);
        client.initialize().await.expect("initialize");

        let err = client
            .step(Coordinate::new(20.0, 5.0))
            .await
            .expect_err("out of bounds");
        assert!(matches!(err, ExchangeError::OutOfBounds { width: 20, .. }));
        assert!(queues.actions.is_empty().await.expect("len"));
        assert_eq!(client.steps(), 0);
    }

    #[test_timeout::tokio_timeout_test(10)]
    async fn reward_errors_propagate_unchanged() {
        let queues = ExchangeQueues::in_memory();
        queues.observations.push(&png(4, 4, [0, 0, 0])).await.expect("push");
        let failing = |_: &Observation, _: &Observation| -> anyhow::Result<f64> {
            Err(anyhow::anyhow!("reward model missing"))
        };
        let mut client = ExchangeClient::new(queues.clone(), failing);
        client.initialize().await.expect("initialize");

        // Stand in for the device: answer the touch with a frame.
        queues.observations.push(&png(4, 4, [9, 9, 9])).await.expect("push");
        let err = client
            .step(Coordinate::new(1.0, 1.0))
            .await
            .expect_err("reward failure");
        assert!(matches!(err, ExchangeError::Reward(_)));
        assert_eq!(err.to_string(), "reward model missing");
        assert_eq!(client.steps(), 1);
        assert_eq!(
            queues.actions.pop().await.expect("pop"),
            Some(Action::touch(1.0, 1.0))
        );
    }
}
