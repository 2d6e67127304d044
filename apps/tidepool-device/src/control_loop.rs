//! Device-side actor: pop an action, apply it, wait, capture, publish.
//!
//! The loop handles one action completely before popping the next one, so
//! as long as the controller pairs every push with a pop, the i-th published
//! observation always belongs to the i-th applied action. The extra frame
//! published at startup is what the controller's `initialize` consumes.

use std::time::Duration;

use thiserror::Error;
use tidepool_core::{Action, Clock, Observation};
use tidepool_queue::{ExchangeQueues, QueueError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::ConfigError;
use crate::driver::{CommandError, DeviceDriver, DriverError, ShellCommands};
use crate::metrics::{ACTIONS_APPLIED, CAPTURE_ATTEMPTS, OBSERVATIONS_PUBLISHED};

pub const DEFAULT_OBSERVATION_DELTA: Duration = Duration::from_millis(250);
pub const MAX_OBSERVATION_DELTA: Duration = Duration::from_millis(5_000);
pub const DEFAULT_CAPTURE_RETRIES: u32 = 3;
pub const DEFAULT_RESET_SETTLE: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoopConfig {
    /// Pause between applying an action and capturing the screen.
    pub observation_delta: Duration,
    /// Total snapshot attempts per observation, first try included.
    pub capture_retries: u32,
    /// Extra pause after closing applications on reset, before `observation_delta`.
    pub reset_settle: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            observation_delta: DEFAULT_OBSERVATION_DELTA,
            capture_retries: DEFAULT_CAPTURE_RETRIES,
            reset_settle: DEFAULT_RESET_SETTLE,
        }
    }
}

impl LoopConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.observation_delta > MAX_OBSERVATION_DELTA {
            return Err(ConfigError::ObservationDeltaTooLarge {
                delta: self.observation_delta,
                max: MAX_OBSERVATION_DELTA,
            });
        }
        if self.capture_retries == 0 {
            return Err(ConfigError::NoCaptureAttempts);
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    AwaitingAction,
    Applying,
    PostActionDelay,
    Capturing,
    Publishing,
    ShuttingDown,
    Failed,
}

#[derive(Debug, Error)]
pub enum LoopError {
    #[error("capture failed after {attempts} attempts: {last}")]
    CaptureExhausted {
        attempts: u32,
        #[source]
        last: DriverError,
    },
    #[error("device driver failed: {0}")]
    Driver(#[source] DriverError),
    #[error("device command failed: {0}")]
    Command(#[source] CommandError),
    #[error("queue transport lost: {0}")]
    Transport(#[source] QueueError),
    #[error("failed to publish observation: {0}")]
    Publish(#[source] QueueError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopReport {
    pub actions_applied: u64,
    pub observations_published: u64,
    pub resets: u64,
}

enum Flow {
    Continue,
    Cancelled,
}

pub struct ControlLoop<D> {
    driver: D,
    queues: ExchangeQueues,
    commands: ShellCommands,
    config: LoopConfig,
    clock: Clock,
    state: LoopState,
    actions_applied: u64,
    observations_published: u64,
    resets: u64,
}

impl<D: DeviceDriver> ControlLoop<D> {
    pub fn new(
        driver: D,
        queues: ExchangeQueues,
        commands: ShellCommands,
        config: LoopConfig,
    ) -> Self {
        Self {
            driver,
            queues,
            commands,
            config,
            clock: Clock::new(),
            state: LoopState::Idle,
            actions_applied: 0,
            observations_published: 0,
            resets: 0,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Counters so far.
    pub fn report(&self) -> LoopReport {
        LoopReport {
            actions_applied: self.actions_applied,
            observations_published: self.observations_published,
            resets: self.resets,
        }
    }

    pub fn into_driver(self) -> D {
        self.driver
    }

    /// Runs until `cancel` fires or a fatal error occurs. The automation
    /// cleanup command runs on every exit path and its failure is only logged.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<LoopReport, LoopError> {
        if self.clock.start().is_err() {
            debug!("clock already started by the caller");
        }
        info!(
            delta_ms = self.config.observation_delta.as_millis() as u64,
            capture_retries = self.config.capture_retries,
            reset_settle_ms = self.config.reset_settle.as_millis() as u64,
            "device loop starting"
        );

        let outcome = self.drive(&cancel).await;
        match &outcome {
            Ok(()) => {
                self.transition(LoopState::ShuttingDown);
                info!("device loop shutting down");
            }
            Err(err) => {
                self.transition(LoopState::Failed);
                error!(error = %err, "device loop failed");
            }
        }
        self.cleanup().await;

        outcome.map(|()| {
            let report = self.report();
            info!(
                actions = report.actions_applied,
                observations = report.observations_published,
                resets = report.resets,
                "device loop stopped"
            );
            report
        })
    }

    async fn drive(&mut self, cancel: &CancellationToken) -> Result<(), LoopError> {
        if let Flow::Cancelled = self.capture_and_publish(cancel).await? {
            return Ok(());
        }

        loop {
            self.transition(LoopState::AwaitingAction);
            let action = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                popped = self.queues.actions.blocking_pop() => popped.map_err(queue_error)?,
            };

            if let Flow::Cancelled = self.apply(action, cancel).await? {
                return Ok(());
            }

            self.transition(LoopState::PostActionDelay);
            if !wait(self.config.observation_delta, cancel).await {
                return Ok(());
            }

            if let Flow::Cancelled = self.capture_and_publish(cancel).await? {
                return Ok(());
            }
        }
    }

    async fn apply(&mut self, action: Action, cancel: &CancellationToken) -> Result<Flow, LoopError> {
        self.transition(LoopState::Applying);
        ACTIONS_APPLIED.with_label_values(&[action.kind()]).inc();

        match action {
            Action::Reset => {
                info!(elapsed_ms = self.elapsed_ms(), "reset: closing applications");
                match self.commands.close_applications(&mut self.driver).await {
                    Ok(()) => {}
                    Err(CommandError::Driver(err)) if err.is_transient() => {
                        warn!(error = %err, "close applications did not finish; continuing reset");
                    }
                    Err(err) => return Err(LoopError::Command(err)),
                }
                self.resets += 1;
                self.actions_applied += 1;
                if !wait(self.config.reset_settle, cancel).await {
                    return Ok(Flow::Cancelled);
                }
            }
            Action::Touch(coordinate) => {
                let (x, y) = coordinate.to_pixel();
                match self.driver.touch(x, y).await {
                    Ok(()) => debug!(x, y, elapsed_ms = self.elapsed_ms(), "touch applied"),
                    // Still capture so the controller gets the frame paired with this action.
                    Err(err) if err.is_transient() => {
                        warn!(x, y, error = %err, "touch failed; capturing anyway");
                    }
                    Err(err) => return Err(LoopError::Driver(err)),
                }
                self.actions_applied += 1;
            }
        }
        Ok(Flow::Continue)
    }

    async fn capture_and_publish(&mut self, cancel: &CancellationToken) -> Result<Flow, LoopError> {
        self.transition(LoopState::Capturing);
        let max_attempts = self.config.capture_retries.max(1);
        let mut attempt = 0;

        let frame = loop {
            attempt += 1;
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(Flow::Cancelled),
                outcome = self.driver.snapshot() => outcome,
            };
            let outcome = match outcome {
                Ok(frame) if frame.is_empty() => Err(DriverError::EmptyFrame),
                other => other,
            };
            match outcome {
                Ok(frame) => {
                    CAPTURE_ATTEMPTS.with_label_values(&["ok"]).inc();
                    break frame;
                }
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    CAPTURE_ATTEMPTS.with_label_values(&["retry"]).inc();
                    warn!(attempt, max_attempts, error = %err, "capture failed; retrying");
                }
                Err(err) if err.is_transient() => {
                    CAPTURE_ATTEMPTS.with_label_values(&["exhausted"]).inc();
                    return Err(LoopError::CaptureExhausted {
                        attempts: attempt,
                        last: err,
                    });
                }
                Err(err) => {
                    CAPTURE_ATTEMPTS.with_label_values(&["fatal"]).inc();
                    return Err(LoopError::Driver(err));
                }
            }
        };

        self.transition(LoopState::Publishing);
        let observation = Observation::new(frame);
        let bytes = observation.len();
        self.queues
            .observations
            .push(&observation)
            .await
            .map_err(queue_error)?;
        self.observations_published += 1;
        OBSERVATIONS_PUBLISHED.inc();
        debug!(
            bytes,
            attempts = attempt,
            published = self.observations_published,
            elapsed_ms = self.elapsed_ms(),
            "observation published"
        );
        Ok(Flow::Continue)
    }

    async fn cleanup(&mut self) {
        match self.commands.shutdown_automation(&mut self.driver).await {
            Ok(()) => info!("device automation stopped"),
            Err(err) => warn!(error = %err, "cleanup command failed; ignoring"),
        }
    }

    fn transition(&mut self, next: LoopState) {
        if self.state != next {
            trace!(from = ?self.state, to = ?next, "loop state");
            self.state = next;
        }
    }

    fn elapsed_ms(&self) -> f64 {
        self.clock.elapsed_ms().unwrap_or_default()
    }
}

async fn wait(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

fn queue_error(err: QueueError) -> LoopError {
    if err.is_transport() {
        LoopError::Transport(err)
    } else {
        LoopError::Publish(err)
    }
}
