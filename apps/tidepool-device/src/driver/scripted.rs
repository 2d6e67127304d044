use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::{DeviceDriver, DriverError};

/// What the frame generator knows when a snapshot is taken.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameContext {
    /// Snapshots served so far, this one excluded.
    pub snapshots: u64,
    pub last_touch: Option<(i32, i32)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DriverEvent {
    Touch { x: i32, y: i32 },
    Shell(String),
    Snapshot { ok: bool },
}

type FrameFn = Box<dyn FnMut(FrameContext) -> Bytes + Send>;

struct Script {
    snapshots: VecDeque<Result<Bytes, DriverError>>,
    touch_failures: VecDeque<DriverError>,
    shell_failures: VecDeque<DriverError>,
    snapshot_delay: Option<Duration>,
    frame_fn: FrameFn,
    context: FrameContext,
    events: Vec<(Instant, DriverEvent)>,
}

/// Deterministic in-process device.
///
/// Snapshot results come from a queue of scripted outcomes; once that runs
/// dry, frames are produced by a generator (by default `frame-<n>`). Every
/// call is recorded with its (possibly virtual) timestamp.
pub struct ScriptedDriver {
    script: Arc<Mutex<Script>>,
}

/// Test-side view of a [`ScriptedDriver`] that has been handed to a loop.
#[derive(Clone)]
pub struct ScriptedHandle {
    script: Arc<Mutex<Script>>,
}

impl ScriptedDriver {
    pub fn new() -> (Self, ScriptedHandle) {
        let script = Arc::new(Mutex::new(Script {
            snapshots: VecDeque::new(),
            touch_failures: VecDeque::new(),
            shell_failures: VecDeque::new(),
            snapshot_delay: None,
            frame_fn: Box::new(|ctx| Bytes::from(format!("frame-{}", ctx.snapshots))),
            context: FrameContext::default(),
            events: Vec::new(),
        }));
        (
            Self {
                script: Arc::clone(&script),
            },
            ScriptedHandle { script },
        )
    }

    pub fn with_frames<F>(frame_fn: F) -> (Self, ScriptedHandle)
    where
        F: FnMut(FrameContext) -> Bytes + Send + 'static,
    {
        let (driver, handle) = Self::new();
        driver.script.lock().frame_fn = Box::new(frame_fn);
        (driver, handle)
    }
}

impl ScriptedHandle {
    pub fn push_frame(&self, frame: impl Into<Bytes>) {
        self.script.lock().snapshots.push_back(Ok(frame.into()));
    }

    pub fn push_snapshot_failure(&self, error: DriverError) {
        self.script.lock().snapshots.push_back(Err(error));
    }

    pub fn fail_next_touch(&self, error: DriverError) {
        self.script.lock().touch_failures.push_back(error);
    }

    pub fn fail_next_shell(&self, error: DriverError) {
        self.script.lock().shell_failures.push_back(error);
    }

    pub fn set_snapshot_delay(&self, delay: Duration) {
        self.script.lock().snapshot_delay = Some(delay);
    }

    pub fn events(&self) -> Vec<(Instant, DriverEvent)> {
        self.script.lock().events.clone()
    }

    pub fn touches(&self) -> Vec<(i32, i32)> {
        self.filter_events(|event| match event {
            DriverEvent::Touch { x, y } => Some((*x, *y)),
            _ => None,
        })
    }

    pub fn shell_commands(&self) -> Vec<String> {
        self.filter_events(|event| match event {
            DriverEvent::Shell(command) => Some(command.clone()),
            _ => None,
        })
    }

    /// Every snapshot attempt, failed ones included.
    pub fn snapshot_attempts(&self) -> usize {
        self.filter_events(|event| matches!(event, DriverEvent::Snapshot { .. }).then_some(()))
            .len()
    }

    fn filter_events<T>(&self, f: impl Fn(&DriverEvent) -> Option<T>) -> Vec<T> {
        self.script
            .lock()
            .events
            .iter()
            .filter_map(|(_, event)| f(event))
            .collect()
    }
}

impl Script {
    fn record(&mut self, event: DriverEvent) {
        self.events.push((Instant::now(), event));
    }
}

#[async_trait]
impl DeviceDriver for ScriptedDriver {
    async fn touch(&mut self, x: i32, y: i32) -> Result<(), DriverError> {
        let mut script = self.script.lock();
        script.record(DriverEvent::Touch { x, y });
        if let Some(error) = script.touch_failures.pop_front() {
            return Err(error);
        }
        script.context.last_touch = Some((x, y));
        Ok(())
    }

    async fn snapshot(&mut self) -> Result<Bytes, DriverError> {
        let delay = self.script.lock().snapshot_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut script = self.script.lock();
        let outcome = match script.snapshots.pop_front() {
            Some(outcome) => outcome,
            None => {
                let context = script.context;
                Ok((script.frame_fn)(context))
            }
        };
        script.record(DriverEvent::Snapshot {
            ok: outcome.is_ok(),
        });
        if outcome.is_ok() {
            script.context.snapshots += 1;
        }
        outcome
    }

    async fn shell(&mut self, command: &str) -> Result<(), DriverError> {
        let mut script = self.script.lock();
        script.record(DriverEvent::Shell(command.to_owned()));
        match script.shell_failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
