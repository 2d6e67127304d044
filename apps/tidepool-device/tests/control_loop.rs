use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tidepool_core::{Action, Observation};
use tidepool_device::driver::scripted::DriverEvent;
use tidepool_device::driver::{ScriptedHandle, ShellCommands, SHUTDOWN_AUTOMATION};
use tidepool_device::{
    ControlLoop, DriverError, LoopConfig, LoopError, LoopReport, LoopState, ScriptedDriver,
};
use tidepool_queue::{ExchangeQueues, InMemoryQueue, MessageQueue};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

type Outcome = (ControlLoop<ScriptedDriver>, Result<LoopReport, LoopError>);

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<Outcome>,
}

impl Running {
    fn start(mut control_loop: ControlLoop<ScriptedDriver>) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let result = control_loop.run(token).await;
            (control_loop, result)
        });
        Self { cancel, task }
    }

    async fn stop(self) -> Outcome {
        self.cancel.cancel();
        self.finish().await
    }

    async fn finish(self) -> Outcome {
        self.task.await.expect("control loop task panicked")
    }
}

fn touch_frames() -> (ScriptedDriver, ScriptedHandle) {
    ScriptedDriver::with_frames(|ctx| match ctx.last_touch {
        Some((x, y)) => Bytes::from(format!("frame-{}@{x},{y}", ctx.snapshots)),
        None => Bytes::from(format!("frame-{}", ctx.snapshots)),
    })
}

fn text(observation: &Observation) -> String {
    String::from_utf8_lossy(observation.image()).into_owned()
}

fn cleanup_command() -> String {
    ShellCommands::default()
        .get(SHUTDOWN_AUTOMATION)
        .expect("builtin")
        .to_owned()
}

fn fast_config() -> LoopConfig {
    LoopConfig {
        observation_delta: Duration::from_millis(250),
        capture_retries: 3,
        reset_settle: Duration::from_secs(5),
    }
}

fn timeout() -> DriverError {
    DriverError::Timeout(Duration::from_secs(10))
}

/// Time between the first event matching `from` and the next snapshot after it.
fn gap_to_next_snapshot(events: &[(Instant, DriverEvent)], from: &DriverEvent) -> Duration {
    let start = events
        .iter()
        .position(|(_, event)| event == from)
        .expect("event recorded");
    let (at, _) = events[start];
    let (captured, _) = events[start + 1..]
        .iter()
        .find(|(_, event)| matches!(event, DriverEvent::Snapshot { .. }))
        .expect("snapshot after event");
    *captured - at
}

#[test_timeout::tokio_timeout_test(30, paused)]
async fn primed_frame_arrives_before_any_action() {
    let queues = ExchangeQueues::in_memory();
    let (driver, handle) = touch_frames();
    let running = Running::start(ControlLoop::new(
        driver,
        queues.clone(),
        ShellCommands::default(),
        fast_config(),
    ));

    let primed = queues.observations.blocking_pop().await.expect("primed frame");
    assert_eq!(text(&primed), "frame-0");
    assert!(handle.touches().is_empty());

    let (control_loop, result) = running.stop().await;
    let report = result.expect("clean shutdown");
    assert_eq!(
        report,
        LoopReport {
            actions_applied: 0,
            observations_published: 1,
            resets: 0,
        }
    );
    assert_eq!(control_loop.state(), LoopState::ShuttingDown);
    assert_eq!(handle.shell_commands(), vec![cleanup_command()]);
}

#[test_timeout::tokio_timeout_test(30, paused)]
async fn two_touches_publish_two_observations_in_order() {
    let queues = ExchangeQueues::in_memory();
    let (driver, handle) = touch_frames();
    let running = Running::start(ControlLoop::new(
        driver,
        queues.clone(),
        ShellCommands::default(),
        fast_config(),
    ));

    queues.actions.push(&Action::touch(40.0, 10.0)).await.expect("push");
    queues.actions.push(&Action::touch(10.0, 70.0)).await.expect("push");

    let frames: Vec<String> = [
        queues.observations.blocking_pop().await.expect("pop"),
        queues.observations.blocking_pop().await.expect("pop"),
        queues.observations.blocking_pop().await.expect("pop"),
    ]
    .iter()
    .map(text)
    .collect();
    assert_eq!(frames, ["frame-0", "frame-1@40,10", "frame-2@10,70"]);
    assert_eq!(handle.touches(), vec![(40, 10), (10, 70)]);
    assert_eq!(handle.snapshot_attempts(), 3);

    let events = handle.events();
    for touch in [
        DriverEvent::Touch { x: 40, y: 10 },
        DriverEvent::Touch { x: 10, y: 70 },
    ] {
        let gap = gap_to_next_snapshot(&events, &touch);
        assert!(
            gap >= Duration::from_millis(250) && gap < Duration::from_millis(300),
            "capture after {touch:?} came {gap:?} later"
        );
    }

    let (_, result) = running.stop().await;
    let report = result.expect("clean shutdown");
    assert_eq!(report.actions_applied, 2);
    assert_eq!(report.observations_published, 3);
    assert_eq!(report.resets, 0);
}

#[test_timeout::tokio_timeout_test(60, paused)]
async fn reset_closes_applications_once_then_settles_and_delays() {
    let queues = ExchangeQueues::in_memory();
    let (driver, handle) = touch_frames();
    let commands = ShellCommands::default();
    let close = commands
        .get(tidepool_device::driver::CLOSE_APPLICATIONS)
        .expect("builtin")
        .to_owned();
    let running = Running::start(ControlLoop::new(
        driver,
        queues.clone(),
        commands,
        fast_config(),
    ));

    queues.observations.blocking_pop().await.expect("primed");
    queues.actions.push(&Action::Reset).await.expect("push");
    let after_reset = queues.observations.blocking_pop().await.expect("pop");
    assert_eq!(text(&after_reset), "frame-1");

    assert_eq!(handle.shell_commands(), vec![close.clone()]);
    assert_eq!(handle.snapshot_attempts(), 2);
    let gap = gap_to_next_snapshot(&handle.events(), &DriverEvent::Shell(close));
    assert!(
        gap >= Duration::from_millis(5_250) && gap < Duration::from_millis(5_300),
        "reset capture came {gap:?} after close applications"
    );

    let (_, result) = running.stop().await;
    let report = result.expect("clean shutdown");
    assert_eq!(report.resets, 1);
    assert_eq!(report.actions_applied, 1);
    assert_eq!(report.observations_published, 2);
}

#[test_timeout::tokio_timeout_test(30, paused)]
async fn capture_succeeds_on_the_last_allowed_attempt() {
    let queues = ExchangeQueues::in_memory();
    let (driver, handle) = touch_frames();
    handle.push_snapshot_failure(timeout());
    handle.push_snapshot_failure(DriverError::EmptyFrame);
    let running = Running::start(ControlLoop::new(
        driver,
        queues.clone(),
        ShellCommands::default(),
        fast_config(),
    ));

    let primed = queues.observations.blocking_pop().await.expect("primed");
    assert_eq!(text(&primed), "frame-0");
    assert_eq!(handle.snapshot_attempts(), 3);

    let (_, result) = running.stop().await;
    assert_eq!(result.expect("clean shutdown").observations_published, 1);
    assert!(queues.observations.is_empty().await.expect("len"));
}

#[test_timeout::tokio_timeout_test(30, paused)]
async fn exhausting_capture_attempts_is_fatal() {
    let queues = ExchangeQueues::in_memory();
    let (driver, handle) = touch_frames();
    for _ in 0..3 {
        handle.push_snapshot_failure(timeout());
    }
    let running = Running::start(ControlLoop::new(
        driver,
        queues.clone(),
        ShellCommands::default(),
        fast_config(),
    ));

    let (control_loop, result) = running.finish().await;
    assert!(matches!(
        result,
        Err(LoopError::CaptureExhausted { attempts: 3, .. })
    ));
    assert_eq!(handle.snapshot_attempts(), 3);
    assert_eq!(control_loop.state(), LoopState::Failed);
    assert_eq!(control_loop.report().observations_published, 0);
    assert!(queues.observations.is_empty().await.expect("len"));
    assert_eq!(handle.shell_commands(), vec![cleanup_command()]);
}

#[test_timeout::tokio_timeout_test(30, paused)]
async fn exhaustion_after_an_action_stops_the_loop() {
    let queues = ExchangeQueues::in_memory();
    let (driver, handle) = touch_frames();
    let running = Running::start(ControlLoop::new(
        driver,
        queues.clone(),
        ShellCommands::default(),
        LoopConfig {
            capture_retries: 2,
            ..fast_config()
        },
    ));

    queues.observations.blocking_pop().await.expect("primed");
    handle.push_snapshot_failure(timeout());
    handle.push_snapshot_failure(timeout());
    queues.actions.push(&Action::touch(5.0, 5.0)).await.expect("push");

    let (_, result) = running.finish().await;
    assert!(matches!(
        result,
        Err(LoopError::CaptureExhausted { attempts: 2, .. })
    ));
    assert_eq!(handle.snapshot_attempts(), 3);
    assert!(queues.observations.is_empty().await.expect("len"));
}

#[test_timeout::tokio_timeout_test(30, paused)]
async fn non_transient_capture_error_is_not_retried() {
    let queues = ExchangeQueues::in_memory();
    let (driver, handle) = touch_frames();
    handle.push_snapshot_failure(DriverError::Disconnected("usb unplugged".into()));
    let running = Running::start(ControlLoop::new(
        driver,
        queues.clone(),
        ShellCommands::default(),
        fast_config(),
    ));

    let (_, result) = running.finish().await;
    assert!(matches!(
        result,
        Err(LoopError::Driver(DriverError::Disconnected(_)))
    ));
    assert_eq!(handle.snapshot_attempts(), 1);
}

#[test_timeout::tokio_timeout_test(30, paused)]
async fn malformed_action_is_dropped_and_loop_continues() {
    let queues = ExchangeQueues::in_memory();
    let (driver, handle) = touch_frames();
    let running = Running::start(ControlLoop::new(
        driver,
        queues.clone(),
        ShellCommands::default(),
        fast_config(),
    ));

    queues.observations.blocking_pop().await.expect("primed");
    queues
        .actions
        .raw()
        .push(Bytes::from_static(b"\x20not an action"))
        .await
        .expect("push garbage");
    queues.actions.push(&Action::touch(3.4, 7.6)).await.expect("push");

    let observation = queues.observations.blocking_pop().await.expect("pop");
    assert_eq!(text(&observation), "frame-1@3,8");
    assert_eq!(handle.touches(), vec![(3, 8)]);

    let (_, result) = running.stop().await;
    let report = result.expect("clean shutdown");
    assert_eq!(report.actions_applied, 1);
    assert_eq!(report.observations_published, 2);
}

#[test_timeout::tokio_timeout_test(30, paused)]
async fn transient_touch_failure_still_publishes_paired_frame() {
    let queues = ExchangeQueues::in_memory();
    let (driver, handle) = touch_frames();
    handle.fail_next_touch(timeout());
    let running = Running::start(ControlLoop::new(
        driver,
        queues.clone(),
        ShellCommands::default(),
        fast_config(),
    ));

    queues.observations.blocking_pop().await.expect("primed");
    queues.actions.push(&Action::touch(1.0, 2.0)).await.expect("push");
    let observation = queues.observations.blocking_pop().await.expect("pop");
    assert_eq!(text(&observation), "frame-1");

    let (_, result) = running.stop().await;
    assert_eq!(result.expect("clean shutdown").actions_applied, 1);
}

#[test_timeout::tokio_timeout_test(30, paused)]
async fn transport_loss_runs_cleanup_and_reports_transport_error() {
    let actions = Arc::new(InMemoryQueue::new("actions"));
    let observations = Arc::new(InMemoryQueue::new("observations"));
    let queues = ExchangeQueues::from_parts(actions.clone(), observations.clone());
    let (driver, handle) = touch_frames();
    let running = Running::start(ControlLoop::new(
        driver,
        queues.clone(),
        ShellCommands::default(),
        fast_config(),
    ));

    queues.observations.blocking_pop().await.expect("primed");
    actions.close();

    let (control_loop, result) = running.finish().await;
    let err = result.expect_err("transport loss");
    assert!(matches!(err, LoopError::Transport(_)));
    assert_eq!(control_loop.state(), LoopState::Failed);
    assert_eq!(handle.shell_commands(), vec![cleanup_command()]);
    assert!(actions.is_closed());
    assert_eq!(observations.len().await.expect("len"), 0);
}

#[test_timeout::tokio_timeout_test(30, paused)]
async fn failing_cleanup_does_not_fail_shutdown() {
    let queues = ExchangeQueues::in_memory();
    let (driver, handle) = touch_frames();
    handle.fail_next_shell(DriverError::Disconnected("adb server went away".into()));
    let running = Running::start(ControlLoop::new(
        driver,
        queues.clone(),
        ShellCommands::default(),
        fast_config(),
    ));

    queues.observations.blocking_pop().await.expect("primed");
    let (_, result) = running.stop().await;
    assert!(result.is_ok());
    assert_eq!(handle.shell_commands(), vec![cleanup_command()]);
}

#[test_timeout::tokio_timeout_test(60, paused)]
async fn shutdown_during_reset_settle_abandons_the_capture() {
    let queues = ExchangeQueues::in_memory();
    let (driver, handle) = touch_frames();
    let running = Running::start(ControlLoop::new(
        driver,
        queues.clone(),
        ShellCommands::default(),
        fast_config(),
    ));

    queues.observations.blocking_pop().await.expect("primed");
    queues.actions.push(&Action::Reset).await.expect("push");
    tokio::time::sleep(Duration::from_secs(1)).await;

    let (control_loop, result) = running.stop().await;
    let report = result.expect("clean shutdown");
    assert_eq!(report.resets, 1);
    assert_eq!(report.observations_published, 1);
    assert_eq!(handle.snapshot_attempts(), 1);
    assert_eq!(control_loop.state(), LoopState::ShuttingDown);
    assert!(queues.observations.is_empty().await.expect("len"));
}

#[test_timeout::tokio_timeout_test(30, paused)]
async fn shutdown_during_slow_capture_is_bounded() {
    let queues = ExchangeQueues::in_memory();
    let (driver, handle) = touch_frames();
    handle.set_snapshot_delay(Duration::from_secs(3_600));
    let running = Running::start(ControlLoop::new(
        driver,
        queues.clone(),
        ShellCommands::default(),
        fast_config(),
    ));

    tokio::time::sleep(Duration::from_millis(100)).await;
    let started = Instant::now();
    let (_, result) = running.stop().await;
    assert!(result.is_ok());
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(handle.snapshot_attempts(), 0);
}
