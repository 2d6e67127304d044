use anyhow::{Context, Result};
use clap::Parser;
use tidepool_core::Clock;
use tidepool_device::config::Cli;
use tidepool_device::{AdbDriver, ControlLoop, ShellCommands};
use tidepool_queue::ExchangeQueues;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    tidepool_telemetry::logging::init(&cli.telemetry.to_config())
        .context("failed to initialise logging")?;

    let result = run(&cli).await;
    cli.telemetry.flush_metrics();
    result
}

async fn run(cli: &Cli) -> Result<()> {
    let loop_config = cli
        .device_loop
        .to_config()
        .context("invalid device loop configuration")?;
    let commands = match &cli.commands_dir {
        Some(dir) => ShellCommands::from_dir(dir)
            .with_context(|| format!("failed to load device commands from {}", dir.display()))?,
        None => ShellCommands::default(),
    };

    let queue_config = cli.queue.to_config();
    let queues = ExchangeQueues::connect(&queue_config)
        .await
        .with_context(|| format!("failed to open {} exchange queues", queue_config.backend))?;
    let driver = AdbDriver::wait_for_connection(cli.adb.to_config())
        .await
        .context("device never became reachable")?;

    let clock = Clock::started();
    let cancel = CancellationToken::new();
    tidepool_telemetry::cancel_on_termination(cancel.clone())
        .context("failed to install termination handlers")?;

    info!(
        backend = %queue_config.backend,
        namespace = %queue_config.namespace,
        "starting tidepool-device"
    );
    let mut control_loop = ControlLoop::new(driver, queues, commands, loop_config).with_clock(clock);
    let report = control_loop
        .run(cancel)
        .await
        .context("device loop terminated")?;
    info!(
        actions = report.actions_applied,
        observations = report.observations_published,
        resets = report.resets,
        "tidepool-device exited cleanly"
    );
    Ok(())
}
