use anyhow::{Context, Result, bail};
use clap::Parser;
use tidepool_controller::config::Cli;
use tidepool_controller::{ExchangeClient, MeanPixelDifference, Session, SessionStatus};
use tidepool_core::Clock;
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
    cli.validate().context("invalid controller configuration")?;

    let queue_config = cli.queue.to_config();
    let queues = ExchangeQueues::connect(&queue_config)
        .await
        .with_context(|| format!("failed to open {} exchange queues", queue_config.backend))?;

    let cancel = CancellationToken::new();
    tidepool_telemetry::cancel_on_termination(cancel.clone())
        .context("failed to install termination handlers")?;

    info!(
        backend = %queue_config.backend,
        namespace = %queue_config.namespace,
        steps = cli.steps,
        agent = ?cli.agent,
        "starting tidepool-controller; waiting for the device's first frame"
    );
    let client = ExchangeClient::new(queues, MeanPixelDifference).with_clock(Clock::started());
    let mut session = Session::new(client, cli.steps)?;
    let (agent, seed) = (cli.agent, cli.seed);
    let report = session
        .run(|space| agent.build(space, seed), &cancel)
        .await;

    info!(
        steps = report.steps,
        total_reward = report.total_reward,
        average_reward = report.average_reward,
        "session report"
    );
    match (report.status, report.failure) {
        (SessionStatus::Success, _) => Ok(()),
        (SessionStatus::Failed, Some(err)) => Err(err).context("session failed"),
        (SessionStatus::Failed, None) => bail!("session failed"),
    }
}
