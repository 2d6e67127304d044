//! Process termination requests.
//!
//! Both binaries must run their own teardown (the device cleanup command, the
//! controller's queue flush) when asked to stop, whether the request comes
//! from a terminal (SIGINT) or a supervisor (SIGTERM).

use std::io;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    Interrupt,
    Terminate,
}

pub struct TerminationSignals {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl TerminationSignals {
    /// Registers the handlers. Once this returns, SIGTERM is delivered here
    /// instead of killing the process. Must be called inside a tokio runtime.
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            terminate: tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            )?,
        })
    }

    pub async fn recv(&mut self) -> io::Result<Termination> {
        #[cfg(unix)]
        {
            tokio::select! {
                interrupted = tokio::signal::ctrl_c() => interrupted.map(|()| Termination::Interrupt),
                terminated = self.terminate.recv() => match terminated {
                    Some(()) => Ok(Termination::Terminate),
                    None => Err(io::Error::other("SIGTERM stream closed")),
                },
            }
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c()
                .await
                .map(|()| Termination::Interrupt)
        }
    }
}

/// Cancels `token` on the first termination request.
pub fn cancel_on_termination(token: CancellationToken) -> io::Result<JoinHandle<()>> {
    let mut signals = TerminationSignals::install()?;
    Ok(tokio::spawn(async move {
        match signals.recv().await {
            Ok(signal) => {
                info!(?signal, "shutdown requested");
                token.cancel();
            }
            Err(err) => warn!(error = %err, "failed to listen for termination signals"),
        }
    }))
}
