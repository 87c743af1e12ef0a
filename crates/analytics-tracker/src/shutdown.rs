// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Graceful shutdown.
//!
//! The coordinator moves through `Running -> Draining -> Terminated`. The first termination
//! signal (or call to [`ShutdownCoordinator::shutdown`]) stops the HTTP accept loop and drains
//! the event logger. Every later signal or caller waits for that same drain instead of starting
//! another one. [`ShutdownCoordinator::supervise`] ties this to the server task and decides
//! whether the process exits cleanly.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatch::EventLogger;
use crate::tracker::ServeResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Hangup,
    Interrupt,
    Terminate,
    Quit,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShutdownSignal::Hangup => "SIGHUP",
            ShutdownSignal::Interrupt => "SIGINT",
            ShutdownSignal::Terminate => "SIGTERM",
            ShutdownSignal::Quit => "SIGQUIT",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Draining,
    Terminated,
}

const RUNNING: u8 = 0;
const DRAINING: u8 = 1;
const TERMINATED: u8 = 2;

#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("Failed to install signal handler: {0}")]
    SignalHandler(#[source] std::io::Error),

    #[error("Failed to drain event logger: {0}")]
    Drain(String),

    #[error("HTTP server stopped unexpectedly: {0}")]
    ServerExited(String),
}

/// Listeners for SIGHUP, SIGINT, SIGTERM and SIGQUIT. Once installed, these signals no longer
/// terminate the process.
#[cfg(unix)]
struct Signals {
    hangup: tokio::signal::unix::Signal,
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn install() -> Result<Self, ShutdownError> {
        use tokio::signal::unix::{signal, SignalKind};

        let listen = |kind| signal(kind).map_err(ShutdownError::SignalHandler);
        Ok(Signals {
            hangup: listen(SignalKind::hangup())?,
            interrupt: listen(SignalKind::interrupt())?,
            terminate: listen(SignalKind::terminate())?,
            quit: listen(SignalKind::quit())?,
        })
    }

    async fn recv(&mut self) -> Result<ShutdownSignal, ShutdownError> {
        let received = tokio::select! {
            _ = self.hangup.recv() => ShutdownSignal::Hangup,
            _ = self.interrupt.recv() => ShutdownSignal::Interrupt,
            _ = self.terminate.recv() => ShutdownSignal::Terminate,
            _ = self.quit.recv() => ShutdownSignal::Quit,
        };
        Ok(received)
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn install() -> Result<Self, ShutdownError> {
        Ok(Signals)
    }

    async fn recv(&mut self) -> Result<ShutdownSignal, ShutdownError> {
        tokio::signal::ctrl_c()
            .await
            .map_err(ShutdownError::SignalHandler)?;
        Ok(ShutdownSignal::Interrupt)
    }
}

pub struct ShutdownCoordinator {
    event_logger: Arc<EventLogger>,
    cancel: CancellationToken,
    state: AtomicU8,
    drained: OnceCell<Result<(), String>>,
}

impl ShutdownCoordinator {
    pub fn new(event_logger: Arc<EventLogger>) -> Self {
        ShutdownCoordinator {
            event_logger,
            cancel: CancellationToken::new(),
            state: AtomicU8::new(RUNNING),
            drained: OnceCell::new(),
        }
    }

    /// Cancelled as soon as draining starts; the server stops accepting connections on it.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> ShutdownState {
        match self.state.load(Ordering::Acquire) {
            RUNNING => ShutdownState::Running,
            DRAINING => ShutdownState::Draining,
            _ => ShutdownState::Terminated,
        }
    }

    /// Waits for termination signals and drains on the first one. Signals arriving while the
    /// drain runs are logged and otherwise ignored.
    pub async fn run(self: Arc<Self>) -> Result<(), ShutdownError> {
        let signals = Signals::install()?;
        self.run_with(signals).await
    }

    async fn run_with(self: Arc<Self>, mut signals: Signals) -> Result<(), ShutdownError> {
        let signal = signals.recv().await?;
        let drain = {
            let coordinator = Arc::clone(&self);
            tokio::spawn(async move { coordinator.shutdown(signal).await })
        };
        tokio::pin!(drain);
        loop {
            tokio::select! {
                res = &mut drain => {
                    return res.map_err(|e| ShutdownError::Drain(e.to_string()))?;
                }
                extra = signals.recv() => match extra {
                    Ok(extra) => info!("Received {extra} while draining, already shutting down"),
                    Err(e) => {
                        warn!("{e}");
                        return (&mut drain)
                            .await
                            .map_err(|e| ShutdownError::Drain(e.to_string()))?;
                    }
                },
            }
        }
    }

    /// Spawns `server` and waits for either a signal-driven drain or the server, whichever
    /// ends first. Signal handlers are installed before the server starts.
    ///
    /// The drain cancels the accept loop before closing the event logger, so the server usually
    /// stops first. A clean stop after draining began is a normal shutdown: this waits for the
    /// drain and returns its result. Any other stop drains too and returns
    /// [`ShutdownError::ServerExited`].
    pub async fn supervise<F>(self: Arc<Self>, server: F) -> Result<(), ShutdownError>
    where
        F: Future<Output = ServeResult> + Send + 'static,
    {
        let signals = Signals::install()?;
        let mut server = tokio::spawn(server);
        let signals = Arc::clone(&self).run_with(signals);
        tokio::pin!(signals);

        let stopped = tokio::select! {
            res = &mut signals => return res,
            res = &mut server => res,
        };

        let reason = match stopped {
            Ok(Ok(())) if self.state() != ShutdownState::Running => {
                debug!("HTTP server stopped for shutdown, waiting for drain");
                return tokio::select! {
                    res = &mut signals => res,
                    res = self.shutdown(ShutdownSignal::Terminate) => res,
                };
            }
            Ok(Ok(())) => "accept loop returned".to_string(),
            Ok(Err(e)) => e.to_string(),
            Err(e) => e.to_string(),
        };
        warn!("HTTP server stopped while running, draining event logger");
        if let Err(e) = self.shutdown(ShutdownSignal::Terminate).await {
            error!("{e}");
        }
        Err(ShutdownError::ServerExited(reason))
    }

    /// Starts the drain for `signal` or joins the one already running.
    pub async fn shutdown(&self, signal: ShutdownSignal) -> Result<(), ShutdownError> {
        self.drained
            .get_or_init(|| async {
                self.state.store(DRAINING, Ordering::Release);
                info!("Received {signal}, closing event logger");
                self.cancel.cancel();

                let res = self.event_logger.close().await.map_err(|e| e.to_string());
                match &res {
                    Ok(()) => info!("Event logger drained"),
                    Err(e) => error!("Error draining event logger: {e}"),
                }
                self.state.store(TERMINATED, Ordering::Release);
                res
            })
            .await
            .clone()
            .map_err(ShutdownError::Drain)
    }
}
