//! Listener lifecycle: signal interception, connection drain, forced exit.
//!
//! State machine: `Running -> Draining -> (Closed | Forced)`
//!
//! [`Lifecycle`] is the only owner of [`ShutdownState`]. Termination signals
//! reach it over an `mpsc` channel fed by [`listen_for_signals`]; the first one
//! moves the state to `Draining`, tells axum to stop accepting, and arms the
//! drain deadline. Later signals are logged and ignored.
//!
//! [`Lifecycle::run`] then races the server's own drain against that deadline.
//! Whichever finishes first decides the terminal state; the other future is
//! dropped without running any of its side effects.

use std::{fmt, future::IntoFuture, io, net::SocketAddr, time::Duration};

use axum::Router;
use tokio::{
    net::TcpListener,
    sync::{mpsc, watch},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Pending signals beyond this are back-pressured in the listener task.
const SIGNAL_BUFFER: usize = 4;

/// Shutdown progress of the listening server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    /// Accepting and serving connections.
    Running,
    /// No new connections; in-flight requests are finishing.
    Draining,
    /// All connections finished (cleanly or with a close error).
    Closed,
    /// The drain deadline elapsed first; in-flight work is abandoned.
    Forced,
}

impl ShutdownState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Draining => "DRAINING",
            Self::Closed => "CLOSED",
            Self::Forced => "FORCED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Forced)
    }
}

impl fmt::Display for ShutdownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A termination signal. Both trigger identical shutdown behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Terminate,
    Interrupt,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Terminate => "SIGTERM",
            Self::Interrupt => "SIGINT",
        })
    }
}

/// How the shutdown sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every connection finished before the deadline.
    Closed,
    /// The server reported an error while closing.
    CloseFailed,
    /// The deadline elapsed before the drain completed.
    Forced,
}

impl ShutdownOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Closed => 0,
            Self::CloseFailed | Self::Forced => 1,
        }
    }

    pub fn state(self) -> ShutdownState {
        match self {
            Self::Closed | Self::CloseFailed => ShutdownState::Closed,
            Self::Forced => ShutdownState::Forced,
        }
    }
}

/// Owner of the shutdown state machine for one bound listener.
#[derive(Debug)]
pub struct Lifecycle {
    state: watch::Sender<ShutdownState>,
    drain: CancellationToken,
    drain_timeout: Duration,
}

impl Lifecycle {
    /// Create a controller in the `Running` state. Call after the socket is bound.
    pub fn new(drain_timeout: Duration) -> Self {
        let (state, _) = watch::channel(ShutdownState::Running);
        Self {
            state,
            drain: CancellationToken::new(),
            drain_timeout,
        }
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    /// Read-only view of the state, for readiness reporting.
    pub fn subscribe(&self) -> watch::Receiver<ShutdownState> {
        self.state.subscribe()
    }

    /// Enter `Draining` in response to `signal`.
    ///
    /// Returns `false` without side effects when a shutdown is already under way.
    pub fn begin_drain(&self, signal: Signal) -> bool {
        let entered = self.state.send_if_modified(|state| {
            if *state == ShutdownState::Running {
                *state = ShutdownState::Draining;
                true
            } else {
                false
            }
        });

        if entered {
            info!(
                %signal,
                timeout_secs = self.drain_timeout.as_secs_f64(),
                "received signal, starting graceful shutdown"
            );
            self.drain.cancel();
        } else {
            warn!(%signal, state = %self.state(), "shutdown already in progress, ignoring signal");
        }
        entered
    }

    /// Record the terminal state. Only the first call has any effect.
    fn finish(&self, outcome: ShutdownOutcome) {
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = outcome.state();
                true
            }
        });
    }

    /// Serve `app` on `listener` until a signal arrives and the drain ends.
    pub async fn run(
        &self,
        listener: TcpListener,
        app: Router,
        mut signals: mpsc::Receiver<Signal>,
    ) -> ShutdownOutcome {
        let drain = self.drain.clone();
        let server = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { drain.cancelled().await })
        .into_future();
        tokio::pin!(server);

        let deadline = self.drain_deadline();
        tokio::pin!(deadline);

        let outcome = loop {
            tokio::select! {
                Some(signal) = signals.recv() => {
                    self.begin_drain(signal);
                }
                result = &mut server => break match result {
                    Ok(()) => {
                        info!("server closed, all connections drained");
                        ShutdownOutcome::Closed
                    }
                    Err(e) => {
                        error!(error = %e, "error during graceful shutdown");
                        ShutdownOutcome::CloseFailed
                    }
                },
                () = &mut deadline => {
                    error!(
                        timeout_secs = self.drain_timeout.as_secs_f64(),
                        "connections did not drain in time, forcing shutdown"
                    );
                    break ShutdownOutcome::Forced;
                }
            }
        };

        self.finish(outcome);
        outcome
    }

    /// Completes `drain_timeout` after the state first leaves `Running`.
    ///
    /// Armed once; repeated signals do not restart it.
    async fn drain_deadline(&self) {
        let mut state = self.subscribe();
        if state
            .wait_for(|s| *s != ShutdownState::Running)
            .await
            .is_err()
        {
            return std::future::pending().await;
        }
        tokio::time::sleep(self.drain_timeout).await;
    }
}

/// Forward SIGTERM and SIGINT into a channel for [`Lifecycle::run`].
///
/// Handlers are installed before this returns, so a signal arriving right
/// after startup is never lost to the default disposition.
#[cfg(unix)]
pub fn listen_for_signals() -> io::Result<mpsc::Receiver<Signal>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);

    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                Some(()) = terminate.recv() => Signal::Terminate,
                Some(()) = interrupt.recv() => Signal::Interrupt,
                else => break,
            };
            if tx.send(received).await.is_err() {
                break;
            }
        }
    });

    Ok(rx)
}

#[cfg(not(unix))]
pub fn listen_for_signals() -> io::Result<mpsc::Receiver<Signal>> {
    let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);

    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(Signal::Interrupt).await.is_err() {
                break;
            }
        }
    });

    Ok(rx)
}
