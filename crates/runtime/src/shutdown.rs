//! SIGINT/SIGTERM handling for the long-running indexing process.

use std::{
    future::Future,
    io,
    pin::Pin,
    task::{Context, Poll},
};

use futures::FutureExt;
use tokio::signal::unix::{Signal, SignalKind};
use tracing::debug;

/// Which signal asked the process to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// SIGINT, usually an operator's ctrl-c.
    Sigint,
    /// SIGTERM from the supervisor.
    Sigterm,
}

/// Future that resolves once the process receives SIGINT or SIGTERM.
pub struct ShutdownSignal {
    interrupt: Pin<Box<dyn Future<Output = io::Result<()>> + Send>>,
    terminate: Signal,
}

impl std::fmt::Debug for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownSignal").finish_non_exhaustive()
    }
}

impl ShutdownSignal {
    /// Install the signal handlers. Must be called from within a tokio
    /// runtime.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            interrupt: Box::pin(tokio::signal::ctrl_c()),
            terminate: tokio::signal::unix::signal(SignalKind::terminate())?,
        })
    }
}

impl Future for ShutdownSignal {
    type Output = Interrupt;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.interrupt.poll_unpin(cx).is_ready() {
            return Poll::Ready(Interrupt::Sigint);
        }
        match this.terminate.poll_recv(cx) {
            Poll::Ready(_) => Poll::Ready(Interrupt::Sigterm),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Drive `fut` to completion unless a shutdown signal arrives first. On
/// signal, `on_shutdown` runs and the process exits cleanly.
pub async fn run_until_shutdown<F, O, C>(fut: F, shutdown: ShutdownSignal, on_shutdown: C) -> O
where
    F: Future<Output = O>,
    C: FnOnce(),
{
    // Boxed to keep the sync loop's large state machine off the stack.
    let mut work = Box::pin(fut);
    tokio::select! {
        result = &mut work => result,
        cause = shutdown => {
            debug!(?cause, "shutdown signal received");
            on_shutdown();
            std::process::exit(0);
        }
    }
}
