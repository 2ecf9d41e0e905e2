//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGINT, SIGTERM, SIGHUP, SIGUSR1)
//! - Translate signals to internal events
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGINT/SIGTERM trigger the single-shot shutdown
//! - SIGUSR1 requests a metrics dump and never terminates
//! - SIGHUP is logged as an unsupported reload; the agent keeps running

use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::{Shutdown, ShutdownReason};
use crate::observability::DumpTrigger;

/// Install the signal handlers and spawn the task translating them.
///
/// Registration happens before this returns so no early signal is missed.
#[cfg(unix)]
pub fn spawn_signal_listener(
    shutdown: Shutdown,
    dump: DumpTrigger,
) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let mut user1 = signal(SignalKind::user_defined1())?;

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = interrupt.recv() => {
                    tracing::info!("Caught signal: interrupt");
                    shutdown.trigger(ShutdownReason::Interrupt);
                }
                _ = terminate.recv() => {
                    tracing::info!("Caught signal: terminate");
                    shutdown.trigger(ShutdownReason::Terminate);
                }
                _ = hangup.recv() => {
                    tracing::warn!("Caught signal: hangup; configuration reload is not supported");
                }
                _ = user1.recv() => {
                    dump.trigger();
                }
            }
        }
    }))
}

#[cfg(not(unix))]
pub fn spawn_signal_listener(
    shutdown: Shutdown,
    _dump: DumpTrigger,
) -> std::io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                break;
            }
            tracing::info!("Caught signal: interrupt");
            shutdown.trigger(ShutdownReason::Interrupt);
        }
    }))
}

/// Block until a termination request arrives.
pub async fn await_termination(shutdown: &Shutdown) -> ShutdownReason {
    shutdown.wait().await
}
