//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for the first of SIGHUP, SIGINT, SIGQUIT, SIGTERM
//! - Stop listening once one arrives
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Every handled signal means graceful shutdown; none reloads config

/// Resolve with the name of the first shutdown signal received.
#[cfg(unix)]
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut quit = signal(SignalKind::quit())?;
    let mut terminate = signal(SignalKind::terminate())?;

    let name = tokio::select! {
        _ = hangup.recv() => "SIGHUP",
        _ = interrupt.recv() => "SIGINT",
        _ = quit.recv() => "SIGQUIT",
        _ = terminate.recv() => "SIGTERM",
    };
    Ok(name)
}

#[cfg(not(unix))]
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
