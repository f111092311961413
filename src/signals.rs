//! Signal-to-message translation (§4.M/§9 "signal handling" design note):
//! signal handlers never touch daemon state directly; each one only wakes
//! a `tokio::signal` stream, which this task turns into a
//! [`ControlMessage`] broadcast every other task subscribes to. `SIGPIPE`
//! needs no handling here: Rust's runtime already sets it to `SIG_IGN`
//! before `main` runs.

use log::info;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    Shutdown,
    ReconnectAll,
}

/// Spawn the task that listens for `HUP`/`INT`/`QUIT`/`TERM`/`ABRT`
/// (graceful shutdown) and `USR1` (immediate reconnect), publishing each as
/// a [`ControlMessage`] on `tx`.
pub fn spawn(tx: broadcast::Sender<ControlMessage>) -> anyhow::Result<()> {
    let mut hup = signal(SignalKind::hangup())?;
    let mut int = signal(SignalKind::interrupt())?;
    let mut quit = signal(SignalKind::quit())?;
    let mut term = signal(SignalKind::terminate())?;
    // SIGABRT has no named `SignalKind` constant upstream; build it from its raw number.
    let mut abrt = signal(SignalKind::from_raw(libc::SIGABRT))?;
    let mut usr1 = signal(SignalKind::user_defined1())?;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = hup.recv() => {
                    info!("received SIGHUP, shutting down");
                    let _ = tx.send(ControlMessage::Shutdown);
                    break;
                }
                _ = int.recv() => {
                    info!("received SIGINT, shutting down");
                    let _ = tx.send(ControlMessage::Shutdown);
                    break;
                }
                _ = quit.recv() => {
                    info!("received SIGQUIT, shutting down");
                    let _ = tx.send(ControlMessage::Shutdown);
                    break;
                }
                _ = term.recv() => {
                    info!("received SIGTERM, shutting down");
                    let _ = tx.send(ControlMessage::Shutdown);
                    break;
                }
                _ = abrt.recv() => {
                    info!("received SIGABRT, shutting down");
                    let _ = tx.send(ControlMessage::Shutdown);
                    break;
                }
                _ = usr1.recv() => {
                    info!("received SIGUSR1, forcing reconnect of all directory servers");
                    let _ = tx.send(ControlMessage::ReconnectAll);
                }
            }
        }
    });
    Ok(())
}
