//! Worker pool (component I), grounded on the per-thread accept loop in
//! the original project's `nslcd/nslcd.c` (`nslcd_server_start`'s worker
//! threads). Each worker owns one [`DirectorySession`] for its whole
//! lifetime and serves requests off the shared client socket until told
//! to shut down.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, warn};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

use nslcd_config::Config;
use nslcd_directory::{DirectorySession, Invalidator};
use nslcd_proto::Stream as ProtoStream;

use crate::signals::ControlMessage;

/// Bound on a single client request/response exchange, independent of
/// `idle_timelimit` (which governs how long a worker waits for the next
/// connection, not how long one connection's I/O may take).
const CLIENT_IO_TIMEOUT: Duration = Duration::from_secs(60);

/// Counters the admin control channel's `status` command reads.
#[derive(Default)]
pub struct WorkerStats {
    pub active: AtomicUsize,
    pub requests_served: AtomicU64,
}

/// Spawn `count` workers against `listener`, each with its own
/// [`DirectorySession`]. Returns their join handles so the caller can wait
/// out the shutdown grace period.
pub fn spawn(
    count: usize,
    listener: Arc<UnixListener>,
    config: Arc<Config>,
    stats: Arc<WorkerStats>,
    invalidator: Invalidator,
    control_tx: &broadcast::Sender<ControlMessage>,
) -> Vec<tokio::task::JoinHandle<()>> {
    (0..count)
        .map(|id| {
            let listener = Arc::clone(&listener);
            let config = Arc::clone(&config);
            let stats = Arc::clone(&stats);
            let invalidator = invalidator.clone();
            let shutdown_rx = control_tx.subscribe();
            tokio::spawn(async move {
                worker_loop(id, listener, config, stats, invalidator, shutdown_rx).await;
            })
        })
        .collect()
}

async fn worker_loop(
    id: usize,
    listener: Arc<UnixListener>,
    config: Arc<Config>,
    stats: Arc<WorkerStats>,
    invalidator: Invalidator,
    mut shutdown_rx: broadcast::Receiver<ControlMessage>,
) {
    let mut session = match DirectorySession::new(Arc::clone(&config), invalidator) {
        Ok(session) => session,
        Err(e) => {
            error!("worker {id}: failed to create directory session: {e}");
            return;
        }
    };

    loop {
        tokio::select! {
            biased;
            message = shutdown_rx.recv() => {
                match message {
                    Ok(ControlMessage::Shutdown) | Err(broadcast::error::RecvError::Closed) => {
                        debug!("worker {id}: shutting down");
                        return;
                    }
                    Ok(ControlMessage::ReconnectAll) => session.force_reconnect(),
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                }
            }
            _ = idle_tick(config.idle_timelimit) => {
                session.close_if_idle();
            }
            accepted = listener.accept() => {
                let conn = match accepted {
                    Ok((conn, _addr)) => conn,
                    Err(e) => {
                        warn!("worker {id}: accept failed: {e}");
                        continue;
                    }
                };
                stats.active.fetch_add(1, Ordering::Relaxed);
                serve_connection(conn, &config, &mut session).await;
                stats.requests_served.fetch_add(1, Ordering::Relaxed);
                stats.active.fetch_sub(1, Ordering::Relaxed);
                session.touch();
            }
        }
    }
}

/// Resolves after `limit` (re-checked each loop iteration) so the worker
/// periodically closes an idle directory connection even while no new
/// client connects; never resolves when idle closing is disabled.
async fn idle_tick(limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
    }
}

async fn serve_connection(conn: UnixStream, config: &Config, session: &mut DirectorySession) {
    let mut io = ProtoStream::new(conn, CLIENT_IO_TIMEOUT, CLIENT_IO_TIMEOUT);
    let opcode = match nslcd_proto::read_request_header(&mut io).await {
        Ok(opcode) => opcode,
        Err(e) => {
            debug!("discarding connection: {e}");
            return;
        }
    };
    if let Err(e) = crate::handlers::dispatch(&mut io, opcode, config, session).await {
        warn!("handler for {opcode:?} failed: {e}");
        return;
    }
    if let Err(e) = io.flush().await {
        warn!("flushing response for {opcode:?} failed: {e}");
    }
}
