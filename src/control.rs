//! Admin control channel (component N), grounded verbatim on
//! `create_control_socket`/`CommandoSocket` in this codebase's own
//! `proxmox-rest-server::command_socket`: a peer-credential-gated Unix
//! socket, one command per line as a JSON object, one `OK: <json>` or
//! `ERROR: <message>` line back. Reused here rather than invented afresh
//! because the shape (one-shot command, one-line JSON reply, peer-credential
//! gate) is exactly what an operator control channel needs.

use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::{error, warn};
use nix::sys::socket;
use nix::unistd::Gid;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::broadcast;

use nslcd_config::Config;
use nslcd_directory::Invalidator;

use crate::logging::{self, LogHandle};
use crate::signals::ControlMessage;
use crate::worker::WorkerStats;

/// Shared state the control commands read or act on.
pub struct ControlState {
    pub config: Arc<Config>,
    pub workers: Arc<WorkerStats>,
    pub invalidator: Invalidator,
    pub control_tx: broadcast::Sender<ControlMessage>,
    pub log_handle: LogHandle,
}

fn handle_command(state: &ControlState, command: &str, _args: Option<&Value>) -> Result<Value, anyhow::Error> {
    match command {
        "status" => {
            let uris = state.config.uris.clone();
            let mut entries = Vec::new();
            for i in 0..uris.len() {
                entries.push(json!({
                    "uri": uris.uri_at(i),
                    "hard_fail": uris.should_skip(i, state.config.reconnect_retrytime),
                }));
            }
            Ok(json!({
                "workers": state.workers.active.load(Ordering::Relaxed),
                "requests_served": state.workers.requests_served.load(Ordering::Relaxed),
                "uris": entries,
            }))
        }
        "reconnect" => {
            state.config.uris.force_retry_eligible(state.config.reconnect_retrytime);
            let _ = state.control_tx.send(ControlMessage::ReconnectAll);
            Ok(json!({"reconnected": true}))
        }
        "reload-log-level" => {
            let name = _args
                .and_then(|v| v.get("level"))
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow::anyhow!("missing \"level\" argument"))?;
            let level = logging::parse_level_name(name).ok_or_else(|| anyhow::anyhow!("unknown log level {name:?}"))?;
            state.log_handle.set_level(level);
            Ok(json!({"level": name}))
        }
        other => anyhow::bail!("unknown command {other:?}"),
    }
}

/// Bind `path` and serve admin commands until the process exits. Every
/// connection is checked against the peer's credentials before its first
/// byte is read: only uid 0 or a peer sharing `gid` may proceed.
pub async fn spawn(path: impl Into<PathBuf>, gid: Gid, state: Arc<ControlState>) -> anyhow::Result<()> {
    let path = path.into();
    if path.exists() {
        std::fs::remove_file(&path).ok();
    }
    let listener = UnixListener::bind(&path)?;
    std::fs::set_permissions(&path, std::os::unix::fs::PermissionsExt::from_mode(0o660))?;

    tokio::spawn(async move {
        loop {
            let (conn, _addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    warn!("admin socket accept failed: {err}");
                    continue;
                }
            };
            if !peer_is_authorized(&conn, gid) {
                warn!("rejected admin connection from unauthorized peer");
                continue;
            }
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                if let Err(err) = serve_one(conn, &state).await {
                    warn!("admin connection error: {err}");
                }
            });
        }
    });
    Ok(())
}

fn peer_is_authorized(conn: &tokio::net::UnixStream, gid: Gid) -> bool {
    let opt = socket::sockopt::PeerCredentials {};
    match socket::getsockopt(conn.as_raw_fd(), opt) {
        Ok(cred) => cred.uid() == 0 || Gid::from_raw(cred.gid()) == gid,
        Err(err) => {
            error!("could not read admin socket peer credentials: {err}");
            false
        }
    }
}

async fn serve_one(conn: tokio::net::UnixStream, state: &ControlState) -> anyhow::Result<()> {
    let (rx, mut tx) = conn.into_split();
    let mut rx = BufReader::new(rx);
    let mut line = String::new();
    loop {
        line.clear();
        if rx.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let response = match line.trim().parse::<Value>() {
            Ok(request) => {
                let command = request.get("command").and_then(|v| v.as_str());
                match command {
                    Some(command) => match handle_command(state, command, request.get("args")) {
                        Ok(result) => format!("OK: {result}\n"),
                        Err(err) => format!("ERROR: {err}\n"),
                    },
                    None => "ERROR: missing \"command\"\n".to_string(),
                }
            }
            Err(err) => format!("ERROR: invalid JSON: {err}\n"),
        };
        tx.write_all(response.as_bytes()).await?;
    }
}
