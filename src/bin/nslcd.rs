//! Daemon entry point. Wires configuration, the client and admin
//! sockets, the pidfile lock, privilege drop, the worker pool, and the
//! signal loop together in the startup order the process lifecycle
//! design (component M) lays out.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use nix::unistd::Gid;
use tokio::net::UnixListener;
use tokio::sync::broadcast;

use nslcd::control::{self, ControlState};
use nslcd::paths::{DEFAULT_ADMIN_SOCKET_PATH, DEFAULT_CONFIG_PATH, DEFAULT_PIDFILE_PATH, DEFAULT_SOCKET_PATH};
use nslcd::pidfile::PidFile;
use nslcd::privdrop::drop_privileges;
use nslcd::signals;
use nslcd::worker::{self, WorkerStats};
use nslcd_config::{Config, UserSpec};
use nslcd_directory::Invalidator;

/// Local name-service and authentication daemon that proxies NSS/PAM
/// lookups to a directory server.
#[derive(Parser, Debug)]
#[command(name = "nslcd", version)]
struct Cli {
    /// Test the pidfile lock and exit without binding any sockets.
    #[arg(short = 'c', long)]
    check: bool,

    /// Run in the foreground with verbose logging to stderr.
    #[arg(short = 'd', long)]
    debug: bool,

    /// Drop to this uid (name or numeric) after startup, overriding `uid` in the config file.
    #[arg(short = 'u', long, value_name = "UID")]
    uid: Option<String>,

    /// Drop to this gid (name or numeric) after startup, overriding `gid` in the config file.
    #[arg(short = 'g', long, value_name = "GID")]
    gid: Option<String>,

    /// Path to the configuration file.
    #[arg(short = 'f', long = "config", default_value = DEFAULT_CONFIG_PATH)]
    config_path: String,
}

fn parse_user_spec(raw: &str) -> UserSpec {
    match raw.parse::<u32>() {
        Ok(id) => UserSpec::Id(id),
        Err(_) => UserSpec::Name(raw.to_string()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.check {
        return PidFile::check(DEFAULT_PIDFILE_PATH);
    }

    let mut config = Config::parse(&cli.config_path)
        .with_context(|| format!("loading configuration from {}", cli.config_path))?;
    if let Some(uid) = &cli.uid {
        config.run_as = Some(parse_user_spec(uid));
    }
    if let Some(gid) = &cli.gid {
        config.run_as_group = Some(parse_user_spec(gid));
    }
    let log_level = if cli.debug { nslcd_config::LogLevel::Debug } else { config.log_level };
    let log_target = if cli.debug { nslcd_config::LogTarget::None } else { config.log_target.clone() };

    let log_handle = nslcd::logging::init(&log_target, log_level).context("initializing logging")?;
    info!("nslcd starting up");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building the async runtime")?;
    let result = runtime.block_on(run(Arc::new(config), log_handle));
    if let Err(e) = &result {
        error!("fatal: {e}");
    }
    result
}

async fn run(config: Arc<Config>, log_handle: nslcd::logging::LogHandle) -> Result<()> {
    let client_listener = bind_client_socket(DEFAULT_SOCKET_PATH)?;
    let admin_gid = admin_gid(&config);
    let pidfile = PidFile::acquire(DEFAULT_PIDFILE_PATH).context("acquiring pidfile lock")?;
    info!("locked pidfile at {}", pidfile.path().display());

    let invalidator = Invalidator::default();
    let (control_tx, _rx) = broadcast::channel(16);

    let stats = Arc::new(WorkerStats::default());
    let control_state = Arc::new(ControlState {
        config: Arc::clone(&config),
        workers: Arc::clone(&stats),
        invalidator: invalidator.clone(),
        control_tx: control_tx.clone(),
        log_handle,
    });
    control::spawn(DEFAULT_ADMIN_SOCKET_PATH, admin_gid, Arc::clone(&control_state))
        .await
        .context("starting admin control channel")?;

    drop_privileges(config.run_as.as_ref(), config.run_as_group.as_ref()).context("dropping privileges")?;

    let handles = worker::spawn(config.threads, Arc::new(client_listener), Arc::clone(&config), stats, invalidator, &control_tx);
    info!("serving on {DEFAULT_SOCKET_PATH} with {} workers", config.threads);

    signals::spawn(control_tx.clone()).context("installing signal handlers")?;

    let mut shutdown_rx = control_tx.subscribe();
    loop {
        match shutdown_rx.recv().await {
            Ok(signals::ControlMessage::Shutdown) | Err(broadcast::error::RecvError::Closed) => break,
            Ok(signals::ControlMessage::ReconnectAll) => continue,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
        }
    }

    info!("shutting down");
    let grace = std::time::Duration::from_secs(5);
    let abort_handles: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
    match tokio::time::timeout(grace, futures::future::join_all(handles)).await {
        Ok(_) => info!("all workers exited cleanly"),
        Err(_) => {
            error!("workers did not exit within the grace period, aborting the rest");
            for handle in abort_handles {
                handle.abort();
            }
        }
    }
    Ok(())
}

fn bind_client_socket(path: &str) -> Result<UnixListener> {
    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    if path.exists() {
        std::fs::remove_file(path).ok();
    }
    let listener = UnixListener::bind(path).with_context(|| format!("binding {}", path.display()))?;
    std::fs::set_permissions(path, std::os::unix::fs::PermissionsExt::from_mode(0o666))
        .with_context(|| format!("setting permissions on {}", path.display()))?;
    Ok(listener)
}

/// The gid the admin control socket trusts, beyond uid 0: the daemon's
/// own configured run-as group if set, otherwise its real gid.
fn admin_gid(config: &Config) -> Gid {
    match &config.run_as_group {
        Some(UserSpec::Id(id)) => Gid::from_raw(*id),
        Some(UserSpec::Name(name)) => nix::unistd::Group::from_name(name)
            .ok()
            .flatten()
            .map(|g| g.gid)
            .unwrap_or_else(Gid::current),
        None => Gid::current(),
    }
}
