//! `nslcd-ctl`: a small client for the admin control channel (component
//! N). Connects to the admin socket, sends one JSON command line, and
//! prints whatever `OK: <json>` or `ERROR: <message>` line comes back.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use nslcd::paths::DEFAULT_ADMIN_SOCKET_PATH;

#[derive(Parser, Debug)]
#[command(name = "nslcd-ctl", version)]
struct Cli {
    /// Path to the admin control socket.
    #[arg(short = 's', long, default_value = DEFAULT_ADMIN_SOCKET_PATH)]
    socket: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report worker counts and directory server health.
    Status,
    /// Force every worker to reconnect to the directory, as `SIGUSR1` does.
    Reconnect,
    /// Change the running log level without restarting.
    ReloadLogLevel {
        /// One of off/error/warn/info/debug/trace.
        level: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let request = match &cli.command {
        Command::Status => json!({"command": "status"}),
        Command::Reconnect => json!({"command": "reconnect"}),
        Command::ReloadLogLevel { level } => json!({
            "command": "reload-log-level",
            "args": {"level": level},
        }),
    };

    let stream = UnixStream::connect(&cli.socket)
        .await
        .with_context(|| format!("connecting to {}", cli.socket))?;
    let (rx, mut tx) = stream.into_split();
    tx.write_all(format!("{request}\n").as_bytes()).await?;

    let mut rx = BufReader::new(rx);
    let mut line = String::new();
    rx.read_line(&mut line).await.context("reading response")?;
    print!("{line}");
    if line.trim_start().starts_with("ERROR:") {
        std::process::exit(1);
    }
    Ok(())
}
