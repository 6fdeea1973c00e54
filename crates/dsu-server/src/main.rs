//! DSU motion server entry point.
//!
//! Serves the motion sensors of Linux game controllers to emulators over the
//! DSU ("cemuhook") UDP protocol.
//!
//! # Usage
//!
//! ```text
//! dsu-server [OPTIONS] <CONFIG>
//!
//! Options:
//!   --list-devices   List accelerometer devices and exit
//!   --port <PORT>    UDP port, overrides the config file
//!   --bind <ADDR>    Bind address, overrides the config file
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable   | Description                      |
//! |------------|----------------------------------|
//! | `DSU_PORT` | Same as `--port`                 |
//! | `DSU_BIND` | Same as `--bind`                 |
//! | `RUST_LOG` | Log filter, `info` when unset    |
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()            -- devices + orientation profiles
//!  └─ Reactor::bind()          -- UDP socket, slot table, random server id
//!  └─ bind_present_devices()   -- evdev::enumerate()
//!  └─ Reactor::run()           -- select! loop until SIGINT / SIGTERM
//! ```

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dsu_server::infrastructure::input::evdev_source::{list_motion_devices, MotionDeviceInfo};
use dsu_server::infrastructure::reactor::Reactor;
use dsu_server::infrastructure::storage::config::load_config;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// DSU (cemuhook) motion server for Linux evdev controllers.
#[derive(Debug, Parser)]
#[command(name = "dsu-server", version)]
struct Cli {
    /// Configuration file (.json or .toml).
    #[arg(required_unless_present = "list_devices")]
    config: Option<PathBuf>,

    /// List accelerometer devices and their axes, then exit.
    #[arg(long)]
    list_devices: bool,

    /// UDP port to listen on.  Overrides `port` in the config file.
    #[arg(long, env = "DSU_PORT")]
    port: Option<u16>,

    /// Address to bind.  Overrides `bind_address` in the config file.
    ///
    /// DSU has no authentication; only bind a non-loopback address on a
    /// trusted network.
    #[arg(long, env = "DSU_BIND")]
    bind: Option<IpAddr>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if cli.list_devices {
        print_devices(&list_motion_devices());
        return Ok(());
    }

    let Some(path) = cli.config else {
        anyhow::bail!("a configuration file is required");
    };
    let mut config = load_config(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(bind) = cli.bind {
        config.bind_address = bind;
    }

    let devices = config
        .device_configs()
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    info!(devices = devices.len(), "configuration loaded");

    let mut reactor = Reactor::bind(config.listen_addr(), devices).await?;
    reactor.bind_present_devices();
    reactor.run(shutdown_signal()).await;

    info!("DSU server stopped");
    Ok(())
}

/// Completes on SIGINT or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => Some(stream),
        Err(err) => {
            tracing::warn!(%err, "cannot listen for SIGTERM");
            None
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                tracing::error!(%err, "failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
            info!("received SIGINT");
        }
        Some(()) = async {
            match terminate.as_mut() {
                Some(stream) => stream.recv().await,
                None => None,
            }
        } => info!("received SIGTERM"),
    }
}

fn print_devices(devices: &[MotionDeviceInfo]) {
    if devices.is_empty() {
        println!("No accelerometer devices found (check read permissions on /dev/input).");
        return;
    }
    for device in devices {
        let caps = &device.capabilities;
        let gyro = if caps.has_gyroscope() { "accel+gyro" } else { "accel" };
        let timestamp = if caps.hardware_timestamp {
            "hardware timestamps"
        } else {
            "software timestamps"
        };
        println!("{}  \"{}\"  [{gyro}, {timestamp}]", device.path.display(), device.name);
        for (axis, info) in ["x", "y", "z", "rx", "ry", "rz"].iter().zip(caps.axes.iter()) {
            if let Some(info) = info {
                println!(
                    "    {axis:<2} min {:>7} max {:>7} res {:>5}",
                    info.minimum, info.maximum, info.resolution
                );
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
