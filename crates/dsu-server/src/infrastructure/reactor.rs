//! The reactor: one loop that owns the server state.
//!
//! # How it fits together (for beginners)
//!
//! ```text
//!   UDP socket ──── datagrams ─────┐
//!   reader tasks ── DeviceMessage ─┼──► select! ──► ServerState ──► UdpSink
//!   udev monitor ── added nodes ───┤
//!   shutdown future ───────────────┘
//! ```
//!
//! Every source is awaited in a single `tokio::select!`, so exactly one event
//! is processed at a time and [`ServerState`] needs no locks.  Device reads
//! happen on their own tasks only because evdev streams are separate file
//! descriptors; the tasks never touch state, they just forward events.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Instant;

use dsu_core::{DeviceConfig, SlotTableError};
use evdev::Device;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::application::bind_devices::BindOutcome;
use crate::application::server_state::ServerState;
use crate::infrastructure::input::evdev_source::{is_motion_device, open_motion_device, probe};
use crate::infrastructure::input::hotplug::HotplugMonitor;
use crate::infrastructure::input::reader::{
    spawn_reader, DeviceLink, DeviceMessage, DeviceReceiver, DeviceSender,
};
use crate::infrastructure::network::udp::{self, TransportError, UdpSink};

/// Receive buffer size.  Requests are at most a few dozen bytes; anything
/// longer is truncated by the kernel and then fails the length check.
const RECV_BUFFER_SIZE: usize = 1024;

/// Error type for starting the reactor.
#[derive(Debug, Error)]
pub enum ReactorError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("invalid device configuration: {0}")]
    Slots(#[from] SlotTableError),
}

/// A bound, not yet running server.
pub struct Reactor {
    state: ServerState<DeviceLink>,
    socket: UdpSocket,
    tx: DeviceSender,
    rx: DeviceReceiver,
}

impl Reactor {
    /// Binds the socket and builds the slot table.
    ///
    /// A fresh random server id is drawn for every process.
    ///
    /// # Errors
    ///
    /// See [`ReactorError`].
    pub async fn bind(addr: SocketAddr, devices: Vec<DeviceConfig>) -> Result<Self, ReactorError> {
        let state = ServerState::new(devices, rand::random::<u32>())?;
        let socket = udp::bind(addr).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Self {
            state,
            socket,
            tx,
            rx,
        })
    }

    /// Address the socket is actually bound to (useful with port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Offers every motion device currently present to the slot table.
    ///
    /// Must be called from within the tokio runtime.
    pub fn bind_present_devices(&mut self) {
        for (path, device) in evdev::enumerate() {
            if is_motion_device(&device) {
                offer_device(&mut self.state, &self.tx, &path, device);
            }
        }

        for device in self.state.slots().iter().filter(|d| d.is_configured()) {
            if !device.is_connected() {
                info!(slot = device.slot(), name = device.name(), "waiting for device");
            }
        }
    }

    /// Serves requests until `shutdown` completes, then disconnects every
    /// device.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let Reactor {
            mut state,
            socket,
            tx,
            mut rx,
        } = self;

        let mut hotplug = match HotplugMonitor::new() {
            Ok(monitor) => Some(monitor),
            Err(err) => {
                warn!(%err, "hotplug disabled; only devices present at startup will be served");
                None
            }
        };

        if let Ok(addr) = socket.local_addr() {
            info!(%addr, server_id = state.framer().server_id(), "DSU server listening");
        }

        let mut buf = [0u8; RECV_BUFFER_SIZE];
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                received = socket.recv_from(&mut buf) => match received {
                    Ok((len, src)) => {
                        let mut sink = UdpSink(&socket);
                        state.handle_datagram(&buf[..len], src, Instant::now(), &mut sink);
                    }
                    // ICMP errors from earlier sends surface here on Linux.
                    Err(err) => debug!(%err, "recv failed"),
                },

                Some(message) = rx.recv() => {
                    let mut sink = UdpSink(&socket);
                    match message {
                        DeviceMessage::Motion { slot, generation, event } => {
                            state.on_device_event(slot, generation, event, Instant::now(), &mut sink);
                        }
                        DeviceMessage::Lost { slot, generation } => {
                            state.on_device_lost(slot, generation);
                        }
                    }
                }

                added = next_added(&mut hotplug) => match added {
                    Ok(paths) => {
                        for path in paths {
                            match open_motion_device(&path) {
                                Ok(Some(device)) => offer_device(&mut state, &tx, &path, device),
                                Ok(None) => {}
                                Err(err) => debug!(path = %path.display(), %err, "cannot open new input node"),
                            }
                        }
                    }
                    Err(err) => {
                        warn!(%err, "hotplug monitor failed; disabling it");
                        hotplug = None;
                    }
                },

                () = &mut shutdown => break,
            }
        }

        info!("shutting down");
        state.shutdown();
    }
}

/// Awaits the monitor, or forever when there is none.
async fn next_added(monitor: &mut Option<HotplugMonitor>) -> io::Result<Vec<std::path::PathBuf>> {
    match monitor {
        Some(monitor) => monitor.next_added().await,
        None => std::future::pending().await,
    }
}

fn offer_device(
    state: &mut ServerState<DeviceLink>,
    tx: &DeviceSender,
    path: &Path,
    device: Device,
) {
    let name = device.name().unwrap_or_default().to_string();
    let caps = match probe(&device) {
        Ok(caps) => caps,
        Err(err) => {
            debug!(path = %path.display(), %err, "failed to probe motion device");
            return;
        }
    };

    let tx = tx.clone();
    match state.bind_device(&name, &caps, move |slot, generation| {
        spawn_reader(device, slot, generation, tx)
    }) {
        BindOutcome::Bound { slot, model } => {
            info!(slot, name = %name, ?model, path = %path.display(), "device connected");
        }
        BindOutcome::NotConfigured => {
            debug!(name = %name, path = %path.display(), "ignoring unconfigured motion device");
        }
        BindOutcome::AlreadyConnected { .. } | BindOutcome::Failed { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use dsu_core::protocol::{decode_response, encode_request, PROTOCOL_VERSION};
    use dsu_core::{DsuRequest, DsuResponse};
    use tokio::sync::oneshot;

    use super::*;

    #[tokio::test]
    async fn test_reactor_answers_version_and_stops_on_shutdown() {
        // Arrange
        let reactor = Reactor::bind("127.0.0.1:0".parse().unwrap(), Vec::new())
            .await
            .expect("bind");
        let server_addr = reactor.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let exchange = async {
            client
                .send_to(&encode_request(99, &DsuRequest::Version), server_addr)
                .await
                .unwrap();
            let mut buf = [0u8; 64];
            let received =
                tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf)).await;
            stop_tx.send(()).unwrap();
            let (len, _) = received.expect("reply arrives").unwrap();
            decode_response(&buf[..len]).expect("valid frame").1
        };

        // Act
        let ((), response) = tokio::time::timeout(
            Duration::from_secs(5),
            async {
                tokio::join!(
                    reactor.run(async {
                        let _ = stop_rx.await;
                    }),
                    exchange
                )
            },
        )
        .await
        .expect("reactor stops");

        // Assert
        assert_eq!(response, DsuResponse::Version(PROTOCOL_VERSION));
    }

    #[tokio::test]
    async fn test_reactor_rejects_too_many_devices() {
        let devices = (0..5)
            .map(|i| DeviceConfig {
                name: format!("IMU {i}"),
                profile: dsu_core::OrientationProfile::passthrough(),
            })
            .collect();

        let result = Reactor::bind("127.0.0.1:0".parse().unwrap(), devices).await;

        assert!(matches!(result, Err(ReactorError::Slots(SlotTableError::TooManyDevices(5)))));
    }
}
