//! Virtual device: the motion state of one DSU slot.
//!
//! A `VirtualDevice` exists for every slot for the whole lifetime of the
//! server.  When a matching physical device shows up it is *connected*: its
//! axis ranges are read, an event source is attached, and from then on each
//! batch of input events ends in a sync boundary that turns the current
//! motion vector into one controller-data packet per subscriber.
//!
//! ```text
//!   Disconnected ──connect()──▶ Connected { gyro?, hw timestamp? }
//!        ▲                              │
//!        └────── disconnect() ◀─────────┘   (handle lost or teardown)
//! ```
//!
//! The device is generic over `H`, the attached event-source handle.  The
//! server uses a handle whose `Drop` stops the reader task, so dropping the
//! handle is how an event source is deregistered.  Tests use plain values.
//!
//! Nothing here touches the OS: capabilities come in as a
//! [`DeviceCapabilities`] snapshot, events as [`MotionEvent`]s, and packets go
//! out through a [`DatagramSink`].

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::profile::{OrientationProfile, AXIS_COUNT, FIRST_GYRO_AXIS};
use crate::domain::registry::ClientRegistry;
use crate::domain::timestamp::WrappingTimestamp;
use crate::protocol::codec::{encode_controller_data, Framer};
use crate::protocol::messages::{
    ClientId, ControllerData, DeviceModel, Identity, MessageType, SlotHeader, SlotState,
    PACKET_NUMBER_OFFSET,
};
use crate::protocol::DatagramSink;

/// A subscriber that has not renewed its request for this long is dropped at
/// the next sync boundary.
pub const CLIENT_TIMEOUT: Duration = Duration::from_micros(5_000_000);

// ── Inputs ────────────────────────────────────────────────────────────────────

/// Range information of one absolute axis, as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisInfo {
    pub minimum: i32,
    pub maximum: i32,
    /// Units per g (accelerometer) or per deg/s (gyroscope).
    pub resolution: i32,
}

/// What a physical device offers, captured before connecting.
///
/// `axes` is indexed by physical axis: `ABS_X..ABS_Z` then `ABS_RX..ABS_RZ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceCapabilities {
    pub axes: [Option<AxisInfo>; AXIS_COUNT],
    /// The device emits `MSC_TIMESTAMP`.
    pub hardware_timestamp: bool,
}

impl DeviceCapabilities {
    pub fn has_accelerometer(&self) -> bool {
        self.axes[..FIRST_GYRO_AXIS].iter().all(Option::is_some)
    }

    pub fn has_gyroscope(&self) -> bool {
        self.axes[FIRST_GYRO_AXIS..].iter().all(Option::is_some)
    }
}

/// One input event relevant to motion reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionEvent {
    /// Absolute axis update; `code` is the evdev `ABS_*` code.
    Axis { code: u16, value: i32 },
    /// Hardware timestamp sample (`MSC_TIMESTAMP`), in µs.
    Timestamp(u32),
    /// End of an event batch, with the kernel wall-clock time of the batch in µs.
    Sync { time_us: u64 },
}

/// Reasons a physical device could not be connected.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("accelerometer axes not found; device won't work")]
    MissingAccelerometer,

    #[error("failed to attach event source: {0}")]
    Attach(#[from] io::Error),
}

// ── State ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
struct Calibration {
    center: i64,
    resolution: f32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            center: 0,
            resolution: 1.0,
        }
    }
}

impl From<AxisInfo> for Calibration {
    fn from(info: AxisInfo) -> Self {
        let (min, max) = (i64::from(info.minimum), i64::from(info.maximum));
        // A resolution of 0 would divide by zero; treat it as raw units.
        let resolution = if info.resolution == 0 {
            1.0
        } else {
            info.resolution as f32
        };
        Self {
            center: min + (max - min) / 2,
            resolution,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Subscriber {
    address: SocketAddr,
    last_request: Instant,
}

/// Motion state of one slot.
#[derive(Debug)]
pub struct VirtualDevice<H> {
    slot: u8,
    /// Configured device name; empty for an unconfigured slot.
    name: String,
    identity: Identity,
    profile: OrientationProfile,

    handle: Option<H>,
    has_gyro: bool,
    hardware_timestamp: bool,
    calibration: [Calibration; AXIS_COUNT],

    motion: [f32; AXIS_COUNT],
    timestamp: WrappingTimestamp,
    subscribers: HashMap<ClientId, Subscriber>,
}

impl<H> VirtualDevice<H> {
    /// Creates a configured, disconnected device.
    pub fn new(slot: u8, name: impl Into<String>, profile: OrientationProfile) -> Self {
        let name = name.into();
        Self {
            slot,
            identity: Identity::from_name(&name),
            name,
            profile,
            handle: None,
            has_gyro: false,
            hardware_timestamp: false,
            calibration: [Calibration::default(); AXIS_COUNT],
            motion: [0.0; AXIS_COUNT],
            timestamp: WrappingTimestamp::new(),
            subscribers: HashMap::new(),
        }
    }

    /// Creates a slot that no configured device will ever bind to.
    pub fn unconfigured(slot: u8) -> Self {
        let mut device = Self::new(slot, String::new(), OrientationProfile::default());
        device.identity = Identity::NONE;
        device
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn slot(&self) -> u8 {
        self.slot
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_configured(&self) -> bool {
        !self.name.is_empty()
    }

    /// Identity derived from the configured name, whether connected or not.
    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle(&self) -> Option<&H> {
        self.handle.as_ref()
    }

    pub fn model(&self) -> DeviceModel {
        match (self.is_connected(), self.has_gyro) {
            (false, _) => DeviceModel::None,
            (true, false) => DeviceModel::PartialGyro,
            (true, true) => DeviceModel::FullGyro,
        }
    }

    pub fn has_hardware_timestamp(&self) -> bool {
        self.hardware_timestamp
    }

    /// Current remapped, calibrated motion vector.
    pub fn motion(&self) -> [f32; AXIS_COUNT] {
        self.motion
    }

    pub fn timestamp_us(&self) -> u64 {
        self.timestamp.value()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_subscribed(&self, client_id: ClientId) -> bool {
        self.subscribers.contains_key(&client_id)
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Binds a physical device described by `caps`.
    ///
    /// The accelerometer is mandatory; the gyroscope is used only if all
    /// three of its axes are present.  `attach` registers the event source and
    /// is called last, so a failure leaves the device disconnected and
    /// otherwise untouched.  Any previous handle is dropped first; its
    /// subscribers are kept.
    ///
    /// # Errors
    ///
    /// [`ConnectError::MissingAccelerometer`] or the error from `attach`.
    pub fn connect<F>(&mut self, caps: &DeviceCapabilities, attach: F) -> Result<DeviceModel, ConnectError>
    where
        F: FnOnce() -> io::Result<H>,
    {
        self.handle = None;

        if !caps.has_accelerometer() {
            return Err(ConnectError::MissingAccelerometer);
        }

        let has_gyro = caps.has_gyroscope();
        if !has_gyro {
            warn!(slot = self.slot, name = %self.name, "gyroscope not found, only acceleration will be reported");
        }
        if !caps.hardware_timestamp {
            warn!(slot = self.slot, name = %self.name, "no hardware timestamps, falling back to event time");
        }

        let used = if has_gyro { AXIS_COUNT } else { FIRST_GYRO_AXIS };
        let mut calibration = [Calibration::default(); AXIS_COUNT];
        for (cal, info) in calibration.iter_mut().zip(caps.axes.iter()).take(used) {
            if let Some(info) = info {
                *cal = Calibration::from(*info);
            }
        }

        let handle = attach()?;

        self.handle = Some(handle);
        self.has_gyro = has_gyro;
        self.hardware_timestamp = caps.hardware_timestamp;
        self.calibration = calibration;
        self.motion = [0.0; AXIS_COUNT];
        self.timestamp.reset();

        let model = self.model();
        info!(slot = self.slot, name = %self.name, ?model, "device connected");
        Ok(model)
    }

    /// Unbinds the physical device and drops every subscriber.
    ///
    /// Dropping the handle deregisters the event source.  Each subscriber's
    /// registry reference is released.  Calling this again is a no-op.
    pub fn disconnect(&mut self, registry: &mut ClientRegistry) {
        if self.handle.take().is_some() {
            info!(slot = self.slot, name = %self.name, "device disconnected");
        }
        for (client_id, _) in self.subscribers.drain() {
            if let Err(err) = registry.remove_requester(client_id) {
                warn!(slot = self.slot, %err, "registry out of sync on disconnect");
            }
        }
    }

    // ── Subscriptions ─────────────────────────────────────────────────────────

    /// Records a data request from `client_id`.
    ///
    /// A new subscriber takes a registry reference; a repeat request only
    /// refreshes the reply address and the idle timer.
    pub fn report_request(
        &mut self,
        client_id: ClientId,
        address: SocketAddr,
        now: Instant,
        registry: &mut ClientRegistry,
    ) {
        let fresh = Subscriber {
            address,
            last_request: now,
        };
        if self.subscribers.insert(client_id, fresh).is_none() {
            registry.add_requester(client_id);
            debug!(slot = self.slot, client_id, %address, "new subscriber");
        }
    }

    /// Describes this slot for slot-info and controller-data messages.
    pub fn slot_header(&self) -> SlotHeader {
        if !self.is_connected() {
            return SlotHeader::empty(self.slot);
        }
        SlotHeader {
            slot: self.slot,
            state: SlotState::Connected,
            model: self.model(),
            connection_type: 0,
            identity: self.identity,
            battery: 0,
        }
    }

    // ── Event processing ──────────────────────────────────────────────────────

    /// Applies one input event.  A sync boundary broadcasts the current state.
    ///
    /// Events arriving while disconnected are ignored.
    pub fn handle_event<S: DatagramSink + ?Sized>(
        &mut self,
        event: MotionEvent,
        now: Instant,
        registry: &mut ClientRegistry,
        framer: &Framer,
        sink: &mut S,
    ) {
        if !self.is_connected() {
            return;
        }
        match event {
            MotionEvent::Axis { code, value } => self.update_axis(usize::from(code), value),
            MotionEvent::Timestamp(sample) => {
                self.timestamp.merge(sample);
            }
            MotionEvent::Sync { time_us } => self.broadcast(time_us, now, registry, framer, sink),
        }
    }

    fn update_axis(&mut self, physical: usize, raw: i32) {
        let max_axis = if self.has_gyro { AXIS_COUNT } else { FIRST_GYRO_AXIS };
        if physical >= max_axis {
            return;
        }
        let Some((target, inverted)) = self.profile.virtual_axis(physical) else {
            return;
        };

        let cal = self.calibration[physical];
        let mut centered = i64::from(raw) - cal.center;
        if inverted {
            centered = -centered;
        }

        let mut value = centered as f32 / cal.resolution;
        if target >= FIRST_GYRO_AXIS {
            value *= self.profile.gyro_sensitivity();
        }
        self.motion[target] = value;
    }

    fn broadcast<S: DatagramSink + ?Sized>(
        &mut self,
        time_us: u64,
        now: Instant,
        registry: &mut ClientRegistry,
        framer: &Framer,
        sink: &mut S,
    ) {
        if self.subscribers.is_empty() {
            return;
        }
        if !self.hardware_timestamp {
            self.timestamp.set(time_us);
        }

        let mut payload = encode_controller_data(&ControllerData {
            header: self.slot_header(),
            connected: true,
            packet_number: 0,
            timestamp_us: self.timestamp.value(),
            motion: self.motion,
        });

        let slot = self.slot;
        let packet_number = PACKET_NUMBER_OFFSET..PACKET_NUMBER_OFFSET + 4;
        self.subscribers.retain(|&client_id, sub| {
            if now.saturating_duration_since(sub.last_request) >= CLIENT_TIMEOUT {
                debug!(slot, client_id, "subscriber timed out");
                if let Err(err) = registry.remove_requester(client_id) {
                    warn!(slot, %err, "registry out of sync on eviction");
                }
                return false;
            }

            match registry.next_sequence(client_id, usize::from(slot)) {
                Ok(seq) => {
                    payload[packet_number.clone()].copy_from_slice(&seq.to_le_bytes());
                    let datagram = framer.frame(MessageType::ControllerData, &payload);
                    sink.send_datagram(&datagram, sub.address);
                }
                Err(err) => warn!(slot, %err, "registry out of sync on broadcast"),
            }
            true
        });
    }
}
