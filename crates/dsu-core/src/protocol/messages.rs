//! All DSU protocol message types.
//!
//! The DSU ("cemuhook") protocol is spoken over UDP.  Every datagram starts
//! with a 16-byte header followed by a 4-byte message type and a
//! type-specific payload.  All multi-byte integers are little-endian and the
//! structures are byte-packed (no padding).
//!
//! ```text
//! offset  size  field
//! 0       4     magic        "DSUS" (server → client) / "DSUC" (client → server)
//! 4       2     version      1001
//! 6       2     length       bytes after the header (message type + payload)
//! 8       4     crc32        computed over the whole frame with this field zeroed
//! 12      4     sender id    random per server process / chosen by the client
//! 16      4     message type
//! 20      ..    payload
//! ```

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

// ── Protocol constants ────────────────────────────────────────────────────────

/// The only protocol version this server speaks.
pub const PROTOCOL_VERSION: u16 = 1001;

/// Size of the common frame header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Header plus the mandatory message-type field.
pub const ENVELOPE_SIZE: usize = HEADER_SIZE + 4;

/// Magic carried by frames the server sends.
pub const SERVER_MAGIC: [u8; 4] = *b"DSUS";

/// Magic carried by frames clients send.
pub const CLIENT_MAGIC: [u8; 4] = *b"DSUC";

/// Number of addressable device slots.
pub const MAX_SLOTS: usize = 4;

/// Default UDP port used by DSU clients.
pub const DEFAULT_PORT: u16 = 26760;

/// Encoded size of [`SlotHeader`].
pub const SLOT_HEADER_SIZE: usize = 11;

/// Payload size of a slot-info response: slot header plus one reserved byte.
pub const SLOT_INFO_PAYLOAD_SIZE: usize = SLOT_HEADER_SIZE + 1;

/// Payload size of a controller-data request.
pub const DATA_REQUEST_SIZE: usize = 8;

/// Payload size of a controller-data broadcast.
pub const CONTROLLER_DATA_PAYLOAD_SIZE: usize = 80;

/// Offset of the per-client packet number inside a controller-data payload.
pub const PACKET_NUMBER_OFFSET: usize = 12;

/// Stick value meaning "centered".  The server has no sticks to report.
pub const STICK_CENTER: u8 = 127;

/// Client identifier chosen by the client and carried in the header id field.
pub type ClientId = u32;

// ── Message type codes ────────────────────────────────────────────────────────

/// Message type codes understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageType {
    /// Protocol version query.
    Version = 0x10_0000,
    /// Slot information query.
    SlotInfo = 0x10_0001,
    /// Controller data subscription / broadcast.
    ControllerData = 0x10_0002,
}

impl TryFrom<u32> for MessageType {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, ()> {
        match value {
            0x10_0000 => Ok(MessageType::Version),
            0x10_0001 => Ok(MessageType::SlotInfo),
            0x10_0002 => Ok(MessageType::ControllerData),
            _ => Err(()),
        }
    }
}

// ── Identity ──────────────────────────────────────────────────────────────────

/// A 48-bit device identity, sent where the protocol expects a MAC address.
///
/// Physical motion devices rarely expose a usable MAC, so the identity is
/// derived from the configured device name.  Two distinct names could collide;
/// with at most [`MAX_SLOTS`] devices that is not worth guarding against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Identity(u64);

impl Identity {
    /// Mask selecting the 48 bits that go on the wire.
    pub const MASK: u64 = 0xFFFF_FFFF_FFFF;

    /// The all-zero identity reported for empty slots.
    pub const NONE: Identity = Identity(0);

    /// Builds an identity from a raw value, discarding bits above 48.
    pub fn new(raw: u64) -> Self {
        Self(raw & Self::MASK)
    }

    /// Derives a stable identity from a device name.
    pub fn from_name(name: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Returns the 48-bit value.
    pub fn value(self) -> u64 {
        self.0
    }

    /// Encodes the identity as 6 little-endian bytes.
    pub fn to_bytes(self) -> [u8; 6] {
        let le = self.0.to_le_bytes();
        [le[0], le[1], le[2], le[3], le[4], le[5]]
    }

    /// Decodes 6 little-endian bytes.
    pub fn from_bytes(bytes: [u8; 6]) -> Self {
        let mut le = [0u8; 8];
        le[..6].copy_from_slice(&bytes);
        Self(u64::from_le_bytes(le))
    }
}

// ── Slot header ───────────────────────────────────────────────────────────────

/// Connection state byte of a [`SlotHeader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SlotState {
    #[default]
    Disconnected = 0,
    Reserved = 1,
    Connected = 2,
}

impl TryFrom<u8> for SlotState {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0 => Ok(SlotState::Disconnected),
            1 => Ok(SlotState::Reserved),
            2 => Ok(SlotState::Connected),
            _ => Err(()),
        }
    }
}

/// Device model byte of a [`SlotHeader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DeviceModel {
    /// Slot is empty.
    #[default]
    None = 0,
    /// Accelerometer only.
    PartialGyro = 1,
    /// Accelerometer and gyroscope.
    FullGyro = 2,
}

impl TryFrom<u8> for DeviceModel {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0 => Ok(DeviceModel::None),
            1 => Ok(DeviceModel::PartialGyro),
            2 => Ok(DeviceModel::FullGyro),
            _ => Err(()),
        }
    }
}

/// The 11-byte per-slot description shared by slot-info and controller-data
/// messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotHeader {
    pub slot: u8,
    pub state: SlotState,
    pub model: DeviceModel,
    /// Always 0 ("not applicable"); the server does not know the bus type.
    pub connection_type: u8,
    pub identity: Identity,
    /// Always 0; battery level is not supported.
    pub battery: u8,
}

impl SlotHeader {
    /// Header describing an unbound slot.
    pub fn empty(slot: u8) -> Self {
        Self {
            slot,
            ..Self::default()
        }
    }
}

// ── Client → server requests ─────────────────────────────────────────────────

/// Action bits of a controller-data request.
///
/// No bits set subscribes to every slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestActions(pub u8);

impl RequestActions {
    /// Subscribe the slot named in the request.
    pub const BY_SLOT: u8 = 0x01;
    /// Subscribe the first device whose identity matches the request.
    pub const BY_IDENTITY: u8 = 0x02;

    pub fn subscribes_all(self) -> bool {
        self.0 == 0
    }

    pub fn by_slot(self) -> bool {
        self.0 & Self::BY_SLOT != 0
    }

    pub fn by_identity(self) -> bool {
        self.0 & Self::BY_IDENTITY != 0
    }
}

/// Payload of a slot-info query: which slots the client wants described.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SlotInfoRequest {
    pub slots: Vec<u8>,
}

/// Payload of a controller-data subscription request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataRequest {
    pub actions: RequestActions,
    pub slot: u8,
    pub identity: Identity,
}

/// A decoded client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DsuRequest {
    Version,
    SlotInfo(SlotInfoRequest),
    ControllerData(DataRequest),
}

impl DsuRequest {
    pub fn message_type(&self) -> MessageType {
        match self {
            DsuRequest::Version => MessageType::Version,
            DsuRequest::SlotInfo(_) => MessageType::SlotInfo,
            DsuRequest::ControllerData(_) => MessageType::ControllerData,
        }
    }
}

// ── Server → client responses ────────────────────────────────────────────────

/// Motion sample broadcast to every subscriber of a slot.
///
/// `motion` holds accelerometer X/Y/Z (in g) followed by gyroscope
/// pitch/yaw/roll (in deg/s), already remapped and calibrated.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControllerData {
    pub header: SlotHeader,
    pub connected: bool,
    pub packet_number: u32,
    pub timestamp_us: u64,
    pub motion: [f32; 6],
}

/// A server response.
#[derive(Debug, Clone, PartialEq)]
pub enum DsuResponse {
    Version(u16),
    SlotInfo(SlotHeader),
    ControllerData(ControllerData),
}

impl DsuResponse {
    pub fn message_type(&self) -> MessageType {
        match self {
            DsuResponse::Version(_) => MessageType::Version,
            DsuResponse::SlotInfo(_) => MessageType::SlotInfo,
            DsuResponse::ControllerData(_) => MessageType::ControllerData,
        }
    }
}
