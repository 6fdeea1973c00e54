//! Binary codec for DSU frames.
//!
//! Wire format (little-endian, packed):
//! ```text
//! [magic:4][version:2][length:2][crc32:4][sender_id:4][msg_type:4][payload:N]
//! ```
//! `length` counts every byte after the 16-byte header.  `crc32` is the
//! standard zlib CRC-32 of the whole frame computed while the CRC field
//! itself holds zero.
//!
//! Decoding is strict: anything that is not a well-formed frame with the
//! expected magic is reported as a [`ProtocolError`].  The server drops such
//! datagrams without replying, so foreign traffic on the port never turns
//! into outbound work.

use std::net::SocketAddr;

use crc::{Crc, CRC_32_ISO_HDLC};
use thiserror::Error;

use crate::protocol::messages::{
    ClientId, ControllerData, DataRequest, DeviceModel, DsuRequest, DsuResponse, Identity,
    MessageType, RequestActions, SlotHeader, SlotInfoRequest, SlotState, CLIENT_MAGIC,
    CONTROLLER_DATA_PAYLOAD_SIZE, DATA_REQUEST_SIZE, ENVELOPE_SIZE, HEADER_SIZE,
    PACKET_NUMBER_OFFSET, PROTOCOL_VERSION, SERVER_MAGIC, SLOT_HEADER_SIZE,
    SLOT_INFO_PAYLOAD_SIZE, STICK_CENTER,
};
use crate::protocol::DatagramSink;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

const CRC_RANGE: std::ops::Range<usize> = 8..12;

/// Errors that can occur while decoding a frame or its payload.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The datagram is shorter than the fixed envelope.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The magic bytes do not identify a frame from the expected peer.
    #[error("unexpected magic {0:02X?}")]
    BadMagic([u8; 4]),

    /// The header carries a protocol version other than [`PROTOCOL_VERSION`].
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u16),

    /// The declared length claims more bytes than the datagram holds.
    #[error("length mismatch: header declares {declared} bytes, datagram has {available}")]
    LengthMismatch { declared: usize, available: usize },

    /// The recomputed checksum differs from the transmitted one.
    #[error("crc mismatch: frame carries 0x{transmitted:08X}, computed 0x{computed:08X}")]
    ChecksumMismatch { transmitted: u32, computed: u32 },

    /// The message type is not one this codec knows.
    #[error("unknown message type: 0x{0:06X}")]
    UnknownMessageType(u32),

    /// The payload is too short or carries an out-of-range value.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// A validated frame borrowed from a receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Header id: the client id for requests, the server id for responses.
    pub sender_id: u32,
    pub message_type: u32,
    /// Bytes after the message-type field, truncated to the declared length.
    pub payload: &'a [u8],
}

// ── Frame layer ───────────────────────────────────────────────────────────────

/// Wraps `payload` in a complete frame and fills in the checksum.
///
/// # Panics
///
/// Panics in debug builds if the payload does not fit the 16-bit length
/// field.  Every message this crate produces is under 100 bytes.
pub fn encode_frame(magic: [u8; 4], sender_id: u32, message_type: u32, payload: &[u8]) -> Vec<u8> {
    let length = 4 + payload.len();
    debug_assert!(length <= u16::MAX as usize, "payload too large for a DSU frame");

    let mut buf = Vec::with_capacity(HEADER_SIZE + length);
    buf.extend_from_slice(&magic);
    buf.extend_from_slice(&PROTOCOL_VERSION.to_le_bytes());
    buf.extend_from_slice(&(length as u16).to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes()); // crc placeholder
    buf.extend_from_slice(&sender_id.to_le_bytes());
    buf.extend_from_slice(&message_type.to_le_bytes());
    buf.extend_from_slice(payload);

    let crc = CRC32.checksum(&buf);
    buf[CRC_RANGE].copy_from_slice(&crc.to_le_bytes());
    buf
}

/// Validates a frame and returns a view of its contents.
///
/// A datagram longer than the declared length is truncated to it; a shorter
/// one is rejected.
///
/// # Errors
///
/// Returns [`ProtocolError`] for every structural defect: short datagram,
/// wrong magic, wrong version, inconsistent length, bad checksum.
pub fn decode_frame(bytes: &[u8], magic: [u8; 4]) -> Result<Frame<'_>, ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let frame_magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
    if frame_magic != magic {
        return Err(ProtocolError::BadMagic(frame_magic));
    }

    let version = read_u16(bytes, 4);
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    let total = HEADER_SIZE + read_u16(bytes, 6) as usize;
    if total < ENVELOPE_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: ENVELOPE_SIZE,
            available: total,
        });
    }
    if bytes.len() < total {
        return Err(ProtocolError::LengthMismatch {
            declared: total - HEADER_SIZE,
            available: bytes.len() - HEADER_SIZE,
        });
    }
    let bytes = &bytes[..total];

    let transmitted = read_u32(bytes, CRC_RANGE.start);
    let mut digest = CRC32.digest();
    digest.update(&bytes[..CRC_RANGE.start]);
    digest.update(&[0u8; 4]);
    digest.update(&bytes[CRC_RANGE.end..]);
    let computed = digest.finalize();
    if computed != transmitted {
        return Err(ProtocolError::ChecksumMismatch {
            transmitted,
            computed,
        });
    }

    Ok(Frame {
        sender_id: read_u32(bytes, 12),
        message_type: read_u32(bytes, 16),
        payload: &bytes[ENVELOPE_SIZE..],
    })
}

// ── Server side ───────────────────────────────────────────────────────────────

/// Builds server frames stamped with this process's instance id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framer {
    server_id: u32,
}

impl Framer {
    pub fn new(server_id: u32) -> Self {
        Self { server_id }
    }

    pub fn server_id(&self) -> u32 {
        self.server_id
    }

    /// Frames an already-encoded payload.
    pub fn frame(&self, message_type: MessageType, payload: &[u8]) -> Vec<u8> {
        encode_frame(SERVER_MAGIC, self.server_id, message_type as u32, payload)
    }

    /// Encodes a complete response datagram.
    pub fn encode(&self, response: &DsuResponse) -> Vec<u8> {
        let payload = encode_response_payload(response);
        self.frame(response.message_type(), &payload)
    }

    /// Encodes `response` and hands it to `sink`.
    pub fn send<S: DatagramSink + ?Sized>(&self, sink: &mut S, dest: SocketAddr, response: &DsuResponse) {
        sink.send_datagram(&self.encode(response), dest);
    }
}

/// Decodes a client datagram into its client id and request.
///
/// # Errors
///
/// Frame-level errors from [`decode_frame`], [`ProtocolError::UnknownMessageType`]
/// for types the server does not handle, and [`ProtocolError::MalformedPayload`]
/// for truncated payloads.
pub fn decode_request(bytes: &[u8]) -> Result<(ClientId, DsuRequest), ProtocolError> {
    let frame = decode_frame(bytes, CLIENT_MAGIC)?;
    let message_type = MessageType::try_from(frame.message_type)
        .map_err(|_| ProtocolError::UnknownMessageType(frame.message_type))?;
    let request = match message_type {
        MessageType::Version => DsuRequest::Version,
        MessageType::SlotInfo => DsuRequest::SlotInfo(decode_slot_info_request(frame.payload)?),
        MessageType::ControllerData => {
            DsuRequest::ControllerData(decode_data_request(frame.payload)?)
        }
    };
    Ok((frame.sender_id, request))
}

// ── Client side ───────────────────────────────────────────────────────────────

/// Encodes a client request.  Used by tests and diagnostic tools.
pub fn encode_request(client_id: ClientId, request: &DsuRequest) -> Vec<u8> {
    let mut payload = Vec::new();
    match request {
        DsuRequest::Version => {}
        DsuRequest::SlotInfo(m) => {
            payload.extend_from_slice(&(m.slots.len() as i32).to_le_bytes());
            payload.extend_from_slice(&m.slots);
        }
        DsuRequest::ControllerData(m) => {
            payload.push(m.actions.0);
            payload.push(m.slot);
            payload.extend_from_slice(&m.identity.to_bytes());
        }
    }
    encode_frame(
        CLIENT_MAGIC,
        client_id,
        request.message_type() as u32,
        &payload,
    )
}

/// Decodes a server datagram into the server id and response.
///
/// # Errors
///
/// Same classes as [`decode_request`].
pub fn decode_response(bytes: &[u8]) -> Result<(u32, DsuResponse), ProtocolError> {
    let frame = decode_frame(bytes, SERVER_MAGIC)?;
    let message_type = MessageType::try_from(frame.message_type)
        .map_err(|_| ProtocolError::UnknownMessageType(frame.message_type))?;
    let p = frame.payload;
    let response = match message_type {
        MessageType::Version => {
            require_len(p, 2, "Version")?;
            DsuResponse::Version(read_u16(p, 0))
        }
        MessageType::SlotInfo => {
            require_len(p, SLOT_INFO_PAYLOAD_SIZE, "SlotInfo")?;
            DsuResponse::SlotInfo(read_slot_header(p)?)
        }
        MessageType::ControllerData => {
            DsuResponse::ControllerData(decode_controller_data(p)?)
        }
    };
    Ok((frame.sender_id, response))
}

// ── Payload encoding ──────────────────────────────────────────────────────────

fn encode_response_payload(response: &DsuResponse) -> Vec<u8> {
    match response {
        DsuResponse::Version(version) => version.to_le_bytes().to_vec(),
        DsuResponse::SlotInfo(header) => {
            let mut buf = vec![0u8; SLOT_INFO_PAYLOAD_SIZE];
            write_slot_header(&mut buf, header);
            buf
        }
        DsuResponse::ControllerData(data) => encode_controller_data(data).to_vec(),
    }
}

/// Writes the 11-byte slot header at the start of `buf`.
pub fn write_slot_header(buf: &mut [u8], h: &SlotHeader) {
    buf[0] = h.slot;
    buf[1] = h.state as u8;
    buf[2] = h.model as u8;
    buf[3] = h.connection_type;
    buf[4..10].copy_from_slice(&h.identity.to_bytes());
    buf[10] = h.battery;
}

/// Encodes a controller-data payload.
///
/// ```text
/// 0   slot header (11)      11  connected        12  packet number (u32)
/// 16  buttons (4, zero)     20  sticks (4, 127)  24  analog buttons + touch (24, zero)
/// 48  timestamp µs (u64)    56  accel X/Y/Z, gyro pitch/yaw/roll (6 × f32)
/// ```
pub fn encode_controller_data(m: &ControllerData) -> [u8; CONTROLLER_DATA_PAYLOAD_SIZE] {
    let mut buf = [0u8; CONTROLLER_DATA_PAYLOAD_SIZE];
    write_slot_header(&mut buf, &m.header);
    buf[11] = u8::from(m.connected);
    buf[PACKET_NUMBER_OFFSET..PACKET_NUMBER_OFFSET + 4]
        .copy_from_slice(&m.packet_number.to_le_bytes());
    buf[20..24].fill(STICK_CENTER);
    buf[48..56].copy_from_slice(&m.timestamp_us.to_le_bytes());
    for (i, value) in m.motion.iter().enumerate() {
        let off = 56 + i * 4;
        buf[off..off + 4].copy_from_slice(&value.to_le_bytes());
    }
    buf
}

// ── Payload decoding ──────────────────────────────────────────────────────────

fn decode_slot_info_request(p: &[u8]) -> Result<SlotInfoRequest, ProtocolError> {
    require_len(p, 5, "SlotInfo request")?;
    let declared = i32::from_le_bytes([p[0], p[1], p[2], p[3]]);
    // Never trust the count beyond the bytes actually present.
    let count = usize::try_from(declared).unwrap_or(0).min(p.len() - 4);
    Ok(SlotInfoRequest {
        slots: p[4..4 + count].to_vec(),
    })
}

fn decode_data_request(p: &[u8]) -> Result<DataRequest, ProtocolError> {
    require_len(p, DATA_REQUEST_SIZE, "ControllerData request")?;
    Ok(DataRequest {
        actions: RequestActions(p[0]),
        slot: p[1],
        identity: read_identity(p, 2),
    })
}

fn read_slot_header(p: &[u8]) -> Result<SlotHeader, ProtocolError> {
    require_len(p, SLOT_HEADER_SIZE, "SlotHeader")?;
    let state = SlotState::try_from(p[1])
        .map_err(|_| ProtocolError::MalformedPayload(format!("unknown slot state: {}", p[1])))?;
    let model = DeviceModel::try_from(p[2])
        .map_err(|_| ProtocolError::MalformedPayload(format!("unknown device model: {}", p[2])))?;
    Ok(SlotHeader {
        slot: p[0],
        state,
        model,
        connection_type: p[3],
        identity: read_identity(p, 4),
        battery: p[10],
    })
}

fn decode_controller_data(p: &[u8]) -> Result<ControllerData, ProtocolError> {
    require_len(p, CONTROLLER_DATA_PAYLOAD_SIZE, "ControllerData")?;
    let mut motion = [0f32; 6];
    for (i, value) in motion.iter_mut().enumerate() {
        *value = f32::from_le_bytes(read_array(p, 56 + i * 4));
    }
    Ok(ControllerData {
        header: read_slot_header(p)?,
        connected: p[11] != 0,
        packet_number: read_u32(p, PACKET_NUMBER_OFFSET),
        timestamp_us: u64::from_le_bytes(read_array(p, 48)),
        motion,
    })
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize, context: &str) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        Err(ProtocolError::MalformedPayload(format!(
            "{context}: need {needed} bytes, got {}",
            buf.len()
        )))
    } else {
        Ok(())
    }
}

/// Callers must have checked the length.
fn read_array<const N: usize>(buf: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[offset..offset + N]);
    out
}

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(read_array(buf, offset))
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(read_array(buf, offset))
}

fn read_identity(buf: &[u8], offset: usize) -> Identity {
    Identity::from_bytes(read_array(buf, offset))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
