//! # dsu-core
//!
//! Shared library for the DSU motion server containing the protocol codec and
//! the motion domain (orientation profiles, client registry, virtual devices
//! and the slot table).
//!
//! It has no dependencies on sockets, device files or an async runtime.
//!
//! # Architecture overview (for beginners)
//!
//! DSU (also known as "cemuhook") is a small UDP protocol that emulators use
//! to receive accelerometer and gyroscope data from a controller.  The server
//! owns up to four *slots*; a client asks which slots are occupied and then
//! subscribes to the ones it wants.  From then on, every time the controller
//! reports a new motion sample, the server sends the client a packet.
//!
//! This crate (`dsu-core`) is the part of the server that does not care where
//! bytes come from:
//!
//! - **`protocol`** – How bytes travel over the network.  Requests and
//!   responses are encoded into a 20-byte envelope (header + message type)
//!   plus payload, protected by a CRC-32.
//!
//! - **`domain`** – Motion state.  A `VirtualDevice` turns raw axis values
//!   into calibrated, remapped motion and fans each sample out to its
//!   subscribers; the `ClientRegistry` tracks which clients are alive and
//!   numbers their packets.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `dsu_core::VirtualDevice` instead of `dsu_core::domain::device::VirtualDevice`.
pub use domain::device::{
    AxisInfo, ConnectError, DeviceCapabilities, MotionEvent, VirtualDevice, CLIENT_TIMEOUT,
};
pub use domain::profile::{OrientationProfile, ProfileError, SensorGroup};
pub use domain::registry::{ClientRegistry, RegistryError};
pub use domain::slots::{DeviceConfig, SlotTable, SlotTableError};
pub use domain::timestamp::WrappingTimestamp;
pub use protocol::codec::{decode_request, Framer, ProtocolError};
pub use protocol::messages::{DsuRequest, DsuResponse};
pub use protocol::DatagramSink;
