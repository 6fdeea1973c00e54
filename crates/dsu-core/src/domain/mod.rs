//! Domain entities for the DSU motion server.
//!
//! Everything here is plain state and arithmetic: no sockets, no device
//! files, no clocks read behind the caller's back.  Time comes in as an
//! `Instant` argument and packets leave through the
//! [`DatagramSink`](crate::protocol::DatagramSink) seam, so the whole motion
//! pipeline can be unit-tested on any platform.

/// Axis remapping strings such as `"x+z-y+"`.
pub mod profile;

/// 64-bit reconstruction of the wrapping hardware timestamp.
pub mod timestamp;

/// Per-client reference counts and packet numbers.
pub mod registry;

/// One slot's motion state, subscribers and broadcast.
///
/// See [`device::VirtualDevice`] for the main type.
pub mod device;

/// The fixed slot table.
pub mod slots;
