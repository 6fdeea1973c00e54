//! Protocol module containing message types, the binary codec and the
//! outbound datagram seam.

use std::net::SocketAddr;

pub mod codec;
pub mod messages;

pub use codec::{decode_frame, decode_request, decode_response, encode_frame, encode_request, Framer, ProtocolError};
pub use messages::*;

/// Destination for outbound datagrams.
///
/// Sends are fire-and-forget: implementations must not block and must not
/// report failures back to protocol code.  The server implements this on its
/// UDP socket; tests record what would have been sent.
#[cfg_attr(test, mockall::automock)]
pub trait DatagramSink {
    fn send_datagram(&mut self, datagram: &[u8], dest: SocketAddr);
}

/// A sink that keeps every datagram in memory.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub sent: Vec<(Vec<u8>, SocketAddr)>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains and returns everything sent so far.
    pub fn take(&mut self) -> Vec<(Vec<u8>, SocketAddr)> {
        std::mem::take(&mut self.sent)
    }
}

impl DatagramSink for RecordingSink {
    fn send_datagram(&mut self, datagram: &[u8], dest: SocketAddr) {
        self.sent.push((datagram.to_vec(), dest));
    }
}
