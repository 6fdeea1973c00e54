//! UDP transport.
//!
//! # How DSU uses UDP (for beginners)
//!
//! UDP is connectionless: every datagram carries its own destination and
//! nothing is retransmitted.  That suits motion data well, since a lost sample
//! is superseded a few milliseconds later anyway.  The server therefore
//! never waits for a send to complete; if the socket's send buffer is full the
//! datagram is dropped and the next sample goes out as normal.

use std::io;
use std::net::SocketAddr;

use dsu_core::DatagramSink;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::trace;

/// Error type for binding the server socket.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Another process already owns the address.
    #[error(
        "UDP {addr} is already in use; is another DSU server running? \
         Stop it or pick a different port with --port"
    )]
    AddrInUse { addr: SocketAddr },

    /// Any other bind failure.
    #[error("failed to bind UDP socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Binds the server socket on `addr`.
///
/// # Errors
///
/// [`TransportError::AddrInUse`] when the port is taken, otherwise
/// [`TransportError::BindFailed`].
pub async fn bind(addr: SocketAddr) -> Result<UdpSocket, TransportError> {
    UdpSocket::bind(addr).await.map_err(|source| match source.kind() {
        io::ErrorKind::AddrInUse => TransportError::AddrInUse { addr },
        _ => TransportError::BindFailed { addr, source },
    })
}

/// [`DatagramSink`] over a tokio UDP socket, fire-and-forget.
#[derive(Debug, Clone, Copy)]
pub struct UdpSink<'a>(pub &'a UdpSocket);

impl DatagramSink for UdpSink<'_> {
    fn send_datagram(&mut self, datagram: &[u8], dest: SocketAddr) {
        if let Err(err) = self.0.try_send_to(datagram, dest) {
            trace!(%dest, %err, "datagram dropped");
        }
    }
}
