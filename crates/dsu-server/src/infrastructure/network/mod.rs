//! Network infrastructure for the DSU server.
//!
//! # Sub-modules
//!
//! - **`udp`** – Binds the server's UDP socket and adapts it to the
//!   [`DatagramSink`](dsu_core::DatagramSink) seam used by the protocol code.
//!   Sends never wait: a datagram that cannot be queued right now is dropped,
//!   just as the network itself might drop it.

pub mod udp;
