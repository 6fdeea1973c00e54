//! Request routing: one inbound datagram in, zero or more responses out.
//!
//! ```text
//! datagram ──decode──▶ Version        ──▶ reply 1001
//!                      SlotInfo       ──▶ one reply per valid slot
//!                      ControllerData ──▶ subscribe (all / by slot / by identity)
//! ```
//!
//! Anything that does not decode is dropped without a reply and logged only at
//! `trace` level, since the port may see arbitrary traffic.

use std::net::SocketAddr;
use std::time::Instant;

use dsu_core::protocol::{ClientId, DataRequest, SlotInfoRequest, MAX_SLOTS, PROTOCOL_VERSION};
use dsu_core::{decode_request, DatagramSink, DsuRequest, DsuResponse};
use tracing::trace;

use super::server_state::ServerState;

impl<H> ServerState<H> {
    /// Validates and answers one datagram received from `src`.
    pub fn handle_datagram<S: DatagramSink + ?Sized>(
        &mut self,
        bytes: &[u8],
        src: SocketAddr,
        now: Instant,
        sink: &mut S,
    ) {
        match decode_request(bytes) {
            Ok((client_id, request)) => self.route_request(client_id, request, src, now, sink),
            Err(err) => trace!(%src, %err, "dropping datagram"),
        }
    }

    /// Answers an already decoded request.
    pub fn route_request<S: DatagramSink + ?Sized>(
        &mut self,
        client_id: ClientId,
        request: DsuRequest,
        src: SocketAddr,
        now: Instant,
        sink: &mut S,
    ) {
        match request {
            DsuRequest::Version => {
                self.framer
                    .send(sink, src, &DsuResponse::Version(PROTOCOL_VERSION));
            }
            DsuRequest::SlotInfo(query) => self.answer_slot_info(&query, src, sink),
            DsuRequest::ControllerData(subscribe) => self.subscribe(client_id, &subscribe, src, now),
        }
    }

    fn answer_slot_info<S: DatagramSink + ?Sized>(
        &self,
        query: &SlotInfoRequest,
        src: SocketAddr,
        sink: &mut S,
    ) {
        for &slot in &query.slots {
            let Some(device) = self.slots.get(usize::from(slot)) else {
                trace!(%src, slot, "slot-info for invalid slot");
                continue;
            };
            self.framer
                .send(sink, src, &DsuResponse::SlotInfo(device.slot_header()));
        }
    }

    fn subscribe(&mut self, client_id: ClientId, request: &DataRequest, src: SocketAddr, now: Instant) {
        let registry = &mut self.registry;

        if request.actions.subscribes_all() {
            for device in self.slots.iter_mut() {
                device.report_request(client_id, src, now, registry);
            }
            return;
        }

        if request.actions.by_slot() {
            let slot = usize::from(request.slot);
            if slot < MAX_SLOTS {
                if let Some(device) = self.slots.get_mut(slot) {
                    device.report_request(client_id, src, now, registry);
                }
            }
        }

        if request.actions.by_identity() {
            if let Some(device) = self.slots.find_by_identity(request.identity) {
                device.report_request(client_id, src, now, registry);
            }
        }
    }
}
