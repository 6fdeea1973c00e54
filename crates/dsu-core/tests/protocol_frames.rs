//! Integration tests for the dsu-core protocol codec and timestamp
//! reconstruction.
//!
//! These tests drive the public API the way the server and a DSU client do:
//! a client encodes a request, the server decodes it and answers through a
//! `Framer`, and the client decodes the answer.

use dsu_core::protocol::codec::{decode_frame, decode_response, encode_frame, encode_request};
use dsu_core::protocol::messages::{
    ControllerData, DataRequest, DeviceModel, Identity, RequestActions, SlotHeader,
    SlotInfoRequest, SlotState, CLIENT_MAGIC, HEADER_SIZE, PROTOCOL_VERSION,
};
use dsu_core::{decode_request, DsuRequest, DsuResponse, Framer, ProtocolError, WrappingTimestamp};
use proptest::prelude::*;

#[test]
fn test_client_request_decodes_on_server_side() {
    // Arrange
    let request = DsuRequest::SlotInfo(SlotInfoRequest {
        slots: vec![0, 1, 2, 3],
    });

    // Act
    let bytes = encode_request(0x1234_5678, &request);
    let decoded = decode_request(&bytes);

    // Assert
    assert_eq!(decoded, Ok((0x1234_5678, request)));
}

#[test]
fn test_server_responses_decode_on_client_side() {
    let framer = Framer::new(0xCAFE_0001);
    let header = SlotHeader {
        slot: 2,
        state: SlotState::Connected,
        model: DeviceModel::PartialGyro,
        connection_type: 0,
        identity: Identity::from_name("Left Joy-Con IMU"),
        battery: 0,
    };
    let responses = [
        DsuResponse::Version(PROTOCOL_VERSION),
        DsuResponse::SlotInfo(header),
        DsuResponse::ControllerData(ControllerData {
            header,
            connected: true,
            packet_number: 99,
            timestamp_us: 1 << 40,
            motion: [0.0, -1.0, 0.0, 1.5, -2.5, 3.5],
        }),
    ];

    for response in responses {
        let bytes = framer.encode(&response);
        let declared = u16::from_le_bytes([bytes[6], bytes[7]]) as usize;

        assert_eq!(declared, bytes.len() - HEADER_SIZE);
        assert_eq!(decode_response(&bytes), Ok((0xCAFE_0001, response)));
    }
}

#[test]
fn test_server_frame_is_not_accepted_as_request() {
    let bytes = Framer::new(1).encode(&DsuResponse::Version(PROTOCOL_VERSION));

    assert!(matches!(decode_request(&bytes), Err(ProtocolError::BadMagic(_))));
}

#[test]
fn test_data_request_subscribe_all() {
    let request = DsuRequest::ControllerData(DataRequest {
        actions: RequestActions(0),
        slot: 0,
        identity: Identity::NONE,
    });

    let (_, decoded) = decode_request(&encode_request(5, &request)).unwrap();

    let DsuRequest::ControllerData(data) = decoded else {
        panic!("expected a data request");
    };
    assert!(data.actions.subscribes_all());
}

proptest! {
    /// Flipping any single bit of a valid request makes it invalid.
    #[test]
    fn prop_any_bit_flip_is_rejected(
        payload in proptest::collection::vec(any::<u8>(), 0..64),
        bit in any::<usize>(),
    ) {
        let mut bytes = encode_frame(CLIENT_MAGIC, 7, 0x10_0002, &payload);
        prop_assert!(decode_frame(&bytes, CLIENT_MAGIC).is_ok());

        let bit = bit % (bytes.len() * 8);
        bytes[bit / 8] ^= 1 << (bit % 8);

        prop_assert!(decode_frame(&bytes, CLIENT_MAGIC).is_err());
    }

    /// A frame re-decodes to exactly the sender, type and payload it carried.
    #[test]
    fn prop_frame_preserves_contents(
        sender in any::<u32>(),
        message_type in any::<u32>(),
        payload in proptest::collection::vec(any::<u8>(), 0..128),
    ) {
        let bytes = encode_frame(CLIENT_MAGIC, sender, message_type, &payload);

        let frame = decode_frame(&bytes, CLIENT_MAGIC).unwrap();

        prop_assert_eq!(frame.sender_id, sender);
        prop_assert_eq!(frame.message_type, message_type);
        prop_assert_eq!(frame.payload, &payload[..]);
    }

    /// A steadily ticking 32-bit counter reconstructs to a non-decreasing
    /// 64-bit timeline, across both the sign flip and the u32 overflow.
    #[test]
    fn prop_wrapping_timestamp_is_monotonic(
        start in any::<u32>(),
        steps in proptest::collection::vec(1u32..2_000_000_000, 1..200),
    ) {
        let mut ts = WrappingTimestamp::new();
        let mut raw = start;
        let mut last = ts.merge(raw);

        for step in steps {
            raw = raw.wrapping_add(step);
            let now = ts.merge(raw);
            prop_assert!(now >= last, "went backwards: {} -> {}", last, now);
            prop_assert_eq!(now as u32, raw);
            last = now;
        }
    }
}
