//! Integration tests for the request routing and broadcast pipeline.
//!
//! These tests exercise the application layer of dsu-server end-to-end:
//! wire-format requests in, `ServerState` + mock device bindings, wire-format
//! responses out.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use dsu_core::protocol::{
    decode_response, encode_request, DataRequest, DeviceModel, Identity, RecordingSink,
    RequestActions, SlotHeader, SlotInfoRequest, SlotState, MAX_SLOTS, PROTOCOL_VERSION,
};
use dsu_core::{DatagramSink, DeviceConfig, DsuRequest, DsuResponse, MotionEvent, OrientationProfile};
use dsu_server::application::server_state::ServerState;
use dsu_server::infrastructure::input::mock::{mock_capabilities, MockLink};
use mockall::mock;

// ── Helpers ───────────────────────────────────────────────────────────────────

mock! {
    pub Sink {}

    impl DatagramSink for Sink {
        fn send_datagram(&mut self, datagram: &[u8], dest: SocketAddr);
    }
}

const CLIENT_ID: u32 = 0xC11E;

fn client_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 50123))
}

fn state_with_one_device() -> ServerState<MockLink> {
    ServerState::new(
        vec![DeviceConfig {
            name: "Test IMU".into(),
            profile: OrientationProfile::passthrough(),
        }],
        0xABCD,
    )
    .expect("valid config")
}

/// Binds "Test IMU" with a gyroscope and returns the binding's generation.
fn bind_test_imu(state: &mut ServerState<MockLink>) -> u64 {
    let mut generation = 0;
    state.bind_device("Test IMU", &mock_capabilities(true, false), |slot, gen| {
        generation = gen;
        Ok(MockLink::new(slot, gen))
    });
    generation
}

fn send(state: &mut ServerState<MockLink>, request: &DsuRequest, now: Instant) -> Vec<DsuResponse> {
    let mut sink = RecordingSink::new();
    state.handle_datagram(&encode_request(CLIENT_ID, request), client_addr(), now, &mut sink);
    sink.take()
        .into_iter()
        .map(|(bytes, dest)| {
            assert_eq!(dest, client_addr());
            decode_response(&bytes).expect("server frames decode").1
        })
        .collect()
}

fn subscribe_all() -> DsuRequest {
    DsuRequest::ControllerData(DataRequest {
        actions: RequestActions(0),
        slot: 0,
        identity: Identity::NONE,
    })
}

// ── Slot info ─────────────────────────────────────────────────────────────────

#[test]
fn test_slot_info_for_connected_gyro_slot() {
    // Arrange
    let mut state = state_with_one_device();
    bind_test_imu(&mut state);

    // Act
    let responses = send(
        &mut state,
        &DsuRequest::SlotInfo(SlotInfoRequest { slots: vec![0] }),
        Instant::now(),
    );

    // Assert
    assert_eq!(
        responses,
        vec![DsuResponse::SlotInfo(SlotHeader {
            slot: 0,
            state: SlotState::Connected,
            model: DeviceModel::FullGyro,
            connection_type: 0,
            identity: Identity::from_name("Test IMU"),
            battery: 0,
        })]
    );
}

#[test]
fn test_slot_info_for_unbound_slot_is_all_zero() {
    let mut state = state_with_one_device();

    let responses = send(
        &mut state,
        &DsuRequest::SlotInfo(SlotInfoRequest { slots: vec![0, 3, 9] }),
        Instant::now(),
    );

    // Slot 9 does not exist and gets no reply.
    assert_eq!(
        responses,
        vec![
            DsuResponse::SlotInfo(SlotHeader::empty(0)),
            DsuResponse::SlotInfo(SlotHeader::empty(3)),
        ]
    );
}

// ── Subscriptions ─────────────────────────────────────────────────────────────

#[test]
fn test_subscribe_all_registers_client_on_every_slot() {
    // Arrange
    let mut state = state_with_one_device();

    // Act
    let responses = send(&mut state, &subscribe_all(), Instant::now());

    // Assert
    assert!(responses.is_empty(), "subscription requests are not acknowledged");
    for slot in 0..MAX_SLOTS {
        let device = state.slots().get(slot).expect("slot exists");
        assert!(device.is_subscribed(CLIENT_ID), "slot {slot} must be subscribed");
    }
    assert_eq!(state.registry().ref_count(CLIENT_ID), MAX_SLOTS);
}

#[test]
fn test_resubscribe_does_not_add_references() {
    let mut state = state_with_one_device();
    let now = Instant::now();

    send(&mut state, &subscribe_all(), now);
    send(&mut state, &subscribe_all(), now + Duration::from_secs(1));

    assert_eq!(state.registry().ref_count(CLIENT_ID), MAX_SLOTS);
}

#[test]
fn test_subscribe_by_identity_finds_configured_slot() {
    let mut state = state_with_one_device();

    send(
        &mut state,
        &DsuRequest::ControllerData(DataRequest {
            actions: RequestActions(RequestActions::BY_IDENTITY),
            slot: 0,
            identity: Identity::from_name("Test IMU"),
        }),
        Instant::now(),
    );

    assert!(state.slots().get(0).unwrap().is_subscribed(CLIENT_ID));
    assert_eq!(state.registry().ref_count(CLIENT_ID), 1);
}

// ── Broadcast ─────────────────────────────────────────────────────────────────

#[test]
fn test_sync_broadcasts_with_increasing_packet_numbers() {
    // Arrange
    let mut state = state_with_one_device();
    let generation = bind_test_imu(&mut state);
    let t0 = Instant::now();
    send(&mut state, &subscribe_all(), t0);
    let mut sink = RecordingSink::new();

    // Act
    for i in 0..3u64 {
        state.on_device_event(
            0,
            generation,
            MotionEvent::Sync { time_us: 1_000 * (i + 1) },
            t0 + Duration::from_millis(i),
            &mut sink,
        );
    }

    // Assert
    let packets: Vec<u32> = sink
        .take()
        .into_iter()
        .map(|(bytes, _)| match decode_response(&bytes).expect("decodes").1 {
            DsuResponse::ControllerData(data) => data.packet_number,
            other => panic!("unexpected response {other:?}"),
        })
        .collect();
    assert_eq!(packets, vec![0, 1, 2]);
}

#[test]
fn test_idle_subscriber_is_evicted_at_sync() {
    // Arrange
    let mut state = state_with_one_device();
    let generation = bind_test_imu(&mut state);
    let t0 = Instant::now();
    send(
        &mut state,
        &DsuRequest::ControllerData(DataRequest {
            actions: RequestActions(RequestActions::BY_SLOT),
            slot: 0,
            identity: Identity::NONE,
        }),
        t0,
    );
    assert!(state.registry().contains(CLIENT_ID));
    let mut sink = RecordingSink::new();

    // Act
    state.on_device_event(
        0,
        generation,
        MotionEvent::Sync { time_us: 1 },
        t0 + Duration::from_secs(5),
        &mut sink,
    );

    // Assert
    assert!(sink.take().is_empty(), "evicted subscriber receives nothing");
    assert!(!state.slots().get(0).unwrap().is_subscribed(CLIENT_ID));
    assert!(!state.registry().contains(CLIENT_ID));
}

#[test]
fn test_events_from_stale_binding_are_ignored() {
    // Arrange
    let mut state = state_with_one_device();
    let generation = bind_test_imu(&mut state);
    let t0 = Instant::now();
    send(&mut state, &subscribe_all(), t0);
    state.on_device_lost(0, generation);
    let new_generation = bind_test_imu(&mut state);
    send(&mut state, &subscribe_all(), t0);
    let mut sink = RecordingSink::new();

    // Act
    state.on_device_event(0, generation, MotionEvent::Sync { time_us: 1 }, t0, &mut sink);
    let stale = sink.take();
    state.on_device_event(0, new_generation, MotionEvent::Sync { time_us: 2 }, t0, &mut sink);

    // Assert
    assert!(new_generation > generation);
    assert!(stale.is_empty());
    assert_eq!(sink.take().len(), 1);
}

// ── Mocked sink ───────────────────────────────────────────────────────────────

#[test]
fn test_version_request_sends_exactly_one_reply() {
    // Arrange
    let mut state = state_with_one_device();
    let mut sink = MockSink::new();
    sink.expect_send_datagram()
        .withf(|datagram, dest| {
            *dest == client_addr()
                && matches!(
                    decode_response(datagram),
                    Ok((0xABCD, DsuResponse::Version(PROTOCOL_VERSION)))
                )
        })
        .times(1)
        .return_const(());

    // Act
    state.handle_datagram(
        &encode_request(CLIENT_ID, &DsuRequest::Version),
        client_addr(),
        Instant::now(),
        &mut sink,
    );
}

#[test]
fn test_corrupted_request_gets_no_reply() {
    // Arrange
    let mut state = state_with_one_device();
    let mut sink = MockSink::new();
    sink.expect_send_datagram().never();
    let mut datagram = encode_request(CLIENT_ID, &DsuRequest::Version);
    let last = datagram.len() - 1;
    datagram[last] ^= 0x01;

    // Act
    state.handle_datagram(&datagram, client_addr(), Instant::now(), &mut sink);

    // Assert
    assert!(state.registry().is_empty());
}
