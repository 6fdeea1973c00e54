//! Binding physical devices to slots, and feeding their events through.
//!
//! # Generations (for beginners)
//!
//! Each device binding runs its own reader task that forwards events over a
//! channel.  When a controller is unplugged and plugged back in, the old
//! task may still have events queued in that channel while the new binding
//! is already live.  To keep those stale events out of the new binding,
//! every binding is given a fresh *generation* number and every forwarded
//! event carries the generation of the binding that produced it.  Events
//! whose generation no longer matches the slot's current handle are
//! dropped.

use std::io;
use std::time::Instant;

use dsu_core::protocol::DeviceModel;
use dsu_core::{ConnectError, DatagramSink, DeviceCapabilities, MotionEvent};
use tracing::{debug, info, warn};

use super::server_state::ServerState;

/// A live device binding: keeps the event source alive until dropped.
pub trait Binding {
    /// Generation assigned when the binding was created.
    fn generation(&self) -> u64;
}

/// Result of offering a physical device to the slot table.
#[derive(Debug)]
pub enum BindOutcome {
    /// The device was bound to `slot`.
    Bound { slot: usize, model: DeviceModel },
    /// No slot is configured for this name.
    NotConfigured,
    /// The configured slot already has a device; the newcomer is ignored.
    AlreadyConnected { slot: usize },
    /// The device was rejected or its event source could not be attached.
    Failed { slot: usize, error: ConnectError },
}

impl<H: Binding> ServerState<H> {
    /// Offers a motion device named `name` to its configured slot.
    ///
    /// `attach` receives the slot and the new binding's generation and must
    /// start forwarding events tagged with both.  It is only called once the
    /// slot is known to be free and the capabilities are acceptable.
    pub fn bind_device<F>(&mut self, name: &str, caps: &DeviceCapabilities, attach: F) -> BindOutcome
    where
        F: FnOnce(usize, u64) -> io::Result<H>,
    {
        let Some(slot) = self.slots.slot_for_name(name) else {
            debug!(name, "motion device not in configuration");
            return BindOutcome::NotConfigured;
        };
        let Some(device) = self.slots.get_mut(slot) else {
            return BindOutcome::NotConfigured;
        };
        if device.is_connected() {
            info!(slot, name, "slot already has a device, ignoring the new one");
            return BindOutcome::AlreadyConnected { slot };
        }

        let generation = self.generation + 1;
        match device.connect(caps, || attach(slot, generation)) {
            Ok(model) => {
                self.generation = generation;
                BindOutcome::Bound { slot, model }
            }
            Err(error) => {
                warn!(slot, name, %error, "failed to connect device");
                BindOutcome::Failed { slot, error }
            }
        }
    }

    /// Applies one event forwarded by the binding of `generation`.
    ///
    /// Events from a binding that is no longer current are discarded.
    pub fn on_device_event<S: DatagramSink + ?Sized>(
        &mut self,
        slot: usize,
        generation: u64,
        event: MotionEvent,
        now: Instant,
        sink: &mut S,
    ) {
        if !self.is_current(slot, generation) {
            return;
        }
        if let Some(device) = self.slots.get_mut(slot) {
            device.handle_event(event, now, &mut self.registry, &self.framer, sink);
        }
    }

    /// Handles loss of the event source of `generation` (unplug, read error).
    pub fn on_device_lost(&mut self, slot: usize, generation: u64) {
        if !self.is_current(slot, generation) {
            return;
        }
        if let Some(device) = self.slots.get_mut(slot) {
            info!(slot, name = device.name(), "device lost");
            device.disconnect(&mut self.registry);
        }
    }

    fn is_current(&self, slot: usize, generation: u64) -> bool {
        self.slots
            .get(slot)
            .and_then(|device| device.handle())
            .is_some_and(|handle| handle.generation() == generation)
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use dsu_core::protocol::RecordingSink;
    use dsu_core::{DeviceConfig, OrientationProfile};

    use super::*;
    use crate::infrastructure::input::mock::{mock_capabilities, MockLink};

    fn state() -> ServerState<MockLink> {
        ServerState::new(
            vec![DeviceConfig {
                name: "Test IMU".into(),
                profile: OrientationProfile::passthrough(),
            }],
            7,
        )
        .unwrap()
    }

    fn subscribe(state: &mut ServerState<MockLink>, now: Instant) {
        let addr = SocketAddr::from(([127, 0, 0, 1], 50000));
        let registry = &mut state.registry;
        state.slots.get_mut(0).unwrap().report_request(1, addr, now, registry);
    }

    #[test]
    fn test_bind_configured_device() {
        // Arrange
        let mut state = state();

        // Act
        let outcome = state.bind_device("Test IMU", &mock_capabilities(true, true), |slot, gen| {
            Ok(MockLink::new(slot, gen))
        });

        // Assert
        assert!(matches!(
            outcome,
            BindOutcome::Bound {
                slot: 0,
                model: DeviceModel::FullGyro
            }
        ));
        assert_eq!(state.connected_count(), 1);
    }

    #[test]
    fn test_bind_unknown_name_is_not_configured() {
        let mut state = state();

        let outcome = state.bind_device("Mouse", &mock_capabilities(true, true), |slot, gen| {
            Ok(MockLink::new(slot, gen))
        });

        assert!(matches!(outcome, BindOutcome::NotConfigured));
    }

    #[test]
    fn test_second_device_with_same_name_is_ignored() {
        // Arrange
        let mut state = state();
        state.bind_device("Test IMU", &mock_capabilities(true, true), |s, g| Ok(MockLink::new(s, g)));

        // Act
        let mut attached = false;
        let outcome = state.bind_device("Test IMU", &mock_capabilities(false, false), |s, g| {
            attached = true;
            Ok(MockLink::new(s, g))
        });

        // Assert
        assert!(matches!(outcome, BindOutcome::AlreadyConnected { slot: 0 }));
        assert!(!attached);
        assert_eq!(
            state.slots().get(0).unwrap().model(),
            DeviceModel::FullGyro,
            "first binding kept"
        );
    }

    #[test]
    fn test_failed_connect_keeps_slot_free() {
        let mut state = state();
        let mut caps = mock_capabilities(true, true);
        caps.axes[0] = None;

        let outcome = state.bind_device("Test IMU", &caps, |s, g| Ok(MockLink::new(s, g)));

        assert!(matches!(
            outcome,
            BindOutcome::Failed {
                error: ConnectError::MissingAccelerometer,
                ..
            }
        ));
        assert_eq!(state.connected_count(), 0);
    }

    #[test]
    fn test_stale_generation_events_are_discarded_after_rebind() {
        // Arrange – bind, lose, rebind
        let mut state = state();
        let now = Instant::now();
        state.bind_device("Test IMU", &mock_capabilities(true, true), |s, g| Ok(MockLink::new(s, g)));
        let old = state.slots().get(0).unwrap().handle().unwrap().generation();
        state.on_device_lost(0, old);
        state.bind_device("Test IMU", &mock_capabilities(true, true), |s, g| Ok(MockLink::new(s, g)));
        let new = state.slots().get(0).unwrap().handle().unwrap().generation();
        subscribe(&mut state, now);
        let mut sink = RecordingSink::new();

        // Act
        state.on_device_event(0, old, MotionEvent::Axis { code: 0, value: 16383 }, now, &mut sink);
        state.on_device_event(0, old, MotionEvent::Sync { time_us: 0 }, now, &mut sink);
        state.on_device_lost(0, old);

        // Assert
        assert_ne!(old, new);
        assert!(sink.sent.is_empty());
        assert_eq!(state.slots().get(0).unwrap().motion()[0], 0.0);
        assert!(state.slots().get(0).unwrap().is_connected(), "stale loss ignored");
    }

    #[test]
    fn test_current_events_are_broadcast() {
        let mut state = state();
        let now = Instant::now();
        state.bind_device("Test IMU", &mock_capabilities(true, true), |s, g| Ok(MockLink::new(s, g)));
        let generation = state.slots().get(0).unwrap().handle().unwrap().generation();
        subscribe(&mut state, now);
        let mut sink = RecordingSink::new();

        state.on_device_event(0, generation, MotionEvent::Sync { time_us: 0 }, now, &mut sink);

        assert_eq!(sink.sent.len(), 1);
    }

    #[test]
    fn test_device_lost_drops_link_and_subscribers() {
        // Arrange
        let mut state = state();
        let now = Instant::now();
        state.bind_device("Test IMU", &mock_capabilities(true, true), |s, g| Ok(MockLink::new(s, g)));
        let link_dropped = state.slots().get(0).unwrap().handle().unwrap().dropped_flag();
        let generation = state.slots().get(0).unwrap().handle().unwrap().generation();
        subscribe(&mut state, now);

        // Act
        state.on_device_lost(0, generation);

        // Assert
        assert!(link_dropped.load(std::sync::atomic::Ordering::SeqCst));
        assert!(state.registry().is_empty());
        assert_eq!(state.connected_count(), 0);
    }
}
