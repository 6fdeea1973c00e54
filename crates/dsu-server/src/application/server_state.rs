//! `ServerState`: everything the reactor mutates, in one place.
//!
//! There are no globals.  The reactor owns one `ServerState` and lends it to
//! each use case (`route_requests`, `bind_devices`) for the duration of a
//! single event, so every piece of state has exactly one owner and is only
//! ever touched from the reactor's loop.

use dsu_core::protocol::MAX_SLOTS;
use dsu_core::{ClientRegistry, DeviceConfig, Framer, SlotTable, SlotTableError};

/// Slot table, client registry and frame builder of a running server.
///
/// `H` is the handle type that keeps a bound device's event source alive.
#[derive(Debug)]
pub struct ServerState<H> {
    pub(crate) slots: SlotTable<H>,
    pub(crate) registry: ClientRegistry,
    pub(crate) framer: Framer,
    /// Last generation handed to a device binding.
    pub(crate) generation: u64,
}

impl<H> ServerState<H> {
    /// Builds the state for the configured devices.
    ///
    /// `server_id` is stamped into every outgoing frame; pick a random value
    /// per process so clients can tell a restarted server apart.
    ///
    /// # Errors
    ///
    /// [`SlotTableError`] when more than [`MAX_SLOTS`] devices are configured
    /// or a name repeats.
    pub fn new(devices: Vec<DeviceConfig>, server_id: u32) -> Result<Self, SlotTableError> {
        Ok(Self {
            slots: SlotTable::from_config(devices)?,
            registry: ClientRegistry::new(),
            framer: Framer::new(server_id),
            generation: 0,
        })
    }

    pub fn slots(&self) -> &SlotTable<H> {
        &self.slots
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    pub fn framer(&self) -> &Framer {
        &self.framer
    }

    /// Number of slots with a bound physical device.
    pub fn connected_count(&self) -> usize {
        self.slots.iter().filter(|d| d.is_connected()).count()
    }

    /// Disconnects every device, releasing all subscribers.
    pub fn shutdown(&mut self) {
        for device in self.slots.iter_mut() {
            device.disconnect(&mut self.registry);
        }
        debug_assert!(self.registry.is_empty());
    }
}
