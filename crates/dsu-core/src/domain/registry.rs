//! Client registry: which clients are subscribed, and their packet numbers.
//!
//! # Why a shared registry? (for beginners)
//!
//! A DSU client can subscribe to several slots at once.  Each slot keeps its
//! own list of subscribers, but two things are per *client* rather than per
//! slot:
//!
//! - **Reference count** – how many devices currently stream to this client.
//!   The entry exists exactly while that count is above zero.
//! - **Packet numbers** – every controller-data packet carries a sequence
//!   number.  Clients detect dropped or reordered packets by watching it
//!   increase by one per slot, so the registry keeps one counter per slot for
//!   each client.
//!
//! The registry is owned by the server state and lent (`&mut`) to each
//! virtual device when it needs to register, release or stamp a packet.
//!
//! # Invariant violations
//!
//! Releasing or stamping for a client that is not registered means the
//! bookkeeping between devices and registry has drifted.  Debug builds stop
//! right there with a `debug_assert!`; release builds return
//! [`RegistryError::UnknownClient`] and carry on.

use std::collections::HashMap;

use thiserror::Error;

use crate::protocol::messages::{ClientId, MAX_SLOTS};

/// Errors reported by [`ClientRegistry`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown client: {0:#010X}")]
    UnknownClient(ClientId),

    #[error("slot {0} out of range")]
    SlotOutOfRange(usize),
}

#[derive(Debug, Clone, Default)]
struct ClientEntry {
    ref_count: usize,
    sequences: [u32; MAX_SLOTS],
}

/// Reference-counted client entries with per-slot packet counters.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<ClientId, ClientEntry>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one more device streaming to `id`.
    ///
    /// A new entry starts with every packet counter at zero.
    pub fn add_requester(&mut self, id: ClientId) {
        self.clients.entry(id).or_default().ref_count += 1;
    }

    /// Releases one device's reference to `id`, deleting the entry at zero.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownClient`] if `id` is not registered (debug
    /// builds panic first).
    pub fn remove_requester(&mut self, id: ClientId) -> Result<(), RegistryError> {
        let Some(entry) = self.clients.get_mut(&id) else {
            debug_assert!(false, "unknown client {id:#010X} released");
            return Err(RegistryError::UnknownClient(id));
        };

        entry.ref_count -= 1;
        if entry.ref_count == 0 {
            self.clients.remove(&id);
        }
        Ok(())
    }

    /// Returns the packet number to use for the next packet `id` receives
    /// from `slot`, then advances it.  Wraps at `u32::MAX`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownClient`] if `id` is not registered (debug
    /// builds panic first), [`RegistryError::SlotOutOfRange`] for a slot
    /// outside `0..MAX_SLOTS`.
    pub fn next_sequence(&mut self, id: ClientId, slot: usize) -> Result<u32, RegistryError> {
        let Some(entry) = self.clients.get_mut(&id) else {
            debug_assert!(false, "unknown client {id:#010X} stamped");
            return Err(RegistryError::UnknownClient(id));
        };
        let counter = entry
            .sequences
            .get_mut(slot)
            .ok_or(RegistryError::SlotOutOfRange(slot))?;

        let current = *counter;
        *counter = current.wrapping_add(1);
        Ok(current)
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }

    /// Number of devices currently streaming to `id`; 0 if absent.
    pub fn ref_count(&self, id: ClientId) -> usize {
        self.clients.get(&id).map_or(0, |entry| entry.ref_count)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
