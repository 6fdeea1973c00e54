//! The fixed table of device slots.
//!
//! Slots are created once from the configured device list: configured
//! devices take slots 0, 1, … in order and the rest stay unconfigured.  When
//! a physical device appears, its name is looked up here to find the slot it
//! belongs to.

use std::collections::HashMap;

use thiserror::Error;

use crate::domain::device::VirtualDevice;
use crate::domain::profile::OrientationProfile;
use crate::protocol::messages::{Identity, MAX_SLOTS};

/// A configured device: the exact evdev name to bind, and its orientation.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    pub name: String,
    pub profile: OrientationProfile,
}

/// Errors building a [`SlotTable`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlotTableError {
    #[error("{0} devices configured, at most {MAX_SLOTS} are supported")]
    TooManyDevices(usize),

    #[error("device \"{0}\" is configured twice")]
    DuplicateName(String),
}

/// Every slot's [`VirtualDevice`] plus the name → slot index.
#[derive(Debug)]
pub struct SlotTable<H> {
    devices: Vec<VirtualDevice<H>>,
    by_name: HashMap<String, usize>,
}

impl<H> SlotTable<H> {
    /// Builds the table, assigning slots in configuration order.
    ///
    /// # Errors
    ///
    /// [`SlotTableError`] for more than [`MAX_SLOTS`] devices or a repeated
    /// name.
    pub fn from_config(configs: Vec<DeviceConfig>) -> Result<Self, SlotTableError> {
        if configs.len() > MAX_SLOTS {
            return Err(SlotTableError::TooManyDevices(configs.len()));
        }

        let mut devices = Vec::with_capacity(MAX_SLOTS);
        let mut by_name = HashMap::new();
        for (slot, config) in configs.into_iter().enumerate() {
            if by_name.insert(config.name.clone(), slot).is_some() {
                return Err(SlotTableError::DuplicateName(config.name));
            }
            devices.push(VirtualDevice::new(slot as u8, config.name, config.profile));
        }
        for slot in devices.len()..MAX_SLOTS {
            devices.push(VirtualDevice::unconfigured(slot as u8));
        }

        Ok(Self { devices, by_name })
    }

    /// Slot configured for a device with exactly this name.
    pub fn slot_for_name(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, slot: usize) -> Option<&VirtualDevice<H>> {
        self.devices.get(slot)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut VirtualDevice<H>> {
        self.devices.get_mut(slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VirtualDevice<H>> {
        self.devices.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut VirtualDevice<H>> {
        self.devices.iter_mut()
    }

    /// First configured device carrying `identity`, connected or not.
    pub fn find_by_identity(&mut self, identity: Identity) -> Option<&mut VirtualDevice<H>> {
        self.devices
            .iter_mut()
            .find(|device| device.is_configured() && device.identity() == identity)
    }

    /// Number of configured devices.
    pub fn configured(&self) -> usize {
        self.by_name.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str) -> DeviceConfig {
        DeviceConfig {
            name: name.to_string(),
            profile: OrientationProfile::passthrough(),
        }
    }

    #[test]
    fn test_from_config_assigns_slots_in_order_and_fills_rest() {
        // Arrange / Act
        let table: SlotTable<()> =
            SlotTable::from_config(vec![config("Left IMU"), config("Right IMU")]).unwrap();

        // Assert
        assert_eq!(table.slot_for_name("Left IMU"), Some(0));
        assert_eq!(table.slot_for_name("Right IMU"), Some(1));
        assert_eq!(table.iter().count(), MAX_SLOTS);
        assert_eq!(table.configured(), 2);
        assert!(!table.get(3).unwrap().is_configured());
        assert_eq!(table.get(3).unwrap().slot(), 3);
    }

    #[test]
    fn test_name_lookup_is_exact() {
        let table: SlotTable<()> = SlotTable::from_config(vec![config("Left IMU")]).unwrap();

        assert_eq!(table.slot_for_name("left imu"), None);
        assert_eq!(table.slot_for_name("Left IMU "), None);
        assert_eq!(table.slot_for_name(""), None);
    }

    #[test]
    fn test_from_config_rejects_too_many_devices() {
        let configs = (0..5).map(|i| config(&format!("IMU {i}"))).collect();

        let result: Result<SlotTable<()>, _> = SlotTable::from_config(configs);

        assert_eq!(result.err(), Some(SlotTableError::TooManyDevices(5)));
    }

    #[test]
    fn test_from_config_rejects_duplicate_name() {
        let result: Result<SlotTable<()>, _> =
            SlotTable::from_config(vec![config("IMU"), config("IMU")]);

        assert_eq!(result.err(), Some(SlotTableError::DuplicateName("IMU".into())));
    }

    #[test]
    fn test_find_by_identity_skips_unconfigured_slots() {
        // Arrange
        let mut table: SlotTable<()> = SlotTable::from_config(vec![config("Right IMU")]).unwrap();

        // Act / Assert
        let found = table.find_by_identity(Identity::from_name("Right IMU"));
        assert_eq!(found.map(|d| d.slot()), Some(0));
        assert!(table.find_by_identity(Identity::NONE).is_none());
    }
}
