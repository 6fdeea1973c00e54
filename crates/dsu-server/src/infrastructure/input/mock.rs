//! Mock device binding and capability fixtures for testing.
//!
//! Allows tests to bind "devices" and drive the binding use cases without
//! `/dev/input` access or a running reader task.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use dsu_core::{AxisInfo, DeviceCapabilities};

use crate::application::bind_devices::Binding;

/// Accelerometer range of a typical gamepad IMU: ±4 g at 8192 units per g.
pub const MOCK_ACCEL: AxisInfo = AxisInfo {
    minimum: -32768,
    maximum: 32767,
    resolution: 8192,
};

/// Gyroscope range of a typical gamepad IMU, 1024 units per deg/s.
pub const MOCK_GYRO: AxisInfo = AxisInfo {
    minimum: -2_097_152,
    maximum: 2_097_152,
    resolution: 1024,
};

/// Capabilities of a motion device with or without gyroscope and hardware
/// timestamps.
pub fn mock_capabilities(gyro: bool, hardware_timestamp: bool) -> DeviceCapabilities {
    let gyro_axis = gyro.then_some(MOCK_GYRO);
    DeviceCapabilities {
        axes: [
            Some(MOCK_ACCEL),
            Some(MOCK_ACCEL),
            Some(MOCK_ACCEL),
            gyro_axis,
            gyro_axis,
            gyro_axis,
        ],
        hardware_timestamp,
    }
}

/// A binding that records when it is dropped.
#[derive(Debug)]
pub struct MockLink {
    slot: usize,
    generation: u64,
    dropped: Arc<AtomicBool>,
}

impl MockLink {
    pub fn new(slot: usize, generation: u64) -> Self {
        Self {
            slot,
            generation,
            dropped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Flag set once this link is dropped (i.e. its source deregistered).
    pub fn dropped_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.dropped)
    }
}

impl Binding for MockLink {
    fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for MockLink {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}
