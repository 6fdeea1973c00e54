//! evdev adapter: finding motion devices and describing what they offer.
//!
//! The kernel exposes a controller's IMU as its own `/dev/input/eventN` node
//! tagged with `INPUT_PROP_ACCELEROMETER`.  Acceleration arrives on
//! `ABS_X..ABS_Z`, angular velocity on `ABS_RX..ABS_RZ`, and drivers with
//! precise sample timing add `MSC_TIMESTAMP` events.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use dsu_core::{AxisInfo, DeviceCapabilities, MotionEvent};
use evdev::{AbsoluteAxisCode, Device, EventSummary, InputEvent, MiscCode, PropType, SynchronizationCode};

/// Physical motion axes in `DeviceCapabilities::axes` order.
pub const MOTION_AXES: [AbsoluteAxisCode; 6] = [
    AbsoluteAxisCode::ABS_X,
    AbsoluteAxisCode::ABS_Y,
    AbsoluteAxisCode::ABS_Z,
    AbsoluteAxisCode::ABS_RX,
    AbsoluteAxisCode::ABS_RY,
    AbsoluteAxisCode::ABS_RZ,
];

/// A motion device found on the system.
#[derive(Debug, Clone)]
pub struct MotionDeviceInfo {
    pub path: PathBuf,
    pub name: String,
    pub capabilities: DeviceCapabilities,
}

/// `true` if the kernel marks this device as an accelerometer.
pub fn is_motion_device(device: &Device) -> bool {
    device.properties().contains(PropType::ACCELEROMETER)
}

/// Opens `path` and returns the device if it is a motion device.
///
/// # Errors
///
/// I/O errors from opening the node.  A device that is not a motion device
/// yields `Ok(None)`.
pub fn open_motion_device(path: &Path) -> io::Result<Option<Device>> {
    let device = Device::open(path)?;
    Ok(is_motion_device(&device).then_some(device))
}

/// Snapshot of the motion axes and timestamp channel of `device`.
///
/// # Errors
///
/// The ioctl reading the axis ranges can fail on a device being removed.
pub fn probe(device: &Device) -> io::Result<DeviceCapabilities> {
    let abs_state = device.get_abs_state()?;
    let supported = device.supported_absolute_axes();

    let mut caps = DeviceCapabilities::default();
    for (slot, code) in caps.axes.iter_mut().zip(MOTION_AXES) {
        if !supported.is_some_and(|axes| axes.contains(code)) {
            continue;
        }
        if let Some(info) = abs_state.get(usize::from(code.0)) {
            *slot = Some(AxisInfo {
                minimum: info.minimum,
                maximum: info.maximum,
                resolution: info.resolution,
            });
        }
    }
    caps.hardware_timestamp = device
        .misc_properties()
        .is_some_and(|misc| misc.contains(MiscCode::MSC_TIMESTAMP));
    Ok(caps)
}

/// Lists every motion device currently present.
pub fn list_motion_devices() -> Vec<MotionDeviceInfo> {
    evdev::enumerate()
        .filter(|(_, device)| is_motion_device(device))
        .filter_map(|(path, device)| {
            let capabilities = probe(&device).ok()?;
            Some(MotionDeviceInfo {
                name: device.name().unwrap_or("<unnamed>").to_string(),
                path,
                capabilities,
            })
        })
        .collect()
}

/// Translates a raw evdev event into the subset the motion pipeline uses.
pub fn translate(event: &InputEvent) -> Option<MotionEvent> {
    match event.destructure() {
        EventSummary::AbsoluteAxis(_, code, value) => Some(MotionEvent::Axis {
            code: code.0,
            value,
        }),
        // The counter is unsigned on the device side; the field is just signed.
        EventSummary::Misc(_, MiscCode::MSC_TIMESTAMP, value) => {
            Some(MotionEvent::Timestamp(value as u32))
        }
        EventSummary::Synchronization(_, SynchronizationCode::SYN_REPORT, _) => {
            Some(MotionEvent::Sync {
                time_us: micros_since_epoch(event.timestamp()),
            })
        }
        _ => None,
    }
}

fn micros_since_epoch(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
