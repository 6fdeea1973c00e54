//! Input infrastructure: where motion events come from.
//!
//! On Linux, motion sensors are evdev devices.  This module finds them,
//! probes their axis ranges, reads their events on per-device tasks and
//! watches udev for controllers plugged in while the server runs.
//!
//! # Testability
//!
//! The application layer only sees [`DeviceCapabilities`](dsu_core::DeviceCapabilities),
//! [`MotionEvent`](dsu_core::MotionEvent)s and the
//! [`Binding`](crate::application::bind_devices::Binding) trait; `mock`
//! provides test doubles for all three.

pub mod evdev_source;
pub mod hotplug;
pub mod mock;
pub mod reader;
