//! Infrastructure layer for the DSU server.
//!
//! Contains OS-facing adapters: evdev input devices and udev hotplug, the UDP
//! socket, the configuration file, and the reactor loop that drives them.
//!
//! **Dependency rule**: this layer may depend on `application` and `dsu_core`,
//! but MUST NOT be imported by the `application` or domain layers.  The one
//! exception is `input::mock`, which the application tests use as a stand-in
//! device.

pub mod input;
pub mod network;
pub mod reactor;
pub mod storage;
