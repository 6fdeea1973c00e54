//! Storage infrastructure: the configuration file.
//!
//! The `config` sub-module reads the device list and orientation profiles
//! from JSON (the historic format) or TOML, and turns them into the
//! validated [`DeviceConfig`](dsu_core::DeviceConfig)s the slot table is
//! built from.  The server never writes configuration back.

pub mod config;
