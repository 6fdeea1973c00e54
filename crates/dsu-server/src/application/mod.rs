//! Application layer use cases for the DSU server.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure motion and protocol rules in `dsu_core`) and the infrastructure
//! (sockets, evdev, udev, config files).
//!
//! Use cases in this layer:
//!
//! - **Orchestrate** domain objects to fulfil a goal (e.g., "answer this
//!   slot-info query" or "bind this newly plugged-in controller").
//! - **Depend on abstractions** (the `DatagramSink` and `Binding` traits)
//!   rather than on a UDP socket or an evdev reader.
//! - **Contain no OS calls**, so every use case runs in plain unit tests.
//!
//! # Sub-modules
//!
//! - **`server_state`**   – The single owner of all mutable server state:
//!   slot table, client registry and frame builder.
//!
//! - **`route_requests`** – Decodes inbound datagrams and answers version,
//!   slot-info and controller-data requests.
//!
//! - **`bind_devices`**   – Binds physical devices to their configured slots
//!   and feeds their events into the right virtual device.

pub mod bind_devices;
pub mod route_requests;
pub mod server_state;
