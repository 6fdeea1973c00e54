//! Per-device reader task.
//!
//! Each bound device gets one task on the reactor's runtime.  It awaits the
//! device's event stream, keeps only the events the motion pipeline cares
//! about, and forwards them over an unbounded channel tagged with the slot
//! and binding generation.  All state changes happen on the reactor side.
//!
//! The task ends by itself when the device goes away (read error), after
//! reporting [`DeviceMessage::Lost`], or when its [`DeviceLink`] is dropped.

use std::io;

use dsu_core::MotionEvent;
use evdev::Device;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::debug;

use super::evdev_source::translate;
use crate::application::bind_devices::Binding;

/// Message from a reader task to the reactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMessage {
    Motion {
        slot: usize,
        generation: u64,
        event: MotionEvent,
    },
    /// The event source failed; the binding is dead.
    Lost { slot: usize, generation: u64 },
}

pub type DeviceSender = UnboundedSender<DeviceMessage>;
pub type DeviceReceiver = UnboundedReceiver<DeviceMessage>;

/// Handle of a running reader task.  Dropping it stops the task.
#[derive(Debug)]
pub struct DeviceLink {
    generation: u64,
    task: JoinHandle<()>,
}

impl Binding for DeviceLink {
    fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for DeviceLink {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Starts forwarding events from `device`.
///
/// Must be called from within the tokio runtime.
///
/// # Errors
///
/// Fails if the device cannot be switched to non-blocking, async reads.
pub fn spawn_reader(
    device: Device,
    slot: usize,
    generation: u64,
    tx: DeviceSender,
) -> io::Result<DeviceLink> {
    let mut stream = device.into_event_stream()?;

    let task = tokio::spawn(async move {
        loop {
            match stream.next_event().await {
                Ok(raw) => {
                    let Some(event) = translate(&raw) else {
                        continue;
                    };
                    let message = DeviceMessage::Motion {
                        slot,
                        generation,
                        event,
                    };
                    if tx.send(message).is_err() {
                        // Reactor is gone.
                        return;
                    }
                }
                Err(err) => {
                    debug!(slot, generation, %err, "device read failed");
                    let _ = tx.send(DeviceMessage::Lost { slot, generation });
                    return;
                }
            }
        }
    });

    Ok(DeviceLink { generation, task })
}
