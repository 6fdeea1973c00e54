//! udev hotplug monitor for `/dev/input/event*` nodes.
//!
//! Only *add* notifications matter: removal is noticed by the device's reader
//! task when its next read fails.
//!
//! The udev monitor socket is switched to non-blocking mode and registered
//! with the runtime through [`AsyncFd`], so waiting for hotplug events never
//! blocks the reactor.

use std::io;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;

use thiserror::Error;
use tokio::io::unix::AsyncFd;

/// Error type for the hotplug monitor.
#[derive(Debug, Error)]
pub enum HotplugError {
    #[error("failed to create udev monitor: {0}")]
    Monitor(#[source] io::Error),

    #[error("failed to make udev monitor non-blocking: {0}")]
    NonBlocking(#[source] io::Error),

    #[error("failed to register udev monitor with the runtime: {0}")]
    Register(#[source] io::Error),
}

/// Watches the `input` subsystem for newly added event nodes.
pub struct HotplugMonitor {
    socket: AsyncFd<udev::MonitorSocket>,
}

impl HotplugMonitor {
    /// Creates the monitor.  Must be called from within the tokio runtime.
    ///
    /// # Errors
    ///
    /// See [`HotplugError`].
    pub fn new() -> Result<Self, HotplugError> {
        let socket = udev::MonitorBuilder::new()
            .and_then(|builder| builder.match_subsystem("input"))
            .and_then(|builder| builder.listen())
            .map_err(HotplugError::Monitor)?;

        set_nonblocking(socket.as_raw_fd()).map_err(HotplugError::NonBlocking)?;

        let socket = AsyncFd::new(socket).map_err(HotplugError::Register)?;
        Ok(Self { socket })
    }

    /// Waits until at least one event node has been added and returns the
    /// paths of all nodes added since the last call.
    ///
    /// # Errors
    ///
    /// Readiness errors from the runtime.
    pub async fn next_added(&mut self) -> io::Result<Vec<PathBuf>> {
        loop {
            let mut guard = self.socket.readable_mut().await?;
            let added: Vec<PathBuf> = guard
                .get_inner_mut()
                .iter()
                .filter(|event| matches!(event.event_type(), udev::EventType::Add))
                .filter_map(|event| event.devnode().map(PathBuf::from))
                .filter(|path| is_event_node(path))
                .collect();
            // The monitor was drained until it would block.
            guard.clear_ready();

            if !added.is_empty() {
                return Ok(added);
            }
        }
    }
}

fn set_nonblocking(fd: i32) -> io::Result<()> {
    // SAFETY: `fd` is a valid descriptor owned by the monitor socket for the
    // duration of this call; F_GETFL/F_SETFL do not touch memory.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// `true` for `/dev/input/eventN`; joystick and mouse nodes are skipped.
pub fn is_event_node(path: &std::path::Path) -> bool {
    path.parent() == Some(std::path::Path::new("/dev/input"))
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with("event"))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn test_is_event_node() {
        assert!(is_event_node(Path::new("/dev/input/event5")));
        assert!(!is_event_node(Path::new("/dev/input/js0")));
        assert!(!is_event_node(Path::new("/dev/input/mouse1")));
        assert!(!is_event_node(Path::new("/dev/input/by-id/usb-event-joystick")));
        assert!(!is_event_node(Path::new("/tmp/event0")));
    }
}
