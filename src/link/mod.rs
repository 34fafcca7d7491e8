//! Raw link transports.
//!
//! The driver needs exactly one capability from the network stack: send
//! a batch of prebuilt Ethernet frames on a named interface without
//! blocking. Linux does this with an `AF_PACKET` socket and `sendmmsg`;
//! macOS goes through a `/dev/bpf*` device one frame at a time. The
//! implementation is picked at compile time, so the send path is a direct
//! call with no dynamic dispatch.

use crate::error::LinkError;
use crate::wire::WireFrame;
use std::fs;
use std::io;
use std::path::Path;

#[cfg(target_os = "macos")]
mod bpf;
#[cfg(target_os = "linux")]
mod packet;

#[cfg(target_os = "macos")]
pub use bpf::BpfLink as PlatformLink;
#[cfg(target_os = "linux")]
pub use packet::PacketLink as PlatformLink;
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub use unsupported::UnsupportedLink as PlatformLink;

/// Where Linux exposes per-interface state.
pub const SYS_CLASS_NET: &str = "/sys/class/net";

/// Receiver cards need a gigabit link to keep up with a full wall.
pub const MIN_LINK_SPEED_MBPS: i64 = 1000;

/// A bound, ready-to-send raw link.
pub trait LinkTransport {
    /// Offer `frames` to the link without blocking.
    ///
    /// Returns how many frames, counted from the start of the slice, were
    /// accepted. An `Err` means none were; frames are never reordered.
    /// Row payloads are resolved against `device`.
    fn send_batch(&mut self, frames: &[WireFrame], device: &[u8]) -> io::Result<usize>;

    /// Descriptor number (or similar) for log lines. `-1` if there is none.
    fn socket_id(&self) -> i32;
}

/// Open the platform's raw link on `interface`, after checking that the
/// interface is up and fast enough where the platform can tell.
pub fn open_platform_link(interface: &str) -> Result<PlatformLink, LinkError> {
    #[cfg(target_os = "linux")]
    check_link_state(Path::new(SYS_CLASS_NET), interface)?;

    PlatformLink::open(interface)
}

/// Verify `operstate` reads `up` and `speed` is at least gigabit.
///
/// `sys_class_net` is normally [`SYS_CLASS_NET`].
pub fn check_link_state(sys_class_net: &Path, interface: &str) -> Result<(), LinkError> {
    let dir = sys_class_net.join(interface);

    let state = fs::read_to_string(dir.join("operstate")).unwrap_or_default();
    if state.trim() != "up" {
        return Err(LinkError::LinkDown(interface.to_string()));
    }

    // Unreadable or non-numeric speed counts as too slow.
    let speed = fs::read_to_string(dir.join("speed"))
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(0);
    if speed < MIN_LINK_SPEED_MBPS {
        return Err(LinkError::InsufficientBandwidth {
            interface: interface.to_string(),
            speed,
        });
    }

    Ok(())
}

/// Link that accepts everything and sends nothing. Used for dry runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullLink;

impl LinkTransport for NullLink {
    fn send_batch(&mut self, frames: &[WireFrame], _device: &[u8]) -> io::Result<usize> {
        Ok(frames.len())
    }

    fn socket_id(&self) -> i32 {
        -1
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
mod unsupported {
    use super::LinkTransport;
    use crate::error::LinkError;
    use crate::wire::WireFrame;
    use std::io;

    #[derive(Debug)]
    pub struct UnsupportedLink;

    impl UnsupportedLink {
        pub fn open(_interface: &str) -> Result<Self, LinkError> {
            Err(LinkError::Unsupported)
        }
    }

    impl LinkTransport for UnsupportedLink {
        fn send_batch(&mut self, _frames: &[WireFrame], _device: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::Unsupported.into())
        }

        fn socket_id(&self) -> i32 {
            -1
        }
    }
}
