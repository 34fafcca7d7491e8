//! macOS `/dev/bpf*` transport.
//!
//! BPF has no batched write, so frames are written one at a time and the
//! batch stops at the first short or failed write.

use super::LinkTransport;
use crate::error::LinkError;
use crate::wire::WireFrame;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::AsRawFd;

/// `_IOW('B', 108, struct ifreq)`
const BIOCSETIF: libc::c_ulong = 0x8020_426c;
/// `_IOW('B', 117, u_int)`
const BIOCSHDRCMPLT: libc::c_ulong = 0x8004_4275;

const MAX_BPF_DEVICES: usize = 255;

#[repr(C)]
struct IfReq {
    name: [libc::c_char; libc::IFNAMSIZ],
    data: [u8; 16],
}

/// BPF device attached to one interface, with header completion on so
/// our source address goes out unchanged.
#[derive(Debug)]
pub struct BpfLink {
    device: File,
    scratch: Vec<u8>,
}

impl BpfLink {
    pub fn open(interface: &str) -> Result<Self, LinkError> {
        let mut last_err = io::Error::from(io::ErrorKind::NotFound);
        let mut device = None;
        for i in 0..MAX_BPF_DEVICES {
            match OpenOptions::new()
                .read(true)
                .write(true)
                .open(format!("/dev/bpf{i}"))
            {
                Ok(file) => {
                    device = Some(file);
                    break;
                }
                Err(e) => last_err = e,
            }
        }
        let Some(device) = device else {
            return Err(LinkError::OpenFailed {
                interface: interface.to_string(),
                source: last_err,
            });
        };

        let bind_err = |source: io::Error| LinkError::BindFailed {
            interface: interface.to_string(),
            source,
        };

        let mut req = IfReq {
            name: [0; libc::IFNAMSIZ],
            data: [0; 16],
        };
        let name = interface.as_bytes();
        if name.len() >= libc::IFNAMSIZ || name.contains(&0) {
            return Err(bind_err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid interface name",
            )));
        }
        for (dst, &src) in req.name.iter_mut().zip(name) {
            *dst = src as libc::c_char;
        }

        let fd = device.as_raw_fd();
        if unsafe { libc::ioctl(fd, BIOCSETIF, &req as *const IfReq) } < 0 {
            return Err(bind_err(io::Error::last_os_error()));
        }
        let yes: libc::c_uint = 1;
        if unsafe { libc::ioctl(fd, BIOCSHDRCMPLT, &yes as *const libc::c_uint) } < 0 {
            tracing::warn!(
                "BIOCSHDRCMPLT failed on {}: {}",
                interface,
                io::Error::last_os_error()
            );
        }

        tracing::debug!("bound bpf device {} to {}", fd, interface);

        Ok(Self {
            device,
            scratch: Vec::with_capacity(1514),
        })
    }
}

impl LinkTransport for BpfLink {
    fn send_batch(&mut self, frames: &[WireFrame], device: &[u8]) -> io::Result<usize> {
        for (i, frame) in frames.iter().enumerate() {
            self.scratch.clear();
            self.scratch.extend_from_slice(frame.header());
            self.scratch.extend_from_slice(frame.payload(device));

            match self.device.write(&self.scratch) {
                Ok(n) if n == self.scratch.len() => {}
                Ok(_) => return Ok(i),
                Err(e) if i == 0 => return Err(e),
                Err(_) => return Ok(i),
            }
        }
        Ok(frames.len())
    }

    fn socket_id(&self) -> i32 {
        self.device.as_raw_fd()
    }
}
