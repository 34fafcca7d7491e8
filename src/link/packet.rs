//! Linux `AF_PACKET` transport.

use super::LinkTransport;
use crate::error::LinkError;
use crate::wire::{DEST_MAC, WireFrame};
use std::ffi::CString;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

/// Raw packet socket bound to one interface.
pub struct PacketLink {
    fd: OwnedFd,
    // Scratch space for sendmmsg; emptied after every call so no pointer
    // outlives the frames it was built from.
    iovecs: Vec<libc::iovec>,
    msgs: Vec<libc::mmsghdr>,
}

impl PacketLink {
    pub fn open(interface: &str) -> Result<Self, LinkError> {
        let raw = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_RAW, libc::IPPROTO_RAW) };
        if raw == -1 {
            return Err(LinkError::OpenFailed {
                interface: interface.to_string(),
                source: io::Error::last_os_error(),
            });
        }
        // SAFETY: `raw` is a freshly created descriptor we exclusively own.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let bind_err = |source: io::Error| LinkError::BindFailed {
            interface: interface.to_string(),
            source,
        };

        let name = CString::new(interface)
            .map_err(|e| bind_err(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
        let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
        if index == 0 {
            return Err(bind_err(io::Error::last_os_error()));
        }

        // SAFETY: sockaddr_ll is plain old data; all-zero is a valid value.
        let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as libc::c_ushort;
        addr.sll_ifindex = index as libc::c_int;
        addr.sll_halen = DEST_MAC.len() as libc::c_uchar;
        addr.sll_addr[..DEST_MAC.len()].copy_from_slice(&DEST_MAC);

        let rc = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if rc == -1 {
            return Err(bind_err(io::Error::last_os_error()));
        }

        tracing::debug!(
            "bound AF_PACKET socket {} to {} (index {})",
            fd.as_raw_fd(),
            interface,
            index
        );

        Ok(Self {
            fd,
            iovecs: Vec::new(),
            msgs: Vec::new(),
        })
    }
}

impl LinkTransport for PacketLink {
    fn send_batch(&mut self, frames: &[WireFrame], device: &[u8]) -> io::Result<usize> {
        if frames.is_empty() {
            return Ok(0);
        }

        for frame in frames {
            let header = frame.header();
            let payload = frame.payload(device);
            self.iovecs.push(libc::iovec {
                iov_base: header.as_ptr() as *mut libc::c_void,
                iov_len: header.len(),
            });
            self.iovecs.push(libc::iovec {
                iov_base: payload.as_ptr() as *mut libc::c_void,
                iov_len: payload.len(),
            });
        }

        let iov_base = self.iovecs.as_mut_ptr();
        for i in 0..frames.len() {
            // SAFETY: mmsghdr is plain old data; all-zero is a valid value.
            let mut msg: libc::mmsghdr = unsafe { mem::zeroed() };
            // SAFETY: two iovecs were pushed per frame above.
            msg.msg_hdr.msg_iov = unsafe { iov_base.add(i * 2) };
            msg.msg_hdr.msg_iovlen = 2;
            self.msgs.push(msg);
        }

        // SAFETY: every iovec points into `frames` or `device`, both of
        // which are borrowed for the duration of this call.
        let sent = unsafe {
            libc::sendmmsg(
                self.fd.as_raw_fd(),
                self.msgs.as_mut_ptr(),
                self.msgs.len() as libc::c_uint,
                libc::MSG_DONTWAIT as _,
            )
        };
        let result = if sent < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(sent as usize)
        };

        self.msgs.clear();
        self.iovecs.clear();
        result
    }

    fn socket_id(&self) -> i32 {
        self.fd.as_raw_fd()
    }
}
