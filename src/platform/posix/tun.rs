use crate::error::Result;
use crate::handle::RawDevice;
use crate::platform::posix::fd::{wait, EventFd, Fd, Interest};
#[cfg(target_os = "macos")]
use crate::PACKET_INFORMATION_LENGTH as PIL;
use std::io;
#[cfg(target_os = "macos")]
use std::io::{IoSlice, IoSliceMut};
use std::os::unix::io::{AsRawFd, RawFd};

/// Infer the protocol based on the first nibble in the packet buffer.
#[cfg(target_os = "macos")]
pub(crate) fn is_ipv6(buf: &[u8]) -> io::Result<bool> {
    use std::io::{Error, ErrorKind::InvalidData};
    if buf.is_empty() {
        return Err(Error::new(InvalidData, "Zero-length data"));
    }
    match buf[0] >> 4 {
        4 => Ok(false),
        6 => Ok(true),
        p => Err(Error::new(InvalidData, format!("IP version {}", p))),
    }
}

#[cfg(target_os = "macos")]
pub(crate) fn generate_packet_information(ipv6: bool) -> [u8; PIL] {
    const TUN_PROTO_IP6: [u8; PIL] = (libc::AF_INET6 as u32).to_be_bytes();
    const TUN_PROTO_IP4: [u8; PIL] = (libc::AF_INET as u32).to_be_bytes();
    if ipv6 {
        TUN_PROTO_IP6
    } else {
        TUN_PROTO_IP4
    }
}

/// Payload length of a utun read of `len` bytes. A read too short to hold
/// the header is malformed, not end-of-stream.
#[cfg(target_os = "macos")]
fn strip_information(len: usize) -> io::Result<usize> {
    len.checked_sub(PIL).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("utun read of {len} bytes is shorter than its header"),
        )
    })
}

/// Kernel tun descriptor plus the signal used to unblock it on close.
#[derive(Debug)]
pub struct Tun {
    pub(crate) fd: Fd,
    event: EventFd,
}

impl Tun {
    pub(crate) fn new(fd: Fd) -> io::Result<Self> {
        Ok(Self {
            fd,
            event: EventFd::new()?,
        })
    }

    pub fn is_nonblocking(&self) -> io::Result<bool> {
        self.fd.is_nonblocking()
    }

    #[cfg(not(target_os = "macos"))]
    #[inline]
    fn recv_once(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.fd.read(buf)
    }

    /// utun always prefixes packets with a 4-byte address family header.
    #[cfg(target_os = "macos")]
    fn recv_once(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut head = [0u8; PIL];
        let bufs = &mut [IoSliceMut::new(&mut head), IoSliceMut::new(buf)];
        let len = self.fd.readv(bufs)?;
        strip_information(len)
    }

    #[cfg(not(target_os = "macos"))]
    #[inline]
    fn send_once(&self, buf: &[u8]) -> io::Result<usize> {
        self.fd.write(buf)
    }

    #[cfg(target_os = "macos")]
    fn send_once(&self, buf: &[u8]) -> io::Result<usize> {
        let ipv6 = is_ipv6(buf)?;
        let header = generate_packet_information(ipv6);
        let len = self
            .fd
            .writev(&[IoSlice::new(&header), IoSlice::new(buf)])?;
        Ok(len.saturating_sub(PIL))
    }

    fn block_on<F>(&self, interest: Interest, mut op: F) -> io::Result<usize>
    where
        F: FnMut() -> io::Result<usize>,
    {
        loop {
            match op() {
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                rs => return rs,
            }
            if !wait(self.fd.as_raw_fd(), interest, &self.event)? {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionAborted,
                    "device is closing",
                ));
            }
        }
    }
}

impl RawDevice for Tun {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.block_on(Interest::Readable, || self.recv_once(buf))
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.block_on(Interest::Writable, || self.send_once(buf))
    }

    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv_once(buf)
    }

    fn try_write(&self, buf: &[u8]) -> io::Result<usize> {
        self.send_once(buf)
    }

    fn query_name(&self) -> Result<String> {
        crate::platform::query_name(self.fd.as_raw_fd())
    }

    fn wake(&self) -> io::Result<()> {
        self.event.wake()
    }

    fn close(&self) -> io::Result<()> {
        self.fd.close()
    }
}

impl AsRawFd for Tun {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

#[cfg(all(test, target_os = "macos"))]
mod tests {
    use super::*;

    #[test]
    fn short_read_is_invalid_data() {
        assert_eq!(strip_information(64).unwrap(), 60);
        assert_eq!(strip_information(PIL).unwrap(), 0);
        let err = strip_information(2).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn header_follows_ip_version() {
        assert!(!is_ipv6(&[0x45, 0]).unwrap());
        assert!(is_ipv6(&[0x60, 0]).unwrap());
        assert!(is_ipv6(&[]).is_err());
        assert_eq!(
            generate_packet_information(false),
            (libc::AF_INET as u32).to_be_bytes()
        );
    }
}
