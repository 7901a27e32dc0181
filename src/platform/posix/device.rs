use std::ffi::CString;
use std::os::fd::AsRawFd;
use std::{mem, ptr};

use libc::{c_char, ifreq, IFNAMSIZ};

use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::platform::posix::{Fd, Tun};
use crate::platform::sys::{siocgifmtu, siocsifmtu};

/// Control socket for interface ioctls.
pub(crate) fn ctl() -> Result<Fd> {
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
    Ok(Fd::new(fd)?)
}

/// Build an `ifreq` addressed to `name`.
pub(crate) fn request(name: &str) -> Result<ifreq> {
    let c_name = CString::new(name)
        .map_err(|_| Error::InvalidConfig("device name contains NUL".into()))?;
    let len = c_name.as_bytes_with_nul().len();
    if len > IFNAMSIZ {
        return Err(Error::InvalidConfig(format!(
            "device name {name:?} exceeds {} bytes",
            IFNAMSIZ - 1
        )));
    }
    unsafe {
        let mut req: ifreq = mem::zeroed();
        ptr::copy_nonoverlapping(
            c_name.as_ptr() as *const c_char,
            req.ifr_name.as_mut_ptr(),
            len,
        );
        Ok(req)
    }
}

/// Read the NUL-terminated interface name out of a kernel buffer.
pub(crate) fn name_from(raw: &[c_char]) -> Result<String> {
    let bytes: Vec<u8> = raw
        .iter()
        .take_while(|c| **c != 0)
        .map(|c| *c as u8)
        .collect();
    String::from_utf8(bytes).map_err(|e| Error::String(format!("interface name: {e}")))
}

impl Handle<Tun> {
    /// Whether the descriptor is in non-blocking mode.
    pub fn is_nonblocking(&self) -> std::io::Result<bool> {
        self.get_ref().is_nonblocking()
    }

    /// Get the current MTU.
    pub fn mtu(&self) -> Result<u16> {
        let mut req = request(&self.name()?)?;
        let ctl = ctl()?;
        unsafe {
            siocgifmtu(ctl.as_raw_fd(), &mut req).map_err(|e| Error::ioctl("SIOCGIFMTU", e))?;
            u16::try_from(req.ifr_ifru.ifru_mtu)
                .map_err(|_| Error::String(format!("mtu {} out of range", req.ifr_ifru.ifru_mtu)))
        }
    }

    /// Set the MTU.
    pub fn set_mtu(&self, value: u16) -> Result<()> {
        let mut req = request(&self.name()?)?;
        req.ifr_ifru.ifru_mtu = value as _;
        let ctl = ctl()?;
        unsafe {
            siocsifmtu(ctl.as_raw_fd(), &req).map_err(|e| Error::ioctl("SIOCSIFMTU", e))?;
        }
        Ok(())
    }

    /// Kernel index of the interface.
    pub fn if_index(&self) -> Result<u32> {
        let name = CString::new(self.name()?)
            .map_err(|_| Error::InvalidConfig("device name contains NUL".into()))?;
        match unsafe { libc::if_nametoindex(name.as_ptr()) } {
            0 => Err(std::io::Error::last_os_error().into()),
            index => Ok(index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_rejects_long_names() {
        assert!(request("tun0").is_ok());
        assert!(matches!(
            request("0123456789abcdef"),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn name_stops_at_nul() {
        let req = request("utun4").unwrap();
        assert_eq!(name_from(&req.ifr_name).unwrap(), "utun4");
    }
}
