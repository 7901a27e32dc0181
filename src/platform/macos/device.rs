use std::mem;
use std::os::unix::io::{AsRawFd, RawFd};

use libc::{
    c_char, c_uint, c_void, sockaddr, socklen_t, AF_SYSTEM, AF_SYS_CONTROL, IFNAMSIZ, PF_SYSTEM,
    SOCK_DGRAM, SYSPROTO_CONTROL, UTUN_OPT_IFNAME,
};

use crate::error::{Error, Result};
use crate::platform::macos::sys::{ctl_info, ctliocginfo, UTUN_CONTROL_NAME};
use crate::platform::posix::device::name_from;
use crate::platform::posix::{Fd, Tun};
use crate::platform::Device;

/// Kernel unit for `utunN`; zero lets the kernel choose.
pub(crate) fn unit(name: &str) -> Result<c_uint> {
    if name.is_empty() {
        return Ok(0);
    }
    let invalid = || Error::InvalidConfig(format!("device name {name:?} must be utunN"));
    let id = name
        .strip_prefix("utun")
        .ok_or_else(invalid)?
        .parse::<c_uint>()
        .map_err(|_| invalid())?;
    id.checked_add(1).ok_or_else(invalid)
}

/// Create a utun interface and set its MTU.
pub fn create(name: &str, mtu: u16) -> Result<Device> {
    let unit = unit(name)?;
    let fd = Fd::new(unsafe { libc::socket(PF_SYSTEM, SOCK_DGRAM, SYSPROTO_CONTROL) })
        .map_err(|err| match err.raw_os_error() {
            Some(libc::EACCES) | Some(libc::EPERM) => {
                Error::PermissionDenied(format!("utun control socket: {err}"))
            }
            _ => err.into(),
        })?;
    unsafe {
        libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC);
    }

    let mut info = ctl_info {
        ctl_id: 0,
        ctl_name: [0; 96],
    };
    for (i, o) in UTUN_CONTROL_NAME.as_bytes().iter().zip(info.ctl_name.iter_mut()) {
        *o = *i as c_char;
    }
    unsafe { ctliocginfo(fd.as_raw_fd(), &mut info) }
        .map_err(|e| Error::ioctl("CTLIOCGINFO", e))?;

    let addr = libc::sockaddr_ctl {
        sc_id: info.ctl_id,
        sc_len: mem::size_of::<libc::sockaddr_ctl>() as _,
        sc_family: AF_SYSTEM as _,
        ss_sysaddr: AF_SYS_CONTROL as _,
        sc_unit: unit,
        sc_reserved: [0; 5],
    };
    let address = &addr as *const libc::sockaddr_ctl as *const sockaddr;
    if unsafe { libc::connect(fd.as_raw_fd(), address, mem::size_of_val(&addr) as socklen_t) } < 0
    {
        let err = std::io::Error::last_os_error();
        return Err(match err.raw_os_error() {
            Some(libc::EPERM) | Some(libc::EACCES) => {
                Error::PermissionDenied(format!("connect utun control: {err}"))
            }
            _ => err.into(),
        });
    }
    fd.set_nonblock()?;

    let device = Device::new(Tun::new(fd)?);
    let name = device.name()?;
    device.set_mtu(mtu)?;
    log::info!("created utun device {name} with mtu {mtu}");
    Ok(device)
}

/// Ask the utun control socket for its interface name.
pub(crate) fn query_name(fd: RawFd) -> Result<String> {
    let mut tun_name = [0 as c_char; IFNAMSIZ];
    let mut name_len = tun_name.len() as socklen_t;
    let optval = tun_name.as_mut_ptr() as *mut c_void;
    if unsafe { libc::getsockopt(fd, SYSPROTO_CONTROL, UTUN_OPT_IFNAME, optval, &mut name_len) } < 0
    {
        return Err(std::io::Error::last_os_error().into());
    }
    name_from(&tun_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utun_names_map_to_units() {
        assert_eq!(unit("").unwrap(), 0);
        assert_eq!(unit("utun0").unwrap(), 1);
        assert_eq!(unit("utun7").unwrap(), 8);
        assert!(unit("tun0").is_err());
        assert!(unit("utunx").is_err());
    }
}
