use std::os::unix::io::{AsRawFd, RawFd};

use bitflags::bitflags;
use libc::{c_short, O_CLOEXEC, O_RDWR};

use crate::error::{Error, Result};
use crate::platform::linux::sys::{siocgifflags, siocsifflags, tungetiff, tunsetiff, tunsetoffload};
use crate::platform::posix::device::{ctl, name_from, request};
use crate::platform::posix::{Fd, Tun};
use crate::platform::Device;

/// Clone device every tun queue is opened from.
pub(crate) const CLONE_DEVICE: &str = "/dev/net/tun";

bitflags! {
    /// Interface flags exchanged with `TUNSETIFF`/`TUNGETIFF`.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub(crate) struct TunFlags: c_short {
        const TUN = libc::IFF_TUN as c_short;
        const NO_PI = libc::IFF_NO_PI as c_short;
        const MULTI_QUEUE = libc::IFF_MULTI_QUEUE as c_short;
        const VNET_HDR = libc::IFF_VNET_HDR as c_short;
    }
}

/// Create a tun interface called `name`, set its MTU and bring the link up.
///
/// `name` may be empty or a `%d` template, in which case the kernel picks
/// the final name. On failure every resource acquired so far is released.
pub fn create(name: &str, mtu: u16) -> Result<Device> {
    let mut req = request(name)?;
    let fd = open_clone_device()?;

    req.ifr_ifru.ifru_flags = (TunFlags::TUN | TunFlags::NO_PI | TunFlags::MULTI_QUEUE).bits();
    unsafe { tunsetiff(fd.as_raw_fd(), &mut req as *mut _ as *mut _) }
        .map_err(|e| Error::ioctl("TUNSETIFF", e))?;
    // only switch modes once the interface is attached
    attach(wrap(fd)?, mtu)
}

/// Build a device from a tun descriptor that is already attached to an
/// interface, such as one handed over by a privileged parent process.
///
/// # Safety
/// `fd` must be an open descriptor owned by the caller; ownership moves to
/// the returned device, or the descriptor is closed on failure.
pub unsafe fn create_from_fd(fd: RawFd, mtu: u16) -> Result<Device> {
    attach(wrap(Fd::new(fd)?)?, mtu)
}

/// Switch `fd` to non-blocking mode and put a handle around it.
pub(crate) fn wrap(fd: Fd) -> Result<Device> {
    fd.set_nonblock()?;
    Ok(Device::new(Tun::new(fd)?))
}

fn attach(device: Device, mtu: u16) -> Result<Device> {
    let name = device.name()?;
    match negotiate_offload(device.as_raw_fd()) {
        Ok(true) => log::debug!("{name}: checksum and segmentation offload enabled"),
        Ok(false) => {}
        Err(e) => log::warn!("{name}: offload negotiation failed: {e}"),
    }
    device.set_mtu(mtu)?;
    link_up(&name)?;
    log::info!("created tun device {name} with mtu {mtu}");
    Ok(device)
}

fn up_flags(flags: c_short) -> c_short {
    flags | (libc::IFF_UP | libc::IFF_RUNNING) as c_short
}

/// Set `IFF_UP` on `name`. Writes to a tun link that is down fail with EIO.
fn link_up(name: &str) -> Result<()> {
    let mut req = request(name)?;
    let ctl = ctl()?;
    unsafe {
        siocgifflags(ctl.as_raw_fd(), &mut req).map_err(|e| Error::ioctl("SIOCGIFFLAGS", e))?;
        req.ifr_ifru.ifru_flags = up_flags(req.ifr_ifru.ifru_flags);
        siocsifflags(ctl.as_raw_fd(), &req).map_err(|e| Error::ioctl("SIOCSIFFLAGS", e))?;
    }
    Ok(())
}

fn open_clone_device() -> Result<Fd> {
    let fd = unsafe { libc::open(c"/dev/net/tun".as_ptr(), O_RDWR | O_CLOEXEC) };
    Fd::new(fd).map_err(|err| match err.raw_os_error() {
        Some(libc::ENOENT) => Error::DeviceMissing(CLONE_DEVICE),
        Some(libc::EACCES) | Some(libc::EPERM) => {
            Error::PermissionDenied(format!("open {CLONE_DEVICE}: {err}"))
        }
        _ => err.into(),
    })
}

fn flags(fd: RawFd) -> Result<(String, TunFlags)> {
    let mut req = request("")?;
    unsafe {
        tungetiff(fd, &mut req as *mut _ as *mut _).map_err(|e| Error::ioctl("TUNGETIFF", e))?;
        Ok((
            name_from(&req.ifr_name)?,
            TunFlags::from_bits_truncate(req.ifr_ifru.ifru_flags),
        ))
    }
}

/// Resolve the kernel-assigned name of the interface behind `fd`.
pub(crate) fn query_name(fd: RawFd) -> Result<String> {
    flags(fd).map(|(name, _)| name)
}

/// Enable TCP offloads when the interface carries virtio headers, then
/// try to add UDP segmentation offload, which only newer kernels know.
fn negotiate_offload(fd: RawFd) -> Result<bool> {
    let (_, flags) = flags(fd)?;
    if !flags.contains(TunFlags::VNET_HDR) {
        return Ok(false);
    }
    let tcp = libc::TUN_F_CSUM | libc::TUN_F_TSO4 | libc::TUN_F_TSO6;
    let udp = libc::TUN_F_USO4 | libc::TUN_F_USO6;
    unsafe {
        tunsetoffload(fd, tcp as _).map_err(|e| Error::ioctl("TUNSETOFFLOAD", e))?;
        if let Err(e) = tunsetoffload(fd, (tcp | udp) as _) {
            log::warn!("udp segmentation offload unavailable: {e}");
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requested_flags() {
        let flags = TunFlags::TUN | TunFlags::NO_PI | TunFlags::MULTI_QUEUE;
        assert_eq!(flags.bits(), 0x0001 | 0x1000 | 0x0100);
        assert!(!flags.contains(TunFlags::VNET_HDR));
    }

    #[test]
    fn up_keeps_existing_flags() {
        let flags = up_flags(libc::IFF_POINTOPOINT as c_short | libc::IFF_NOARP as c_short);
        assert_ne!(flags & libc::IFF_UP as c_short, 0);
        assert_ne!(flags & libc::IFF_RUNNING as c_short, 0);
        assert_ne!(flags & libc::IFF_POINTOPOINT as c_short, 0);
        assert_ne!(flags & libc::IFF_NOARP as c_short, 0);
    }

    fn pipe() -> (RawFd, RawFd) {
        let mut fds: [libc::c_int; 2] = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        (fds[0], fds[1])
    }

    #[test]
    fn wrapped_descriptor_is_nonblocking_and_writable() {
        let (rx, tx) = pipe();
        let device = wrap(Fd::new(tx).unwrap()).unwrap();
        assert!(device.is_nonblocking().unwrap());
        assert_eq!(device.send(b"pkt").unwrap(), 3);

        let rx = Fd::new(rx).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(rx.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"pkt");
        device.close().unwrap();
    }

    #[test]
    fn descriptor_without_interface_is_rejected() {
        let (rx, tx) = pipe();
        let _tx = Fd::new(tx).unwrap();
        let err = unsafe { create_from_fd(rx, 1500) }.unwrap_err();
        assert!(
            matches!(err, Error::Ioctl { request: "TUNGETIFF", .. }),
            "{err}"
        );
        assert!(unsafe { create_from_fd(-1, 1500) }.is_err());
    }
}
