#[cfg(unix)]
pub mod posix;

#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "linux")]
pub use self::linux::*;

#[cfg(target_os = "macos")]
pub mod macos;
#[cfg(target_os = "macos")]
pub use self::macos::*;

#[cfg(unix)]
pub use crate::platform::posix::Tun;

#[cfg(target_os = "windows")]
pub mod windows;
#[cfg(target_os = "windows")]
pub use self::windows::*;

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
compile_error!("tun-drive supports Linux, macOS and Windows");

use std::net::IpAddr;

use crate::configuration::InterfaceConfig;
use crate::error::Result;

/// Produces devices from validated settings.
pub trait Factory {
    type Device;

    fn create(&self, config: &InterfaceConfig) -> Result<Self::Device>;
}

/// Factory backed by the operating system's tun driver.
#[derive(Copy, Clone, Debug, Default)]
pub struct Native;

impl Factory for Native {
    type Device = Device;

    fn create(&self, config: &InterfaceConfig) -> Result<Device> {
        open(config)
    }
}

/// Addresses currently assigned to the interface called `name`.
pub(crate) fn addresses(name: &str) -> Result<Vec<IpAddr>> {
    Ok(getifaddrs::getifaddrs()?
        .filter(|iface| iface.name == name)
        .map(|iface| iface.address)
        .collect())
}
