pub mod sys;

mod device;

pub use self::device::{create, create_from_fd};
pub(crate) use self::device::query_name;

use crate::command::Step;
use crate::configuration::InterfaceConfig;
use crate::configurer::Policy;
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::platform::posix::Tun;
use crate::route::{Route, RouteAction};

/// A TUN device using the TUN/TAP Linux driver.
pub type Device = Handle<Tun>;

/// Template handed to the kernel when no name is configured.
pub const DEFAULT_NAME: &str = "tun%d";

/// Every step of `up` runs even when an earlier one fails.
pub(crate) const UP_POLICY: Policy = Policy::Aggregate;

/// Linux-only interface configuration.
#[derive(Clone, Debug)]
pub struct PlatformConfig {
    pub(crate) ip_command: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        PlatformConfig {
            ip_command: "/sbin/ip".to_string(),
        }
    }
}

impl PlatformConfig {
    /// Path of the `ip` utility used to configure links, addresses and routes.
    pub fn ip_command<S: Into<String>>(&mut self, path: S) -> &mut Self {
        self.ip_command = path.into();
        self
    }
}

pub(crate) fn check_name(name: &str) -> Result<()> {
    if name.len() >= libc::IFNAMSIZ {
        return Err(Error::InvalidConfig(format!(
            "device name {name:?} exceeds {} bytes",
            libc::IFNAMSIZ - 1
        )));
    }
    Ok(())
}

pub(crate) fn open(config: &InterfaceConfig) -> Result<Device> {
    create(&config.name, config.mtu)
}

/// Set the MTU, assign the address and bring the link up.
pub(crate) fn up_steps(name: &str, config: &InterfaceConfig) -> Vec<Step> {
    let ip = &config.platform_config.ip_command;
    let mtu = config.mtu.to_string();
    let address = config.address.to_string();
    vec![
        Step::new(ip, ["link", "set", "dev", name, "mtu", mtu.as_str()]),
        Step::new(ip, ["addr", "add", address.as_str(), "dev", name]),
        Step::new(ip, ["link", "set", "dev", name, "up"]),
    ]
}

pub(crate) fn route_step(
    name: &str,
    action: RouteAction,
    route: &Route,
    config: &InterfaceConfig,
) -> Result<Step> {
    let mut args = vec![
        "route".to_string(),
        action.as_str().to_string(),
        route.destination.to_string(),
    ];
    if let Some(gateway) = route.gateway {
        args.extend(["via".to_string(), gateway.to_string()]);
    }
    args.extend(["dev".to_string(), name.to_string()]);
    Ok(Step::new(&config.platform_config.ip_command, args))
}
