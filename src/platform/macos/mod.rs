pub mod sys;

mod device;

pub use self::device::create;
pub(crate) use self::device::query_name;

use std::net::IpAddr;

use crate::command::Step;
use crate::configuration::InterfaceConfig;
use crate::configurer::Policy;
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::platform::posix::Tun;
use crate::route::{Route, RouteAction};

/// A TUN device using the utun kernel control.
pub type Device = Handle<Tun>;

/// Empty: the kernel picks the next free `utunN`.
pub const DEFAULT_NAME: &str = "";

pub(crate) const UP_POLICY: Policy = Policy::FailFast;

/// macOS-only interface configuration.
#[derive(Clone, Debug, Default)]
pub struct PlatformConfig {
    pub(crate) destination: Option<IpAddr>,
}

impl PlatformConfig {
    /// Peer address of the point-to-point link; defaults to the local address.
    pub fn destination(&mut self, destination: IpAddr) -> &mut Self {
        self.destination = Some(destination);
        self
    }
}

pub(crate) fn check_name(name: &str) -> Result<()> {
    device::unit(name).map(|_| ())
}

pub(crate) fn open(config: &InterfaceConfig) -> Result<Device> {
    create(&config.name, config.mtu)
}

/// Assign the address and bring the interface up.
pub(crate) fn up_steps(name: &str, config: &InterfaceConfig) -> Vec<Step> {
    let address = config.address.addr();
    match address {
        IpAddr::V4(_) => {
            let destination = config.platform_config.destination.unwrap_or(address);
            vec![Step::new(
                "ifconfig",
                [
                    name.to_string(),
                    "inet".to_string(),
                    config.address.to_string(),
                    destination.to_string(),
                    "up".to_string(),
                ],
            )]
        }
        IpAddr::V6(_) => vec![Step::new(
            "ifconfig",
            [
                name.to_string(),
                "inet6".to_string(),
                address.to_string(),
                "prefixlen".to_string(),
                config.address.prefix_len().to_string(),
                "up".to_string(),
            ],
        )],
    }
}

pub(crate) fn route_step(
    name: &str,
    action: RouteAction,
    route: &Route,
    _config: &InterfaceConfig,
) -> Result<Step> {
    let family = if route.destination.addr().is_ipv4() {
        "-inet"
    } else {
        "-inet6"
    };
    let mut args = vec![
        "-n".to_string(),
        action.as_str().to_string(),
        family.to_string(),
        route.destination.to_string(),
    ];
    match route.gateway {
        Some(gateway) => args.push(gateway.to_string()),
        None => args.extend(["-interface".to_string(), name.to_string()]),
    }
    if action == RouteAction::Change && route.gateway.is_none() {
        return Err(Error::InvalidConfig("changing a route needs a gateway".into()));
    }
    Ok(Step::new("route", args))
}
