mod device;
mod netsh;

pub use self::device::{Device, Tun};

use std::time::Duration;

use crate::command::{Exec, Step, System};
use crate::configuration::InterfaceConfig;
use crate::configurer::{Configurer, Policy};
use crate::error::{Error, Result};
use crate::route::{Route, RouteAction};
use crate::DEFAULT_TIMEOUT;

/// Adapter name used when none is configured.
pub const DEFAULT_NAME: &str = "tun3";

/// Address and MTU are assigned while the device is created.
pub(crate) const UP_POLICY: Policy = Policy::FailFast;

/// Windows-only interface configuration.
#[derive(Clone, Debug)]
pub struct PlatformConfig {
    pub(crate) device_guid: Option<u128>,
    pub(crate) wintun_file: String,
    pub(crate) ring_capacity: Option<u32>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            device_guid: None,
            wintun_file: "wintun.dll".to_string(),
            ring_capacity: None,
        }
    }
}

impl PlatformConfig {
    pub fn device_guid(&mut self, device_guid: u128) -> &mut Self {
        self.device_guid = Some(device_guid);
        self
    }

    /// Path of `wintun.dll`.
    pub fn wintun_file<S: Into<String>>(&mut self, wintun_file: S) -> &mut Self {
        self.wintun_file = wintun_file.into();
        self
    }

    pub fn ring_capacity(&mut self, ring_capacity: u32) -> &mut Self {
        self.ring_capacity = Some(ring_capacity);
        self
    }
}

pub(crate) fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 127 {
        return Err(Error::InvalidConfig(format!(
            "adapter name {name:?} must have 1 to 127 bytes"
        )));
    }
    Ok(())
}

/// Create (or reopen) the adapter called `name` and set its MTU, giving
/// `netsh` [`DEFAULT_TIMEOUT`].
pub fn create(name: &str, mtu: u16) -> Result<Device> {
    create_with_timeout(name, mtu, DEFAULT_TIMEOUT)
}

/// Create (or reopen) the adapter called `name` and set its MTU, giving
/// `netsh` at most `timeout`.
pub fn create_with_timeout(name: &str, mtu: u16, timeout: Duration) -> Result<Device> {
    let device = device::start(name, &PlatformConfig::default())?;
    let index = device.if_index()?;
    configure(&System, timeout, &[netsh::set_interface_mtu(index, mtu)])?;
    Ok(device)
}

pub(crate) fn open(config: &InterfaceConfig) -> Result<Device> {
    let device = device::start(&config.name, &config.platform_config)?;
    let index = device.if_index()?;
    configure(
        &System,
        config.timeout,
        &[
            netsh::set_interface_ip(index, &config.address),
            netsh::set_interface_mtu(index, config.mtu),
        ],
    )?;
    log::info!("created wintun adapter {} (index {index})", config.name);
    Ok(device)
}

/// Apply the adapter settings made while the device is created.
fn configure<E: Exec>(exec: &E, timeout: Duration, steps: &[Step]) -> Result<()> {
    Configurer::with_exec(Policy::FailFast, timeout, exec).apply(steps)?;
    Ok(())
}

pub(crate) fn up_steps(_name: &str, _config: &InterfaceConfig) -> Vec<Step> {
    Vec::new()
}

pub(crate) fn route_step(
    _name: &str,
    action: RouteAction,
    route: &Route,
    _config: &InterfaceConfig,
) -> Result<Step> {
    let gateway = route.gateway.ok_or_else(|| {
        Error::InvalidConfig("routes on windows need a gateway".into())
    })?;
    Ok(Step::new(
        "cmd",
        [
            "/C".to_string(),
            "route".to_string(),
            action.as_str().to_string(),
            route.destination.addr().to_string(),
            "mask".to_string(),
            route.destination.netmask().to_string(),
            gateway.to_string(),
        ],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CommandError;
    use std::sync::Mutex;

    /// Records the timeout of every step and fails them all.
    #[derive(Default)]
    struct Timed(Mutex<Vec<Duration>>);

    impl Exec for Timed {
        fn exec(&self, step: &Step, timeout: Duration) -> std::result::Result<String, CommandError> {
            self.0.lock().unwrap().push(timeout);
            Err(CommandError::Timeout {
                command: step.to_string(),
                timeout,
            })
        }
    }

    #[test]
    fn creation_steps_use_given_timeout_and_stop_early() {
        let timed = Timed::default();
        let steps = [
            netsh::set_interface_ip(7, &"10.0.0.1/24".parse().unwrap()),
            netsh::set_interface_mtu(7, 1400),
        ];
        let err = configure(&timed, Duration::from_secs(7), &steps).unwrap_err();
        assert!(matches!(err, Error::Command(CommandError::Timeout { .. })), "{err}");
        assert_eq!(*timed.0.lock().unwrap(), [Duration::from_secs(7)]);
    }

    #[test]
    fn routes_need_a_gateway() {
        let config = crate::Configuration::new()
            .address("10.0.0.1/24")
            .validate()
            .unwrap();
        let route = Route::new("192.168.7.0/24".parse().unwrap());
        assert!(route_step("tun3", RouteAction::Add, &route, &config).is_err());
        let route = route.via("10.0.0.254".parse().unwrap());
        let step = route_step("tun3", RouteAction::Add, &route, &config).unwrap();
        assert_eq!(
            step.to_string(),
            "cmd /C route add 192.168.7.0 mask 255.255.255.0 10.0.0.254"
        );
    }
}
