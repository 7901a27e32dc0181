use std::io::{self, Read, Write};
use std::net::IpAddr;

use crate::command::{Exec, System};
use crate::configuration::{Configuration, InterfaceConfig};
use crate::configurer::{Configurer, Policy};
use crate::error::Result;
use crate::platform::{self, Device, Factory, Native};
use crate::route::{Route, RouteAction};

/// A configured TUN interface.
///
/// `Drive` owns the device and the settings it was created from, and
/// applies interface configuration through the platform's command-line
/// tools.
pub struct Drive {
    device: Device,
    config: InterfaceConfig,
}

/// Validate `config`, then hand the result to `factory`.
///
/// A configuration error is returned before the factory sees anything.
pub(crate) fn open_with<F: Factory>(
    config: &Configuration,
    factory: &F,
) -> Result<(F::Device, InterfaceConfig)> {
    let config = config.validate()?;
    let device = factory.create(&config)?;
    Ok((device, config))
}

/// Run the platform's `up` steps for the interface `name` under its policy.
pub(crate) fn configure_up<E: Exec>(name: &str, config: &InterfaceConfig, exec: &E) -> Result<()> {
    let steps = platform::up_steps(name, config);
    Configurer::with_exec(platform::UP_POLICY, config.timeout, exec).apply(&steps)?;
    log::info!("{name} is up with {}", config.address);
    Ok(())
}

impl Drive {
    /// Create the interface described by `config`.
    pub fn new(config: &Configuration) -> Result<Self> {
        let (device, config) = open_with(config, &Native)?;
        Ok(Self { device, config })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn config(&self) -> &InterfaceConfig {
        &self.config
    }

    pub fn into_device(self) -> Device {
        self.device
    }

    /// Recv a packet from the device.
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.device.recv(buf)
    }

    /// Send a packet to the device.
    pub fn send(&self, buf: &[u8]) -> io::Result<usize> {
        self.device.send(buf)
    }

    /// Close the device. Blocked `recv`/`send` calls return promptly.
    pub fn close(&self) -> Result<()> {
        self.device.close()
    }

    pub fn name(&self) -> Result<String> {
        self.device.name()
    }

    pub fn mtu(&self) -> Result<u16> {
        self.device.mtu()
    }

    pub fn set_mtu(&self, mtu: u16) -> Result<()> {
        self.device.set_mtu(mtu)
    }

    /// Assign the configured address and bring the interface up.
    pub fn up(&self) -> Result<()> {
        configure_up(&self.name()?, &self.config, &System)
    }

    /// Add, change or delete a route through this interface.
    pub fn route(&self, action: RouteAction, route: &Route) -> Result<()> {
        let name = self.name()?;
        let step = platform::route_step(&name, action, route, &self.config)?;
        Configurer::new(Policy::FailFast, self.config.timeout).apply(&[step])?;
        Ok(())
    }

    /// Addresses currently assigned to the interface.
    pub fn addresses(&self) -> Result<Vec<IpAddr>> {
        platform::addresses(&self.name()?)
    }
}

impl Read for &Drive {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv(buf)
    }
}

impl Write for &Drive {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.send(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configurer::tests::Script;
    use crate::error::{CommandError, Error};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    impl Factory for Counting {
        type Device = String;

        fn create(&self, config: &InterfaceConfig) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(config.name.clone())
        }
    }

    #[test]
    fn invalid_config_never_reaches_factory() {
        let factory = Counting::default();
        let config = Configuration::new().mtu(1500).address("not-a-cidr");
        let err = open_with(&config, &factory).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)), "{err}");
        assert_eq!(factory.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn valid_config_reaches_factory_once() {
        let factory = Counting::default();
        let config = Configuration::new().address("10.0.0.0/24");
        let (device, config) = open_with(&config, &factory).unwrap();
        assert_eq!(device, config.name);
        assert_eq!(factory.calls.load(Ordering::SeqCst), 1);
    }

    fn interface(address: &str) -> InterfaceConfig {
        Configuration::new().address(address).validate().unwrap()
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn linux_up_runs_every_step() {
        assert_eq!(platform::UP_POLICY, Policy::Aggregate);
        let script = Script::failing(vec![0]);
        let err = configure_up("tun0", &interface("10.0.0.1/24"), &script).unwrap_err();
        let ran: Vec<String> = script.ran.lock().unwrap().iter().map(|s| s.to_string()).collect();
        assert_eq!(ran.len(), 3);
        assert_eq!(ran[2], "/sbin/ip link set dev tun0 up");
        match err {
            Error::Command(CommandError::Status { command, .. }) => {
                assert_eq!(command, ran[0]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[cfg(target_os = "macos")]
    #[test]
    fn macos_up_stops_at_first_failure() {
        assert_eq!(platform::UP_POLICY, Policy::FailFast);
        let script = Script::failing(vec![0]);
        let err = configure_up("utun5", &interface("10.0.0.1/24"), &script).unwrap_err();
        assert!(matches!(err, Error::Command(_)), "{err}");
        assert_eq!(script.ran.lock().unwrap().len(), 1);
    }

    #[cfg(target_os = "windows")]
    #[test]
    fn windows_up_has_nothing_left_to_run() {
        assert_eq!(platform::UP_POLICY, Policy::FailFast);
        let script = Script::default();
        configure_up("tun3", &interface("10.0.0.1/24"), &script).unwrap();
        assert!(script.ran.lock().unwrap().is_empty());
    }

    #[test]
    fn successful_up_runs_platform_steps() {
        let config = interface("10.0.0.1/24");
        let script = Script::default();
        configure_up("tun0", &config, &script).unwrap();
        assert_eq!(
            script.ran.lock().unwrap().len(),
            platform::up_steps("tun0", &config).len()
        );
    }
}
