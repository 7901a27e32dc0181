use std::time::Duration;

use ipnet::IpNet;

use crate::error::{Error, Result};
use crate::platform::{self, PlatformConfig};

/// MTU applied when none is requested.
pub const DEFAULT_MTU: u16 = 1500;

/// Upper bound for every external configuration command.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Smallest MTU an IPv4 interface may carry.
const MIN_MTU: u16 = 68;

/// Configuration builder for a TUN interface.
///
/// Nothing is checked until [`Configuration::validate`], which runs before
/// any device resource is opened.
#[derive(Clone, Default, Debug)]
pub struct Configuration {
    name: Option<String>,
    mtu: Option<u16>,
    address: Option<String>,
    timeout: Option<Duration>,
    platform_config: PlatformConfig,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tun name.
    ///
    /// On Linux this may be a template such as `tun%d` that the kernel
    /// completes. On macOS it must be of the form `utunN`.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn mtu(mut self, mtu: u16) -> Self {
        self.mtu = Some(mtu);
        self
    }

    /// Set the interface address in prefix notation, e.g. `10.0.0.1/24`.
    pub fn address<S: Into<String>>(mut self, prefix: S) -> Self {
        self.address = Some(prefix.into());
        self
    }

    /// Set the timeout applied to each external configuration command.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Access the platform-dependent configuration.
    pub fn platform_config<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut PlatformConfig),
    {
        f(&mut self.platform_config);
        self
    }

    /// Check every field and produce the settings a device is built from.
    pub fn validate(&self) -> Result<InterfaceConfig> {
        let address = self
            .address
            .as_deref()
            .ok_or_else(|| Error::InvalidConfig("missing address prefix".into()))?;
        let address = address
            .trim()
            .parse::<IpNet>()
            .map_err(|e| Error::InvalidConfig(format!("error cidr {address:?}: {e}")))?;

        let mtu = self.mtu.unwrap_or(DEFAULT_MTU);
        if mtu < MIN_MTU {
            return Err(Error::InvalidConfig(format!(
                "mtu {mtu} is below the minimum of {MIN_MTU}"
            )));
        }

        let name = self
            .name
            .clone()
            .unwrap_or_else(|| platform::DEFAULT_NAME.to_string());
        if name.contains('\0') {
            return Err(Error::InvalidConfig("device name contains NUL".into()));
        }
        platform::check_name(&name)?;

        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        if timeout.is_zero() {
            return Err(Error::InvalidConfig("timeout must be non-zero".into()));
        }

        Ok(InterfaceConfig {
            name,
            mtu,
            address,
            timeout,
            platform_config: self.platform_config.clone(),
        })
    }
}

/// Validated interface settings.
#[derive(Clone, Debug)]
pub struct InterfaceConfig {
    pub name: String,
    pub mtu: u16,
    pub address: IpNet,
    pub timeout: Duration,
    pub platform_config: PlatformConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply() {
        let config = Configuration::new().address("10.0.0.0/24").validate().unwrap();
        assert_eq!(config.mtu, DEFAULT_MTU);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.address.prefix_len(), 24);
        assert_eq!(config.name, platform::DEFAULT_NAME);
    }

    #[test]
    fn host_address_is_kept() {
        let config = Configuration::new()
            .address("10.26.1.100/24")
            .validate()
            .unwrap();
        assert_eq!(config.address.addr().to_string(), "10.26.1.100");
        assert_eq!(config.address.network().to_string(), "10.26.1.0");
    }

    #[test]
    fn rejects_malformed_prefix() {
        let err = Configuration::new().address("not-a-cidr").validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)), "{err}");
        let err = Configuration::new().validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)), "{err}");
    }

    #[test]
    fn rejects_bad_mtu_and_timeout() {
        let base = Configuration::new().address("10.0.0.1/24");
        assert!(matches!(
            base.clone().mtu(0).validate(),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            base.timeout(Duration::ZERO).validate(),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_overlong_name() {
        let err = Configuration::new()
            .address("10.0.0.1/24")
            .name("a-name-that-is-far-too-long-for-any-kernel")
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)), "{err}");
    }
}
