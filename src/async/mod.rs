//! Tokio counterparts of the relay and accept loop, plus an async device.

#[cfg(unix)]
mod device;
#[cfg(unix)]
pub use device::AsyncDevice;

mod relay;
pub use relay::Proxy;

mod server;
pub use server::{Accept, Server};

#[cfg(unix)]
use crate::configuration::Configuration;

/// Create the interface described by `config` and register it with tokio.
#[cfg(unix)]
pub fn create_as_async(config: &Configuration) -> crate::Result<AsyncDevice> {
    let device = crate::Drive::new(config)?.into_device();
    Ok(AsyncDevice::new(device)?)
}
