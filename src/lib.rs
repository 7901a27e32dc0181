/*!
# Example:
```no_run
use tun_drive::{Configuration, Drive};
let config = Configuration::new()
            .name("tun7")
            .address("10.0.0.12/24")
            .mtu(1400);
let drive = Drive::new(&config)?;
drive.up()?;
let mut buf = [0; 65535];
loop {
    let len = drive.recv(&mut buf)?;
    println!("buf= {:?}", &buf[..len]);
}
# Ok::<(), Box<dyn std::error::Error>>(())
```
# Example relay:
```no_run
use std::net::TcpListener;
use std::sync::Arc;
use tun_drive::{Configuration, Drive, Proxy, Server};
let drive = Arc::new(Drive::new(&Configuration::new().address("10.0.0.1/24"))?);
drive.up()?;
let listener = TcpListener::bind("0.0.0.0:7000")?;
Server::new().serve(&listener, move |stream| {
    let proxy = Proxy::new();
    let _ = proxy.copy(Arc::new(stream), drive.clone());
})?;
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/

#![cfg_attr(docsrs, feature(doc_cfg))]

pub use crate::command::{Exec, Step, System};
pub use crate::configuration::{Configuration, InterfaceConfig, DEFAULT_MTU, DEFAULT_TIMEOUT};
pub use crate::configurer::{Configurer, Policy};
pub use crate::drive::Drive;
pub use crate::error::{AcceptError, BoxError, CommandError, Error, Result};
pub use crate::gateway::ipv4_gateway;
pub use crate::handle::{Handle, RawDevice};
pub use crate::platform::{create, Device, Factory, Native, PlatformConfig};
pub use crate::relay::Proxy;
pub use crate::report::{Fault, LogReport, Report};
pub use crate::route::{Route, RouteAction};
pub use crate::server::{Listener, Server, CLOSED_LISTENER};

mod error;

pub mod command;
mod configuration;
mod configurer;
mod drive;
mod gateway;
mod handle;
pub mod platform;
mod relay;
mod report;
mod route;
mod server;

#[cfg_attr(docsrs, doc(cfg(feature = "async_tokio")))]
#[cfg(feature = "async_tokio")]
pub mod r#async;

/// Length of the address-family header utun puts in front of every packet.
pub const PACKET_INFORMATION_LENGTH: usize = 4;
