use std::net::Ipv4Addr;
use std::time::Duration;

use crate::command::{Exec, Step, System};
use crate::error::{Error, Result};

/// Discover the host's default IPv4 gateway from the routing table.
pub fn ipv4_gateway(timeout: Duration) -> Result<Ipv4Addr> {
    ipv4_gateway_with(&System, timeout)
}

pub(crate) fn ipv4_gateway_with<E: Exec>(exec: &E, timeout: Duration) -> Result<Ipv4Addr> {
    let step = lookup_step()?;
    let output = exec.exec(&step, timeout)?;
    parse(&output).ok_or_else(|| Error::String(format!("unable to find default gateway in `{step}`")))
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        fn lookup_step() -> Result<Step> {
            Ok(Step::new("sh", ["-c", "route -n | grep 'UG[ \t]' | awk 'NR==1{print $2}'"]))
        }
    } else if #[cfg(target_os = "macos")] {
        fn lookup_step() -> Result<Step> {
            Ok(Step::new("sh", ["-c", "route -n get default | grep 'gateway' | awk 'NR==1{print $2}'"]))
        }
    } else if #[cfg(target_os = "windows")] {
        fn lookup_step() -> Result<Step> {
            Ok(Step::new("route", ["print", "0.0.0.0"]))
        }
    } else {
        fn lookup_step() -> Result<Step> {
            Err(Error::String("default gateway lookup is unsupported on this system".into()))
        }
    }
}

fn parse(output: &str) -> Option<Ipv4Addr> {
    if cfg!(target_os = "windows") {
        parse_route_print(output)
    } else {
        parse_address(output)
    }
}

/// Output already reduced to the gateway address by the shell pipeline.
pub(crate) fn parse_address(output: &str) -> Option<Ipv4Addr> {
    output.trim().parse().ok()
}

/// First `0.0.0.0` row of `route print`; the gateway is its third column.
pub(crate) fn parse_route_print(output: &str) -> Option<Ipv4Addr> {
    output.lines().find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() > 2 && fields[0] == "0.0.0.0" {
            fields[2].parse().ok()
        } else {
            None
        }
    })
}
