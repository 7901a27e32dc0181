use std::net::IpAddr;

use ipnet::IpNet;

use crate::command::Step;

/// Assign `address` statically to the interface at `index`.
pub(crate) fn set_interface_ip(index: u32, address: &IpNet) -> Step {
    let args: Vec<String> = match address.addr() {
        IpAddr::V4(addr) => vec![
            "interface".into(),
            "ip".into(),
            "set".into(),
            "address".into(),
            index.to_string(),
            "static".into(),
            addr.to_string(),
            address.netmask().to_string(),
        ],
        IpAddr::V6(_) => vec![
            "interface".into(),
            "ipv6".into(),
            "add".into(),
            "address".into(),
            index.to_string(),
            address.to_string(),
        ],
    };
    Step::new("netsh", args)
}

pub(crate) fn set_interface_mtu(index: u32, mtu: u16) -> Step {
    Step::new(
        "netsh",
        [
            "interface".to_string(),
            "ipv4".to_string(),
            "set".to_string(),
            "subinterface".to_string(),
            index.to_string(),
            format!("mtu={mtu}"),
            "store=persistent".to_string(),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_address_uses_netmask() {
        let net: IpNet = "10.0.0.1/24".parse().unwrap();
        assert_eq!(
            set_interface_ip(7, &net).to_string(),
            "netsh interface ip set address 7 static 10.0.0.1 255.255.255.0"
        );
        assert_eq!(
            set_interface_mtu(7, 1400).to_string(),
            "netsh interface ipv4 set subinterface 7 mtu=1400 store=persistent"
        );
    }
}
