use std::net::IpAddr;

use ipnet::IpNet;

/// What to do with a [`Route`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RouteAction {
    Add,
    Change,
    Delete,
}

impl RouteAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteAction::Add => "add",
            RouteAction::Change => "change",
            RouteAction::Delete => "delete",
        }
    }
}

/// A route towards `destination`, optionally through `gateway`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Route {
    pub destination: IpNet,
    pub gateway: Option<IpAddr>,
}

impl Route {
    pub fn new(destination: IpNet) -> Self {
        Self {
            destination: destination.trunc(),
            gateway: None,
        }
    }

    pub fn via(mut self, gateway: IpAddr) -> Self {
        self.gateway = Some(gateway);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_is_normalised() {
        let route = Route::new("10.1.2.3/16".parse().unwrap());
        assert_eq!(route.destination.to_string(), "10.1.0.0/16");
        assert_eq!(route.gateway, None);
        assert_eq!(RouteAction::Change.as_str(), "change");
    }
}
