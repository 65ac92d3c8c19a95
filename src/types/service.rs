use std::net::IpAddr;

/// TXT record fields this client reads from discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxtRecord {
    /// Advertised device name.
    pub name: String,
    /// Stable per-device identifier, independent of IP/port.
    pub unique_identifier: String,
}

/// Discovery input: what an external mDNS/Bonjour browser hands this crate
/// before a connection is attempted. This crate never performs discovery
/// itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// Human-readable display name.
    pub display_name: String,
    /// Resolved addresses, in the order the resolver returned them.
    pub addresses: Vec<IpAddr>,
    /// MediaRemote TCP port.
    pub port: u16,
    /// TXT record fields.
    pub txt: TxtRecord,
}

impl ServiceDescriptor {
    /// Address this client connects to.
    ///
    /// Prefers `addresses[1]` over `addresses[0]` when more than one is
    /// present: empirically the second entry is the routable IPv4 address.
    /// This is a documented heuristic, overridable via
    /// [`crate::ClientConfig`], not an unconditional rule.
    #[must_use]
    pub fn preferred_address(&self, prefer_second: bool) -> Option<IpAddr> {
        if prefer_second {
            self.addresses
                .get(1)
                .or_else(|| self.addresses.first())
                .copied()
        } else {
            self.addresses.first().copied()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(addrs: Vec<&str>) -> ServiceDescriptor {
        ServiceDescriptor {
            display_name: "Living Room".to_string(),
            addresses: addrs.into_iter().map(|a| a.parse().unwrap()).collect(),
            port: 49152,
            txt: TxtRecord {
                name: "Living Room".to_string(),
                unique_identifier: "AA:BB:CC:DD:EE:FF".to_string(),
            },
        }
    }

    #[test]
    fn prefers_second_address_when_present() {
        let svc = descriptor(vec!["fe80::1", "192.168.1.50"]);
        assert_eq!(
            svc.preferred_address(true),
            Some("192.168.1.50".parse().unwrap())
        );
    }

    #[test]
    fn falls_back_to_first_address() {
        let svc = descriptor(vec!["192.168.1.50"]);
        assert_eq!(
            svc.preferred_address(true),
            Some("192.168.1.50".parse().unwrap())
        );
    }

    #[test]
    fn can_disable_second_address_preference() {
        let svc = descriptor(vec!["fe80::1", "192.168.1.50"]);
        assert_eq!(svc.preferred_address(false), Some("fe80::1".parse().unwrap()));
    }
}
