use std::net::{IpAddr, SocketAddr};

/// The address family a process gossips in. Fixed at start-up; every IP field
/// on the wire is `ip_len()` bytes wide and families are never mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, clap::ValueEnum)]
pub enum AddressFamily {
    #[default]
    V4,
    V6,
}

impl AddressFamily {
    #[inline]
    pub const fn ip_len(self) -> usize {
        match self {
            AddressFamily::V4 => 4,
            AddressFamily::V6 => 16,
        }
    }

    pub fn of(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }

    /// Rewrites `addr` into this family's canonical form: IPv4-mapped IPv6
    /// addresses narrow to IPv4 in V4 mode, IPv4 widens to its mapped form in V6
    /// mode. Returns `None` for IPv6 addresses a V4 process cannot express.
    pub fn canonicalize(self, addr: SocketAddr) -> Option<SocketAddr> {
        let ip = match (self, addr.ip()) {
            (AddressFamily::V4, IpAddr::V4(v4)) => IpAddr::V4(v4),
            (AddressFamily::V4, IpAddr::V6(v6)) => IpAddr::V4(v6.to_ipv4_mapped()?),
            (AddressFamily::V6, IpAddr::V4(v4)) => IpAddr::V6(v4.to_ipv6_mapped()),
            (AddressFamily::V6, IpAddr::V6(v6)) => IpAddr::V6(v6),
        };
        Some(SocketAddr::new(ip, addr.port()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip_len_per_family() {
        assert_eq!(AddressFamily::V4.ip_len(), 4);
        assert_eq!(AddressFamily::V6.ip_len(), 16);
    }

    #[test]
    fn canonicalize_narrows_and_widens() {
        let mapped: SocketAddr = "[::ffff:10.0.0.1]:9000".parse().unwrap();
        let plain: SocketAddr = "10.0.0.1:9000".parse().unwrap();

        assert_eq!(AddressFamily::V4.canonicalize(mapped), Some(plain));
        assert_eq!(AddressFamily::V6.canonicalize(plain), Some(mapped));
    }

    #[test]
    fn pure_ipv6_is_not_expressible_in_v4_mode() {
        let v6: SocketAddr = "[fe80::1]:9000".parse().unwrap();
        assert_eq!(AddressFamily::V4.canonicalize(v6), None);
        assert_eq!(AddressFamily::V6.canonicalize(v6), Some(v6));
    }
}
