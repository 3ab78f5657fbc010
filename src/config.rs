use std::net::{IpAddr, SocketAddr};
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;

use crate::clusters::{AddressFamily, ClusterOptions, max_broadcast_payload};

pub static ENV: LazyLock<Environment> = LazyLock::new(Environment::parse);

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Environment {
    #[arg(long, env = "GOSSIPGUARD_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// TCP port of the RPC control plane.
    #[arg(short, long, env = "GOSSIPGUARD_PORT", default_value_t = 2921)]
    pub port: u16,

    /// UDP port the gossip protocol runs on.
    #[arg(long, env = "GOSSIPGUARD_CLUSTER_PORT", default_value_t = 2922)]
    pub cluster_port: u16,

    #[arg(long, env = "GOSSIPGUARD_ADDRESS_FAMILY", value_enum, default_value_t = AddressFamily::V4)]
    pub address_family: AddressFamily,

    /// Protocol period. Rounded up to whole 100 ms ticks.
    #[arg(long, env = "GOSSIPGUARD_HEARTBEAT_MS", default_value_t = 1000)]
    pub heartbeat_ms: u64,

    #[arg(long, env = "GOSSIPGUARD_JOIN_SEED_NODES", value_delimiter = ',')]
    pub join_seed_nodes: Vec<SocketAddr>,

    #[arg(long, env = "GOSSIPGUARD_MAX_BROADCAST_BYTES", default_value_t = 256)]
    pub max_broadcast_bytes: usize,

    #[arg(long, env = "GOSSIPGUARD_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Environment {
    pub(crate) fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub(crate) fn host_ip(&self) -> anyhow::Result<IpAddr> {
        self.host
            .parse()
            .with_context(|| format!("host '{}' is not an IP address", self.host))
    }

    pub(crate) fn peer_bind_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(SocketAddr::new(self.host_ip()?, self.cluster_port))
    }

    /// Rejects settings the gossip wire format cannot carry.
    pub fn validate(&self) -> anyhow::Result<()> {
        let host = self.host_ip()?;
        if AddressFamily::of(host) != self.address_family {
            bail!(
                "host {} does not belong to address family {:?}",
                host,
                self.address_family
            );
        }

        for seed in &self.join_seed_nodes {
            if self.address_family.canonicalize(*seed).is_none() {
                bail!(
                    "seed {} cannot be reached in address family {:?}",
                    seed,
                    self.address_family
                );
            }
        }

        let limit = max_broadcast_payload(self.address_family);
        if self.max_broadcast_bytes > limit {
            bail!(
                "max_broadcast_bytes {} does not fit in one datagram (at most {} for {:?})",
                self.max_broadcast_bytes,
                limit,
                self.address_family
            );
        }
        Ok(())
    }

    pub(crate) fn cluster_options(&self) -> anyhow::Result<ClusterOptions> {
        Ok(ClusterOptions {
            bind_addr: self.peer_bind_addr()?,
            family: self.address_family,
            seeds: self.join_seed_nodes.clone(),
            protocol_period: Duration::from_millis(self.heartbeat_ms),
            max_broadcast_bytes: self.max_broadcast_bytes,
        })
    }
}

pub const SERDE_CONFIG: bincode::config::Configuration = bincode::config::standard();

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serial_test::serial;

    fn make_env() -> Environment {
        Environment {
            host: "127.0.0.1".into(),
            port: 2921,
            cluster_port: 2922,
            address_family: AddressFamily::V4,
            heartbeat_ms: 1000,
            join_seed_nodes: vec![],
            max_broadcast_bytes: 256,
            log_level: "info".into(),
        }
    }

    #[test]
    fn test_address_formatting() {
        let env = Environment {
            port: 3000,
            cluster_port: 3001,
            ..make_env()
        };

        assert_eq!(env.bind_addr(), "127.0.0.1:3000");
        assert_eq!(
            env.peer_bind_addr().unwrap(),
            "127.0.0.1:3001".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_hostname_is_rejected_for_peer_binding() {
        let env = Environment {
            host: "localhost".into(),
            ..make_env()
        };
        assert!(env.peer_bind_addr().is_err());
    }

    #[test]
    #[serial]
    fn test_defaults() {
        let env = Environment::try_parse_from(vec!["gossipguard"]).expect("Failed to parse defaults");

        assert_eq!(env.host, "127.0.0.1");
        assert_eq!(env.port, 2921);
        assert_eq!(env.cluster_port, 2922);
        assert_eq!(env.address_family, AddressFamily::V4);
        assert_eq!(env.heartbeat_ms, 1000);
        assert!(env.join_seed_nodes.is_empty());
        assert_eq!(env.max_broadcast_bytes, 256);
        assert_eq!(env.log_level, "info");
    }

    #[test]
    #[serial]
    fn test_flags_override() {
        let args = vec![
            "gossipguard",
            "-p",
            "9999",
            "--host",
            "::1", // -h is preserved for --help.
            "--address-family",
            "v6",
            "--heartbeat-ms",
            "250",
            "--log-level",
            "debug",
        ];

        let env = Environment::try_parse_from(args).expect("Failed to parse flags");

        assert_eq!(env.port, 9999);
        assert_eq!(env.host, "::1");
        assert_eq!(env.address_family, AddressFamily::V6);
        assert_eq!(env.heartbeat_ms, 250);
        assert_eq!(env.log_level, "debug");
        assert!(env.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_join_flags() {
        let args = vec![
            "gossipguard",
            "--join-seed-nodes",
            "10.0.0.1:2922",
            "--join-seed-nodes",
            "10.0.0.2:2922,10.0.0.3:2922",
        ];

        let env = Environment::try_parse_from(args).expect("Failed to parse join flags");

        assert_eq!(
            env.join_seed_nodes,
            vec![
                "10.0.0.1:2922".parse::<SocketAddr>().unwrap(),
                "10.0.0.2:2922".parse().unwrap(),
                "10.0.0.3:2922".parse().unwrap(),
            ]
        );
    }

    #[test]
    #[serial]
    fn test_env_vars_override() {
        unsafe {
            std::env::set_var("GOSSIPGUARD_PORT", "8888");
            std::env::set_var("GOSSIPGUARD_HOST", "0.0.0.0");
            std::env::set_var("GOSSIPGUARD_JOIN_SEED_NODES", "10.0.0.1:2922,10.0.0.2:2922");
        }

        let env = Environment::try_parse_from(vec!["gossipguard"]).expect("Failed to parse env vars");

        assert_eq!(env.port, 8888);
        assert_eq!(env.host, "0.0.0.0");
        assert_eq!(env.join_seed_nodes.len(), 2);

        unsafe {
            std::env::remove_var("GOSSIPGUARD_PORT");
            std::env::remove_var("GOSSIPGUARD_HOST");
            std::env::remove_var("GOSSIPGUARD_JOIN_SEED_NODES");
        }
    }

    #[test]
    #[serial]
    fn test_invalid_input() {
        assert!(Environment::try_parse_from(vec!["gossipguard", "--port", "not-a-number"]).is_err());
        assert!(Environment::try_parse_from(vec!["gossipguard", "--address-family", "v5"]).is_err());
        assert!(
            Environment::try_parse_from(vec!["gossipguard", "--join-seed-nodes", "nowhere"]).is_err()
        );
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(make_env().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_family_mismatch() {
        let env = Environment {
            host: "::1".into(),
            ..make_env()
        };
        assert!(env.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unreachable_seed() {
        let env = Environment {
            join_seed_nodes: vec!["[2001:db8::1]:2922".parse().unwrap()],
            ..make_env()
        };
        assert!(env.validate().is_err());

        // Mapped IPv4 seeds are fine in v4 mode.
        let env = Environment {
            join_seed_nodes: vec!["[::ffff:10.0.0.1]:2922".parse().unwrap()],
            ..make_env()
        };
        assert!(env.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_oversized_broadcast_limit() {
        let env = Environment {
            max_broadcast_bytes: 70_000,
            ..make_env()
        };
        assert!(env.validate().is_err());

        // Within the u16 length field but too big for a UDP datagram.
        let env = Environment {
            max_broadcast_bytes: u16::MAX as usize,
            ..make_env()
        };
        assert!(env.validate().is_err());
    }

    #[test]
    fn test_validate_broadcast_limit_boundary() {
        let limit = max_broadcast_payload(AddressFamily::V4);
        assert!(limit < 65_507);

        let env = Environment {
            max_broadcast_bytes: limit,
            ..make_env()
        };
        assert!(env.validate().is_ok());

        let env = Environment {
            max_broadcast_bytes: limit + 1,
            ..make_env()
        };
        assert!(env.validate().is_err());

        // Wider addresses leave less room.
        assert!(max_broadcast_payload(AddressFamily::V6) < limit);
    }
}
