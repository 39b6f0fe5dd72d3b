//! IPv4 subnet handling with CIDR support
//!
//! Expands a subnet into the host addresses that can be whitelisted or blacklisted one
//! request at a time.

use std::{fmt, net::Ipv4Addr, str::FromStr};

use thiserror::Error;

/// Default cap on the number of hosts a single run may expand subnets into
pub const DEFAULT_MAX_SUBNET_HOSTS: u64 = 4096;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubnetError {
    #[error("Invalid subnet '{input}': expected CIDR notation such as 200.0.0.0/27")]
    MissingPrefix { input: String },

    #[error("Invalid IPv4 address in subnet '{input}'")]
    InvalidAddress { input: String },

    #[error("Invalid prefix length in subnet '{input}': must be between 0 and 32")]
    InvalidPrefix { input: String },

    #[error("Subnets expand to {hosts} hosts, more than the limit of {limit}")]
    TooManyHosts { hosts: u64, limit: u64 },
}

/// CIDR network representation, normalized to its network address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Network {
    addr: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Network {
    /// Create a network from an address and prefix length, masking off host bits
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Option<Self> {
        if prefix_len > 32 {
            return None;
        }
        let network = u32::from(addr) & Self::mask_for(prefix_len);
        Some(Self {
            addr: Ipv4Addr::from(network),
            prefix_len,
        })
    }

    /// Parse from CIDR notation (e.g., "200.0.0.0/27")
    pub fn parse(s: &str) -> Result<Self, SubnetError> {
        let s = s.trim();
        let (ip_str, prefix_str) = s.split_once('/').ok_or_else(|| SubnetError::MissingPrefix {
            input: s.to_string(),
        })?;
        let addr = Ipv4Addr::from_str(ip_str).map_err(|_| SubnetError::InvalidAddress {
            input: s.to_string(),
        })?;
        let prefix_len: u8 = prefix_str.parse().map_err(|_| SubnetError::InvalidPrefix {
            input: s.to_string(),
        })?;
        let network = Self::new(addr, prefix_len).ok_or_else(|| SubnetError::InvalidPrefix {
            input: s.to_string(),
        })?;

        if network.addr != addr {
            tracing::debug!("Subnet {s} has host bits set, using {network}");
        }
        Ok(network)
    }

    fn mask_for(prefix_len: u8) -> u32 {
        if prefix_len == 0 {
            0
        } else {
            !0u32 << (32 - prefix_len)
        }
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn network(&self) -> Ipv4Addr {
        self.addr
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.addr) | !Self::mask_for(self.prefix_len))
    }

    /// Check if an IP address is contained in this network
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        let mask = Self::mask_for(self.prefix_len);
        (u32::from(self.addr) & mask) == (u32::from(ip) & mask)
    }

    /// Inclusive first/last usable host as integers.
    ///
    /// /32 is the single host and /31 is a point-to-point pair; both lack a
    /// network/broadcast pair to exclude.
    fn usable_bounds(&self) -> (u32, u32) {
        let first = u32::from(self.addr);
        let last = u32::from(self.broadcast());
        if self.prefix_len >= 31 {
            (first, last)
        } else {
            (first + 1, last - 1)
        }
    }

    /// Number of usable hosts, computed without iterating
    pub fn host_count(&self) -> u64 {
        let (first, last) = self.usable_bounds();
        u64::from(last - first) + 1
    }

    /// Usable host addresses in ascending order
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> + use<> {
        let (first, last) = self.usable_bounds();
        (first..=last).map(Ipv4Addr::from)
    }
}

impl fmt::Display for Ipv4Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

impl FromStr for Ipv4Network {
    type Err = SubnetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ipv4Network::parse(s)
    }
}

/// Expand subnets into their usable hosts, refusing to exceed `max_hosts` in total
pub fn expand_subnets(
    subnets: &[Ipv4Network],
    max_hosts: u64,
) -> Result<Vec<Ipv4Addr>, SubnetError> {
    let total: u64 = subnets.iter().map(Ipv4Network::host_count).sum();
    if total > max_hosts {
        return Err(SubnetError::TooManyHosts {
            hosts: total,
            limit: max_hosts,
        });
    }

    let hosts: Vec<Ipv4Addr> = subnets.iter().flat_map(Ipv4Network::hosts).collect();
    tracing::debug!("Expanded {} subnet(s) into {} host(s)", subnets.len(), hosts.len());
    Ok(hosts)
}
