//! Best-guess local IPv4 address, used to locate the control server.
//!
//! Deployments run the control server on the same LAN as the agents, on a
//! well-known port, so when no explicit URL is configured the agent assumes
//! the server listens on its own best LAN address.  "Best" prefers home/office
//! private ranges over carrier-grade NAT and public addresses:
//!
//! | Prefix      | Priority |
//! |-------------|----------|
//! | `192.168.`  | 1        |
//! | `10.`       | 2        |
//! | `172.`      | 3        |
//! | `100.`      | 4        |
//! | anything    | 99       |
//!
//! Ties keep interface order (interfaces sorted by name).

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};

use sysinfo::Networks;

/// Ranking of an address; lower is better.
pub fn priority(ip: Ipv4Addr) -> u8 {
    match ip.octets() {
        [192, 168, ..] => 1,
        [10, ..] => 2,
        [172, ..] => 3,
        [100, ..] => 4,
        _ => 99,
    }
}

/// Picks the best address; the first of equally ranked candidates wins.
pub fn rank(candidates: impl IntoIterator<Item = Ipv4Addr>) -> Option<Ipv4Addr> {
    candidates.into_iter().min_by_key(|ip| priority(*ip))
}

/// Every non-loopback IPv4 address on the machine's interfaces.
pub fn candidate_addresses() -> Vec<Ipv4Addr> {
    let networks = Networks::new_with_refreshed_list();
    let by_name: BTreeMap<&str, _> = networks.iter().map(|(n, d)| (n.as_str(), d)).collect();

    by_name
        .values()
        .flat_map(|data| data.ip_networks())
        .filter_map(|net| match net.addr {
            IpAddr::V4(v4) if !v4.is_loopback() && !v4.is_unspecified() => Some(v4),
            _ => None,
        })
        .collect()
}

/// The best local IPv4 address, if the machine has any.
pub fn best_local_ipv4() -> Option<Ipv4Addr> {
    rank(candidate_addresses())
}

/// `ws://<ip>:<port>`, falling back to loopback when no address is known.
pub fn server_endpoint(ip: Option<Ipv4Addr>, port: u16) -> String {
    format!("ws://{}:{port}", ip.unwrap_or(Ipv4Addr::LOCALHOST))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    #[test]
    fn test_priority_table() {
        assert_eq!(priority(ip("192.168.1.20")), 1);
        assert_eq!(priority(ip("10.4.0.7")), 2);
        assert_eq!(priority(ip("172.31.255.1")), 3);
        assert_eq!(priority(ip("100.64.0.9")), 4);
        assert_eq!(priority(ip("8.8.8.8")), 99);
        assert_eq!(priority(ip("192.169.0.1")), 99);
    }

    #[test]
    fn test_rank_prefers_private_ranges() {
        // Arrange
        let candidates = [ip("100.70.1.1"), ip("10.0.0.3"), ip("192.168.0.40"), ip("172.17.0.1")];

        // Act / Assert
        assert_eq!(rank(candidates), Some(ip("192.168.0.40")));
    }

    #[test]
    fn test_rank_keeps_first_of_equal_priority() {
        let candidates = [ip("10.0.0.9"), ip("10.0.0.2")];
        assert_eq!(rank(candidates), Some(ip("10.0.0.9")));
    }

    #[test]
    fn test_rank_of_nothing_is_none() {
        assert_eq!(rank(Vec::new()), None);
    }

    #[test]
    fn test_server_endpoint_falls_back_to_loopback() {
        assert_eq!(server_endpoint(None, 3000), "ws://127.0.0.1:3000");
        assert_eq!(server_endpoint(Some(ip("192.168.0.5")), 8080), "ws://192.168.0.5:8080");
    }

    #[test]
    fn test_candidate_addresses_exclude_loopback() {
        assert!(candidate_addresses().iter().all(|a| !a.is_loopback()));
    }
}
