//! Network interface enumeration and selection.
//!
//! The client needs one local unicast address, the matching directed
//! broadcast address and, for its ArtPollReply, the hardware address. This
//! module lists the candidates and picks one under a configurable ranking,
//! so integrators can swap the policy without touching the client.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// One candidate network interface
#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    /// OS interface name, empty for a manually supplied address pair
    pub name: String,
    /// Local unicast address
    pub ip: Ipv4Addr,
    /// Directed broadcast address of the subnet
    pub broadcast: Ipv4Addr,
    /// Subnet mask
    pub netmask: Ipv4Addr,
    /// Hardware address, zero when the OS cannot supply it
    pub mac: [u8; 6],
}

impl InterfaceInfo {
    /// Wrap a manually configured address pair.
    pub fn manual(ip: Ipv4Addr, broadcast: Ipv4Addr) -> Self {
        Self {
            name: String::new(),
            ip,
            broadcast,
            netmask: Ipv4Addr::UNSPECIFIED,
            mac: [0; 6],
        }
    }
}

/// One rule of the interface ranking. The first rule that matches any
/// candidate wins; candidates are tried in OS enumeration order per rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterfacePreference {
    /// An address inside 2.0.0.0/8 with the classful /8 netmask, the
    /// primary Art-Net addressing scheme
    ArtNetPrimary,
    /// The interface name starts with the given prefix
    NamePrefix(String),
    /// Any interface carrying an IPv4 address
    AnyIpv4,
}

/// The default ranking: Art-Net primary network, then wired, then wireless,
/// then anything with an IPv4 address.
pub fn default_ranking() -> Vec<InterfacePreference> {
    vec![
        InterfacePreference::ArtNetPrimary,
        InterfacePreference::NamePrefix("enp".to_string()),
        InterfacePreference::NamePrefix("wlp".to_string()),
        InterfacePreference::AnyIpv4,
    ]
}

fn matches(candidate: &InterfaceInfo, preference: &InterfacePreference) -> bool {
    match preference {
        InterfacePreference::ArtNetPrimary => {
            candidate.ip.octets()[0] == 2 && candidate.netmask == Ipv4Addr::new(255, 0, 0, 0)
        }
        InterfacePreference::NamePrefix(prefix) => candidate.name.starts_with(prefix.as_str()),
        InterfacePreference::AnyIpv4 => true,
    }
}

/// Pick the best candidate under the given ranking. Pure, so integrators can
/// evaluate their own candidate lists against a policy.
pub fn rank<'a>(
    candidates: &'a [InterfaceInfo],
    ranking: &[InterfacePreference],
) -> Option<&'a InterfaceInfo> {
    ranking.iter().find_map(|preference| {
        candidates
            .iter()
            .find(|candidate| matches(candidate, preference))
    })
}

/// Enumerate the usable IPv4 interfaces of this host.
pub fn candidates() -> Vec<InterfaceInfo> {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            log::warn!("could not enumerate interfaces: {}", e);
            return Vec::new();
        }
    };

    let mut found = Vec::new();
    for interface in interfaces {
        if interface.is_loopback() {
            continue;
        }
        if let if_addrs::IfAddr::V4(v4) = &interface.addr {
            let broadcast = v4
                .broadcast
                .unwrap_or_else(|| directed_broadcast(v4.ip, v4.netmask));
            let mac = mac_address::mac_address_by_name(&interface.name)
                .ok()
                .flatten()
                .map(|mac| mac.bytes())
                .unwrap_or([0; 6]);
            found.push(InterfaceInfo {
                name: interface.name.clone(),
                ip: v4.ip,
                broadcast,
                netmask: v4.netmask,
                mac,
            });
        }
    }
    found
}

fn directed_broadcast(ip: Ipv4Addr, netmask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(ip) | !u32::from(netmask))
}

/// Resolve an interface by its OS name.
pub fn resolve_named(name: &str) -> Result<InterfaceInfo> {
    candidates()
        .into_iter()
        .find(|candidate| candidate.name == name)
        .ok_or_else(|| Error::UnknownInterface(name.to_string()))
}

/// Resolve the best interface under a ranking.
pub fn resolve_auto(ranking: &[InterfacePreference]) -> Result<InterfaceInfo> {
    let candidates = candidates();
    rank(&candidates, ranking)
        .cloned()
        .ok_or(Error::NoUsableInterface)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, ip: [u8; 4], netmask: [u8; 4]) -> InterfaceInfo {
        InterfaceInfo {
            name: name.to_string(),
            ip: ip.into(),
            broadcast: directed_broadcast(ip.into(), netmask.into()),
            netmask: netmask.into(),
            mac: [0; 6],
        }
    }

    #[test]
    fn ranking_prefers_artnet_primary_then_wired_then_wireless() {
        let list = vec![
            candidate("wlp3s0", [192, 168, 1, 10], [255, 255, 255, 0]),
            candidate("enp5s0", [10, 0, 0, 2], [255, 255, 255, 0]),
            candidate("enp6s0", [2, 0, 0, 1], [255, 0, 0, 0]),
        ];
        let ranking = default_ranking();

        assert_eq!(rank(&list, &ranking).unwrap().name, "enp6s0");
        assert_eq!(rank(&list[..2], &ranking).unwrap().name, "enp5s0");
        assert_eq!(rank(&list[..1], &ranking).unwrap().name, "wlp3s0");
        assert!(rank(&[], &ranking).is_none());

        // a 2.x address behind the wrong netmask is not the primary network
        let masked = vec![candidate("eth0", [2, 0, 0, 1], [255, 255, 255, 0])];
        assert_eq!(rank(&masked, &ranking).unwrap().name, "eth0");
        assert!(!matches(&masked[0], &InterfacePreference::ArtNetPrimary));
    }

    #[test]
    fn custom_ranking_overrides_the_default_order() {
        let list = vec![
            candidate("enp5s0", [10, 0, 0, 2], [255, 255, 255, 0]),
            candidate("tap0", [172, 16, 0, 1], [255, 255, 0, 0]),
        ];
        let ranking = vec![InterfacePreference::NamePrefix("tap".to_string())];
        assert_eq!(rank(&list, &ranking).unwrap().name, "tap0");
    }

    #[test]
    fn directed_broadcast_fills_the_host_bits() {
        assert_eq!(
            directed_broadcast([192, 168, 1, 10].into(), [255, 255, 255, 0].into()),
            Ipv4Addr::new(192, 168, 1, 255)
        );
        assert_eq!(
            directed_broadcast([2, 0, 0, 1].into(), [255, 0, 0, 0].into()),
            Ipv4Addr::new(2, 255, 255, 255)
        );
    }
}
