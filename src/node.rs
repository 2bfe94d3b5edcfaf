use crate::command::PollReply;
use crate::PortAddress;
use std::collections::{BTreeSet, HashMap};
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// Identity of an observed peer. One IP can host several logical nodes, one
/// per bindIndex, each carrying up to 4 input and 4 output ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    /// Source address the node's replies arrive from
    pub ip: Ipv4Addr,
    /// Sub-device order within that IP, 1 being the root device
    pub bind_index: u8,
}

/// Which way DMX flows through a port, seen from the advertising node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PortDirection {
    /// The node transmits ArtDmx into the universe
    Input,
    /// The node consumes ArtDmx from the universe
    Output,
}

/// The protocol spoken on a port, from the low nibble of PortTypes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortProtocol {
    /// DMX512, the only protocol that takes part in universe tracking
    Dmx,
    /// Anything else (MIDI, Avab, ...); recorded but not tracked
    Other(u8),
}

/// One advertised port of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Port {
    /// The universe the port is patched to
    pub address: PortAddress,
    /// Input or output
    pub direction: PortDirection,
    /// Protocol selector
    pub protocol: PortProtocol,
}

impl Port {
    fn membership(&self) -> Option<(PortAddress, PortDirection)> {
        match self.protocol {
            PortProtocol::Dmx => Some((self.address, self.direction)),
            PortProtocol::Other(_) => None,
        }
    }
}

/// An Art-Net peer observed through its ArtPollReply traffic
#[derive(Debug, Clone)]
pub struct Node {
    /// (ip, bindIndex) identity
    pub id: NodeId,
    /// Hardware address, zero when the node cannot supply it
    pub mac: [u8; 6],
    /// Short name advertised by the node
    pub short_name: String,
    /// Long name advertised by the node
    pub long_name: String,
    /// ESTA manufacturer code
    pub esta_code: u16,
    /// Equipment vendor word
    pub oem: [u8; 2],
    /// Equipment style code
    pub style: u8,
    /// Ports advertised for this bindIndex, fully replaced on every reply
    pub ports: Vec<Port>,
    /// When the last reply for this bindIndex arrived
    pub last_seen: Instant,
}

/// Extract the advertised ports of one reply. Each populated slot can carry
/// an input and an output at once; the universe nibble comes from SwIn/SwOut
/// and the upper bits from NetSwitch/SubSwitch.
pub(crate) fn ports_from_reply(reply: &PollReply) -> Vec<Port> {
    let net = reply.net_switch & 0x7F;
    let subnet = reply.sub_switch & 0x0F;
    let mut ports = Vec::new();
    for slot in 0..reply.port_count() {
        let kind = reply.port_types[slot];
        let protocol = match kind & 0x0F {
            0 => PortProtocol::Dmx,
            other => PortProtocol::Other(other),
        };
        if kind & 0x80 != 0 {
            if let Ok(address) = PortAddress::new(net, subnet, reply.swin[slot] & 0x0F) {
                ports.push(Port {
                    address,
                    direction: PortDirection::Input,
                    protocol,
                });
            }
        }
        if kind & 0x40 != 0 {
            if let Ok(address) = PortAddress::new(net, subnet, reply.swout[slot] & 0x0F) {
                ports.push(Port {
                    address,
                    direction: PortDirection::Output,
                    protocol,
                });
            }
        }
    }
    ports
}

/// Universe memberships gained and lost by one node, produced by an upsert
/// or a sweep and consumed by the universe registry.
#[derive(Debug, Clone)]
pub(crate) struct MembershipDiff {
    pub node: NodeId,
    pub added: Vec<(PortAddress, PortDirection)>,
    pub removed: Vec<(PortAddress, PortDirection)>,
}

fn memberships(ports: &[Port]) -> BTreeSet<(PortAddress, PortDirection)> {
    ports.iter().filter_map(Port::membership).collect()
}

/// The set of known peers, keyed by (ip, bindIndex), with TTL-based expiry.
pub(crate) struct NodeRegistry {
    nodes: HashMap<NodeId, Node>,
    ttl: Duration,
}

impl NodeRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            nodes: HashMap::new(),
            ttl,
        }
    }

    /// Create or update the node a reply describes, fully replacing its port
    /// list, and report the memberships that changed.
    pub fn upsert_from_reply(
        &mut self,
        reply: &PollReply,
        src_ip: Ipv4Addr,
        now: Instant,
    ) -> MembershipDiff {
        let id = NodeId {
            ip: src_ip,
            bind_index: reply.bind_index,
        };
        let ports = ports_from_reply(reply);
        let new = memberships(&ports);
        let old = self
            .nodes
            .get(&id)
            .map(|node| memberships(&node.ports))
            .unwrap_or_default();

        self.nodes.insert(
            id,
            Node {
                id,
                mac: reply.mac,
                short_name: reply.short_name_str(),
                long_name: reply.long_name_str(),
                esta_code: reply.esta_code,
                oem: reply.oem,
                style: reply.style,
                ports,
                last_seen: now,
            },
        );

        MembershipDiff {
            node: id,
            added: new.difference(&old).copied().collect(),
            removed: old.difference(&new).copied().collect(),
        }
    }

    /// Drop every node that has not been heard from within the TTL and
    /// report the memberships each of them held.
    pub fn sweep(&mut self, now: Instant) -> Vec<MembershipDiff> {
        let ttl = self.ttl;
        let expired: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|node| now.duration_since(node.last_seen) > ttl)
            .map(|node| node.id)
            .collect();

        expired
            .into_iter()
            .filter_map(|id| self.nodes.remove(&id))
            .map(|node| MembershipDiff {
                node: node.id,
                added: Vec::new(),
                removed: memberships(&node.ports).into_iter().collect(),
            })
            .collect()
    }

    /// Stable snapshot, ordered by (ip, bindIndex).
    pub fn list(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.nodes.values().cloned().collect();
        nodes.sort_by_key(|node| node.id);
        nodes
    }
}

/// The identity and port configuration this process advertises.
#[derive(Debug, Clone)]
pub(crate) struct LocalNode {
    pub short_name: String,
    pub long_name: String,
    pub esta_code: u16,
    pub oem: [u8; 2],
    pub style: u8,
    pub ports: Vec<Port>,
}

impl LocalNode {
    /// Reconfigure the local ports at one address. Idempotent: the previous
    /// entries for the address are replaced.
    pub fn set_port(&mut self, address: PortAddress, is_input: bool, is_output: bool) {
        self.ports.retain(|port| port.address != address);
        if is_input {
            self.ports.push(Port {
                address,
                direction: PortDirection::Input,
                protocol: PortProtocol::Dmx,
            });
        }
        if is_output {
            self.ports.push(Port {
                address,
                direction: PortDirection::Output,
                protocol: PortProtocol::Dmx,
            });
        }
    }

    /// Group the local ports into bindIndexes. Every group shares one
    /// (net, subnet) pair, since a reply carries a single NetSwitch and
    /// SubSwitch, and holds at most 4 ports per direction. Indexes start
    /// at 1 and follow configuration order.
    pub fn bind_groups(&self) -> Vec<(u8, Vec<Port>)> {
        let mut switch_groups: Vec<((u8, u8), Vec<Port>)> = Vec::new();
        for port in &self.ports {
            let key = (port.address.net(), port.address.subnet());
            match switch_groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, ports)) => ports.push(*port),
                None => switch_groups.push((key, vec![*port])),
            }
        }

        let mut groups = Vec::new();
        let mut bind_index = 1u8;
        for (_, ports) in switch_groups {
            let mut current: Vec<Port> = Vec::new();
            let mut inputs = 0;
            let mut outputs = 0;
            for port in ports {
                let full = match port.direction {
                    PortDirection::Input => inputs == 4,
                    PortDirection::Output => outputs == 4,
                };
                if full {
                    groups.push((bind_index, std::mem::take(&mut current)));
                    bind_index = bind_index.saturating_add(1);
                    inputs = 0;
                    outputs = 0;
                }
                match port.direction {
                    PortDirection::Input => inputs += 1,
                    PortDirection::Output => outputs += 1,
                }
                current.push(port);
            }
            if !current.is_empty() {
                groups.push((bind_index, current));
                bind_index = bind_index.saturating_add(1);
            }
        }
        groups
    }
}
