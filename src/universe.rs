use crate::node::{MembershipDiff, NodeId, PortDirection};
use crate::{Error, PortAddress, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::time::Instant;

/// How this process takes part in a universe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalRole {
    /// Only observed through peer advertisements
    None,
    /// A local input port: we transmit ArtDmx into the universe
    Publisher,
    /// A local output port: we consume ArtDmx from the universe
    Subscriber,
    /// Both a local input and a local output port
    Both,
}

impl LocalRole {
    fn from_flags(is_input: bool, is_output: bool) -> Self {
        match (is_input, is_output) {
            (true, true) => LocalRole::Both,
            (true, false) => LocalRole::Publisher,
            (false, true) => LocalRole::Subscriber,
            (false, false) => LocalRole::None,
        }
    }

    pub(crate) fn publishes(self) -> bool {
        matches!(self, LocalRole::Publisher | LocalRole::Both)
    }

    pub(crate) fn subscribes(self) -> bool {
        matches!(self, LocalRole::Subscriber | LocalRole::Both)
    }
}

/// `0` disables sequencing and is always accepted; otherwise a packet is new
/// when its signed 8-bit distance from the last accepted sequence is positive,
/// with the -128 ambiguity resolved in favour of acceptance so a wrap is never
/// mistaken for reordering. `rx == 0` means nothing was accepted yet.
pub(crate) fn sequence_is_newer(rx: u8, seq: u8) -> bool {
    if seq == 0 || rx == 0 {
        return true;
    }
    let delta = seq.wrapping_sub(rx) as i8;
    delta > 0 || delta == i8::MIN
}

/// What became of one inbound ArtDmx frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DmxDisposition {
    /// Payload applied
    Accepted,
    /// Rejected by the sequence rule
    Stale,
    /// Not subscribed and not monitoring passively
    Ignored,
}

/// One DMX universe as the registry tracks it: the peers on either side of
/// it, the latest payload, and the transmit pacing state.
#[derive(Debug)]
pub(crate) struct Universe {
    pub address: PortAddress,
    pub publishers: BTreeSet<NodeId>,
    pub subscribers: BTreeSet<NodeId>,
    pub local_role: LocalRole,
    /// Latest payload observed or published, at its wire length
    pub last_dmx: Vec<u8>,
    /// Source of the last accepted inbound frame
    pub last_source: Option<Ipv4Addr>,
    tx_sequence: u8,
    rx_sequence: u8,
    /// Set by `set_dmx`, cleared once the payload went out
    pub dirty: bool,
    /// True once `set_dmx` ran; nothing is transmitted before that
    pub published: bool,
    pub last_tx: Option<Instant>,
}

impl Universe {
    fn new(address: PortAddress) -> Self {
        Self {
            address,
            publishers: BTreeSet::new(),
            subscribers: BTreeSet::new(),
            local_role: LocalRole::None,
            last_dmx: Vec::new(),
            last_source: None,
            tx_sequence: 0,
            rx_sequence: 0,
            dirty: false,
            published: false,
            last_tx: None,
        }
    }

    /// The next outbound sequence number: 1..=255, wrapping past 255 back
    /// to 1 because 0 means "sequencing disabled".
    pub fn next_sequence(&mut self) -> u8 {
        self.tx_sequence = match self.tx_sequence {
            255 => 1,
            n => n + 1,
        };
        self.tx_sequence
    }

    fn accept(&mut self, sequence: u8) -> bool {
        if !sequence_is_newer(self.rx_sequence, sequence) {
            return false;
        }
        if sequence != 0 {
            self.rx_sequence = sequence;
        }
        true
    }

    /// The payload as readers see it: zero-padded to the full frame.
    pub fn padded_dmx(&self) -> Vec<u8> {
        let mut data = self.last_dmx.clone();
        data.resize(512, 0);
        data
    }

    /// Unicast targets for outbound DMX, deduplicated across bindIndexes.
    pub fn subscriber_ips(&self) -> Vec<Ipv4Addr> {
        let ips: BTreeSet<Ipv4Addr> = self.subscribers.iter().map(|id| id.ip).collect();
        ips.into_iter().collect()
    }

    fn is_orphan(&self) -> bool {
        self.publishers.is_empty()
            && self.subscribers.is_empty()
            && self.local_role == LocalRole::None
    }
}

/// Snapshot of one universe for callers
#[derive(Debug, Clone)]
pub struct UniverseInfo {
    /// The 15-bit address
    pub address: PortAddress,
    /// Peers advertising an input port here
    pub publishers: Vec<NodeId>,
    /// Peers advertising an output port here
    pub subscribers: Vec<NodeId>,
    /// Our own part in the universe
    pub local_role: LocalRole,
    /// Source of the last accepted inbound frame, if any
    pub last_source: Option<Ipv4Addr>,
}

/// Map from PortAddress to universe state. Entries exist while a peer
/// advertises the address, a local port is patched to it, or passive
/// monitoring saw traffic for it; anything else is garbage collected.
pub(crate) struct UniverseRegistry {
    universes: BTreeMap<PortAddress, Universe>,
    passive: bool,
}

impl UniverseRegistry {
    pub fn new(passive: bool) -> Self {
        Self {
            universes: BTreeMap::new(),
            passive,
        }
    }

    /// Adopt an address for local use. Idempotent; a `(false, false)` call
    /// releases the address again.
    pub fn configure_local(&mut self, address: PortAddress, is_input: bool, is_output: bool) {
        let universe = self
            .universes
            .entry(address)
            .or_insert_with(|| Universe::new(address));
        universe.local_role = LocalRole::from_flags(is_input, is_output);
        self.collect(address);
    }

    /// Apply one inbound DMX frame.
    pub fn on_dmx(
        &mut self,
        address: PortAddress,
        sequence: u8,
        payload: &[u8],
        from_ip: Ipv4Addr,
    ) -> DmxDisposition {
        let passive = self.passive;
        if !self.universes.contains_key(&address) {
            if !passive {
                return DmxDisposition::Ignored;
            }
            self.universes.insert(address, Universe::new(address));
        }
        let Some(universe) = self.universes.get_mut(&address) else {
            return DmxDisposition::Ignored;
        };
        if !universe.local_role.subscribes() && !passive {
            return DmxDisposition::Ignored;
        }
        if !universe.accept(sequence) {
            return DmxDisposition::Stale;
        }
        universe.last_dmx = payload.to_vec();
        universe.last_source = Some(from_ip);
        DmxDisposition::Accepted
    }

    /// Replace the outbound payload and mark it for transmission.
    pub fn set_dmx(&mut self, address: PortAddress, data: &[u8]) -> Result<()> {
        if data.is_empty() || data.len() > 512 {
            return Err(Error::MessageSizeInvalid {
                message: data.to_vec(),
                allowed_size: 1..512,
            });
        }
        let universe = self
            .universes
            .get_mut(&address)
            .filter(|universe| universe.local_role != LocalRole::None)
            .ok_or(Error::UniverseNotConfigured(address))?;
        universe.last_dmx = data.to_vec();
        universe.dirty = true;
        universe.published = true;
        Ok(())
    }

    /// The latest payload of a locally adopted universe, zero-padded to 512.
    pub fn get_dmx(&self, address: PortAddress) -> Result<Vec<u8>> {
        self.universes
            .get(&address)
            .filter(|universe| universe.local_role != LocalRole::None)
            .map(Universe::padded_dmx)
            .ok_or(Error::UniverseNotConfigured(address))
    }

    /// Rewrite the membership tables after a node changed or expired.
    pub fn apply_diff(&mut self, diff: &MembershipDiff) {
        for (address, direction) in &diff.added {
            let universe = self
                .universes
                .entry(*address)
                .or_insert_with(|| Universe::new(*address));
            match direction {
                PortDirection::Input => universe.publishers.insert(diff.node),
                PortDirection::Output => universe.subscribers.insert(diff.node),
            };
        }
        for (address, direction) in &diff.removed {
            if let Some(universe) = self.universes.get_mut(address) {
                match direction {
                    PortDirection::Input => universe.publishers.remove(&diff.node),
                    PortDirection::Output => universe.subscribers.remove(&diff.node),
                };
            }
            self.collect(*address);
        }
    }

    fn collect(&mut self, address: PortAddress) {
        if self
            .universes
            .get(&address)
            .map_or(false, Universe::is_orphan)
        {
            self.universes.remove(&address);
        }
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Universe> {
        self.universes.values_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Universe> {
        self.universes.values()
    }

    pub fn snapshot(&self) -> Vec<UniverseInfo> {
        self.universes
            .values()
            .map(|universe| UniverseInfo {
                address: universe.address,
                publishers: universe.publishers.iter().copied().collect(),
                subscribers: universe.subscribers.iter().copied().collect(),
                local_role: universe.local_role,
                last_source: universe.last_source,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> PortAddress {
        s.parse().unwrap()
    }

    fn node(last_octet: u8, bind_index: u8) -> NodeId {
        NodeId {
            ip: Ipv4Addr::new(10, 0, 0, last_octet),
            bind_index,
        }
    }

    #[test]
    fn sequence_rule_accepts_exactly_the_newer_packets() {
        // reference implementation of the signed-delta rule
        fn newer(rx: u8, seq: u8) -> bool {
            if seq == 0 || rx == 0 {
                return true;
            }
            let delta = ((seq as i16 - rx as i16 + 128).rem_euclid(256)) - 128;
            delta > 0 || delta <= -128
        }
        for rx in 0..=255u8 {
            for seq in 0..=255u8 {
                assert_eq!(
                    sequence_is_newer(rx, seq),
                    newer(rx, seq),
                    "rx={} seq={}",
                    rx,
                    seq
                );
            }
        }
    }

    #[test]
    fn stale_frames_are_rejected_and_wraps_survive() {
        let mut registry = UniverseRegistry::new(false);
        let address = addr("0:0:1");
        registry.configure_local(address, false, true);
        let src = Ipv4Addr::new(10, 0, 0, 1);

        assert_eq!(registry.on_dmx(address, 10, &[1, 1], src), DmxDisposition::Accepted);
        assert_eq!(registry.on_dmx(address, 9, &[2, 2], src), DmxDisposition::Stale);
        assert_eq!(registry.get_dmx(address).unwrap()[..2], [1, 1]);

        // anything more than half a cycle ahead reads as reordered, not newer
        assert_eq!(registry.on_dmx(address, 200, &[3, 3], src), DmxDisposition::Stale);

        // walk towards the wrap: 10 -> 130 -> 250 -> 1
        assert_eq!(registry.on_dmx(address, 130, &[4, 4], src), DmxDisposition::Accepted);
        assert_eq!(registry.on_dmx(address, 250, &[5, 5], src), DmxDisposition::Accepted);
        assert_eq!(registry.on_dmx(address, 1, &[6, 6], src), DmxDisposition::Accepted);

        // 0 is accepted unconditionally and does not reset the counter
        assert_eq!(registry.on_dmx(address, 0, &[7, 7], src), DmxDisposition::Accepted);
        assert_eq!(registry.on_dmx(address, 1, &[8, 8], src), DmxDisposition::Stale);
    }

    #[test]
    fn unknown_universes_are_ignored_unless_passive() {
        let src = Ipv4Addr::new(10, 0, 0, 1);

        let mut strict = UniverseRegistry::new(false);
        assert_eq!(
            strict.on_dmx(addr("0:0:5"), 1, &[1], src),
            DmxDisposition::Ignored
        );
        assert!(strict.snapshot().is_empty());

        let mut passive = UniverseRegistry::new(true);
        assert_eq!(
            passive.on_dmx(addr("0:0:5"), 1, &[9, 9], src),
            DmxDisposition::Accepted
        );
        let info = passive.snapshot();
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].local_role, LocalRole::None);
        assert_eq!(info[0].last_source, Some(src));
    }

    #[test]
    fn set_dmx_requires_local_configuration() {
        let mut registry = UniverseRegistry::new(false);
        let address = addr("0:0:1");
        assert!(matches!(
            registry.set_dmx(address, &[1, 2, 3]),
            Err(Error::UniverseNotConfigured(_))
        ));
        assert!(matches!(
            registry.get_dmx(address),
            Err(Error::UniverseNotConfigured(_))
        ));

        registry.configure_local(address, true, false);
        registry.set_dmx(address, &[1, 2, 3]).unwrap();
        let padded = registry.get_dmx(address).unwrap();
        assert_eq!(padded.len(), 512);
        assert_eq!(&padded[..4], &[1, 2, 3, 0]);

        assert!(registry.set_dmx(address, &[]).is_err());
        assert!(registry.set_dmx(address, &vec![0; 513]).is_err());
    }

    #[test]
    fn tx_sequence_wraps_skipping_zero() {
        let mut universe = Universe::new(addr("0:0:1"));
        let mut produced = Vec::new();
        for _ in 0..510 {
            produced.push(universe.next_sequence());
        }
        assert_eq!(produced[0], 1);
        assert_eq!(produced[254], 255);
        assert_eq!(produced[255], 1);
        assert!(produced.iter().all(|&s| s != 0));
    }

    #[test]
    fn orphaned_universes_are_collected() {
        let mut registry = UniverseRegistry::new(false);
        let address = addr("0:0:7");
        let id = node(1, 1);

        registry.apply_diff(&MembershipDiff {
            node: id,
            added: vec![(address, PortDirection::Input)],
            removed: Vec::new(),
        });
        assert_eq!(registry.snapshot().len(), 1);

        registry.apply_diff(&MembershipDiff {
            node: id,
            added: Vec::new(),
            removed: vec![(address, PortDirection::Input)],
        });
        assert!(registry.snapshot().is_empty());

        // a locally adopted universe survives losing its last peer
        registry.configure_local(address, true, false);
        registry.apply_diff(&MembershipDiff {
            node: id,
            added: vec![(address, PortDirection::Output)],
            removed: Vec::new(),
        });
        registry.apply_diff(&MembershipDiff {
            node: id,
            added: Vec::new(),
            removed: vec![(address, PortDirection::Output)],
        });
        assert_eq!(registry.snapshot().len(), 1);

        // releasing the local role collects it
        registry.configure_local(address, false, false);
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn subscriber_ips_are_deduplicated() {
        let mut universe = Universe::new(addr("0:0:1"));
        universe.subscribers.insert(node(1, 1));
        universe.subscribers.insert(node(1, 2));
        universe.subscribers.insert(node(2, 1));
        assert_eq!(
            universe.subscriber_ips(),
            vec![Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)]
        );
    }
}
