use crate::command::{ArtCommand, Output, Poll, PollReply};
use crate::interface::{self, InterfaceInfo, InterfacePreference};
use crate::node::{LocalNode, Node, NodeRegistry, Port, PortDirection};
use crate::universe::{DmxDisposition, UniverseInfo, UniverseRegistry};
use crate::{Error, PortAddress, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::Notify;

/// The UDP port Art-Net runs on, 0x1936
pub const ARTNET_PORT: u16 = 6454;

/// Firmware version advertised in our ArtPollReply, high byte first
const NODE_FIRMWARE_VERSION: [u8; 2] = [0, 1];

/// Cadence of the node-expiry sweep
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Client configuration. The default advertises a plain DMX node and uses
/// automatic interface selection under [interface::default_ranking].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Force this OS interface, bypassing the ranking
    pub interface: Option<String>,
    /// Manual unicast address; must be paired with `broadcast_ip`
    pub unicast_ip: Option<Ipv4Addr>,
    /// Manual broadcast address; must be paired with `unicast_ip`
    pub broadcast_ip: Option<Ipv4Addr>,
    /// Short node name, at most 17 characters on the wire
    pub short_name: String,
    /// Long node name, at most 63 characters on the wire
    pub long_name: String,
    /// ESTA manufacturer code
    pub esta_code: u16,
    /// Oem word, high byte first
    pub oem: [u8; 2],
    /// Equipment style code
    pub style: u8,
    /// ArtPoll broadcast cadence
    pub poll_interval: Duration,
    /// Peers silent for longer than this are dropped
    pub node_ttl: Duration,
    /// Floor between two ArtDmx transmissions on one universe
    pub dmx_min_interval: Duration,
    /// Keep-alive retransmission cadence for unchanged payloads
    pub dmx_keepalive: Duration,
    /// Track DMX for universes we are not subscribed to
    pub passive: bool,
    /// Count unknown OpCodes as decode errors instead of ignoring them
    pub strict: bool,
    /// Interface selection policy for automatic resolution
    pub interface_ranking: Vec<InterfacePreference>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interface: None,
            unicast_ip: None,
            broadcast_ip: None,
            short_name: "artnet-client".to_string(),
            long_name: "artnet_client Art-Net node".to_string(),
            esta_code: 0x7FF0,
            oem: [0, 0],
            style: 0,
            poll_interval: Duration::from_millis(2500),
            node_ttl: Duration::from_millis(30_000),
            dmx_min_interval: Duration::from_millis(25),
            dmx_keepalive: Duration::from_millis(1000),
            passive: false,
            strict: false,
            interface_ranking: interface::default_ranking(),
        }
    }
}

/// Traffic counters. Decode problems never stop the loop, they end up here.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Stats {
    /// Datagrams received
    pub rx_frames: u64,
    /// ArtPoll frames received
    pub rx_poll: u64,
    /// ArtPollReply frames received
    pub rx_poll_reply: u64,
    /// ArtDmx frames received
    pub rx_dmx: u64,
    /// ArtDmx frames rejected by the sequence rule
    pub rx_dmx_stale: u64,
    /// ArtDmx frames for universes we neither subscribe to nor monitor
    pub rx_dmx_ignored: u64,
    /// Frames with an OpCode the client does not interpret
    pub rx_unknown_opcode: u64,
    /// Frames that failed to decode
    pub rx_decode_errors: u64,
    /// Datagrams sent
    pub tx_frames: u64,
    /// Sends that failed at the socket
    pub send_errors: u64,
    /// Receives that failed at the socket
    pub recv_errors: u64,
}

/// Where one outbound frame goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Broadcast,
    Unicast(Ipv4Addr),
}

/// One frame the scheduler decided to transmit
struct Outbound {
    target: Target,
    command: ArtCommand,
}

/// Everything the event loop owns. All methods are synchronous; the loop and
/// the user-facing handles serialize access through one mutex.
struct State {
    local: LocalNode,
    nodes: NodeRegistry,
    universes: UniverseRegistry,
    stats: Stats,
    reply_counter: u32,
    reply_pending: bool,
    next_poll: Option<Instant>,
    next_sweep: Option<Instant>,
}

impl State {
    fn new(cfg: &Config) -> Self {
        Self {
            local: LocalNode {
                short_name: cfg.short_name.clone(),
                long_name: cfg.long_name.clone(),
                esta_code: cfg.esta_code,
                oem: cfg.oem,
                style: cfg.style,
                ports: Vec::new(),
            },
            nodes: NodeRegistry::new(cfg.node_ttl),
            universes: UniverseRegistry::new(cfg.passive),
            stats: Stats::default(),
            reply_counter: 0,
            reply_pending: false,
            next_poll: None,
            next_sweep: None,
        }
    }

    /// Dispatch one inbound datagram. Replies owed to an ArtPoll are
    /// returned so they go out before the loop waits again.
    fn handle_frame(
        &mut self,
        cfg: &Config,
        iface: &InterfaceInfo,
        src: Ipv4Addr,
        buffer: &[u8],
        now: Instant,
    ) -> Vec<Outbound> {
        self.stats.rx_frames += 1;
        match ArtCommand::from_buffer(buffer) {
            Ok(ArtCommand::Poll(_)) => {
                self.stats.rx_poll += 1;
                // our own broadcast looped back by the OS
                if src == iface.ip {
                    Vec::new()
                } else {
                    self.reply_burst(iface)
                }
            }
            Ok(ArtCommand::PollReply(reply)) => {
                self.stats.rx_poll_reply += 1;
                if src != iface.ip {
                    let diff = self.nodes.upsert_from_reply(&reply, src, now);
                    self.universes.apply_diff(&diff);
                }
                Vec::new()
            }
            Ok(ArtCommand::Output(output)) => {
                self.stats.rx_dmx += 1;
                match self.universes.on_dmx(
                    output.port_address,
                    output.sequence,
                    output.data.as_ref(),
                    src,
                ) {
                    DmxDisposition::Accepted => {}
                    DmxDisposition::Stale => self.stats.rx_dmx_stale += 1,
                    DmxDisposition::Ignored => self.stats.rx_dmx_ignored += 1,
                }
                Vec::new()
            }
            Ok(ArtCommand::Unknown { opcode, .. }) if cfg.strict => {
                self.stats.rx_decode_errors += 1;
                log::debug!("dropping datagram from {}: {}", src, Error::UnknownOpcode(opcode));
                Vec::new()
            }
            Ok(ArtCommand::Unknown { opcode, .. }) => {
                self.stats.rx_unknown_opcode += 1;
                log::debug!("ignoring opcode 0x{:04x} from {}", opcode, src);
                Vec::new()
            }
            Err(e) => {
                self.stats.rx_decode_errors += 1;
                log::debug!("dropping malformed datagram from {}: {}", src, e);
                Vec::new()
            }
        }
    }

    /// Run everything whose time has come and collect the frames to send.
    fn due_actions(&mut self, cfg: &Config, iface: &InterfaceInfo, now: Instant) -> Vec<Outbound> {
        let mut out = Vec::new();

        if self.next_poll.map_or(true, |t| now >= t) {
            self.next_poll = Some(now + cfg.poll_interval);
            out.push(Outbound {
                target: Target::Broadcast,
                command: ArtCommand::Poll(Poll::default()),
            });
            // the advertisement heartbeat shares the poll tick
            self.reply_pending = true;
        }

        if self.next_sweep.map_or(true, |t| now >= t) {
            self.next_sweep = Some(now + SWEEP_INTERVAL);
            for diff in self.nodes.sweep(now) {
                log::debug!("node {:?} expired", diff.node);
                self.universes.apply_diff(&diff);
            }
        }

        if self.reply_pending {
            out.extend(self.reply_burst(iface));
        }

        self.due_dmx(cfg, iface, now, &mut out);
        out
    }

    /// One ArtPollReply per local bindIndex, ascending, so peers observing
    /// the burst reconstruct this node deterministically. A node without
    /// ports still advertises a single empty bind.
    fn reply_burst(&mut self, iface: &InterfaceInfo) -> Vec<Outbound> {
        self.reply_pending = false;
        self.reply_counter = self.reply_counter.wrapping_add(1);
        let report = format!("#0001 [{}] artnet_client ok", self.reply_counter);

        let mut groups = self.local.bind_groups();
        if groups.is_empty() {
            groups.push((1, Vec::new()));
        }
        groups
            .into_iter()
            .map(|(bind_index, ports)| Outbound {
                target: Target::Broadcast,
                command: ArtCommand::PollReply(Box::new(build_poll_reply(
                    &self.local,
                    iface,
                    &report,
                    bind_index,
                    &ports,
                ))),
            })
            .collect()
    }

    /// Per-universe pacing: a changed payload goes out as soon as the rate
    /// floor allows, an unchanged one as a keep-alive. Broadcast until a
    /// subscriber is discovered, then unicast to each subscriber address.
    fn due_dmx(&mut self, cfg: &Config, iface: &InterfaceInfo, now: Instant, out: &mut Vec<Outbound>) {
        let own_ip = iface.ip;
        for universe in self.universes.iter_mut() {
            if !universe.local_role.publishes() || !universe.published {
                continue;
            }
            let due = if universe.dirty {
                universe
                    .last_tx
                    .map_or(true, |t| now.duration_since(t) >= cfg.dmx_min_interval)
            } else {
                universe
                    .last_tx
                    .map_or(false, |t| now.duration_since(t) >= cfg.dmx_keepalive)
            };
            if !due {
                continue;
            }

            let sequence = universe.next_sequence();
            let payload = universe.last_dmx.clone();
            universe.dirty = false;
            universe.last_tx = Some(now);

            let mut targets: Vec<Target> = universe
                .subscriber_ips()
                .into_iter()
                .filter(|ip| *ip != own_ip)
                .map(Target::Unicast)
                .collect();
            if targets.is_empty() {
                targets.push(Target::Broadcast);
            }
            for target in targets {
                out.push(Outbound {
                    target,
                    command: ArtCommand::Output(Output {
                        sequence,
                        port_address: universe.address,
                        data: payload.clone().into(),
                        ..Output::default()
                    }),
                });
            }
        }
    }

    /// When the scheduler next has something to do.
    fn next_deadline(&self, cfg: &Config, now: Instant) -> Instant {
        if self.reply_pending {
            return now;
        }
        let mut deadline = self
            .next_poll
            .unwrap_or(now)
            .min(self.next_sweep.unwrap_or(now));
        for universe in self.universes.iter() {
            if !universe.local_role.publishes() || !universe.published {
                continue;
            }
            let candidate = match (universe.dirty, universe.last_tx) {
                (true, None) => now,
                (true, Some(t)) => t + cfg.dmx_min_interval,
                (false, Some(t)) => t + cfg.dmx_keepalive,
                (false, None) => continue,
            };
            deadline = deadline.min(candidate);
        }
        deadline
    }
}

fn build_poll_reply(
    local: &LocalNode,
    iface: &InterfaceInfo,
    report: &str,
    bind_index: u8,
    ports: &[Port],
) -> PollReply {
    let mut reply = PollReply::default();
    reply.address = iface.ip;
    reply.version = NODE_FIRMWARE_VERSION;
    // every port in a bind shares one switch pair
    if let Some(first) = ports.first() {
        reply.net_switch = first.address.net();
        reply.sub_switch = first.address.subnet();
    }
    reply.oem = local.oem;
    reply.esta_code = local.esta_code;
    reply.style = local.style;
    reply.set_short_name(&local.short_name);
    reply.set_long_name(&local.long_name);
    reply.set_node_report(report);

    let mut inputs = 0;
    let mut outputs = 0;
    for port in ports {
        match port.direction {
            PortDirection::Input => {
                reply.port_types[inputs] |= 0x80;
                reply.swin[inputs] = port.address.universe();
                inputs += 1;
            }
            PortDirection::Output => {
                reply.port_types[outputs] |= 0x40;
                reply.swout[outputs] = port.address.universe();
                outputs += 1;
            }
        }
    }
    reply.num_ports = (inputs.max(outputs) as u16).to_be_bytes();
    reply.mac = iface.mac;
    reply.bind_ip = iface.ip.octets();
    reply.bind_index = bind_index;
    // 15-bit Port-Address addressing
    reply.status_2 = 0x08;
    reply
}

struct Shared {
    cfg: Config,
    iface: InterfaceInfo,
    state: Mutex<State>,
    wake: Notify,
    closed: AtomicBool,
}

/// An Art-Net client. Cheap to clone; all clones drive the same node.
///
/// The event loop started by [Client::connect] owns the socket and all
/// registries. Every other operation can be called from any thread: it
/// briefly locks the shared state and wakes the loop, which is the only
/// place traffic is produced.
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
}

impl Client {
    /// Create a client, resolving the network configuration synchronously.
    pub fn new(cfg: Config) -> Result<Client> {
        let iface = match (cfg.interface.as_deref(), cfg.unicast_ip, cfg.broadcast_ip) {
            (Some(_), Some(_), _) | (Some(_), None, Some(_)) => {
                return Err(Error::ConflictingIpConfig)
            }
            (None, Some(unicast), Some(broadcast)) => InterfaceInfo::manual(unicast, broadcast),
            (None, None, None) => interface::resolve_auto(&cfg.interface_ranking)?,
            (Some(name), None, None) => interface::resolve_named(name)?,
            // one half of the manual pair
            (None, _, _) => return Err(Error::ConflictingIpConfig),
        };
        log::debug!(
            "using {} ({}, broadcast {})",
            if iface.name.is_empty() { "manual addressing" } else { iface.name.as_str() },
            iface.ip,
            iface.broadcast
        );
        let state = State::new(&cfg);
        Ok(Client {
            shared: Arc::new(Shared {
                cfg,
                iface,
                state: Mutex::new(state),
                wake: Notify::new(),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Adopt a universe for local use and get a handle to its DMX buffer.
    /// `address` is the canonical `"net:subnet:universe"` form. Idempotent;
    /// calling again for the same address reconfigures it.
    pub fn set_port_config(
        &self,
        address: &str,
        is_input: bool,
        is_output: bool,
    ) -> Result<UniverseHandle> {
        let address: PortAddress = address.parse()?;
        {
            let mut state = self.shared.state.lock();
            state.local.set_port(address, is_input, is_output);
            state.universes.configure_local(address, is_input, is_output);
            state.reply_pending = true;
        }
        self.shared.wake.notify_one();
        Ok(UniverseHandle {
            shared: self.shared.clone(),
            address,
        })
    }

    /// Bind the socket and run the event loop. Resolves once [Client::close]
    /// is called; the socket is released on every exit path.
    pub async fn connect(&self) -> Result<()> {
        let socket = bind_socket().map_err(Error::BindFailed)?;
        log::debug!("listening on 0.0.0.0:{}", ARTNET_PORT);
        let mut buffer = [0u8; 2048];

        while !self.shared.closed.load(Ordering::Acquire) {
            let deadline = {
                let state = self.shared.state.lock();
                state.next_deadline(&self.shared.cfg, Instant::now())
            };
            tokio::select! {
                received = socket.recv_from(&mut buffer) => match received {
                    Ok((length, addr)) => {
                        let IpAddr::V4(src) = addr.ip() else { continue };
                        let outbound = {
                            let mut state = self.shared.state.lock();
                            state.handle_frame(
                                &self.shared.cfg,
                                &self.shared.iface,
                                src,
                                &buffer[..length],
                                Instant::now(),
                            )
                        };
                        self.send_all(&socket, outbound).await;
                    }
                    Err(e) => {
                        log::warn!("receive failed: {}", e);
                        self.shared.state.lock().stats.recv_errors += 1;
                    }
                },
                _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {
                    let outbound = {
                        let mut state = self.shared.state.lock();
                        state.due_actions(&self.shared.cfg, &self.shared.iface, Instant::now())
                    };
                    self.send_all(&socket, outbound).await;
                }
                // a handle changed state; loop to recompute the deadline
                _ = self.shared.wake.notified() => {}
            }
        }
        Ok(())
    }

    async fn send_all(&self, socket: &UdpSocket, outbound: Vec<Outbound>) {
        for item in outbound {
            let ip = match item.target {
                Target::Broadcast => self.shared.iface.broadcast,
                Target::Unicast(ip) => ip,
            };
            let bytes = match item.command.write_to_buffer() {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::warn!("could not serialize outbound frame: {}", e);
                    continue;
                }
            };
            match socket
                .send_to(&bytes, SocketAddr::from((ip, ARTNET_PORT)))
                .await
            {
                Ok(_) => self.shared.state.lock().stats.tx_frames += 1,
                Err(e) => {
                    log::warn!("send to {} failed: {}", ip, e);
                    self.shared.state.lock().stats.send_errors += 1;
                }
            }
        }
    }

    /// Stop the event loop. Pending ticks are dropped; Art-Net has no
    /// goodbye message, peers will expire us through their own TTL.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.wake.notify_one();
    }

    /// Snapshot of the discovered peers, ordered by (ip, bindIndex).
    pub fn list_nodes(&self) -> Vec<Node> {
        self.shared.state.lock().nodes.list()
    }

    /// Snapshot of the tracked universes with their membership sets.
    pub fn list_universes(&self) -> Vec<UniverseInfo> {
        self.shared.state.lock().universes.snapshot()
    }

    /// Traffic counters since startup.
    pub fn stats(&self) -> Stats {
        self.shared.state.lock().stats.clone()
    }

    /// The resolved local addressing.
    pub fn interface(&self) -> InterfaceInfo {
        self.shared.iface.clone()
    }
}

/// Handle to one locally adopted universe, returned by
/// [Client::set_port_config].
#[derive(Clone)]
pub struct UniverseHandle {
    shared: Arc<Shared>,
    address: PortAddress,
}

impl UniverseHandle {
    /// The universe this handle points at.
    pub fn address(&self) -> PortAddress {
        self.address
    }

    /// Replace the outbound payload, 1..=512 bytes. The scheduler transmits
    /// as soon as the pacing floor allows.
    pub fn set_dmx(&self, data: &[u8]) -> Result<()> {
        self.shared.state.lock().universes.set_dmx(self.address, data)?;
        self.shared.wake.notify_one();
        Ok(())
    }

    /// The latest payload, zero-padded to the full 512 channels.
    pub fn get_dmx(&self) -> Result<Vec<u8>> {
        self.shared.state.lock().universes.get_dmx(self.address)
    }
}

fn bind_socket() -> std::io::Result<UdpSocket> {
    use socket2::{Domain, Protocol, Socket, Type};

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, ARTNET_PORT));
    socket.bind(&addr.into())?;

    let std_sock: std::net::UdpSocket = socket.into();
    std_sock.set_nonblocking(true)?;
    UdpSocket::from_std(std_sock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeId;

    fn addr(s: &str) -> PortAddress {
        s.parse().unwrap()
    }

    fn test_state() -> (State, Config, InterfaceInfo) {
        let cfg = Config::default();
        let iface = InterfaceInfo::manual(
            Ipv4Addr::new(10, 0, 0, 5),
            Ipv4Addr::new(10, 255, 255, 255),
        );
        let state = State::new(&cfg);
        (state, cfg, iface)
    }

    fn reply_frame(bind_index: u8, port_types: [u8; 4], swin: [u8; 4], swout: [u8; 4]) -> Vec<u8> {
        let mut reply = PollReply::default();
        reply.bind_index = bind_index;
        reply.num_ports = (port_types.iter().filter(|&&t| t != 0).count() as u16).to_be_bytes();
        reply.port_types = port_types;
        reply.swin = swin;
        reply.swout = swout;
        ArtCommand::PollReply(Box::new(reply))
            .write_to_buffer()
            .unwrap()
    }

    fn dmx_frames(outbound: &[Outbound]) -> Vec<(Target, u8, PortAddress, Vec<u8>)> {
        outbound
            .iter()
            .filter_map(|item| match &item.command {
                ArtCommand::Output(output) => Some((
                    item.target,
                    output.sequence,
                    output.port_address,
                    output.data.as_ref().clone(),
                )),
                _ => None,
            })
            .collect()
    }

    fn local_publisher(state: &mut State, address: PortAddress) {
        state.local.set_port(address, true, false);
        state.universes.configure_local(address, true, false);
        state.reply_pending = true;
    }

    #[test]
    fn discovery_tracks_nodes_and_memberships() {
        let (mut state, cfg, iface) = test_state();
        let now = Instant::now();
        let src = Ipv4Addr::new(192, 168, 1, 238);
        let frame = reply_frame(1, [0x80, 0x40, 0, 0], [0x01, 0, 0, 0], [0, 0x00, 0, 0]);

        let outbound = state.handle_frame(&cfg, &iface, src, &frame, now);
        assert!(outbound.is_empty());

        let nodes = state.nodes.list();
        assert_eq!(nodes.len(), 1);
        let id = NodeId { ip: src, bind_index: 1 };
        assert_eq!(nodes[0].id, id);

        let universes = state.universes.snapshot();
        assert_eq!(universes.len(), 2);
        assert_eq!(universes[0].address, addr("0:0:0"));
        assert_eq!(universes[0].subscribers, vec![id]);
        assert!(universes[0].publishers.is_empty());
        assert_eq!(universes[1].address, addr("0:0:1"));
        assert_eq!(universes[1].publishers, vec![id]);
        assert!(universes[1].subscribers.is_empty());
    }

    #[test]
    fn looped_back_own_traffic_is_not_a_peer() {
        let (mut state, cfg, iface) = test_state();
        let now = Instant::now();

        // our own broadcast ArtPoll must not trigger a reply burst
        let poll = ArtCommand::Poll(Poll::default()).write_to_buffer().unwrap();
        assert!(state.handle_frame(&cfg, &iface, iface.ip, &poll, now).is_empty());
        assert_eq!(state.stats.rx_poll, 1);

        // nor may our own ArtPollReply register us as a phantom peer
        let frame = reply_frame(1, [0x80, 0, 0, 0], [0x01, 0, 0, 0], [0; 4]);
        state.handle_frame(&cfg, &iface, iface.ip, &frame, now);
        assert!(state.nodes.list().is_empty());
        assert!(state.universes.snapshot().is_empty());
    }

    #[test]
    fn silent_nodes_expire_and_their_universes_collect() {
        let (mut state, cfg, iface) = test_state();
        let t0 = Instant::now();
        let src = Ipv4Addr::new(192, 168, 1, 238);
        let frame = reply_frame(1, [0x80, 0x40, 0, 0], [0x01, 0, 0, 0], [0, 0x00, 0, 0]);
        state.handle_frame(&cfg, &iface, src, &frame, t0);

        state.due_actions(&cfg, &iface, t0 + Duration::from_secs(31));
        assert!(state.nodes.list().is_empty());
        assert!(state.universes.snapshot().is_empty());
    }

    #[test]
    fn first_payload_broadcasts_immediately() {
        let (mut state, cfg, iface) = test_state();
        let t0 = Instant::now();
        let address = addr("0:0:1");
        local_publisher(&mut state, address);
        state.universes.set_dmx(address, &[7; 128]).unwrap();

        let outbound = state.due_actions(&cfg, &iface, t0);
        let dmx = dmx_frames(&outbound);
        assert_eq!(dmx.len(), 1);
        let (target, sequence, port_address, data) = &dmx[0];
        assert_eq!(*target, Target::Broadcast);
        assert_eq!(*sequence, 1);
        assert_eq!(*port_address, address);
        assert_eq!(data.len(), 128);
    }

    #[test]
    fn discovered_subscribers_get_unicast() {
        let (mut state, cfg, iface) = test_state();
        let t0 = Instant::now();
        let address = addr("0:0:1");
        local_publisher(&mut state, address);
        state.universes.set_dmx(address, &[1; 64]).unwrap();
        let first = dmx_frames(&state.due_actions(&cfg, &iface, t0));
        assert_eq!(first[0].0, Target::Broadcast);
        assert_eq!(first[0].1, 1);

        // a peer advertises an output port patched to our universe
        let subscriber = Ipv4Addr::new(192, 168, 1, 238);
        let frame = reply_frame(1, [0x40, 0, 0, 0], [0; 4], [0x01, 0, 0, 0]);
        state.handle_frame(&cfg, &iface, subscriber, &frame, t0);

        state.universes.set_dmx(address, &[2; 64]).unwrap();
        let second = dmx_frames(&state.due_actions(&cfg, &iface, t0 + cfg.dmx_min_interval));
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].0, Target::Unicast(subscriber));
        assert_eq!(second[0].1, 2);
        assert_eq!(second[0].3, vec![2; 64]);
    }

    #[test]
    fn unchanged_payload_is_kept_alive() {
        let (mut state, cfg, iface) = test_state();
        let t0 = Instant::now();
        let address = addr("0:0:1");
        local_publisher(&mut state, address);
        state.universes.set_dmx(address, &[9; 32]).unwrap();
        state.due_actions(&cfg, &iface, t0);

        // nothing due before the keep-alive window elapses
        assert!(dmx_frames(&state.due_actions(&cfg, &iface, t0 + Duration::from_millis(900))).is_empty());

        let keep_alive = dmx_frames(&state.due_actions(&cfg, &iface, t0 + cfg.dmx_keepalive));
        assert_eq!(keep_alive.len(), 1);
        assert_eq!(keep_alive[0].1, 2);
        assert_eq!(keep_alive[0].3, vec![9; 32]);
    }

    #[test]
    fn rapid_changes_are_paced_to_the_rate_floor() {
        let (mut state, cfg, iface) = test_state();
        let t0 = Instant::now();
        let address = addr("0:0:1");
        local_publisher(&mut state, address);

        state.universes.set_dmx(address, &[1, 1]).unwrap();
        assert_eq!(dmx_frames(&state.due_actions(&cfg, &iface, t0)).len(), 1);

        // a new payload right away must wait out the floor
        state.universes.set_dmx(address, &[2, 2]).unwrap();
        assert!(dmx_frames(&state.due_actions(&cfg, &iface, t0 + Duration::from_millis(10))).is_empty());

        let sent = dmx_frames(&state.due_actions(&cfg, &iface, t0 + cfg.dmx_min_interval));
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, 2);
        assert_eq!(sent[0].3, vec![2, 2]);
    }

    #[test]
    fn poll_triggers_replies_in_bind_index_order() {
        let (mut state, cfg, iface) = test_state();
        let t0 = Instant::now();
        state.local.set_port(addr("0:0:1"), true, false);
        state.universes.configure_local(addr("0:0:1"), true, false);
        state.local.set_port(addr("1:0:0"), false, true);
        state.universes.configure_local(addr("1:0:0"), false, true);

        let poll = ArtCommand::Poll(Poll::default()).write_to_buffer().unwrap();
        let outbound = state.handle_frame(&cfg, &iface, Ipv4Addr::new(10, 0, 0, 9), &poll, t0);

        let replies: Vec<&PollReply> = outbound
            .iter()
            .filter_map(|item| match &item.command {
                ArtCommand::PollReply(reply) => Some(reply.as_ref()),
                _ => None,
            })
            .collect();
        assert_eq!(replies.len(), 2);

        assert_eq!(replies[0].bind_index, 1);
        assert_eq!(replies[0].net_switch, 0);
        assert_ne!(replies[0].port_types[0] & 0x80, 0);
        assert_eq!(replies[0].swin[0], 1);

        assert_eq!(replies[1].bind_index, 2);
        assert_eq!(replies[1].net_switch, 1);
        assert_ne!(replies[1].port_types[0] & 0x40, 0);
        assert_eq!(replies[1].swout[0], 0);

        assert_eq!(replies[0].address, iface.ip);
        assert_eq!(replies[0].short_name_str(), cfg.short_name);
    }

    #[test]
    fn membership_tables_follow_advertised_ports_through_churn() {
        let (mut state, cfg, iface) = test_state();
        let t0 = Instant::now();
        let a = Ipv4Addr::new(10, 0, 0, 1);
        let b = Ipv4Addr::new(10, 0, 0, 2);

        // two peers on the same universe, one on each side
        state.handle_frame(&cfg, &iface, a, &reply_frame(1, [0x80, 0, 0, 0], [0x03, 0, 0, 0], [0; 4]), t0);
        state.handle_frame(&cfg, &iface, b, &reply_frame(1, [0x40, 0, 0, 0], [0; 4], [0x03, 0, 0, 0]), t0);

        let check = |state: &State| {
            for info in state.universes.snapshot() {
                let mut publishers = Vec::new();
                let mut subscribers = Vec::new();
                for node in state.nodes.list() {
                    for port in &node.ports {
                        if port.address == info.address {
                            match port.direction {
                                PortDirection::Input => publishers.push(node.id),
                                PortDirection::Output => subscribers.push(node.id),
                            }
                        }
                    }
                }
                assert_eq!(info.publishers, publishers);
                assert_eq!(info.subscribers, subscribers);
            }
        };
        check(&state);

        // peer A re-patches to another universe, peer B stays
        let t1 = t0 + Duration::from_secs(10);
        state.handle_frame(&cfg, &iface, a, &reply_frame(1, [0x80, 0, 0, 0], [0x04, 0, 0, 0], [0; 4]), t1);
        check(&state);

        // peer B expires, peer A keeps reporting
        state.due_actions(&cfg, &iface, t0 + Duration::from_secs(31));
        state.handle_frame(&cfg, &iface, a, &reply_frame(1, [0x80, 0, 0, 0], [0x04, 0, 0, 0], [0; 4]), t0 + Duration::from_secs(31));
        check(&state);
        assert_eq!(state.nodes.list().len(), 1);
        assert_eq!(state.universes.snapshot().len(), 1);
    }

    #[test]
    fn deadline_tracks_the_nearest_obligation() {
        let (mut state, cfg, iface) = test_state();
        let t0 = Instant::now();
        state.due_actions(&cfg, &iface, t0);

        // nothing but timers: the sweep is the nearest
        assert_eq!(state.next_deadline(&cfg, t0), t0 + SWEEP_INTERVAL);

        // a dirty universe pulls the deadline to the pacing floor
        let address = addr("0:0:1");
        local_publisher(&mut state, address);
        state.reply_pending = false;
        state.universes.set_dmx(address, &[1, 2]).unwrap();
        assert_eq!(state.next_deadline(&cfg, t0), t0);

        let sent = state.due_actions(&cfg, &iface, t0);
        assert_eq!(dmx_frames(&sent).len(), 1);
        state.universes.set_dmx(address, &[3, 4]).unwrap();
        assert_eq!(state.next_deadline(&cfg, t0), t0 + cfg.dmx_min_interval);
    }

    #[test]
    fn strict_mode_counts_unknown_opcodes_as_errors() {
        let (mut state, cfg, iface) = test_state();
        let mut strict_cfg = cfg.clone();
        strict_cfg.strict = true;
        let now = Instant::now();
        let src = Ipv4Addr::new(10, 0, 0, 3);
        // an ArtSync frame
        let sync = [
            vec![65, 114, 116, 45, 78, 101, 116, 0, 0, 0x52],
            vec![0, 14, 0, 0],
        ]
        .concat();

        state.handle_frame(&cfg, &iface, src, &sync, now);
        assert_eq!(state.stats.rx_unknown_opcode, 1);
        assert_eq!(state.stats.rx_decode_errors, 0);

        state.handle_frame(&strict_cfg, &iface, src, &sync, now);
        assert_eq!(state.stats.rx_decode_errors, 1);

        state.handle_frame(&cfg, &iface, src, b"not artnet at all", now);
        assert_eq!(state.stats.rx_decode_errors, 2);
    }

    #[test]
    fn conflicting_ip_configuration_is_rejected() {
        let mut cfg = Config::default();
        cfg.interface = Some("enp5s0".to_string());
        cfg.unicast_ip = Some(Ipv4Addr::new(10, 0, 0, 5));
        assert!(matches!(Client::new(cfg), Err(Error::ConflictingIpConfig)));

        let mut cfg = Config::default();
        cfg.broadcast_ip = Some(Ipv4Addr::new(10, 255, 255, 255));
        assert!(matches!(Client::new(cfg), Err(Error::ConflictingIpConfig)));
    }

    #[tokio::test]
    async fn handles_work_across_threads() {
        let mut cfg = Config::default();
        cfg.unicast_ip = Some(Ipv4Addr::new(127, 0, 0, 1));
        cfg.broadcast_ip = Some(Ipv4Addr::new(127, 255, 255, 255));
        let client = Client::new(cfg).unwrap();

        let universe = client.set_port_config("0:0:1", true, false).unwrap();
        let worker = {
            let universe = universe.clone();
            std::thread::spawn(move || universe.set_dmx(&[1, 2, 3]))
        };
        worker.join().unwrap().unwrap();
        assert_eq!(&universe.get_dmx().unwrap()[..3], &[1, 2, 3]);

        assert!(matches!(
            client
                .set_port_config("9999:0:0", true, false)
                .map(|handle| handle.address()),
            Err(Error::InvalidPortAddress(_))
        ));
        client.close();
    }
}
