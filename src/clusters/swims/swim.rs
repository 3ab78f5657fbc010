use super::*;

use crate::clusters::types::message::{HEADER_LEN, member_len};
use crate::clusters::types::verb::MAX_MEMBERS;
use crate::clusters::{
    AddressFamily, Broadcast, GossipError, KnownNodes, Message, MessageMember, MessageVerb, Node,
    NodeDirectory, NodeStatus,
};
use crate::schedulers::ticker_message::TimerCommand;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

const INDIRECT_PING_COUNT: usize = 3;
// One slot stays free for a FORWARD_TO target or a relayed ack.
const GOSSIP_SLOTS: usize = MAX_MEMBERS - 1;
const JOIN_MAX_ATTEMPTS: u32 = 5;
// Largest UDP payload over IPv4.
const MAX_DATAGRAM_LEN: usize = 65_507;

/// Largest broadcast payload that still fits in one datagram beside a full
/// gossip load and a leading FORWARD_TO or relay entry.
pub(crate) fn max_broadcast_payload(family: AddressFamily) -> usize {
    let broadcast_header = 8 + family.ip_len();
    MAX_DATAGRAM_LEN - HEADER_LEN - MAX_GOSSIP_BYTES - 2 * member_len(family) - broadcast_header
}

#[derive(Debug, Clone)]
enum ProbeKind {
    /// Periodic failure-detection probe. Escalates to PINGREQ on timeout.
    Periodic,
    /// NFPING sent for a PINGREQ; the ack is relayed back to `asker`.
    Forwarded { asker: Arc<Node> },
    /// Liveness check requested over RPC.
    Requested,
    /// Contact with a seed node.
    Join { attempts_left: u32 },
}

#[derive(Debug)]
struct Probe {
    target: Arc<Node>,
    kind: ProbeKind,
    state: ProbeState,
    // Peers asked to relay an ack during the indirect round.
    helpers: Vec<SocketAddr>,
}

/// SWIM protocol state machine. No async, no channels, no timers.
///
/// Driven by three kinds of inputs:
///   - `step(message)`       : a datagram arrived from the network
///   - `handle_timeout(..)`  : timer events dispatched by the scheduler via the actor
///   - control calls         : join / leave / broadcast / ping from the RPC plane
///
/// Outbound messages are buffered in `pending_outbound`; drain with `take_outbound()`.
/// Timer commands are buffered in `pending_timer_commands`; drain with `take_timer_commands()`.
/// Observable changes are buffered in `pending_events`; drain with `take_events()`.
///
/// ```text
///   ProtocolPeriodElapsed
///   └─ start_probe() sends PING ──► AwaitingDirectAck
///                                      │  ACK from target → ConfirmedAlive
///                                      │
///                                      │  Direct timeout
///                                      ▼
///                               AwaitingIndirectAck   (PINGREQ to k helpers,
///                                      │               member[0] = FORWARD_TO target)
///                                      │  relayed ACK → ConfirmedAlive
///                                      │
///                                      │  Indirect timeout (or no helpers)
///                                      ▼
///                                  Suspected ──── higher heartbeat / direct contact ──► Alive
///                                      │
///                                      │  Suspect timeout
///                                      ▼
///                                    Dead
/// ```
///
/// A helper receiving PINGREQ sends NFPING to the target; an NFPING that times
/// out is dropped without starting another indirect round.
pub struct Swim {
    // Identity
    local: Arc<Node>,
    family: AddressFamily,
    heartbeat: u32,
    leaving: bool,
    max_broadcast_bytes: usize,

    // Protocol state
    directory: Arc<KnownNodes>,
    live_node_tracker: LiveNodeTracker,
    gossip_buffer: GossipBuffer,
    broadcasts: BroadcastQueue,
    probes: HashMap<u32, Probe>,
    #[cfg(test)]
    probe_states: HashMap<SocketAddr, ProbeState>,
    suspect_seqs: HashMap<SocketAddr, u32>,

    // Sequence
    seq_counter: u32,
    broadcast_counter: u32,

    // Output buffers
    pending_outbound: Vec<OutboundPacket>,
    pending_timer_commands: Vec<TimerCommand<SwimTimer>>,
    pending_events: Vec<SwimEvent>,
}

impl Swim {
    pub fn new(local: Arc<Node>, directory: Arc<KnownNodes>, max_broadcast_bytes: usize) -> Self {
        local.set_status(NodeStatus::Alive);
        let family = directory.family();
        Self {
            family,
            heartbeat: local.heartbeat(),
            local,
            leaving: false,
            max_broadcast_bytes: max_broadcast_bytes.min(max_broadcast_payload(family)),
            directory,
            live_node_tracker: LiveNodeTracker::default(),
            gossip_buffer: GossipBuffer::default(),
            broadcasts: BroadcastQueue::default(),
            probes: HashMap::new(),
            #[cfg(test)]
            probe_states: HashMap::new(),
            suspect_seqs: HashMap::new(),
            seq_counter: 0,
            broadcast_counter: 0,
            pending_outbound: vec![],
            pending_timer_commands: vec![],
            pending_events: vec![],
        }
    }

    pub(crate) fn local(&self) -> &Arc<Node> {
        &self.local
    }

    #[cfg(test)]
    pub(crate) fn heartbeat(&self) -> u32 {
        self.heartbeat
    }

    // -----------------------------------------------------------------------
    // Control plane
    // -----------------------------------------------------------------------

    pub(crate) fn join(&mut self, addr: SocketAddr) {
        let target = match self.directory.lookup_or_create(addr) {
            Ok(node) => node,
            Err(e) => {
                tracing::warn!("Cannot join {}: {}", addr, e);
                return;
            }
        };
        if target == self.local {
            return;
        }

        tracing::info!("Joining via {}", target);
        self.send_probe(
            target,
            MessageVerb::Ping,
            ProbeKind::Join {
                attempts_left: JOIN_MAX_ATTEMPTS - 1,
            },
        );
    }

    /// Declares `addr` gone. Leaving with the local address announces our own exit.
    pub(crate) fn leave(&mut self, addr: SocketAddr) {
        let node = match self.directory.lookup_or_create(addr) {
            Ok(node) => node,
            Err(e) => {
                tracing::warn!("Cannot remove {}: {}", addr, e);
                return;
            }
        };

        if node != self.local {
            let source = Some(self.local.clone());
            self.update_member(&node, NodeStatus::Dead, node.heartbeat(), source);
            return;
        }

        tracing::info!("Leaving the cluster");
        self.leaving = true;
        self.heartbeat = self.heartbeat.wrapping_add(1);
        self.local.set_heartbeat(self.heartbeat);
        self.local.set_status(NodeStatus::Dead);

        let farewell = MessageMember {
            node: self.local.clone(),
            status: NodeStatus::Dead,
            heartbeat: self.heartbeat,
            source: Some(self.local.clone()),
        };

        // Leads every ping so it never competes for gossip transmissions.
        for peer in self.directory.healthy() {
            if peer == self.local {
                continue;
            }
            let ping = self.build_message(MessageVerb::Ping, Some(farewell.clone()));
            self.pending_outbound.push(OutboundPacket::new(peer.addr(), ping));
        }
    }

    pub(crate) fn broadcast(&mut self, payload: Vec<u8>) -> Result<(), GossipError> {
        if payload.len() > self.max_broadcast_bytes {
            return Err(GossipError::BroadcastTooLarge(payload.len()));
        }
        let broadcast = Broadcast::new(self.local.clone(), self.broadcast_counter, payload)?;
        self.broadcast_counter = self.broadcast_counter.wrapping_add(1);
        self.broadcasts.enqueue(broadcast, self.cluster_size());
        Ok(())
    }

    pub(crate) fn ping(&mut self, addr: SocketAddr) {
        match self.directory.lookup_or_create(addr) {
            Ok(target) if target == self.local => {
                self.pending_events.push(SwimEvent::PingCompleted {
                    target: target.addr(),
                    alive: !self.leaving,
                });
            }
            Ok(target) => self.send_probe(target, MessageVerb::Ping, ProbeKind::Requested),
            Err(e) => {
                tracing::warn!("Cannot ping {}: {}", addr, e);
                self.pending_events.push(SwimEvent::PingCompleted {
                    target: addr,
                    alive: false,
                });
            }
        }
    }

    // -----------------------------------------------------------------------
    // Core protocol logic
    // -----------------------------------------------------------------------
    pub(crate) fn handle_timeout(&mut self, event: SwimTimeOutCallback) {
        match event {
            SwimTimeOutCallback::ProtocolPeriodElapsed => self.on_protocol_period(),
            SwimTimeOutCallback::TimedOut {
                seq,
                target,
                phase,
            } => match (phase, target) {
                (ProbePhase::Direct, _) => self.on_direct_timeout(seq),
                (ProbePhase::Indirect, _) => self.on_indirect_timeout(seq),
                (ProbePhase::Suspect, Some(target)) => self.on_suspect_timeout(seq, target),
                (ProbePhase::Suspect, None) => {}
            },
        }
    }

    fn on_protocol_period(&mut self) {
        if self.leaving {
            return;
        }
        self.heartbeat = self.heartbeat.wrapping_add(1);
        self.local.set_heartbeat(self.heartbeat);
        self.start_probe();
    }

    fn start_probe(&mut self) {
        let Some(target_addr) = self.live_node_tracker.next() else {
            return;
        };
        if target_addr == self.local.addr() {
            return;
        }

        let already_probing = self.probes.values().any(|p| {
            p.target.addr() == target_addr && matches!(p.kind, ProbeKind::Periodic)
        });
        if already_probing {
            return;
        }

        if let Some(target) = self.directory.get(target_addr) {
            self.send_probe(target, MessageVerb::Ping, ProbeKind::Periodic);
        }
    }

    fn send_probe(&mut self, target: Arc<Node>, verb: MessageVerb, kind: ProbeKind) {
        let seq = self.next_seq();
        let message = self.build_message(verb, None);
        tracing::debug!("→ {} to {} seq={}", verb, target, seq);

        self.pending_outbound
            .push(OutboundPacket::new(target.addr(), message));
        self.pending_timer_commands.push(TimerCommand::SetSchedule {
            seq,
            timer: SwimTimer::direct_probe(target.addr()),
        });
        self.record_probe_state(target.addr(), Some(ProbeState::AwaitingDirectAck));
        self.probes.insert(
            seq,
            Probe {
                target,
                kind,
                state: ProbeState::AwaitingDirectAck,
                helpers: vec![],
            },
        );
    }

    // The indirect round keeps the direct probe's seq so a late ack from the
    // target still finds and cancels it.
    fn on_direct_timeout(&mut self, seq: u32) {
        let Some(probe) = self.probes.remove(&seq) else {
            return;
        };

        match probe.kind {
            ProbeKind::Periodic => self.start_indirect_probe(seq, probe.target),
            ProbeKind::Forwarded { asker } => {
                tracing::debug!(
                    "NFPING to {} for {} timed out; not escalating",
                    probe.target,
                    asker
                );
                self.record_probe_state(probe.target.addr(), None);
            }
            ProbeKind::Requested => {
                self.record_probe_state(probe.target.addr(), None);
                self.pending_events.push(SwimEvent::PingCompleted {
                    target: probe.target.addr(),
                    alive: false,
                });
            }
            ProbeKind::Join { attempts_left } => {
                if attempts_left == 0 {
                    tracing::warn!("Join via {} exhausted all attempts, giving up", probe.target);
                    self.record_probe_state(probe.target.addr(), None);
                    return;
                }
                tracing::debug!(
                    "Join via {} unanswered, {} attempt(s) left",
                    probe.target,
                    attempts_left
                );
                self.send_probe(
                    probe.target,
                    MessageVerb::Ping,
                    ProbeKind::Join {
                        attempts_left: attempts_left - 1,
                    },
                );
            }
        }
    }

    fn start_indirect_probe(&mut self, seq: u32, target: Arc<Node>) {
        let mut helpers = Vec::new();
        for _ in 0..self.live_node_tracker.len() {
            if helpers.len() >= INDIRECT_PING_COUNT {
                break;
            }

            if let Some(peer) = self.live_node_tracker.next() {
                if peer == target.addr() || peer == self.local.addr() || helpers.contains(&peer) {
                    continue;
                }
                helpers.push(peer);
            }
        }

        if helpers.is_empty() {
            self.try_mark_suspect(&target);
            return;
        }

        let forward_to = MessageMember {
            node: target.clone(),
            status: NodeStatus::ForwardTo,
            heartbeat: target.heartbeat(),
            source: None,
        };
        let request = self.build_message(MessageVerb::PingReq, Some(forward_to));
        tracing::debug!("→ PINGREQ for {} to {} helper(s)", target, helpers.len());
        for &helper in &helpers {
            self.pending_outbound
                .push(OutboundPacket::new(helper, request.clone()));
        }

        self.pending_timer_commands.push(TimerCommand::SetSchedule {
            seq,
            timer: SwimTimer::indirect_probe(target.addr()),
        });
        self.record_probe_state(target.addr(), Some(ProbeState::AwaitingIndirectAck));
        self.probes.insert(
            seq,
            Probe {
                target,
                kind: ProbeKind::Periodic,
                state: ProbeState::AwaitingIndirectAck,
                helpers,
            },
        );
    }

    fn on_indirect_timeout(&mut self, seq: u32) {
        if let Some(probe) = self.probes.remove(&seq) {
            if probe.state == ProbeState::AwaitingIndirectAck {
                self.try_mark_suspect(&probe.target);
            }
        }
    }

    fn on_suspect_timeout(&mut self, seq: u32, target: SocketAddr) {
        if self.suspect_seqs.get(&target) != Some(&seq) {
            return;
        }
        self.suspect_seqs.remove(&target);
        if let Some(node) = self.directory.get(target) {
            self.try_mark_dead(&node);
        }
    }

    fn try_mark_suspect(&mut self, target: &Arc<Node>) {
        if target.status() != NodeStatus::Alive {
            return;
        }
        tracing::info!("Node {} is SUSPECTED (heartbeat {})", target, target.heartbeat());
        let source = Some(self.local.clone());
        self.update_member(target, NodeStatus::Suspected, target.heartbeat(), source);
    }

    fn try_mark_dead(&mut self, target: &Arc<Node>) {
        if target.status() != NodeStatus::Suspected {
            return;
        }
        tracing::info!("Node {} is DEAD", target);
        let source = Some(self.local.clone());
        self.update_member(target, NodeStatus::Dead, target.heartbeat(), source);
    }

    pub fn step(&mut self, message: Message) {
        let sender = message.sender().clone();
        if sender == self.local || self.leaving {
            return;
        }

        // 1. A datagram from the sender proves it is up.
        self.handle_sender(&sender, message.sender_heartbeat());

        // 2. Process gossip (piggybacked updates). The PINGREQ target entry is a
        //    routing hint, not a status claim.
        let forward_to = message.get_forward_to().map(|m| m.node.clone());
        for member in message.members() {
            self.apply_membership_update(member, &sender);
        }

        // 3. Application broadcast
        if let Some(broadcast) = message.broadcast() {
            self.receive_broadcast(broadcast.clone());
        }

        // 4. The verb itself
        match message.verb() {
            MessageVerb::Ping | MessageVerb::NfPing => {
                tracing::debug!("← {} from {}", message.verb(), sender);
                let ack = self.build_message(MessageVerb::Ack, None);
                self.pending_outbound
                    .push(OutboundPacket::new(sender.addr(), ack));
            }

            MessageVerb::Ack => {
                tracing::debug!("← ACK from {}", sender);
                self.complete_probes(&sender);

                // A relayed ack names the indirectly probed target first and
                // is vouched for by the helper itself.
                if let Some(relayed) = message.members().first() {
                    if relayed.node != sender
                        && relayed.status == NodeStatus::Alive
                        && relayed.source.as_ref() == Some(&sender)
                    {
                        self.complete_indirect_probes(&relayed.node, &sender);
                    }
                }
            }

            MessageVerb::PingReq => match forward_to {
                Some(target) if target == self.local => {
                    let ack = self.build_message(MessageVerb::Ack, None);
                    self.pending_outbound
                        .push(OutboundPacket::new(sender.addr(), ack));
                }
                Some(target) => {
                    tracing::debug!("← PINGREQ from {} for {}", sender, target);
                    self.send_probe(target, MessageVerb::NfPing, ProbeKind::Forwarded { asker: sender });
                }
                None => {
                    tracing::warn!("PINGREQ from {} carries no FORWARD_TO target", sender);
                }
            },
        }
    }

    fn complete_probes(&mut self, responder: &Arc<Node>) {
        let seqs: Vec<u32> = self
            .probes
            .iter()
            .filter(|(_, p)| &p.target == responder)
            .map(|(&seq, _)| seq)
            .collect();

        for seq in seqs {
            let Some(probe) = self.probes.remove(&seq) else {
                continue;
            };
            self.pending_timer_commands
                .push(TimerCommand::CancelSchedule { seq });
            self.record_probe_state(responder.addr(), Some(ProbeState::ConfirmedAlive));

            match probe.kind {
                ProbeKind::Forwarded { asker } => {
                    let relayed = MessageMember {
                        node: responder.clone(),
                        status: NodeStatus::Alive,
                        heartbeat: responder.heartbeat(),
                        source: Some(self.local.clone()),
                    };
                    let ack = self.build_message(MessageVerb::Ack, Some(relayed));
                    self.pending_outbound
                        .push(OutboundPacket::new(asker.addr(), ack));
                }
                ProbeKind::Requested => self.pending_events.push(SwimEvent::PingCompleted {
                    target: responder.addr(),
                    alive: true,
                }),
                ProbeKind::Periodic | ProbeKind::Join { .. } => {}
            }
        }
    }

    fn complete_indirect_probes(&mut self, target: &Arc<Node>, helper: &Arc<Node>) {
        let seqs: Vec<u32> = self
            .probes
            .iter()
            .filter(|(_, p)| {
                &p.target == target
                    && p.state == ProbeState::AwaitingIndirectAck
                    && p.helpers.contains(&helper.addr())
            })
            .map(|(&seq, _)| seq)
            .collect();

        for seq in seqs {
            self.probes.remove(&seq);
            self.pending_timer_commands
                .push(TimerCommand::CancelSchedule { seq });
            self.record_probe_state(target.addr(), Some(ProbeState::ConfirmedAlive));
        }
    }

    fn receive_broadcast(&mut self, broadcast: Broadcast) {
        if broadcast.origin() == &self.local {
            return;
        }
        if self.broadcasts.enqueue(broadcast.clone(), self.cluster_size()) {
            self.pending_events
                .push(SwimEvent::BroadcastReceived(broadcast));
        }
    }

    // Direct contact outranks any gossip about the sender, whatever its heartbeat.
    fn handle_sender(&mut self, sender: &Arc<Node>, heartbeat: u32) {
        if heartbeat > sender.heartbeat() {
            sender.set_heartbeat(heartbeat);
        }
        if sender.status() != NodeStatus::Alive {
            let source = Some(self.local.clone());
            self.apply_status(sender, NodeStatus::Alive, source);
        }
    }

    fn apply_membership_update(&mut self, member: &MessageMember, via: &Arc<Node>) {
        if matches!(member.status, NodeStatus::ForwardTo | NodeStatus::Unknown) {
            return;
        }

        // Refutation
        if member.node == self.local {
            if !self.leaving && member.status != NodeStatus::Alive && member.heartbeat >= self.heartbeat {
                let refuted = member.heartbeat.wrapping_add(1);
                tracing::info!(
                    "Refuting {} claim! (My heartbeat: {} -> {})",
                    member.status,
                    self.heartbeat,
                    refuted
                );
                self.heartbeat = refuted;
                self.local.set_heartbeat(refuted);
                let alive = MessageMember {
                    node: self.local.clone(),
                    status: NodeStatus::Alive,
                    heartbeat: refuted,
                    source: Some(self.local.clone()),
                };
                self.gossip_buffer.enqueue(alive, self.cluster_size());
            }
            return;
        }

        let source = member.source.clone().or_else(|| Some(via.clone()));
        self.update_member(&member.node, member.status, member.heartbeat, source);
    }

    fn update_member(
        &mut self,
        node: &Arc<Node>,
        status: NodeStatus,
        heartbeat: u32,
        source: Option<Arc<Node>>,
    ) {
        let old_status = node.status();
        let old_heartbeat = node.heartbeat();

        // RULE: an unadmitted node takes whatever we hear first.
        // RULE: higher heartbeat always wins.
        // RULE: equal heartbeat, stricter status wins (Dead > Suspected > Alive).
        let accept = old_status == NodeStatus::Unknown
            || heartbeat > old_heartbeat
            || (heartbeat == old_heartbeat && status.severity() > old_status.severity());
        if !accept {
            return;
        }

        node.set_heartbeat(heartbeat.max(old_heartbeat));
        self.apply_status(node, status, source);
    }

    fn apply_status(&mut self, node: &Arc<Node>, status: NodeStatus, source: Option<Arc<Node>>) {
        let old_status = node.status();
        if !node.set_status(status) {
            return;
        }

        tracing::info!(
            "Member update: {} {} → {} (heartbeat {})",
            node,
            old_status,
            status,
            node.heartbeat()
        );

        self.live_node_tracker.update(node.addr(), status);
        self.gossip_buffer.enqueue(
            MessageMember {
                node: node.clone(),
                status,
                heartbeat: node.heartbeat(),
                source,
            },
            self.cluster_size(),
        );
        self.pending_events.push(SwimEvent::StatusChanged {
            node: node.clone(),
            status,
            heartbeat: node.heartbeat(),
        });

        match status {
            NodeStatus::Suspected => {
                self.record_probe_state(node.addr(), Some(ProbeState::Suspected));
                let seq = self.next_seq();
                self.suspect_seqs.insert(node.addr(), seq);
                self.pending_timer_commands.push(TimerCommand::SetSchedule {
                    seq,
                    timer: SwimTimer::suspect_timer(node.addr()),
                });
            }
            NodeStatus::Dead => {
                self.record_probe_state(node.addr(), Some(ProbeState::Dead));
                self.cancel_suspicion(node.addr());
            }
            NodeStatus::Alive => self.cancel_suspicion(node.addr()),
            NodeStatus::Unknown | NodeStatus::ForwardTo => {}
        }
    }

    fn cancel_suspicion(&mut self, addr: SocketAddr) {
        if let Some(seq) = self.suspect_seqs.remove(&addr) {
            self.pending_timer_commands
                .push(TimerCommand::CancelSchedule { seq });
        }
    }

    /// Header, an optional leading entry (FORWARD_TO target or relayed ack),
    /// then as much pending gossip and one broadcast as fit.
    fn build_message(&mut self, verb: MessageVerb, first: Option<MessageMember>) -> Message {
        let mut message = Message::new(verb, self.local.clone(), self.heartbeat);

        if let Some(first) = first {
            // An empty message always has room.
            let _ = message.add_member(first.node, first.status, first.heartbeat, first.source);
        }

        for gossip in self.gossip_buffer.collect(self.family, GOSSIP_SLOTS) {
            if message
                .add_member(gossip.node, gossip.status, gossip.heartbeat, gossip.source)
                .is_err()
            {
                break;
            }
        }

        if let Some(broadcast) = self.broadcasts.next() {
            message.add_broadcast(broadcast);
        }

        message
    }

    fn cluster_size(&self) -> usize {
        self.live_node_tracker.len() + 1
    }

    fn next_seq(&mut self) -> u32 {
        self.seq_counter = self.seq_counter.wrapping_add(1);
        self.seq_counter
    }

    pub(crate) fn take_outbound(&mut self) -> Vec<OutboundPacket> {
        std::mem::take(&mut self.pending_outbound)
    }

    pub(crate) fn take_timer_commands(&mut self) -> Vec<TimerCommand<SwimTimer>> {
        std::mem::take(&mut self.pending_timer_commands)
    }

    pub(crate) fn take_events(&mut self) -> Vec<SwimEvent> {
        std::mem::take(&mut self.pending_events)
    }

    // Per-target probe progress is only kept for test inspection.
    #[cfg_attr(not(test), allow(unused_variables))]
    fn record_probe_state(&mut self, target: SocketAddr, state: Option<ProbeState>) {
        #[cfg(test)]
        match state {
            Some(state) => {
                self.probe_states.insert(target, state);
            }
            None => {
                self.probe_states.remove(&target);
            }
        };
    }

    #[cfg(test)]
    pub(crate) fn probe_state(&self, target: SocketAddr) -> Option<ProbeState> {
        self.probe_states.get(&target).copied()
    }
}
