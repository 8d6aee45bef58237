//! Single-threaded, time-ordered event queue.
//!
//! Events are ordered by `(virtual_time, insertion_sequence)` so that two
//! events scheduled for the same instant resolve FIFO. The queue is a
//! [`BinaryHeap`], which is a max-heap, so [`Event`]'s `Ord` is reversed to
//! turn it into the min-heap a discrete-event scheduler needs.
//!
//! Timers are identified by `(Actor, TimerKind)` and carry a generation
//! counter: arming or cancelling a timer bumps the generation, so a stale
//! firing already sitting in the heap is recognised and ignored at pop time
//! instead of being physically removed from the heap.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use rand::rngs::StdRng;
use rand::SeedableRng;

use uet_common::packet::{HostId, LlrAck, Packet};
use uet_common::time::Tick;

pub type PortId = u32;

/// Every schedulable unit of behaviour in the simulated fabric.
///
/// Most layers have two distinct gates — one facing the layer above, one
/// facing the layer below — and need a separate [`Actor`] tag per gate so
/// the network's dispatch loop can tell which handler a popped event is
/// for; a plain `Packet` payload carries no notion of "which direction it
/// came from". The bare variant (`Ip`, `HostLink`, `HostPhy`,
/// `SwitchPortLink`, `SwitchPortPhy`) is always the gate facing *down*
/// toward the wire — it doubles as that component's own timer identity —
/// and the `*Tx` / `*Up` variant is the gate facing *up* toward the
/// application. `SwitchPort` keeps this split under different names
/// (`SwitchPort` = from the fabric, `SwitchPortUp` = from its own link)
/// since "up"/"down" don't map cleanly onto a fabric-facing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Actor {
    Workload(HostId),
    Transport(HostId),
    /// Router's gate facing the link below (inbound/transit delivery).
    Ip(HostId),
    /// Router's gate facing the transport above (outbound send).
    IpTx(HostId),
    /// Host link's gate facing the PHY below (receive/ack) plus its own LLR timer.
    HostLink(HostId),
    /// Host link's gate facing IP above (send).
    HostLinkTx(HostId),
    /// Host PHY's gate facing the wire (receive) plus its own transmit timer.
    HostPhy(HostId),
    /// Host PHY's gate facing the link above (transmit).
    HostPhyTx(HostId),
    /// Switch port's gate facing the fabric (from-fabric, forwarded down).
    SwitchPort(PortId),
    /// Switch port's gate facing its own link (from-link, forwarded up to fabric).
    SwitchPortUp(PortId),
    /// Switch-side link's gate facing the PHY below (receive/ack) plus its own LLR timer.
    SwitchPortLink(PortId),
    /// Switch-side link's gate facing the port above (send).
    SwitchPortLinkTx(PortId),
    /// Switch-side PHY's gate facing the wire (receive) plus its own transmit timer.
    SwitchPortPhy(PortId),
    /// Switch-side PHY's gate facing the link above (transmit).
    SwitchPortPhyTx(PortId),
    SwitchFabric,
    Inc,
    Analyzer,
}

/// Which of an actor's (at most a handful of) self-timers this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    WorkloadTick,
    TransportRetransmit,
    LinkLlr,
    RoutingUpdate,
    IncProcessing,
    PhyTransmit,
    Analyzer,
}

#[derive(Debug, Clone)]
pub enum EventPayload {
    Timer {
        kind: TimerKind,
        generation: u64,
    },
    Packet(Packet),
    LlrAck(LlrAck),
}

#[derive(Debug, Clone)]
struct Event {
    time: Tick,
    seq: u64,
    actor: Actor,
    payload: EventPayload,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}
impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the smallest time first.
        other.time.cmp(&self.time).then_with(|| other.seq.cmp(&self.seq))
    }
}

pub struct Scheduler {
    time: Tick,
    queue: BinaryHeap<Event>,
    seq_counter: u64,
    timer_generations: HashMap<(Actor, TimerKind), u64>,
    rng: StdRng,
}

impl Scheduler {
    pub fn new(seed: u64) -> Self {
        Scheduler {
            time: 0,
            queue: BinaryHeap::new(),
            seq_counter: 0,
            timer_generations: HashMap::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn now(&self) -> Tick {
        self.time
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    fn push(&mut self, at: Tick, actor: Actor, payload: EventPayload) {
        let seq = self.seq_counter;
        self.seq_counter += 1;
        self.queue.push(Event { time: at, seq, actor, payload });
    }

    pub fn schedule_packet(&mut self, at: Tick, actor: Actor, packet: Packet) {
        self.push(at, actor, EventPayload::Packet(packet));
    }

    pub fn schedule_llr_ack(&mut self, at: Tick, actor: Actor, ack: LlrAck) {
        self.push(at, actor, EventPayload::LlrAck(ack));
    }

    /// Arms (or rearms) a timer for `actor`/`kind`, invalidating any
    /// previously scheduled firing of the same timer identity.
    pub fn arm_timer(&mut self, at: Tick, actor: Actor, kind: TimerKind) {
        let generation = self.timer_generations.entry((actor, kind)).or_insert(0);
        *generation += 1;
        let generation = *generation;
        self.push(at, actor, EventPayload::Timer { kind, generation });
    }

    /// Invalidates a timer without scheduling a replacement.
    pub fn cancel_timer(&mut self, actor: Actor, kind: TimerKind) {
        *self.timer_generations.entry((actor, kind)).or_insert(0) += 1;
    }

    fn is_current(&self, actor: Actor, kind: TimerKind, generation: u64) -> bool {
        self.timer_generations.get(&(actor, kind)).copied().unwrap_or(0) == generation
    }

    /// Pops the next event, skipping stale timer firings. Returns `None`
    /// once the queue is drained.
    pub fn pop(&mut self) -> Option<(Actor, EventPayload)> {
        loop {
            let ev = self.queue.pop()?;
            self.time = ev.time;
            if let EventPayload::Timer { kind, generation } = ev.payload {
                if !self.is_current(ev.actor, kind, generation) {
                    continue;
                }
            }
            return Some((ev.actor, ev.payload));
        }
    }

    /// Virtual time of the next pending event, without consuming it.
    pub fn peek_time(&self) -> Option<Tick> {
        self.queue.peek().map(|e| e.time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_packet(seq: u64) -> Packet {
        Packet::new_data(0, 1, 0, seq, 64, 0)
    }

    #[test]
    fn events_pop_in_time_order() {
        let mut s = Scheduler::new(1);
        s.schedule_packet(30, Actor::Ip(0), dummy_packet(3));
        s.schedule_packet(10, Actor::Ip(0), dummy_packet(1));
        s.schedule_packet(20, Actor::Ip(0), dummy_packet(2));

        let mut seen = Vec::new();
        while let Some((_, EventPayload::Packet(p))) = s.pop() {
            seen.push(p.seq);
        }
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn same_time_events_pop_fifo() {
        let mut s = Scheduler::new(1);
        s.schedule_packet(5, Actor::Ip(0), dummy_packet(1));
        s.schedule_packet(5, Actor::Ip(0), dummy_packet(2));
        s.schedule_packet(5, Actor::Ip(0), dummy_packet(3));

        let mut seen = Vec::new();
        while let Some((_, EventPayload::Packet(p))) = s.pop() {
            seen.push(p.seq);
        }
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn rearming_a_timer_invalidates_the_stale_firing() {
        let mut s = Scheduler::new(1);
        s.arm_timer(100, Actor::Transport(0), TimerKind::TransportRetransmit);
        // Rearm before the first firing pops — the stale one must be skipped.
        s.arm_timer(50, Actor::Transport(0), TimerKind::TransportRetransmit);

        let (actor, payload) = s.pop().unwrap();
        assert_eq!(actor, Actor::Transport(0));
        match payload {
            EventPayload::Timer { generation, .. } => assert_eq!(generation, 2),
            _ => panic!("expected timer event"),
        }
        assert!(s.pop().is_none());
    }

    #[test]
    fn cancelling_a_timer_drops_its_firing() {
        let mut s = Scheduler::new(1);
        s.arm_timer(100, Actor::Transport(0), TimerKind::TransportRetransmit);
        s.cancel_timer(Actor::Transport(0), TimerKind::TransportRetransmit);
        assert!(s.pop().is_none());
    }

    #[test]
    fn determinism_same_seed_same_draws() {
        use rand::Rng;
        let mut a = Scheduler::new(7);
        let mut b = Scheduler::new(7);
        let draws_a: Vec<u32> = (0..10).map(|_| a.rng().random_range(0..1000)).collect();
        let draws_b: Vec<u32> = (0..10).map(|_| b.rng().random_range(0..1000)).collect();
        assert_eq!(draws_a, draws_b);
    }
}
