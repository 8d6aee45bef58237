//! UET transport: end-to-end sequencing, reordering, retransmission,
//! congestion window, and packet spraying.

use std::collections::HashMap;

use rand::Rng;

use uet_common::config::{TransportConfig, TransportProfile};
use uet_common::packet::{HostId, IncFields, Packet, Seq, TrafficLabel, TransportType};
use uet_common::signals::SignalRegistry;
use uet_common::time::Tick;

use crate::scheduler::{Actor, Scheduler, TimerKind};

const BASE_RTT_SECS: f64 = 0.001;

struct RetransmitEntry {
    packet: Packet,
    sent_at: Tick,
    retries: u8,
}

pub struct Transport {
    actor: Actor,
    app: Actor,
    down: Actor,
    local: HostId,
    cfg: TransportConfig,
    next_tx_seq: Seq,
    expected_rx_seq: Seq,
    reorder_buf: HashMap<Seq, Packet>,
    retransmit_buf: HashMap<Seq, RetransmitEntry>,
    cwnd: u32,
    timer_armed: bool,
}

impl Transport {
    pub fn new(actor: Actor, app: Actor, down: Actor, local: HostId, cfg: TransportConfig) -> Self {
        let cwnd = cfg.initial_congestion_window;
        Transport {
            actor,
            app,
            down,
            local,
            cfg,
            next_tx_seq: 0,
            expected_rx_seq: 0,
            reorder_buf: HashMap::new(),
            retransmit_buf: HashMap::new(),
            cwnd,
            timer_armed: false,
        }
    }

    pub fn cwnd(&self) -> u32 {
        self.cwnd
    }

    /// Sends one application-layer message. Returns the assigned sequence
    /// number so the caller (the workload generator) can correlate the
    /// eventual application-level receive with its own send timestamp.
    pub fn send(
        &mut self,
        dst: HostId,
        byte_len: usize,
        label: Option<TrafficLabel>,
        inc: Option<IncFields>,
        now: Tick,
        sched: &mut Scheduler,
        signals: &mut SignalRegistry,
    ) -> Seq {
        let seq = self.next_tx_seq;
        self.next_tx_seq += 1;

        let flow_id = self.local * 10_000 + sched.rng().random_range(0..10_000u32);
        let mut pkt = Packet::new_data(self.local, dst, flow_id, seq, byte_len, now);
        pkt.label = label;
        pkt.inc = inc;

        if self.cfg.packet_spraying_enabled && self.cfg.profile == TransportProfile::AiFull {
            pkt.spray_path = Some(sched.rng().random_range(0..4u8));
        }

        if self.cfg.profile != TransportProfile::AiBase {
            self.retransmit_buf.insert(seq, RetransmitEntry { packet: pkt.clone(), sent_at: now, retries: 0 });
            if !self.timer_armed {
                self.arm_timer(now, sched);
            }
        }

        signals.incr("transport.messagesSent", 1);
        sched.schedule_packet(now, self.down, pkt);
        seq
    }

    /// A packet arrives from the network (IP) below.
    pub fn receive(&mut self, pkt: Packet, now: Tick, sched: &mut Scheduler, signals: &mut SignalRegistry) {
        if pkt.transport_type == TransportType::Ack {
            if let Some(entry) = self.retransmit_buf.remove(&pkt.seq) {
                self.sample_rtt(now.saturating_sub(entry.sent_at), now, signals);
            }
            return;
        }

        // Preserved quirk: the RTT sample also fires on this non-ACK path
        // when the inbound sequence happens to match a still-buffered
        // retransmission entry. Do not collapse with the ACK branch above.
        if let Some(entry) = self.retransmit_buf.get(&pkt.seq) {
            self.sample_rtt(now.saturating_sub(entry.sent_at), now, signals);
        }

        let deliverable = if self.cfg.reordering_enabled && self.cfg.profile == TransportProfile::AiFull {
            self.reorder_and_collect(pkt.clone())
        } else {
            vec![pkt.clone()]
        };

        for p in deliverable {
            signals.incr("transport.messagesReceived", 1);
            sched.schedule_packet(now, self.app, p);
        }

        let ack = pkt.make_ack(now);
        sched.schedule_packet(now, self.down, ack);
    }

    fn reorder_and_collect(&mut self, pkt: Packet) -> Vec<Packet> {
        if pkt.seq == self.expected_rx_seq {
            self.expected_rx_seq += 1;
            let mut delivered = vec![pkt];
            while let Some(next) = self.reorder_buf.remove(&self.expected_rx_seq) {
                delivered.push(next);
                self.expected_rx_seq += 1;
            }
            delivered
        } else if pkt.seq > self.expected_rx_seq {
            if self.reorder_buf.len() < self.cfg.max_reorder_buffer {
                self.reorder_buf.insert(pkt.seq, pkt);
            }
            Vec::new()
        } else {
            Vec::new() // duplicate, idempotent drop
        }
    }

    fn sample_rtt(&mut self, rtt: Tick, now: Tick, signals: &mut SignalRegistry) {
        signals.observe("transport.rtt", uet_common::time::ticks_to_secs(rtt), now);
        let base = uet_common::time::secs_to_ticks(BASE_RTT_SECS);
        if rtt < (base as f64 * 1.5) as Tick {
            self.cwnd = (self.cwnd + 1).min(64);
        } else if rtt > (base as f64 * 2.0) as Tick {
            self.cwnd = self.cwnd.saturating_sub(1).max(1);
        }
        signals.observe("transport.cwnd", self.cwnd as f64, now);
    }

    fn arm_timer(&mut self, now: Tick, sched: &mut Scheduler) {
        self.timer_armed = true;
        let timeout = uet_common::time::secs_to_ticks(self.cfg.rdma_timeout_secs);
        sched.arm_timer(now + timeout, self.actor, TimerKind::TransportRetransmit);
    }

    /// The retransmission timer fires: halve cwnd and resend every overdue
    /// entry within budget, abandon the rest.
    pub fn on_retransmit_timer(&mut self, now: Tick, sched: &mut Scheduler, signals: &mut SignalRegistry) {
        let timeout = uet_common::time::secs_to_ticks(self.cfg.rdma_timeout_secs);
        let mut resend = Vec::new();
        let mut abandon = Vec::new();

        for (&seq, entry) in self.retransmit_buf.iter_mut() {
            if now.saturating_sub(entry.sent_at) > timeout {
                if entry.retries < self.cfg.max_retransmissions {
                    entry.retries += 1;
                    entry.sent_at = now;
                    resend.push(entry.packet.clone());
                } else {
                    abandon.push(seq);
                }
            }
        }

        for seq in abandon {
            self.retransmit_buf.remove(&seq);
            tracing::debug!(seq, "retransmission budget exhausted, abandoning");
            signals.incr("transport.abandoned", 1);
        }
        for pkt in resend {
            self.cwnd = (self.cwnd / 2).max(1);
            signals.observe("transport.cwnd", self.cwnd as f64, now);
            signals.incr("transport.retransmissions", 1);
            sched.schedule_packet(now, self.down, pkt);
        }

        self.timer_armed = false;
        if !self.retransmit_buf.is_empty() {
            self.arm_timer(now, sched);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uet_common::config::TransportProfile;

    fn cfg(profile: TransportProfile) -> TransportConfig {
        TransportConfig {
            profile,
            packet_spraying_enabled: true,
            reordering_enabled: true,
            max_reorder_buffer: 4,
            initial_congestion_window: 16,
            rdma_timeout_secs: 0.001,
            max_retransmissions: 3,
        }
    }

    #[test]
    fn ai_base_never_buffers_for_retransmission() {
        let mut sched = Scheduler::new(1);
        let mut signals = SignalRegistry::new(false);
        let mut t = Transport::new(Actor::Transport(0), Actor::Workload(0), Actor::Ip(0), 0, cfg(TransportProfile::AiBase));
        t.send(1, 64, None, None, 0, &mut sched, &mut signals);
        assert!(t.retransmit_buf.is_empty());
    }

    #[test]
    fn out_of_order_then_gap_fill_delivers_in_order() {
        let mut sched = Scheduler::new(1);
        let mut signals = SignalRegistry::new(false);
        let mut t = Transport::new(Actor::Transport(0), Actor::Workload(0), Actor::Ip(0), 0, cfg(TransportProfile::AiFull));

        let p1 = Packet::new_data(1, 0, 0, 1, 64, 0);
        t.receive(p1, 0, &mut sched, &mut signals); // seq 1 arrives before seq 0: buffered
        assert_eq!(signals.counter("transport.messagesReceived"), 0);

        let p0 = Packet::new_data(1, 0, 0, 0, 64, 0);
        t.receive(p0, 1, &mut sched, &mut signals); // seq 0 closes the gap, drains seq 1 too
        assert_eq!(signals.counter("transport.messagesReceived"), 2);
    }

    #[test]
    fn duplicate_receive_delivers_exactly_once() {
        let mut sched = Scheduler::new(1);
        let mut signals = SignalRegistry::new(false);
        let mut t = Transport::new(Actor::Transport(0), Actor::Workload(0), Actor::Ip(0), 0, cfg(TransportProfile::AiFull));
        let p0 = Packet::new_data(1, 0, 0, 0, 64, 0);
        t.receive(p0.clone(), 0, &mut sched, &mut signals);
        t.receive(p0, 1, &mut sched, &mut signals);
        assert_eq!(signals.counter("transport.messagesReceived"), 1);
    }

    #[test]
    fn ack_receipt_clears_retransmission_entry_and_samples_rtt() {
        let mut sched = Scheduler::new(1);
        let mut signals = SignalRegistry::new(false);
        let mut t = Transport::new(Actor::Transport(0), Actor::Workload(0), Actor::Ip(0), 0, cfg(TransportProfile::Hpc));
        let seq = t.send(1, 64, None, None, 0, &mut sched, &mut signals);
        assert!(t.retransmit_buf.contains_key(&seq));

        let mut ack = Packet::new_data(1, 0, 0, seq, 0, 0);
        ack.transport_type = TransportType::Ack;
        t.receive(ack, 100, &mut sched, &mut signals);
        assert!(t.retransmit_buf.is_empty());
        assert_eq!(signals.summary("transport.rtt").unwrap().count, 1);
    }

    #[test]
    fn retransmission_timeout_halves_cwnd() {
        let mut sched = Scheduler::new(1);
        let mut signals = SignalRegistry::new(false);
        let mut t = Transport::new(Actor::Transport(0), Actor::Workload(0), Actor::Ip(0), 0, cfg(TransportProfile::Hpc));
        t.send(1, 64, None, None, 0, &mut sched, &mut signals);
        assert_eq!(t.cwnd(), 16);

        let timeout = uet_common::time::secs_to_ticks(0.001);
        t.on_retransmit_timer(timeout + 1, &mut sched, &mut signals);
        assert_eq!(t.cwnd(), 8);
        assert_eq!(signals.counter("transport.retransmissions"), 1);
    }

    #[test]
    fn cwnd_never_exceeds_64_or_drops_below_1() {
        let mut sched = Scheduler::new(1);
        let mut signals = SignalRegistry::new(false);
        let mut t = Transport::new(Actor::Transport(0), Actor::Workload(0), Actor::Ip(0), 0, cfg(TransportProfile::Hpc));
        t.cwnd = 64;
        t.sample_rtt(0, 0, &mut signals); // fast RTT, would increment
        assert_eq!(t.cwnd(), 64);

        t.cwnd = 1;
        t.sample_rtt(uet_common::time::secs_to_ticks(10.0), 0, &mut signals); // slow, would decrement
        assert_eq!(t.cwnd(), 1);
    }
}
