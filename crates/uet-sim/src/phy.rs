//! Physical layer: serialisation delay, FEC overhead, stochastic bit errors.
//!
//! One [`Phy`] instance is one network interface's physical layer — hosts
//! and switch ports each own one. The transmit queue is strictly FIFO and
//! single-threaded, so reordering can never happen at this layer.

use std::collections::VecDeque;

use rand::Rng;

use uet_common::config::PhyConfig;
use uet_common::packet::Packet;
use uet_common::signals::SignalRegistry;
use uet_common::time::Tick;

use crate::scheduler::{Actor, Scheduler, TimerKind};

pub struct Phy {
    actor: Actor,
    peer: Actor,
    up: Actor,
    cfg: PhyConfig,
    tx_queue: VecDeque<Packet>,
    tx_timer_armed: bool,
}

impl Phy {
    pub fn new(actor: Actor, peer: Actor, up: Actor, cfg: PhyConfig) -> Self {
        Phy {
            actor,
            peer,
            up,
            cfg,
            tx_queue: VecDeque::new(),
            tx_timer_armed: false,
        }
    }

    /// A packet arrives from the link layer for transmission onto the wire.
    pub fn transmit(&mut self, mut pkt: Packet, now: Tick, sched: &mut Scheduler) {
        if self.cfg.fec_enabled {
            pkt.bit_len = (pkt.bit_len as f64 * (1.0 + self.cfg.fec_overhead)) as u64;
        }
        self.tx_queue.push_back(pkt);
        if !self.tx_timer_armed {
            self.arm_next(now, sched);
        }
    }

    fn arm_next(&mut self, now: Tick, sched: &mut Scheduler) {
        if let Some(head) = self.tx_queue.front() {
            let delay = (head.bit_len as f64 / self.cfg.link_speed_bps * 1_000_000_000.0) as Tick;
            self.tx_timer_armed = true;
            sched.arm_timer(now + delay, self.actor, TimerKind::PhyTransmit);
        } else {
            self.tx_timer_armed = false;
        }
    }

    /// The serialisation timer fires: pop the head of the queue and emit it
    /// onto the wire toward the peer PHY.
    pub fn on_transmit_timer(&mut self, now: Tick, sched: &mut Scheduler) {
        if let Some(pkt) = self.tx_queue.pop_front() {
            sched.schedule_packet(now, self.peer, pkt);
        }
        self.tx_timer_armed = false;
        self.arm_next(now, sched);
    }

    /// A packet arrives from the wire (the peer PHY's transmit). Applies
    /// the stochastic error model and forwards survivors up to the link
    /// layer.
    pub fn receive(&mut self, pkt: Packet, now: Tick, sched: &mut Scheduler, signals: &mut SignalRegistry) {
        if !self.cfg.fec_enabled {
            sched.schedule_packet(now, self.up, pkt);
            return;
        }

        let packet_error_prob = 1.0 - (1.0 - self.cfg.error_rate).powf(pkt.bit_len as f64);
        let draw: f64 = sched.rng().random_range(0.0..1.0);
        if draw >= packet_error_prob {
            sched.schedule_packet(now, self.up, pkt);
            return;
        }

        // Geometric(p) over {1, 2, ...} — number of bits until the first error,
        // sampled via inverse CDF so the draw stays on the scheduler's single
        // seeded generator.
        let p = self.cfg.error_rate.clamp(1e-12, 1.0);
        let u: f64 = sched.rng().random_range(0.0..1.0);
        let error_bits = if p >= 1.0 {
            1
        } else {
            ((1.0 - u).ln() / (1.0 - p).ln()).ceil().max(1.0) as u64
        };
        if error_bits <= self.cfg.fec_correction_bits as u64 {
            signals.incr("phy.fecCorrections", 1);
            sched.schedule_packet(now, self.up, pkt);
        } else {
            tracing::debug!(seq = pkt.seq, error_bits, "uncorrectable PHY error, dropping");
            signals.incr("phy.uncorrectableDrops", 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uet_common::packet::Packet;

    fn cfg() -> PhyConfig {
        PhyConfig {
            link_speed_bps: 8_000.0, // 1 byte/ns for easy arithmetic
            fec_overhead: 0.0,
            error_rate: 0.0,
            fec_correction_bits: 0,
            fec_enabled: true,
        }
    }

    #[test]
    fn transmit_queue_is_fifo_and_delays_by_serialisation_time() {
        let mut sched = Scheduler::new(1);
        let mut phy = Phy::new(Actor::HostPhy(0), Actor::SwitchPortPhy(0), Actor::HostLink(0), cfg());

        phy.transmit(Packet::new_data(0, 1, 0, 0, 1, 0), 0, &mut sched);
        // second packet queues behind the first
        phy.transmit(Packet::new_data(0, 1, 0, 1, 1, 0), 0, &mut sched);

        let (actor, payload) = sched.pop().unwrap();
        assert_eq!(actor, Actor::HostPhy(0));
        match payload {
            crate::scheduler::EventPayload::Timer { .. } => {}
            _ => panic!("expected the transmit timer to fire first"),
        }
    }

    #[test]
    fn error_free_config_always_delivers() {
        let mut sched = Scheduler::new(1);
        let mut signals = SignalRegistry::new(false);
        let mut phy = Phy::new(Actor::HostPhy(0), Actor::SwitchPortPhy(0), Actor::HostLink(0), cfg());
        phy.receive(Packet::new_data(0, 1, 0, 0, 64, 0), 0, &mut sched, &mut signals);
        let (actor, _) = sched.pop().expect("packet forwarded up");
        assert_eq!(actor, Actor::HostLink(0));
        assert_eq!(signals.counter("phy.uncorrectableDrops"), 0);
    }

    #[test]
    fn fec_disabled_skips_error_model_entirely() {
        let mut sched = Scheduler::new(1);
        let mut signals = SignalRegistry::new(false);
        let mut c = cfg();
        c.fec_enabled = false;
        c.error_rate = 1.0;
        let mut phy = Phy::new(Actor::HostPhy(0), Actor::SwitchPortPhy(0), Actor::HostLink(0), c);
        phy.receive(Packet::new_data(0, 1, 0, 0, 64, 0), 0, &mut sched, &mut signals);
        assert!(sched.pop().is_some());
    }
}
