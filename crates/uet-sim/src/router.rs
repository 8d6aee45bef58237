//! IP/Router: destination-to-next-hop lookup with flow-hash ECMP.

use std::collections::HashMap;

use uet_common::config::IpConfig;
use uet_common::packet::{HostId, Packet};
use uet_common::signals::SignalRegistry;
use uet_common::time::Tick;

use crate::scheduler::{Actor, PortId, Scheduler};

#[derive(Debug, Clone)]
pub struct RoutingEntry {
    pub dest: HostId,
    pub next_hops: Vec<PortId>,
    pub metric: u32,
    pub packets_forwarded: u64,
    pub last_used: Tick,
}

pub struct Router {
    actor: Actor,
    up: Actor,
    down: Actor,
    local: HostId,
    cfg: IpConfig,
    table: HashMap<HostId, RoutingEntry>,
}

impl Router {
    pub fn new(actor: Actor, up: Actor, down: Actor, local: HostId, cfg: IpConfig) -> Self {
        Router { actor, up, down, local, cfg, table: HashMap::new() }
    }

    /// Populates the default table: a self-entry for local delivery plus a
    /// default entry for every other known host, next hop derived from the
    /// address modulo the port count.
    pub fn populate_default(&mut self, num_hosts: u32, num_ports: u32, now: Tick, signals: &mut SignalRegistry) {
        self.insert(
            self.local,
            RoutingEntry { dest: self.local, next_hops: vec![0], metric: 0, packets_forwarded: 0, last_used: now },
            signals,
        );
        for dest in 0..num_hosts {
            if dest == self.local {
                continue;
            }
            self.insert(
                dest,
                RoutingEntry {
                    dest,
                    next_hops: vec![dest % num_ports.max(1)],
                    metric: 1,
                    packets_forwarded: 0,
                    last_used: now,
                },
                signals,
            );
        }
    }

    pub fn insert(&mut self, dest: HostId, entry: RoutingEntry, signals: &mut SignalRegistry) {
        self.table.insert(dest, entry);
        signals.observe("ip.routingTableSize", self.table.len() as f64, 0);
    }

    pub fn remove(&mut self, dest: HostId, signals: &mut SignalRegistry) {
        if self.table.remove(&dest).is_some() {
            signals.observe("ip.routingTableSize", self.table.len() as f64, 0);
        }
    }

    fn route(&mut self, pkt: &mut Packet, now: Tick) -> bool {
        let Some(entry) = self.table.get_mut(&pkt.dst) else {
            return false;
        };
        if self.cfg.load_balancing_enabled && entry.next_hops.len() > 1 {
            let idx = (pkt.flow_id as usize) % entry.next_hops.len();
            pkt.path_id = Some(entry.next_hops[idx]);
        } else if let Some(&hop) = entry.next_hops.first() {
            pkt.path_id = Some(hop);
        }
        entry.packets_forwarded += 1;
        entry.last_used = now;
        true
    }

    /// A packet arrives from the transport layer above, bound outward.
    pub fn from_transport(&mut self, mut pkt: Packet, now: Tick, sched: &mut Scheduler, signals: &mut SignalRegistry) {
        pkt.src = self.local;
        if self.route(&mut pkt, now) {
            let at = now + uet_common::time::secs_to_ticks(self.cfg.routing_latency_secs);
            signals.incr("ip.packetsForwarded", 1);
            sched.schedule_packet(at, self.down, pkt);
        } else {
            tracing::debug!(dest = pkt.dst, "routing miss, dropping packet");
            signals.incr("ip.packetsDropped", 1);
        }
    }

    /// A packet arrives from the link layer below, either for local
    /// delivery or for further forwarding (when this router sits on a
    /// multi-hop path).
    pub fn from_link(&mut self, mut pkt: Packet, now: Tick, sched: &mut Scheduler, signals: &mut SignalRegistry) {
        if pkt.dst == self.local {
            signals.incr("ip.packetsForwarded", 1);
            sched.schedule_packet(now, self.up, pkt);
            return;
        }
        if self.route(&mut pkt, now) {
            let at = now + uet_common::time::secs_to_ticks(self.cfg.routing_latency_secs);
            signals.incr("ip.packetsForwarded", 1);
            sched.schedule_packet(at, self.down, pkt);
        } else {
            tracing::debug!(dest = pkt.dst, "routing miss, dropping packet");
            signals.incr("ip.packetsDropped", 1);
        }
    }

    /// Arms the initial routing-update timer. The aging sweep runs
    /// unconditionally on this cadence regardless of table occupancy,
    /// unlike the retransmission/LLR timers which only rearm while their
    /// buffer is non-empty.
    pub fn start(&mut self, sched: &mut Scheduler) {
        let period = uet_common::time::secs_to_ticks(self.cfg.routing_update_interval_secs);
        sched.arm_timer(period, self.actor, crate::scheduler::TimerKind::RoutingUpdate);
    }

    /// Periodic aging sweep: drops entries idle for more than 10s, then
    /// rearms itself for the next interval.
    pub fn on_routing_update(&mut self, now: Tick, sched: &mut Scheduler, signals: &mut SignalRegistry) {
        let idle_limit = uet_common::time::secs_to_ticks(10.0);
        self.table.retain(|_, e| now.saturating_sub(e.last_used) <= idle_limit);
        signals.observe("ip.routingTableSize", self.table.len() as f64, now);

        let period = uet_common::time::secs_to_ticks(self.cfg.routing_update_interval_secs);
        sched.arm_timer(now + period, self.actor, crate::scheduler::TimerKind::RoutingUpdate);
    }

    pub fn table_len(&self) -> usize {
        self.table.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> IpConfig {
        IpConfig { routing_latency_secs: 0.0, load_balancing_enabled: true, routing_table_size: 16, routing_update_interval_secs: 1.0 }
    }

    #[test]
    fn ecmp_picks_hop_by_flow_hash() {
        let mut sched = Scheduler::new(1);
        let mut signals = SignalRegistry::new(false);
        let mut router = Router::new(Actor::Ip(0), Actor::Transport(0), Actor::HostLink(0), 0, cfg());
        router.insert(
            9,
            RoutingEntry { dest: 9, next_hops: vec![0, 1, 2], metric: 1, packets_forwarded: 0, last_used: 0 },
            &mut signals,
        );

        let mut pkt = Packet::new_data(0, 9, 7, 0, 64, 0);
        router.route(&mut pkt, 0);
        assert_eq!(pkt.path_id, Some(7 % 3));
    }

    #[test]
    fn missing_route_is_dropped() {
        let mut sched = Scheduler::new(1);
        let mut signals = SignalRegistry::new(false);
        let mut router = Router::new(Actor::Ip(0), Actor::Transport(0), Actor::HostLink(0), 0, cfg());
        let pkt = Packet::new_data(0, 99, 0, 0, 64, 0);
        router.from_transport(pkt, 0, &mut sched, &mut signals);
        assert_eq!(signals.counter("ip.packetsDropped"), 1);
        assert!(sched.pop().is_none());
    }

    #[test]
    fn aging_drops_idle_entries() {
        let mut signals = SignalRegistry::new(false);
        let mut router = Router::new(Actor::Ip(0), Actor::Transport(0), Actor::HostLink(0), 0, cfg());
        router.insert(5, RoutingEntry { dest: 5, next_hops: vec![0], metric: 1, packets_forwarded: 0, last_used: 0 }, &mut signals);

        let past_idle = uet_common::time::secs_to_ticks(11.0);
        let mut sched = Scheduler::new(1);
        router.on_routing_update(past_idle, &mut sched, &mut signals);
        assert_eq!(router.table_len(), 0);
    }

    #[test]
    fn insert_and_remove_mutate_table_directly() {
        let mut signals = SignalRegistry::new(false);
        let mut router = Router::new(Actor::Ip(0), Actor::Transport(0), Actor::HostLink(0), 0, cfg());
        router.insert(2, RoutingEntry { dest: 2, next_hops: vec![0], metric: 1, packets_forwarded: 0, last_used: 0 }, &mut signals);
        assert_eq!(router.table_len(), 1);
        router.remove(2, &mut signals);
        assert_eq!(router.table_len(), 0);
    }
}
