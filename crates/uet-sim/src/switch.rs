//! Switch fabric and per-port latency pass-through.
//!
//! The fabric itself holds no reliability state — that lives in the
//! per-port [`crate::link::Link`]/[`crate::phy::Phy`] pair on each side of
//! a hop. The fabric only decides egress: INC packets divert to the INC
//! processor, everything else goes to `dest mod numPorts`.

use uet_common::config::{PortConfig, SwitchConfig};
use uet_common::packet::Packet;
use uet_common::signals::SignalRegistry;
use uet_common::time::Tick;

use crate::scheduler::{Actor, PortId, Scheduler};

pub struct SwitchFabric {
    num_ports: u32,
    cfg: SwitchConfig,
    inc_actor: Actor,
}

impl SwitchFabric {
    pub fn new(cfg: SwitchConfig, inc_actor: Actor) -> Self {
        let num_ports = cfg.num_ports as u32;
        SwitchFabric { num_ports, cfg, inc_actor }
    }

    /// A packet arrives at the fabric from one of its ports, or an INC
    /// result re-entering after processing.
    pub fn handle(&mut self, pkt: Packet, now: Tick, sched: &mut Scheduler, signals: &mut SignalRegistry) {
        let at = now + uet_common::time::secs_to_ticks(self.cfg.switching_latency_secs);
        // A fresh collective request diverts to INC; its result (intermediate
        // flag set by `Packet::make_inc_result`) is routed like any other
        // packet so it doesn't loop back into the processor forever.
        if pkt.inc.is_some_and(|inc| !inc.intermediate) {
            sched.schedule_packet(at, self.inc_actor, pkt);
            return;
        }
        let egress: PortId = pkt.dst % self.num_ports.max(1);
        signals.incr("switch.packetsForwarded", 1);
        sched.schedule_packet(at, Actor::SwitchPort(egress), pkt);
    }
}

/// Thin latency stage between the fabric and a port's Link/PHY pair.
pub struct SwitchPort {
    port: PortId,
    fabric: Actor,
    link: Actor,
    cfg: PortConfig,
}

impl SwitchPort {
    pub fn new(port: PortId, fabric: Actor, link: Actor, cfg: PortConfig) -> Self {
        SwitchPort { port, fabric, link, cfg }
    }

    pub fn from_fabric(&mut self, pkt: Packet, now: Tick, sched: &mut Scheduler) {
        let at = now + uet_common::time::secs_to_ticks(self.cfg.processing_latency_secs);
        sched.schedule_packet(at, self.link, pkt);
    }

    pub fn from_link(&mut self, pkt: Packet, now: Tick, sched: &mut Scheduler) {
        let at = now + uet_common::time::secs_to_ticks(self.cfg.processing_latency_secs);
        sched.schedule_packet(at, self.fabric, pkt);
    }

    pub fn port_id(&self) -> PortId {
        self.port
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uet_common::packet::{CollectiveType, IncFields, ReductionOp};

    #[test]
    fn non_inc_packet_egresses_by_dest_modulo_num_ports() {
        let mut sched = Scheduler::new(1);
        let mut signals = SignalRegistry::new(false);
        let mut fabric = SwitchFabric::new(
            SwitchConfig { num_ports: 4, switching_latency_secs: 0.0, bandwidth_bps: 1.0 },
            Actor::Inc,
        );
        let pkt = Packet::new_data(0, 6, 0, 0, 64, 0);
        fabric.handle(pkt, 0, &mut sched, &mut signals);
        let (actor, _) = sched.pop().unwrap();
        assert_eq!(actor, Actor::SwitchPort(6 % 4));
    }

    #[test]
    fn fresh_inc_request_diverts_to_inc_regardless_of_dest() {
        let mut sched = Scheduler::new(1);
        let mut signals = SignalRegistry::new(false);
        let mut fabric = SwitchFabric::new(
            SwitchConfig { num_ports: 4, switching_latency_secs: 0.0, bandwidth_bps: 1.0 },
            Actor::Inc,
        );
        let mut pkt = Packet::new_data(0, 6, 0, 0, 64, 0);
        pkt.inc = Some(IncFields { collective: CollectiveType::AllReduce, reduction_op: ReductionOp::Sum, participant_count: 2, intermediate: false });
        fabric.handle(pkt, 0, &mut sched, &mut signals);
        let (actor, _) = sched.pop().unwrap();
        assert_eq!(actor, Actor::Inc);
    }

    #[test]
    fn inc_result_re_entering_the_fabric_is_routed_not_diverted_again() {
        let mut sched = Scheduler::new(1);
        let mut signals = SignalRegistry::new(false);
        let mut fabric = SwitchFabric::new(
            SwitchConfig { num_ports: 4, switching_latency_secs: 0.0, bandwidth_bps: 1.0 },
            Actor::Inc,
        );
        let mut pkt = Packet::new_data(1, 6, 0, 0, 64, 0);
        pkt.inc = Some(IncFields { collective: CollectiveType::AllReduce, reduction_op: ReductionOp::Sum, participant_count: 2, intermediate: true });
        fabric.handle(pkt, 0, &mut sched, &mut signals);
        let (actor, _) = sched.pop().unwrap();
        assert_eq!(actor, Actor::SwitchPort(6 % 4));
    }
}
