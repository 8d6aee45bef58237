//! Topology construction and the central event-dispatch loop.
//!
//! The fabric modelled is a single-switch star: every host connects to its
//! own dedicated switch port, so the effective port count is pinned to
//! `num_hosts` (overriding `cfg.switch.num_ports`, which only bounds
//! fan-out on multi-tier topologies this simulator doesn't build). Each
//! logical hop owns a [`crate::link::Link`]/[`crate::phy::Phy`] pair on
//! both the host side and the switch side of the wire.

use serde::Serialize;

use uet_common::config::ScenarioConfig;
use uet_common::packet::HostId;
use uet_common::signals::{SignalRegistry, SignalSnapshot};
use uet_common::time::Tick;

use crate::analyzer::Analyzer;
use crate::inc::IncProcessor;
use crate::link::Link;
use crate::phy::Phy;
use crate::router::Router;
use crate::scheduler::{Actor, EventPayload, PortId, Scheduler};
use crate::switch::{SwitchFabric, SwitchPort};
use crate::transport::Transport;
use crate::workload::Workload;

/// End-of-run artifact: the final signal snapshot plus the analyzer's
/// periodic history leading up to it.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub seed: u64,
    pub num_hosts: u32,
    pub sim_duration_secs: f64,
    pub final_time_secs: f64,
    pub final_snapshot: SignalSnapshot,
    pub history: Vec<SignalSnapshot>,
}

pub struct Network {
    cfg: ScenarioConfig,
    sched: Scheduler,
    signals: SignalRegistry,

    workloads: Vec<Workload>,
    transports: Vec<Transport>,
    routers: Vec<Router>,
    host_links: Vec<Link>,
    host_phys: Vec<Phy>,

    switch_ports: Vec<SwitchPort>,
    switch_links: Vec<Link>,
    switch_phys: Vec<Phy>,

    fabric: SwitchFabric,
    inc: IncProcessor,
    analyzer: Analyzer,
}

impl Network {
    pub fn new(cfg: ScenarioConfig) -> Self {
        let num_hosts = cfg.num_hosts;
        let num_ports = num_hosts; // one port per host, pinned (see module docs)
        let mut sched = Scheduler::new(cfg.seed);
        let mut signals = SignalRegistry::new(cfg.enable_detailed_stats);

        let mut workloads = Vec::with_capacity(num_hosts as usize);
        let mut transports = Vec::with_capacity(num_hosts as usize);
        let mut routers = Vec::with_capacity(num_hosts as usize);
        let mut host_links = Vec::with_capacity(num_hosts as usize);
        let mut host_phys = Vec::with_capacity(num_hosts as usize);

        for h in 0..num_hosts {
            workloads.push(Workload::new(Actor::Workload(h), h, cfg.workload.clone()));
            transports.push(Transport::new(Actor::Transport(h), Actor::Workload(h), Actor::IpTx(h), h, cfg.transport.clone()));

            let mut router = Router::new(Actor::Ip(h), Actor::Transport(h), Actor::HostLinkTx(h), h, cfg.ip.clone());
            router.populate_default(num_hosts, num_ports, 0, &mut signals);
            routers.push(router);

            host_links.push(Link::new(Actor::HostLink(h), Actor::Ip(h), Actor::HostPhyTx(h), Actor::SwitchPortLink(h), cfg.link.clone()));
            host_phys.push(Phy::new(Actor::HostPhy(h), Actor::SwitchPortPhy(h), Actor::HostLink(h), cfg.phy.clone()));
        }

        let mut switch_ports = Vec::with_capacity(num_ports as usize);
        let mut switch_links = Vec::with_capacity(num_ports as usize);
        let mut switch_phys = Vec::with_capacity(num_ports as usize);

        for p in 0..num_ports {
            switch_ports.push(SwitchPort::new(p, Actor::SwitchFabric, Actor::SwitchPortLinkTx(p), cfg.port.clone()));
            switch_links.push(Link::new(Actor::SwitchPortLink(p), Actor::SwitchPortUp(p), Actor::SwitchPortPhyTx(p), Actor::HostLink(p), cfg.link.clone()));
            switch_phys.push(Phy::new(Actor::SwitchPortPhy(p), Actor::HostPhy(p), Actor::SwitchPortLink(p), cfg.phy.clone()));
        }

        let fabric = SwitchFabric::new(cfg.switch.clone(), Actor::Inc);
        let inc = IncProcessor::new(Actor::Inc, Actor::SwitchFabric, cfg.inc.clone());
        let analyzer = Analyzer::new(Actor::Analyzer, cfg.measurement_interval_secs);

        let mut net = Network {
            cfg,
            sched,
            signals,
            workloads,
            transports,
            routers,
            host_links,
            host_phys,
            switch_ports,
            switch_links,
            switch_phys,
            fabric,
            inc,
            analyzer,
        };
        net.arm_initial_timers();
        net
    }

    fn arm_initial_timers(&mut self) {
        for h in 0..self.cfg.num_hosts {
            self.workloads[h as usize].start(&mut self.sched);
            self.routers[h as usize].start(&mut self.sched);
        }
        self.analyzer.start(&mut self.sched);
    }

    /// Runs the scheduler to completion (or until the configured duration
    /// bound) and returns the end-of-run report.
    pub fn run(mut self) -> RunReport {
        let duration = uet_common::time::secs_to_ticks(self.cfg.sim_duration_secs);
        loop {
            let Some(next) = self.sched.peek_time() else {
                break;
            };
            if next > duration {
                break;
            }
            let Some((actor, payload)) = self.sched.pop() else {
                break;
            };
            self.dispatch(actor, payload);
        }

        let now = self.sched.now();
        RunReport {
            seed: self.cfg.seed,
            num_hosts: self.cfg.num_hosts,
            sim_duration_secs: self.cfg.sim_duration_secs,
            final_time_secs: uet_common::time::ticks_to_secs(now),
            final_snapshot: self.signals.snapshot(now),
            history: self.analyzer.history().to_vec(),
        }
    }

    fn dispatch(&mut self, actor: Actor, payload: EventPayload) {
        let now = self.sched.now();
        match actor {
            Actor::Workload(h) => self.on_workload(h, now, payload),
            Actor::Transport(h) => self.on_transport(h, now, payload),
            Actor::Ip(h) => self.on_ip(h, now, payload),
            Actor::IpTx(h) => self.on_ip_tx(h, now, payload),
            Actor::HostLink(h) => self.on_host_link(h, now, payload),
            Actor::HostLinkTx(h) => self.on_host_link_tx(h, now, payload),
            Actor::HostPhy(h) => self.on_host_phy(h, now, payload),
            Actor::HostPhyTx(h) => self.on_host_phy_tx(h, now, payload),
            Actor::SwitchPort(p) => self.on_switch_port(p, now, payload),
            Actor::SwitchPortUp(p) => self.on_switch_port_up(p, now, payload),
            Actor::SwitchPortLink(p) => self.on_switch_port_link(p, now, payload),
            Actor::SwitchPortLinkTx(p) => self.on_switch_port_link_tx(p, now, payload),
            Actor::SwitchPortPhy(p) => self.on_switch_port_phy(p, now, payload),
            Actor::SwitchPortPhyTx(p) => self.on_switch_port_phy_tx(p, now, payload),
            Actor::SwitchFabric => self.on_switch_fabric(now, payload),
            Actor::Inc => self.on_inc(now, payload),
            Actor::Analyzer => self.on_analyzer(now, payload),
        }
    }

    fn on_workload(&mut self, h: HostId, now: Tick, payload: EventPayload) {
        let i = h as usize;
        match payload {
            EventPayload::Timer { .. } => {
                self.workloads[i].on_tick(now, &mut self.sched, &mut self.transports[i], &mut self.signals);
            }
            EventPayload::Packet(pkt) => {
                self.workloads[i].on_receive(pkt.seq, pkt.byte_len, now, &mut self.signals);
            }
            EventPayload::LlrAck(_) => {}
        }
    }

    fn on_transport(&mut self, h: HostId, now: Tick, payload: EventPayload) {
        let i = h as usize;
        match payload {
            EventPayload::Packet(pkt) => {
                self.transports[i].receive(pkt, now, &mut self.sched, &mut self.signals);
            }
            EventPayload::Timer { .. } => {
                self.transports[i].on_retransmit_timer(now, &mut self.sched, &mut self.signals);
            }
            EventPayload::LlrAck(_) => {}
        }
    }

    fn on_ip(&mut self, h: HostId, now: Tick, payload: EventPayload) {
        let i = h as usize;
        match payload {
            EventPayload::Packet(pkt) => {
                self.routers[i].from_link(pkt, now, &mut self.sched, &mut self.signals);
            }
            EventPayload::Timer { .. } => {
                self.routers[i].on_routing_update(now, &mut self.sched, &mut self.signals);
            }
            EventPayload::LlrAck(_) => {}
        }
    }

    fn on_ip_tx(&mut self, h: HostId, now: Tick, payload: EventPayload) {
        if let EventPayload::Packet(pkt) = payload {
            self.routers[h as usize].from_transport(pkt, now, &mut self.sched, &mut self.signals);
        }
    }

    fn on_host_link(&mut self, h: HostId, now: Tick, payload: EventPayload) {
        let i = h as usize;
        match payload {
            EventPayload::Packet(pkt) => {
                self.host_links[i].receive(pkt, now, &mut self.sched, &mut self.signals);
            }
            EventPayload::Timer { .. } => {
                self.host_links[i].on_timeout(now, &mut self.sched, &mut self.signals);
            }
            EventPayload::LlrAck(ack) => {
                self.host_links[i].on_ack(ack, now, &mut self.sched, &mut self.signals);
            }
        }
    }

    fn on_host_link_tx(&mut self, h: HostId, now: Tick, payload: EventPayload) {
        if let EventPayload::Packet(pkt) = payload {
            self.host_links[h as usize].send(pkt, now, &mut self.sched, &mut self.signals);
        }
    }

    fn on_host_phy(&mut self, h: HostId, now: Tick, payload: EventPayload) {
        let i = h as usize;
        match payload {
            EventPayload::Packet(pkt) => {
                self.host_phys[i].receive(pkt, now, &mut self.sched, &mut self.signals);
            }
            EventPayload::Timer { .. } => {
                self.host_phys[i].on_transmit_timer(now, &mut self.sched);
            }
            EventPayload::LlrAck(_) => {}
        }
    }

    fn on_host_phy_tx(&mut self, h: HostId, now: Tick, payload: EventPayload) {
        if let EventPayload::Packet(pkt) = payload {
            self.host_phys[h as usize].transmit(pkt, now, &mut self.sched);
        }
    }

    fn on_switch_port(&mut self, p: PortId, now: Tick, payload: EventPayload) {
        if let EventPayload::Packet(pkt) = payload {
            self.switch_ports[p as usize].from_fabric(pkt, now, &mut self.sched);
        }
    }

    fn on_switch_port_up(&mut self, p: PortId, now: Tick, payload: EventPayload) {
        if let EventPayload::Packet(pkt) = payload {
            self.switch_ports[p as usize].from_link(pkt, now, &mut self.sched);
        }
    }

    fn on_switch_port_link(&mut self, p: PortId, now: Tick, payload: EventPayload) {
        let i = p as usize;
        match payload {
            EventPayload::Packet(pkt) => {
                self.switch_links[i].receive(pkt, now, &mut self.sched, &mut self.signals);
            }
            EventPayload::Timer { .. } => {
                self.switch_links[i].on_timeout(now, &mut self.sched, &mut self.signals);
            }
            EventPayload::LlrAck(ack) => {
                self.switch_links[i].on_ack(ack, now, &mut self.sched, &mut self.signals);
            }
        }
    }

    fn on_switch_port_link_tx(&mut self, p: PortId, now: Tick, payload: EventPayload) {
        if let EventPayload::Packet(pkt) = payload {
            self.switch_links[p as usize].send(pkt, now, &mut self.sched, &mut self.signals);
        }
    }

    fn on_switch_port_phy(&mut self, p: PortId, now: Tick, payload: EventPayload) {
        let i = p as usize;
        match payload {
            EventPayload::Packet(pkt) => {
                self.switch_phys[i].receive(pkt, now, &mut self.sched, &mut self.signals);
            }
            EventPayload::Timer { .. } => {
                self.switch_phys[i].on_transmit_timer(now, &mut self.sched);
            }
            EventPayload::LlrAck(_) => {}
        }
    }

    fn on_switch_port_phy_tx(&mut self, p: PortId, now: Tick, payload: EventPayload) {
        if let EventPayload::Packet(pkt) = payload {
            self.switch_phys[p as usize].transmit(pkt, now, &mut self.sched);
        }
    }

    fn on_switch_fabric(&mut self, now: Tick, payload: EventPayload) {
        if let EventPayload::Packet(pkt) = payload {
            self.fabric.handle(pkt, now, &mut self.sched, &mut self.signals);
        }
    }

    fn on_inc(&mut self, now: Tick, payload: EventPayload) {
        match payload {
            EventPayload::Packet(pkt) => {
                self.inc.submit(pkt, now, &mut self.sched, &mut self.signals);
            }
            EventPayload::Timer { .. } => {
                self.inc.on_processing_timer(now, &mut self.sched, &mut self.signals);
            }
            EventPayload::LlrAck(_) => {}
        }
    }

    fn on_analyzer(&mut self, now: Tick, payload: EventPayload) {
        if let EventPayload::Timer { .. } = payload {
            self.analyzer.on_tick(now, &mut self.sched, &self.signals);
        }
    }
}
