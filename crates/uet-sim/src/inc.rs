//! In-network computing: collective admission, queueing, and reduction.
//!
//! Reachable two ways: packets diverted here by the switch fabric (the
//! generic forwarding path every collective-bearing packet can take), and
//! [`IncProcessor::submit`], a direct entry point a caller can use to
//! exercise the processor without routing a packet through the whole
//! fabric first. The bundled workload generator never calls either path
//! for its own collective traffic — see [`crate::workload`].

use std::collections::VecDeque;

use uet_common::config::IncConfig;
use uet_common::packet::{CollectiveType, Packet};
use uet_common::signals::SignalRegistry;
use uet_common::time::Tick;

use crate::scheduler::{Actor, Scheduler, TimerKind};

struct Operation {
    packet: Packet,
    start: Tick,
}

pub struct IncProcessor {
    actor: Actor,
    fabric: Actor,
    cfg: IncConfig,
    queue: VecDeque<Operation>,
    buffered_bytes: usize,
    active_ops: u32,
    timer_armed: bool,
}

impl IncProcessor {
    pub fn new(actor: Actor, fabric: Actor, cfg: IncConfig) -> Self {
        IncProcessor { actor, fabric, cfg, queue: VecDeque::new(), buffered_bytes: 0, active_ops: 0, timer_armed: false }
    }

    /// Admits (or rejects) an INC request. This is the single admission
    /// path, whether the packet arrived via the fabric or via a direct
    /// [`IncProcessor::submit`] call.
    pub fn submit(&mut self, pkt: Packet, now: Tick, sched: &mut Scheduler, signals: &mut SignalRegistry) {
        if !self.cfg.enabled {
            signals.incr("inc.operationsDropped", 1);
            return;
        }
        let admitted = self.active_ops < self.cfg.max_concurrent_operations
            && self.buffered_bytes + pkt.byte_len <= self.cfg.buffer_size;
        if !admitted {
            tracing::debug!(active_ops = self.active_ops, buffered_bytes = self.buffered_bytes, "INC admission rejected");
            signals.incr("inc.operationsDropped", 1);
            return;
        }
        self.buffered_bytes += pkt.byte_len;
        self.queue.push_back(Operation { packet: pkt, start: now });
        if !self.timer_armed {
            self.arm(now, sched);
        }
    }

    fn arm(&mut self, now: Tick, sched: &mut Scheduler) {
        self.timer_armed = true;
        let latency = uet_common::time::secs_to_ticks(self.cfg.processing_latency_secs);
        sched.arm_timer(now + latency, self.actor, TimerKind::IncProcessing);
    }

    /// The processing timer fires: dequeue the head, produce (or fail to
    /// produce) a result, and rearm while work remains and concurrency
    /// allows it.
    pub fn on_processing_timer(&mut self, now: Tick, sched: &mut Scheduler, signals: &mut SignalRegistry) {
        self.timer_armed = false;
        let Some(op) = self.queue.pop_front() else {
            return;
        };
        self.active_ops += 1;
        self.buffered_bytes = self.buffered_bytes.saturating_sub(op.packet.byte_len);

        match transform_size(&op.packet) {
            Some(result_len) => {
                if let Some(result) = op.packet.make_inc_result(result_len, now) {
                    sched.schedule_packet(now, self.fabric, result);
                    signals.incr("inc.operationsProcessed", 1);
                    signals.observe("inc.latency", uet_common::time::ticks_to_secs(now - op.start), now);
                }
            }
            None => {
                tracing::warn!("INC packet with no collective fields reached processing, dropping");
                signals.incr("inc.operationsDropped", 1);
            }
        }

        self.active_ops -= 1;
        signals.observe("inc.bufferUtilization", self.buffered_bytes as f64 / self.cfg.buffer_size.max(1) as f64, now);

        if !self.queue.is_empty() && self.active_ops < self.cfg.max_concurrent_operations {
            self.arm(now, sched);
        }
    }
}

/// Collective-specific size transform (§4.6). Returns `None` for an
/// unrecognised collective, which is a processing failure, not an
/// admission failure.
fn transform_size(pkt: &Packet) -> Option<usize> {
    let inc = pkt.inc?;
    let participants = inc.participant_count.max(1) as usize;
    Some(match inc.collective {
        CollectiveType::AllReduce => pkt.byte_len,
        CollectiveType::AllGather => pkt.byte_len * participants,
        CollectiveType::Broadcast => pkt.byte_len,
        CollectiveType::ReduceScatter => pkt.byte_len / participants,
    })
}
