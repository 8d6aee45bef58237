//! Periodic signal snapshotting.
//!
//! The analyzer owns no simulation state and performs no protocol logic —
//! it only reads [`SignalRegistry`] on a fixed cadence and appends what it
//! sees to a time series. Every other component is the one doing the actual
//! publishing, via `signals.incr`/`signals.observe` calls made inline with
//! their own event handling.

use uet_common::signals::{SignalRegistry, SignalSnapshot};
use uet_common::time::Tick;

use crate::scheduler::{Actor, Scheduler, TimerKind};

pub struct Analyzer {
    actor: Actor,
    interval_secs: f64,
    history: Vec<SignalSnapshot>,
}

impl Analyzer {
    pub fn new(actor: Actor, interval_secs: f64) -> Self {
        Analyzer { actor, interval_secs, history: Vec::new() }
    }

    pub fn start(&mut self, sched: &mut Scheduler) {
        let period = uet_common::time::secs_to_ticks(self.interval_secs);
        sched.arm_timer(period, self.actor, TimerKind::Analyzer);
    }

    /// The measurement-interval timer fires: snapshot, record, rearm.
    pub fn on_tick(&mut self, now: Tick, sched: &mut Scheduler, signals: &SignalRegistry) {
        self.history.push(signals.snapshot(now));
        let period = uet_common::time::secs_to_ticks(self.interval_secs);
        sched.arm_timer(now + period, self.actor, TimerKind::Analyzer);
    }

    pub fn history(&self) -> &[SignalSnapshot] {
        &self.history
    }

    pub fn latest(&self) -> Option<&SignalSnapshot> {
        self.history.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_appends_a_snapshot_and_rearms() {
        let mut sched = Scheduler::new(1);
        let mut signals = SignalRegistry::new(false);
        signals.incr("workload.messagesSent", 5);
        let mut analyzer = Analyzer::new(Actor::Analyzer, 0.1);

        analyzer.on_tick(0, &mut sched, &signals);
        assert_eq!(analyzer.history().len(), 1);
        assert_eq!(analyzer.latest().unwrap().counters.get("workload.messagesSent"), Some(&5));

        let (actor, payload) = sched.pop().unwrap();
        assert_eq!(actor, Actor::Analyzer);
        match payload {
            crate::scheduler::EventPayload::Timer { kind, .. } => assert_eq!(kind, TimerKind::Analyzer),
            _ => panic!("expected rearmed analyzer timer"),
        }
    }

    #[test]
    fn history_accumulates_across_multiple_ticks() {
        let mut sched = Scheduler::new(1);
        let mut signals = SignalRegistry::new(false);
        let mut analyzer = Analyzer::new(Actor::Analyzer, 0.1);

        analyzer.on_tick(0, &mut sched, &signals);
        signals.incr("ip.packetsForwarded", 1);
        analyzer.on_tick(uet_common::time::secs_to_ticks(0.1), &mut sched, &signals);

        assert_eq!(analyzer.history().len(), 2);
        assert_eq!(analyzer.history()[0].counters.get("ip.packetsForwarded"), None);
        assert_eq!(analyzer.history()[1].counters.get("ip.packetsForwarded"), Some(&1));
    }
}
