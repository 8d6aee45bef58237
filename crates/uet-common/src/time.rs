//! Virtual simulation time.
//!
//! The simulator never touches the wall clock; every delay is expressed in
//! [`Tick`]s of virtual time that the scheduler advances explicitly.

/// A point in (or duration of) virtual time, in nanoseconds.
pub type Tick = u64;

pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Converts a duration expressed in fractional seconds (as scenario config
/// fields are authored) into whole nanosecond ticks.
pub fn secs_to_ticks(secs: f64) -> Tick {
    (secs.max(0.0) * NANOS_PER_SEC as f64).round() as Tick
}

/// Converts ticks back to fractional seconds, for reporting.
pub fn ticks_to_secs(ticks: Tick) -> f64 {
    ticks as f64 / NANOS_PER_SEC as f64
}
