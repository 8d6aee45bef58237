//! # uet-common
//!
//! Shared types for the Ultra Ethernet fabric simulator.
//!
//! ## Crate structure
//!
//! - [`time`] — virtual-time tick type and conversions
//! - [`packet`] — the single in-memory packet record and LLR ack control message
//! - [`config`] — layered scenario configuration (defaults, TOML file, overrides)
//! - [`error`] — typed configuration/setup errors
//! - [`signals`] — named-signal registry used by every component for metrics

pub mod config;
pub mod error;
pub mod packet;
pub mod signals;
pub mod time;
