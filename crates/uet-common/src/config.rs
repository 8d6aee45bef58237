//! Layered scenario configuration.
//!
//! Priority, lowest to highest: built-in defaults (this module's `Default`
//! impls) → an optional scenario TOML file → CLI flag overrides applied by
//! the binary. Every struct rejects unknown keys so a typo in a scenario
//! file fails fast instead of silently no-op'ing.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::packet::CollectiveType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkloadType {
    AiTraining,
    AiInference,
    HpcSimulation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportProfile {
    AiBase,
    AiFull,
    Hpc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkloadConfig {
    pub workload_type: WorkloadType,
    pub communication_pattern: CollectiveType,
    pub message_size: usize,
    pub job_size: u32,
    pub communication_intensity: f64,
    pub traffic_start_time_secs: f64,
    pub traffic_rate: f64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        WorkloadConfig {
            workload_type: WorkloadType::AiTraining,
            communication_pattern: CollectiveType::AllReduce,
            message_size: 1024,
            job_size: 4,
            communication_intensity: 1.0,
            traffic_start_time_secs: 0.0,
            traffic_rate: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportConfig {
    pub profile: TransportProfile,
    pub packet_spraying_enabled: bool,
    pub reordering_enabled: bool,
    pub max_reorder_buffer: usize,
    pub initial_congestion_window: u32,
    pub rdma_timeout_secs: f64,
    pub max_retransmissions: u8,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            profile: TransportProfile::AiFull,
            packet_spraying_enabled: true,
            reordering_enabled: true,
            max_reorder_buffer: 64,
            initial_congestion_window: 16,
            rdma_timeout_secs: 0.001,
            max_retransmissions: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IpConfig {
    pub routing_latency_secs: f64,
    pub load_balancing_enabled: bool,
    pub routing_table_size: usize,
    pub routing_update_interval_secs: f64,
}

impl Default for IpConfig {
    fn default() -> Self {
        IpConfig {
            routing_latency_secs: 0.0001,
            load_balancing_enabled: true,
            routing_table_size: 16,
            routing_update_interval_secs: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    pub llr_enabled: bool,
    pub llr_timeout_secs: f64,
    pub max_retransmissions: u8,
    pub pri_compression_ratio: f64,
    pub link_latency_secs: f64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            llr_enabled: true,
            llr_timeout_secs: 0.0005,
            max_retransmissions: 3,
            pri_compression_ratio: 0.2,
            link_latency_secs: 0.00005,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PhyConfig {
    pub link_speed_bps: f64,
    pub fec_overhead: f64,
    pub error_rate: f64,
    pub fec_correction_bits: u32,
    pub fec_enabled: bool,
}

impl Default for PhyConfig {
    fn default() -> Self {
        PhyConfig {
            link_speed_bps: 10e9,
            fec_overhead: 0.1,
            error_rate: 1e-6,
            fec_correction_bits: 8,
            fec_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SwitchConfig {
    pub num_ports: usize,
    pub switching_latency_secs: f64,
    pub bandwidth_bps: f64,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        SwitchConfig {
            num_ports: 8,
            switching_latency_secs: 0.00002,
            bandwidth_bps: 100e9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PortConfig {
    pub processing_latency_secs: f64,
}

impl Default for PortConfig {
    fn default() -> Self {
        PortConfig {
            processing_latency_secs: 0.00001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IncConfig {
    pub enabled: bool,
    pub processing_latency_secs: f64,
    pub max_concurrent_operations: u32,
    pub buffer_size: usize,
}

impl Default for IncConfig {
    fn default() -> Self {
        IncConfig {
            enabled: true,
            processing_latency_secs: 0.0002,
            max_concurrent_operations: 4,
            buffer_size: 8192,
        }
    }
}

/// Top-level, layered scenario description for a single simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    pub seed: u64,
    pub num_hosts: u32,
    pub sim_duration_secs: f64,
    pub measurement_interval_secs: f64,
    pub enable_detailed_stats: bool,
    pub workload: WorkloadConfig,
    pub transport: TransportConfig,
    pub ip: IpConfig,
    pub link: LinkConfig,
    pub phy: PhyConfig,
    pub switch: SwitchConfig,
    pub port: PortConfig,
    pub inc: IncConfig,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig {
            seed: 42,
            num_hosts: 4,
            sim_duration_secs: 1.0,
            measurement_interval_secs: 0.1,
            enable_detailed_stats: false,
            workload: WorkloadConfig::default(),
            transport: TransportConfig::default(),
            ip: IpConfig::default(),
            link: LinkConfig::default(),
            phy: PhyConfig::default(),
            switch: SwitchConfig::default(),
            port: PortConfig::default(),
            inc: IncConfig::default(),
        }
    }
}

impl ScenarioConfig {
    /// Parses a scenario from a TOML string, then validates field ranges.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: ScenarioConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Loads the scenario from `path`, or the built-in baseline if `None`.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        match path {
            None => Ok(ScenarioConfig::default()),
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&text)
            }
        }
    }

    /// Range/consistency checks not expressible as the type system alone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn unit_range(field: &'static str, v: f64, inclusive_upper: bool) -> Result<(), ConfigError> {
            let ok = if inclusive_upper { (0.0..=1.0).contains(&v) } else { (0.0..1.0).contains(&v) };
            if ok {
                Ok(())
            } else {
                Err(ConfigError::OutOfRange {
                    field,
                    detail: format!("{v} is not in the expected unit range"),
                })
            }
        }

        if self.num_hosts == 0 {
            return Err(ConfigError::OutOfRange {
                field: "num_hosts",
                detail: "must be at least 1".into(),
            });
        }
        unit_range("workload.communication_intensity", self.workload.communication_intensity, true)?;
        unit_range("link.pri_compression_ratio", self.link.pri_compression_ratio, false)?;
        unit_range("phy.fec_overhead", self.phy.fec_overhead, false)?;
        unit_range("phy.error_rate", self.phy.error_rate, true)?;
        if self.phy.link_speed_bps <= 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "phy.link_speed_bps",
                detail: "must be positive".into(),
            });
        }
        if self.switch.num_ports == 0 {
            return Err(ConfigError::OutOfRange {
                field: "switch.num_ports",
                detail: "must be at least 1".into(),
            });
        }
        if self.transport.initial_congestion_window == 0 || self.transport.initial_congestion_window > 64 {
            return Err(ConfigError::OutOfRange {
                field: "transport.initial_congestion_window",
                detail: "must be in [1, 64]".into(),
            });
        }
        Ok(())
    }
}
