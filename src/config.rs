use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::vmm::replacement::Policy;
use crate::workload::WorkloadConfig;

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Config {
    pub log_level: String,
    pub listen_addr: String,
    /// Delay between generated accesses, in milliseconds.
    pub tick_ms: u64,
    pub vmm: VmmConfig,
    pub workload: WorkloadConfig,
}

/// Simulator geometry and feature switches. Applying a new one rebuilds
/// the page table, the frame array and the replacement policy from
/// scratch; metrics are never reset by a configuration change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VmmConfig {
    pub total_frames: usize,
    /// Page size in bytes. Informational only, nothing in the simulator
    /// moves actual bytes.
    pub page_size: usize,
    pub total_pages: usize,
    pub replacement_policy: Policy,
    pub enable_ai_predictions: bool,
}

impl VmmConfig {
    pub fn validate(&self) -> Result<()> {
        if self.total_frames == 0 {
            return Err(Error::config("total_frames must be positive"));
        }
        if self.total_pages == 0 {
            return Err(Error::config("total_pages must be positive"));
        }
        Ok(())
    }
}

impl Config {
    pub fn new(file: &str) -> Result<Config> {
        let mut cfg = config::Config::builder()
            .set_default("log_level", "info")?
            .set_default("listen_addr", "0.0.0.0:8080")?
            .set_default("tick_ms", 10)?
            .set_default("vmm.total_frames", 256)?
            .set_default("vmm.page_size", 4096)?
            .set_default("vmm.total_pages", 1024)?
            .set_default("vmm.replacement_policy", "CLOCK")?
            .set_default("vmm.enable_ai_predictions", true)?
            .set_default("workload.type", "RANDOM")?
            .set_default("workload.total_requests", 1000)?
            .set_default("workload.page_range", 1000)?
            .set_default("workload.stride", 1)?
            .set_default("workload.zipf_alpha", 1.0)?
            .set_default("workload.locality_factor", 0.8)?
            .set_default("workload.working_set_size", 100)?;
        if !file.is_empty() {
            cfg = cfg.add_source(config::File::with_name(file))
        }
        cfg = cfg.add_source(config::Environment::with_prefix("VMSIM"));
        let config: Config = cfg.build()?.try_deserialize()?;
        config.vmm.validate()?;
        config.workload.validate()?;
        Ok(config)
    }
}
