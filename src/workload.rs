use std::fmt::{Display, Formatter};
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::vmm::page_table::PageNumber;

/// Probability that any generated access is a write, across all
/// workload types.
pub const WRITE_PROBABILITY: f64 = 0.3;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkloadType {
    Sequential,
    Random,
    Strided,
    Zipf,
    Webserver,
}

impl FromStr for WorkloadType {
    type Err = Error;

    fn from_str(s: &str) -> Result<WorkloadType> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(WorkloadType::Sequential),
            "random" => Ok(WorkloadType::Random),
            "strided" => Ok(WorkloadType::Strided),
            // the control surface calls the zipf workload "db_like"
            "zipf" | "db_like" => Ok(WorkloadType::Zipf),
            "webserver" => Ok(WorkloadType::Webserver),
            other => Err(Error::config(format!("unknown workload type {}", other))),
        }
    }
}

impl Display for WorkloadType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkloadType::Sequential => write!(f, "SEQUENTIAL"),
            WorkloadType::Random => write!(f, "RANDOM"),
            WorkloadType::Strided => write!(f, "STRIDED"),
            WorkloadType::Zipf => write!(f, "ZIPF"),
            WorkloadType::Webserver => write!(f, "WEBSERVER"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    #[serde(rename = "type")]
    pub workload_type: WorkloadType,
    pub total_requests: usize,
    /// Upper bound on generated page numbers, exclusive.
    pub page_range: usize,
    pub stride: usize,
    pub zipf_alpha: f64,
    pub locality_factor: f64,
    pub working_set_size: usize,
    /// Fixed seed makes the page and write-bit sequences reproducible.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl WorkloadConfig {
    pub fn validate(&self) -> Result<()> {
        if self.total_requests == 0 {
            return Err(Error::config("total_requests must be positive"));
        }
        if self.page_range == 0 {
            return Err(Error::config("page_range must be positive"));
        }
        if self.stride == 0 {
            return Err(Error::config("stride must be positive"));
        }
        if !self.zipf_alpha.is_finite() || self.zipf_alpha < 0.0 {
            return Err(Error::config("zipf_alpha must be non-negative"));
        }
        if !(0.0..=1.0).contains(&self.locality_factor) {
            return Err(Error::config("locality_factor must be within [0, 1]"));
        }
        if self.working_set_size == 0 {
            return Err(Error::config("working_set_size must be positive"));
        }
        Ok(())
    }
}

/// One synthetic page access.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Access {
    pub page: PageNumber,
    pub write: bool,
}

/// Produces the access trace that drives the VMM. The write bit is
/// drawn before the page so a fixed seed reproduces both sequences
/// exactly.
pub struct WorkloadGenerator {
    config: WorkloadConfig,
    rng: StdRng,
    position: usize,
    working_set: Vec<PageNumber>,
    /// Cumulative 1/k^alpha mass, built once per configuration.
    zipf_cdf: Vec<f64>,
}

impl WorkloadGenerator {
    pub fn new(config: WorkloadConfig) -> Result<WorkloadGenerator> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut generator = WorkloadGenerator {
            config,
            rng,
            position: 0,
            working_set: Vec::new(),
            zipf_cdf: Vec::new(),
        };
        generator.init_working_set();
        generator.build_zipf_cdf();
        Ok(generator)
    }

    pub fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_complete(&self) -> bool {
        self.position >= self.config.total_requests
    }

    /// Next access, or None once `total_requests` have been produced.
    pub fn next_access(&mut self) -> Option<Access> {
        if self.is_complete() {
            return None;
        }
        let write = self.rng.gen::<f64>() < WRITE_PROBABILITY;
        let page = match self.config.workload_type {
            WorkloadType::Sequential => self.position % self.config.page_range,
            WorkloadType::Random => self.random_page(),
            WorkloadType::Strided => (self.position * self.config.stride) % self.config.page_range,
            WorkloadType::Zipf => self.zipf_page(),
            WorkloadType::Webserver => self.webserver_page(),
        };
        self.position += 1;
        Some(Access { page, write })
    }

    /// Produce up to `n` accesses without driving the VMM, for trace
    /// export and tests.
    pub fn generate_batch(&mut self, n: usize) -> Vec<Access> {
        (0..n).map_while(|_| self.next_access()).collect()
    }

    /// Rewind to the start of the trace and rebuild the working set.
    pub fn reset(&mut self) {
        self.position = 0;
        self.init_working_set();
    }

    pub fn description(&self) -> String {
        match self.config.workload_type {
            WorkloadType::Sequential => "Sequential access pattern".to_string(),
            WorkloadType::Random => "Random access pattern".to_string(),
            WorkloadType::Strided => {
                format!("Strided access pattern (stride={})", self.config.stride)
            }
            WorkloadType::Zipf => format!("Zipf distribution (alpha={})", self.config.zipf_alpha),
            WorkloadType::Webserver => {
                format!("Webserver-like access pattern (locality={})", self.config.locality_factor)
            }
        }
    }

    fn random_page(&mut self) -> PageNumber {
        self.rng.gen_range(0..self.config.page_range)
    }

    /// Sample a popularity rank from the cumulative mass; rank 0 is the
    /// most popular page.
    fn zipf_page(&mut self) -> PageNumber {
        let total = self.zipf_cdf.last().copied().unwrap_or(0.0);
        let value = self.rng.gen::<f64>() * total;
        let rank = self.zipf_cdf.partition_point(|&mass| mass < value);
        rank.min(self.config.page_range - 1)
    }

    fn webserver_page(&mut self) -> PageNumber {
        if self.rng.gen::<f64>() < self.config.locality_factor && !self.working_set.is_empty() {
            let slot = self.rng.gen_range(0..self.working_set.len());
            return self.working_set[slot];
        }
        let page = self.random_page();
        self.touch_working_set(page);
        page
    }

    fn init_working_set(&mut self) {
        self.working_set.clear();
        let len = self.config.working_set_size.min(self.config.page_range);
        for _ in 0..len {
            let page = self.rng.gen_range(0..self.config.page_range);
            self.working_set.push(page);
        }
    }

    fn touch_working_set(&mut self, page: PageNumber) {
        if self.working_set.len() < self.config.working_set_size {
            self.working_set.push(page);
        } else {
            let slot = self.rng.gen_range(0..self.working_set.len());
            self.working_set[slot] = page;
        }
    }

    fn build_zipf_cdf(&mut self) {
        self.zipf_cdf.clear();
        if self.config.workload_type != WorkloadType::Zipf {
            return;
        }
        let mut mass = 0.0;
        for rank in 1..=self.config.page_range {
            mass += 1.0 / (rank as f64).powf(self.config.zipf_alpha);
            self.zipf_cdf.push(mass);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(workload_type: WorkloadType) -> WorkloadConfig {
        WorkloadConfig {
            workload_type,
            total_requests: 1000,
            page_range: 64,
            stride: 7,
            zipf_alpha: 1.2,
            locality_factor: 0.8,
            working_set_size: 8,
            seed: Some(42),
        }
    }

    #[test]
    fn test_workload_type_parse() -> Result<()> {
        assert_eq!(WorkloadType::Sequential, "sequential".parse()?);
        assert_eq!(WorkloadType::Zipf, "db_like".parse()?);
        assert_eq!(WorkloadType::Zipf, "ZIPF".parse()?);
        assert_eq!(WorkloadType::Webserver, "webserver".parse()?);
        assert!("fractal".parse::<WorkloadType>().is_err());
        Ok(())
    }

    #[test]
    fn test_validation() {
        let mut cfg = config(WorkloadType::Random);
        cfg.page_range = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = config(WorkloadType::Webserver);
        cfg.locality_factor = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = config(WorkloadType::Strided);
        cfg.stride = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_sequential_cycles() -> Result<()> {
        let mut cfg = config(WorkloadType::Sequential);
        cfg.page_range = 5;
        let mut generator = WorkloadGenerator::new(cfg)?;
        let pages: Vec<PageNumber> =
            generator.generate_batch(12).iter().map(|access| access.page).collect();
        assert_eq!(vec![0, 1, 2, 3, 4, 0, 1, 2, 3, 4, 0, 1], pages);
        Ok(())
    }

    #[test]
    fn test_strided_wraps() -> Result<()> {
        let mut cfg = config(WorkloadType::Strided);
        cfg.page_range = 10;
        cfg.stride = 3;
        let mut generator = WorkloadGenerator::new(cfg)?;
        let pages: Vec<PageNumber> =
            generator.generate_batch(5).iter().map(|access| access.page).collect();
        assert_eq!(vec![0, 3, 6, 9, 2], pages);
        Ok(())
    }

    #[test]
    fn test_fixed_seed_is_reproducible() -> Result<()> {
        for workload_type in
            [WorkloadType::Random, WorkloadType::Zipf, WorkloadType::Webserver]
        {
            let mut a = WorkloadGenerator::new(config(workload_type))?;
            let mut b = WorkloadGenerator::new(config(workload_type))?;
            assert_eq!(a.generate_batch(200), b.generate_batch(200));
        }
        Ok(())
    }

    #[test]
    fn test_pages_stay_in_range() -> Result<()> {
        for workload_type in [
            WorkloadType::Sequential,
            WorkloadType::Random,
            WorkloadType::Strided,
            WorkloadType::Zipf,
            WorkloadType::Webserver,
        ] {
            let mut generator = WorkloadGenerator::new(config(workload_type))?;
            for access in generator.generate_batch(1000) {
                assert!(access.page < 64, "{} produced page {}", workload_type, access.page);
            }
        }
        Ok(())
    }

    #[test]
    fn test_zipf_skews_to_low_ranks() -> Result<()> {
        let mut generator = WorkloadGenerator::new(config(WorkloadType::Zipf))?;
        let mut counts = vec![0usize; 64];
        for access in generator.generate_batch(1000) {
            counts[access.page] += 1;
        }
        // rank 0 dominates the tail half of the range
        let tail: usize = counts[32..].iter().sum();
        assert!(counts[0] > tail);
        Ok(())
    }

    #[test]
    fn test_webserver_total_locality_stays_in_working_set() -> Result<()> {
        let mut cfg = config(WorkloadType::Webserver);
        cfg.locality_factor = 1.0;
        let mut generator = WorkloadGenerator::new(cfg)?;
        let working_set = generator.working_set.clone();
        for access in generator.generate_batch(500) {
            assert!(working_set.contains(&access.page));
        }
        Ok(())
    }

    #[test]
    fn test_write_fraction_near_configured_probability() -> Result<()> {
        let mut generator = WorkloadGenerator::new(config(WorkloadType::Random))?;
        let writes = generator.generate_batch(1000).iter().filter(|access| access.write).count();
        assert!((200..400).contains(&writes), "writes: {}", writes);
        Ok(())
    }

    #[test]
    fn test_completion_and_reset() -> Result<()> {
        let mut cfg = config(WorkloadType::Sequential);
        cfg.total_requests = 3;
        let mut generator = WorkloadGenerator::new(cfg)?;
        assert_eq!(3, generator.generate_batch(10).len());
        assert!(generator.is_complete());
        assert_eq!(None, generator.next_access());

        generator.reset();
        assert!(!generator.is_complete());
        assert_eq!(0, generator.position());
        assert_eq!(3, generator.generate_batch(10).len());
        Ok(())
    }
}
