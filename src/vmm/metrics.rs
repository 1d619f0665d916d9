use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Monotonic simulation counters. Updated under the VMM lock but read
/// lock-free, so a snapshot taken during an access is coherent per
/// counter, not necessarily across counters.
#[derive(Debug, Default)]
pub struct Metrics {
    total_accesses: AtomicU64,
    page_faults: AtomicU64,
    swap_ins: AtomicU64,
    swap_outs: AtomicU64,
    ai_predictions: AtomicU64,
    ai_hits: AtomicU64,
    /// f64 bits of the confidence reported with the latest non-empty
    /// prediction.
    ai_confidence_bits: AtomicU64,
}

impl Metrics {
    pub fn new() -> Metrics {
        Metrics::default()
    }

    /// Count one access and return its logical tick. The tick is the
    /// post-increment counter value, derived at the single point where
    /// the access is counted.
    pub fn record_access(&self) -> u64 {
        self.total_accesses.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_fault(&self) {
        self.page_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_swap_in(&self) {
        self.swap_ins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_swap_out(&self) {
        self.swap_outs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_prediction(&self) {
        self.ai_predictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ai_hit(&self) {
        self.ai_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_ai_confidence(&self, confidence: f64) {
        self.ai_confidence_bits.store(confidence.to_bits(), Ordering::Relaxed);
    }

    pub fn total_accesses(&self) -> u64 {
        self.total_accesses.load(Ordering::Relaxed)
    }

    pub fn page_faults(&self) -> u64 {
        self.page_faults.load(Ordering::Relaxed)
    }

    pub fn swap_ins(&self) -> u64 {
        self.swap_ins.load(Ordering::Relaxed)
    }

    pub fn swap_outs(&self) -> u64 {
        self.swap_outs.load(Ordering::Relaxed)
    }

    pub fn ai_predictions(&self) -> u64 {
        self.ai_predictions.load(Ordering::Relaxed)
    }

    pub fn ai_hits(&self) -> u64 {
        self.ai_hits.load(Ordering::Relaxed)
    }

    pub fn ai_confidence(&self) -> f64 {
        f64::from_bits(self.ai_confidence_bits.load(Ordering::Relaxed))
    }

    pub fn page_fault_rate(&self) -> f64 {
        let accesses = self.total_accesses();
        if accesses == 0 {
            return 0.0;
        }
        self.page_faults() as f64 / accesses as f64
    }

    pub fn ai_hit_rate(&self) -> f64 {
        let predictions = self.ai_predictions();
        if predictions == 0 {
            return 0.0;
        }
        self.ai_hits() as f64 / predictions as f64
    }

    /// Zero every counter. Configuration changes never call this;
    /// resetting is its own operation.
    pub fn reset(&self) {
        self.total_accesses.store(0, Ordering::Relaxed);
        self.page_faults.store(0, Ordering::Relaxed);
        self.swap_ins.store(0, Ordering::Relaxed);
        self.swap_outs.store(0, Ordering::Relaxed);
        self.ai_predictions.store(0, Ordering::Relaxed);
        self.ai_hits.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_accesses: self.total_accesses(),
            page_faults: self.page_faults(),
            page_fault_rate: self.page_fault_rate(),
            swap_ins: self.swap_ins(),
            swap_outs: self.swap_outs(),
            ai_predictions: self.ai_predictions(),
            ai_hits: self.ai_hits(),
            ai_hit_rate: self.ai_hit_rate(),
            ai_prediction_confidence: self.ai_confidence(),
        }
    }
}

/// Point-in-time view of the counters with the derived rates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_accesses: u64,
    pub page_faults: u64,
    pub page_fault_rate: f64,
    pub swap_ins: u64,
    pub swap_outs: u64,
    pub ai_predictions: u64,
    pub ai_hits: u64,
    pub ai_hit_rate: f64,
    pub ai_prediction_confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_are_post_increment() {
        let metrics = Metrics::new();
        assert_eq!(1, metrics.record_access());
        assert_eq!(2, metrics.record_access());
        assert_eq!(2, metrics.total_accesses());
    }

    #[test]
    fn test_rates_zero_denominator() {
        let metrics = Metrics::new();
        assert_eq!(0.0, metrics.page_fault_rate());
        assert_eq!(0.0, metrics.ai_hit_rate());
    }

    #[test]
    fn test_snapshot_and_reset() {
        let metrics = Metrics::new();
        metrics.record_access();
        metrics.record_access();
        metrics.record_fault();
        metrics.record_swap_in();
        metrics.record_prediction();
        metrics.record_ai_hit();
        metrics.set_ai_confidence(0.85);

        let snapshot = metrics.snapshot();
        assert_eq!(2, snapshot.total_accesses);
        assert_eq!(1, snapshot.page_faults);
        assert_eq!(0.5, snapshot.page_fault_rate);
        assert_eq!(1.0, snapshot.ai_hit_rate);
        assert_eq!(0.85, snapshot.ai_prediction_confidence);

        metrics.reset();
        assert_eq!(0, metrics.total_accesses());
        assert_eq!(0, metrics.page_faults());
        assert_eq!(0.0, metrics.page_fault_rate());
    }
}
