use super::page_table::PageNumber;
use crate::error::Result;

/// Candidate pages to prefetch plus the predictor's confidence in them.
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub pages: Vec<PageNumber>,
    /// In [0, 1].
    pub confidence: f64,
}

impl Prediction {
    pub fn empty() -> Prediction {
        Prediction { pages: Vec::new(), confidence: 0.0 }
    }
}

/// Proposes pages to prefetch from the recent-access window (oldest
/// first). Called synchronously while an access is serviced, so
/// implementations must not block; a returned error is treated as "no
/// predictions this access".
pub trait Predictor: Send {
    fn predict(&mut self, window: &[PageNumber]) -> Result<Prediction>;
}

/// Built-in rule-based predictor. Classifies the last three accesses as
/// a unit stride, a general stride or a locality cluster and proposes
/// the continuation, padded with one extra sequential guess.
pub struct RulePredictor {
    total_pages: usize,
}

impl RulePredictor {
    pub fn new(total_pages: usize) -> RulePredictor {
        RulePredictor { total_pages }
    }
}

impl Predictor for RulePredictor {
    fn predict(&mut self, window: &[PageNumber]) -> Result<Prediction> {
        let n = window.len();
        if n < 3 {
            return Ok(Prediction::empty());
        }
        let total = self.total_pages as i64;
        let p1 = window[n - 3] as i64;
        let p2 = window[n - 2] as i64;
        let p3 = window[n - 1] as i64;

        let mut pages: Vec<i64> = Vec::with_capacity(3);
        let confidence;
        if p3 == p2 + 1 && p2 == p1 + 1 {
            pages.push(p3 + 1);
            pages.push(p3 + 2);
            confidence = 0.85;
        } else if p3 - p2 == p2 - p1 && p3 != p2 {
            let stride = p3 - p2;
            pages.push(p3 + stride);
            pages.push(p3 + 2 * stride);
            confidence = 0.70;
        } else {
            let base = (p3 / 10) * 10;
            pages.push(base + (p3 % 10 + 1) % 10);
            pages.push(base + (p3 % 10 + 2) % 10);
            confidence = 0.60;
        }
        if pages.len() < 3 {
            pages.push(p3 + 3);
        }

        let pages = pages.into_iter().map(|page| page.rem_euclid(total) as PageNumber).collect();
        Ok(Prediction { pages, confidence })
    }
}
