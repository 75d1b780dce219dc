//! Geometric bucket boundaries for timing histograms. Each boundary is the
//! previous one multiplied by a constant factor, so resolution stays
//! proportionally even from sub-millisecond calls up to multi-minute ones.

use serde::Deserialize;

use crate::error::{Error, Result};

/// Upper limit on the number of boundaries in one histogram. Every bucket is
/// rendered for every label combination, so anything beyond this is a
/// configuration mistake.
pub const MAX_BUCKET_COUNT: usize = 1024;

/// The three parameters of a geometric bucket sequence.
///
/// Accepts both the short field names and the `bucketStep*` names used by
/// the consumer options when deserialized.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BucketSpec {
    #[serde(alias = "bucketStepStart")]
    pub start: f64,
    #[serde(alias = "bucketStepFactor")]
    pub factor: f64,
    #[serde(alias = "bucketStepCount")]
    pub count: usize,
}

impl BucketSpec {
    pub const fn new(start: f64, factor: f64, count: usize) -> Self {
        Self {
            start,
            factor,
            count,
        }
    }

    /// Check the parameters, including that the last boundary stays finite,
    /// without generating anything.
    pub fn validate(&self) -> Result<()> {
        // Written as negations so NaN is rejected as well.
        if !(self.start > 0.0) || !self.start.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "bucket start must be a finite number > 0, got {}",
                self.start
            )));
        }
        if !(self.factor > 1.0) || !self.factor.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "bucket factor must be a finite number > 1, got {}",
                self.factor
            )));
        }
        if self.count < 1 {
            return Err(Error::InvalidConfig(
                "bucket count must be at least 1".to_string(),
            ));
        }
        if self.count > MAX_BUCKET_COUNT {
            return Err(Error::InvalidConfig(format!(
                "bucket count must be at most {MAX_BUCKET_COUNT}, got {}",
                self.count
            )));
        }
        // count is bounded above, so the exponent fits an i32.
        let last = self.start * self.factor.powi(self.count as i32 - 1);
        if !last.is_finite() {
            return Err(overflow(self.start, self.factor, self.count));
        }
        Ok(())
    }

    pub fn generate(&self) -> Result<Vec<f64>> {
        generate_buckets(self.start, self.factor, self.count)
    }
}

/// Produce `count` strictly increasing boundaries where `b[0] = start` and
/// `b[i] = b[i-1] * factor`.
pub fn generate_buckets(start: f64, factor: f64, count: usize) -> Result<Vec<f64>> {
    BucketSpec::new(start, factor, count).validate()?;
    let buckets: Vec<f64> = std::iter::successors(Some(start), |bound| Some(bound * factor))
        .take(count)
        .collect();
    // Repeated multiplication can drift from powi by an ulp at the very edge.
    if buckets.last().is_some_and(|last| !last.is_finite()) {
        return Err(overflow(start, factor, count));
    }
    Ok(buckets)
}

fn overflow(start: f64, factor: f64, count: usize) -> Error {
    Error::InvalidConfig(format!(
        "bucket sequence ({start} * {factor}^{}) overflows",
        count - 1
    ))
}
