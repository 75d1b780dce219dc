use serde::Deserialize;

use crate::{buckets::BucketSpec, error::Result};

/// Constructor-level settings for a [`crate::Consumer`].
///
/// The bucket defaults span roughly 1ms up to half a second (when times are
/// in seconds) in 15% steps, which covers in-process calls and slower network
/// calls in one histogram.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConsumerOptions {
    pub bucket_step_start: f64,
    pub bucket_step_factor: f64,
    pub bucket_step_count: usize,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            bucket_step_start: 0.001,
            bucket_step_factor: 1.15,
            bucket_step_count: 45,
        }
    }
}

impl ConsumerOptions {
    pub fn default_buckets(&self) -> BucketSpec {
        BucketSpec::new(
            self.bucket_step_start,
            self.bucket_step_factor,
            self.bucket_step_count,
        )
    }

    pub fn validate(&self) -> Result<()> {
        self.default_buckets().validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn defaults() {
        let options = ConsumerOptions::default();
        assert_eq!(options.default_buckets(), BucketSpec::new(0.001, 1.15, 45));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let options: ConsumerOptions = serde_json::from_str(r#"{"bucketStepCount": 10}"#).unwrap();
        assert_eq!(options.bucket_step_count, 10);
        assert_eq!(options.bucket_step_start, 0.001);
    }

    #[test]
    fn invalid_factor() {
        let options = ConsumerOptions {
            bucket_step_factor: 0.9,
            ..Default::default()
        };
        assert!(matches!(options.validate(), Err(Error::InvalidConfig(_))));
    }
}
