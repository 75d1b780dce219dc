//! Turn a stream of metric events into Prometheus-style primitives.
//!
//! Each [`MetricEvent`] carries a name, an optional `value` or `time` and a
//! handful of optional labels. The [`Consumer`] decides which primitive the
//! event belongs to, creates it on first sight and records the event:
//!
//! ```
//! use metrics_consumer::{BucketSpec, Consumer, ConsumerOptions, MetricEvent, OverrideConfig};
//!
//! let mut consumer = Consumer::new(ConsumerOptions::default())?;
//! consumer.set_override(
//!     "req_duration",
//!     OverrideConfig::default().with_buckets(BucketSpec::new(1.0, 2.0, 4)),
//! )?;
//! consumer.write(MetricEvent::timed("req_duration", 3.0)); // histogram
//! consumer.write(MetricEvent::valued("page_hits", 1.0)); // counter
//! let text = consumer.metrics()?;
//! assert!(text.contains(
//!     r#"req_duration_bucket{layout="",method="",podlet="",status="",url="",le="4"} 1"#
//! ));
//! # Ok::<(), metrics_consumer::Error>(())
//! ```

pub mod backend;
pub mod buckets;
pub mod classify;
pub mod config;
pub mod consumer;
pub mod error;
pub mod event;
pub mod labels;
pub mod overrides;
pub mod registry;
pub mod summary;

pub use backend::{Backend, MetricDesc, Primitive};
pub use buckets::{generate_buckets, BucketSpec};
pub use classify::{classify, Classification};
pub use config::ConsumerOptions;
pub use consumer::{Consumer, ERROR_CHANNEL_CAPACITY};
pub use error::{Error, Result};
pub use event::{EventLabels, Label, MetricEvent, Reading};
pub use labels::select_labels;
pub use overrides::{validate_name, MetricKind, OverrideConfig, OverrideRegistry};
pub use registry::{Registry, TEXT_CONTENT_TYPE};
pub use summary::SummaryVec;
