//! The seam between the consumer and whatever actually stores and renders
//! metrics. [`crate::Registry`] is the implementation over the `prometheus`
//! crate, anything else (another client library, a test double) can slot in
//! by implementing [`Backend`].

use std::sync::Arc;

use crate::{error::Result, event::Label, overrides::MetricKind};

/// Everything a backend needs to know to create a primitive. Label names are
/// fixed here for the lifetime of the primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDesc {
    pub name: String,
    pub help: String,
    pub labels: Vec<Label>,
}

/// A backend-created metric. Label values are passed in the order of the
/// label names declared at creation.
///
/// Each kind only supports its own operation, calling the wrong one is an
/// error rather than a panic.
pub trait Primitive: Send + Sync {
    fn kind(&self) -> MetricKind;

    fn label_names(&self) -> &[Label];

    /// Record a sample into a histogram or summary.
    fn observe(&self, labels: &[&str], value: f64) -> Result<()>;

    /// Add to a counter.
    fn increment(&self, labels: &[&str], by: f64) -> Result<()>;

    /// Replace a gauge's value.
    fn set(&self, labels: &[&str], value: f64) -> Result<()>;
}

pub trait Backend: Send + Sync {
    fn create_counter(&self, desc: MetricDesc) -> Result<Arc<dyn Primitive>>;

    fn create_gauge(&self, desc: MetricDesc) -> Result<Arc<dyn Primitive>>;

    fn create_histogram(&self, desc: MetricDesc, buckets: Vec<f64>) -> Result<Arc<dyn Primitive>>;

    fn create_summary(&self, desc: MetricDesc) -> Result<Arc<dyn Primitive>>;

    fn get(&self, name: &str) -> Option<Arc<dyn Primitive>>;

    /// Render every registered primitive as scrape-ready text.
    fn render(&self) -> Result<String>;

    fn content_type(&self) -> &'static str;
}

impl<B: Backend + ?Sized> Backend for Arc<B> {
    fn create_counter(&self, desc: MetricDesc) -> Result<Arc<dyn Primitive>> {
        (**self).create_counter(desc)
    }

    fn create_gauge(&self, desc: MetricDesc) -> Result<Arc<dyn Primitive>> {
        (**self).create_gauge(desc)
    }

    fn create_histogram(&self, desc: MetricDesc, buckets: Vec<f64>) -> Result<Arc<dyn Primitive>> {
        (**self).create_histogram(desc, buckets)
    }

    fn create_summary(&self, desc: MetricDesc) -> Result<Arc<dyn Primitive>> {
        (**self).create_summary(desc)
    }

    fn get(&self, name: &str) -> Option<Arc<dyn Primitive>> {
        (**self).get(name)
    }

    fn render(&self) -> Result<String> {
        (**self).render()
    }

    fn content_type(&self) -> &'static str {
        (**self).content_type()
    }
}
