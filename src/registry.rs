//! The built-in [`Backend`]: every primitive is a `prometheus` vector
//! registered in a [`prometheus::Registry`] and rendered by its
//! [`TextEncoder`].

use std::{
    collections::{hash_map::Entry, HashMap},
    sync::Arc,
};

use parking_lot::RwLock;
use prometheus::{
    proto::MetricFamily, CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts,
    TextEncoder,
};

use crate::{
    backend::{Backend, MetricDesc, Primitive},
    error::{Error, Result},
    event::Label,
    overrides::MetricKind,
    summary::SummaryVec,
};

/// Content type of the rendered text exposition format.
pub const TEXT_CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

#[derive(Clone)]
enum Vector {
    Counter(CounterVec),
    Gauge(GaugeVec),
    Histogram(HistogramVec),
    Summary(SummaryVec),
}

impl Vector {
    fn kind(&self) -> MetricKind {
        match self {
            Vector::Counter(_) => MetricKind::Counter,
            Vector::Gauge(_) => MetricKind::Gauge,
            Vector::Histogram(_) => MetricKind::Histogram,
            Vector::Summary(_) => MetricKind::Summary,
        }
    }

    fn collector(&self) -> Box<dyn prometheus::core::Collector> {
        match self.clone() {
            Vector::Counter(vec) => Box::new(vec),
            Vector::Gauge(vec) => Box::new(vec),
            Vector::Histogram(vec) => Box::new(vec),
            Vector::Summary(vec) => Box::new(vec),
        }
    }
}

/// A registered vector together with the label names it was declared with.
struct Registered {
    name: String,
    labels: Vec<Label>,
    vector: Vector,
}

impl Registered {
    fn invalid(&self, reason: impl ToString) -> Error {
        Error::InvalidObservation {
            name: self.name.clone(),
            reason: reason.to_string(),
        }
    }

    fn unsupported(&self, op: &str) -> Error {
        self.invalid(format!("a {} does not support {op}", self.vector.kind()))
    }

    fn check_finite(&self, value: f64) -> Result<()> {
        if value.is_finite() {
            Ok(())
        } else {
            Err(self.invalid(format!("value {value} is not finite")))
        }
    }
}

impl Primitive for Registered {
    fn kind(&self) -> MetricKind {
        self.vector.kind()
    }

    fn label_names(&self) -> &[Label] {
        &self.labels
    }

    fn observe(&self, labels: &[&str], value: f64) -> Result<()> {
        self.check_finite(value)?;
        match &self.vector {
            Vector::Histogram(vec) => {
                vec.get_metric_with_label_values(labels)
                    .map_err(|e| self.invalid(e))?
                    .observe(value);
                Ok(())
            }
            Vector::Summary(vec) => vec.observe(labels, value).map_err(|e| self.invalid(e)),
            _ => Err(self.unsupported("observe")),
        }
    }

    fn increment(&self, labels: &[&str], by: f64) -> Result<()> {
        let Vector::Counter(vec) = &self.vector else {
            return Err(self.unsupported("increment"));
        };
        self.check_finite(by)?;
        // The prometheus counter asserts on this instead of returning an error.
        if by < 0.0 {
            return Err(self.invalid(format!("counters cannot decrease (got {by})")));
        }
        vec.get_metric_with_label_values(labels)
            .map_err(|e| self.invalid(e))?
            .inc_by(by);
        Ok(())
    }

    fn set(&self, labels: &[&str], value: f64) -> Result<()> {
        let Vector::Gauge(vec) = &self.vector else {
            return Err(self.unsupported("set"));
        };
        self.check_finite(value)?;
        vec.get_metric_with_label_values(labels)
            .map_err(|e| self.invalid(e))?
            .set(value);
        Ok(())
    }
}

/// Holds one primitive per metric name for the lifetime of the registry.
///
/// The underlying [`prometheus::Registry`] can be shared with the rest of an
/// application through [`Registry::with_registry`], in which case a scrape of
/// either one includes the consumer's metrics.
#[derive(Default)]
pub struct Registry {
    inner: prometheus::Registry,
    metrics: RwLock<HashMap<String, Arc<Registered>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(inner: prometheus::Registry) -> Self {
        Self {
            inner,
            metrics: RwLock::default(),
        }
    }

    pub fn prometheus(&self) -> &prometheus::Registry {
        &self.inner
    }

    /// Snapshot every registered family, sorted by name.
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.inner.gather()
    }

    pub fn len(&self) -> usize {
        self.metrics.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.read().is_empty()
    }

    /// Creating a name that already exists hands back the existing primitive
    /// as long as the kind matches. The existing primitive keeps its original
    /// labels and buckets.
    fn register(
        &self,
        kind: MetricKind,
        desc: MetricDesc,
        build: impl FnOnce(&MetricDesc, &[&str]) -> prometheus::Result<Vector>,
    ) -> Result<Arc<dyn Primitive>> {
        let mut metrics = self.metrics.write();
        match metrics.entry(desc.name.clone()) {
            Entry::Occupied(existing) => {
                let existing = existing.get();
                if existing.kind() != kind {
                    return Err(Error::MetricKindConflict {
                        name: desc.name,
                        existing: existing.kind(),
                        requested: kind,
                    });
                }
                Ok(existing.clone())
            }
            Entry::Vacant(vacant) => {
                tracing::debug!(message = "registering metric", name = %desc.name, kind = %kind, labels = ?desc.labels);
                let label_names: Vec<&str> = desc.labels.iter().map(Label::as_str).collect();
                let vector = build(&desc, &label_names)?;
                self.inner.register(vector.collector())?;
                let registered = Arc::new(Registered {
                    name: desc.name,
                    labels: desc.labels,
                    vector,
                });
                vacant.insert(registered.clone());
                Ok(registered)
            }
        }
    }
}

impl Backend for Registry {
    fn create_counter(&self, desc: MetricDesc) -> Result<Arc<dyn Primitive>> {
        self.register(MetricKind::Counter, desc, |desc, labels| {
            CounterVec::new(Opts::new(&desc.name, &desc.help), labels).map(Vector::Counter)
        })
    }

    fn create_gauge(&self, desc: MetricDesc) -> Result<Arc<dyn Primitive>> {
        self.register(MetricKind::Gauge, desc, |desc, labels| {
            GaugeVec::new(Opts::new(&desc.name, &desc.help), labels).map(Vector::Gauge)
        })
    }

    fn create_histogram(&self, desc: MetricDesc, buckets: Vec<f64>) -> Result<Arc<dyn Primitive>> {
        // An empty list would silently fall back to the library defaults.
        if buckets.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "histogram {:?} needs at least one bucket",
                desc.name
            )));
        }
        self.register(MetricKind::Histogram, desc, |desc, labels| {
            let opts = HistogramOpts::new(&desc.name, &desc.help).buckets(buckets);
            HistogramVec::new(opts, labels).map(Vector::Histogram)
        })
    }

    fn create_summary(&self, desc: MetricDesc) -> Result<Arc<dyn Primitive>> {
        self.register(MetricKind::Summary, desc, |desc, labels| {
            SummaryVec::new(&desc.name, &desc.help, labels).map(Vector::Summary)
        })
    }

    fn get(&self, name: &str) -> Option<Arc<dyn Primitive>> {
        self.metrics
            .read()
            .get(name)
            .map(|metric| metric.clone() as Arc<dyn Primitive>)
    }

    fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.inner.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| Error::Backend(e.to_string()))
    }

    fn content_type(&self) -> &'static str {
        TEXT_CONTENT_TYPE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(name: &str, labels: Vec<Label>) -> MetricDesc {
        MetricDesc {
            name: name.to_string(),
            help: format!("{name} help"),
            labels,
        }
    }

    #[test]
    fn create_and_get() {
        let registry = Registry::new();
        assert!(registry.get("hits").is_none());
        let counter = registry.create_counter(desc("hits", vec![Label::Url])).unwrap();
        counter.increment(&["/a"], 2.0).unwrap();
        let again = registry.get("hits").unwrap();
        assert_eq!(again.kind(), MetricKind::Counter);
        assert_eq!(again.label_names(), &[Label::Url]);
        assert_eq!(registry.len(), 1);

        let families = registry.gather();
        assert_eq!(families.len(), 1);
        let metric = &families[0].get_metric()[0];
        assert_eq!(metric.get_label()[0].get_value(), "/a");
        assert_eq!(metric.get_counter().get_value(), 2.0);
    }

    #[test]
    fn same_kind_returns_existing() {
        let registry = Registry::new();
        let first = registry.create_gauge(desc("sessions", vec![])).unwrap();
        first.set(&[], 3.0).unwrap();
        let second = registry
            .create_gauge(desc("sessions", vec![Label::Podlet]))
            .unwrap();
        assert_eq!(second.label_names(), &[] as &[Label]);
        assert_eq!(registry.len(), 1);
        assert!(registry.render().unwrap().contains("sessions 3\n"));
    }

    #[test]
    fn other_kind_conflicts() {
        let registry = Registry::new();
        registry.create_counter(desc("x", vec![])).unwrap();
        let err = registry
            .create_histogram(desc("x", vec![]), vec![1.0])
            .err()
            .unwrap();
        assert_eq!(
            err,
            Error::MetricKindConflict {
                name: "x".to_string(),
                existing: MetricKind::Counter,
                requested: MetricKind::Histogram,
            }
        );
    }

    #[test]
    fn invalid_histogram_is_not_registered() {
        let registry = Registry::new();
        assert!(registry.create_histogram(desc("x", vec![]), vec![]).is_err());
        // prometheus rejects boundaries that do not increase.
        assert!(matches!(
            registry.create_histogram(desc("y", vec![]), vec![2.0, 1.0]),
            Err(Error::Backend(_))
        ));
        assert!(registry.is_empty());
        assert!(registry.gather().is_empty());
    }

    #[test]
    fn histogram_buckets_are_kept() {
        let registry = Registry::new();
        let histogram = registry
            .create_histogram(desc("latency", vec![Label::Method]), vec![1.0, 2.0, 4.0])
            .unwrap();
        histogram.observe(&["GET"], 3.0).unwrap();

        let families = registry.gather();
        let sample = families[0].get_metric()[0].get_histogram();
        assert_eq!(sample.get_sample_count(), 1);
        assert_eq!(sample.get_sample_sum(), 3.0);
        let buckets: Vec<(f64, u64)> = sample
            .get_bucket()
            .iter()
            .map(|b| (b.get_upper_bound(), b.get_cumulative_count()))
            .collect();
        assert_eq!(buckets, vec![(1.0, 0), (2.0, 0), (4.0, 1)]);
    }

    #[test]
    fn each_primitive_only_supports_its_own_operation() {
        let registry = Registry::new();
        let counter = registry.create_counter(desc("c", vec![])).unwrap();
        let gauge = registry.create_gauge(desc("g", vec![])).unwrap();
        let summary = registry.create_summary(desc("s", vec![])).unwrap();
        assert!(counter.set(&[], 1.0).is_err());
        assert!(counter.observe(&[], 1.0).is_err());
        assert!(gauge.increment(&[], 1.0).is_err());
        assert!(summary.set(&[], 1.0).is_err());
        assert!(summary.observe(&[], 1.0).is_ok());
    }

    #[test]
    fn bad_observations_are_errors_not_panics() {
        let registry = Registry::new();
        let counter = registry.create_counter(desc("c", vec![Label::Url])).unwrap();
        for (labels, by) in [(vec!["/a"], -1.0), (vec!["/a"], f64::NAN), (vec![], 1.0)] {
            assert!(matches!(
                counter.increment(&labels, by),
                Err(Error::InvalidObservation { .. })
            ));
        }
        assert!(registry.gather().is_empty());
    }

    #[test]
    fn lookups_do_not_create_children() {
        let registry = Registry::new();
        registry.create_counter(desc("hits", vec![Label::Url])).unwrap();
        registry.create_summary(desc("render", vec![Label::Url])).unwrap();
        assert!(registry.get("hits").is_some());
        assert!(registry.get("render").is_some());
        assert!(registry.gather().is_empty());
        assert_eq!(registry.render().unwrap(), "");
    }

    #[test]
    fn name_taken_in_shared_registry() {
        let shared = prometheus::Registry::new();
        let taken = prometheus::IntCounter::new("requests", "owned by the application").unwrap();
        shared.register(Box::new(taken)).unwrap();

        let registry = Registry::with_registry(shared);
        assert!(matches!(
            registry.create_counter(desc("requests", vec![])),
            Err(Error::Backend(_))
        ));
        assert!(registry.get("requests").is_none());
    }

    #[test]
    fn render_sorted_by_name() {
        let registry = Registry::new();
        registry
            .create_gauge(desc("zeta", vec![]))
            .unwrap()
            .set(&[], 1.0)
            .unwrap();
        registry
            .create_counter(desc("alpha", vec![]))
            .unwrap()
            .increment(&[], 1.0)
            .unwrap();
        assert_eq!(
            registry.render().unwrap(),
            "# HELP alpha alpha help\n# TYPE alpha counter\nalpha 1\n\
             # HELP zeta zeta help\n# TYPE zeta gauge\nzeta 1\n"
        );
        assert_eq!(registry.content_type(), TextEncoder::new().format_type());
    }

    #[test]
    fn empty_label_values_are_rendered() {
        let registry = Registry::new();
        registry
            .create_counter(desc("hits", vec![Label::Url, Label::Method]))
            .unwrap()
            .increment(&["", "GET"], 1.0)
            .unwrap();
        assert!(registry
            .render()
            .unwrap()
            .contains("hits{method=\"GET\",url=\"\"} 1\n"));
    }
}
