//! The consuming end of a metric event stream. Every event is classified,
//! matched to (or used to create) a primitive in the backend and recorded,
//! one at a time and in arrival order.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::{
    backend::{Backend, MetricDesc, Primitive},
    buckets::BucketSpec,
    classify::{classify, Classification},
    config::ConsumerOptions,
    error::{Error, Result},
    event::MetricEvent,
    labels::{align, select_labels},
    overrides::{validate_name, MetricKind, OverrideConfig, OverrideRegistry},
    registry::Registry,
};

/// How many unread errors the error channel holds before new ones are dropped.
pub const ERROR_CHANNEL_CAPACITY: usize = 256;

pub struct Consumer<B: Backend = Registry> {
    backend: B,
    default_buckets: BucketSpec,
    overrides: Arc<OverrideRegistry>,
    /// Primitives created so far. The kind of a name is fixed the first time
    /// it is seen.
    primitives: HashMap<String, Arc<dyn Primitive>>,
    errors: Option<mpsc::Sender<Error>>,
}

impl Consumer<Registry> {
    /// A consumer backed by a fresh in-process [`Registry`].
    pub fn new(options: ConsumerOptions) -> Result<Self> {
        Self::with_backend(options, Registry::new())
    }
}

impl<B: Backend> Consumer<B> {
    pub fn with_backend(options: ConsumerOptions, backend: B) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            backend,
            default_buckets: options.default_buckets(),
            overrides: Arc::new(OverrideRegistry::new()),
            primitives: HashMap::new(),
            errors: None,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// A handle to the override table, for registering overrides from
    /// somewhere other than the task that owns the consumer.
    pub fn overrides(&self) -> Arc<OverrideRegistry> {
        self.overrides.clone()
    }

    /// Replace the default classification for `name`. Only affects primitives
    /// that have not been created yet, an existing primitive keeps its kind,
    /// labels and buckets.
    pub fn set_override(&self, name: &str, config: OverrideConfig) -> Result<()> {
        self.overrides.register(name, config)
    }

    pub fn load_overrides_json(&self, json: &str) -> Result<usize> {
        self.overrides.load_json(json)
    }

    /// Hand out the receiving end of the error channel. There is only ever
    /// one live receiver: while it exists this returns `None`, once it has
    /// been dropped a fresh channel can be handed out.
    ///
    /// The channel holds [`ERROR_CHANNEL_CAPACITY`] errors. When the receiver
    /// falls behind further errors are logged and dropped, the stream itself
    /// never waits on it.
    pub fn errors(&mut self) -> Option<mpsc::Receiver<Error>> {
        if self.errors.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return None;
        }
        let (tx, rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);
        self.errors = Some(tx);
        Some(rx)
    }

    /// The ingestion entry point. Never fails: a rejected event is logged and
    /// reported on the error channel, and the next event is processed as
    /// normal.
    pub fn write(&mut self, event: MetricEvent) {
        if let Err(err) = self.dispatch(&event) {
            tracing::warn!(message = "rejected metric event", name = %event.name, error = %err);
            self.report(err);
        }
    }

    fn report(&mut self, err: Error) {
        let Some(errors) = &self.errors else {
            return;
        };
        match errors.try_send(err) {
            Ok(()) => {}
            Err(TrySendError::Full(err)) => {
                tracing::warn!(message = "error channel full, dropping error", error = %err);
            }
            Err(TrySendError::Closed(_)) => self.errors = None,
        }
    }

    /// Drain `events` until every sender is gone. Returns the number of events
    /// consumed.
    pub async fn run(&mut self, mut events: mpsc::Receiver<MetricEvent>) -> u64 {
        let mut consumed = 0u64;
        while let Some(event) = events.recv().await {
            self.write(event);
            consumed += 1;
        }
        tracing::debug!(message = "metric event stream closed", consumed = consumed);
        consumed
    }

    /// Classify and record a single event, returning whatever went wrong.
    /// Nothing is recorded for an event that fails.
    pub fn dispatch(&mut self, event: &MetricEvent) -> Result<()> {
        validate_name(&event.name)?;
        let overrides = self.overrides.lookup(&event.name);
        let class = classify(event, overrides.as_ref(), &self.default_buckets)?;
        let amount = Self::amount(event, class.kind)?;

        let primitive = match self.primitives.get(&event.name) {
            Some(existing) if existing.kind() != class.kind => {
                return Err(Error::MetricKindConflict {
                    name: event.name.clone(),
                    existing: existing.kind(),
                    requested: class.kind,
                });
            }
            Some(existing) => existing.clone(),
            None => {
                let created = self.create(event, &class)?;
                self.primitives.insert(event.name.clone(), created.clone());
                created
            }
        };

        let selected = select_labels(event, &class.labels);
        let values = align(primitive.label_names(), &selected);
        tracing::trace!(message = "dispatching metric event", name = %event.name, kind = %class.kind, amount = amount);
        match class.kind {
            MetricKind::Counter => primitive.increment(&values, amount),
            MetricKind::Gauge => primitive.set(&values, amount),
            MetricKind::Histogram | MetricKind::Summary => primitive.observe(&values, amount),
        }
    }

    /// Counters count `value` (or one), gauges take `value` and fall back to
    /// `time`, histograms and summaries take `time` and fall back to `value`.
    fn amount(event: &MetricEvent, kind: MetricKind) -> Result<f64> {
        let amount = match kind {
            MetricKind::Counter => Some(event.value.unwrap_or(1.0)),
            MetricKind::Gauge => event.value.or(event.time),
            MetricKind::Histogram | MetricKind::Summary => event.time.or(event.value),
        };
        let amount = amount.ok_or_else(|| Error::UnclassifiableEvent(event.name.clone()))?;
        let invalid = |reason: String| Error::InvalidObservation {
            name: event.name.clone(),
            reason,
        };
        if !amount.is_finite() {
            return Err(invalid(format!("value {amount} is not finite")));
        }
        if kind == MetricKind::Counter && amount < 0.0 {
            return Err(invalid(format!("counters cannot decrease (got {amount})")));
        }
        Ok(amount)
    }

    fn create(&self, event: &MetricEvent, class: &Classification) -> Result<Arc<dyn Primitive>> {
        let desc = MetricDesc {
            name: event.name.clone(),
            // prometheus refuses an empty help string.
            help: event
                .description
                .clone()
                .filter(|description| !description.is_empty())
                .unwrap_or_else(|| event.name.clone()),
            labels: class.labels.to_vec(),
        };
        tracing::debug!(message = "creating metric", name = %desc.name, kind = %class.kind, labels = ?desc.labels);
        match class.kind {
            MetricKind::Counter => self.backend.create_counter(desc),
            MetricKind::Gauge => self.backend.create_gauge(desc),
            MetricKind::Histogram => {
                let buckets = class.buckets.unwrap_or(self.default_buckets).generate()?;
                self.backend.create_histogram(desc, buckets)
            }
            MetricKind::Summary => self.backend.create_summary(desc),
        }
    }

    /// Render every metric recorded so far for a scrape.
    pub fn metrics(&self) -> Result<String> {
        self.backend.render()
    }

    pub fn content_type(&self) -> &'static str {
        self.backend.content_type()
    }
}
