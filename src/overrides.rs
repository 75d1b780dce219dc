use std::{collections::HashMap, fmt, str::FromStr};

use dashmap::DashMap;
use serde::Deserialize;

use crate::{
    buckets::BucketSpec,
    error::{Error, Result},
    event::Label,
};

/// The four metric primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Summary,
}

impl MetricKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
            MetricKind::Summary => "summary",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "counter" => Ok(MetricKind::Counter),
            "gauge" => Ok(MetricKind::Gauge),
            "histogram" => Ok(MetricKind::Histogram),
            "summary" => Ok(MetricKind::Summary),
            other => Err(Error::InvalidMetricType(other.to_string())),
        }
    }
}

/// Metric names are restricted to `[a-zA-Z_][a-zA-Z0-9_]*`.
pub fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidMetricName(name.to_string()))
    }
}

/// Per-metric settings that replace the defaults picked by the classifier.
/// Every field is optional, anything left unset falls back to the default
/// behaviour.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideConfig {
    pub kind: Option<MetricKind>,
    pub labels: Option<Vec<Label>>,
    pub buckets: Option<BucketSpec>,
}

/// The JSON shape of an override. `type` stays a plain string until after
/// parsing so an unknown type maps to its own error.
#[derive(Debug, Deserialize)]
struct RawOverride {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    labels: Option<Vec<Label>>,
    #[serde(default)]
    buckets: Option<BucketSpec>,
}

impl TryFrom<RawOverride> for OverrideConfig {
    type Error = Error;

    fn try_from(raw: RawOverride) -> Result<Self> {
        Ok(Self {
            kind: raw.kind.as_deref().map(MetricKind::from_str).transpose()?,
            labels: raw.labels,
            buckets: raw.buckets,
        })
    }
}

impl OverrideConfig {
    pub fn kind(kind: MetricKind) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }

    pub fn with_labels(mut self, labels: impl IntoIterator<Item = Label>) -> Self {
        self.labels = Some(labels.into_iter().collect());
        self
    }

    pub fn with_buckets(mut self, buckets: BucketSpec) -> Self {
        self.buckets = Some(buckets);
        self
    }

    /// Validate the bucket parameters and collapse duplicate labels, keeping
    /// the first occurrence of each.
    fn normalize(mut self) -> Result<Self> {
        if let Some(buckets) = &self.buckets {
            buckets.validate()?;
        }
        if let Some(labels) = &mut self.labels {
            let mut seen = Vec::with_capacity(labels.len());
            labels.retain(|label| {
                if seen.contains(label) {
                    false
                } else {
                    seen.push(*label);
                    true
                }
            });
        }
        Ok(self)
    }
}

/// Overrides keyed by metric name. Safe to register into from any thread
/// while a consumer is reading from it.
#[derive(Debug, Default)]
pub struct OverrideRegistry {
    entries: DashMap<String, OverrideConfig>,
}

impl OverrideRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `config` for `name`, replacing any earlier entry.
    pub fn register(&self, name: &str, config: OverrideConfig) -> Result<()> {
        validate_name(name)?;
        let config = config.normalize()?;
        tracing::info!(message = "registered metric override", name = name, kind = ?config.kind, labels = ?config.labels, buckets = ?config.buckets);
        self.entries.insert(name.to_string(), config);
        Ok(())
    }

    /// Register every override in a JSON object of `name -> override`. Either
    /// all entries are stored or none are.
    pub fn load_json(&self, json: &str) -> Result<usize> {
        let raw: HashMap<String, RawOverride> = serde_json::from_str(json)
            .map_err(|e| Error::InvalidConfig(format!("malformed overrides: {e}")))?;
        let mut validated = Vec::with_capacity(raw.len());
        for (name, raw) in raw {
            validate_name(&name)?;
            validated.push((name, OverrideConfig::try_from(raw)?.normalize()?));
        }
        let count = validated.len();
        for (name, config) in validated {
            tracing::info!(message = "registered metric override", name = %name, kind = ?config.kind);
            self.entries.insert(name, config);
        }
        Ok(count)
    }

    pub fn lookup(&self, name: &str) -> Option<OverrideConfig> {
        self.entries.get(name).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
