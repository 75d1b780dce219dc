use std::fmt;

use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};

/// The label fields an event may carry. This is a closed set, so a metric
/// can never declare a label that events have no way of filling in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub enum Label {
    Url,
    Method,
    Status,
    Layout,
    Podlet,
}

impl Label {
    /// Every recognized label, in declaration order. This is the allowed set
    /// when no override narrows it.
    pub const ALL: [Label; 5] = [
        Label::Url,
        Label::Method,
        Label::Status,
        Label::Layout,
        Label::Podlet,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Label::Url => "url",
            Label::Method => "method",
            Label::Status => "status",
            Label::Layout => "layout",
            Label::Podlet => "podlet",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Label {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Label::ALL
            .into_iter()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown label {s:?}")))
    }
}

impl TryFrom<String> for Label {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Optional label values attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EventLabels {
    pub url: Option<String>,
    pub method: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub status: Option<String>,
    pub layout: Option<String>,
    pub podlet: Option<String>,
}

impl EventLabels {
    pub fn get(&self, label: Label) -> Option<&str> {
        match label {
            Label::Url => self.url.as_deref(),
            Label::Method => self.method.as_deref(),
            Label::Status => self.status.as_deref(),
            Label::Layout => self.layout.as_deref(),
            Label::Podlet => self.podlet.as_deref(),
        }
    }

    pub fn set(&mut self, label: Label, value: impl Into<String>) {
        let slot = match label {
            Label::Url => &mut self.url,
            Label::Method => &mut self.method,
            Label::Status => &mut self.status,
            Label::Layout => &mut self.layout,
            Label::Podlet => &mut self.podlet,
        };
        *slot = Some(value.into());
    }
}

/// HTTP status codes show up as numbers as often as strings.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
        Float(f64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Str(s) => s,
        Raw::Int(i) => i.to_string(),
        Raw::Float(f) => f.to_string(),
    }))
}

/// The primary numeric payload of an event, discriminated at the transport
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// An elapsed time, observed into histograms and summaries.
    Timed(f64),
    /// A bare number, counted or set.
    Valued(f64),
}

/// A single measurement delivered by the event stream.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MetricEvent {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub time: Option<f64>,
    #[serde(default)]
    pub labels: EventLabels,
}

impl MetricEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// An event carrying an elapsed time.
    pub fn timed(name: impl Into<String>, time: f64) -> Self {
        Self::new(name).with_time(time)
    }

    /// An event carrying a bare value.
    pub fn valued(name: impl Into<String>, value: f64) -> Self {
        Self::new(name).with_value(value)
    }

    pub fn with_time(mut self, time: f64) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_label(mut self, label: Label, value: impl Into<String>) -> Self {
        self.labels.set(label, value);
        self
    }

    /// The primary reading of this event. `time` wins when both are present.
    pub fn reading(&self) -> Option<Reading> {
        match (self.time, self.value) {
            (Some(time), _) => Some(Reading::Timed(time)),
            (None, Some(value)) => Some(Reading::Valued(value)),
            (None, None) => None,
        }
    }
}
