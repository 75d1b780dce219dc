use smallvec::SmallVec;

use crate::{
    buckets::BucketSpec,
    error::{Error, Result},
    event::{Label, MetricEvent, Reading},
    overrides::{MetricKind, OverrideConfig},
};

/// What the classifier decided for an event.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub kind: MetricKind,
    /// The label names a primitive for this event is allowed to declare.
    pub labels: SmallVec<[Label; 5]>,
    /// Only set for histograms.
    pub buckets: Option<BucketSpec>,
}

/// Decide which primitive an event belongs to.
///
/// An override's type wins outright. Without one the shape of the event
/// decides: a time makes a histogram, a bare value makes a counter.
pub fn classify(
    event: &MetricEvent,
    overrides: Option<&OverrideConfig>,
    default_buckets: &BucketSpec,
) -> Result<Classification> {
    let forced = overrides.and_then(|o| o.kind);
    let kind = match (forced, event.reading()) {
        (Some(kind), _) => kind,
        (None, Some(Reading::Timed(_))) => MetricKind::Histogram,
        (None, Some(Reading::Valued(_))) => MetricKind::Counter,
        (None, None) => return Err(Error::UnclassifiableEvent(event.name.clone())),
    };

    let labels = match overrides.and_then(|o| o.labels.as_deref()) {
        Some(labels) => labels.iter().copied().collect(),
        None => Label::ALL.into_iter().collect(),
    };

    let buckets = match kind {
        MetricKind::Histogram => Some(
            overrides
                .and_then(|o| o.buckets)
                .unwrap_or(*default_buckets),
        ),
        _ => None,
    };

    Ok(Classification {
        kind,
        labels,
        buckets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT: BucketSpec = BucketSpec::new(0.001, 1.15, 45);

    #[test]
    fn time_makes_histogram() {
        let c = classify(&MetricEvent::timed("x", 100.0), None, &DEFAULT).unwrap();
        assert_eq!(c.kind, MetricKind::Histogram);
        assert_eq!(c.buckets, Some(DEFAULT));
        assert_eq!(c.labels.as_slice(), &Label::ALL);
    }

    #[test]
    fn value_makes_counter() {
        let c = classify(&MetricEvent::valued("x", 5.0), None, &DEFAULT).unwrap();
        assert_eq!(c.kind, MetricKind::Counter);
        assert_eq!(c.buckets, None);
    }

    #[test]
    fn time_and_value_is_histogram() {
        let event = MetricEvent::valued("x", 5.0).with_time(2.0);
        let c = classify(&event, None, &DEFAULT).unwrap();
        assert_eq!(c.kind, MetricKind::Histogram);
    }

    #[test]
    fn empty_event_is_unclassifiable() {
        assert_eq!(
            classify(&MetricEvent::new("x"), None, &DEFAULT),
            Err(Error::UnclassifiableEvent("x".to_string()))
        );
    }

    #[test]
    fn override_type_wins() {
        let gauge = OverrideConfig::kind(MetricKind::Gauge);
        for event in [
            MetricEvent::timed("x", 100.0),
            MetricEvent::valued("x", 5.0),
            MetricEvent::new("x"),
        ] {
            let c = classify(&event, Some(&gauge), &DEFAULT).unwrap();
            assert_eq!(c.kind, MetricKind::Gauge);
            assert_eq!(c.buckets, None);
        }
    }

    #[test]
    fn override_labels_and_buckets() {
        let config = OverrideConfig::default()
            .with_labels([Label::Method, Label::Status])
            .with_buckets(BucketSpec::new(1.0, 2.0, 4));
        let c = classify(&MetricEvent::timed("req_duration", 3.0), Some(&config), &DEFAULT).unwrap();
        assert_eq!(c.kind, MetricKind::Histogram);
        assert_eq!(c.labels.as_slice(), &[Label::Method, Label::Status]);
        assert_eq!(c.buckets, Some(BucketSpec::new(1.0, 2.0, 4)));
    }

    #[test]
    fn override_without_type_still_infers() {
        let config = OverrideConfig::default().with_labels([Label::Url]);
        let c = classify(&MetricEvent::valued("x", 1.0), Some(&config), &DEFAULT).unwrap();
        assert_eq!(c.kind, MetricKind::Counter);
        assert_eq!(c.labels.as_slice(), &[Label::Url]);
    }

    #[test]
    fn buckets_ignored_for_summary() {
        let config = OverrideConfig::kind(MetricKind::Summary).with_buckets(BucketSpec::new(1.0, 2.0, 4));
        let c = classify(&MetricEvent::timed("x", 1.0), Some(&config), &DEFAULT).unwrap();
        assert_eq!(c.kind, MetricKind::Summary);
        assert_eq!(c.buckets, None);
    }

    #[test]
    fn identical_reregistration_is_idempotent() {
        let registry = crate::overrides::OverrideRegistry::new();
        let config = OverrideConfig::kind(MetricKind::Summary).with_labels([Label::Podlet]);
        let event = MetricEvent::timed("x", 1.0).with_label(Label::Podlet, "header");

        registry.register("x", config.clone()).unwrap();
        let first = classify(&event, registry.lookup("x").as_ref(), &DEFAULT).unwrap();
        registry.register("x", config).unwrap();
        let second = classify(&event, registry.lookup("x").as_ref(), &DEFAULT).unwrap();
        assert_eq!(first, second);
    }
}
