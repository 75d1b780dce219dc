use smallvec::SmallVec;

use crate::event::{Label, MetricEvent};

/// Label name/value pairs taken from an event. Sized for the full
/// recognized set so selection never allocates.
pub type LabelValues<'a> = SmallVec<[(Label, &'a str); 5]>;

/// Pick the allowed labels the event actually carries, in `allowed` order.
/// Absent labels are left out entirely rather than set to an empty string.
pub fn select_labels<'a>(event: &'a MetricEvent, allowed: &[Label]) -> LabelValues<'a> {
    allowed
        .iter()
        .filter_map(|label| event.labels.get(*label).map(|value| (*label, value)))
        .collect()
}

/// Line `selected` up against a primitive's declared label names. Declared
/// labels without a value become empty strings, selected labels that were
/// never declared are dropped.
pub(crate) fn align<'a>(
    declared: &[Label],
    selected: &LabelValues<'a>,
) -> SmallVec<[&'a str; 5]> {
    declared
        .iter()
        .map(|label| {
            selected
                .iter()
                .find(|(name, _)| name == label)
                .map_or("", |(_, value)| *value)
        })
        .collect()
}
