use ::metrics::Label;

use crate::context::TelemetryLabels;

fn labels(labels: &TelemetryLabels) -> Vec<Label> {
    labels
        .tags()
        .into_iter()
        .map(|(key, value)| Label::new(key, value))
        .collect()
}

pub fn record_counter(name: &'static str, value: u64, labels_in: &TelemetryLabels) {
    ::metrics::counter!(name, labels(labels_in)).increment(value);
}

pub fn record_histogram(name: &'static str, value: f64, labels_in: &TelemetryLabels) {
    ::metrics::histogram!(name, labels(labels_in)).record(value);
}
