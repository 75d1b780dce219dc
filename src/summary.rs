//! A labelled summary for the `prometheus` crate, which only ships
//! histograms. Quantiles are computed over a sliding window of the most
//! recent observations while sum and count cover everything ever observed.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use parking_lot::{Mutex, RwLock};
use prometheus::{
    core::{Collector, Desc},
    proto::{LabelPair, Metric, MetricFamily, MetricType, Quantile, Summary},
};

pub const DEFAULT_QUANTILES: [f64; 7] = [0.01, 0.05, 0.5, 0.9, 0.95, 0.99, 0.999];
pub const DEFAULT_WINDOW: usize = 1024;

#[derive(Debug)]
struct Window {
    samples: VecDeque<f64>,
    sum: f64,
    count: u64,
}

impl Window {
    fn new() -> Self {
        Self {
            samples: VecDeque::new(),
            sum: 0.0,
            count: 0,
        }
    }

    fn record(&mut self, capacity: usize, value: f64) {
        if self.samples.len() == capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
        self.sum += value;
        self.count += 1;
    }

    /// Nearest-rank quantiles over the current window. NaN when empty.
    fn quantiles(&self, quantiles: &[f64]) -> Vec<f64> {
        if self.samples.is_empty() {
            return vec![f64::NAN; quantiles.len()];
        }
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();
        quantiles
            .iter()
            .map(|q| {
                let rank = (q * n as f64).ceil() as usize;
                sorted[rank.clamp(1, n) - 1]
            })
            .collect()
    }

    fn to_proto(&self) -> Summary {
        let mut summary = Summary::default();
        summary.set_sample_count(self.count);
        summary.set_sample_sum(self.sum);
        for (q, value) in DEFAULT_QUANTILES.iter().zip(self.quantiles(&DEFAULT_QUANTILES)) {
            let mut quantile = Quantile::default();
            quantile.set_quantile(*q);
            quantile.set_value(value);
            summary.mut_quantile().push(quantile);
        }
        summary
    }
}

struct SummaryCore {
    desc: Desc,
    label_names: Vec<String>,
    window: usize,
    children: RwLock<HashMap<Vec<String>, Mutex<Window>>>,
}

/// Summary children keyed by label values, collected into a single
/// `MetricType::SUMMARY` family. Cloning shares the children, the same way
/// the `prometheus` vectors do.
#[derive(Clone)]
pub struct SummaryVec {
    core: Arc<SummaryCore>,
}

impl SummaryVec {
    pub fn new(name: &str, help: &str, label_names: &[&str]) -> prometheus::Result<Self> {
        Self::with_window(name, help, label_names, DEFAULT_WINDOW)
    }

    pub fn with_window(
        name: &str,
        help: &str,
        label_names: &[&str],
        window: usize,
    ) -> prometheus::Result<Self> {
        let label_names: Vec<String> = label_names.iter().map(|l| l.to_string()).collect();
        let desc = Desc::new(
            name.to_string(),
            help.to_string(),
            label_names.clone(),
            HashMap::new(),
        )?;
        Ok(Self {
            core: Arc::new(SummaryCore {
                desc,
                label_names,
                window: window.max(1),
                children: RwLock::new(HashMap::new()),
            }),
        })
    }

    /// Record `value` for the child with these label values, creating the
    /// child on first use.
    pub fn observe(&self, label_values: &[&str], value: f64) -> prometheus::Result<()> {
        let core = &self.core;
        if label_values.len() != core.label_names.len() {
            return Err(prometheus::Error::Msg(format!(
                "{} label values for {} label names",
                label_values.len(),
                core.label_names.len()
            )));
        }
        let key: Vec<String> = label_values.iter().map(|v| v.to_string()).collect();
        if let Some(child) = core.children.read().get(&key) {
            child.lock().record(core.window, value);
            return Ok(());
        }
        core.children
            .write()
            .entry(key)
            .or_insert_with(|| Mutex::new(Window::new()))
            .lock()
            .record(core.window, value);
        Ok(())
    }
}

impl Collector for SummaryVec {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.core.desc]
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let core = &self.core;
        let mut family = MetricFamily::default();
        family.set_name(core.desc.fq_name.clone());
        family.set_help(core.desc.help.clone());
        family.set_field_type(MetricType::SUMMARY);

        let children = core.children.read();
        let mut sorted: Vec<_> = children.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        for (values, window) in sorted {
            let mut pairs: Vec<LabelPair> = core
                .label_names
                .iter()
                .zip(values)
                .map(|(name, value)| {
                    let mut pair = LabelPair::default();
                    pair.set_name(name.clone());
                    pair.set_value(value.clone());
                    pair
                })
                .collect();
            pairs.sort_by(|a, b| a.get_name().cmp(b.get_name()));

            let mut metric = Metric::default();
            for pair in pairs {
                metric.mut_label().push(pair);
            }
            metric.set_summary(window.lock().to_proto());
            family.mut_metric().push(metric);
        }
        vec![family]
    }
}
