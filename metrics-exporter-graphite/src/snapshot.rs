use indexmap::{IndexMap, IndexSet};

/// A single statistic computed for a timer.
///
/// Most statistics (`mean`, `upper`, `count`, and so on) are plain numbers, but some are reported as a breakdown, such
/// as a histogram of bins, where each sub-key becomes its own leaf in the metric name.
#[derive(Clone, Debug, PartialEq)]
pub enum TimerStatistic {
    /// A single value.
    Value(f64),

    /// A breakdown of values, keyed by sub-statistic label.
    Nested(IndexMap<String, f64>),
}

impl From<f64> for TimerStatistic {
    fn from(value: f64) -> Self {
        TimerStatistic::Value(value)
    }
}

impl<K> FromIterator<(K, f64)> for TimerStatistic
where
    K: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        TimerStatistic::Nested(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// A finished snapshot of aggregated metrics for one flush interval.
///
/// The snapshot is produced by the host process and is only ever read by the backend. All maps preserve insertion
/// order, which is the order records are emitted in within each category.
#[derive(Clone, Debug, Default)]
pub struct MetricsSnapshot {
    /// Cumulative counts for the interval, by counter name.
    pub counters: IndexMap<String, f64>,

    /// Per-second rates for the interval, by counter name.
    pub counter_rates: IndexMap<String, f64>,

    /// Computed timer statistics, by timer name and then statistic name.
    pub timer_data: IndexMap<String, IndexMap<String, TimerStatistic>>,

    /// Last known gauge values, by gauge name.
    pub gauges: IndexMap<String, f64>,

    /// Unique members observed for each set, by set name.
    pub sets: IndexMap<String, IndexSet<String>>,

    /// The host's own internal statistics, such as the number of bad lines seen.
    pub statsd_metrics: IndexMap<String, f64>,
}

impl MetricsSnapshot {
    /// Adds a counter with its cumulative count and per-second rate.
    #[must_use]
    pub fn with_counter<K: Into<String>>(mut self, key: K, count: f64, rate: f64) -> Self {
        let key = key.into();
        self.counter_rates.insert(key.clone(), rate);
        self.counters.insert(key, count);
        self
    }

    /// Adds a statistic to the given timer.
    #[must_use]
    pub fn with_timer_statistic<K, S, V>(mut self, key: K, statistic: S, value: V) -> Self
    where
        K: Into<String>,
        S: Into<String>,
        V: Into<TimerStatistic>,
    {
        self.timer_data.entry(key.into()).or_default().insert(statistic.into(), value.into());
        self
    }

    /// Adds a gauge.
    #[must_use]
    pub fn with_gauge<K: Into<String>>(mut self, key: K, value: f64) -> Self {
        self.gauges.insert(key.into(), value);
        self
    }

    /// Adds the given members to a set.
    #[must_use]
    pub fn with_set_members<K, I, M>(mut self, key: K, members: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        self.sets.entry(key.into()).or_default().extend(members.into_iter().map(Into::into));
        self
    }

    /// Adds an internal statistic of the host process.
    #[must_use]
    pub fn with_internal_metric<K: Into<String>>(mut self, key: K, value: f64) -> Self {
        self.statsd_metrics.insert(key.into(), value);
        self
    }
}
