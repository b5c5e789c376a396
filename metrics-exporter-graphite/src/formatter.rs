use indexmap::IndexMap;
use tracing::trace;

use crate::{
    namespace::{join_name, Namespaces},
    snapshot::{MetricsSnapshot, TimerStatistic},
    stats::SelfStats,
};

// Largest integer that survives a round trip through an `f64` unchanged.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

#[derive(Clone, Copy)]
enum MetricValue {
    Integer(u64),
    FloatingPoint(f64),
}

struct MetricValueFormatter {
    int_writer: itoa::Buffer,
    float_writer: ryu::Buffer,
    number_buf: String,
}

impl MetricValueFormatter {
    fn new() -> Self {
        Self { int_writer: itoa::Buffer::new(), float_writer: ryu::Buffer::new(), number_buf: String::new() }
    }

    /// Formats the value the way a JavaScript number converts to a string.
    ///
    /// Safe integers have no fractional part. Other finite values use the shortest digits that round trip, written
    /// positionally when the magnitude is at least `1e-6` and below `1e21`, and in exponent notation with an explicit
    /// exponent sign otherwise, such as `1e+21` or `1.5e-7`.
    fn format(&mut self, value: MetricValue) -> &str {
        match value {
            MetricValue::Integer(v) => self.int_writer.format(v),
            MetricValue::FloatingPoint(v) if v.is_nan() => "NaN",
            MetricValue::FloatingPoint(v) if v.is_infinite() => {
                if v.is_sign_positive() {
                    "Infinity"
                } else {
                    "-Infinity"
                }
            }
            MetricValue::FloatingPoint(v) if v.fract() == 0.0 && v.abs() <= MAX_SAFE_INTEGER => {
                // Negative zero prints as `0`.
                self.int_writer.format(v as i64)
            }
            MetricValue::FloatingPoint(v) => {
                let shortest = self.float_writer.format_finite(v.abs());
                write_decimal(&mut self.number_buf, v.is_sign_negative(), shortest);
                self.number_buf.as_str()
            }
        }
    }
}

/// Rewrites the shortest round-trip representation of a positive, finite value into `buf`.
#[allow(clippy::cast_possible_wrap)]
fn write_decimal(buf: &mut String, negative: bool, shortest: &str) {
    let (mantissa, exponent) = match shortest.split_once('e') {
        Some((mantissa, exponent)) => (mantissa, exponent.parse::<i32>().unwrap_or_default()),
        None => (shortest, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));

    // The value is `0.<digits> * 10^point`.
    let digits = format!("{int_part}{frac_part}");
    let leading_zeros = digits.len() - digits.trim_start_matches('0').len();
    let digits = digits.trim_matches('0');
    let point = int_part.len() as i32 + exponent - leading_zeros as i32;
    let num_digits = digits.len() as i32;

    buf.clear();
    if negative {
        buf.push('-');
    }

    if digits.is_empty() {
        buf.push('0');
    } else if num_digits <= point && point <= 21 {
        buf.push_str(digits);
        buf.push_str(&"0".repeat((point - num_digits) as usize));
    } else if 0 < point && point <= 21 {
        let (int_digits, frac_digits) = digits.split_at(point as usize);
        buf.push_str(int_digits);
        buf.push('.');
        buf.push_str(frac_digits);
    } else if -6 < point && point <= 0 {
        buf.push_str("0.");
        buf.push_str(&"0".repeat(-point as usize));
        buf.push_str(digits);
    } else {
        let (first, rest) = digits.split_at(1);
        buf.push_str(first);
        if !rest.is_empty() {
            buf.push('.');
            buf.push_str(rest);
        }
        buf.push('e');
        buf.push(if point > 0 { '+' } else { '-' });
        buf.push_str(itoa::Buffer::new().format((point - 1).unsigned_abs()));
    }
}

/// Records formatted from a single metrics snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormattedMetrics {
    /// Formatted records, one metric per entry, without trailing newlines.
    pub lines: Vec<String>,

    /// Number of distinct metrics that were formatted.
    ///
    /// Each counter, timer, gauge, and set counts once, regardless of how many records it produced.
    pub num_stats: usize,
}

/// Turns snapshots into Graphite plaintext records.
pub(crate) struct LineFormatter {
    namespaces: Namespaces,
    global_suffix: String,
    stats_prefix: String,
    flush_counts: bool,
    legacy: bool,
}

impl LineFormatter {
    /// Creates a new `LineFormatter`.
    ///
    /// When `global_suffix` is set, it is appended to every metric name as an additional segment.
    pub fn new(
        namespaces: Namespaces,
        global_suffix: Option<&str>,
        stats_prefix: String,
        flush_counts: bool,
        legacy: bool,
    ) -> Self {
        // The suffix always carries the separator between the name and the value, so that it can be written
        // unconditionally.
        let global_suffix = match global_suffix {
            Some(suffix) => format!(".{suffix} "),
            None => " ".to_string(),
        };

        Self { namespaces, global_suffix, stats_prefix, flush_counts, legacy }
    }

    pub fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }

    fn write_line(
        &self,
        lines: &mut Vec<String>,
        formatter: &mut MetricValueFormatter,
        name: &str,
        value: MetricValue,
        timestamp: u64,
    ) {
        let value = formatter.format(value);

        let mut line = String::with_capacity(name.len() + self.global_suffix.len() + value.len() + 12);
        line.push_str(name);
        line.push_str(&self.global_suffix);
        line.push_str(value);
        line.push(' ');
        line.push_str(itoa::Buffer::new().format(timestamp));
        lines.push(line);
    }

    /// Formats all counters, timers, gauges, and sets in the snapshot, in that order.
    pub fn format_metrics(&self, timestamp: u64, snapshot: &MetricsSnapshot) -> FormattedMetrics {
        let mut formatted = FormattedMetrics::default();
        let mut formatter = MetricValueFormatter::new();
        let lines = &mut formatted.lines;

        for (key, count) in &snapshot.counters {
            // Rates are computed by the host alongside the counts, so a missing rate means the counter saw no time
            // pass at all.
            let rate = snapshot.counter_rates.get(key).copied().unwrap_or(0.0);
            let rate = MetricValue::FloatingPoint(rate);
            let count = MetricValue::FloatingPoint(*count);
            let namespace = self.namespaces.counter();

            if self.legacy {
                let name = join_name(namespace, &[key.as_str()]);
                self.write_line(lines, &mut formatter, &name, rate, timestamp);
                if self.flush_counts {
                    // Raw counts live outside of the counter namespace in the legacy scheme.
                    let name = format!("stats_counts.{key}");
                    self.write_line(lines, &mut formatter, &name, count, timestamp);
                }
            } else {
                let name = join_name(namespace, &[key.as_str(), "rate"]);
                self.write_line(lines, &mut formatter, &name, rate, timestamp);
                if self.flush_counts {
                    let name = join_name(namespace, &[key.as_str(), "count"]);
                    self.write_line(lines, &mut formatter, &name, count, timestamp);
                }
            }

            formatted.num_stats += 1;
        }

        for (key, statistics) in &snapshot.timer_data {
            let base = join_name(self.namespaces.timer(), &[key.as_str()]);
            for (statistic, value) in statistics {
                match value {
                    TimerStatistic::Value(value) => {
                        let name = format!("{base}.{statistic}");
                        let value = MetricValue::FloatingPoint(*value);
                        self.write_line(lines, &mut formatter, &name, value, timestamp);
                    }
                    TimerStatistic::Nested(values) => {
                        for (sub_key, value) in values {
                            trace!(%key, %statistic, %sub_key, value, "Formatting nested timer statistic.");

                            let name = format!("{base}.{statistic}.{sub_key}");
                            let value = MetricValue::FloatingPoint(*value);
                            self.write_line(lines, &mut formatter, &name, value, timestamp);
                        }
                    }
                }
            }

            formatted.num_stats += 1;
        }

        for (key, value) in &snapshot.gauges {
            let name = join_name(self.namespaces.gauge(), &[key.as_str()]);
            let value = MetricValue::FloatingPoint(*value);
            self.write_line(lines, &mut formatter, &name, value, timestamp);

            formatted.num_stats += 1;
        }

        for (key, members) in &snapshot.sets {
            let name = join_name(self.namespaces.set(), &[key.as_str(), "count"]);
            let cardinality = MetricValue::Integer(members.len() as u64);
            self.write_line(lines, &mut formatter, &name, cardinality, timestamp);

            formatted.num_stats += 1;
        }

        formatted
    }

    /// Formats the statistics describing the formatting pass itself, plus the host's internal statistics.
    ///
    /// In the legacy scheme, these names are built from the stats prefix directly rather than from the global
    /// namespace, and `numStats` is the only one without a leading `stats.` segment.
    pub fn format_internal_stats(
        &self,
        timestamp: u64,
        num_stats: usize,
        calculation_time_ms: u64,
        internal_metrics: &IndexMap<String, f64>,
        lines: &mut Vec<String>,
    ) {
        let mut formatter = MetricValueFormatter::new();
        let num_stats = MetricValue::Integer(num_stats as u64);
        let calculation_time = MetricValue::Integer(calculation_time_ms);
        let prefix = self.stats_prefix.as_str();

        if self.legacy {
            let name = format!("{prefix}.numStats");
            self.write_line(lines, &mut formatter, &name, num_stats, timestamp);

            let name = format!("stats.{prefix}.graphiteStats.calculationtime");
            self.write_line(lines, &mut formatter, &name, calculation_time, timestamp);

            for (key, value) in internal_metrics {
                let name = format!("stats.{prefix}.{key}");
                let value = MetricValue::FloatingPoint(*value);
                self.write_line(lines, &mut formatter, &name, value, timestamp);
            }
        } else {
            let namespace = self.namespaces.global();

            let name = join_name(namespace, &[prefix, "numStats"]);
            self.write_line(lines, &mut formatter, &name, num_stats, timestamp);

            let name = join_name(namespace, &[prefix, "graphiteStats", "calculationtime"]);
            self.write_line(lines, &mut formatter, &name, calculation_time, timestamp);

            for (key, value) in internal_metrics {
                let name = join_name(namespace, &[prefix, key.as_str()]);
                let value = MetricValue::FloatingPoint(*value);
                self.write_line(lines, &mut formatter, &name, value, timestamp);
            }
        }
    }

    /// Formats the exporter's own flush statistics.
    ///
    /// These are always rooted at the global namespace, in both naming schemes.
    pub fn format_self_stats(&self, timestamp: u64, stats: &SelfStats, lines: &mut Vec<String>) {
        let mut formatter = MetricValueFormatter::new();
        let fields = [
            ("last_exception", stats.last_exception()),
            ("last_flush", stats.last_flush()),
            ("flush_time", stats.flush_time_ms()),
            ("flush_length", stats.flush_length()),
        ];

        for (field, value) in fields {
            let name = join_name(
                self.namespaces.global(),
                &[self.stats_prefix.as_str(), "graphiteStats", field],
            );
            self.write_line(lines, &mut formatter, &name, MetricValue::Integer(value), timestamp);
        }
    }
}
