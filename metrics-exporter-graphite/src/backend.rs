use std::time::Duration;

use quanta::Clock;
use tracing::{debug, error, trace};

use crate::{
    formatter::{FormattedMetrics, LineFormatter},
    namespace::Namespaces,
    snapshot::MetricsSnapshot,
    stats::SelfStats,
    telemetry::Telemetry,
    transport::{FlushError, FlushReport, RemoteAddr, Transport},
    writer::pack,
};

/// Handlers that a host process drives: one for every flush trigger, and one for every status query.
pub trait Backend {
    /// Flushes the given snapshot, taken at `timestamp` (in seconds since the Unix epoch).
    ///
    /// Flushing never fails from the perspective of the host: any errors are absorbed by the backend.
    fn on_flush(&mut self, timestamp: u64, metrics: &MetricsSnapshot);

    /// Reports the backend's status as `(category, name, value)` triples.
    fn on_status(&self, write: &mut dyn FnMut(&str, &str, u64));
}

/// Result of a single flush.
#[derive(Debug)]
pub enum FlushOutcome {
    /// No remote host is configured, so nothing was formatted or sent.
    Skipped,

    /// All payloads were sent.
    Sent(FlushReport),

    /// Sending failed.
    ///
    /// The failure has already been recorded in the backend's statistics, and is only returned for inspection.
    Failed(FlushError),
}

/// Backend configuration.
pub(crate) struct BackendConfiguration {
    /// Address of the remote server, if any.
    pub remote_addr: Option<RemoteAddr>,

    /// Maximum length of a single datagram.
    pub max_datagram_len: usize,

    /// Whether or not to log flush details and errors.
    pub debug: bool,

    /// Whether or not to collect/emit internal telemetry.
    pub telemetry: bool,

    /// Startup time of the host process.
    pub startup_time: u64,
}

/// A Graphite backend.
///
/// Flushes are expected to be serialized by the host process: the backend is driven through `&mut self`, and holds no
/// state across flushes other than its own statistics.
pub struct GraphiteBackend {
    config: BackendConfiguration,
    formatter: LineFormatter,
    transport: Box<dyn Transport>,
    clock: Clock,
    stats: SelfStats,
    telemetry: Option<Telemetry>,
}

impl GraphiteBackend {
    pub(crate) fn new(
        config: BackendConfiguration,
        formatter: LineFormatter,
        transport: Box<dyn Transport>,
        clock: Clock,
    ) -> Self {
        let stats = SelfStats::new(config.startup_time);
        Self { config, formatter, transport, clock, stats, telemetry: None }
    }

    /// Returns the address of the remote server, if one is configured.
    pub fn remote_addr(&self) -> Option<&RemoteAddr> {
        self.config.remote_addr.as_ref()
    }

    /// Returns the namespaces used for each metric category.
    pub fn namespaces(&self) -> &Namespaces {
        self.formatter.namespaces()
    }

    /// Returns the backend's own flush statistics.
    pub fn self_stats(&self) -> &SelfStats {
        &self.stats
    }

    /// Formats the counters, timers, gauges, and sets of the given snapshot, without sending anything.
    pub fn format_metrics(&self, timestamp: u64, snapshot: &MetricsSnapshot) -> FormattedMetrics {
        self.formatter.format_metrics(timestamp, snapshot)
    }

    /// Flushes the given snapshot to the remote server.
    ///
    /// Records are emitted in the following order: counters, timers, gauges, sets, the statistics about this flush
    /// (number of metrics, calculation time, and the host's internal statistics), and finally the backend's own flush
    /// statistics as of the previous flush.
    ///
    /// Errors are never propagated: a failed flush is recorded as the time of the last exception, and is otherwise
    /// only visible through the returned outcome.
    pub fn flush(&mut self, timestamp: u64, snapshot: &MetricsSnapshot) -> FlushOutcome {
        let Some(remote_addr) = self.config.remote_addr.as_ref() else {
            trace!("No remote host configured. Skipping flush.");
            return FlushOutcome::Skipped;
        };

        let calculation_start = self.clock.now();
        let FormattedMetrics { mut lines, num_stats } = self.formatter.format_metrics(timestamp, snapshot);
        let calculation_time = self.clock.now().duration_since(calculation_start);

        self.formatter.format_internal_stats(
            timestamp,
            num_stats,
            calculation_time.as_millis() as u64,
            &snapshot.statsd_metrics,
            &mut lines,
        );
        self.formatter.format_self_stats(timestamp, &self.stats, &mut lines);

        let flush_start = self.clock.now();
        let payloads = pack(&lines, self.config.max_datagram_len);
        trace!(num_records = lines.len(), num_payloads = payloads.len(), "Sending payloads.");

        let result = self.transport.send(remote_addr, &payloads);
        let flush_time = self.clock.now().duration_since(flush_start);

        let outcome = self.apply_result(timestamp, flush_time, result);
        self.update_telemetry(&outcome);

        if self.config.debug {
            debug!(num_stats, "Flushed metrics.");
        }

        outcome
    }

    fn apply_result(
        &mut self,
        timestamp: u64,
        flush_time: Duration,
        result: Result<FlushReport, FlushError>,
    ) -> FlushOutcome {
        match result {
            Ok(report) => {
                trace!(
                    payloads_sent = report.payloads_sent,
                    bytes_sent = report.bytes_sent,
                    "Finished sending payloads."
                );

                self.stats.record_success(timestamp, flush_time.as_millis() as u64, report.bytes_sent as u64);
                FlushOutcome::Sent(report)
            }
            Err(e) => {
                if self.config.debug {
                    error!(error = %e, "Failed to send payloads.");
                }

                self.stats.record_exception(timestamp);
                FlushOutcome::Failed(e)
            }
        }
    }

    fn update_telemetry(&mut self, outcome: &FlushOutcome) {
        if !self.config.telemetry {
            return;
        }

        // Telemetry is created on first use, rather than at build time, so that it registers with whatever recorder
        // the host process has installed by the time flushing starts.
        let transport_id = self.transport.transport_id();
        let telemetry = self.telemetry.get_or_insert_with(|| Telemetry::new(transport_id));
        match outcome {
            FlushOutcome::Skipped => {}
            FlushOutcome::Sent(report) => telemetry.track_payloads_sent(report),
            FlushOutcome::Failed(e) => {
                telemetry.track_payloads_sent(&e.partial_report());
                telemetry.track_flush_failed();
            }
        }
    }

    /// Reports the backend's own flush statistics to the given callback as `(category, name, value)` triples.
    pub fn status<F>(&self, write: F)
    where
        F: FnMut(&str, &str, u64),
    {
        self.stats.report_status(write);
    }
}

impl Backend for GraphiteBackend {
    fn on_flush(&mut self, timestamp: u64, metrics: &MetricsSnapshot) {
        self.flush(timestamp, metrics);
    }

    fn on_status(&self, write: &mut dyn FnMut(&str, &str, u64)) {
        self.status(write);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        net::SocketAddr,
        sync::{Arc, Mutex},
        time::Duration,
    };

    use bytes::Bytes;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};
    use quanta::{Clock, Mock};

    use super::{Backend, FlushOutcome, GraphiteBackend};
    use crate::{
        builder::GraphiteBuilder,
        snapshot::MetricsSnapshot,
        transport::{FlushError, FlushReport, RemoteAddr, Transport},
    };

    #[derive(Clone, Default)]
    struct RecordingTransport {
        payloads: Arc<Mutex<Vec<Bytes>>>,
        sends: Arc<Mutex<usize>>,
        mock: Option<Arc<Mock>>,
    }

    impl RecordingTransport {
        fn lines(&self) -> Vec<String> {
            let payloads = self.payloads.lock().unwrap();
            payloads
                .iter()
                .flat_map(|p| std::str::from_utf8(p).unwrap().lines().map(ToString::to_string).collect::<Vec<_>>())
                .collect()
        }

        fn clear(&self) {
            self.payloads.lock().unwrap().clear();
        }

        fn sends(&self) -> usize {
            *self.sends.lock().unwrap()
        }
    }

    impl Transport for RecordingTransport {
        fn transport_id(&self) -> &'static str {
            "test"
        }

        fn send(&mut self, _: &RemoteAddr, payloads: &[Bytes]) -> Result<FlushReport, FlushError> {
            *self.sends.lock().unwrap() += 1;
            if let Some(mock) = &self.mock {
                mock.increment(Duration::from_millis(5));
            }

            let mut report = FlushReport::default();
            for payload in payloads {
                report.track_payload_sent(payload.len());
                self.payloads.lock().unwrap().push(payload.clone());
            }
            Ok(report)
        }
    }

    struct FailingTransport;

    impl Transport for FailingTransport {
        fn transport_id(&self) -> &'static str {
            "test"
        }

        fn send(&mut self, _: &RemoteAddr, _: &[Bytes]) -> Result<FlushReport, FlushError> {
            Err(FlushError::Send {
                addr: SocketAddr::from(([127, 0, 0, 1], 2003)),
                report: FlushReport::default(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
            })
        }
    }

    /// Sends the first payload, then fails.
    struct PartiallyFailingTransport;

    impl Transport for PartiallyFailingTransport {
        fn transport_id(&self) -> &'static str {
            "test"
        }

        fn send(&mut self, _: &RemoteAddr, payloads: &[Bytes]) -> Result<FlushReport, FlushError> {
            let mut report = FlushReport::default();
            report.track_payload_sent(payloads[0].len());
            Err(FlushError::Send {
                addr: SocketAddr::from(([127, 0, 0, 1], 2003)),
                report,
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
            })
        }
    }

    fn counter_values(recorder: &DebuggingRecorder) -> Vec<(String, u64)> {
        recorder
            .snapshotter()
            .snapshot()
            .into_vec()
            .into_iter()
            .filter_map(|(key, _, _, value)| match value {
                DebugValue::Counter(value) => Some((key.key().name().to_string(), value)),
                _ => None,
            })
            .collect()
    }

    fn backend_with<T: Transport + 'static>(builder: GraphiteBuilder, transport: T) -> GraphiteBackend {
        let (clock, _) = Clock::mock();
        builder.with_transport(transport).with_clock(clock).with_telemetry(false).build(900).unwrap()
    }

    fn counter_snapshot() -> MetricsSnapshot {
        MetricsSnapshot::default().with_counter("foo", 5.0, 2.5)
    }

    #[test]
    fn skipped_without_host() {
        let transport = RecordingTransport::default();
        let mut backend = backend_with(GraphiteBuilder::default(), transport.clone());

        let outcome = backend.flush(1000, &counter_snapshot());
        assert!(matches!(outcome, FlushOutcome::Skipped));
        assert_eq!(transport.sends(), 0);
        assert_eq!(backend.self_stats().last_flush(), 900);
        assert_eq!(backend.self_stats().last_exception(), 900);
    }

    #[test]
    fn legacy_flush() {
        let transport = RecordingTransport::default();
        let builder = GraphiteBuilder::default().with_host("localhost");
        let mut backend = backend_with(builder, transport.clone());

        let snapshot = counter_snapshot()
            .with_set_members("uniqueIPs", ["a", "b", "c"])
            .with_internal_metric("bad_lines_seen", 0.0);
        let outcome = backend.flush(1000, &snapshot);

        let expected = [
            "stats.foo 2.5 1000",
            "stats_counts.foo 5 1000",
            "stats.sets.uniqueIPs.count 3 1000",
            "stats.numStats 2 1000",
            "stats.stats.graphiteStats.calculationtime 0 1000",
            "stats.stats.bad_lines_seen 0 1000",
            "stats.stats.graphiteStats.last_exception 900 1000",
            "stats.stats.graphiteStats.last_flush 900 1000",
            "stats.stats.graphiteStats.flush_time 0 1000",
            "stats.stats.graphiteStats.flush_length 0 1000",
        ];
        assert_eq!(transport.lines(), expected);

        let expected_len = expected.iter().map(|line| line.len() + 1).sum::<usize>();
        match outcome {
            FlushOutcome::Sent(report) => assert_eq!(report.bytes_sent, expected_len),
            other => panic!("expected successful flush, got {other:?}"),
        }

        assert_eq!(backend.self_stats().last_flush(), 1000);
        assert_eq!(backend.self_stats().flush_length(), expected_len as u64);
        assert_eq!(backend.self_stats().last_exception(), 900);
    }

    #[test]
    fn modern_flush() {
        let transport = RecordingTransport::default();
        let builder = GraphiteBuilder::default()
            .with_host("localhost")
            .with_legacy_namespace(false)
            .with_global_prefix("app")
            .with_global_suffix("host1")
            .with_flush_counts(false);
        let mut backend = backend_with(builder, transport.clone());

        backend.flush(1000, &counter_snapshot());

        assert_eq!(
            transport.lines(),
            [
                "app.counters.foo.rate.host1 2.5 1000",
                "app.stats.numStats.host1 1 1000",
                "app.stats.graphiteStats.calculationtime.host1 0 1000",
                "app.stats.graphiteStats.last_exception.host1 900 1000",
                "app.stats.graphiteStats.last_flush.host1 900 1000",
                "app.stats.graphiteStats.flush_time.host1 0 1000",
                "app.stats.graphiteStats.flush_length.host1 0 1000",
            ]
        );
    }

    #[test]
    fn self_stats_carry_over_to_next_flush() {
        let (clock, mock) = Clock::mock();
        let transport = RecordingTransport { mock: Some(mock), ..RecordingTransport::default() };
        let mut backend = GraphiteBuilder::default()
            .with_host("localhost")
            .with_transport(transport.clone())
            .with_clock(clock)
            .with_telemetry(false)
            .build(900)
            .unwrap();

        backend.flush(1000, &MetricsSnapshot::default());
        let first_len = backend.self_stats().flush_length();
        assert_eq!(backend.self_stats().flush_time_ms(), 5);

        transport.clear();
        backend.flush(1010, &MetricsSnapshot::default());

        let lines = transport.lines();
        assert!(lines.contains(&"stats.stats.graphiteStats.last_flush 1000 1010".to_string()));
        assert!(lines.contains(&"stats.stats.graphiteStats.flush_time 5 1010".to_string()));
        assert!(lines.contains(&format!("stats.stats.graphiteStats.flush_length {first_len} 1010")));
    }

    #[test]
    fn payloads_respect_maximum_datagram_length() {
        let transport = RecordingTransport::default();
        let builder = GraphiteBuilder::default().with_host("localhost").with_maximum_datagram_length(64);
        let mut backend = backend_with(builder, transport.clone());

        let snapshot = (0..20).fold(MetricsSnapshot::default(), |snapshot, i| {
            snapshot.with_gauge(format!("gauge{i}"), f64::from(i))
        });
        backend.flush(1000, &snapshot);

        let payloads = transport.payloads.lock().unwrap();
        assert!(payloads.len() > 1);
        assert!(payloads.iter().all(|p| p.len() <= 64));
    }

    #[test]
    fn failure_records_exception() {
        let builder = GraphiteBuilder::default().with_host("localhost").with_debug(true);
        let mut backend = backend_with(builder, FailingTransport);

        let outcome = backend.flush(1000, &counter_snapshot());
        assert!(matches!(outcome, FlushOutcome::Failed(FlushError::Send { .. })));
        assert_eq!(backend.self_stats().last_exception(), 1000);
        assert_eq!(backend.self_stats().last_flush(), 900);
        assert_eq!(backend.self_stats().flush_length(), 0);

        // The next flush is unaffected.
        let outcome = backend.flush(1010, &counter_snapshot());
        assert!(matches!(outcome, FlushOutcome::Failed(_)));
        assert_eq!(backend.self_stats().last_exception(), 1010);
    }

    #[test]
    fn status_via_backend_trait() {
        let transport = RecordingTransport::default();
        let builder = GraphiteBuilder::default().with_host("localhost");
        let mut backend = backend_with(builder, transport);

        {
            let backend: &mut dyn Backend = &mut backend;
            backend.on_flush(1000, &counter_snapshot());
        }

        let mut entries = Vec::new();
        backend.on_status(&mut |category, name, value| entries.push(format!("{category}.{name}={value}")));

        let flush_length = backend.self_stats().flush_length();
        assert_eq!(
            entries,
            [
                "graphite.last_flush=1000".to_string(),
                "graphite.last_exception=900".to_string(),
                "graphite.flush_time=0".to_string(),
                format!("graphite.flush_length={flush_length}"),
            ]
        );
    }

    #[test]
    fn telemetry() {
        let recorder = DebuggingRecorder::new();

        let transport = RecordingTransport::default();
        let (clock, _) = Clock::mock();
        let mut backend = GraphiteBuilder::default()
            .with_host("localhost")
            .with_transport(transport.clone())
            .with_clock(clock)
            .build(900)
            .unwrap();

        metrics::with_local_recorder(&recorder, || {
            backend.flush(1000, &counter_snapshot());
            backend.flush(1010, &counter_snapshot());
        });

        let bytes_sent = transport.payloads.lock().unwrap().iter().map(Bytes::len).sum::<usize>() as u64;
        let counters = counter_values(&recorder);

        assert!(counters.contains(&("graphite.client.payloads_sent".to_string(), 2)));
        assert!(counters.contains(&("graphite.client.bytes_sent".to_string(), bytes_sent)));
        assert!(!counters.iter().any(|(name, value)| name == "graphite.client.flushes_failed" && *value > 0));
    }

    #[test]
    fn telemetry_counts_payloads_sent_before_failure() {
        let recorder = DebuggingRecorder::new();

        let (clock, _) = Clock::mock();
        let mut backend = GraphiteBuilder::default()
            .with_host("localhost")
            .with_maximum_datagram_length(32)
            .with_transport(PartiallyFailingTransport)
            .with_clock(clock)
            .build(900)
            .unwrap();

        let outcome = metrics::with_local_recorder(&recorder, || backend.flush(1000, &counter_snapshot()));
        let first_len = "stats.foo 2.5 1000\n".len() as u64;
        match outcome {
            FlushOutcome::Failed(e) => assert_eq!(e.partial_report().bytes_sent as u64, first_len),
            other => panic!("expected failed flush, got {other:?}"),
        }

        let counters = counter_values(&recorder);
        assert!(counters.contains(&("graphite.client.payloads_sent".to_string(), 1)));
        assert!(counters.contains(&("graphite.client.bytes_sent".to_string(), first_len)));
        assert!(counters.contains(&("graphite.client.flushes_failed".to_string(), 1)));
        assert_eq!(backend.self_stats().last_exception(), 1000);
    }
}
