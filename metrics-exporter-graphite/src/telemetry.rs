use metrics::{counter, Counter};

use crate::transport::FlushReport;

/// Exporter telemetry.
///
/// `Telemetry` collects information about the exporter's behavior and reports it through whichever recorder the host
/// process has installed.
pub struct Telemetry {
    payloads_sent: Counter,
    bytes_sent: Counter,
    flushes_failed: Counter,
}

impl Telemetry {
    /// Creates a `Telemetry` instance.
    pub fn new(transport: &'static str) -> Self {
        Self {
            payloads_sent: counter!("graphite.client.payloads_sent", "client_transport" => transport),
            bytes_sent: counter!("graphite.client.bytes_sent", "client_transport" => transport),
            flushes_failed: counter!("graphite.client.flushes_failed", "client_transport" => transport),
        }
    }

    /// Tracks the payloads sent during a flush, whether or not the flush succeeded.
    pub fn track_payloads_sent(&self, report: &FlushReport) {
        self.payloads_sent.increment(report.payloads_sent as u64);
        self.bytes_sent.increment(report.bytes_sent as u64);
    }

    /// Tracks a failed flush.
    pub fn track_flush_failed(&self) {
        self.flushes_failed.increment(1);
    }
}
