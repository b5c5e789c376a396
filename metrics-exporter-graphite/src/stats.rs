/// Category under which the exporter's own statistics are reported to status queries.
pub const STATUS_CATEGORY: &str = "graphite";

/// The exporter's own flush statistics.
///
/// All timestamps are in seconds since the Unix epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelfStats {
    last_flush: u64,
    last_exception: u64,
    flush_time_ms: u64,
    flush_length: u64,
}

impl SelfStats {
    /// Creates a new `SelfStats`, seeded with the startup time of the host process.
    pub fn new(startup_time: u64) -> Self {
        Self { last_flush: startup_time, last_exception: startup_time, flush_time_ms: 0, flush_length: 0 }
    }

    /// Records a successful flush.
    pub fn record_success(&mut self, timestamp: u64, flush_time_ms: u64, flush_length: u64) {
        self.last_flush = timestamp;
        self.flush_time_ms = flush_time_ms;
        self.flush_length = flush_length;
    }

    /// Records a failed flush.
    ///
    /// Only the exception time changes: the last successful flush is left as-is.
    pub fn record_exception(&mut self, timestamp: u64) {
        self.last_exception = timestamp;
    }

    /// Time of the last successful flush.
    pub fn last_flush(&self) -> u64 {
        self.last_flush
    }

    /// Time of the last failed flush.
    pub fn last_exception(&self) -> u64 {
        self.last_exception
    }

    /// Duration of the last successful flush, in milliseconds.
    pub fn flush_time_ms(&self) -> u64 {
        self.flush_time_ms
    }

    /// Number of bytes sent during the last successful flush.
    pub fn flush_length(&self) -> u64 {
        self.flush_length
    }

    /// Reports each statistic to the given callback as a `(category, name, value)` triple.
    pub fn report_status<F>(&self, mut write: F)
    where
        F: FnMut(&str, &str, u64),
    {
        write(STATUS_CATEGORY, "last_flush", self.last_flush);
        write(STATUS_CATEGORY, "last_exception", self.last_exception);
        write(STATUS_CATEGORY, "flush_time", self.flush_time_ms);
        write(STATUS_CATEGORY, "flush_length", self.flush_length);
    }
}
