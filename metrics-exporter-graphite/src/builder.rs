use std::time::Duration;

use quanta::Clock;
use thiserror::Error;
use tracing::debug;

use crate::{
    backend::{BackendConfiguration, GraphiteBackend},
    formatter::LineFormatter,
    namespace::{NamespaceConfiguration, Namespaces},
    transport::{RemoteAddr, Transport, UdpTransport},
};

const DEFAULT_PORT: u16 = 2003;
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);
// Stays under the minimum reassembly buffer size that every IPv4 host must support, minus IP/UDP headers.
const DEFAULT_MAX_DATAGRAM_LEN: usize = 508;
const DEFAULT_STATS_PREFIX: &str = "stats";

/// Errors that could occur while building a Graphite backend.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The configured host was empty.
    #[error("remote host must not be empty")]
    InvalidHost,

    /// The configured maximum datagram length was zero.
    #[error("maximum datagram length must be greater than zero")]
    InvalidMaximumDatagramLength,
}

/// Builder for a Graphite backend.
pub struct GraphiteBuilder {
    host: Option<String>,
    port: u16,
    flush_interval: Duration,
    flush_counts: bool,
    max_datagram_len: usize,
    debug: bool,
    namespace: NamespaceConfiguration,
    global_suffix: Option<String>,
    stats_prefix: String,
    telemetry: bool,
    transport: Option<Box<dyn Transport>>,
    clock: Option<Clock>,
}

impl GraphiteBuilder {
    /// Set the host of the remote Graphite server.
    ///
    /// When no host is set, flushes are skipped entirely: nothing is formatted or sent, and the flush statistics are
    /// left untouched.
    ///
    /// Defaults to no host.
    #[must_use]
    pub fn with_host<H: Into<String>>(mut self, host: H) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the port of the remote Graphite server.
    ///
    /// Defaults to 2003.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the flush interval of the host process.
    ///
    /// Flushes are triggered by the host process, so this is purely informational.
    ///
    /// Defaults to 10 seconds.
    #[must_use]
    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    /// Sets whether or not to send the raw count of each counter alongside its per-second rate.
    ///
    /// Defaults to `true`.
    #[must_use]
    pub fn with_flush_counts(mut self, flush_counts: bool) -> Self {
        self.flush_counts = flush_counts;
        self
    }

    /// Set the maximum datagram length.
    ///
    /// Records are packed into datagrams of at most this many bytes. A record that cannot fit within this length on its
    /// own is sent in a datagram by itself, rather than being dropped or split.
    ///
    /// Defaults to 508 bytes.
    #[must_use]
    pub fn with_maximum_datagram_length(mut self, max_datagram_len: usize) -> Self {
        self.max_datagram_len = max_datagram_len;
        self
    }

    /// Sets whether or not to log the number of metrics flushed and any errors encountered while sending.
    ///
    /// Defaults to `false`.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Sets whether or not to use the legacy naming scheme.
    ///
    /// The legacy scheme ignores all configured prefixes. See [`Namespaces`] for more details.
    ///
    /// Defaults to `true`.
    #[must_use]
    pub fn with_legacy_namespace(mut self, legacy: bool) -> Self {
        self.namespace.legacy = legacy;
        self
    }

    /// Set the prefix applied to all metrics.
    ///
    /// An empty prefix disables it. Only used when the legacy naming scheme is disabled.
    ///
    /// Defaults to `stats`.
    #[must_use]
    pub fn with_global_prefix<P: Into<String>>(mut self, prefix: P) -> Self {
        self.namespace.global_prefix = prefix.into();
        self
    }

    /// Set the prefix applied to counters.
    ///
    /// An empty prefix disables it. Only used when the legacy naming scheme is disabled.
    ///
    /// Defaults to `counters`.
    #[must_use]
    pub fn with_counter_prefix<P: Into<String>>(mut self, prefix: P) -> Self {
        self.namespace.counter_prefix = prefix.into();
        self
    }

    /// Set the prefix applied to timers.
    ///
    /// An empty prefix disables it. Only used when the legacy naming scheme is disabled.
    ///
    /// Defaults to `timers`.
    #[must_use]
    pub fn with_timer_prefix<P: Into<String>>(mut self, prefix: P) -> Self {
        self.namespace.timer_prefix = prefix.into();
        self
    }

    /// Set the prefix applied to gauges.
    ///
    /// An empty prefix disables it. Only used when the legacy naming scheme is disabled.
    ///
    /// Defaults to `gauges`.
    #[must_use]
    pub fn with_gauge_prefix<P: Into<String>>(mut self, prefix: P) -> Self {
        self.namespace.gauge_prefix = prefix.into();
        self
    }

    /// Set the prefix applied to sets.
    ///
    /// An empty prefix disables it. Only used when the legacy naming scheme is disabled.
    ///
    /// Defaults to `sets`.
    #[must_use]
    pub fn with_set_prefix<P: Into<String>>(mut self, prefix: P) -> Self {
        self.namespace.set_prefix = prefix.into();
        self
    }

    /// Set the suffix appended to all metric names, as an additional segment.
    ///
    /// This applies in both naming schemes.
    ///
    /// Defaults to no suffix.
    #[must_use]
    pub fn with_global_suffix<S: Into<String>>(mut self, suffix: S) -> Self {
        self.global_suffix = Some(suffix.into());
        self
    }

    /// Set the root segment used for the exporter's own statistics.
    ///
    /// This is used as-is in the legacy naming scheme, and after the global prefix otherwise.
    ///
    /// Defaults to `stats`.
    #[must_use]
    pub fn with_stats_prefix<P: Into<String>>(mut self, prefix: P) -> Self {
        self.stats_prefix = prefix.into();
        self
    }

    /// Sets whether or not to enable telemetry for the exporter.
    ///
    /// When enabled, counters describing the payloads and bytes sent, and the number of failed flushes, are emitted
    /// through the installed `metrics` recorder.
    ///
    /// Defaults to `true`.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: bool) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Set the transport used to send payloads.
    ///
    /// Defaults to [`UdpTransport`].
    #[must_use]
    pub fn with_transport<T>(mut self, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Set the clock used to measure formatting and flush durations.
    ///
    /// Defaults to [`Clock::new`].
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the backend.
    ///
    /// `startup_time` is the time the host process started, in seconds since the Unix epoch, and seeds the flush
    /// statistics.
    ///
    /// # Errors
    ///
    /// If the configured host is empty, or the maximum datagram length is zero, an error will be returned.
    pub fn build(self, startup_time: u64) -> Result<GraphiteBackend, BuildError> {
        if self.host.as_deref() == Some("") {
            return Err(BuildError::InvalidHost);
        }
        if self.max_datagram_len == 0 {
            return Err(BuildError::InvalidMaximumDatagramLength);
        }

        let remote_addr = self.host.map(|host| RemoteAddr::new(host, self.port));
        let namespaces = Namespaces::new(&self.namespace);

        debug!(
            remote_addr = remote_addr.as_ref().map(tracing::field::display),
            flush_interval = ?self.flush_interval,
            max_datagram_len = self.max_datagram_len,
            legacy_namespace = self.namespace.legacy,
            ?namespaces,
            "Building Graphite backend."
        );

        let formatter = LineFormatter::new(
            namespaces,
            self.global_suffix.as_deref(),
            self.stats_prefix,
            self.flush_counts,
            self.namespace.legacy,
        );

        let backend_config = BackendConfiguration {
            remote_addr,
            max_datagram_len: self.max_datagram_len,
            debug: self.debug,
            telemetry: self.telemetry,
            startup_time,
        };

        Ok(GraphiteBackend::new(
            backend_config,
            formatter,
            self.transport.unwrap_or_else(|| Box::new(UdpTransport)),
            self.clock.unwrap_or_else(Clock::new),
        ))
    }
}

impl Default for GraphiteBuilder {
    fn default() -> Self {
        GraphiteBuilder {
            host: None,
            port: DEFAULT_PORT,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            flush_counts: true,
            max_datagram_len: DEFAULT_MAX_DATAGRAM_LEN,
            debug: false,
            namespace: NamespaceConfiguration::default(),
            global_suffix: None,
            stats_prefix: DEFAULT_STATS_PREFIX.to_string(),
            telemetry: true,
            transport: None,
            clock: None,
        }
    }
}
