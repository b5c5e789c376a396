//! An exporter for flushing aggregated metric snapshots to [Graphite][graphite] over UDP.
//!
//! [graphite]: https://graphite.readthedocs.io/
//!
//! # Usage
//!
//! The exporter is driven by a host process that owns the aggregation and the flush timer. On every flush, the host
//! hands over a finished [`MetricsSnapshot`] along with the flush timestamp, and the backend takes care of naming,
//! formatting, batching, and sending:
//!
//! ```no_run
//! # use metrics_exporter_graphite::{GraphiteBuilder, MetricsSnapshot};
//! // First, create a builder.
//! //
//! // The builder mirrors the configuration options understood by the Graphite backend, such as the remote host/port,
//! // the naming scheme, and the maximum datagram length.
//! let builder = GraphiteBuilder::default()
//!     .with_host("graphite.local")
//!     .with_port(2003);
//!
//! // Building the backend requires the startup time of the host process, in seconds since the Unix epoch, which seeds
//! // the self-reported flush statistics.
//! let mut backend = builder.build(1_700_000_000).expect("failed to build backend");
//!
//! // On every flush trigger, hand the backend the aggregated snapshot.
//! let snapshot = MetricsSnapshot::default()
//!     .with_counter("requests", 10.0, 1.0)
//!     .with_gauge("queue_depth", 42.0);
//! backend.flush(1_700_000_010, &snapshot);
//!
//! // The backend's own statistics can be queried at any time.
//! backend.status(|category, name, value| println!("{category}.{name}: {value}"));
//! ```
//!
//! # Naming
//!
//! Two naming schemes are supported:
//!
//! - the _legacy_ scheme (the default), where counters live directly under `stats`, raw counts under `stats_counts`,
//!   and the remaining categories under `stats.timers`, `stats.gauges`, and `stats.sets`
//! - the _modern_ scheme, where every category is placed under a configurable global prefix followed by a
//!   configurable per-category prefix, and counters report `.rate` and `.count` as separate leaves
//!
//! See [`Namespaces`] for the exact rules.
//!
//! # Wire format
//!
//! Each metric is written as a plaintext Graphite record, `<dotted.name> <value> <timestamp>`, and records are packed
//! into newline-delimited UDP datagrams that stay within the configured maximum datagram length. A record is never
//! split across datagrams.
//!
//! # Telemetry
//!
//! The exporter always reports its own flush statistics (last flush, last exception, flush duration, bytes sent)
//! alongside the metrics it sends, and exposes them via [`GraphiteBackend::status`]. Additionally, counters describing
//! payloads and bytes sent are emitted through the [`metrics`] facade, under the `graphite.client` namespace, when
//! telemetry is enabled.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod backend;
pub use self::backend::{Backend, FlushOutcome, GraphiteBackend};

mod builder;
pub use self::builder::{BuildError, GraphiteBuilder};

mod formatter;
pub use self::formatter::FormattedMetrics;

mod namespace;
pub use self::namespace::{NamespaceConfiguration, Namespaces};

mod snapshot;
pub use self::snapshot::{MetricsSnapshot, TimerStatistic};

mod stats;
pub use self::stats::{SelfStats, STATUS_CATEGORY};

mod telemetry;

mod transport;
pub use self::transport::{FlushError, FlushReport, RemoteAddr, Transport, UdpTransport};

mod writer;
pub use self::writer::{pack, PayloadWriter};
