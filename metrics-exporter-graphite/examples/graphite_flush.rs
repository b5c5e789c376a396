use std::{
    thread::sleep,
    time::{Duration, SystemTime},
};

use metrics_exporter_graphite::{GraphiteBuilder, MetricsSnapshot, TimerStatistic};

fn unix_now() -> u64 {
    SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn main() {
    tracing_subscriber::fmt::init();

    let flush_interval = Duration::from_secs(10);
    let mut backend = GraphiteBuilder::default()
        .with_host("localhost")
        .with_port(2003)
        .with_flush_interval(flush_interval)
        .with_legacy_namespace(false)
        .with_debug(true)
        .build(unix_now())
        .expect("failed to build Graphite backend");

    let mut requests = 0.0;

    // Pretend to be the host process: aggregate some values, and flush them on every tick.
    loop {
        sleep(flush_interval);

        let count = rand::random_range(0.0..500.0_f64).floor();
        requests += count;

        let latencies = [("p50", rand::random_range(5.0..20.0)), ("p99", rand::random_range(20.0..250.0))]
            .into_iter()
            .collect::<TimerStatistic>();

        let snapshot = MetricsSnapshot::default()
            .with_counter("requests", count, count / flush_interval.as_secs_f64())
            .with_gauge("requests_total", requests)
            .with_timer_statistic("latency", "percentiles", latencies)
            .with_set_members("users", ["alice", "bob", if rand::random_bool(0.5) { "carol" } else { "dave" }]);

        backend.flush(unix_now(), &snapshot);
        backend.status(|category, name, value| println!("{category}.{name} = {value}"));
    }
}
