/// Naming configuration used to derive [`Namespaces`].
#[derive(Clone, Debug)]
pub struct NamespaceConfiguration {
    /// Whether or not to use the legacy naming scheme.
    ///
    /// When enabled, all of the prefixes below are ignored.
    pub legacy: bool,

    /// Prefix applied to every category.
    pub global_prefix: String,

    /// Prefix applied to counters, after the global prefix.
    pub counter_prefix: String,

    /// Prefix applied to timers, after the global prefix.
    pub timer_prefix: String,

    /// Prefix applied to gauges, after the global prefix.
    pub gauge_prefix: String,

    /// Prefix applied to sets, after the global prefix.
    pub set_prefix: String,
}

impl Default for NamespaceConfiguration {
    fn default() -> Self {
        Self {
            legacy: true,
            global_prefix: "stats".to_string(),
            counter_prefix: "counters".to_string(),
            timer_prefix: "timers".to_string(),
            gauge_prefix: "gauges".to_string(),
            set_prefix: "sets".to_string(),
        }
    }
}

/// Name segments prepended to each metric, per category.
///
/// In the legacy scheme, the segments are fixed:
///
/// | category | segments           |
/// |----------|--------------------|
/// | global   | `stats`            |
/// | counter  | `stats`            |
/// | timer    | `stats`, `timers`  |
/// | gauge    | `stats`, `gauges`  |
/// | set      | `stats`, `sets`    |
///
/// Otherwise, each category gets the global prefix followed by its own prefix, and any prefix that is empty is left
/// out entirely. The global category only ever gets the global prefix.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Namespaces {
    global: Vec<String>,
    counter: Vec<String>,
    timer: Vec<String>,
    gauge: Vec<String>,
    set: Vec<String>,
}

impl Namespaces {
    /// Derives the namespaces for the given configuration.
    pub fn new(config: &NamespaceConfiguration) -> Self {
        if config.legacy {
            return Self::legacy();
        }

        let mut namespaces = Self::default();
        if !config.global_prefix.is_empty() {
            for segments in namespaces.all_mut() {
                segments.push(config.global_prefix.clone());
            }
        }

        push_non_empty(&mut namespaces.counter, &config.counter_prefix);
        push_non_empty(&mut namespaces.timer, &config.timer_prefix);
        push_non_empty(&mut namespaces.gauge, &config.gauge_prefix);
        push_non_empty(&mut namespaces.set, &config.set_prefix);

        namespaces
    }

    fn legacy() -> Self {
        let segments = |parts: &[&str]| parts.iter().map(ToString::to_string).collect();

        Self {
            global: segments(&["stats"]),
            counter: segments(&["stats"]),
            timer: segments(&["stats", "timers"]),
            gauge: segments(&["stats", "gauges"]),
            set: segments(&["stats", "sets"]),
        }
    }

    fn all_mut(&mut self) -> [&mut Vec<String>; 5] {
        [&mut self.global, &mut self.counter, &mut self.timer, &mut self.gauge, &mut self.set]
    }

    /// Returns the global segments, used for the exporter's own statistics.
    pub fn global(&self) -> &[String] {
        &self.global
    }

    /// Returns the counter segments.
    pub fn counter(&self) -> &[String] {
        &self.counter
    }

    /// Returns the timer segments.
    pub fn timer(&self) -> &[String] {
        &self.timer
    }

    /// Returns the gauge segments.
    pub fn gauge(&self) -> &[String] {
        &self.gauge
    }

    /// Returns the set segments.
    pub fn set(&self) -> &[String] {
        &self.set
    }
}

fn push_non_empty(segments: &mut Vec<String>, prefix: &str) {
    if !prefix.is_empty() {
        segments.push(prefix.to_string());
    }
}

/// Joins the namespace segments and any trailing segments with dots.
pub(crate) fn join_name(namespace: &[String], tail: &[&str]) -> String {
    let mut name = String::new();
    let segments = namespace.iter().map(String::as_str).chain(tail.iter().copied());
    for (i, segment) in segments.enumerate() {
        if i > 0 {
            name.push('.');
        }
        name.push_str(segment);
    }
    name
}
