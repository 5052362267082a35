//! In-process counters rendered in the Prometheus text exposition format.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Counter,
    Gauge,
}

impl Kind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
        }
    }
}

/// A named value with help text.
#[derive(Debug)]
struct Series {
    name: String,
    help: String,
    kind: Kind,
    value: AtomicU64,
}

impl Series {
    fn new(name: String, help: String, kind: Kind) -> Self {
        Self {
            name,
            help,
            kind,
            value: AtomicU64::new(0),
        }
    }

    fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    fn render_into(&self, out: &mut String) {
        // Writing to a String cannot fail.
        let _ = write!(
            out,
            "# HELP {name} {help}\n# TYPE {name} {kind}\n{name} {value}\n",
            name = self.name,
            help = self.help,
            kind = self.kind.as_str(),
            value = self.get(),
        );
    }
}

/// Monotonically increasing count.
#[derive(Debug)]
pub struct Counter(Series);

impl Counter {
    /// Create a counter at zero.
    #[must_use]
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self(Series::new(name.into(), help.into(), Kind::Counter))
    }

    /// Add one.
    pub fn inc(&self) {
        self.0.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Current count.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.get()
    }

    /// Metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Exposition text for this counter alone.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();
        self.0.render_into(&mut out);
        out
    }
}

/// Last observed level.
#[derive(Debug)]
pub struct Gauge(Series);

impl Gauge {
    /// Create a gauge at zero.
    #[must_use]
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self(Series::new(name.into(), help.into(), Kind::Gauge))
    }

    /// Replace the level.
    pub fn set(&self, value: u64) {
        self.0.value.store(value, Ordering::Relaxed);
    }

    /// Current level.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.get()
    }

    /// Exposition text for this gauge alone.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();
        self.0.render_into(&mut out);
        out
    }
}

/// Counters for a read-through cache with coalesced loads.
///
/// `hits + misses` counts lookups; `loads` counts executions of the loader,
/// which is lower than `misses` whenever concurrent misses were coalesced.
#[derive(Debug)]
pub struct CacheMetrics {
    /// Lookups served from a live entry
    pub hits: Counter,
    /// Lookups that found no live entry
    pub misses: Counter,
    /// Loader executions
    pub loads: Counter,
    /// Loader executions that returned an error
    pub load_failures: Counter,
    /// Live entries at last observation
    pub size: Gauge,
}

impl CacheMetrics {
    /// Create metrics named `<prefix>_cache_hits_total`, `<prefix>_loads_total`
    /// and so on.
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            hits: Counter::new(
                format!("{prefix}_cache_hits_total"),
                "Lookups served from cache",
            ),
            misses: Counter::new(
                format!("{prefix}_cache_misses_total"),
                "Lookups that required a load",
            ),
            loads: Counter::new(
                format!("{prefix}_loads_total"),
                "Loads executed after coalescing",
            ),
            load_failures: Counter::new(
                format!("{prefix}_load_failures_total"),
                "Loads that failed",
            ),
            size: Gauge::new(format!("{prefix}_cache_size"), "Live cache entries"),
        }
    }

    /// Record a cache hit.
    pub fn record_hit(&self) {
        self.hits.inc();
    }

    /// Record a cache miss.
    pub fn record_miss(&self) {
        self.misses.inc();
    }

    /// Record one loader execution.
    pub fn record_load(&self, success: bool) {
        self.loads.inc();
        if !success {
            self.load_failures.inc();
        }
    }

    /// Set the live entry count.
    pub fn update_size(&self, size: u64) {
        self.size.set(size);
    }

    /// Fraction of lookups served from cache, or `None` before any lookup.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_ratio(&self) -> Option<f64> {
        let hits = self.hits.get();
        let total = hits + self.misses.get();
        (total > 0).then(|| hits as f64 / total as f64)
    }

    /// Exposition text for every series.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();
        for series in [
            &self.hits.0,
            &self.misses.0,
            &self.loads.0,
            &self.load_failures.0,
            &self.size.0,
        ] {
            series.render_into(&mut out);
        }
        out
    }
}
