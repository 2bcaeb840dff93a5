//! Lookup metrics
//!
//! Prometheus-compatible counters and a latency histogram for the
//! coordinator and fan-out paths.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Histogram bucket boundaries for latency measurements (in milliseconds)
const LATENCY_BUCKETS: [f64; 11] = [
    1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0,
];

/// A simple histogram implementation for latency tracking
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<AtomicU64>,
    boundaries: Vec<f64>,
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    /// Create a new histogram with default latency buckets
    pub fn new() -> Self {
        Self::with_buckets(&LATENCY_BUCKETS)
    }

    pub fn with_buckets(boundaries: &[f64]) -> Self {
        let buckets = (0..=boundaries.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            boundaries: boundaries.to_vec(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value: f64) {
        let bucket_idx = self
            .boundaries
            .iter()
            .position(|&boundary| value <= boundary)
            .unwrap_or(self.boundaries.len());

        self.buckets[bucket_idx].fetch_add(1, Ordering::Relaxed);
        // Stored as microseconds
        self.sum
            .fetch_add((value * 1000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Cumulative `(le, count)` pairs, ending with `+Inf`
    pub fn get_buckets(&self) -> Vec<(f64, u64)> {
        let mut cumulative = 0u64;
        let mut result = Vec::with_capacity(self.boundaries.len() + 1);

        for (i, &boundary) in self.boundaries.iter().enumerate() {
            cumulative += self.buckets[i].load(Ordering::Relaxed);
            result.push((boundary, cumulative));
        }

        cumulative += self.buckets[self.boundaries.len()].load(Ordering::Relaxed);
        result.push((f64::INFINITY, cumulative));

        result
    }

    pub fn sum(&self) -> f64 {
        self.sum.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Saturates at zero
    pub fn dec(&self) {
        let _ = self
            .value
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Global metrics registry
#[derive(Debug)]
pub struct MetricsRegistry {
    pub cache_hits: Counter,
    pub origin_fetches: Counter,
    /// Times a lookup found the key already claimed and backed off
    pub claim_conflicts: Counter,
    /// Fetches whose set-if-absent found the key already written
    pub lost_writes: Counter,
    pub store_errors: Counter,

    pub fanout_batches: Counter,
    pub transport_failures: Counter,

    /// Claims currently held by this process
    pub in_flight: Gauge,

    pub resolve_latency: Histogram,

    start_time: Instant,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            cache_hits: Counter::new(),
            origin_fetches: Counter::new(),
            claim_conflicts: Counter::new(),
            lost_writes: Counter::new(),
            store_errors: Counter::new(),
            fanout_batches: Counter::new(),
            transport_failures: Counter::new(),
            in_flight: Gauge::new(),
            resolve_latency: Histogram::new(),
            start_time: Instant::now(),
        }
    }

    pub fn record_resolve(&self, duration: Duration) {
        self.resolve_latency
            .observe(duration.as_secs_f64() * 1000.0);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-compatible metrics output
    pub fn to_prometheus(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();

        let counters = [
            ("stampede_cache_hits_total", "Lookups served from the shared cache", &self.cache_hits),
            ("stampede_origin_fetches_total", "Origin fetches performed", &self.origin_fetches),
            ("stampede_claim_conflicts_total", "Backoffs due to a key already in flight", &self.claim_conflicts),
            ("stampede_lost_writes_total", "Cache writes skipped because the key was already set", &self.lost_writes),
            ("stampede_store_errors_total", "Shared store failures", &self.store_errors),
            ("stampede_fanout_batches_total", "Fan-out batches started", &self.fanout_batches),
            ("stampede_transport_failures_total", "Fan-out batches aborted by a closed output", &self.transport_failures),
        ];
        for (name, help, counter) in counters {
            let _ = writeln!(out, "# HELP {} {}", name, help);
            let _ = writeln!(out, "# TYPE {} counter", name);
            let _ = writeln!(out, "{} {}", name, counter.get());
        }

        out.push_str("# HELP stampede_in_flight Claims currently held by this process\n");
        out.push_str("# TYPE stampede_in_flight gauge\n");
        let _ = writeln!(out, "stampede_in_flight {}", self.in_flight.get());

        out.push_str("# HELP stampede_uptime_seconds Server uptime in seconds\n");
        out.push_str("# TYPE stampede_uptime_seconds gauge\n");
        let _ = writeln!(out, "stampede_uptime_seconds {}", self.uptime_seconds());

        out.push_str("# HELP stampede_resolve_duration_ms Lookup duration in milliseconds\n");
        out.push_str("# TYPE stampede_resolve_duration_ms histogram\n");
        for (le, count) in self.resolve_latency.get_buckets() {
            if le.is_infinite() {
                let _ = writeln!(out, "stampede_resolve_duration_ms_bucket{{le=\"+Inf\"}} {}", count);
            } else {
                let _ = writeln!(out, "stampede_resolve_duration_ms_bucket{{le=\"{}\"}} {}", le, count);
            }
        }
        let _ = writeln!(out, "stampede_resolve_duration_ms_sum {}", self.resolve_latency.sum());
        let _ = writeln!(out, "stampede_resolve_duration_ms_count {}", self.resolve_latency.count());

        out
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Global metrics instance
pub static METRICS: once_cell::sync::Lazy<MetricsRegistry> =
    once_cell::sync::Lazy::new(MetricsRegistry::new);
