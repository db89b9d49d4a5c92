//! Metrics sink for the update protocol
//!
//! A single [`MetricsRegistry`] is built at start-up with the standard
//! per-source counters and gauges and handed to every component through an
//! `Arc`. Callers look metrics up by name; a missing metric is skipped
//! silently because metrics never decide correctness.

use std::collections::HashMap;
use std::path::Path;

use prometheus::{Encoder, Gauge, IntCounter, Opts, Registry, TextEncoder};
use tracing::{debug, warn};

/// Counter suffixes registered for each source
const COUNTERS: &[(&str, &str)] = &[
    ("check_count", "Number of times an update check ran"),
    ("download_count", "Number of completed archive downloads"),
    ("download_failures", "Number of failed archive downloads"),
    ("backup_count", "Number of verified backups taken"),
    ("backup_failures", "Number of failed backups"),
];

/// Gauge suffixes registered for each source
const GAUGES: &[(&str, &str)] = &[
    ("last_download_size_bytes", "Size of the last download in bytes"),
    ("last_download_time_seconds", "Duration of the last download in seconds"),
    ("backup_last_size_bytes", "Size of the last backup in bytes"),
    ("backup_last_time_seconds", "Duration of the last backup in seconds"),
];

/// A registered metric
#[derive(Debug, Clone)]
pub enum Metric {
    Counter(IntCounter),
    Gauge(Gauge),
}

/// Name-addressable registry of counters and gauges
#[derive(Debug)]
pub struct MetricsRegistry {
    registry: Registry,
    metrics: HashMap<String, Metric>,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            metrics: HashMap::new(),
        }
    }

    /// Create a registry with the standard metrics of every named source
    pub fn for_sources<I, S>(source_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = Self::new();
        for name in source_names {
            registry.register_source(name.as_ref());
        }
        registry
    }

    /// Register the standard counters and gauges of one source
    pub fn register_source(&mut self, source_name: &str) {
        for (suffix, help) in COUNTERS {
            self.create_counter(&metric_name(source_name, suffix), help);
        }
        for (suffix, help) in GAUGES {
            self.create_gauge(&metric_name(source_name, suffix), help);
        }
    }

    /// Create and register a counter, returning the existing one on repeat calls
    pub fn create_counter(&mut self, name: &str, help: &str) -> Option<Metric> {
        if let Some(existing) = self.metrics.get(name) {
            return Some(existing.clone());
        }
        let counter = IntCounter::with_opts(Opts::new(name, help))
            .and_then(|c| self.registry.register(Box::new(c.clone())).map(|_| c));
        match counter {
            Ok(counter) => {
                debug!("Created counter: {}", name);
                let metric = Metric::Counter(counter);
                self.metrics.insert(name.to_string(), metric.clone());
                Some(metric)
            }
            Err(e) => {
                warn!("Failed to register counter {}: {}", name, e);
                None
            }
        }
    }

    /// Create and register a gauge, returning the existing one on repeat calls
    pub fn create_gauge(&mut self, name: &str, help: &str) -> Option<Metric> {
        if let Some(existing) = self.metrics.get(name) {
            return Some(existing.clone());
        }
        let gauge = Gauge::with_opts(Opts::new(name, help))
            .and_then(|g| self.registry.register(Box::new(g.clone())).map(|_| g));
        match gauge {
            Ok(gauge) => {
                debug!("Created gauge: {}", name);
                let metric = Metric::Gauge(gauge);
                self.metrics.insert(name.to_string(), metric.clone());
                Some(metric)
            }
            Err(e) => {
                warn!("Failed to register gauge {}: {}", name, e);
                None
            }
        }
    }

    /// Look up a metric by full name
    pub fn get_metric(&self, name: &str) -> Option<&Metric> {
        let metric = self.metrics.get(name);
        if metric.is_none() {
            debug!("Metric not found: {}", name);
        }
        metric
    }

    /// Increment a counter; absent or non-counter metrics are skipped
    pub fn increment(&self, name: &str) {
        if let Some(Metric::Counter(counter)) = self.get_metric(name) {
            counter.inc();
        }
    }

    /// Set a gauge; absent or non-gauge metrics are skipped
    pub fn set_gauge(&self, name: &str, value: f64) {
        if let Some(Metric::Gauge(gauge)) = self.get_metric(name) {
            gauge.set(value);
        }
    }

    /// Current counter value, if the counter exists
    pub fn counter_value(&self, name: &str) -> Option<u64> {
        match self.metrics.get(name) {
            Some(Metric::Counter(counter)) => Some(counter.get()),
            _ => None,
        }
    }

    /// Current gauge value, if the gauge exists
    pub fn gauge_value(&self, name: &str) -> Option<f64> {
        match self.metrics.get(name) {
            Some(Metric::Gauge(gauge)) => Some(gauge.get()),
            _ => None,
        }
    }

    /// Prometheus text exposition of every registered metric
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            warn!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Write the text exposition to a file, creating parent directories
    pub async fn write_textfile(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, self.render()).await
    }
}

/// Full metric name for a source, sanitised to the Prometheus alphabet
pub fn metric_name(source_name: &str, suffix: &str) -> String {
    let mut prefix: String = source_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if prefix.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        prefix.insert(0, '_');
    }
    format!("{}_{}", prefix, suffix)
}

/// Metric names of one source, resolved once per component
#[derive(Debug, Clone)]
pub struct SourceMetricNames {
    pub check_count: String,
    pub download_count: String,
    pub download_failures: String,
    pub last_download_size_bytes: String,
    pub last_download_time_seconds: String,
    pub backup_count: String,
    pub backup_failures: String,
    pub backup_last_size_bytes: String,
    pub backup_last_time_seconds: String,
}

impl SourceMetricNames {
    pub fn new(source_name: &str) -> Self {
        Self {
            check_count: metric_name(source_name, "check_count"),
            download_count: metric_name(source_name, "download_count"),
            download_failures: metric_name(source_name, "download_failures"),
            last_download_size_bytes: metric_name(source_name, "last_download_size_bytes"),
            last_download_time_seconds: metric_name(source_name, "last_download_time_seconds"),
            backup_count: metric_name(source_name, "backup_count"),
            backup_failures: metric_name(source_name, "backup_failures"),
            backup_last_size_bytes: metric_name(source_name, "backup_last_size_bytes"),
            backup_last_time_seconds: metric_name(source_name, "backup_last_time_seconds"),
        }
    }
}
