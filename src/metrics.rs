//! Metrics collection and export module

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};
use std::time::Instant;

use crate::pipeline::TxOutcome;

/// Flow metrics, registered once per process
pub struct Metrics {
    registry: Registry,

    // Counters
    pub submissions: IntCounter,
    pub confirmation_polls: IntCounter,
    pub resigns: IntCounter,
    pub table_extensions: IntCounter,
    pub records_written: IntCounter,

    // Terminal outcomes
    pub outcomes_confirmed: IntCounter,
    pub outcomes_failed: IntCounter,
    pub outcomes_expired: IntCounter,
    pub outcomes_timeout: IntCounter,

    // Histograms
    pub build_latency: Histogram,
    pub confirmation_latency: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("lut_flow".to_string()), None)?;

        let submissions = IntCounter::with_opts(Opts::new(
            "submissions_total",
            "Transactions accepted by the RPC node",
        ))?;

        let confirmation_polls = IntCounter::with_opts(Opts::new(
            "confirmation_polls_total",
            "Signature status polls issued",
        ))?;

        let resigns = IntCounter::with_opts(Opts::new(
            "resigns_total",
            "Re-signs against a fresh blockhash after expiry",
        ))?;

        let table_extensions = IntCounter::with_opts(Opts::new(
            "table_extensions_total",
            "Confirmed lookup table extend batches",
        ))?;

        let records_written = IntCounter::with_opts(Opts::new(
            "records_written_total",
            "Parsed transaction records persisted",
        ))?;

        let outcome = |status: &str| {
            IntCounter::with_opts(
                Opts::new("outcomes_total", "Terminal transaction outcomes")
                    .const_label("status", status),
            )
        };
        let outcomes_confirmed = outcome("confirmed")?;
        let outcomes_failed = outcome("failed")?;
        let outcomes_expired = outcome("expired")?;
        let outcomes_timeout = outcome("timeout")?;

        let build_latency = Histogram::with_opts(
            HistogramOpts::new("build_latency_seconds", "Compile and sign latency")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05]),
        )?;

        let confirmation_latency = Histogram::with_opts(
            HistogramOpts::new(
                "confirmation_latency_seconds",
                "Submit to terminal outcome latency",
            )
            .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 90.0]),
        )?;

        registry.register(Box::new(submissions.clone()))?;
        registry.register(Box::new(confirmation_polls.clone()))?;
        registry.register(Box::new(resigns.clone()))?;
        registry.register(Box::new(table_extensions.clone()))?;
        registry.register(Box::new(records_written.clone()))?;
        registry.register(Box::new(outcomes_confirmed.clone()))?;
        registry.register(Box::new(outcomes_failed.clone()))?;
        registry.register(Box::new(outcomes_expired.clone()))?;
        registry.register(Box::new(outcomes_timeout.clone()))?;
        registry.register(Box::new(build_latency.clone()))?;
        registry.register(Box::new(confirmation_latency.clone()))?;

        Ok(Self {
            registry,
            submissions,
            confirmation_polls,
            resigns,
            table_extensions,
            records_written,
            outcomes_confirmed,
            outcomes_failed,
            outcomes_expired,
            outcomes_timeout,
            build_latency,
            confirmation_latency,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_outcome(&self, outcome: &TxOutcome) {
        match outcome {
            TxOutcome::Confirmed { .. } => self.outcomes_confirmed.inc(),
            TxOutcome::Failed { .. } => self.outcomes_failed.inc(),
            TxOutcome::Expired { .. } => self.outcomes_expired.inc(),
            TxOutcome::Timeout { .. } => self.outcomes_timeout.inc(),
        }
    }

    /// Prometheus text exposition of everything registered
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Global metrics instance.
///
/// Registration only fails on duplicate names, which `Metrics::new` never
/// produces against its own fresh registry.
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> = once_cell::sync::Lazy::new(|| {
        Metrics::new().unwrap_or_else(|e| panic!("metric registration failed: {}", e))
    });
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.elapsed_secs());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
