use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Counters for session checks, logouts and storage failures.
#[derive(Clone)]
pub struct SessionMetrics {
    registry: Registry,
    checks: IntCounterVec,
    logouts: IntCounterVec,
    storage_failures: IntCounter,
}

impl SessionMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let checks = IntCounterVec::new(
            Opts::new(
                "session_checks_total",
                "Count of session authorization checks grouped by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(checks.clone()))?;

        let logouts = IntCounterVec::new(
            Opts::new("session_logouts_total", "Count of logouts grouped by reason"),
            &["reason"],
        )?;
        registry.register(Box::new(logouts.clone()))?;

        let storage_failures = IntCounter::new(
            "session_storage_failures_total",
            "Token storage operations that failed and were treated as absent",
        )?;
        registry.register(Box::new(storage_failures.clone()))?;

        Ok(Self {
            registry,
            checks,
            logouts,
            storage_failures,
        })
    }

    pub fn check(&self, outcome: &str) {
        self.checks.with_label_values(&[outcome]).inc();
    }

    pub fn logout(&self, reason: &str) {
        self.logouts.with_label_values(&[reason]).inc();
    }

    pub fn storage_failure(&self) {
        self.storage_failures.inc();
    }

    pub fn checks_for(&self, outcome: &str) -> u64 {
        self.checks.with_label_values(&[outcome]).get()
    }

    pub fn logouts_for(&self, reason: &str) -> u64 {
        self.logouts.with_label_values(&[reason]).get()
    }

    pub fn storage_failures(&self) -> u64 {
        self.storage_failures.get()
    }

    /// Text exposition of every registered counter.
    pub fn render(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
