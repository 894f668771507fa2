//! Engine metrics and tracing helpers.
//!
//! The `metrics` feature guards a process-wide set of atomic counters around
//! statement building and execution; there is no exporter, consumers read
//! the counters. The `tracing` feature adds span helpers used at the
//! execute/begin/commit/rollback call sites.

#[cfg(feature = "metrics")]
pub use counters::METRICS;

#[cfg(feature = "metrics")]
mod counters {
    use once_cell::sync::Lazy;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    pub static METRICS: Lazy<EngineMetrics> = Lazy::new(EngineMetrics::default);

    #[derive(Default)]
    pub struct EngineMetrics {
        statements_executed: AtomicU64,
        execution_errors: AtomicU64,
        cancellations: AtomicU64,
        execution_nanos: AtomicU64,
    }

    impl EngineMetrics {
        pub fn record_executed(&self, elapsed: Duration) {
            self.statements_executed.fetch_add(1, Ordering::Relaxed);
            self.execution_nanos
                .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        }

        pub fn record_execution_error(&self) {
            self.execution_errors.fetch_add(1, Ordering::Relaxed);
        }

        pub fn record_cancelled(&self) {
            self.cancellations.fetch_add(1, Ordering::Relaxed);
        }

        pub fn statements_executed(&self) -> u64 {
            self.statements_executed.load(Ordering::Relaxed)
        }

        pub fn execution_errors(&self) -> u64 {
            self.execution_errors.load(Ordering::Relaxed)
        }

        pub fn cancellations(&self) -> u64 {
            self.cancellations.load(Ordering::Relaxed)
        }

        pub fn execution_time(&self) -> Duration {
            Duration::from_nanos(self.execution_nanos.load(Ordering::Relaxed))
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::Span;

    pub fn execute_statement_span(sql: &str) -> Span {
        tracing::debug_span!("execute_statement", sql = sql)
    }

    pub fn begin_transaction_span() -> Span {
        tracing::debug_span!("begin_transaction")
    }

    pub fn commit_transaction_span() -> Span {
        tracing::debug_span!("commit_transaction")
    }

    pub fn rollback_transaction_span() -> Span {
        tracing::debug_span!("rollback_transaction")
    }
}
