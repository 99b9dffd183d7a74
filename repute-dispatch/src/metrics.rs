//! Dispatch counters
//!
//! Every counter is an OpenTelemetry instrument on the `repute.dispatch`
//! meter. Nothing is exported unless the process installs a meter provider
//! before the worker pool is built. A local mirror backs
//! [`DispatchMetrics::snapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

use opentelemetry::{
    KeyValue,
    metrics::{Counter, Meter},
};

/// Point-in-time copy of the dispatch counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub sent_emails_total: u64,
    pub failed_attempts_total: u64,
    pub retried_total: u64,
    pub dead_lettered_total: u64,
}

#[derive(Debug, Default)]
struct Mirror {
    sent: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
}

#[derive(Debug)]
pub struct DispatchMetrics {
    /// Emails the gateway accepted, by sending subdomain
    sent_emails: Counter<u64>,

    /// Attempts the gateway rejected or timed out, by sending subdomain
    failed_attempts: Counter<u64>,

    /// Tasks handed back to the broker for another attempt
    retried: Counter<u64>,

    /// Tasks abandoned after a permanent failure or an exhausted budget
    dead_lettered: Counter<u64>,

    mirror: Mirror,
}

impl Default for DispatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchMetrics {
    #[must_use]
    pub fn new() -> Self {
        let meter = meter();

        Self {
            sent_emails: meter
                .u64_counter("repute.dispatch.sent_emails.total")
                .with_description("Emails successfully handed to the gateway")
                .build(),
            failed_attempts: meter
                .u64_counter("repute.dispatch.failed_attempts.total")
                .with_description("Dispatch attempts that failed transmission")
                .build(),
            retried: meter
                .u64_counter("repute.dispatch.retried.total")
                .with_description("Jobs handed back to the queue for another attempt")
                .build(),
            dead_lettered: meter
                .u64_counter("repute.dispatch.dead_lettered.total")
                .with_description("Jobs abandoned after a permanent failure or exhausted retries")
                .build(),
            mirror: Mirror::default(),
        }
    }

    pub fn record_sent(&self, subdomain: &str) {
        self.sent_emails
            .add(1, &[KeyValue::new("subdomain", subdomain.to_string())]);
        self.mirror.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_attempt(&self, subdomain: &str) {
        self.failed_attempts
            .add(1, &[KeyValue::new("subdomain", subdomain.to_string())]);
        self.mirror.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retried.add(1, &[]);
        self.mirror.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_letter(&self) {
        self.dead_lettered.add(1, &[]);
        self.mirror.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sent_emails_total: self.mirror.sent.load(Ordering::Relaxed),
            failed_attempts_total: self.mirror.failed.load(Ordering::Relaxed),
            retried_total: self.mirror.retried.load(Ordering::Relaxed),
            dead_lettered_total: self.mirror.dead_lettered.load(Ordering::Relaxed),
        }
    }
}

fn meter() -> Meter {
    opentelemetry::global::meter("repute.dispatch")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = DispatchMetrics::new();
        metrics.record_sent("mail1.example.com");
        metrics.record_sent("mail2.example.com");
        metrics.record_failed_attempt("mail1.example.com");
        metrics.record_dead_letter();

        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                sent_emails_total: 2,
                failed_attempts_total: 1,
                retried_total: 0,
                dead_lettered_total: 1,
            }
        );
    }

    #[test]
    fn instances_count_independently() {
        let first = DispatchMetrics::new();
        let second = DispatchMetrics::default();
        first.record_retry();

        assert_eq!(first.snapshot().retried_total, 1);
        assert_eq!(second.snapshot(), MetricsSnapshot::default());
    }
}
