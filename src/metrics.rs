use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::Error;
use crate::response::Payload;
use crate::util::lock_unpoisoned;

#[derive(Clone, Debug)]
pub struct ClientMetricsSnapshot {
    pub requests_started: u64,
    pub requests_succeeded: u64,
    pub requests_failed: u64,
    pub deduplicated: u64,
    pub dispatches: u64,
    pub refresh_attempts: u64,
    pub refresh_failures: u64,
    pub auth_retries: u64,
    pub auth_redirects: u64,
    pub timeouts: u64,
    pub network_errors: u64,
    pub http_status_errors: u64,
    pub unauthorized: u64,
    pub no_content: u64,
    pub in_flight: u64,
    pub in_flight_entries: u64,
    pub latency_samples: u64,
    pub latency_total_ms: u64,
    pub latency_avg_ms: f64,
    pub error_counts: BTreeMap<String, u64>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct ClientMetrics {
    inner: Arc<ClientMetricsInner>,
}

#[derive(Debug, Default)]
struct ClientMetricsInner {
    requests_started: AtomicU64,
    requests_succeeded: AtomicU64,
    requests_failed: AtomicU64,
    deduplicated: AtomicU64,
    dispatches: AtomicU64,
    refresh_attempts: AtomicU64,
    refresh_failures: AtomicU64,
    auth_retries: AtomicU64,
    auth_redirects: AtomicU64,
    timeouts: AtomicU64,
    network_errors: AtomicU64,
    http_status_errors: AtomicU64,
    unauthorized: AtomicU64,
    no_content: AtomicU64,
    in_flight: AtomicU64,
    latency_total_ms: AtomicU64,
    latency_samples: AtomicU64,
    error_counts: Mutex<BTreeMap<String, u64>>,
}

pub(crate) struct InFlightGuard {
    metrics: ClientMetrics,
}

impl ClientMetrics {
    pub(crate) fn record_request_started(&self) {
        self.inner.requests_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn enter_in_flight(&self) -> InFlightGuard {
        self.inner.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            metrics: self.clone(),
        }
    }

    pub(crate) fn record_deduplicated(&self) {
        self.inner.deduplicated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatch(&self) {
        self.inner.dispatches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_refresh_attempt(&self) {
        self.inner.refresh_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_refresh_failure(&self) {
        self.inner.refresh_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_auth_retry(&self) {
        self.inner.auth_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_auth_redirect(&self) {
        self.inner.auth_redirects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_request_completed(&self, result: &Result<Payload, Error>, latency: Duration) {
        self.record_latency(latency);
        match result {
            Ok(payload) => {
                self.inner
                    .requests_succeeded
                    .fetch_add(1, Ordering::Relaxed);
                if payload.is_no_content() {
                    self.inner.no_content.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(error) => self.record_request_failed(error),
        }
    }

    fn record_request_failed(&self, error: &Error) {
        self.inner.requests_failed.fetch_add(1, Ordering::Relaxed);
        match error {
            Error::Timeout { .. } => {
                self.inner.timeouts.fetch_add(1, Ordering::Relaxed);
            }
            Error::Network { kind, .. } => {
                self.inner.network_errors.fetch_add(1, Ordering::Relaxed);
                self.add_error_count(format!("network:{kind}"));
                return;
            }
            Error::Http { status, .. } => {
                self.inner
                    .http_status_errors
                    .fetch_add(1, Ordering::Relaxed);
                self.add_error_count(format!("http_status:{status}"));
                return;
            }
            Error::Unauthorized { .. } => {
                self.inner.unauthorized.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
        self.add_error_count(error.code().as_str().to_owned());
    }

    pub(crate) fn snapshot(&self, in_flight_entries: usize) -> ClientMetricsSnapshot {
        let latency_samples = self.inner.latency_samples.load(Ordering::Relaxed);
        let latency_total_ms = self.inner.latency_total_ms.load(Ordering::Relaxed);
        let latency_avg_ms = if latency_samples == 0 {
            0.0
        } else {
            latency_total_ms as f64 / latency_samples as f64
        };

        ClientMetricsSnapshot {
            requests_started: self.inner.requests_started.load(Ordering::Relaxed),
            requests_succeeded: self.inner.requests_succeeded.load(Ordering::Relaxed),
            requests_failed: self.inner.requests_failed.load(Ordering::Relaxed),
            deduplicated: self.inner.deduplicated.load(Ordering::Relaxed),
            dispatches: self.inner.dispatches.load(Ordering::Relaxed),
            refresh_attempts: self.inner.refresh_attempts.load(Ordering::Relaxed),
            refresh_failures: self.inner.refresh_failures.load(Ordering::Relaxed),
            auth_retries: self.inner.auth_retries.load(Ordering::Relaxed),
            auth_redirects: self.inner.auth_redirects.load(Ordering::Relaxed),
            timeouts: self.inner.timeouts.load(Ordering::Relaxed),
            network_errors: self.inner.network_errors.load(Ordering::Relaxed),
            http_status_errors: self.inner.http_status_errors.load(Ordering::Relaxed),
            unauthorized: self.inner.unauthorized.load(Ordering::Relaxed),
            no_content: self.inner.no_content.load(Ordering::Relaxed),
            in_flight: self.inner.in_flight.load(Ordering::Relaxed),
            in_flight_entries: in_flight_entries as u64,
            latency_samples,
            latency_total_ms,
            latency_avg_ms,
            error_counts: lock_unpoisoned(&self.inner.error_counts).clone(),
        }
    }

    fn record_latency(&self, latency: Duration) {
        self.inner.latency_samples.fetch_add(1, Ordering::Relaxed);
        self.inner.latency_total_ms.fetch_add(
            latency.as_millis().min(u64::MAX as u128) as u64,
            Ordering::Relaxed,
        );
    }

    fn add_error_count(&self, error_key: String) {
        let mut error_counts = lock_unpoisoned(&self.inner.error_counts);
        *error_counts.entry(error_key).or_insert(0) += 1;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.metrics.inner.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}
