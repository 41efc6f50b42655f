//! Per-backend acquisition telemetry, optionally forwarded to the `metrics` facade.

// std
#[cfg(feature = "prometheus")] use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
// self
use crate::_prelude::*;

#[cfg(feature = "metrics")]
const METRIC_METADATA_ATTEMPTS: &str = "oauth2_backend_metadata_attempts_total";
#[cfg(feature = "metrics")]
const METRIC_METADATA_ERRORS: &str = "oauth2_backend_metadata_errors_total";
#[cfg(feature = "metrics")]
const METRIC_KEY_FETCH_TOTAL: &str = "oauth2_backend_key_fetch_total";
#[cfg(feature = "metrics")]
const METRIC_KEY_FETCH_DURATION: &str = "oauth2_backend_key_fetch_duration_seconds";
#[cfg(feature = "metrics")]
const METRIC_KEYS_HELD: &str = "oauth2_backend_keys_held";

/// Shared Prometheus handle installed by [`install_default_exporter`].
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Thread-safe counters for a single backend.
#[derive(Debug)]
pub struct BackendMetrics {
	backend: String,
	provider: &'static str,
	metadata_attempts: AtomicU64,
	metadata_errors: AtomicU64,
	key_fetch_attempts: AtomicU64,
	key_fetch_rejections: AtomicU64,
	key_fetch_errors: AtomicU64,
	keys_held: AtomicU64,
	last_key_fetch_micros: AtomicU64,
}
impl BackendMetrics {
	/// Create an accumulator labelled with the backend name and provider tag.
	pub fn new(backend: impl Into<String>, provider: &'static str) -> Arc<Self> {
		Arc::new(Self {
			backend: backend.into(),
			provider,
			metadata_attempts: AtomicU64::new(0),
			metadata_errors: AtomicU64::new(0),
			key_fetch_attempts: AtomicU64::new(0),
			key_fetch_rejections: AtomicU64::new(0),
			key_fetch_errors: AtomicU64::new(0),
			keys_held: AtomicU64::new(0),
			last_key_fetch_micros: AtomicU64::new(0),
		})
	}

	/// Backend name used as a label.
	pub fn backend(&self) -> &str {
		&self.backend
	}

	/// Provider tag used as a label.
	pub fn provider(&self) -> &'static str {
		self.provider
	}

	/// Record one metadata fetch attempt and its outcome.
	pub fn record_metadata_attempt(&self, success: bool) {
		self.metadata_attempts.fetch_add(1, Ordering::Relaxed);

		if !success {
			self.metadata_errors.fetch_add(1, Ordering::Relaxed);
		}

		#[cfg(feature = "metrics")]
		{
			metrics::counter!(
				METRIC_METADATA_ATTEMPTS,
				"backend" => self.backend.clone(),
				"provider" => self.provider
			)
			.increment(1);

			if !success {
				metrics::counter!(
					METRIC_METADATA_ERRORS,
					"backend" => self.backend.clone(),
					"provider" => self.provider
				)
				.increment(1);
			}
		}
	}

	/// Record a key fetch that merged successfully, with the resulting store size.
	pub fn record_key_fetch_success(&self, keys_held: usize, duration: Duration) {
		self.key_fetch_attempts.fetch_add(1, Ordering::Relaxed);
		self.keys_held.store(keys_held as u64, Ordering::Relaxed);
		self.last_key_fetch_micros.store(duration.as_micros() as u64, Ordering::Relaxed);

		#[cfg(feature = "metrics")]
		{
			self.key_fetch_counter("success");

			metrics::histogram!(
				METRIC_KEY_FETCH_DURATION,
				"backend" => self.backend.clone(),
				"provider" => self.provider
			)
			.record(duration.as_secs_f64());
			metrics::gauge!(
				METRIC_KEYS_HELD,
				"backend" => self.backend.clone(),
				"provider" => self.provider
			)
			.set(keys_held as f64);
		}
	}

	/// Record a key fetch refused by the rate limiter.
	pub fn record_key_fetch_rejected(&self) {
		self.key_fetch_rejections.fetch_add(1, Ordering::Relaxed);

		#[cfg(feature = "metrics")]
		self.key_fetch_counter("rejected");
	}

	/// Record a key fetch that reached the provider and failed.
	pub fn record_key_fetch_error(&self) {
		self.key_fetch_attempts.fetch_add(1, Ordering::Relaxed);
		self.key_fetch_errors.fetch_add(1, Ordering::Relaxed);

		#[cfg(feature = "metrics")]
		self.key_fetch_counter("error");
	}

	/// Take a point-in-time snapshot for status reporting.
	pub fn snapshot(&self) -> BackendMetricsSnapshot {
		BackendMetricsSnapshot {
			metadata_attempts: self.metadata_attempts.load(Ordering::Relaxed),
			metadata_errors: self.metadata_errors.load(Ordering::Relaxed),
			key_fetch_attempts: self.key_fetch_attempts.load(Ordering::Relaxed),
			key_fetch_rejections: self.key_fetch_rejections.load(Ordering::Relaxed),
			key_fetch_errors: self.key_fetch_errors.load(Ordering::Relaxed),
			keys_held: self.keys_held.load(Ordering::Relaxed),
			last_key_fetch_micros: match self.last_key_fetch_micros.load(Ordering::Relaxed) {
				0 => None,
				value => Some(value),
			},
		}
	}

	#[cfg(feature = "metrics")]
	fn key_fetch_counter(&self, status: &'static str) {
		metrics::counter!(
			METRIC_KEY_FETCH_TOTAL,
			"backend" => self.backend.clone(),
			"provider" => self.provider,
			"status" => status
		)
		.increment(1);
	}
}

/// Read-only snapshot of per-backend counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BackendMetricsSnapshot {
	/// Metadata fetch attempts, including retries.
	pub metadata_attempts: u64,
	/// Metadata fetch attempts that failed.
	pub metadata_errors: u64,
	/// Key fetches that reached the provider.
	pub key_fetch_attempts: u64,
	/// Key fetches refused by the rate limiter.
	pub key_fetch_rejections: u64,
	/// Key fetches that reached the provider and failed.
	pub key_fetch_errors: u64,
	/// Keys held after the most recent successful fetch.
	pub keys_held: u64,
	/// Microsecond latency of the most recent successful key fetch.
	pub last_key_fetch_micros: Option<u64>,
}

/// Install the default Prometheus recorder backed by `metrics`.
///
/// Multiple invocations are safe; subsequent calls become no-ops once the recorder is installed.
#[cfg(feature = "prometheus")]
pub fn install_default_exporter() -> Result<()> {
	if PROMETHEUS_HANDLE.get().is_some() {
		return Ok(());
	}

	let handle = PrometheusBuilder::new()
		.install_recorder()
		.map_err(|err| Error::Metrics(err.to_string()))?;
	let _ = PROMETHEUS_HANDLE.set(handle);

	Ok(())
}

/// Access the global Prometheus exporter handle when installed.
#[cfg(feature = "prometheus")]
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
	PROMETHEUS_HANDLE.get()
}
