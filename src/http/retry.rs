//! Retry utilities for acquisition requests.

// std
use std::future::Future;
// crates.io
use tokio::time;
// self
use crate::_prelude::*;

/// Fixed-interval retry configuration for metadata and key acquisition.
///
/// Attempts are strictly sequential and separated by the same interval; there is no
/// exponential growth and no jitter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryPolicy {
	attempts: u32,
	interval: Duration,
}
impl RetryPolicy {
	/// Create a policy from the configured attempt count and interval.
	pub fn new(attempts: u32, interval: Duration) -> Self {
		Self { attempts, interval }
	}

	/// Total number of attempts, always at least one.
	pub fn max_attempts(&self) -> u32 {
		self.attempts.max(1)
	}

	/// Delay between failed attempts.
	pub fn interval(&self) -> Duration {
		self.interval
	}

	/// Run `operation` until it succeeds or the attempts are exhausted.
	///
	/// The closure receives the zero-based attempt index. The last failure is returned as is.
	pub async fn run<T, F, Fut>(&self, label: &'static str, mut operation: F) -> Result<T>
	where
		F: FnMut(u32) -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let mut executor = RetryExecutor::new(self);
		let mut last_err = None;

		while let Some(attempt) = executor.begin_attempt() {
			match operation(attempt).await {
				Ok(value) => return Ok(value),
				Err(err) => {
					tracing::debug!(operation = label, attempt, error = %err, "attempt failed");

					last_err = Some(err);

					executor.sleep_interval().await;
				},
			}
		}

		Err(last_err.unwrap_or_else(|| Error::Validation {
			field: "retry_attempts",
			reason: "No attempt was made.".into(),
		}))
	}
}

/// Tracks attempts consumed under a [`RetryPolicy`].
#[derive(Debug)]
pub struct RetryExecutor<'a> {
	policy: &'a RetryPolicy,
	attempts_used: u32,
}
impl<'a> RetryExecutor<'a> {
	/// Create a new executor respecting the supplied retry policy.
	pub fn new(policy: &'a RetryPolicy) -> Self {
		Self { policy, attempts_used: 0 }
	}

	/// Claim the next attempt, returning its zero-based index, or `None` once exhausted.
	pub fn begin_attempt(&mut self) -> Option<u32> {
		if self.attempts_used >= self.policy.max_attempts() {
			return None;
		}

		let attempt = self.attempts_used;

		self.attempts_used += 1;

		Some(attempt)
	}

	/// Whether another attempt is permitted under the policy.
	pub fn can_retry(&self) -> bool {
		self.attempts_used < self.policy.max_attempts()
	}

	/// Number of attempts that have already been consumed.
	pub fn attempts_used(&self) -> u32 {
		self.attempts_used
	}

	/// Sleep for the fixed interval if another attempt is permitted.
	pub async fn sleep_interval(&self) {
		if !self.can_retry() {
			tracing::debug!(attempt = self.attempts_used, "retry budget exhausted");

			return;
		}

		let delay = self.policy.interval;

		tracing::debug!(attempt = self.attempts_used, ?delay, "waiting before next attempt");

		if !delay.is_zero() {
			time::sleep(delay).await;
		}
	}
}
