//! Brake on repeated key set fetches.

// crates.io
use tokio::sync::Mutex;
// self
use crate::_prelude::*;

/// Attempts tolerated inside the cool-down window before fetches are refused.
pub const KEY_FETCH_ATTEMPT_THRESHOLD: u32 = 3;
/// Window, measured from the last attempt, during which excess fetches are refused.
pub const KEY_FETCH_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// Counts key fetch attempts and refuses new ones once the threshold is exceeded.
///
/// The check, optional reset, increment, and timestamp happen under one lock so concurrent
/// callers cannot both slip past the limit.
#[derive(Debug, Default)]
pub struct KeyFetchLimiter {
	state: Mutex<LimiterState>,
}
impl KeyFetchLimiter {
	/// Create a limiter with no recorded attempts.
	pub fn new() -> Self {
		Self::default()
	}

	/// Record an attempt at `now`, returning the attempt count inside the current window.
	///
	/// Fails with [`Error::TooManyAttempts`] without recording anything when the threshold
	/// has been exceeded and the cool-down window has not yet elapsed.
	pub async fn try_acquire(&self, now: Instant) -> Result<u32> {
		let mut state = self.state.lock().await;

		if state.attempts > KEY_FETCH_ATTEMPT_THRESHOLD {
			if let Some(last) = state.last_attempt
				&& now.saturating_duration_since(last) < KEY_FETCH_COOLDOWN
			{
				return Err(Error::TooManyAttempts);
			}

			state.attempts = 0;
		}

		state.attempts += 1;
		state.last_attempt = Some(now);

		Ok(state.attempts)
	}

	/// Attempts recorded in the current window.
	pub async fn attempts(&self) -> u32 {
		self.state.lock().await.attempts
	}
}

#[derive(Debug, Default)]
struct LimiterState {
	attempts: u32,
	last_attempt: Option<Instant>,
}
