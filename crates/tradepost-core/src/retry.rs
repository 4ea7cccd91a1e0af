//! Retry policy for transient storage faults.
//!
//! Backend faults (I/O, network) are retried with exponential backoff;
//! everything else a storage call can return describes a stable fact
//! about the data (missing document, violated guard, bad payload) and is
//! surfaced immediately.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use std::future::Future;
use std::time::Duration;
use tracing::warn;
use tradepost_config::EngineConfig;
use tradepost_storage::StorageError;

/// How many times and how fast to retry a failing storage call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
	/// Retries after the initial attempt.
	pub max_retries: u32,
	/// Delay before the first retry; later retries back off from here.
	pub base_delay: Duration,
}

impl RetryPolicy {
	pub fn from_config(config: &EngineConfig) -> Self {
		Self {
			max_retries: config.max_retries,
			base_delay: Duration::from_millis(config.retry_base_ms),
		}
	}

	/// A policy that never retries.
	pub fn none() -> Self {
		Self {
			max_retries: 0,
			base_delay: Duration::from_millis(1),
		}
	}
}

fn is_transient(error: &StorageError) -> bool {
	matches!(error, StorageError::Backend(_))
}

/// Runs a storage operation, retrying transient failures per the policy.
///
/// The operation closure is re-invoked from scratch on each attempt, so
/// it must rebuild any consumed state (such as a write batch) itself.
pub async fn with_retries<T, F, Fut>(
	policy: &RetryPolicy,
	label: &str,
	mut operation: F,
) -> Result<T, StorageError>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, StorageError>>,
{
	let mut schedule = ExponentialBackoffBuilder::new()
		.with_initial_interval(policy.base_delay)
		.with_max_elapsed_time(None)
		.build();
	let mut attempt = 0u32;

	loop {
		match operation().await {
			Ok(value) => return Ok(value),
			Err(error) if is_transient(&error) && attempt < policy.max_retries => {
				attempt += 1;
				let delay = schedule.next_backoff().unwrap_or(policy.base_delay);
				warn!(
					operation = label,
					attempt = attempt,
					max_retries = policy.max_retries,
					delay_ms = delay.as_millis() as u64,
					error = %error,
					"transient storage failure, retrying"
				);
				tokio::time::sleep(delay).await;
			},
			Err(error) => return Err(error),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};
	use std::sync::Arc;

	fn fast_policy(max_retries: u32) -> RetryPolicy {
		RetryPolicy {
			max_retries,
			base_delay: Duration::from_millis(1),
		}
	}

	#[tokio::test]
	async fn test_succeeds_after_transient_failures() {
		let calls = Arc::new(AtomicU32::new(0));
		let calls_ref = calls.clone();
		let result = with_retries(&fast_policy(3), "flaky", move || {
			let calls = calls_ref.clone();
			async move {
				if calls.fetch_add(1, Ordering::SeqCst) < 2 {
					Err(StorageError::Backend("connection reset".to_string()))
				} else {
					Ok(42)
				}
			}
		})
		.await;
		assert_eq!(result.unwrap(), 42);
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn test_gives_up_after_max_retries() {
		let calls = Arc::new(AtomicU32::new(0));
		let calls_ref = calls.clone();
		let result: Result<(), _> = with_retries(&fast_policy(2), "down", move || {
			let calls = calls_ref.clone();
			async move {
				calls.fetch_add(1, Ordering::SeqCst);
				Err(StorageError::Backend("still down".to_string()))
			}
		})
		.await;
		assert!(matches!(result, Err(StorageError::Backend(_))));
		// Initial attempt plus two retries.
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn test_permanent_errors_are_not_retried() {
		let calls = Arc::new(AtomicU32::new(0));
		let calls_ref = calls.clone();
		let result: Result<(), _> = with_retries(&fast_policy(5), "missing", move || {
			let calls = calls_ref.clone();
			async move {
				calls.fetch_add(1, Ordering::SeqCst);
				Err(StorageError::NotFound)
			}
		})
		.await;
		assert!(matches!(result, Err(StorageError::NotFound)));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_guard_violations_are_not_retried() {
		let calls = Arc::new(AtomicU32::new(0));
		let calls_ref = calls.clone();
		let result: Result<(), _> = with_retries(&fast_policy(5), "guarded", move || {
			let calls = calls_ref.clone();
			async move {
				calls.fetch_add(1, Ordering::SeqCst);
				Err(StorageError::PreconditionFailed {
					key: "orders:ORD-1".to_string(),
					reason: "key already exists".to_string(),
				})
			}
		})
		.await;
		assert!(matches!(
			result,
			Err(StorageError::PreconditionFailed { .. })
		));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}
}
