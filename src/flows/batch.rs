//! Sequential multi-account refresh with failure isolation and fixed pacing.

// crates.io
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	auth::Account,
	flows::Broker,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Message recorded for successful batch entries.
pub const REFRESHED_MESSAGE: &str = "token refreshed";

/// Pacing and selection rules for [`Broker::refresh_many`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchPolicy {
	/// Pause between two consecutive targets; never applied after the last one.
	pub delay: StdDuration,
	/// Accounts expiring within this window are due for a non-forced refresh.
	pub threshold: Duration,
}
impl BatchPolicy {
	/// Default pause between targets.
	pub const DEFAULT_DELAY: StdDuration = StdDuration::from_millis(500);
	/// Default expiry threshold.
	pub const DEFAULT_THRESHOLD: Duration = Duration::minutes(5);

	/// Overrides the inter-target delay.
	pub fn with_delay(mut self, delay: StdDuration) -> Self {
		self.delay = delay;

		self
	}

	/// Overrides the expiry threshold; negative values clamp to zero.
	pub fn with_threshold(mut self, threshold: Duration) -> Self {
		self.threshold = if threshold.is_negative() { Duration::ZERO } else { threshold };

		self
	}
}
impl Default for BatchPolicy {
	fn default() -> Self {
		Self { delay: Self::DEFAULT_DELAY, threshold: Self::DEFAULT_THRESHOLD }
	}
}

/// Outcome for one account of a batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
	/// Account email.
	pub email: String,
	/// Whether the refresh succeeded.
	pub success: bool,
	/// Human-readable outcome.
	pub message: String,
}

/// Snapshot emitted after each processed account.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress<'a> {
	/// Number of targets processed so far.
	pub current: usize,
	/// Number of targets in the batch.
	pub total: usize,
	/// Email of the account that was just processed.
	pub current_email: &'a str,
	/// Results accumulated so far.
	pub results: &'a [BatchResult],
}

/// Receives [`BatchProgress`] events.
pub trait ProgressSink
where
	Self: Send + Sync,
{
	/// Called once per processed target.
	fn on_progress(&self, progress: &BatchProgress<'_>);
}
impl<F> ProgressSink for F
where
	F: Send + Sync + Fn(&BatchProgress<'_>),
{
	fn on_progress(&self, progress: &BatchProgress<'_>) {
		self(progress)
	}
}

/// Sink that logs progress and nothing else.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogProgress;
impl ProgressSink for LogProgress {
	fn on_progress(&self, progress: &BatchProgress<'_>) {
		tracing::debug!(
			current = progress.current,
			total = progress.total,
			email = progress.current_email,
			"Batch refresh progressed."
		);
	}
}

/// Final batch outcome.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
	/// One entry per processed target, in processing order.
	pub results: Vec<BatchResult>,
	/// Records that were rewritten by a successful refresh.
	pub updated: Vec<Account>,
}

/// Picks the accounts a batch should refresh.
///
/// Forced batches take everything. Otherwise only accounts expiring within `threshold` of
/// `now` (or with no known expiry) are due, and suspended accounts are skipped.
pub fn select_targets(
	accounts: &[Account],
	force_all: bool,
	now: OffsetDateTime,
	threshold: Duration,
) -> Vec<Account> {
	accounts
		.iter()
		.filter(|account| {
			force_all || (!account.status.is_suspended() && account.expires_within(now, threshold))
		})
		.cloned()
		.collect()
}

impl Broker {
	/// Refreshes the due subset of `accounts` one at a time.
	///
	/// Token rotation only; usage is not re-synced. A failing account is recorded and the batch
	/// moves on. Once `shutdown` fires, no further target is started.
	pub async fn refresh_many(
		&self,
		accounts: &[Account],
		force_all: bool,
		progress: &dyn ProgressSink,
		shutdown: &CancellationToken,
	) -> BatchReport {
		const KIND: FlowKind = FlowKind::Batch;

		let span = FlowSpan::new(KIND, "refresh_many");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let report = span
			.instrument(async move {
				let targets = select_targets(
					accounts,
					force_all,
					OffsetDateTime::now_utc(),
					self.batch_policy.threshold,
				);
				let total = targets.len();
				let mut report = BatchReport::default();

				for (idx, account) in targets.into_iter().enumerate() {
					if shutdown.is_cancelled() {
						tracing::info!(processed = idx, total, "Batch refresh cancelled.");

						break;
					}

					let email = account.email.clone();
					let result = match self.refresh_one(account, false).await {
						Ok(updated) => {
							report.updated.push(updated);

							BatchResult { email, success: true, message: REFRESHED_MESSAGE.into() }
						},
						Err(e) => BatchResult { email, success: false, message: e.to_string() },
					};

					report.results.push(result);

					let current_email = report.results[idx].email.as_str();

					progress.on_progress(&BatchProgress {
						current: idx + 1,
						total,
						current_email,
						results: &report.results,
					});

					if idx + 1 < total && !self.batch_policy.delay.is_zero() {
						tokio::select! {
							_ = shutdown.cancelled() => {},
							_ = tokio::time::sleep(self.batch_policy.delay) => {},
						}
					}
				}

				report
			})
			.await;
		let failed = report.results.iter().filter(|result| !result.success).count();

		tracing::info!(
			refreshed = report.updated.len(),
			failed,
			"Batch refresh finished."
		);
		obs::record_flow_outcome(
			KIND,
			if failed == 0 { FlowOutcome::Success } else { FlowOutcome::Failure },
		);

		report
	}

	/// Loads every stored account and runs [`Broker::refresh_many`] over it.
	pub async fn refresh_all(
		&self,
		force_all: bool,
		progress: &dyn ProgressSink,
		shutdown: &CancellationToken,
	) -> Result<BatchReport> {
		let accounts = self.accounts.list().await?;

		Ok(self.refresh_many(&accounts, force_all, progress, shutdown).await)
	}

	/// Runs a non-forced [`Broker::refresh_all`] every `period` until `shutdown` fires.
	///
	/// The first pass starts one full period after the call.
	pub async fn auto_refresh(&self, period: StdDuration, shutdown: &CancellationToken) {
		let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

		ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
		tracing::info!(period_secs = period.as_secs(), "Automatic refresh scheduled.");

		loop {
			tokio::select! {
				_ = shutdown.cancelled() => break,
				_ = ticker.tick() => {},
			}

			if let Err(e) = self.refresh_all(false, &LogProgress, shutdown).await {
				tracing::warn!(error = %e, "Automatic refresh could not load accounts.");
			}
		}

		tracing::info!("Automatic refresh stopped.");
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::{AccountStatus, Provider};

	fn account(email: &str, expires_in: Option<Duration>, now: OffsetDateTime) -> Account {
		let mut account = Account::new(email, Provider::Google);

		account.expires_at = expires_in.map(|window| now + window);

		account
	}

	#[test]
	fn non_forced_batches_target_due_unsuspended_accounts() {
		let now = OffsetDateTime::now_utc();
		let soon = account("soon@b.com", Some(Duration::minutes(2)), now);
		let later = account("later@b.com", Some(Duration::minutes(10)), now);
		let mut banned = account("banned@b.com", Some(Duration::minutes(1)), now);
		let unknown = account("unknown@b.com", None, now);

		banned.status = AccountStatus::Suspended;

		let accounts = [soon.clone(), later, banned, unknown.clone()];
		let targets = select_targets(&accounts, false, now, BatchPolicy::DEFAULT_THRESHOLD);

		assert_eq!(targets.iter().map(|a| a.id.clone()).collect::<Vec<_>>(), [soon.id, unknown.id]);
		assert_eq!(select_targets(&accounts, true, now, BatchPolicy::DEFAULT_THRESHOLD).len(), 4);
	}

	#[test]
	fn policy_defaults_and_overrides() {
		let policy = BatchPolicy::default();

		assert_eq!(policy.delay, StdDuration::from_millis(500));
		assert_eq!(policy.threshold, Duration::minutes(5));
		assert_eq!(policy.with_threshold(Duration::seconds(-5)).threshold, Duration::ZERO);
		assert_eq!(policy.with_delay(StdDuration::ZERO).delay, StdDuration::ZERO);
	}

	#[test]
	fn progress_serializes_with_camel_case_fields() {
		let results = [BatchResult { email: "a@b.com".into(), success: true, message: "ok".into() }];
		let value = serde_json::to_value(BatchProgress {
			current: 1,
			total: 2,
			current_email: "a@b.com",
			results: &results,
		})
		.expect("Progress should serialize.");

		assert_eq!(value["currentEmail"], "a@b.com");
		assert_eq!(value["results"][0]["success"], true);
	}

	#[tokio::test(start_paused = true)]
	async fn auto_refresh_exits_once_shutdown_fires() {
		let (broker, _, _) = crate::_preludet::build_test_broker(
			crate::_preludet::test_json_adapter("http://127.0.0.1:9", "http://127.0.0.1:9"),
		);
		let shutdown = CancellationToken::new();
		let stopper = shutdown.clone();

		tokio::spawn(async move {
			tokio::time::sleep(StdDuration::from_secs(150)).await;
			stopper.cancel();
		});

		broker.auto_refresh(StdDuration::from_secs(60), &shutdown).await;

		assert!(shutdown.is_cancelled());
	}
}
