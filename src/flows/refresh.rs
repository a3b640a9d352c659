//! Single-account token rotation with optional usage sync.
//!
//! [`Broker::refresh_one`] rotates credentials through the protocol adapter while holding a
//! per-account singleflight guard. The stored record is re-read once the guard is held, so a
//! caller holding an older copy never replays an already rotated refresh token. With `sync_usage`, the new access token is immediately used
//! to pull a usage snapshot; a suspension signal at that point is recorded on the account
//! instead of failing the call, because the rotated tokens are valid and must be kept.

mod metrics;

pub use self::metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::{Account, AccountId, AccountStatus, Provider},
	flows::{Broker, common},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	protocol::Credentials,
};

impl Broker {
	/// Rotates `account`'s tokens, optionally re-syncs usage, and persists the result.
	///
	/// Only `account.id` is taken from the argument; credentials come from the stored record.
	pub async fn refresh_one(&self, account: Account, sync_usage: bool) -> Result<Account> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, if sync_usage { "refresh_sync" } else { "refresh" });

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.refresh_guarded(&account.id, sync_usage)).await;

		match &result {
			Ok(account) if account.status.is_suspended() =>
				obs::record_flow_outcome(KIND, FlowOutcome::Suspended),
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(e) if e.is_suspended() => obs::record_flow_outcome(KIND, FlowOutcome::Suspended),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Looks `id` up and refreshes it.
	pub async fn refresh_by_id(&self, id: &AccountId, sync_usage: bool) -> Result<Account> {
		let account = self
			.accounts
			.get(id)
			.await?
			.ok_or_else(|| Error::AccountNotFound { id: id.to_string() })?;

		self.refresh_one(account, sync_usage).await
	}

	async fn refresh_guarded(&self, id: &AccountId, sync_usage: bool) -> Result<Account> {
		let guard = common::flow_guard(self, id);
		let _singleflight = guard.lock().await;
		let mut account = self
			.accounts
			.get(id)
			.await?
			.ok_or_else(|| Error::AccountNotFound { id: id.to_string() })?;
		let credentials = Credentials::from_account(&account)?;

		self.refresh_metrics.record_attempt();

		let tokens = match self.adapter.refresh(&credentials).await {
			Ok(tokens) => tokens,
			Err(e) => {
				if e.is_suspended() {
					self.refresh_metrics.record_suspension();
				}

				self.refresh_metrics.record_failure();
				tracing::warn!(account = %account.id, error = %e, "Token refresh failed.");

				return Err(e);
			},
		};

		account.access_token = Some(tokens.access_token);
		account.refresh_token = tokens.refresh_token.or(account.refresh_token);
		account.csrf_token = tokens.csrf_token.or(account.csrf_token);
		account.profile_arn = tokens.profile_arn.or(account.profile_arn);
		account.expires_at = Some(tokens.expires_at);

		if sync_usage {
			self.sync_usage(&mut account, credentials.idp).await;
		}

		account.touch();

		let saved = self.accounts.save(account).await.inspect_err(|_| {
			self.refresh_metrics.record_failure();
		})?;

		self.refresh_metrics.record_success();

		Ok(saved)
	}

	async fn sync_usage(&self, account: &mut Account, idp: Provider) {
		let Some(access_token) = account.access_token.as_ref() else {
			return;
		};

		match self.adapter.get_usage(access_token, idp).await {
			Ok(usage) => {
				if let Some(user_id) = usage.user_id() {
					account.user_id = Some(user_id.to_owned());
				}

				account.usage_data = Some(usage);
				account.status = AccountStatus::Active;
			},
			Err(e) if e.is_suspended() => {
				self.refresh_metrics.record_suspension();
				tracing::warn!(account = %account.id, error = %e, "Usage sync reported a suspension.");

				account.status = AccountStatus::Suspended;
			},
			Err(e) => {
				tracing::warn!(account = %account.id, error = %e, "Usage sync failed.");

				account.status = AccountStatus::Error(format!("Usage sync failed: {e}"));
			},
		}
	}
}
