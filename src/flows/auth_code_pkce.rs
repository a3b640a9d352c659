//! Authorization Code + PKCE sign-in: `initiate` hands out an authorize URL and parks the
//! verifier under a random state; `complete` consumes that state exactly once, exchanges the
//! code, resolves the user's identity, and upserts the account.

pub mod challenge;
pub mod session;

pub use challenge::*;
pub use session::*;

// self
use crate::{
	_prelude::*,
	auth::{Account, AccountStatus, LoginState, Provider},
	error::UpstreamError,
	flows::Broker,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	protocol::ExchangeRequest,
	store::{PENDING_SESSION_TTL, PendingOAuthSession},
};

const EXCHANGE_OPERATION: &str = "ExchangeToken";

impl Broker {
	/// Starts a sign-in for `provider` (case-insensitive `Google` or `Github`).
	pub async fn initiate(&self, provider: &str) -> Result<AuthorizationSession> {
		const KIND: FlowKind = FlowKind::AuthorizationCode;

		let span = FlowSpan::new(KIND, "initiate");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let provider = provider.parse::<Provider>()?;
				let idp = provider.idp();
				let pkce = PkcePair::generate();
				let state = LoginState::generate();
				let authorize_url = self
					.adapter
					.initiate_login(idp, &self.redirect_uri, &pkce.challenge, &state)
					.await?;

				self.sessions
					.put(&state, &PendingOAuthSession::new(provider, pkce.verifier), PENDING_SESSION_TTL)
					.await?;

				tracing::info!(%provider, adapter = self.adapter.name(), "Authorization started.");

				Ok(AuthorizationSession { authorize_url, state })
			})
			.await;

		record(KIND, &result);

		result
	}

	/// Finishes a sign-in from the provider's callback URL and returns the persisted account.
	///
	/// The pending session is deleted as soon as the exchange was attempted, so a state can
	/// never be completed twice.
	pub async fn complete(&self, callback_url: &str) -> Result<Account> {
		const KIND: FlowKind = FlowKind::AuthorizationCode;

		let span = FlowSpan::new(KIND, "complete");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.complete_inner(callback_url)).await;

		record(KIND, &result);

		result
	}

	async fn complete_inner(&self, callback_url: &str) -> Result<Account> {
		let CallbackParams { code, state } = CallbackParams::parse(callback_url)?;
		let pending = self
			.sessions
			.get(&state)
			.await?
			.ok_or_else(|| Error::session_expired("no pending login matches this state"))?;
		let exchanged = self
			.adapter
			.exchange_token(ExchangeRequest {
				idp: pending.idp,
				code: &code,
				code_verifier: &pending.code_verifier,
				redirect_uri: &self.redirect_uri,
				state: &state,
			})
			.await;
		let consumed = self.sessions.delete(&state).await;
		let exchange = exchanged?;

		consumed?;

		let missing =
			|field| Error::from(UpstreamError::MissingField { operation: EXCHANGE_OPERATION, field });
		let access_token = exchange.access_token.ok_or_else(|| missing("accessToken"))?;
		let refresh_token = exchange.refresh_token.ok_or_else(|| missing("refreshToken"))?;
		let csrf_token = match exchange.csrf_token {
			Some(token) => Some(token),
			None if self.adapter.csrf_required() => return Err(missing("csrfToken")),
			None => None,
		};
		let idp = exchange.idp.unwrap_or(pending.idp);
		let (user_info, usage) = tokio::join!(
			self.adapter.get_user_info(&access_token, idp),
			self.adapter.get_usage(&access_token, idp),
		);
		let (user_info, usage) = (user_info?, usage?);
		let email = user_info
			.email
			.filter(|email| !email.trim().is_empty())
			.ok_or_else(|| Error::validation("Missing email in user info"))?;
		let mut account = Account::new(email, pending.provider);

		account.idp = Some(idp);
		account.user_id = user_info.user_id.or_else(|| usage.user_id().map(str::to_owned));
		account.status = match user_info.status.map(AccountStatus::from) {
			Some(AccountStatus::Suspended) => AccountStatus::Suspended,
			_ => AccountStatus::Active,
		};
		account.access_token = Some(access_token);
		account.refresh_token = Some(refresh_token);
		account.csrf_token = csrf_token;
		account.profile_arn = exchange.profile_arn;
		account.expires_at = Some(exchange.expires_at);
		account.usage_data = Some(usage);

		let saved = self.accounts.upsert_by_email_provider(account).await?;

		tracing::info!(account = %saved.id, provider = %saved.provider, "Authorization completed.");

		Ok(saved)
	}
}

fn record<T>(kind: FlowKind, result: &Result<T>) {
	let outcome = match result {
		Ok(_) => FlowOutcome::Success,
		Err(e) if e.is_suspended() => FlowOutcome::Suspended,
		Err(_) => FlowOutcome::Failure,
	};

	obs::record_flow_outcome(kind, outcome);
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::{TEST_REDIRECT_URI, build_test_broker, test_json_adapter};

	#[tokio::test]
	async fn unsupported_providers_are_rejected_before_any_upstream_call() {
		let (broker, store, _) =
			build_test_broker(test_json_adapter("http://127.0.0.1:9", "http://127.0.0.1:9"));
		let err = broker.initiate("Apple").await.expect_err("Apple is not a supported provider.");

		assert!(matches!(err, Error::Validation { .. }));
		assert!(store.is_empty());
	}

	#[tokio::test]
	async fn json_initiate_parks_the_verifier_under_the_state() {
		let (broker, store, _) = build_test_broker(test_json_adapter(
			"https://auth.example.com",
			"https://usage.example.com",
		));
		let session = broker.initiate("github").await.expect("Initiate should succeed.");
		let pending = broker
			.sessions
			.get(&session.state)
			.await
			.expect("Pending lookup should succeed.")
			.expect("Pending session should exist.");

		assert_eq!(session.state.len(), 36);
		assert_eq!(pending.provider, Provider::Github);
		assert_eq!(store.len(), 1);

		let pairs: HashMap<_, _> = session.authorize_url.query_pairs().into_owned().collect();

		assert_eq!(pairs.get("state"), Some(&session.state.to_string()));
		assert_eq!(pairs.get("redirect_uri").map(String::as_str), Some(TEST_REDIRECT_URI));
		assert_eq!(
			pairs.get("code_challenge"),
			Some(&challenge::challenge(&pending.code_verifier))
		);
	}

	#[tokio::test]
	async fn completing_an_unknown_state_is_an_expired_session() {
		let (broker, _, _) =
			build_test_broker(test_json_adapter("http://127.0.0.1:9", "http://127.0.0.1:9"));
		let err = broker
			.complete("https://app.example.com/signin/oauth?code=c&state=never-issued")
			.await
			.expect_err("Unknown states must be rejected.");

		assert!(matches!(err, Error::SessionExpired { .. }));
	}
}
