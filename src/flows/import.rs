//! Direct account import from a bare refresh token.

// self
use crate::{
	_prelude::*,
	auth::{Account, AccountStatus, Provider, TokenSecret},
	flows::Broker,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	protocol::Credentials,
};

/// Email recorded when the usage payload does not name the account owner.
pub const UNKNOWN_EMAIL: &str = "unknown@kiro.dev";

/// Request body accepted by [`Broker::import_refresh_token`].
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
	/// Refresh token to adopt.
	#[serde(default)]
	pub refresh_token: Option<TokenSecret>,
	/// Provider label; inferred from the email when absent.
	#[serde(default)]
	pub provider: Option<String>,
}
impl Debug for ImportRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ImportRequest")
			.field("refresh_token_set", &self.refresh_token.is_some())
			.field("provider", &self.provider)
			.finish()
	}
}

impl Broker {
	/// Adopts an account from a refresh token: refresh, probe usage, then upsert.
	///
	/// A suspension reported by either call fails the import.
	pub async fn import_refresh_token(&self, request: ImportRequest) -> Result<Account> {
		const KIND: FlowKind = FlowKind::Import;

		let span = FlowSpan::new(KIND, "import_refresh_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.import_inner(request)).await;

		obs::record_flow_outcome(
			KIND,
			match &result {
				Ok(_) => FlowOutcome::Success,
				Err(e) if e.is_suspended() => FlowOutcome::Suspended,
				Err(_) => FlowOutcome::Failure,
			},
		);

		result
	}

	async fn import_inner(&self, request: ImportRequest) -> Result<Account> {
		let refresh_token = request
			.refresh_token
			.filter(|token| !token.expose().trim().is_empty())
			.ok_or_else(|| Error::validation("Missing refreshToken"))?;
		let requested = request
			.provider
			.as_deref()
			.filter(|label| !label.trim().is_empty())
			.map(str::parse::<Provider>)
			.transpose()?;
		let idp = requested.unwrap_or(Provider::Google).idp();
		let credentials = Credentials {
			access_token: None,
			refresh_token: refresh_token.clone(),
			csrf_token: None,
			idp,
			profile_arn: None,
		};
		let tokens = self.adapter.refresh(&credentials).await?;
		let usage = self.adapter.get_usage(&tokens.access_token, idp).await?;
		let email = usage.email().unwrap_or(UNKNOWN_EMAIL).to_owned();
		let provider = requested.unwrap_or_else(|| Provider::infer_from_email(&email));
		let mut account = Account::new(email, provider);

		account.label = Some(format!("Kiro {provider} account"));
		account.user_id = usage.user_id().map(str::to_owned);
		account.status = AccountStatus::Active;
		account.access_token = Some(tokens.access_token);
		account.refresh_token = Some(tokens.refresh_token.unwrap_or(refresh_token));
		account.csrf_token = tokens.csrf_token;
		account.profile_arn = tokens.profile_arn;
		account.expires_at = Some(tokens.expires_at);
		account.usage_data = Some(usage);

		let saved = self.accounts.upsert_by_email_provider(account).await?;

		tracing::info!(account = %saved.id, provider = %saved.provider, "Account imported.");

		Ok(saved)
	}
}
