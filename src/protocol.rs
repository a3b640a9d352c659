//! Upstream identity/usage protocol strategies.
//!
//! Business flows depend only on [`ProtocolAdapter`]. Two strategies ship with the crate:
//! [`CborCookieAdapter`] speaks the web portal's CBOR RPC protocol where tokens travel in
//! both bodies and session cookies, and [`BearerJsonAdapter`] speaks the desktop service's
//! plain JSON protocol with bearer authentication. Which one runs is a deployment choice.

pub mod cbor;
pub mod classify;
pub mod cookie;
pub mod json;

pub use cbor::CborCookieAdapter;
pub use json::BearerJsonAdapter;

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::{Account, LoginState, Provider, TokenSecret, UsageSnapshot},
	error::{ConfigError, UpstreamError},
};

/// Token lifetime assumed when the upstream omits `expiresIn`.
pub const DEFAULT_EXPIRES_IN: Duration = Duration::seconds(3_600);

/// Boxed future returned by [`ProtocolAdapter`] operations.
pub type AdapterFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Capability set every upstream protocol strategy implements.
///
/// Failures are classified as [`Error::Suspended`] for explicit ban signals and
/// [`Error::Upstream`] for every other non-success answer, undecodable payload, transport
/// failure, or timeout.
pub trait ProtocolAdapter
where
	Self: Send + Sync,
{
	/// Stable strategy label used in logs.
	fn name(&self) -> &'static str;

	/// Whether a completed exchange must yield a CSRF token.
	fn csrf_required(&self) -> bool;

	/// Starts an authorization attempt and returns the URL the user must visit.
	fn initiate_login<'a>(
		&'a self,
		idp: Provider,
		redirect_uri: &'a Url,
		challenge: &'a str,
		state: &'a LoginState,
	) -> AdapterFuture<'a, Url>;

	/// Trades an authorization code for tokens.
	fn exchange_token<'a>(&'a self, request: ExchangeRequest<'a>) -> AdapterFuture<'a, TokenExchange>;

	/// Rotates the access token (and, for some strategies, the refresh token).
	fn refresh<'a>(&'a self, credentials: &'a Credentials) -> AdapterFuture<'a, RefreshedTokens>;

	/// Fetches the usage/quota snapshot for the token's owner.
	fn get_usage<'a>(
		&'a self,
		access_token: &'a TokenSecret,
		idp: Provider,
	) -> AdapterFuture<'a, UsageSnapshot>;

	/// Fetches the identity of the token's owner.
	fn get_user_info<'a>(
		&'a self,
		access_token: &'a TokenSecret,
		idp: Provider,
	) -> AdapterFuture<'a, UserInfo>;
}

/// Inputs for [`ProtocolAdapter::exchange_token`].
#[derive(Clone, Copy, Debug)]
pub struct ExchangeRequest<'a> {
	/// Identity provider recorded at initiation.
	pub idp: Provider,
	/// Authorization code from the callback.
	pub code: &'a str,
	/// PKCE verifier recorded at initiation.
	pub code_verifier: &'a str,
	/// Redirect URI used at initiation.
	pub redirect_uri: &'a Url,
	/// State token from the callback.
	pub state: &'a LoginState,
}

/// Tokens produced by an authorization-code exchange.
///
/// Every token is optional here; the session manager decides which ones are mandatory.
#[derive(Clone, Debug, PartialEq)]
pub struct TokenExchange {
	/// Access token.
	pub access_token: Option<TokenSecret>,
	/// Refresh token.
	pub refresh_token: Option<TokenSecret>,
	/// CSRF token.
	pub csrf_token: Option<TokenSecret>,
	/// Identity provider reported by the upstream.
	pub idp: Option<Provider>,
	/// Profile reference.
	pub profile_arn: Option<String>,
	/// Access token expiry.
	pub expires_at: OffsetDateTime,
}

/// Credential subset needed to refresh an account.
#[derive(Clone, Debug)]
pub struct Credentials {
	/// Current access token, if any.
	pub access_token: Option<TokenSecret>,
	/// Refresh token.
	pub refresh_token: TokenSecret,
	/// Current CSRF token, if any.
	pub csrf_token: Option<TokenSecret>,
	/// Identity provider.
	pub idp: Provider,
	/// Profile reference.
	pub profile_arn: Option<String>,
}
impl Credentials {
	/// Extracts refresh credentials from `account`.
	pub fn from_account(account: &Account) -> Result<Self> {
		let refresh_token = account
			.refresh_token
			.clone()
			.ok_or(Error::MissingCredentials { field: "refresh token" })?;

		Ok(Self {
			access_token: account.access_token.clone(),
			refresh_token,
			csrf_token: account.csrf_token.clone(),
			idp: account.idp.unwrap_or(account.provider),
			profile_arn: account.profile_arn.clone(),
		})
	}
}

/// Tokens produced by a refresh.
#[derive(Clone, Debug, PartialEq)]
pub struct RefreshedTokens {
	/// New access token.
	pub access_token: TokenSecret,
	/// Rotated refresh token; `None` keeps the current one.
	pub refresh_token: Option<TokenSecret>,
	/// Rotated CSRF token; `None` keeps the current one.
	pub csrf_token: Option<TokenSecret>,
	/// New access token expiry.
	pub expires_at: OffsetDateTime,
	/// Profile reference, when reported.
	pub profile_arn: Option<String>,
}

/// Identity reported for an access token.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserInfo {
	/// Email address.
	pub email: Option<String>,
	/// Upstream user identifier.
	pub user_id: Option<String>,
	/// Upstream status label.
	pub status: Option<String>,
}

/// Token fields shared by exchange and refresh responses of both strategies.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct TokenBody {
	pub access_token: Option<String>,
	pub refresh_token: Option<String>,
	pub csrf_token: Option<String>,
	pub idp: Option<String>,
	pub profile_arn: Option<String>,
	pub expires_in: Option<i64>,
}

/// Computes an expiry instant from an optional `expiresIn` (seconds).
pub(crate) fn expires_at(expires_in: Option<i64>, now: OffsetDateTime) -> OffsetDateTime {
	now + expires_in.filter(|secs| *secs > 0).map(Duration::seconds).unwrap_or(DEFAULT_EXPIRES_IN)
}

/// Joins `path` onto `base`, keeping any path prefix `base` already carries.
pub(crate) fn endpoint(base: &Url, path: &str) -> Result<Url> {
	let raw = format!("{}/{}", base.as_str().trim_end_matches('/'), path.trim_start_matches('/'));

	Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl { key: "upstream endpoint", source }.into())
}

/// Decodes a generic payload into `T`, reporting the failing field path.
pub(crate) fn decode_value<T>(operation: &'static str, value: Value) -> Result<T, UpstreamError>
where
	T: for<'de> Deserialize<'de>,
{
	serde_path_to_error::deserialize(value).map_err(|e| UpstreamError::Decode {
		operation,
		message: format!("{} at `{}`", e.inner(), e.path()),
	})
}

/// Parses an optional upstream `idp` label, ignoring values the broker does not know.
pub(crate) fn parse_idp(raw: Option<&str>) -> Option<Provider> {
	raw.and_then(|label| label.parse().ok())
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	#[test]
	fn expiry_defaults_to_one_hour() {
		let now = OffsetDateTime::now_utc();

		assert_eq!(expires_at(None, now), now + Duration::hours(1));
		assert_eq!(expires_at(Some(0), now), now + Duration::hours(1));
		assert_eq!(expires_at(Some(60), now), now + Duration::minutes(1));
	}

	#[test]
	fn endpoint_keeps_base_path_prefix() {
		let base = Url::parse("http://127.0.0.1:9000/portal/").expect("Base URL should parse.");

		assert_eq!(
			endpoint(&base, "/service/op").expect("Endpoint should build.").as_str(),
			"http://127.0.0.1:9000/portal/service/op"
		);
	}

	#[test]
	fn decode_errors_name_the_failing_path() {
		let err = decode_value::<TokenBody>("ExchangeToken", json!({ "expiresIn": "soon" }))
			.expect_err("String expiry must be rejected.");

		assert!(err.to_string().contains("expiresIn"), "Unexpected message: {err}");
	}

	#[test]
	fn credentials_require_a_refresh_token() {
		let account = Account::new("a@b.com", Provider::Google);
		let err = Credentials::from_account(&account)
			.expect_err("Accounts without refresh tokens cannot be refreshed.");

		assert!(matches!(err, Error::MissingCredentials { .. }));
	}
}
