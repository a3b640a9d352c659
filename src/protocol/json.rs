//! Desktop strategy: plain JSON requests with bearer authentication.

// crates.io
use reqwest::header::ACCEPT;
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::{LoginState, Provider, TokenSecret, UsageSnapshot},
	error::UpstreamError,
	http::{UpstreamHttpClient, UpstreamResponse},
	protocol::{
		self, AdapterFuture, Credentials, ExchangeRequest, ProtocolAdapter, RefreshedTokens,
		TokenBody, TokenExchange, UserInfo, classify,
	},
};

/// Profile reference sent with usage queries unless overridden.
pub const DEFAULT_PROFILE_ARN: &str =
	"arn:aws:codewhisperer:us-east-1:699475941385:profile/EHGA3GRVQMUK";

const JSON_MEDIA_TYPE: &str = "application/json";
const USAGE_ORIGIN: &str = "AI_EDITOR";
const REFRESH_EXPIRED: &str = "Refresh token expired or invalid";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeInput<'a> {
	code: &'a str,
	code_verifier: &'a str,
	redirect_uri: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshInput<'a> {
	refresh_token: &'a str,
}

/// Bearer/JSON adapter for the desktop auth and usage services.
#[derive(Clone, Debug)]
pub struct BearerJsonAdapter {
	http: UpstreamHttpClient,
	auth: Url,
	usage: Url,
	profile_arn: String,
}
impl BearerJsonAdapter {
	/// Points the adapter at the auth and usage services.
	pub fn new(http: UpstreamHttpClient, auth: Url, usage: Url) -> Self {
		Self { http, auth, usage, profile_arn: DEFAULT_PROFILE_ARN.into() }
	}

	/// Overrides the profile reference sent with usage queries.
	pub fn with_profile_arn(mut self, profile_arn: impl Into<String>) -> Self {
		self.profile_arn = profile_arn.into();

		self
	}

	fn login_url(
		&self,
		idp: Provider,
		redirect_uri: &Url,
		challenge: &str,
		state: &LoginState,
	) -> Result<Url> {
		let mut url = protocol::endpoint(&self.auth, "login")?;

		url.query_pairs_mut()
			.append_pair("idp", idp.as_str())
			.append_pair("redirect_uri", redirect_uri.as_str())
			.append_pair("code_challenge", challenge)
			.append_pair("code_challenge_method", "S256")
			.append_pair("state", state);

		Ok(url)
	}

	async fn post_json<P>(&self, operation: &'static str, path: &str, payload: &P) -> Result<UpstreamResponse>
	where
		P: ?Sized + Serialize,
	{
		let url = protocol::endpoint(&self.auth, path)?;
		let request = self.http.post(url).header(ACCEPT, JSON_MEDIA_TYPE).json(payload);

		Ok(self.http.send(operation, request).await?)
	}

	async fn exchange(&self, request: ExchangeRequest<'_>) -> Result<TokenExchange> {
		const OPERATION: &str = "oauth/token";

		let input = ExchangeInput {
			code: request.code,
			code_verifier: request.code_verifier,
			redirect_uri: request.redirect_uri.as_str(),
		};
		let response = self.post_json(OPERATION, OPERATION, &input).await?;

		if !response.is_success() {
			return Err(classify::json_failure(response.status, &response.body));
		}

		let body: TokenBody = decode(OPERATION, &response.body)?;

		Ok(TokenExchange {
			access_token: TokenSecret::non_empty(body.access_token),
			refresh_token: TokenSecret::non_empty(body.refresh_token),
			csrf_token: TokenSecret::non_empty(body.csrf_token),
			idp: protocol::parse_idp(body.idp.as_deref()).or(Some(request.idp)),
			profile_arn: body.profile_arn,
			expires_at: protocol::expires_at(body.expires_in, OffsetDateTime::now_utc()),
		})
	}

	async fn rotate(&self, credentials: &Credentials) -> Result<RefreshedTokens> {
		const OPERATION: &str = "refreshToken";

		let input = RefreshInput { refresh_token: credentials.refresh_token.expose() };
		let response = self.post_json(OPERATION, OPERATION, &input).await?;

		if response.status == 401 {
			return Err(UpstreamError::Status { message: REFRESH_EXPIRED.into(), status: 401 }.into());
		}
		if !response.is_success() {
			return Err(classify::json_failure(response.status, &response.body));
		}

		let body: TokenBody = decode(OPERATION, &response.body)?;
		let access_token = TokenSecret::non_empty(body.access_token)
			.ok_or(UpstreamError::MissingField { operation: OPERATION, field: "accessToken" })?;

		Ok(RefreshedTokens {
			access_token,
			refresh_token: TokenSecret::non_empty(body.refresh_token),
			csrf_token: TokenSecret::non_empty(body.csrf_token),
			expires_at: protocol::expires_at(body.expires_in, OffsetDateTime::now_utc()),
			profile_arn: body.profile_arn,
		})
	}

	async fn usage(&self, access_token: &TokenSecret) -> Result<UsageSnapshot> {
		const OPERATION: &str = "getUsageLimits";

		let mut url = protocol::endpoint(&self.usage, OPERATION)?;

		url.query_pairs_mut()
			.append_pair("isEmailRequired", "true")
			.append_pair("origin", USAGE_ORIGIN)
			.append_pair("profileArn", &self.profile_arn);

		let request =
			self.http.get(url).bearer_auth(access_token.expose()).header(ACCEPT, JSON_MEDIA_TYPE);
		let response = self.http.send(OPERATION, request).await?;

		if !response.is_success() {
			return Err(classify::json_failure(response.status, &response.body));
		}

		Ok(UsageSnapshot(decode(OPERATION, &response.body)?))
	}

	async fn user_info(&self, access_token: &TokenSecret) -> Result<UserInfo> {
		let usage = self.usage(access_token).await?;

		Ok(UserInfo {
			email: usage.email().map(str::to_owned),
			user_id: usage.user_id().map(str::to_owned),
			status: None,
		})
	}
}
impl ProtocolAdapter for BearerJsonAdapter {
	fn name(&self) -> &'static str {
		"bearer-json"
	}

	fn csrf_required(&self) -> bool {
		false
	}

	fn initiate_login<'a>(
		&'a self,
		idp: Provider,
		redirect_uri: &'a Url,
		challenge: &'a str,
		state: &'a LoginState,
	) -> AdapterFuture<'a, Url> {
		Box::pin(async move { self.login_url(idp, redirect_uri, challenge, state) })
	}

	fn exchange_token<'a>(&'a self, request: ExchangeRequest<'a>) -> AdapterFuture<'a, TokenExchange> {
		Box::pin(self.exchange(request))
	}

	fn refresh<'a>(&'a self, credentials: &'a Credentials) -> AdapterFuture<'a, RefreshedTokens> {
		Box::pin(self.rotate(credentials))
	}

	fn get_usage<'a>(
		&'a self,
		access_token: &'a TokenSecret,
		_idp: Provider,
	) -> AdapterFuture<'a, UsageSnapshot> {
		Box::pin(self.usage(access_token))
	}

	fn get_user_info<'a>(
		&'a self,
		access_token: &'a TokenSecret,
		_idp: Provider,
	) -> AdapterFuture<'a, UserInfo> {
		Box::pin(self.user_info(access_token))
	}
}

fn decode<T>(operation: &'static str, body: &[u8]) -> Result<T, UpstreamError>
where
	T: for<'de> Deserialize<'de>,
{
	let value = serde_json::from_slice::<Value>(body)
		.map_err(|e| UpstreamError::Decode { operation, message: e.to_string() })?;

	protocol::decode_value(operation, value)
}
