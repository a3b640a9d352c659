//! Web portal strategy: CBOR RPC requests with session-cookie token delivery.

// crates.io
use reqwest::header::{ACCEPT, CONTENT_TYPE};
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
		cookie::{self, TokenFields},
	},
};

const CBOR_MEDIA_TYPE: &str = "application/cbor";
const PROTOCOL_HEADER: &str = "smithy-protocol";
const PROTOCOL_VALUE: &str = "rpc-v2-cbor";
const CSRF_HEADER: &str = "x-csrf-token";
const AUTHORIZATION_HEADER: &str = "authorization";
const COOKIE_HEADER: &str = "cookie";
const SERVICE_PATH: &str = "service/KiroWebPortalService/operation";
const ORIGIN: &str = "KIRO_IDE";

/// Upstream operation names.
pub mod operation {
	/// Starts an authorization attempt.
	pub const INITIATE_LOGIN: &str = "InitiateLogin";
	/// Trades a code for tokens.
	pub const EXCHANGE_TOKEN: &str = "ExchangeToken";
	/// Rotates the access token.
	pub const REFRESH_TOKEN: &str = "RefreshToken";
	/// Reads the caller's identity.
	pub const GET_USER_INFO: &str = "GetUserInfo";
	/// Reads the caller's usage and limits.
	pub const GET_USAGE: &str = "GetUserUsageAndLimits";
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InitiateLoginInput<'a> {
	idp: Provider,
	redirect_uri: &'a str,
	code_challenge: &'a str,
	code_challenge_method: &'static str,
	state: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitiateLoginOutput {
	#[serde(default)]
	redirect_url: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeTokenInput<'a> {
	idp: Provider,
	code: &'a str,
	code_verifier: &'a str,
	redirect_uri: &'a str,
	state: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshTokenInput<'a> {
	csrf_token: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileInput {
	origin: &'static str,
	#[serde(skip_serializing_if = "Option::is_none")]
	is_email_required: Option<bool>,
}

/// CBOR/cookie adapter for the web portal's RPC service.
///
/// Every operation is a `POST {portal}/service/KiroWebPortalService/operation/<Name>` carrying
/// a CBOR map and the `smithy-protocol: rpc-v2-cbor` header.
#[derive(Clone, Debug)]
pub struct CborCookieAdapter {
	http: UpstreamHttpClient,
	portal: Url,
}
impl CborCookieAdapter {
	/// Points the adapter at `portal`.
	pub fn new(http: UpstreamHttpClient, portal: Url) -> Self {
		Self { http, portal }
	}

	/// Base portal URL.
	pub fn portal(&self) -> &Url {
		&self.portal
	}

	/// Encodes `payload` and posts it to `operation`, classifying non-success answers.
	async fn call<P>(
		&self,
		operation: &'static str,
		payload: &P,
		headers: Vec<(&'static str, String)>,
	) -> Result<UpstreamResponse>
	where
		P: ?Sized + Serialize,
	{
		let url = protocol::endpoint(&self.portal, &format!("{SERVICE_PATH}/{operation}"))?;
		let body = encode(operation, payload)?;
		let mut request = self
			.http
			.post(url)
			.header(CONTENT_TYPE, CBOR_MEDIA_TYPE)
			.header(ACCEPT, CBOR_MEDIA_TYPE)
			.header(PROTOCOL_HEADER, PROTOCOL_VALUE);

		for (name, value) in headers {
			request = request.header(name, value);
		}

		let response = self.http.send(operation, request.body(body)).await?;

		if !response.is_success() {
			return Err(classify::cbor_failure(response.status, &response.body));
		}

		Ok(response)
	}

	fn session_headers(access_token: &TokenSecret, idp: Provider) -> Vec<(&'static str, String)> {
		vec![
			(AUTHORIZATION_HEADER, format!("Bearer {}", access_token.expose())),
			(
				COOKIE_HEADER,
				cookie::cookie_header(&[
					(cookie::IDP, idp.as_str()),
					(cookie::ACCESS_TOKEN, access_token.expose()),
				]),
			),
		]
	}

	async fn initiate(
		&self,
		idp: Provider,
		redirect_uri: &Url,
		challenge: &str,
		state: &LoginState,
	) -> Result<Url> {
		let input = InitiateLoginInput {
			idp,
			redirect_uri: redirect_uri.as_str(),
			code_challenge: challenge,
			code_challenge_method: "S256",
			state,
		};
		let response = self.call(operation::INITIATE_LOGIN, &input, Vec::new()).await?;
		let output: InitiateLoginOutput = decode(operation::INITIATE_LOGIN, &response.body)?;
		let missing =
			|| UpstreamError::MissingField { operation: operation::INITIATE_LOGIN, field: "redirectUrl" };
		let raw = output.redirect_url.filter(|url| !url.is_empty()).ok_or_else(missing)?;

		Ok(Url::parse(&raw).map_err(|_| missing())?)
	}

	async fn exchange(&self, request: ExchangeRequest<'_>) -> Result<TokenExchange> {
		let input = ExchangeTokenInput {
			idp: request.idp,
			code: request.code,
			code_verifier: request.code_verifier,
			redirect_uri: request.redirect_uri.as_str(),
			state: request.state,
		};
		let response = self.call(operation::EXCHANGE_TOKEN, &input, Vec::new()).await?;
		let body: TokenBody = decode(operation::EXCHANGE_TOKEN, &response.body)?;
		let cookies = TokenFields::from_cookies(&cookie::parse_set_cookies(&response.set_cookies));
		let tokens = TokenFields::from(&body).merge(cookies);

		Ok(TokenExchange {
			access_token: TokenSecret::non_empty(tokens.access_token),
			refresh_token: TokenSecret::non_empty(tokens.refresh_token),
			csrf_token: TokenSecret::non_empty(tokens.csrf_token),
			idp: protocol::parse_idp(tokens.idp.as_deref()),
			profile_arn: body.profile_arn,
			expires_at: protocol::expires_at(body.expires_in, OffsetDateTime::now_utc()),
		})
	}

	async fn rotate(&self, credentials: &Credentials) -> Result<RefreshedTokens> {
		let csrf_token =
			credentials.csrf_token.as_ref().ok_or(Error::MissingCredentials { field: "csrf token" })?;
		let current_access =
			credentials.access_token.as_ref().map(TokenSecret::expose).unwrap_or_default();
		let headers = vec![
			(CSRF_HEADER, csrf_token.expose().to_owned()),
			(
				COOKIE_HEADER,
				cookie::cookie_header(&[
					(cookie::ACCESS_TOKEN, current_access),
					(cookie::REFRESH_TOKEN, credentials.refresh_token.expose()),
					(cookie::IDP, credentials.idp.as_str()),
				]),
			),
		];
		let input = RefreshTokenInput { csrf_token: csrf_token.expose() };
		let response = self.call(operation::REFRESH_TOKEN, &input, headers).await?;
		let body: TokenBody = decode(operation::REFRESH_TOKEN, &response.body)?;
		let cookies = TokenFields::from_cookies(&cookie::parse_set_cookies(&response.set_cookies));
		let tokens = TokenFields::from(&body).merge(cookies);
		let access_token = TokenSecret::non_empty(tokens.access_token).ok_or(
			UpstreamError::MissingField { operation: operation::REFRESH_TOKEN, field: "accessToken" },
		)?;

		Ok(RefreshedTokens {
			access_token,
			refresh_token: TokenSecret::non_empty(tokens.refresh_token),
			csrf_token: TokenSecret::non_empty(tokens.csrf_token),
			expires_at: protocol::expires_at(body.expires_in, OffsetDateTime::now_utc()),
			profile_arn: body.profile_arn,
		})
	}

	async fn usage(&self, access_token: &TokenSecret, idp: Provider) -> Result<UsageSnapshot> {
		let input = ProfileInput { origin: ORIGIN, is_email_required: Some(true) };
		let response = self
			.call(operation::GET_USAGE, &input, Self::session_headers(access_token, idp))
			.await?;

		Ok(UsageSnapshot(decode(operation::GET_USAGE, &response.body)?))
	}

	async fn user_info(&self, access_token: &TokenSecret, idp: Provider) -> Result<UserInfo> {
		let input = ProfileInput { origin: ORIGIN, is_email_required: None };
		let response = self
			.call(operation::GET_USER_INFO, &input, Self::session_headers(access_token, idp))
			.await?;

		Ok(decode(operation::GET_USER_INFO, &response.body)?)
	}
}
impl ProtocolAdapter for CborCookieAdapter {
	fn name(&self) -> &'static str {
		"cbor-cookie"
	}

	fn csrf_required(&self) -> bool {
		true
	}

	fn initiate_login<'a>(
		&'a self,
		idp: Provider,
		redirect_uri: &'a Url,
		challenge: &'a str,
		state: &'a LoginState,
	) -> AdapterFuture<'a, Url> {
		Box::pin(self.initiate(idp, redirect_uri, challenge, state))
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
		idp: Provider,
	) -> AdapterFuture<'a, UsageSnapshot> {
		Box::pin(self.usage(access_token, idp))
	}

	fn get_user_info<'a>(
		&'a self,
		access_token: &'a TokenSecret,
		idp: Provider,
	) -> AdapterFuture<'a, UserInfo> {
		Box::pin(self.user_info(access_token, idp))
	}
}

/// Encodes `payload` as CBOR.
pub fn encode<P>(operation: &'static str, payload: &P) -> Result<Vec<u8>, UpstreamError>
where
	P: ?Sized + Serialize,
{
	let mut bytes = Vec::new();

	ciborium::into_writer(payload, &mut bytes)
		.map_err(|e| UpstreamError::Decode { operation, message: format!("request encoding failed: {e}") })?;

	Ok(bytes)
}

/// Decodes a CBOR success body into `T`; an empty body decodes as an empty map.
pub fn decode<T>(operation: &'static str, body: &[u8]) -> Result<T, UpstreamError>
where
	T: for<'de> Deserialize<'de>,
{
	let value = if body.is_empty() {
		Value::Object(Default::default())
	} else {
		ciborium::from_reader::<ciborium::Value, _>(body)
			.map_err(|e| UpstreamError::Decode { operation, message: e.to_string() })?
			.deserialized::<Value>()
			.map_err(|e| UpstreamError::Decode { operation, message: e.to_string() })?
	};

	protocol::decode_value(operation, value)
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	#[test]
	fn requests_use_camel_case_cbor_maps() {
		let state = LoginState::new("state-1").expect("State fixture should be valid.");
		let bytes = encode(operation::INITIATE_LOGIN, &InitiateLoginInput {
			idp: Provider::Github,
			redirect_uri: "https://app.example.com/signin/oauth",
			code_challenge: "challenge",
			code_challenge_method: "S256",
			state: &state,
		})
		.expect("Input should encode.");
		let decoded: Value = decode(operation::INITIATE_LOGIN, &bytes).expect("Input should decode.");

		assert_eq!(
			decoded,
			json!({
				"idp": "Github",
				"redirectUri": "https://app.example.com/signin/oauth",
				"codeChallenge": "challenge",
				"codeChallengeMethod": "S256",
				"state": "state-1"
			})
		);
	}

	#[test]
	fn empty_success_bodies_decode_as_empty_maps() {
		let body: TokenBody = decode(operation::EXCHANGE_TOKEN, &[]).expect("Empty body should decode.");

		assert!(body.access_token.is_none());
		assert!(body.expires_in.is_none());
	}

	#[test]
	fn garbage_success_bodies_are_protocol_errors() {
		let err = decode::<TokenBody>(operation::EXCHANGE_TOKEN, &[0xff, 0xff])
			.expect_err("Garbage must not decode.");

		assert!(matches!(err, UpstreamError::Decode { operation: "ExchangeToken", .. }));
	}
}
