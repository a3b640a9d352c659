//! Transport primitives shared by the upstream protocol adapters.
//!
//! [`UpstreamHttpClient`] owns the bounded per-request timeout and turns every reqwest
//! response into an [`UpstreamResponse`] so adapters classify status, cookies, and body bytes
//! without touching transport types.

// std
use std::ops::Deref;
// crates.io
use reqwest::{RequestBuilder, header::SET_COOKIE, redirect::Policy};
// self
use crate::{
	_prelude::*,
	error::{ConfigError, UpstreamError},
};

/// Default upper bound for a single upstream request.
pub const DEFAULT_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Redirects are never followed: every upstream operation answers directly.
#[derive(Clone, Debug)]
pub struct UpstreamHttpClient(ReqwestClient);
impl UpstreamHttpClient {
	/// Builds a client whose requests fail once `timeout` elapses.
	pub fn with_timeout(timeout: StdDuration) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder().timeout(timeout).redirect(Policy::none()).build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Sends `request`, buffering the body and collecting every `Set-Cookie` header.
	///
	/// Transport failures and timeouts are reported against `operation`; non-success statuses
	/// are returned as-is for the caller to classify.
	pub async fn send(
		&self,
		operation: &'static str,
		request: RequestBuilder,
	) -> Result<UpstreamResponse, UpstreamError> {
		let response =
			request.send().await.map_err(|e| UpstreamError::from_reqwest(operation, e))?;
		let status = response.status().as_u16();
		let set_cookies = response
			.headers()
			.get_all(SET_COOKIE)
			.iter()
			.filter_map(|value| value.to_str().ok())
			.map(str::to_owned)
			.collect();
		let body = response
			.bytes()
			.await
			.map_err(|e| UpstreamError::from_reqwest(operation, e))?
			.to_vec();

		tracing::debug!(operation, status, bytes = body.len(), "Upstream responded.");

		Ok(UpstreamResponse { status, set_cookies, body })
	}
}
impl Default for UpstreamHttpClient {
	fn default() -> Self {
		Self(ReqwestClient::default())
	}
}
impl AsRef<ReqwestClient> for UpstreamHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
impl Deref for UpstreamHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

/// Buffered upstream response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpstreamResponse {
	/// HTTP status code.
	pub status: u16,
	/// Raw `Set-Cookie` header values, in arrival order.
	pub set_cookies: Vec<String>,
	/// Response body bytes.
	pub body: Vec<u8>,
}
impl UpstreamResponse {
	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}
