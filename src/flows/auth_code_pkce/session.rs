//! Handshake and callback types shared by the sign-in flow.

// self
use crate::{_prelude::*, auth::LoginState};

/// Handshake metadata returned by [`Broker::initiate`](crate::flows::Broker::initiate).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationSession {
	/// URL the end-user must visit.
	pub authorize_url: Url,
	/// Opaque state that must come back on the callback.
	pub state: LoginState,
}

/// `code` + `state` pulled from a provider callback URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackParams {
	/// Authorization code.
	pub code: String,
	/// Returned state.
	pub state: LoginState,
}
impl CallbackParams {
	/// Parses a callback URL.
	///
	/// Unparsable URLs, a missing `code`, or a missing/invalid `state` all mean the attempt
	/// cannot be resumed, so they are reported as [`Error::SessionExpired`].
	pub fn parse(callback_url: &str) -> Result<Self> {
		let url = Url::parse(callback_url.trim())
			.map_err(|_| Error::session_expired("callback URL cannot be parsed"))?;
		let mut code = None;
		let mut state = None;

		for (name, value) in url.query_pairs() {
			match name.as_ref() {
				"code" if !value.is_empty() => code = Some(value.into_owned()),
				"state" if !value.is_empty() => state = Some(value.into_owned()),
				_ => {},
			}
		}

		let (Some(code), Some(state)) = (code, state) else {
			return Err(Error::session_expired("missing code or state"));
		};
		let state =
			LoginState::new(state).map_err(|_| Error::session_expired("callback state is invalid"))?;

		Ok(Self { code, state })
	}
}
