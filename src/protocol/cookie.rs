//! Session-cookie parsing and the body-over-cookie token merge.

// self
use crate::{_prelude::*, protocol::TokenBody};

/// Cookie carrying the access token.
pub const ACCESS_TOKEN: &str = "AccessToken";
/// Cookie carrying the refresh token.
pub const REFRESH_TOKEN: &str = "RefreshToken";
/// Cookie carrying the identity provider.
pub const IDP: &str = "Idp";
/// Cookie carrying the CSRF token.
pub const CSRF_TOKEN: &str = "CsrfToken";

/// Parses raw `Set-Cookie` values into a name → value map.
///
/// Attributes after the first `;` are ignored; later cookies with the same name win.
pub fn parse_set_cookies<I, S>(headers: I) -> HashMap<String, String>
where
	I: IntoIterator<Item = S>,
	S: AsRef<str>,
{
	let mut cookies = HashMap::new();

	for header in headers {
		let pair = header.as_ref().split(';').next().unwrap_or_default();

		if let Some((name, value)) = pair.split_once('=') {
			let name = name.trim();

			if !name.is_empty() {
				cookies.insert(name.to_owned(), value.trim().to_owned());
			}
		}
	}

	cookies
}

/// Renders a `Cookie` request header from name/value pairs.
pub fn cookie_header(pairs: &[(&str, &str)]) -> String {
	pairs.iter().map(|(name, value)| format!("{name}={value}")).collect::<Vec<_>>().join("; ")
}

/// Token fields that may arrive in a response body, in session cookies, or split across both.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenFields {
	/// Access token.
	pub access_token: Option<String>,
	/// Refresh token.
	pub refresh_token: Option<String>,
	/// CSRF token.
	pub csrf_token: Option<String>,
	/// Identity provider label.
	pub idp: Option<String>,
}
impl TokenFields {
	/// Reads the token cookies out of a parsed cookie map.
	pub fn from_cookies(cookies: &HashMap<String, String>) -> Self {
		let take = |name: &str| cookies.get(name).filter(|v| !v.is_empty()).cloned();

		Self {
			access_token: take(ACCESS_TOKEN),
			refresh_token: take(REFRESH_TOKEN),
			csrf_token: take(CSRF_TOKEN),
			idp: take(IDP),
		}
	}

	/// Merges two sources field by field; `self` (the body) wins whenever both are present.
	pub fn merge(self, cookies: TokenFields) -> TokenFields {
		fn pick(body: Option<String>, cookie: Option<String>) -> Option<String> {
			body.filter(|v| !v.is_empty()).or(cookie)
		}

		TokenFields {
			access_token: pick(self.access_token, cookies.access_token),
			refresh_token: pick(self.refresh_token, cookies.refresh_token),
			csrf_token: pick(self.csrf_token, cookies.csrf_token),
			idp: pick(self.idp, cookies.idp),
		}
	}
}
impl From<&TokenBody> for TokenFields {
	fn from(body: &TokenBody) -> Self {
		Self {
			access_token: body.access_token.clone(),
			refresh_token: body.refresh_token.clone(),
			csrf_token: body.csrf_token.clone(),
			idp: body.idp.clone(),
		}
	}
}
