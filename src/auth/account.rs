//! Durable credential bundle persisted by the account repository.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::{AccountId, Provider, TokenSecret},
};

/// Lifecycle status attached to every account.
///
/// Serialized as `"active"`, `"suspended"`, or the raw error label. The `正常` and `已封禁`
/// labels written by the earlier worker deployment map to active and suspended.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AccountStatus {
	/// Credentials work and the upstream reports no restriction.
	#[default]
	Active,
	/// Upstream reported a ban or lock; sticky until a clean usage sync.
	Suspended,
	/// Last sync failed for a non-suspension reason.
	Error(String),
}
impl AccountStatus {
	/// Returns `true` for [`AccountStatus::Suspended`].
	pub fn is_suspended(&self) -> bool {
		matches!(self, AccountStatus::Suspended)
	}
}
impl From<String> for AccountStatus {
	fn from(value: String) -> Self {
		let trimmed = value.trim();

		if trimmed.is_empty()
			|| trimmed.eq_ignore_ascii_case("active")
			|| trimmed.eq_ignore_ascii_case("normal")
			|| trimmed == "正常"
		{
			AccountStatus::Active
		} else if trimmed.eq_ignore_ascii_case("suspended")
			|| trimmed.eq_ignore_ascii_case("banned")
			|| trimmed == "已封禁"
			|| trimmed == "封禁"
		{
			AccountStatus::Suspended
		} else {
			AccountStatus::Error(value)
		}
	}
}
impl From<AccountStatus> for String {
	fn from(value: AccountStatus) -> Self {
		match value {
			AccountStatus::Active => "active".into(),
			AccountStatus::Suspended => "suspended".into(),
			AccountStatus::Error(label) => label,
		}
	}
}
impl Display for AccountStatus {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			AccountStatus::Active => f.write_str("active"),
			AccountStatus::Suspended => f.write_str("suspended"),
			AccountStatus::Error(label) => f.write_str(label),
		}
	}
}

/// Opaque usage/quota payload returned by the upstream usage service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageSnapshot(pub Value);
impl UsageSnapshot {
	/// Email reported under `userInfo.email`, if any.
	pub fn email(&self) -> Option<&str> {
		self.user_info_field("email")
	}

	/// User id reported under `userInfo.userId`, if any.
	pub fn user_id(&self) -> Option<&str> {
		self.user_info_field("userId")
	}

	fn user_info_field(&self, field: &str) -> Option<&str> {
		self.0.get("userInfo")?.get(field)?.as_str().filter(|v| !v.is_empty())
	}
}

/// Credential bundle for one upstream account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
	/// Immutable identifier generated on first insert.
	pub id: AccountId,
	/// Email reported by the upstream; half of the deduplication key.
	pub email: String,
	/// Free-form display label.
	#[serde(default)]
	pub label: Option<String>,
	/// Provider chosen at sign-in; the other half of the deduplication key.
	pub provider: Provider,
	/// Identity provider reported by (or derived for) the upstream.
	#[serde(default)]
	pub idp: Option<Provider>,
	/// Upstream user identifier.
	#[serde(default)]
	pub user_id: Option<String>,
	/// Lifecycle status.
	#[serde(default)]
	pub status: AccountStatus,
	/// Current access token.
	#[serde(default)]
	pub access_token: Option<TokenSecret>,
	/// Current refresh token.
	#[serde(default)]
	pub refresh_token: Option<TokenSecret>,
	/// CSRF token required by cookie-based refreshes.
	#[serde(default)]
	pub csrf_token: Option<TokenSecret>,
	/// Session token, when the upstream issues one.
	#[serde(default)]
	pub session_token: Option<TokenSecret>,
	/// OpenID id token, when the upstream issues one.
	#[serde(default)]
	pub id_token: Option<TokenSecret>,
	/// Upstream profile reference used by usage calls.
	#[serde(default)]
	pub profile_arn: Option<String>,
	/// OIDC client identifier for builder-style sign-ins.
	#[serde(default)]
	pub client_id: Option<String>,
	/// OIDC client secret for builder-style sign-ins.
	#[serde(default)]
	pub client_secret: Option<TokenSecret>,
	/// Hash of the client identifier used by desktop tooling.
	#[serde(default)]
	pub client_id_hash: Option<String>,
	/// Upstream region.
	#[serde(default)]
	pub region: Option<String>,
	/// SSO session identifier.
	#[serde(default)]
	pub sso_session_id: Option<String>,
	/// Access token expiry.
	#[serde(default, with = "timestamp::option")]
	pub expires_at: Option<OffsetDateTime>,
	/// Last usage snapshot; `None` until the first sync.
	#[serde(default)]
	pub usage_data: Option<UsageSnapshot>,
	/// Insertion instant; never overwritten by updates.
	#[serde(alias = "addedAt", default = "OffsetDateTime::now_utc", with = "timestamp")]
	pub created_at: OffsetDateTime,
	/// Last mutation instant.
	#[serde(default = "OffsetDateTime::now_utc", with = "timestamp")]
	pub updated_at: OffsetDateTime,
}
impl Account {
	/// Creates an empty, active account with a fresh identifier.
	pub fn new(email: impl Into<String>, provider: Provider) -> Self {
		let now = OffsetDateTime::now_utc();

		Self {
			id: AccountId::generate(),
			email: email.into(),
			label: None,
			provider,
			idp: Some(provider.idp()),
			user_id: None,
			status: AccountStatus::Active,
			access_token: None,
			refresh_token: None,
			csrf_token: None,
			session_token: None,
			id_token: None,
			profile_arn: None,
			client_id: None,
			client_secret: None,
			client_id_hash: None,
			region: None,
			sso_session_id: None,
			expires_at: None,
			usage_data: None,
			created_at: now,
			updated_at: now,
		}
	}

	/// Returns `true` when the record matches the deduplication key.
	pub fn same_identity(&self, email: &str, provider: Provider) -> bool {
		self.email == email && self.provider == provider
	}

	/// Returns `true` when the access token expires within `window` of `now`.
	///
	/// Records without a known expiry are treated as expiring.
	pub fn expires_within(&self, now: OffsetDateTime, window: Duration) -> bool {
		match self.expires_at {
			Some(expires_at) => expires_at - now < window,
			None => true,
		}
	}

	/// Stamps `updated_at` with the current clock.
	pub fn touch(&mut self) {
		self.updated_at = OffsetDateTime::now_utc();
	}
}

/// RFC 3339 timestamps that also read the `YYYY/MM/DD HH:MM:SS` layout (taken as UTC) found in
/// records written by the earlier worker deployment. Output is always RFC 3339.
mod timestamp {
	// crates.io
	use serde::{Deserializer, Serializer, de::Error as _};
	use time::{PrimitiveDateTime, format_description::well_known::Rfc3339, macros::format_description};
	// self
	use crate::_prelude::*;

	pub(super) fn parse(raw: &str) -> Option<OffsetDateTime> {
		let raw = raw.trim();

		OffsetDateTime::parse(raw, &Rfc3339).ok().or_else(|| {
			PrimitiveDateTime::parse(
				raw,
				format_description!("[year]/[month]/[day] [hour]:[minute]:[second]"),
			)
			.ok()
			.map(PrimitiveDateTime::assume_utc)
		})
	}

	pub fn serialize<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		time::serde::rfc3339::serialize(value, serializer)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
	where
		D: Deserializer<'de>,
	{
		let raw = String::deserialize(deserializer)?;

		parse(&raw).ok_or_else(|| D::Error::custom(format!("`{raw}` is not a supported timestamp")))
	}

	pub mod option {
		// crates.io
		use serde::{Deserializer, Serializer, de::Error as _};
		// self
		use crate::_prelude::*;

		pub fn serialize<S>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
		where
			S: Serializer,
		{
			time::serde::rfc3339::option::serialize(value, serializer)
		}

		pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
		where
			D: Deserializer<'de>,
		{
			match Option::<String>::deserialize(deserializer)? {
				Some(raw) if raw.trim().is_empty() => Ok(None),
				Some(raw) => super::parse(&raw).map(Some).ok_or_else(|| {
					D::Error::custom(format!("`{raw}` is not a supported timestamp"))
				}),
				None => Ok(None),
			}
		}
	}
}
