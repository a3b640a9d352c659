//! Short-lived storage for in-flight authorization attempts.

// self
use crate::{
	_prelude::*,
	auth::{LoginState, Provider},
	store::{self, KeyValueStore, StoreError},
};

/// Default lifetime of a pending authorization attempt.
pub const PENDING_SESSION_TTL: Duration = Duration::seconds(600);

const KEY_PREFIX: &str = "oauth:";

/// Authorization attempt persisted between `initiate` and `complete`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOAuthSession {
	/// Provider the user picked.
	pub provider: Provider,
	/// Upstream identity provider derived from `provider`.
	pub idp: Provider,
	/// PKCE verifier that must accompany the code exchange.
	pub code_verifier: String,
	/// Creation instant.
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
}
impl PendingOAuthSession {
	/// Creates a session stamped with the current clock.
	pub fn new(provider: Provider, code_verifier: impl Into<String>) -> Self {
		Self {
			provider,
			idp: provider.idp(),
			code_verifier: code_verifier.into(),
			created_at: OffsetDateTime::now_utc(),
		}
	}
}
impl Debug for PendingOAuthSession {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PendingOAuthSession")
			.field("provider", &self.provider)
			.field("idp", &self.idp)
			.field("code_verifier", &"<redacted>")
			.field("created_at", &self.created_at)
			.finish()
	}
}

/// Write-once, read-once store of [`PendingOAuthSession`] records keyed by `oauth:<state>`.
#[derive(Clone)]
pub struct PendingSessionStore {
	store: Arc<dyn KeyValueStore>,
}
impl PendingSessionStore {
	/// Wraps the shared keyed store.
	pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
		Self { store }
	}

	/// Persists `session` under `state` for `ttl`.
	pub async fn put(
		&self,
		state: &LoginState,
		session: &PendingOAuthSession,
		ttl: Duration,
	) -> Result<(), StoreError> {
		store::put_json(self.store.as_ref(), &Self::key(state), session, Some(ttl)).await
	}

	/// Loads the session stored under `state`, if it has not expired or been consumed.
	pub async fn get(&self, state: &LoginState) -> Result<Option<PendingOAuthSession>, StoreError> {
		store::get_json(self.store.as_ref(), &Self::key(state)).await
	}

	/// Removes the session stored under `state`; missing sessions are ignored.
	pub async fn delete(&self, state: &LoginState) -> Result<(), StoreError> {
		self.store.delete(&Self::key(state)).await
	}

	/// Storage key used for `state`.
	pub fn key(state: &LoginState) -> String {
		format!("{KEY_PREFIX}{state}")
	}
}
impl Debug for PendingSessionStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("PendingSessionStore(..)")
	}
}
