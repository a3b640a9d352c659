//! Keyed-store contract and built-in backends shared by the account repository and the
//! pending-session store.

pub mod file;
pub mod memory;
pub mod pending;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use pending::*;

// self
use crate::_prelude::*;

/// Boxed future returned by [`KeyValueStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Durable key → string value persistence with optional per-key expiry.
///
/// The broker never assumes transactional semantics: concurrent writers race and the last
/// write wins.
pub trait KeyValueStore
where
	Self: Send + Sync,
{
	/// Fetches the live value stored under `key`; expired entries read as absent.
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

	/// Stores `value` under `key`, replacing any previous value.
	///
	/// When `ttl` is set the entry disappears once it elapses.
	fn put<'a>(&'a self, key: &'a str, value: String, ttl: Option<Duration>)
	-> StoreFuture<'a, ()>;

	/// Removes `key`. Deleting a missing key succeeds.
	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;
}

/// Error type produced by [`KeyValueStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced while encoding or decoding stored values.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
impl StoreError {
	/// Wraps a serde failure for the value stored under `key`.
	pub fn serialization(key: &str, e: impl Display) -> Self {
		Self::Serialization { message: format!("value under `{key}` is invalid: {e}") }
	}
}

/// Stored value plus its optional expiry instant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
	/// Raw value.
	pub value: String,
	/// Expiry instant, if the entry was written with a TTL.
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub expires_at: Option<OffsetDateTime>,
}
impl StoredEntry {
	/// Builds an entry whose expiry is `now + ttl`.
	pub fn new(value: String, ttl: Option<Duration>, now: OffsetDateTime) -> Self {
		Self { value, expires_at: ttl.map(|ttl| now + ttl) }
	}

	/// Returns `true` once the entry expired at `now`.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		self.expires_at.is_some_and(|expires_at| now >= expires_at)
	}
}

/// Reads and decodes a JSON value stored under `key`.
pub(crate) async fn get_json<T>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>, StoreError>
where
	T: for<'de> Deserialize<'de>,
{
	match store.get(key).await? {
		Some(raw) =>
			serde_json::from_str(&raw).map(Some).map_err(|e| StoreError::serialization(key, e)),
		None => Ok(None),
	}
}

/// Encodes `value` as JSON and stores it under `key`.
pub(crate) async fn put_json<T>(
	store: &dyn KeyValueStore,
	key: &str,
	value: &T,
	ttl: Option<Duration>,
) -> Result<(), StoreError>
where
	T: ?Sized + Serialize,
{
	let raw = serde_json::to_string(value).map_err(|e| StoreError::serialization(key, e))?;

	store.put(key, raw, ttl).await
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn entries_expire_at_their_deadline() {
		let now = OffsetDateTime::now_utc();
		let entry = StoredEntry::new("v".into(), Some(Duration::seconds(600)), now);

		assert!(!entry.is_expired_at(now + Duration::seconds(599)));
		assert!(entry.is_expired_at(now + Duration::seconds(600)));
		assert!(!StoredEntry::new("v".into(), None, now).is_expired_at(now + Duration::days(365)));
	}

	#[tokio::test]
	async fn json_helpers_report_corrupt_values() {
		let store = MemoryStore::default();

		store.put("k", "{not json".into(), None).await.expect("Raw put should succeed.");

		let err = get_json::<Vec<String>>(&store, "k")
			.await
			.expect_err("Corrupt JSON must surface as a serialization error.");

		assert!(matches!(err, StoreError::Serialization { .. }));
	}
}
