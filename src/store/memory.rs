//! Thread-safe in-memory [`KeyValueStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	store::{KeyValueStore, StoreError, StoreFuture, StoredEntry},
};

type StoreMap = Arc<RwLock<HashMap<String, StoredEntry>>>;

/// Thread-safe storage backend that keeps entries in-process for tests and demos.
///
/// Expired entries are evicted lazily on read.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Returns the number of live (non-expired) keys.
	pub fn len(&self) -> usize {
		let now = OffsetDateTime::now_utc();

		self.0.read().values().filter(|entry| !entry.is_expired_at(now)).count()
	}

	/// Returns `true` when no live key is stored.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Returns `true` when `key` holds a live value.
	pub fn contains_key(&self, key: &str) -> bool {
		Self::get_now(&self.0, key, OffsetDateTime::now_utc()).is_some()
	}

	fn get_now(map: &StoreMap, key: &str, now: OffsetDateTime) -> Option<String> {
		{
			let guard = map.read();

			match guard.get(key) {
				Some(entry) if !entry.is_expired_at(now) => return Some(entry.value.clone()),
				Some(_) => {},
				None => return None,
			}
		}

		let mut guard = map.write();

		if guard.get(key).is_some_and(|entry| entry.is_expired_at(now)) {
			guard.remove(key);
		}

		None
	}

	fn put_now(map: &StoreMap, key: &str, value: String, ttl: Option<Duration>) {
		let entry = StoredEntry::new(value, ttl, OffsetDateTime::now_utc());

		map.write().insert(key.to_owned(), entry);
	}
}
impl KeyValueStore for MemoryStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		Box::pin(async move { Ok(Self::get_now(&self.0, key, OffsetDateTime::now_utc())) })
	}

	fn put<'a>(
		&'a self,
		key: &'a str,
		value: String,
		ttl: Option<Duration>,
	) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			Self::put_now(&self.0, key, value, ttl);

			Ok::<_, StoreError>(())
		})
	}

	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.0.write().remove(key);

			Ok(())
		})
	}
}
