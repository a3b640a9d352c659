//! Account persistence keyed by identity, layered over a [`KeyValueStore`](crate::store::KeyValueStore).

pub mod indexed;
pub mod snapshot;

pub use indexed::IndexedAccounts;
pub use snapshot::SnapshotAccounts;

// self
use crate::{
	_prelude::*,
	auth::{Account, AccountId},
};

/// Boxed future returned by [`AccountRepository`] operations.
pub type RepositoryFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Persistence contract for credential bundles.
///
/// At most one record exists per `(email, provider)`. Writers race without a transactional
/// guard; the last write wins.
pub trait AccountRepository
where
	Self: Send + Sync,
{
	/// Returns every stored account, newest first.
	fn list(&self) -> RepositoryFuture<'_, Vec<Account>>;

	/// Fetches a single account.
	fn get<'a>(&'a self, id: &'a AccountId) -> RepositoryFuture<'a, Option<Account>>;

	/// Inserts `account` or merges it into the record sharing its `(email, provider)` pair.
	///
	/// Merging keeps the stored `id` and `created_at`; every other field comes from
	/// `account`, except a missing `label` which keeps the stored one.
	fn upsert_by_email_provider(&self, account: Account) -> RepositoryFuture<'_, Account>;

	/// Replaces the record stored under `account.id`, inserting it when absent.
	fn save(&self, account: Account) -> RepositoryFuture<'_, Account>;

	/// Removes the listed accounts, returning how many existed.
	fn delete_many<'a>(&'a self, ids: &'a [AccountId]) -> RepositoryFuture<'a, usize>;
}

/// Folds `incoming` into `existing`, preserving identity and creation time.
pub(crate) fn merge_into(existing: &Account, incoming: Account) -> Account {
	let label = incoming.label.or_else(|| existing.label.clone());

	Account {
		id: existing.id.clone(),
		created_at: existing.created_at,
		updated_at: OffsetDateTime::now_utc(),
		label,
		..incoming
	}
}
