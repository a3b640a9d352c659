//! Whole-collection layout: every account lives in one JSON array.

// self
use crate::{
	_prelude::*,
	auth::{Account, AccountId},
	repository::{self, AccountRepository, RepositoryFuture},
	store::{self, KeyValueStore},
};

const SNAPSHOT_KEY: &str = "accounts";

/// Stores the full account list under a single `accounts` key.
///
/// Each mutation rewrites the whole array, which keeps the layout readable by tooling that
/// only understands the desktop export format.
#[derive(Clone)]
pub struct SnapshotAccounts {
	store: Arc<dyn KeyValueStore>,
}
impl SnapshotAccounts {
	/// Wraps the shared keyed store.
	pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
		Self { store }
	}

	async fn load(&self) -> Result<Vec<Account>> {
		Ok(store::get_json(self.store.as_ref(), SNAPSHOT_KEY).await?.unwrap_or_default())
	}

	async fn persist(&self, accounts: &[Account]) -> Result<()> {
		Ok(store::put_json(self.store.as_ref(), SNAPSHOT_KEY, accounts, None).await?)
	}

	async fn find(&self, id: &AccountId) -> Result<Option<Account>> {
		Ok(self.load().await?.into_iter().find(|account| &account.id == id))
	}

	async fn upsert(&self, account: Account) -> Result<Account> {
		let mut accounts = self.load().await?;
		let stored = match accounts
			.iter_mut()
			.find(|stored| stored.same_identity(&account.email, account.provider))
		{
			Some(existing) => {
				*existing = repository::merge_into(existing, account);

				existing.clone()
			},
			None => {
				accounts.insert(0, account.clone());

				account
			},
		};

		self.persist(&accounts).await?;

		Ok(stored)
	}

	async fn replace(&self, account: Account) -> Result<Account> {
		let mut accounts = self.load().await?;

		match accounts.iter_mut().find(|stored| stored.id == account.id) {
			Some(existing) => *existing = account.clone(),
			None => accounts.insert(0, account.clone()),
		}

		self.persist(&accounts).await?;

		Ok(account)
	}

	async fn remove(&self, ids: &[AccountId]) -> Result<usize> {
		let mut accounts = self.load().await?;
		let before = accounts.len();

		accounts.retain(|account| !ids.contains(&account.id));

		let removed = before - accounts.len();

		if removed > 0 {
			self.persist(&accounts).await?;
		}

		Ok(removed)
	}
}
impl AccountRepository for SnapshotAccounts {
	fn list(&self) -> RepositoryFuture<'_, Vec<Account>> {
		Box::pin(self.load())
	}

	fn get<'a>(&'a self, id: &'a AccountId) -> RepositoryFuture<'a, Option<Account>> {
		Box::pin(self.find(id))
	}

	fn upsert_by_email_provider(&self, account: Account) -> RepositoryFuture<'_, Account> {
		Box::pin(self.upsert(account))
	}

	fn save(&self, account: Account) -> RepositoryFuture<'_, Account> {
		Box::pin(self.replace(account))
	}

	fn delete_many<'a>(&'a self, ids: &'a [AccountId]) -> RepositoryFuture<'a, usize> {
		Box::pin(self.remove(ids))
	}
}
impl Debug for SnapshotAccounts {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("SnapshotAccounts(..)")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{auth::Provider, store::MemoryStore};

	#[tokio::test]
	async fn snapshot_layout_keeps_one_array_newest_first() {
		let backend = Arc::new(MemoryStore::default());
		let accounts = SnapshotAccounts::new(backend.clone());
		let first = accounts
			.upsert_by_email_provider(Account::new("a@b.com", Provider::Google))
			.await
			.expect("Insert should succeed.");
		let second = accounts
			.upsert_by_email_provider(Account::new("c@d.com", Provider::Google))
			.await
			.expect("Insert should succeed.");
		let mut labelled = first.clone();

		labelled.label = Some("primary".into());
		accounts.save(labelled).await.expect("Save should succeed.");

		let listed = accounts.list().await.expect("List should succeed.");

		assert_eq!(listed.len(), 2);
		assert_eq!(listed[0].id, second.id);
		assert_eq!(listed[1].label.as_deref(), Some("primary"));
		assert_eq!(backend.len(), 1);
		assert!(backend.contains_key("accounts"));

		let merged = accounts
			.upsert_by_email_provider(Account::new("a@b.com", Provider::Google))
			.await
			.expect("Merge should succeed.");

		assert_eq!(merged.id, first.id);
		assert_eq!(merged.label.as_deref(), Some("primary"));
		assert_eq!(
			accounts.delete_many(&[first.id, second.id]).await.expect("Delete should succeed."),
			2
		);
		assert!(accounts.list().await.expect("List should succeed.").is_empty());
	}
}
