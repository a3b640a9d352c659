//! One key per account plus an ordered id index.

// self
use crate::{
	_prelude::*,
	auth::{Account, AccountId},
	repository::{self, AccountRepository, RepositoryFuture},
	store::{self, KeyValueStore},
};

const LIST_KEY: &str = "accounts:list";
const ACCOUNT_PREFIX: &str = "account:";

/// Stores each account under `account:<id>` and keeps the ordering in `accounts:list`.
///
/// Index entries whose record disappeared are skipped while listing.
#[derive(Clone)]
pub struct IndexedAccounts {
	store: Arc<dyn KeyValueStore>,
}
impl IndexedAccounts {
	/// Wraps the shared keyed store.
	pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
		Self { store }
	}

	/// Storage key of a single account record.
	pub fn account_key(id: &AccountId) -> String {
		format!("{ACCOUNT_PREFIX}{id}")
	}

	async fn load_index(&self) -> Result<Vec<AccountId>> {
		Ok(store::get_json(self.store.as_ref(), LIST_KEY).await?.unwrap_or_default())
	}

	async fn save_index(&self, ids: &[AccountId]) -> Result<()> {
		Ok(store::put_json(self.store.as_ref(), LIST_KEY, ids, None).await?)
	}

	async fn load(&self, id: &AccountId) -> Result<Option<Account>> {
		Ok(store::get_json(self.store.as_ref(), &Self::account_key(id)).await?)
	}

	async fn store_record(&self, account: &Account) -> Result<()> {
		Ok(store::put_json(self.store.as_ref(), &Self::account_key(&account.id), account, None)
			.await?)
	}

	async fn list_all(&self) -> Result<Vec<Account>> {
		let ids = self.load_index().await?;
		let mut accounts = Vec::with_capacity(ids.len());

		for id in &ids {
			if let Some(account) = self.load(id).await? {
				accounts.push(account);
			}
		}

		Ok(accounts)
	}

	async fn upsert(&self, account: Account) -> Result<Account> {
		let accounts = self.list_all().await?;

		if let Some(existing) =
			accounts.iter().find(|stored| stored.same_identity(&account.email, account.provider))
		{
			let merged = repository::merge_into(existing, account);

			self.store_record(&merged).await?;

			return Ok(merged);
		}

		let mut ids = self.load_index().await?;

		ids.retain(|id| id != &account.id);
		ids.insert(0, account.id.clone());
		self.save_index(&ids).await?;
		self.store_record(&account).await?;

		Ok(account)
	}

	async fn replace(&self, account: Account) -> Result<Account> {
		let mut ids = self.load_index().await?;

		if !ids.contains(&account.id) {
			ids.insert(0, account.id.clone());
			self.save_index(&ids).await?;
		}

		self.store_record(&account).await?;

		Ok(account)
	}

	async fn remove(&self, targets: &[AccountId]) -> Result<usize> {
		let ids = self.load_index().await?;
		let (removed, kept): (Vec<_>, Vec<_>) =
			ids.into_iter().partition(|id| targets.contains(id));

		if removed.is_empty() {
			return Ok(0);
		}

		self.save_index(&kept).await?;

		for id in &removed {
			self.store.delete(&Self::account_key(id)).await?;
		}

		Ok(removed.len())
	}
}
impl AccountRepository for IndexedAccounts {
	fn list(&self) -> RepositoryFuture<'_, Vec<Account>> {
		Box::pin(self.list_all())
	}

	fn get<'a>(&'a self, id: &'a AccountId) -> RepositoryFuture<'a, Option<Account>> {
		Box::pin(self.load(id))
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
impl Debug for IndexedAccounts {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("IndexedAccounts(..)")
	}
}
