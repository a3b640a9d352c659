//! Account listing, partial updates, deletion, and export.

// self
use crate::{
	_prelude::*,
	auth::{Account, AccountId, TokenSecret},
	flows::{Broker, common},
};

/// Partial update accepted by [`Broker::update_account`]; absent fields keep their value.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountPatch {
	/// Display label.
	#[serde(default)]
	pub label: Option<String>,
	/// Access token.
	#[serde(default)]
	pub access_token: Option<TokenSecret>,
	/// Refresh token.
	#[serde(default)]
	pub refresh_token: Option<TokenSecret>,
	/// OIDC client identifier.
	#[serde(default)]
	pub client_id: Option<String>,
	/// OIDC client secret.
	#[serde(default)]
	pub client_secret: Option<TokenSecret>,
}
impl AccountPatch {
	/// Returns `true` when no field would change.
	pub fn is_empty(&self) -> bool {
		self.label.is_none()
			&& self.access_token.is_none()
			&& self.refresh_token.is_none()
			&& self.client_id.is_none()
			&& self.client_secret.is_none()
	}

	fn apply(self, account: &mut Account) {
		if let Some(label) = self.label {
			account.label = Some(label);
		}
		if let Some(token) = self.access_token {
			account.access_token = Some(token);
		}
		if let Some(token) = self.refresh_token {
			account.refresh_token = Some(token);
		}
		if let Some(client_id) = self.client_id {
			account.client_id = Some(client_id);
		}
		if let Some(secret) = self.client_secret {
			account.client_secret = Some(secret);
		}
	}
}
impl Debug for AccountPatch {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccountPatch")
			.field("label", &self.label)
			.field("access_token_set", &self.access_token.is_some())
			.field("refresh_token_set", &self.refresh_token.is_some())
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.finish()
	}
}

impl Broker {
	/// Returns every stored account, newest first.
	pub async fn list_accounts(&self) -> Result<Vec<Account>> {
		self.accounts.list().await
	}

	/// Applies `patch` to the account stored under `id`.
	pub async fn update_account(&self, id: &AccountId, patch: AccountPatch) -> Result<Account> {
		let mut account = self
			.accounts
			.get(id)
			.await?
			.ok_or_else(|| Error::AccountNotFound { id: id.to_string() })?;

		patch.apply(&mut account);
		account.touch();

		self.accounts.save(account).await
	}

	/// Deletes the listed accounts and returns how many existed.
	pub async fn delete_accounts(&self, ids: &[AccountId]) -> Result<usize> {
		if ids.is_empty() {
			return Err(Error::validation("ids must not be empty"));
		}

		let deleted = self.accounts.delete_many(ids).await?;

		common::prune_flow_guards(self, ids);
		tracing::info!(requested = ids.len(), deleted, "Accounts deleted.");

		Ok(deleted)
	}

	/// Returns full credential bundles, restricted to `ids` when it is non-empty.
	pub async fn export_accounts(&self, ids: &[AccountId]) -> Result<Vec<Account>> {
		let accounts = self.accounts.list().await?;

		if ids.is_empty() {
			return Ok(accounts);
		}

		Ok(accounts.into_iter().filter(|account| ids.contains(&account.id)).collect())
	}
}
