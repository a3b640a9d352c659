//! High-level credential flows orchestrated by the [`Broker`].

pub mod auth_code_pkce;
pub mod batch;
pub mod common;
pub mod import;
pub mod maintenance;
pub mod refresh;

pub use auth_code_pkce::*;
pub use batch::*;
pub use import::*;
pub use maintenance::*;
pub use refresh::*;

// self
use crate::{
	_prelude::*,
	auth::AccountId,
	protocol::ProtocolAdapter,
	repository::AccountRepository,
	store::{KeyValueStore, PendingSessionStore},
};

/// Coordinates sign-in, refresh, and maintenance flows against one upstream protocol.
///
/// The broker owns the protocol adapter, the account repository, and the pending-session
/// store so individual flows only deal with their own sequencing. Every handle is injected at
/// construction; cloning shares them.
#[derive(Clone)]
pub struct Broker {
	/// Upstream protocol strategy.
	pub adapter: Arc<dyn ProtocolAdapter>,
	/// Account persistence.
	pub accounts: Arc<dyn AccountRepository>,
	/// Pending authorization attempts.
	pub sessions: PendingSessionStore,
	/// Redirect URI registered with the upstream.
	pub redirect_uri: Url,
	/// Pacing and selection rules for batch refreshes.
	pub batch_policy: BatchPolicy,
	/// Shared counters for refresh outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
	flow_guards: Arc<Mutex<HashMap<AccountId, Arc<AsyncMutex<()>>>>>,
}
impl Broker {
	/// Creates a broker; pending sessions live in `store` next to whatever else it holds.
	pub fn new(
		adapter: Arc<dyn ProtocolAdapter>,
		accounts: Arc<dyn AccountRepository>,
		store: Arc<dyn KeyValueStore>,
		redirect_uri: Url,
	) -> Self {
		Self {
			adapter,
			accounts,
			sessions: PendingSessionStore::new(store),
			redirect_uri,
			batch_policy: BatchPolicy::default(),
			refresh_metrics: Default::default(),
			flow_guards: Default::default(),
		}
	}

	/// Replaces the batch pacing policy.
	pub fn with_batch_policy(mut self, policy: BatchPolicy) -> Self {
		self.batch_policy = policy;

		self
	}
}
impl Debug for Broker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker")
			.field("adapter", &self.adapter.name())
			.field("redirect_uri", &self.redirect_uri.as_str())
			.field("batch_policy", &self.batch_policy)
			.finish()
	}
}
