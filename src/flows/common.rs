//! Shared helpers for flow implementations.

// self
use crate::{_prelude::*, auth::AccountId, flows::Broker};

/// Returns (and creates on demand) the singleflight guard for an account.
///
/// Holding the guard serializes refreshes of one account inside this process; other
/// processes sharing the store still race with last-write-wins semantics.
pub(crate) fn flow_guard(broker: &Broker, id: &AccountId) -> Arc<AsyncMutex<()>> {
	let mut guards = broker.flow_guards.lock();

	guards.entry(id.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
}

/// Releases guards nobody else holds a handle to.
pub(crate) fn prune_flow_guards(broker: &Broker, ids: &[AccountId]) {
	let mut guards = broker.flow_guards.lock();

	for id in ids {
		if guards.get(id).is_some_and(|guard| Arc::strong_count(guard) == 1) {
			guards.remove(id);
		}
	}
}
