//! Credential lifecycle broker: PKCE sign-in against an upstream identity service, protocol-
//! pluggable token refresh with suspension tracking, and a keyed account repository exposed
//! through a small bearer-guarded HTTP surface.

#![deny(clippy::all, unused_crate_dependencies)]
#![deny(missing_docs)]

pub mod auth;
pub mod config;
pub mod error;
pub mod flows;
pub mod http;
pub mod obs;
pub mod protocol;
pub mod repository;
pub mod server;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		flows::{BatchPolicy, Broker},
		http::UpstreamHttpClient,
		protocol::{BearerJsonAdapter, CborCookieAdapter, ProtocolAdapter},
		repository::{AccountRepository, IndexedAccounts},
		store::{KeyValueStore, MemoryStore},
	};

	/// Redirect URI used by test brokers.
	pub const TEST_REDIRECT_URI: &str = "https://app.example.com/signin/oauth";

	/// Builds an HTTP client with a short timeout suitable for stubbed upstreams.
	pub fn test_http_client() -> UpstreamHttpClient {
		UpstreamHttpClient::with_timeout(StdDuration::from_secs(5))
			.expect("Failed to build HTTP client for tests.")
	}

	/// Builds a CBOR/cookie adapter pointed at a stub portal.
	pub fn test_cbor_adapter(portal: &str) -> CborCookieAdapter {
		CborCookieAdapter::new(
			test_http_client(),
			Url::parse(portal).expect("Stub portal URL should parse."),
		)
	}

	/// Builds a bearer/JSON adapter pointed at stub auth + usage services.
	pub fn test_json_adapter(auth: &str, usage: &str) -> BearerJsonAdapter {
		BearerJsonAdapter::new(
			test_http_client(),
			Url::parse(auth).expect("Stub auth URL should parse."),
			Url::parse(usage).expect("Stub usage URL should parse."),
		)
	}

	/// Constructs a [`Broker`] backed by an in-memory store, the indexed account layout, and a
	/// zero-delay batch policy.
	pub fn build_test_broker(
		adapter: impl ProtocolAdapter + 'static,
	) -> (Broker, Arc<MemoryStore>, Arc<dyn AccountRepository>) {
		let backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn KeyValueStore> = backend.clone();
		let accounts: Arc<dyn AccountRepository> = Arc::new(IndexedAccounts::new(store.clone()));
		let broker = Broker::new(
			Arc::new(adapter),
			accounts.clone(),
			store,
			Url::parse(TEST_REDIRECT_URI).expect("Test redirect URI should parse."),
		)
		.with_batch_policy(BatchPolicy::default().with_delay(StdDuration::ZERO));

		(broker, backend, accounts)
	}
}

mod _prelude {
	pub use std::{
		collections::{HashMap, HashSet},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use url;

// Used by the server binary only.
use color_eyre as _;
#[cfg(test)] use {httpmock as _, tower as _};
