//! Environment-driven configuration and the wiring helpers that turn it into a [`Broker`].

// std
use std::{net::SocketAddr, path::PathBuf};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::ConfigError,
	flows::{BatchPolicy, Broker},
	http::{DEFAULT_TIMEOUT, UpstreamHttpClient},
	protocol::{BearerJsonAdapter, CborCookieAdapter, ProtocolAdapter},
	repository::{AccountRepository, IndexedAccounts, SnapshotAccounts},
	store::{FileStore, KeyValueStore, MemoryStore},
};

/// Shared bearer secret guarding every route.
pub const SECRET_VAR: &str = "APP_SECRET";
/// Listen address.
pub const BIND_VAR: &str = "ACCOUNT_BROKER_BIND";
/// Upstream protocol strategy.
pub const PROTOCOL_VAR: &str = "ACCOUNT_BROKER_PROTOCOL";
/// JSON file backing the keyed store; in-memory when unset.
pub const STORE_PATH_VAR: &str = "ACCOUNT_BROKER_STORE_PATH";
/// Account persistence layout.
pub const LAYOUT_VAR: &str = "ACCOUNT_BROKER_LAYOUT";
/// CBOR portal base URL.
pub const PORTAL_URL_VAR: &str = "ACCOUNT_BROKER_PORTAL_URL";
/// JSON auth service base URL.
pub const AUTH_URL_VAR: &str = "ACCOUNT_BROKER_AUTH_URL";
/// JSON usage service base URL.
pub const USAGE_URL_VAR: &str = "ACCOUNT_BROKER_USAGE_URL";
/// Redirect URI registered with the upstream.
pub const REDIRECT_URI_VAR: &str = "ACCOUNT_BROKER_REDIRECT_URI";
/// Profile ARN sent with JSON usage queries.
pub const PROFILE_ARN_VAR: &str = "ACCOUNT_BROKER_PROFILE_ARN";
/// Upstream request timeout in seconds.
pub const TIMEOUT_SECS_VAR: &str = "ACCOUNT_BROKER_TIMEOUT_SECS";
/// Pause between batch refresh targets in milliseconds.
pub const BATCH_DELAY_MS_VAR: &str = "ACCOUNT_BROKER_BATCH_DELAY_MS";
/// Period of the background batch refresh in seconds; disabled when unset or zero.
pub const AUTO_REFRESH_SECS_VAR: &str = "ACCOUNT_BROKER_AUTO_REFRESH_SECS";

const DEFAULT_BIND: &str = "127.0.0.1:3000";
const DEFAULT_PORTAL_URL: &str = "https://app.kiro.dev";
const DEFAULT_AUTH_URL: &str = "https://prod.us-east-1.auth.desktop.kiro.dev";
const DEFAULT_USAGE_URL: &str = "https://codewhisperer.us-east-1.amazonaws.com";
const DEFAULT_REDIRECT_URI: &str = "https://app.kiro.dev/signin/oauth";

/// Upstream wire protocol.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProtocolKind {
	/// CBOR RPC with cookie-borne tokens.
	#[default]
	CborCookie,
	/// JSON REST with bearer tokens.
	BearerJson,
}
impl FromStr for ProtocolKind {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"cbor-cookie" | "cbor" => Ok(Self::CborCookie),
			"bearer-json" | "json" => Ok(Self::BearerJson),
			_ => Err(ConfigError::InvalidValue { key: PROTOCOL_VAR, value: s.to_owned() }),
		}
	}
}

/// Account persistence layout inside the keyed store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StoreLayout {
	/// One record per account plus an id index.
	#[default]
	Indexed,
	/// A single JSON array holding every account.
	Snapshot,
}
impl FromStr for StoreLayout {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"indexed" => Ok(Self::Indexed),
			"snapshot" => Ok(Self::Snapshot),
			_ => Err(ConfigError::InvalidValue { key: LAYOUT_VAR, value: s.to_owned() }),
		}
	}
}

/// Resolved process configuration.
#[derive(Clone, Debug)]
pub struct Config {
	/// Bearer secret; requests fail with a misconfiguration error while it is absent.
	pub secret: Option<TokenSecret>,
	/// Listen address.
	pub bind: SocketAddr,
	/// Upstream protocol strategy.
	pub protocol: ProtocolKind,
	/// Keyed store file; `None` keeps everything in memory.
	pub store_path: Option<PathBuf>,
	/// Account layout inside the store.
	pub layout: StoreLayout,
	/// CBOR portal base URL.
	pub portal_url: Url,
	/// JSON auth service base URL.
	pub auth_url: Url,
	/// JSON usage service base URL.
	pub usage_url: Url,
	/// Redirect URI registered with the upstream.
	pub redirect_uri: Url,
	/// Profile ARN override for JSON usage queries.
	pub profile_arn: Option<String>,
	/// Upstream request timeout.
	pub timeout: StdDuration,
	/// Pause between batch refresh targets.
	pub batch_delay: StdDuration,
	/// Background batch refresh period.
	pub auto_refresh: Option<StdDuration>,
}
impl Config {
	/// Loads `.env` when present, then reads the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		let _ = dotenvy::dotenv();

		Self::from_lookup(|key| std::env::var(key).ok())
	}

	/// Builds the configuration from an arbitrary variable source.
	///
	/// Blank values count as unset.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let var = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());
		let url = |key: &'static str, default: &str| {
			let raw = var(key).unwrap_or_else(|| default.to_owned());

			Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl { key, source })
		};
		let number = |key: &'static str| -> Result<Option<u64>, ConfigError> {
			var(key)
				.map(|raw| {
					raw.parse::<u64>().map_err(|_| ConfigError::InvalidValue { key, value: raw })
				})
				.transpose()
		};
		let bind_raw = var(BIND_VAR).unwrap_or_else(|| DEFAULT_BIND.to_owned());
		let bind = bind_raw
			.parse()
			.map_err(|_| ConfigError::InvalidValue { key: BIND_VAR, value: bind_raw.clone() })?;
		let timeout = match number(TIMEOUT_SECS_VAR)? {
			Some(0) =>
				return Err(ConfigError::InvalidValue { key: TIMEOUT_SECS_VAR, value: "0".into() }),
			Some(secs) => StdDuration::from_secs(secs),
			None => DEFAULT_TIMEOUT,
		};

		Ok(Self {
			secret: TokenSecret::non_empty(var(SECRET_VAR)),
			bind,
			protocol: var(PROTOCOL_VAR)
				.map(|raw| raw.parse::<ProtocolKind>())
				.transpose()?
				.unwrap_or_default(),
			store_path: var(STORE_PATH_VAR).map(PathBuf::from),
			layout: var(LAYOUT_VAR)
				.map(|raw| raw.parse::<StoreLayout>())
				.transpose()?
				.unwrap_or_default(),
			portal_url: url(PORTAL_URL_VAR, DEFAULT_PORTAL_URL)?,
			auth_url: url(AUTH_URL_VAR, DEFAULT_AUTH_URL)?,
			usage_url: url(USAGE_URL_VAR, DEFAULT_USAGE_URL)?,
			redirect_uri: url(REDIRECT_URI_VAR, DEFAULT_REDIRECT_URI)?,
			profile_arn: var(PROFILE_ARN_VAR),
			timeout,
			batch_delay: number(BATCH_DELAY_MS_VAR)?
				.map(StdDuration::from_millis)
				.unwrap_or(BatchPolicy::DEFAULT_DELAY),
			auto_refresh: number(AUTO_REFRESH_SECS_VAR)?
				.filter(|secs| *secs > 0)
				.map(StdDuration::from_secs),
		})
	}

	/// Builds the configured protocol adapter.
	pub fn build_adapter(&self) -> Result<Arc<dyn ProtocolAdapter>, ConfigError> {
		let http = UpstreamHttpClient::with_timeout(self.timeout)?;

		let adapter: Arc<dyn ProtocolAdapter> = match self.protocol {
			ProtocolKind::CborCookie =>
				Arc::new(CborCookieAdapter::new(http, self.portal_url.clone())),
			ProtocolKind::BearerJson => {
				let adapter =
					BearerJsonAdapter::new(http, self.auth_url.clone(), self.usage_url.clone());

				match &self.profile_arn {
					Some(arn) => Arc::new(adapter.with_profile_arn(arn.clone())),
					None => Arc::new(adapter),
				}
			},
		};

		Ok(adapter)
	}

	/// Opens the keyed store: file-backed when a path is configured, in-memory otherwise.
	pub fn build_store(&self) -> Result<Arc<dyn KeyValueStore>> {
		let store: Arc<dyn KeyValueStore> = match &self.store_path {
			Some(path) => Arc::new(FileStore::open(path.clone())?),
			None => Arc::new(MemoryStore::default()),
		};

		Ok(store)
	}

	/// Wraps `store` in the configured account layout.
	pub fn build_repository(&self, store: Arc<dyn KeyValueStore>) -> Arc<dyn AccountRepository> {
		match self.layout {
			StoreLayout::Indexed => Arc::new(IndexedAccounts::new(store)),
			StoreLayout::Snapshot => Arc::new(SnapshotAccounts::new(store)),
		}
	}

	/// Wires adapter, store, and repository into a [`Broker`].
	pub fn build_broker(&self) -> Result<Broker> {
		let adapter = self.build_adapter()?;
		let store = self.build_store()?;
		let accounts = self.build_repository(store.clone());

		Ok(Broker::new(adapter, accounts, store, self.redirect_uri.clone())
			.with_batch_policy(BatchPolicy::default().with_delay(self.batch_delay)))
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn lookup(pairs: &[(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
		let map: HashMap<&str, &str> = pairs.iter().copied().collect();

		move |key| map.get(key).map(|v| (*v).to_owned())
	}

	#[test]
	fn defaults_apply_when_nothing_is_set() {
		let config = Config::from_lookup(lookup(&[])).expect("Defaults should be valid.");

		assert!(config.secret.is_none());
		assert_eq!(config.bind.to_string(), DEFAULT_BIND);
		assert_eq!(config.protocol, ProtocolKind::CborCookie);
		assert_eq!(config.layout, StoreLayout::Indexed);
		assert_eq!(config.timeout, StdDuration::from_secs(30));
		assert_eq!(config.batch_delay, StdDuration::from_millis(500));
		assert_eq!(config.redirect_uri.as_str(), DEFAULT_REDIRECT_URI);
		assert!(config.auto_refresh.is_none());
		assert!(config.store_path.is_none());
	}

	#[test]
	fn overrides_are_parsed() {
		let config = Config::from_lookup(lookup(&[
			(SECRET_VAR, "s3cret"),
			(PROTOCOL_VAR, "Bearer-JSON"),
			(LAYOUT_VAR, "snapshot"),
			(TIMEOUT_SECS_VAR, "5"),
			(BATCH_DELAY_MS_VAR, "0"),
			(AUTO_REFRESH_SECS_VAR, "600"),
			(PROFILE_ARN_VAR, "arn:aws:test"),
		]))
		.expect("Overrides should be valid.");

		assert_eq!(config.secret.as_ref().map(TokenSecret::expose), Some("s3cret"));
		assert_eq!(config.protocol, ProtocolKind::BearerJson);
		assert_eq!(config.layout, StoreLayout::Snapshot);
		assert_eq!(config.timeout, StdDuration::from_secs(5));
		assert_eq!(config.batch_delay, StdDuration::ZERO);
		assert_eq!(config.auto_refresh, Some(StdDuration::from_secs(600)));
		assert_eq!(config.profile_arn.as_deref(), Some("arn:aws:test"));
	}

	#[test]
	fn invalid_values_are_reported_by_key() {
		let err = Config::from_lookup(lookup(&[(PROTOCOL_VAR, "grpc")]))
			.expect_err("Unknown protocols must be rejected.");

		assert!(matches!(err, ConfigError::InvalidValue { key: PROTOCOL_VAR, .. }));

		let err = Config::from_lookup(lookup(&[(AUTH_URL_VAR, "not a url")]))
			.expect_err("Malformed URLs must be rejected.");

		assert!(matches!(err, ConfigError::InvalidUrl { key: AUTH_URL_VAR, .. }));

		let err = Config::from_lookup(lookup(&[(TIMEOUT_SECS_VAR, "0")]))
			.expect_err("A zero timeout must be rejected.");

		assert!(matches!(err, ConfigError::InvalidValue { key: TIMEOUT_SECS_VAR, .. }));
	}

	#[tokio::test]
	async fn broker_wiring_follows_the_selected_protocol() {
		let config = Config::from_lookup(lookup(&[(PROTOCOL_VAR, "bearer-json")]))
			.expect("Config should be valid.");
		let broker = config.build_broker().expect("Broker should build.");

		assert_eq!(broker.adapter.name(), "bearer-json");
		assert!(broker.list_accounts().await.expect("Listing should succeed.").is_empty());
	}
}
