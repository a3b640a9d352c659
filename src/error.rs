//! Broker-level error types shared across flows, adapters, repositories, and the HTTP surface.

// self
use crate::_prelude::*;

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem (missing secret, malformed setting, client build failure).
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Upstream identity/usage service failure.
	#[error(transparent)]
	Upstream(#[from] UpstreamError),

	/// Caller supplied invalid input.
	#[error("Validation failed: {reason}.")]
	Validation {
		/// Human-readable reason.
		reason: String,
	},
	/// Pending authorization state is missing, expired, or already consumed.
	#[error("Login state expired: {reason}.")]
	SessionExpired {
		/// Human-readable reason.
		reason: String,
	},
	/// Upstream explicitly reported that the account is banned or locked.
	#[error("Account is suspended: {message}.")]
	Suspended {
		/// Upstream-supplied message.
		message: String,
	},
	/// No account matches the requested identifier.
	#[error("Account `{id}` was not found.")]
	AccountNotFound {
		/// Requested account identifier.
		id: String,
	},
	/// Account exists but lacks a credential required by the operation.
	#[error("Account is missing its {field}.")]
	MissingCredentials {
		/// Missing credential label.
		field: &'static str,
	},
	/// Bearer credential missing or mismatched.
	#[error("Unauthorized.")]
	Unauthorized,
}
impl Error {
	/// Convenience constructor for [`Error::Validation`].
	pub fn validation(reason: impl Into<String>) -> Self {
		Self::Validation { reason: reason.into() }
	}

	/// Convenience constructor for [`Error::SessionExpired`].
	pub fn session_expired(reason: impl Into<String>) -> Self {
		Self::SessionExpired { reason: reason.into() }
	}

	/// Returns `true` when the error is an explicit suspension signal.
	pub fn is_suspended(&self) -> bool {
		matches!(self, Self::Suspended { .. })
	}
}

/// Configuration and validation failures raised while wiring the broker.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// The shared bearer secret is not configured.
	#[error("Server misconfigured: APP_SECRET is missing.")]
	MissingSecret,
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// A configured URL cannot be parsed.
	#[error("Setting `{key}` is not a valid URL.")]
	InvalidUrl {
		/// Setting name.
		key: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A setting holds a value outside its accepted range.
	#[error("Setting `{key}` has an invalid value `{value}`.")]
	InvalidValue {
		/// Setting name.
		key: &'static str,
		/// Offending raw value.
		value: String,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Upstream protocol failures (non-2xx, undecodable payloads, transport errors, timeouts).
#[derive(Debug, ThisError)]
pub enum UpstreamError {
	/// Upstream answered with a non-success status.
	#[error("{message}")]
	Status {
		/// Decoded error body or a synthesized `Request failed (<status>)` message.
		message: String,
		/// HTTP status code.
		status: u16,
	},
	/// A success response could not be decoded into the expected shape.
	#[error("Upstream returned an undecodable {operation} response: {message}.")]
	Decode {
		/// Upstream operation name.
		operation: &'static str,
		/// Decoder failure summary, including the offending path when known.
		message: String,
	},
	/// A required field was absent from an otherwise successful response.
	#[error("Upstream {operation} response is missing {field}.")]
	MissingField {
		/// Upstream operation name.
		operation: &'static str,
		/// Missing field label.
		field: &'static str,
	},
	/// The request did not complete within the configured timeout.
	#[error("Upstream {operation} request timed out.")]
	Timeout {
		/// Upstream operation name.
		operation: &'static str,
	},
	/// Network-level failure (DNS, TCP, TLS).
	#[error("Network error occurred while calling upstream {operation}.")]
	Network {
		/// Upstream operation name.
		operation: &'static str,
		/// Transport-specific failure.
		#[source]
		source: BoxError,
	},
}
impl UpstreamError {
	/// Maps a reqwest failure, separating timeouts from other network errors.
	pub fn from_reqwest(operation: &'static str, e: ReqwestError) -> Self {
		if e.is_timeout() {
			Self::Timeout { operation }
		} else {
			Self::Network { operation, source: Box::new(e) }
		}
	}

	/// HTTP status associated with the failure, when one was received.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Status { status, .. } => Some(*status),
			_ => None,
		}
	}
}
