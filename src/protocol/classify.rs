//! Failure classification for non-success upstream answers.
//!
//! Each strategy carries its own ban signal: the CBOR portal answers 423 or names
//! `AccountSuspendedException` in its error, while the JSON service attaches a `reason` to
//! the error body. Everything else becomes [`UpstreamError::Status`].

// crates.io
use serde_json::Value;
// self
use crate::{_prelude::*, error::UpstreamError};

/// HTTP status used by the upstream to signal a locked account.
pub const LOCKED_STATUS: u16 = 423;
/// Error name the CBOR portal uses for banned accounts.
pub const SUSPENSION_MARKER: &str = "AccountSuspendedException";

/// Message used when an error body cannot be decoded.
pub fn generic_failure(status: u16) -> String {
	format!("Request failed ({status})")
}

/// Renders a decoded CBOR error body; text bodies are used verbatim, structures as JSON.
pub fn cbor_error_message(body: &[u8], status: u16) -> String {
	match ciborium::from_reader::<ciborium::Value, _>(body) {
		Ok(ciborium::Value::Text(text)) => text,
		Ok(value) => value
			.deserialized::<Value>()
			.ok()
			.and_then(|json| serde_json::to_string(&json).ok())
			.unwrap_or_else(|| generic_failure(status)),
		Err(_) => generic_failure(status),
	}
}

/// Classifies a failed CBOR call.
pub fn cbor_failure(status: u16, body: &[u8]) -> Error {
	let message = cbor_error_message(body, status);

	if status == LOCKED_STATUS || message.contains(SUSPENSION_MARKER) {
		Error::Suspended { message }
	} else {
		UpstreamError::Status { message, status }.into()
	}
}

/// Classifies a failed JSON call.
pub fn json_failure(status: u16, body: &[u8]) -> Error {
	let decoded = serde_json::from_slice::<Value>(body).ok();

	if let Some(reason) = decoded.as_ref().and_then(|json| json.get("reason")).filter(|r| !r.is_null())
	{
		let message = match reason {
			Value::String(text) => text.clone(),
			other => other.to_string(),
		};

		return Error::Suspended { message };
	}

	let message = decoded
		.as_ref()
		.and_then(|json| json.get("message").or_else(|| json.get("error")))
		.and_then(Value::as_str)
		.filter(|text| !text.is_empty())
		.map(str::to_owned)
		.unwrap_or_else(|| generic_failure(status));

	if status == LOCKED_STATUS {
		Error::Suspended { message }
	} else {
		UpstreamError::Status { message, status }.into()
	}
}
