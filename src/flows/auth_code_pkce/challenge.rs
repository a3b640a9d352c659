//! PKCE verifier/challenge generation (RFC 7636, `S256`).

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

const VERIFIER_BYTES: usize = 32;

/// Supported PKCE challenge methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkceCodeChallengeMethod {
	/// SHA-256 based PKCE (RFC 7636 S256).
	S256,
}
impl PkceCodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub fn as_str(self) -> &'static str {
		match self {
			PkceCodeChallengeMethod::S256 => "S256",
		}
	}
}

/// Verifier plus its derived challenge.
#[derive(Clone)]
pub struct PkcePair {
	/// Secret verifier; must accompany the later code exchange.
	pub verifier: String,
	/// Public challenge sent when the attempt starts.
	pub challenge: String,
	/// Challenge method.
	pub method: PkceCodeChallengeMethod,
}
impl PkcePair {
	/// Generates a fresh verifier and derives its challenge.
	pub fn generate() -> Self {
		let verifier = new_verifier();
		let challenge = challenge(&verifier);

		Self { verifier, challenge, method: PkceCodeChallengeMethod::S256 }
	}
}
impl Debug for PkcePair {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PkcePair")
			.field("verifier", &"<redacted>")
			.field("challenge", &self.challenge)
			.field("method", &self.method)
			.finish()
	}
}

/// Returns 32 random bytes encoded as URL-safe, unpadded base64 (43 characters).
pub fn new_verifier() -> String {
	let mut bytes = [0_u8; VERIFIER_BYTES];

	rand::rng().fill(&mut bytes);

	URL_SAFE_NO_PAD.encode(bytes)
}

/// Derives the `S256` challenge: URL-safe, unpadded base64 of SHA-256 over the verifier bytes.
pub fn challenge(verifier: &str) -> String {
	URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
