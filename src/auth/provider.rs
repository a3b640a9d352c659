//! Social identity providers accepted by the upstream sign-in service.

// self
use crate::_prelude::*;

/// User-facing provider choice; doubles as the upstream `idp` selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
	/// Google sign-in.
	Google,
	/// GitHub sign-in (the upstream spells it `Github`).
	Github,
}
impl Provider {
	/// Every provider the upstream accepts.
	pub const ALL: [Provider; 2] = [Provider::Google, Provider::Github];

	/// Returns the wire label used by the upstream service.
	pub const fn as_str(self) -> &'static str {
		match self {
			Provider::Google => "Google",
			Provider::Github => "Github",
		}
	}

	/// Derives the upstream `idp` for this provider.
	pub const fn idp(self) -> Provider {
		self
	}

	/// Guesses the provider from an email address when the caller did not name one.
	pub fn infer_from_email(email: &str) -> Provider {
		if email.contains("github") { Provider::Github } else { Provider::Google }
	}
}
impl Display for Provider {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for Provider {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		let trimmed = s.trim();

		Provider::ALL
			.into_iter()
			.find(|provider| provider.as_str().eq_ignore_ascii_case(trimmed))
			.ok_or_else(|| Error::validation(format!("Unsupported provider `{trimmed}`")))
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn parses_known_providers_case_insensitively() {
		assert_eq!("Google".parse::<Provider>().expect("Google should parse."), Provider::Google);
		assert_eq!("github".parse::<Provider>().expect("github should parse."), Provider::Github);

		let err = "Apple".parse::<Provider>().expect_err("Unknown providers must be rejected.");

		assert!(matches!(err, Error::Validation { .. }));
	}

	#[test]
	fn infers_provider_from_email() {
		assert_eq!(Provider::infer_from_email("someone@gmail.com"), Provider::Google);
		assert_eq!(Provider::infer_from_email("dev@users.github.com"), Provider::Github);
		assert_eq!(Provider::infer_from_email("a@b.com"), Provider::Google);
	}

	#[test]
	fn serializes_with_upstream_labels() {
		assert_eq!(
			serde_json::to_string(&Provider::Github).expect("Provider should serialize."),
			"\"Github\""
		);
	}
}
