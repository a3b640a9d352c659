//! Account-domain identifiers, provider selectors, secrets, and the credential bundle model.

pub mod account;
pub mod id;
pub mod provider;
pub mod secret;

pub use account::*;
pub use id::*;
pub use provider::*;
pub use secret::*;
