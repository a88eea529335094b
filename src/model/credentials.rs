use serde::{Deserialize, Serialize};
use std::fmt;

/// API credentials used to open a stream subscription.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub name: String,
    pub api_key: String,
    pub api_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("name", &self.name)
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .field("access_token", &"<redacted>")
            .field("access_token_secret", &"<redacted>")
            .finish()
    }
}

/// Credential lookups that cannot produce a usable set of keys. Always fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialsError {
    Unknown { name: String },
    NoneConfigured,
}

impl fmt::Display for CredentialsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialsError::Unknown { name } => write!(f, "unknown credentials {name}"),
            CredentialsError::NoneConfigured => write!(f, "no credentials are configured"),
        }
    }
}

impl std::error::Error for CredentialsError {}

/// Picks the named credentials, or the first available when no name is given.
pub fn select_credentials(
    available: &[Credentials],
    name: Option<&str>,
) -> Result<Credentials, CredentialsError> {
    match name {
        Some(name) => available
            .iter()
            .find(|candidate| candidate.name == name)
            .cloned()
            .ok_or_else(|| CredentialsError::Unknown {
                name: name.to_owned(),
            }),
        None => available
            .first()
            .cloned()
            .ok_or(CredentialsError::NoneConfigured),
    }
}
