use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

// Header carrying the caller's API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Who is calling, resolved fresh for every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Keyed { key: String, owner: String },
    // no valid key, classified by network origin
    Anonymous { origin: String },
}

/// Bucket key for rate limiting. Tagged so a key can never collide with an address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    Key(String),
    Origin(String),
}

impl Identity {
    pub fn is_keyed(&self) -> bool {
        matches!(self, Identity::Keyed { .. })
    }

    pub fn owner(&self) -> Option<&str> {
        match self {
            Identity::Keyed { owner, .. } => Some(owner),
            Identity::Anonymous { .. } => None,
        }
    }

    pub fn key(&self) -> IdentityKey {
        match self {
            Identity::Keyed { key, .. } => IdentityKey::Key(key.clone()),
            Identity::Anonymous { origin } => IdentityKey::Origin(origin.clone()),
        }
    }
}

// Never print raw keys, only a fingerprint
impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Keyed { key, owner } => write!(f, "key:{} ({})", fingerprint(key), owner),
            Identity::Anonymous { origin } => write!(f, "ip:{}", origin),
        }
    }
}

/// Short SHA-256 prefix of a credential, safe to log.
pub fn fingerprint(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    format!("{:x}", digest)[..8].to_string()
}

/// Source of truth for API keys, shared across request tasks.
pub trait CredentialStore: Send + Sync {
    /// Owner display name for `key`, if the key is known.
    fn owner_of(&self, key: &str) -> Option<String>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Fixed key table loaded at startup
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    keys: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new(keys: HashMap<String, String>) -> Self {
        Self { keys }
    }
}

impl FromIterator<(String, String)> for StaticCredentials {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl CredentialStore for StaticCredentials {
    fn owner_of(&self, key: &str) -> Option<String> {
        self.keys.get(key).cloned()
    }

    fn len(&self) -> usize {
        self.keys.len()
    }
}

#[derive(Clone)]
pub struct IdentityResolver {
    credentials: Arc<dyn CredentialStore>,
}

impl IdentityResolver {
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Self {
        Self { credentials }
    }

    // Unknown keys fall back to the origin, they are not an error
    pub fn resolve(&self, credential: Option<&str>, source: &str) -> Identity {
        if let Some(key) = credential {
            if let Some(owner) = self.credentials.owner_of(key) {
                return Identity::Keyed {
                    key: key.to_string(),
                    owner,
                };
            }
        }
        Identity::Anonymous {
            origin: source.to_string(),
        }
    }
}
