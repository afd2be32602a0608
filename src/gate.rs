use std::collections::HashSet;

use crate::error::GateError;
use crate::identity::Identity;

/// Routes that require a keyed identity. Anything not listed is open.
#[derive(Debug, Clone, Default)]
pub struct AuthGate {
    gated: HashSet<String>,
}

impl AuthGate {
    pub fn new<I, S>(routes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            gated: routes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn requires_auth(&self, route: &str) -> bool {
        self.gated.contains(route)
    }

    pub fn check(&self, route: &str, identity: &Identity) -> Result<(), GateError> {
        if self.requires_auth(route) && !identity.is_keyed() {
            return Err(GateError::MissingOrInvalidCredential);
        }
        Ok(())
    }

    pub fn routes(&self) -> impl Iterator<Item = &str> {
        self.gated.iter().map(String::as_str)
    }
}
