//! Rate limit policies.

use std::time::Duration;

use super::identity::IdentityKind;

/// A fixed-window rate limit: at most `limit` requests per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Maximum requests allowed in the window
    pub limit: u64,
    /// Lifetime of a counter, fixed at creation
    pub window: Duration,
}

impl Policy {
    /// Create a new policy.
    pub fn new(limit: u64, window: Duration) -> Self {
        Self { limit, window }
    }
}

/// One policy per identity kind.
///
/// Both policies share the same window in this design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicySet {
    /// Policy applied to requests carrying a credential
    pub credential: Policy,
    /// Policy applied to requests identified by address
    pub address: Policy,
}

impl PolicySet {
    /// Create a policy set from the per-kind limits and a shared window.
    pub fn new(credential_limit: u64, address_limit: u64, window: Duration) -> Self {
        Self {
            credential: Policy::new(credential_limit, window),
            address: Policy::new(address_limit, window),
        }
    }

    /// Get the policy for an identity kind.
    pub fn for_kind(&self, kind: IdentityKind) -> &Policy {
        match kind {
            IdentityKind::Credential => &self.credential,
            IdentityKind::Address => &self.address,
        }
    }
}
