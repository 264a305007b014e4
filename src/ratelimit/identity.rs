//! Request identity and counter key generation.

use std::fmt;

/// The basis a request is counted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityKind {
    /// An API credential carried in a request header
    Credential,
    /// The host portion of the caller's network address
    Address,
}

impl IdentityKind {
    /// Prefix used for this kind in counter keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityKind::Credential => "token",
            IdentityKind::Address => "ip",
        }
    }
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The identity a single request is admitted under.
///
/// Credential and address are mutually exclusive: a request is counted
/// under exactly one of them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// Value of the credential header
    Credential(String),
    /// Host portion of the caller's address
    Address(String),
}

impl Identity {
    /// Resolve the identity for a request.
    ///
    /// Empty values are treated as absent. A credential takes precedence over
    /// an address when both are present. Returns `None` when neither is.
    pub fn resolve(credential: Option<&str>, address: Option<&str>) -> Option<Self> {
        let credential = credential.filter(|c| !c.is_empty());
        let address = address.filter(|a| !a.is_empty());

        match (credential, address) {
            (Some(credential), _) => Some(Identity::Credential(credential.to_string())),
            (None, Some(address)) => Some(Identity::Address(address.to_string())),
            (None, None) => None,
        }
    }

    /// The kind of this identity.
    pub fn kind(&self) -> IdentityKind {
        match self {
            Identity::Credential(_) => IdentityKind::Credential,
            Identity::Address(_) => IdentityKind::Address,
        }
    }

    /// The raw identity value.
    pub fn value(&self) -> &str {
        match self {
            Identity::Credential(value) | Identity::Address(value) => value,
        }
    }

    /// The counter key for this identity, `"<kind>:<value>"`.
    pub fn counter_key(&self) -> String {
        format!("{}:{}", self.kind(), self.value())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.value())
    }
}
