use core::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Health assigned to every identity generated at bootstrap
pub const INITIAL_HEALTH: f64 = 90.0;

/// Upper bound of the health domain
pub const MAX_HEALTH: f64 = 100.0;

/// Lower bound of the health domain
pub const MIN_HEALTH: f64 = 0.0;

/// A (subdomain, IP) pair usable as the apparent origin of an outbound email
///
/// The default value is the empty identity: it has no subdomain and no IP and
/// must never be used as a send target (see [`SenderIdentity::is_available`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderIdentity {
    pub subdomain: String,
    pub ip: String,
    /// Synthetic reputation in `[0, 100]`
    pub health: f64,
    /// Number of outcomes recorded against this identity, never decreases
    pub sent_count: u64,
}

impl SenderIdentity {
    /// Create a freshly seeded identity with the initial health and no sends
    #[must_use]
    pub fn seeded(subdomain: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            subdomain: subdomain.into(),
            ip: ip.into(),
            health: INITIAL_HEALTH,
            sent_count: 0,
        }
    }

    /// Whether this identity can be used as a send target
    #[inline]
    pub fn is_available(&self) -> bool {
        !self.subdomain.is_empty() && !self.ip.is_empty()
    }

    /// Whether this identity is stored under the given key
    #[inline]
    pub fn matches(&self, subdomain: &str, ip: &str) -> bool {
        self.subdomain == subdomain && self.ip == ip
    }

    #[must_use]
    pub fn key(&self) -> IdentityKey {
        IdentityKey {
            subdomain: self.subdomain.clone(),
            ip: self.ip.clone(),
        }
    }
}

/// The unique key of a [`SenderIdentity`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityKey {
    pub subdomain: String,
    pub ip: String,
}

impl Display for IdentityKey {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}/{}", self.subdomain, self.ip)
    }
}
