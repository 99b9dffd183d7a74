//! Health-ranked view of the sender identities

mod score;

use std::sync::Arc;

use repute_common::{SenderIdentity, internal};
use repute_store::IdentityStore;
use serde::Deserialize;
use tokio::sync::Mutex;

pub use self::score::{BOUNCE_WEIGHT, COMPLAINT_WEIGHT, Rates, SPAM_WEIGHT, VOLUME_DECAY, score};
use crate::error::ReputationError;

fn default_subdomains() -> Vec<String> {
    (1..=5).map(|n| format!("mail{n}.example.com")).collect()
}

fn default_ips() -> Vec<String> {
    (1..=10).map(|n| format!("192.0.2.{n}")).collect()
}

/// The candidate subdomains and IPs used to seed an empty identity store
///
/// Every subdomain is paired with every IP, subdomain-major, in the order
/// given here.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_subdomains")]
    pub subdomains: Vec<String>,

    #[serde(default = "default_ips")]
    pub ips: Vec<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            subdomains: default_subdomains(),
            ips: default_ips(),
        }
    }
}

impl IdentityConfig {
    /// Generate the seeded cross product of subdomains × IPs
    #[must_use]
    pub fn cross_product(&self) -> Vec<SenderIdentity> {
        self.subdomains
            .iter()
            .flat_map(|subdomain| {
                self.ips
                    .iter()
                    .map(move |ip| SenderIdentity::seeded(subdomain.as_str(), ip.as_str()))
            })
            .collect()
    }
}

/// Owner of the in-memory working set of sender identities
///
/// The working set is mirrored from the [`IdentityStore`] at construction and
/// written back on every update. Each call holds a single lock for its whole
/// duration, including the store write, so the in-memory and durable views
/// move together. Callers that select and then update (see the worker pool)
/// do so in two separate calls; nothing makes that pair atomic.
#[derive(Debug)]
pub struct ReputationManager {
    identities: Mutex<Vec<SenderIdentity>>,
    store: Arc<dyn IdentityStore>,
}

impl ReputationManager {
    /// Load the working set, seeding the store from `config` if it is empty
    ///
    /// # Errors
    /// If the store cannot be read, or a seeded identity cannot be written.
    /// Either is fatal to startup.
    #[tracing::instrument(level = tracing::Level::TRACE, skip_all, err)]
    pub async fn bootstrap(
        store: Arc<dyn IdentityStore>,
        config: &IdentityConfig,
    ) -> Result<Self, ReputationError> {
        let mut identities = store
            .load_all()
            .await
            .map_err(ReputationError::Bootstrap)?;

        if identities.is_empty() {
            identities = config.cross_product();
            internal!(
                level = INFO,
                "Identity store is empty, seeding {} identities ({} subdomains x {} ips)",
                identities.len(),
                config.subdomains.len(),
                config.ips.len()
            );

            for identity in &identities {
                store
                    .upsert(identity)
                    .await
                    .map_err(ReputationError::Bootstrap)?;
            }
        } else {
            internal!(
                level = INFO,
                "Loaded {} identities from the identity store",
                identities.len()
            );
        }

        Ok(Self {
            identities: Mutex::new(identities),
            store,
        })
    }

    /// Record a dispatch outcome against the identity `(subdomain, ip)`
    ///
    /// Unknown keys are silently ignored.
    ///
    /// # Errors
    /// If the updated row cannot be written back. The in-memory row has been
    /// updated regardless.
    #[tracing::instrument(level = tracing::Level::TRACE, skip(self))]
    pub async fn update_health(
        &self,
        subdomain: &str,
        ip: &str,
        rates: Rates,
    ) -> Result<(), ReputationError> {
        let mut identities = self.identities.lock().await;

        let Some(identity) = identities
            .iter_mut()
            .find(|identity| identity.matches(subdomain, ip))
        else {
            tracing::trace!(subdomain, ip, "No identity matches, ignoring health update");
            return Ok(());
        };

        identity.health = score(rates, identity.sent_count);
        identity.sent_count += 1;

        tracing::debug!(
            subdomain,
            ip,
            health = identity.health,
            sent_count = identity.sent_count,
            "Updated identity health"
        );

        self.store
            .upsert(identity)
            .await
            .map_err(|source| ReputationError::Persistence {
                key: identity.key(),
                source,
            })
    }

    /// The identity with the strictly greatest health
    ///
    /// Ties go to the identity that comes first in load order. Returns `None`
    /// when the working set is empty.
    #[tracing::instrument(level = tracing::Level::TRACE, skip(self), ret)]
    pub async fn healthiest(&self) -> Option<SenderIdentity> {
        let identities = self.identities.lock().await;

        identities
            .iter()
            .fold(None::<&SenderIdentity>, |best, candidate| match best {
                Some(best) if candidate.health <= best.health => Some(best),
                _ => Some(candidate),
            })
            .cloned()
    }

    /// Snapshot of the working set, in load order
    pub async fn identities(&self) -> Vec<SenderIdentity> {
        self.identities.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use repute_store::{MemoryIdentityStore, TestIdentityStore};

    use super::*;

    fn identity(subdomain: &str, ip: &str, health: f64) -> SenderIdentity {
        SenderIdentity {
            health,
            ..SenderIdentity::seeded(subdomain, ip)
        }
    }

    async fn manager_with(identities: Vec<SenderIdentity>) -> ReputationManager {
        ReputationManager::bootstrap(
            Arc::new(MemoryIdentityStore::with_identities(identities)),
            &IdentityConfig::default(),
        )
        .await
        .expect("Failed to bootstrap")
    }

    #[test]
    fn default_grid_matches_five_by_ten() {
        let config = IdentityConfig::default();
        let identities = config.cross_product();

        assert_eq!(identities.len(), 50);
        assert_eq!(identities[0].key().to_string(), "mail1.example.com/192.0.2.1");
        assert_eq!(identities[10].key().to_string(), "mail2.example.com/192.0.2.1");
        assert_eq!(identities[49].key().to_string(), "mail5.example.com/192.0.2.10");
    }

    #[tokio::test]
    async fn ties_go_to_the_first_identity() {
        let manager = manager_with(vec![
            identity("a.example.com", "192.0.2.1", 70.0),
            identity("b.example.com", "192.0.2.1", 90.0),
            identity("c.example.com", "192.0.2.1", 90.0),
        ])
        .await;

        let best = manager.healthiest().await.expect("No identity");
        assert_eq!(best.subdomain, "b.example.com");
    }

    #[tokio::test]
    async fn zero_health_identity_is_still_selectable() {
        let manager = manager_with(vec![identity("a.example.com", "192.0.2.1", 0.0)]).await;

        assert_eq!(
            manager.healthiest().await.map(|i| i.subdomain),
            Some("a.example.com".to_string())
        );
    }

    #[tokio::test]
    async fn unknown_key_is_a_no_op() {
        let store = TestIdentityStore::with_identities(vec![identity(
            "a.example.com",
            "192.0.2.1",
            90.0,
        )]);
        let manager = ReputationManager::bootstrap(Arc::new(store.clone()), &IdentityConfig::default())
            .await
            .expect("Failed to bootstrap");

        manager
            .update_health("missing.example.com", "192.0.2.1", Rates::CLEAN)
            .await
            .expect("No-op update should succeed");

        assert_eq!(store.upsert_count(), 0);
        assert_eq!(manager.identities().await[0].sent_count, 0);
    }

    #[tokio::test]
    async fn failed_write_still_updates_memory() {
        let store = TestIdentityStore::with_identities(vec![identity(
            "a.example.com",
            "192.0.2.1",
            90.0,
        )]);
        let manager = ReputationManager::bootstrap(Arc::new(store.clone()), &IdentityConfig::default())
            .await
            .expect("Failed to bootstrap");

        store.fail_writes(true);
        let result = manager
            .update_health("a.example.com", "192.0.2.1", Rates::CLEAN)
            .await;

        assert!(matches!(result, Err(ReputationError::Persistence { .. })));
        let in_memory = &manager.identities().await[0];
        assert_eq!(in_memory.sent_count, 1);
        assert_eq!(store.rows().await.expect("Failed to read")[0].sent_count, 0);
    }
}
