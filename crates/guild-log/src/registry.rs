use guild_types::Address;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Recognized organization contracts. Write access to the update log is
/// organization-gated through this set.
#[derive(Debug)]
pub struct OrganizationRegistry {
    organizations: Arc<RwLock<HashSet<Address>>>,
}

impl OrganizationRegistry {
    pub fn new() -> Self {
        Self {
            organizations: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    pub async fn register(&self, organization: Address) {
        let mut orgs = self.organizations.write().await;
        if orgs.insert(organization) {
            info!(
                organization = organization.to_hex(),
                total = orgs.len(),
                "🏛️ Organization registered"
            );
        }
    }

    pub async fn is_registered(&self, organization: &Address) -> bool {
        self.organizations.read().await.contains(organization)
    }

    pub async fn len(&self) -> usize {
        self.organizations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.organizations.read().await.is_empty()
    }
}

impl Default for OrganizationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for OrganizationRegistry {
    fn clone(&self) -> Self {
        Self {
            organizations: Arc::clone(&self.organizations),
        }
    }
}
