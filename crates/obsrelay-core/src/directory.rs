// ── Tenant collaborators ──
//
// Where tenant records and session tokens come from. The gateway only
// sees these traits; obsrelay-config backs them with the TOML file and
// tests back them with in-memory maps.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::config::{TenantConnectionConfig, TenantId};
use crate::error::CoreError;

/// A tenant as stored by the directory.
#[derive(Debug, Clone)]
pub struct TenantRecord {
    pub id: TenantId,
    pub config: TenantConnectionConfig,
    pub suspended: bool,
}

/// Read and update stored tenant configuration.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn get_tenant(&self, tenant: &TenantId) -> Result<Option<TenantRecord>, CoreError>;

    /// Every tenant that has stored connection config.
    async fn list_configured(&self) -> Result<Vec<TenantRecord>, CoreError>;

    async fn update_connection_config(
        &self,
        tenant: &TenantId,
        config: &TenantConnectionConfig,
    ) -> Result<(), CoreError>;
}

/// Turns a dashboard session token into the tenant it belongs to.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<TenantId, CoreError>;
}

// ── In-memory implementations ────────────────────────────────────

/// Directory held entirely in memory. Updates are not persisted.
#[derive(Debug, Default)]
pub struct InMemoryTenantDirectory {
    tenants: RwLock<HashMap<TenantId, TenantRecord>>,
}

impl InMemoryTenantDirectory {
    pub fn new(records: impl IntoIterator<Item = TenantRecord>) -> Self {
        Self {
            tenants: RwLock::new(records.into_iter().map(|r| (r.id.clone(), r)).collect()),
        }
    }

    pub fn insert(&self, record: TenantRecord) {
        self.tenants
            .write()
            .expect("directory lock poisoned")
            .insert(record.id.clone(), record);
    }
}

#[async_trait]
impl TenantDirectory for InMemoryTenantDirectory {
    async fn get_tenant(&self, tenant: &TenantId) -> Result<Option<TenantRecord>, CoreError> {
        Ok(self
            .tenants
            .read()
            .expect("directory lock poisoned")
            .get(tenant)
            .cloned())
    }

    async fn list_configured(&self) -> Result<Vec<TenantRecord>, CoreError> {
        let mut records: Vec<_> = self
            .tenants
            .read()
            .expect("directory lock poisoned")
            .values()
            .filter(|r| r.config.has_address())
            .cloned()
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn update_connection_config(
        &self,
        tenant: &TenantId,
        config: &TenantConnectionConfig,
    ) -> Result<(), CoreError> {
        let mut tenants = self.tenants.write().expect("directory lock poisoned");
        let record = tenants.get_mut(tenant).ok_or_else(|| CoreError::TenantNotFound {
            tenant: tenant.to_string(),
        })?;
        record.config = config.clone();
        Ok(())
    }
}

/// Fixed token → tenant table.
#[derive(Debug, Default)]
pub struct StaticTokenVerifier {
    tokens: Vec<(SecretString, TenantId)>,
}

impl StaticTokenVerifier {
    pub fn new(tokens: impl IntoIterator<Item = (SecretString, TenantId)>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
        }
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<TenantId, CoreError> {
        self.tokens
            .iter()
            .find(|(known, _)| !token.is_empty() && known.expose_secret() == token)
            .map(|(_, tenant)| tenant.clone())
            .ok_or(CoreError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_verifier_maps_token_to_tenant() {
        let verifier = StaticTokenVerifier::new([(
            SecretString::from("tok-acme".to_string()),
            TenantId::from("acme"),
        )]);

        assert_eq!(verifier.verify("tok-acme").await.ok(), Some(TenantId::from("acme")));
        assert!(matches!(verifier.verify("nope").await, Err(CoreError::Unauthorized)));
        assert!(matches!(verifier.verify("").await, Err(CoreError::Unauthorized)));
    }

    #[tokio::test]
    async fn list_configured_skips_empty_addresses() {
        let directory = InMemoryTenantDirectory::new([
            TenantRecord {
                id: "b".into(),
                config: TenantConnectionConfig::new("studio-pc", 4455),
                suspended: false,
            },
            TenantRecord {
                id: "a".into(),
                config: TenantConnectionConfig::default(),
                suspended: false,
            },
        ]);

        let listed = directory.list_configured().await.unwrap_or_default();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, TenantId::from("b"));
    }

    #[tokio::test]
    async fn update_unknown_tenant_is_not_found() {
        let directory = InMemoryTenantDirectory::default();
        let result = directory
            .update_connection_config(&"ghost".into(), &TenantConnectionConfig::new("x", 1))
            .await;
        assert!(matches!(result, Err(CoreError::TenantNotFound { .. })));
    }
}
