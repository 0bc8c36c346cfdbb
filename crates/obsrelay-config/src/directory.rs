// ── Config-backed tenant directory ──
//
// Serves tenant records from the loaded config and writes connection
// changes back to the TOML file. Passwords go to the keyring, never to
// the file.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tracing::{info, warn};

use obsrelay_core::{CoreError, TenantConnectionConfig, TenantDirectory, TenantId, TenantRecord};

use crate::{Config, ConfigError, TenantEntry, read_config_file, save_config_to, store_password};

#[derive(Debug)]
pub struct FileTenantDirectory {
    /// Where updates are persisted; `None` keeps them in memory only.
    path: Option<PathBuf>,
    records: RwLock<BTreeMap<TenantId, TenantRecord>>,
}

impl FileTenantDirectory {
    pub fn new(config: &Config, path: Option<PathBuf>) -> Self {
        let records = config
            .tenant_records()
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        Self {
            path,
            records: RwLock::new(records),
        }
    }

    fn persist(
        &self,
        tenant: &TenantId,
        config: &TenantConnectionConfig,
    ) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut file = read_config_file(path)?;
        let entry = file.tenants.entry(tenant.to_string()).or_default();
        let stored = TenantEntry::from_connection_config(config);
        entry.address = stored.address;
        entry.port = stored.port;
        entry.strategy = stored.strategy;
        save_config_to(&file, path)?;

        if let Some(password) = &config.password {
            if entry_uses_env(&file, tenant) {
                warn!(tenant = %tenant, "password is read from the environment, not storing it");
            } else if let Err(e) = store_password(tenant.as_str(), password.expose_secret()) {
                warn!(tenant = %tenant, error = %e, "password kept in memory only");
            }
        }

        info!(tenant = %tenant, path = %path.display(), "tenant config saved");
        Ok(())
    }
}

fn entry_uses_env(file: &Config, tenant: &TenantId) -> bool {
    file.tenants
        .get(tenant.as_str())
        .is_some_and(|entry| entry.password_env.is_some())
}

#[async_trait]
impl TenantDirectory for FileTenantDirectory {
    async fn get_tenant(&self, tenant: &TenantId) -> Result<Option<TenantRecord>, CoreError> {
        Ok(self
            .records
            .read()
            .expect("directory lock poisoned")
            .get(tenant)
            .cloned())
    }

    async fn list_configured(&self) -> Result<Vec<TenantRecord>, CoreError> {
        Ok(self
            .records
            .read()
            .expect("directory lock poisoned")
            .values()
            .filter(|record| record.config.has_address())
            .cloned()
            .collect())
    }

    async fn update_connection_config(
        &self,
        tenant: &TenantId,
        config: &TenantConnectionConfig,
    ) -> Result<(), CoreError> {
        {
            let mut records = self.records.write().expect("directory lock poisoned");
            let record = records.get_mut(tenant).ok_or_else(|| CoreError::TenantNotFound {
                tenant: tenant.to_string(),
            })?;
            record.config = config.clone();
        }

        self.persist(tenant, config).map_err(|e| CoreError::Config {
            message: e.to_string(),
        })
    }
}
