// ── Connection registry ──
//
// Exactly one Connection per tenant per process. The registry is the only
// place that creates or evicts them, and it wires each new Connection into
// the event broadcaster.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::future::join_all;
use tracing::{info, warn};

use crate::broadcast::EventBroadcaster;
use crate::config::{ConnectionSettings, TenantConnectionConfig, TenantId};
use crate::connection::Connection;
use crate::error::CoreError;
use crate::transport::TransportFactory;

/// Outcome of [`ConnectionRegistry::initialize_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitSummary {
    pub connected: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct ConnectionRegistry {
    connections: DashMap<TenantId, Connection>,
    factory: Arc<dyn TransportFactory>,
    settings: Arc<ConnectionSettings>,
    broadcaster: EventBroadcaster,
}

impl ConnectionRegistry {
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        settings: Arc<ConnectionSettings>,
        broadcaster: EventBroadcaster,
    ) -> Self {
        Self {
            connections: DashMap::new(),
            factory,
            settings,
            broadcaster,
        }
    }

    pub fn broadcaster(&self) -> &EventBroadcaster {
        &self.broadcaster
    }

    /// Return the tenant's Connection, creating and connecting it on first use.
    ///
    /// An existing Connection gets `config` applied (rewiring if needed).
    /// A connect failure is returned, but the Connection stays registered
    /// and keeps retrying on its own.
    pub async fn get_or_create(
        &self,
        tenant: &TenantId,
        config: TenantConnectionConfig,
    ) -> Result<Connection, CoreError> {
        let (connection, created) = match self.connections.entry(tenant.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let connection = Connection::new(
                    tenant.clone(),
                    config.clone(),
                    Arc::clone(&self.settings),
                    Arc::clone(&self.factory),
                );
                entry.insert(connection.clone());
                (connection, true)
            }
        };

        if created {
            info!(tenant = %tenant, "connection created");
            self.broadcaster.attach(&connection);
            connection.connect().await?;
        } else {
            connection.update_config(config).await?;
        }
        Ok(connection)
    }

    /// Lookup only.
    pub fn get(&self, tenant: &TenantId) -> Option<Connection> {
        self.connections.get(tenant).map(|entry| entry.value().clone())
    }

    /// Disconnect and evict. Returns whether the tenant was registered.
    pub async fn remove(&self, tenant: &TenantId) -> bool {
        let Some((_, connection)) = self.connections.remove(tenant) else {
            return false;
        };
        connection.disconnect().await;
        self.broadcaster.detach(tenant);
        info!(tenant = %tenant, "connection removed");
        true
    }

    pub fn tenants(&self) -> Vec<TenantId> {
        let mut tenants: Vec<_> = self.connections.iter().map(|e| e.key().clone()).collect();
        tenants.sort();
        tenants
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Bring up every tenant that has an address. One tenant failing does
    /// not stop the others.
    pub async fn initialize_all(
        &self,
        tenants: impl IntoIterator<Item = (TenantId, TenantConnectionConfig)>,
    ) -> InitSummary {
        let mut summary = InitSummary::default();
        let mut pending = Vec::new();

        for (tenant, config) in tenants {
            if config.has_address() {
                pending.push(async move {
                    let result = self.get_or_create(&tenant, config).await;
                    (tenant, result)
                });
            } else {
                summary.skipped += 1;
            }
        }

        for (tenant, result) in join_all(pending).await {
            match result {
                Ok(_) => summary.connected += 1,
                Err(e) => {
                    warn!(tenant = %tenant, error = %e, "initial connect failed");
                    summary.failed += 1;
                }
            }
        }

        info!(
            connected = summary.connected,
            failed = summary.failed,
            skipped = summary.skipped,
            "tenant connections initialised"
        );
        summary
    }

    /// Disconnect and evict every tenant.
    pub async fn shutdown(&self) {
        for tenant in self.tenants() {
            self.remove(&tenant).await;
        }
    }
}
