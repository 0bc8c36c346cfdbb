// ── Dashboard session gateway ──
//
// Entry point for dashboard sessions and the operator API: authenticate a
// session, hand it the tenant channel, and route its commands through the
// tenant's Connection.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::broadcast::{ChannelMessage, TenantSubscription};
use crate::config::{TenantConnectionConfig, TenantId};
use crate::directory::{TenantDirectory, TokenVerifier};
use crate::error::CoreError;
use crate::facade::CommandFacade;
use crate::registry::{ConnectionRegistry, InitSummary};

/// Reply to a session command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandReply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandReply {
    fn from_result(result: Result<Value, CoreError>) -> Self {
        match result {
            Ok(data) => Self {
                success: true,
                data: (!data.is_null()).then_some(data),
                error: None,
            },
            Err(e) => Self {
                success: false,
                data: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Connection status as reported to the operator API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantStatus {
    pub connected: bool,
    pub address: Option<String>,
    pub port: Option<u16>,
    pub mode: Option<String>,
}

/// An authenticated dashboard session bound to one tenant.
pub struct Session {
    tenant: TenantId,
    subscription: TenantSubscription,
    facade: Arc<CommandFacade>,
}

impl Session {
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Status as of attach, delivered before anything from the channel.
    pub fn initial_status(&self) -> ChannelMessage {
        self.subscription.initial_status()
    }

    /// Next message on the tenant channel.
    pub async fn next_message(&mut self) -> Option<Arc<ChannelMessage>> {
        self.subscription.recv().await
    }

    /// Run a raw request against the tenant's instance.
    pub async fn command(&self, request_type: &str, request_data: Value) -> CommandReply {
        debug!(tenant = %self.tenant, request_type, "session command");
        CommandReply::from_result(
            self.facade
                .send_raw(&self.tenant, request_type, request_data)
                .await,
        )
    }

    pub fn into_subscription(self) -> TenantSubscription {
        self.subscription
    }
}

pub struct SessionGateway {
    directory: Arc<dyn TenantDirectory>,
    verifier: Arc<dyn TokenVerifier>,
    facade: Arc<CommandFacade>,
}

impl SessionGateway {
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        verifier: Arc<dyn TokenVerifier>,
        facade: Arc<CommandFacade>,
    ) -> Self {
        Self {
            directory,
            verifier,
            facade,
        }
    }

    pub fn facade(&self) -> &Arc<CommandFacade> {
        &self.facade
    }

    fn registry(&self) -> &Arc<ConnectionRegistry> {
        self.facade.registry()
    }

    /// Bring up every configured tenant. Used once at startup.
    pub async fn initialize(&self) -> Result<InitSummary, CoreError> {
        let records = self.directory.list_configured().await?;
        let tenants = records
            .into_iter()
            .filter(|r| !r.suspended)
            .map(|r| (r.id, r.config));
        Ok(self.registry().initialize_all(tenants).await)
    }

    /// Authenticate a session token and subscribe it to its tenant.
    ///
    /// The tenant's Connection is brought up if it has an address; a
    /// failing instance does not fail the attach, since the session learns
    /// about it through status messages.
    pub async fn attach(&self, token: &str) -> Result<Session, CoreError> {
        let tenant = self.verifier.verify(token).await?;
        let record = self
            .directory
            .get_tenant(&tenant)
            .await?
            .ok_or_else(|| CoreError::TenantNotFound {
                tenant: tenant.to_string(),
            })?;
        if record.suspended {
            warn!(tenant = %tenant, "rejecting session for suspended tenant");
            return Err(CoreError::TenantSuspended {
                tenant: tenant.to_string(),
            });
        }

        if record.config.has_address() {
            if let Err(e) = self.registry().get_or_create(&tenant, record.config).await {
                warn!(tenant = %tenant, error = %e, "instance not reachable on attach");
            }
        }

        let subscription = self.registry().broadcaster().subscribe(&tenant);
        info!(tenant = %tenant, "session attached");
        Ok(Session {
            tenant,
            subscription,
            facade: Arc::clone(&self.facade),
        })
    }

    /// Store a new connection config for `tenant` and connect with it.
    ///
    /// Returns whether the tenant is connected afterwards; a connect failure
    /// is not an error here, the Connection keeps retrying.
    pub async fn connect_tenant(
        &self,
        tenant: &TenantId,
        config: TenantConnectionConfig,
    ) -> Result<bool, CoreError> {
        config.validate()?;
        self.directory
            .update_connection_config(tenant, &config)
            .await?;

        match self.registry().get_or_create(tenant, config).await {
            Ok(connection) => Ok(connection.is_connected()),
            Err(e) => {
                warn!(tenant = %tenant, error = %e, "connect after config update failed");
                Ok(false)
            }
        }
    }

    pub async fn tenant_status(&self, tenant: &TenantId) -> Result<TenantStatus, CoreError> {
        let record = self.directory.get_tenant(tenant).await?;
        let connection = self.registry().get(tenant);

        let config = match (&connection, &record) {
            (Some(connection), _) => Some((*connection.config()).clone()),
            (None, Some(record)) => Some(record.config.clone()),
            (None, None) => {
                return Err(CoreError::TenantNotFound {
                    tenant: tenant.to_string(),
                });
            }
        };

        Ok(TenantStatus {
            connected: connection.as_ref().is_some_and(|c| c.is_connected()),
            address: config
                .as_ref()
                .filter(|c| c.has_address())
                .map(|c| c.address.clone()),
            port: config.as_ref().and_then(|c| c.port),
            mode: connection
                .and_then(|c| c.mode())
                .map(|m| m.label().to_owned()),
        })
    }
}
