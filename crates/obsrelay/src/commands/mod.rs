//! Command handlers, one module per command group.

pub mod serve;
pub mod tenant;
pub mod tenants;
mod util;

use std::path::PathBuf;
use std::sync::Arc;

use obsrelay_config::FileTenantDirectory;
use obsrelay_core::{
    CommandFacade, ConnectionRegistry, DefaultTransportFactory, EventBroadcaster, SessionGateway,
    TenantId, TenantRecord, TransportFactory,
};

use crate::cli::{Command, GlobalOpts};
use crate::config::Config;
use crate::error::CliError;

// ── Runtime ──────────────────────────────────────────────────────────

/// Everything a command needs to reach tenants: the gateway (directory,
/// verifier, facade, registry) built from one loaded config.
pub struct Runtime {
    config: Config,
    gateway: SessionGateway,
}

impl Runtime {
    pub fn build(config: Config, path: PathBuf) -> Result<Self, CliError> {
        let settings = Arc::new(config.server.connection_settings());
        let relay = config.server.relay_coordinator()?;
        let factory: Arc<dyn TransportFactory> =
            Arc::new(DefaultTransportFactory::new(Arc::clone(&settings), relay));
        let registry = Arc::new(ConnectionRegistry::new(
            factory,
            settings,
            EventBroadcaster::new(),
        ));
        let facade = Arc::new(CommandFacade::new(registry));

        let directory = Arc::new(FileTenantDirectory::new(&config, Some(path)));
        let verifier = Arc::new(config.token_verifier());
        let gateway = SessionGateway::new(directory, verifier, facade);

        Ok(Self { config, gateway })
    }

    pub fn gateway(&self) -> &SessionGateway {
        &self.gateway
    }

    pub fn facade(&self) -> &CommandFacade {
        self.gateway.facade()
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        self.gateway.facade().registry()
    }

    /// The configured record for `tenant`. Suspended tenants are refused.
    pub fn record(&self, tenant: &str) -> Result<TenantRecord, CliError> {
        let record = self.config.tenant(tenant)?.record(tenant);
        if record.suspended {
            return Err(CliError::Suspended {
                tenant: tenant.to_owned(),
            });
        }
        Ok(record)
    }

    /// Tenants `serve` brings up: addressed and not suspended.
    pub fn configured_tenants(&self) -> Vec<TenantId> {
        self.config
            .tenant_records()
            .into_iter()
            .filter(|record| !record.suspended && record.config.has_address())
            .map(|record| record.id)
            .collect()
    }

    /// Connect `tenant` for a one-shot command. A failed connect is fatal
    /// here, since every read would silently come back empty.
    pub async fn open(&self, tenant: &str) -> Result<TenantId, CliError> {
        let record = self.record(tenant)?;
        record.config.validate()?;
        self.registry()
            .get_or_create(&record.id, record.config)
            .await
            .map_err(|e| util::connect_failure(tenant, e))?;
        Ok(record.id)
    }

    /// Disconnect every tenant this invocation touched.
    pub async fn shutdown(&self) {
        self.registry().shutdown().await;
    }
}

// ── Dispatch ─────────────────────────────────────────────────────────

pub async fn dispatch(cmd: Command, rt: &Runtime, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Serve => serve::serve(rt).await,
        Command::Watch(args) => serve::watch(rt, &args).await,
        Command::Connect(args) => tenants::connect(rt, args, global).await,

        Command::Status(args) => tenant::status(rt, &args.tenant, global).await,
        Command::Scenes(args) => tenant::scenes(rt, &args.tenant, global).await,
        Command::Items(args) => tenant::items(rt, &args, global).await,
        Command::Audio(args) => tenant::audio(rt, &args.tenant, global).await,
        Command::Stats(args) => tenant::stats(rt, &args.tenant, global).await,
        Command::Profiles(args) => tenant::profiles(rt, &args.tenant, global).await,
        Command::Transitions(args) => tenant::transitions(rt, &args.tenant, global).await,

        Command::Scene(args) => tenant::switch_scene(rt, &args, global).await,
        Command::Stream(args) => tenant::stream(rt, &args, global).await,
        Command::Mute(args) => tenant::mute(rt, &args, global).await,
        Command::Volume(args) => tenant::volume(rt, &args, global).await,
        Command::RestartSource(args) => tenant::restart_source(rt, &args, global).await,
        Command::Bitrate(args) => tenant::bitrate(rt, &args, global).await,
        Command::Call(args) => tenant::call(rt, &args, global).await,

        Command::Tenants | Command::Completions(_) => Err(CliError::Internal(
            "command is handled before the runtime is built".into(),
        )),
    }
}
