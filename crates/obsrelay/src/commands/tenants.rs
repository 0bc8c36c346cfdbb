//! Tenant listing and connection setup.

use serde::Serialize;
use tabled::Tabled;

use obsrelay_core::{
    ConnectStrategy, TenantConnectionConfig, TenantId, TenantStatus, TransportMode,
};

use crate::cli::{ConnectArgs, GlobalOpts, StrategyArg};
use crate::config::Config;
use crate::error::CliError;
use crate::output;

use super::{Runtime, util};

// ── List ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TenantView {
    id: String,
    address: String,
    port: Option<u16>,
    strategy: ConnectStrategy,
    mode: Option<&'static str>,
    has_token: bool,
    suspended: bool,
}

#[derive(Tabled)]
struct TenantRow {
    #[tabled(rename = "Tenant")]
    id: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Port")]
    port: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Token")]
    token: String,
    #[tabled(rename = "Suspended")]
    suspended: String,
}

/// Project the config without touching credentials: listing never reads
/// the keyring.
fn tenant_views(cfg: &Config) -> Vec<TenantView> {
    cfg.tenants
        .iter()
        .map(|(id, entry)| {
            let config = TenantConnectionConfig {
                address: entry.address.trim().to_owned(),
                port: entry.port,
                password: None,
                strategy: entry.strategy,
            };
            TenantView {
                id: id.clone(),
                address: config.address.clone(),
                port: entry.port,
                strategy: entry.strategy,
                mode: config
                    .has_address()
                    .then(|| TransportMode::resolve(&config).label()),
                has_token: entry.token.as_deref().is_some_and(|t| !t.is_empty()),
                suspended: entry.suspended,
            }
        })
        .collect()
}

pub fn list(cfg: &Config, global: &GlobalOpts) {
    let color = output::should_color(&global.color);
    let views = tenant_views(cfg);
    let rendered = output::render_list(
        &global.output,
        &views,
        |v| TenantRow {
            id: v.id.clone(),
            address: if v.address.is_empty() {
                "-".into()
            } else {
                v.address.clone()
            },
            port: v.port.map_or_else(|| "-".into(), |p| p.to_string()),
            mode: v.mode.unwrap_or("-").into(),
            token: output::flag(v.has_token, color),
            suspended: output::flag(v.suspended, color),
        },
        |v| v.id.clone(),
    );
    output::print_output(&rendered, global.quiet);
}

// ── Connect ──────────────────────────────────────────────────────────

pub async fn connect(rt: &Runtime, args: ConnectArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let tenant = TenantId::from(args.tenant.as_str());
    let strategy = match args.strategy {
        StrategyArg::Auto => ConnectStrategy::Auto,
        StrategyArg::Relay => ConnectStrategy::Relay,
    };
    let mut config = TenantConnectionConfig::new(args.address, args.port).with_strategy(strategy);
    if let Some(password) = args.password {
        config = config.with_password(password);
    }

    let connected = rt.gateway().connect_tenant(&tenant, config).await?;
    if connected {
        util::done(global, &format!("{tenant} connected"));
    } else {
        util::done(
            global,
            &format!("{tenant} saved, but the instance is not reachable yet"),
        );
    }

    let status = rt.gateway().tenant_status(&tenant).await?;
    print_status(&status, global);
    Ok(())
}

fn print_status(status: &TenantStatus, global: &GlobalOpts) {
    let color = output::should_color(&global.color);
    let rendered = output::render_single(
        &global.output,
        status,
        |s| {
            format!(
                "Connected: {}\nMode:      {}\nAddress:   {}\nPort:      {}",
                output::flag(s.connected, color),
                s.mode.as_deref().unwrap_or("-"),
                s.address.as_deref().unwrap_or("-"),
                s.port.map_or_else(|| "-".into(), |p| p.to_string()),
            )
        },
        |s| s.connected.to_string(),
    );
    output::print_output(&rendered, global.quiet);
}
