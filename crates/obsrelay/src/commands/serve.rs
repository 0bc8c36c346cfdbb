//! Long-running commands: `serve` streams every tenant channel, `watch`
//! follows one session.

use std::pin::Pin;
use std::sync::Arc;

use futures_util::stream::{self, Stream, StreamExt};
use tracing::{info, warn};

use obsrelay_core::{ChannelMessage, TenantId};

use crate::cli::WatchArgs;
use crate::error::CliError;
use crate::output;

use super::Runtime;

type ChannelStream = Pin<Box<dyn Stream<Item = Arc<ChannelMessage>> + Send>>;

/// Connect every configured tenant and print channel messages as JSON
/// lines until Ctrl-C. Subscriptions are taken before the connects so the
/// first status messages are not missed.
pub async fn serve(rt: &Runtime) -> Result<(), CliError> {
    let broadcaster = rt.registry().broadcaster();
    let tenants: Vec<TenantId> = rt.configured_tenants();
    if tenants.is_empty() {
        warn!("no tenants configured, nothing to serve");
    }

    let streams: Vec<ChannelStream> = tenants
        .iter()
        .map(|tenant| Box::pin(broadcaster.subscribe(tenant).into_stream()) as ChannelStream)
        .collect();
    let mut merged = stream::select_all(streams);

    let summary = rt.gateway().initialize().await?;
    info!(
        connected = summary.connected,
        failed = summary.failed,
        skipped = summary.skipped,
        "serving tenant channels"
    );

    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, disconnecting tenants");
                break;
            }
            message = merged.next() => match message {
                Some(message) => output::print_json_line(message.as_ref()),
                None => break,
            },
        }
    }
    Ok(())
}

/// Attach with a session token and print the channel, starting with the
/// status as of attach.
pub async fn watch(rt: &Runtime, args: &WatchArgs) -> Result<(), CliError> {
    let mut session = rt.gateway().attach(&args.token).await?;
    info!(tenant = %session.tenant(), "watching tenant channel");
    output::print_json_line(&session.initial_status());

    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => break,
            message = session.next_message() => match message {
                Some(message) => output::print_json_line(message.as_ref()),
                None => break,
            },
        }
    }
    Ok(())
}
