//! One-shot commands against a single tenant's instance.

use std::time::Duration;

use serde::Serialize;
use tabled::Tabled;

use obsrelay_core::model::IDLE_UPTIME;
use obsrelay_core::{
    AudioSource, ProfileList, Scene, SceneItem, StreamState, StreamStats, Transition,
};

use crate::cli::{
    BitrateArgs, CallArgs, GlobalOpts, ItemsArgs, MuteArgs, RestartSourceArgs, SceneArgs,
    StreamAction, StreamArgs, VolumeArgs,
};
use crate::error::CliError;
use crate::output;

use super::{Runtime, util};

/// Gap between the two stats polls that produce a bitrate reading.
const BITRATE_SAMPLE: Duration = Duration::from_secs(1);

// ── Rows ─────────────────────────────────────────────────────────────

#[derive(Tabled)]
struct SceneRow {
    #[tabled(rename = "Scene")]
    name: String,
    #[tabled(rename = "Program")]
    active: String,
}

#[derive(Tabled)]
struct ItemRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Visible")]
    enabled: String,
    #[tabled(rename = "Group")]
    group: String,
}

#[derive(Tabled)]
struct AudioRow {
    #[tabled(rename = "Input")]
    name: String,
    #[tabled(rename = "Muted")]
    muted: String,
    #[tabled(rename = "Volume")]
    volume: String,
}

#[derive(Tabled)]
struct TransitionRow {
    #[tabled(rename = "Transition")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Current")]
    current: String,
}

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "Profile")]
    name: String,
    #[tabled(rename = "Current")]
    current: String,
}

/// `status` output: link state plus what is on air.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusView {
    tenant: String,
    connected: bool,
    mode: Option<String>,
    address: Option<String>,
    port: Option<u16>,
    stream: StreamState,
    program_scene: Option<String>,
    studio_mode: bool,
}

// ── Reads ────────────────────────────────────────────────────────────

/// Unlike the other reads, an unreachable instance is reported, not fatal.
pub async fn status(rt: &Runtime, tenant: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let record = rt.record(tenant)?;
    let id = record.id.clone();
    if record.config.has_address() {
        if let Err(e) = rt.registry().get_or_create(&id, record.config).await {
            tracing::info!(tenant = %id, error = %e, "instance not reachable");
        }
    }

    let link = rt.gateway().tenant_status(&id).await?;
    let facade = rt.facade();
    let (stream, program, studio_mode) = tokio::join!(
        facade.get_stream_state(&id),
        facade.get_program_state(&id),
        facade.get_studio_mode_enabled(&id),
    );

    let view = StatusView {
        tenant: id.to_string(),
        connected: link.connected,
        mode: link.mode,
        address: link.address,
        port: link.port,
        stream,
        program_scene: program.map(|p| p.scene),
        studio_mode,
    };

    let color = output::should_color(&global.color);
    let rendered = output::render_single(
        &global.output,
        &view,
        |v| {
            format!(
                "Tenant:      {}\n\
                 Connected:   {}\n\
                 Mode:        {}\n\
                 Address:     {}\n\
                 Port:        {}\n\
                 Stream:      {}\n\
                 Program:     {}\n\
                 Studio mode: {}",
                v.tenant,
                output::flag(v.connected, color),
                v.mode.as_deref().unwrap_or("-"),
                v.address.as_deref().unwrap_or("-"),
                v.port.map_or_else(|| "-".into(), |p| p.to_string()),
                output::live_label(&v.stream.to_string(), v.stream == StreamState::Live, color),
                v.program_scene.as_deref().unwrap_or("-"),
                output::flag(v.studio_mode, color),
            )
        },
        |v| v.stream.to_string(),
    );
    output::print_output(&rendered, global.quiet);
    Ok(())
}

pub async fn scenes(rt: &Runtime, tenant: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let id = rt.open(tenant).await?;
    let scenes: Vec<Scene> = rt.facade().get_scenes(&id).await;

    let color = output::should_color(&global.color);
    let rendered = output::render_list(
        &global.output,
        &scenes,
        |s| SceneRow {
            name: s.name.clone(),
            active: output::flag(s.is_active, color),
        },
        |s| s.name.clone(),
    );
    output::print_output(&rendered, global.quiet);
    Ok(())
}

pub async fn items(rt: &Runtime, args: &ItemsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let id = rt.open(&args.tenant).await?;
    let items: Vec<SceneItem> = rt.facade().get_scene_items(&id, &args.scene).await;

    let color = output::should_color(&global.color);
    let rendered = output::render_list(
        &global.output,
        &items,
        |i| ItemRow {
            id: i.id,
            source: i.source_name.clone(),
            enabled: output::flag(i.is_enabled, color),
            group: output::flag(i.is_group, color),
        },
        |i| i.source_name.clone(),
    );
    output::print_output(&rendered, global.quiet);
    Ok(())
}

pub async fn audio(rt: &Runtime, tenant: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let id = rt.open(tenant).await?;
    let sources: Vec<AudioSource> = rt.facade().get_audio_sources(&id).await;

    let color = output::should_color(&global.color);
    let rendered = output::render_list(
        &global.output,
        &sources,
        |a| AudioRow {
            name: a.name.clone(),
            muted: output::flag(a.is_muted, color),
            volume: format!("{:.0}%", a.volume_percent),
        },
        |a| a.name.clone(),
    );
    output::print_output(&rendered, global.quiet);
    Ok(())
}

/// Bitrate needs two polls, so a live stream is sampled twice.
pub async fn stats(rt: &Runtime, tenant: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let id = rt.open(tenant).await?;
    let facade = rt.facade();

    let mut stats: StreamStats = facade.get_stream_stats(&id).await;
    if stats.uptime != IDLE_UPTIME {
        tokio::time::sleep(BITRATE_SAMPLE).await;
        stats = facade.get_stream_stats(&id).await;
    }

    let rendered = output::render_single(
        &global.output,
        &stats,
        |s| {
            format!(
                "CPU:            {:.1}%\n\
                 FPS:            {:.1}\n\
                 Memory:         {:.0} MB\n\
                 Dropped frames: {} / {}\n\
                 Uptime:         {}\n\
                 Bitrate:        {} kbps\n\
                 Disk free:      {:.0} MB",
                s.cpu,
                s.fps,
                s.memory_mb,
                s.dropped_frames,
                s.total_frames,
                s.uptime,
                s.kbits_per_sec,
                s.disk_space_mb,
            )
        },
        |s| s.kbits_per_sec.to_string(),
    );
    output::print_output(&rendered, global.quiet);
    Ok(())
}

pub async fn profiles(rt: &Runtime, tenant: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let id = rt.open(tenant).await?;
    let profiles: ProfileList = rt.facade().get_profiles(&id).await;

    let color = output::should_color(&global.color);
    let rendered = output::render_single(
        &global.output,
        &profiles,
        |p| {
            let rows: Vec<_> = p
                .profiles
                .iter()
                .map(|name| (name.clone(), p.current.as_deref() == Some(name.as_str())))
                .collect();
            output::render_list(
                &global.output,
                &rows,
                |(name, current)| ProfileRow {
                    name: name.clone(),
                    current: output::flag(*current, color),
                },
                |(name, _)| name.clone(),
            )
        },
        |p| p.profiles.join("\n"),
    );
    output::print_output(&rendered, global.quiet);
    Ok(())
}

pub async fn transitions(rt: &Runtime, tenant: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let id = rt.open(tenant).await?;
    let transitions: Vec<Transition> = rt.facade().get_transitions(&id).await;

    let color = output::should_color(&global.color);
    let rendered = output::render_list(
        &global.output,
        &transitions,
        |t| TransitionRow {
            name: t.name.clone(),
            kind: t.kind.clone(),
            current: output::flag(t.is_current, color),
        },
        |t| t.name.clone(),
    );
    output::print_output(&rendered, global.quiet);
    Ok(())
}

// ── Writes ───────────────────────────────────────────────────────────

pub async fn switch_scene(
    rt: &Runtime,
    args: &SceneArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let id = rt.open(&args.tenant).await?;
    rt.facade().switch_scene(&id, &args.name).await?;
    util::done(global, &format!("{id}: program scene is now '{}'", args.name));
    Ok(())
}

pub async fn stream(rt: &Runtime, args: &StreamArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let id = rt.open(&args.tenant).await?;
    // toggle_stream flips from the state it is given
    let (from, verb) = match args.action {
        StreamAction::Start => (StreamState::Offline, "started"),
        StreamAction::Stop => (StreamState::Live, "stopped"),
    };
    rt.facade().toggle_stream(&id, from).await?;
    util::done(global, &format!("{id}: stream {verb}"));
    Ok(())
}

pub async fn mute(rt: &Runtime, args: &MuteArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let id = rt.open(&args.tenant).await?;
    let muted = !args.off;
    rt.facade().set_mute(&id, &args.input, muted).await?;
    let state = if muted { "muted" } else { "unmuted" };
    util::done(global, &format!("{id}: '{}' {state}", args.input));
    Ok(())
}

pub async fn volume(rt: &Runtime, args: &VolumeArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let id = rt.open(&args.tenant).await?;
    rt.facade().set_volume(&id, &args.input, args.percent).await?;
    util::done(
        global,
        &format!("{id}: '{}' volume set to {:.0}%", args.input, args.percent),
    );
    Ok(())
}

pub async fn restart_source(
    rt: &Runtime,
    args: &RestartSourceArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let id = rt.open(&args.tenant).await?;
    rt.facade().restart_source(&id, &args.source).await?;
    util::done(global, &format!("{id}: '{}' restarted", args.source));
    Ok(())
}

pub async fn bitrate(
    rt: &Runtime,
    args: &BitrateArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let id = rt.open(&args.tenant).await?;
    rt.facade().set_stream_bitrate(&id, args.kbps).await?;
    util::done(global, &format!("{id}: bitrate set to {} kbps", args.kbps));
    Ok(())
}

/// Raw passthrough. The response is printed as JSON whatever `--output`
/// says, since it has no fixed shape.
pub async fn call(rt: &Runtime, args: &CallArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let data = util::parse_request_data(args.data.as_deref())?;
    let id = rt.open(&args.tenant).await?;
    let response = rt.facade().send_raw(&id, &args.request_type, data).await?;

    let compact = matches!(global.output, crate::cli::OutputFormat::JsonCompact);
    output::print_output(&output::render_json(&response, compact), global.quiet);
    Ok(())
}

