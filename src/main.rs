mod cli;

use camvault::{config, sim::SimulatedEngine, timefmt::format_duration};
use cv_av::{FfmpegCutter, FfprobeDurationProbe, ToolRegistry};
use cv_core::events::{Event, EventBus, EventPayload};
use cv_core::{DurationProbe, TimeRange};
use cv_timeline::{
    command_channel, ClipAssembler, ControllerSettings, FileLockProbe, LiveTailSelector,
    PlaybackController, PlaybackServices, SegmentCatalog, TimeRangeResolver,
};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

/// Position update interval of the simulated player.
const SIM_TICK: Duration = Duration::from_millis(500);

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "camvault=trace,cv_timeline=trace,cv_av=debug,cv_core=debug".to_string()
        } else {
            "camvault=info,cv_timeline=info,cv_av=info".to_string()
        }
    });

    // Logs go to stderr so --json output stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::List { probe, json } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(list_segments(&config, probe, json))
        }
        Commands::Resolve { start, end, json } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let range = time_range(start, end)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(resolve_range(&config, range, json))
        }
        Commands::Clip { start, end, output } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let range = time_range(start, end)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(assemble_clip(&config, range, output.as_deref()))
        }
        Commands::Live { follow } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let rt = tokio::runtime::Runtime::new()?;
            if follow {
                rt.block_on(follow_live(&config))
            } else {
                rt.block_on(show_live(&config))
            }
        }
        Commands::CheckTools => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            check_tools(&config)
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("camvault {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn time_range(start: NaiveDateTime, end: NaiveDateTime) -> Result<TimeRange> {
    Ok(TimeRange::new(start, end)?)
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

fn catalog(config: &config::Config) -> SegmentCatalog {
    SegmentCatalog::new(&config.archive.dir, config.archive.naming())
}

fn selector(config: &config::Config) -> LiveTailSelector {
    LiveTailSelector::new(catalog(config), Arc::new(FileLockProbe))
        .with_fallback(config.live.fallback_to_locked)
}

fn duration_probe(tools: &ToolRegistry) -> Result<Arc<dyn DurationProbe>> {
    let probe = FfprobeDurationProbe::from_registry(tools)
        .context("ffprobe is required to read segment durations")?;
    Ok(Arc::new(probe))
}

fn assembler(config: &config::Config, tools: &ToolRegistry) -> Result<ClipAssembler> {
    let cutter = FfmpegCutter::new(tools.clone()).context("ffmpeg is required to cut clips")?;
    Ok(ClipAssembler::new(
        Arc::new(cutter),
        config.clips.output_dir(),
        config.clips.scratch_dir(),
    )
    .with_extension(config.archive.extension.clone()))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn list_segments(config: &config::Config, probe: bool, json: bool) -> Result<()> {
    let catalog = catalog(config);
    let mut segments = catalog
        .list()
        .await
        .with_context(|| format!("Failed to list archive {:?}", catalog.dir()))?;

    if probe {
        let tools = ToolRegistry::discover(&config.tools);
        let prober = duration_probe(&tools)?;
        for segment in &mut segments {
            match prober.duration(&segment.path).await {
                Ok(d) => segment.duration = d,
                Err(e) => tracing::warn!("Could not probe {segment}: {e}"),
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&segments)?);
        return Ok(());
    }

    if segments.is_empty() {
        println!("No segments in {}", catalog.dir().display());
        return Ok(());
    }

    println!("Archive: {} ({} segments)", catalog.dir().display(), segments.len());
    for segment in &segments {
        let duration = if segment.is_probed() {
            format_duration(segment.duration)
        } else {
            "-".to_string()
        };
        println!("  {}  {:>12}  {}", segment.start, duration, segment.file_name());
    }

    Ok(())
}

async fn resolve_range(config: &config::Config, range: TimeRange, json: bool) -> Result<()> {
    let tools = ToolRegistry::discover(&config.tools);
    let resolver = TimeRangeResolver::new(catalog(config), duration_probe(&tools)?);
    let span = resolver.resolve(range).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&span)?);
        return Ok(());
    }

    println!("Range: {}", span.range());
    println!("Pieces: {}", span.pieces().len());
    for (i, piece) in span.pieces().iter().enumerate() {
        println!(
            "  {}. {} from {} for {} ({:?})",
            i + 1,
            piece.segment.file_name(),
            format_duration(piece.offset),
            format_duration(piece.duration),
            piece.extent
        );
    }
    println!("Total: {}", format_duration(span.total_duration()));

    Ok(())
}

async fn assemble_clip(
    config: &config::Config,
    range: TimeRange,
    output: Option<&Path>,
) -> Result<()> {
    let tools = ToolRegistry::discover(&config.tools);
    let resolver = TimeRangeResolver::new(catalog(config), duration_probe(&tools)?);
    let assembler = assembler(config, &tools)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted; cancelling assembly");
            on_interrupt.cancel();
        }
    });

    let span = resolver.resolve(range).await?;
    tracing::info!("Assembling {} from {} segment(s)", range, span.pieces().len());
    let clip = assembler.assemble(&span, &cancel).await?;

    let path = match output {
        Some(dest) => {
            move_file(clip.path(), dest)
                .await
                .with_context(|| format!("Failed to move clip to {:?}", dest))?;
            dest.to_path_buf()
        }
        None => clip.path.clone(),
    };

    println!("Clip: {}", path.display());
    println!("Duration: {}", format_duration(clip.duration));
    println!("Segments: {}", clip.segment_count);

    Ok(())
}

/// Rename, falling back to copy-and-remove across filesystems.
async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await?;
    tokio::fs::remove_file(from).await
}

async fn show_live(config: &config::Config) -> Result<()> {
    let segment = selector(config).select().await?;
    println!("Live tail: {}", segment.path.display());
    println!("Started: {}", segment.start);
    Ok(())
}

async fn follow_live(config: &config::Config) -> Result<()> {
    let tools = ToolRegistry::discover(&config.tools);
    let probe = duration_probe(&tools)?;
    let services = PlaybackServices {
        resolver: Arc::new(TimeRangeResolver::new(catalog(config), Arc::clone(&probe))),
        assembler: Arc::new(assembler(config, &tools)?),
        selector: Arc::new(selector(config)),
    };

    let (engine, engine_events) = SimulatedEngine::new(probe, SIM_TICK);
    let bus = Arc::new(EventBus::default());
    let mut events = bus.subscribe();
    let controller = PlaybackController::new(
        engine,
        engine_events,
        services,
        ControllerSettings::from_config(&config.live, &config.seek),
        Arc::clone(&bus),
    );

    let (handle, commands) = command_channel(16);
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(controller.run(commands, shutdown.clone()));

    handle.enter_live().await?;
    println!("Following live tail in {} (Ctrl-C to stop)", config.archive.dir.display());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
            received = events.recv() => match received {
                Ok(event) => {
                    report(&event);
                    if matches!(event.payload, EventPayload::LiveEnded { .. }) {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => tracing::warn!("Dropped {n} playback events"),
                Err(RecvError::Closed) => break,
            }
        }
    }

    shutdown.cancel();
    task.await.context("Playback controller panicked")?;
    drop(handle);
    Ok(())
}

fn report(event: &Event) {
    let at = event.timestamp.format("%H:%M:%S");
    match &event.payload {
        EventPayload::Position { position, time_ms } => {
            tracing::trace!("position {:.3} ({} ms)", position, time_ms);
        }
        EventPayload::LengthKnown { length_ms } => tracing::debug!("length {} ms", length_ms),
        EventPayload::ModeChanged { mode } => println!("{at} mode {mode:?}"),
        EventPayload::TransportChanged { transport } => println!("{at} transport {transport:?}"),
        EventPayload::LiveLoading { segment } => println!("{at} loading {}", segment.display()),
        EventPayload::LiveFollowing { segment } => {
            println!("{at} following {}", segment.display())
        }
        EventPayload::LiveAwaitingNext { segment } => {
            println!("{at} finished {}; waiting for the next segment", segment.display())
        }
        EventPayload::LiveUnchanged { segment } => {
            tracing::debug!("live tail unchanged at {}", segment.display())
        }
        EventPayload::LiveEnded { reason } => println!("{at} live ended: {reason}"),
        EventPayload::EngineFault { message } => println!("{at} engine fault: {message}"),
        EventPayload::ClipRequested { range, .. } => println!("{at} clip requested {range}"),
        EventPayload::ClipReady { path, .. } => println!("{at} clip ready {}", path.display()),
        EventPayload::ClipFailed { error, .. } => println!("{at} clip failed: {error}"),
    }
}

fn check_tools(config: &config::Config) -> Result<()> {
    println!("Checking external tools...\n");

    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Clip assembly and probing need ffmpeg and ffprobe.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    println!("  Archive: {}", config.archive.dir.display());
    println!(
        "  Naming: {}-YYYYMMDD-HHMMSS.{}",
        config.archive.prefix, config.archive.extension
    );
    println!("  Live poll: {} ms", config.live.poll_interval_ms);
    match config.live.near_live_lookback() {
        Some(lookback) => println!("  Near-live lookback: {}", format_duration(lookback)),
        None => println!("  Near-live lookback: off"),
    }
    println!("  Clip output: {}", config.clips.output_dir().display());

    let warnings = config.validate();
    if !warnings.is_empty() {
        println!("\nWarnings:");
        for warning in &warnings {
            println!("  ! {}", warning);
        }
    }

    Ok(())
}
