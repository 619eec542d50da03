use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::broadcast::error::RecvError;

use lumasync_lib::artnet::ArtNetTransport;
use lumasync_lib::clock::SystemClock;
use lumasync_lib::events::ShowEvent;
use lumasync_lib::fixtures::parser::load_catalog;
use lumasync_lib::models::playback::PlaybackStatus;
use lumasync_lib::models::tasks::TaskStatus;
use lumasync_lib::settings::ShowSettings;
use lumasync_lib::transport::{DryRunTransport, FrameTransport};
use lumasync_lib::{ShowError, ShowResult, ShowRuntime};

/// Render an Actions Sheet and play it out over Art-Net
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Fixture definition file, or a directory of them
    #[arg(short = 'c', long = "catalog", value_name = "PATH")]
    catalog: PathBuf,

    /// Saved Actions Sheet (JSON list of actions)
    #[arg(short = 'a', long = "actions", value_name = "FILE")]
    actions: Option<PathBuf>,

    /// Song length in seconds
    #[arg(short = 'l', long = "length", value_name = "SECONDS")]
    length: f64,

    /// Settings file (JSON object of key/value pairs)
    #[arg(short = 's', long = "settings", value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Start position in seconds
    #[arg(long = "start", value_name = "SECONDS", default_value_t = 0.0)]
    start: f64,

    /// Loop at the end of the song instead of stopping
    #[arg(long = "loop")]
    looping: bool,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbosity: u8,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    // Console logging with specified verbosity level (respects RUST_LOG if set)
    let default_level = match args.verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
    log::debug!("Command-line args: {:?}", args);

    if let Err(e) = run(args).await {
        log::error!("{}", e);
        eprintln!("lumasync: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> ShowResult<()> {
    let settings = match &args.settings {
        Some(path) => ShowSettings::load(path)?,
        None => ShowSettings::default(),
    };
    let catalog = load_catalog(&args.catalog)?;

    let transport: Arc<dyn FrameTransport> = if settings.artnet_enabled {
        Arc::new(ArtNetTransport::bind(&settings.artnet_config())?)
    } else {
        log::info!("Art-Net disabled, frames go to the dry-run transport");
        Arc::new(DryRunTransport)
    };

    let runtime = Arc::new(ShowRuntime::new(
        settings,
        catalog,
        args.length,
        transport,
        Arc::new(SystemClock::new()),
    )?);
    if let Some(path) = &args.actions {
        runtime.load_actions_file(path)?;
    }

    // Log task progress as it is published
    let mut events = runtime.events().subscribe();
    let progress_logger = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            };
            if let ShowEvent::Task(task) = event {
                match task.status {
                    TaskStatus::Running => log::info!(
                        "{} {}% ({}/{})",
                        task.operation,
                        task.progress,
                        task.current,
                        task.total
                    ),
                    TaskStatus::Completed => log::info!("{} done", task.operation),
                    TaskStatus::Failed => log::warn!(
                        "{} failed: {}",
                        task.operation,
                        task.error.unwrap_or_default()
                    ),
                }
            }
        }
    });

    let (task_id, handle) = runtime.spawn_background_render(None)?;
    let report = handle.await.map_err(|e| ShowError::TaskFailure {
        task_id,
        message: e.to_string(),
    })??;
    for failure in &report.failures {
        log::warn!("Skipped action {}: {}", failure.key, failure.error);
    }
    log::info!(
        "Rendered {} action(s), canvas {}",
        report.rendered,
        &report.digest[..12]
    );

    let playback = runtime.playback();
    playback.set_loop(args.looping);
    playback.seek(args.start)?;
    playback.play()?;
    let tick_loop = playback.spawn_tick_loop();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted");
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {
                if playback.status() == PlaybackStatus::Stopped {
                    break;
                }
            }
        }
    }

    tick_loop.shutdown().await;
    let snapshot = playback.stop();
    progress_logger.abort();
    log::info!(
        "Sent {} frame(s), {} transport failure(s)",
        snapshot.frames_emitted,
        snapshot.transport_failures
    );
    Ok(())
}
