use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::info;
use playdeck::utils::format_duration;
use playdeck::{
    Config, PlayerEvent, ServiceBuilder, SimEngine, SimTimings, SyncAction, SyncGroup,
};
use std::time::{Duration, Instant};

/// Playdeck - multi-instance video playback orchestration demo
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Media URL to load into every instance
    #[arg(value_name = "URL", default_value = "sim://demo.m3u8")]
    url: String,

    /// Number of player instances to drive
    #[arg(short, long, default_value = "2")]
    instances: usize,

    /// Simulated media duration in seconds
    #[arg(long, default_value = "5")]
    duration: u64,

    /// Mirror transport actions across all instances as one sync group
    #[arg(short, long)]
    sync: bool,

    /// Print notifications as JSON lines instead of log output
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    info!("Starting Playdeck v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;

    let timings = SimTimings {
        prepare_delay: Duration::from_millis(200),
        media_duration: Duration::from_secs(args.duration),
        video_size: (1920, 1080),
    };

    let mut builder = ServiceBuilder::new()
        .config(config)
        .engine_factory(SimEngine::factory(timings));
    if args.sync && args.instances > 1 {
        builder = builder.sync_group(SyncGroup::with_shared_url(
            (0..args.instances).collect(),
            args.url.clone(),
        ));
    }
    let service = builder.build()?;

    let events = service.events();

    // Index 0 already exists; create the rest
    for _ in 1..args.instances {
        service.create_instance();
    }
    let streaming = args.url.ends_with(".m3u8");
    for instance in 0..args.instances as i32 {
        service.load(instance, args.url.clone(), streaming, false, false);
    }

    if args.sync {
        // Drive everything through instance 0; the coordinator mirrors it
        service.dispatch_synced(0, SyncAction::Play);
    }

    // Watch notifications until every instance has finished
    let mut finished = 0;
    let deadline = Instant::now() + Duration::from_secs(args.duration + 10);
    while finished < args.instances && Instant::now() < deadline {
        let event = match events.recv_timeout(Duration::from_millis(250)) {
            Ok(event) => event,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        };

        if args.json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            match &event {
                PlayerEvent::StatusChanged { instance, status, code } => {
                    info!("instance {}: status {:?} (code {})", instance, status, code);
                }
                PlayerEvent::ProgressChanged {
                    instance,
                    progress,
                    duration,
                } => {
                    log::debug!(
                        "instance {}: {:5.1}% of {}",
                        instance,
                        progress * 100.0,
                        format_duration(Duration::from_secs_f64(*duration))
                    );
                }
                PlayerEvent::VideoSizeChanged {
                    instance,
                    width,
                    height,
                } => {
                    info!("instance {}: video size {}x{}", instance, width, height);
                }
            }
        }

        if matches!(
            event,
            PlayerEvent::StatusChanged {
                status: playdeck::PlaybackStatus::Finished,
                ..
            }
        ) {
            finished += 1;
        }
    }

    info!("{} of {} instances finished, shutting down", finished, args.instances);
    service.shutdown();
    Ok(())
}
