//! End-to-end tests driving the public service API with the simulated engine

use playdeck::{
    Config, PlaybackStatus, PlayerEvent, ResizeMode, ServiceBuilder, SimEngine, SimTimings,
    SyncAction, SyncGroup, VideoSurface,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn fast_timings() -> SimTimings {
    SimTimings {
        prepare_delay: Duration::from_millis(20),
        media_duration: Duration::from_millis(400),
        video_size: (1280, 720),
    }
}

fn fast_config(autoplay: bool) -> Config {
    let mut config = Config::default();
    config.playback.autoplay = autoplay;
    config.playback.progress_interval_ms = 50;
    config
}

fn wait_until(deadline_ms: u64, mut probe: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(deadline_ms);
    while Instant::now() < deadline {
        if probe() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    probe()
}

/// Collect events for `instance` until one matches `until` or the deadline
/// passes
fn collect_until(
    events: &crossbeam_channel::Receiver<PlayerEvent>,
    deadline_ms: u64,
    until: impl Fn(&PlayerEvent) -> bool,
) -> Vec<PlayerEvent> {
    let deadline = Instant::now() + Duration::from_millis(deadline_ms);
    let mut seen = Vec::new();
    while Instant::now() < deadline {
        match events.recv_timeout(Duration::from_millis(50)) {
            Ok(event) => {
                let done = until(&event);
                seen.push(event);
                if done {
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }
    seen
}

#[test]
fn test_full_lifecycle_status_order_and_progress_range() {
    let service = ServiceBuilder::new()
        .config(fast_config(true))
        .engine_factory(SimEngine::factory(fast_timings()))
        .build()
        .unwrap();
    let events = service.events();

    service.load(0, "sim://clip.mp4", false, false, false);

    let seen = collect_until(&events, 3000, |event| {
        matches!(
            event,
            PlayerEvent::StatusChanged {
                instance: 0,
                status: PlaybackStatus::Finished,
                ..
            }
        )
    });

    let statuses: Vec<PlaybackStatus> = seen
        .iter()
        .filter_map(|event| match event {
            PlayerEvent::StatusChanged { instance: 0, status, .. } => Some(*status),
            _ => None,
        })
        .collect();

    assert_eq!(statuses.first(), Some(&PlaybackStatus::New));
    let loading = statuses.iter().position(|s| *s == PlaybackStatus::Loading);
    let playing = statuses.iter().position(|s| *s == PlaybackStatus::Playing);
    let finished = statuses.iter().position(|s| *s == PlaybackStatus::Finished);
    assert!(loading.is_some() && playing.is_some() && finished.is_some(), "{:?}", statuses);
    assert!(loading < playing && playing < finished, "{:?}", statuses);

    let mut progress_seen = 0;
    for event in &seen {
        if let PlayerEvent::ProgressChanged { progress, duration, .. } = event {
            assert!((0.0..=1.0).contains(progress), "progress {} out of range", progress);
            assert!(*duration >= 0.0);
            progress_seen += 1;
        }
    }
    assert!(progress_seen > 0, "no progress ticks observed");

    assert!(seen.iter().any(|event| matches!(
        event,
        PlayerEvent::StatusChanged {
            status: PlaybackStatus::Finished,
            code: 7,
            ..
        }
    )));

    service.shutdown();
}

#[test]
fn test_sync_group_mirrors_actions_without_feedback() {
    let service = ServiceBuilder::new()
        .config(fast_config(false))
        .engine_factory(SimEngine::factory(fast_timings()))
        .sync_group(SyncGroup::with_shared_url(vec![1, 2], "sim://shared.m3u8"))
        .build()
        .unwrap();

    service.load(1, "sim://shared.m3u8", true, false, false);
    service.load(2, "sim://shared.m3u8", true, false, false);
    assert!(wait_until(2000, || {
        service.registry().get(1).map(|p| p.status()) == Some(PlaybackStatus::Paused)
            && service.registry().get(2).map(|p| p.status()) == Some(PlaybackStatus::Paused)
    }));

    // Play from origin 1 reaches instance 2, and nothing outside the group
    service.dispatch_synced(1, SyncAction::Play);
    assert!(wait_until(2000, || {
        service.registry().get(2).map(|p| p.status()) == Some(PlaybackStatus::Playing)
    }));
    assert!(wait_until(2000, || {
        service.registry().get(1).map(|p| p.status()) == Some(PlaybackStatus::Playing)
    }));
    assert_eq!(
        service.registry().get(0).map(|p| p.status()),
        Some(PlaybackStatus::None)
    );

    // Seek from origin 2 lands on instance 1 as well
    service.dispatch_synced(2, SyncAction::Pause);
    service.dispatch_synced(2, SyncAction::Seek(0.5));
    let origin = service.get_progress(2).blocking_recv().unwrap();
    let follower = service.get_progress(1).blocking_recv().unwrap();
    assert!((origin - 0.5).abs() < 0.1, "origin progress {}", origin);
    assert!((follower - 0.5).abs() < 0.1, "follower progress {}", follower);

    service.shutdown();
}

#[test]
fn test_pending_surface_resolves_on_exact_index() {
    let service = ServiceBuilder::new()
        .config(fast_config(false))
        .engine_factory(SimEngine::factory(fast_timings()))
        .build()
        .unwrap();

    let surface = Arc::new(VideoSurface::new(77, ResizeMode::Fill));
    surface.set_player_instance(3);
    surface.set_bound(true);
    service.resolve_surface(Arc::clone(&surface));

    // Instances 1 and 2 must not satisfy a binding aimed at 3
    service.create_instance();
    service.create_instance();
    assert!(wait_until(2000, || service.instance_count() == 3));
    std::thread::sleep(Duration::from_millis(50));
    assert!(service
        .registry()
        .snapshot()
        .iter()
        .all(|p| p.output().is_none()));

    service.create_instance();
    assert!(wait_until(2000, || {
        service.registry().get(3).and_then(|p| p.output()) == Some(77)
    }));

    // Destroying the surface detaches it again
    service.remove_surface(77);
    assert!(wait_until(2000, || {
        service.registry().get(3).map(|p| p.output().is_none()) == Some(true)
    }));

    service.shutdown();
}

#[test]
fn test_bound_surface_receives_video_size() {
    let service = ServiceBuilder::new()
        .config(fast_config(true))
        .engine_factory(SimEngine::factory(fast_timings()))
        .build()
        .unwrap();
    let events = service.events();

    let surface = Arc::new(VideoSurface::new(5, ResizeMode::Fit));
    surface.set_player_instance(0);
    surface.set_bound(true);
    service.resolve_surface(Arc::clone(&surface));

    service.load(0, "sim://clip.mp4", false, false, false);

    let seen = collect_until(&events, 3000, |event| {
        matches!(event, PlayerEvent::VideoSizeChanged { instance: 0, .. })
    });
    assert!(seen.iter().any(|event| matches!(
        event,
        PlayerEvent::VideoSizeChanged {
            instance: 0,
            width: 1280,
            height: 720,
        }
    )));
    assert!(wait_until(1000, || surface.video_size() == Some((1280, 720))));

    service.shutdown();
}

#[test]
fn test_stop_ends_the_status_subscription() {
    let service = ServiceBuilder::new()
        .config(fast_config(true))
        .engine_factory(SimEngine::factory(fast_timings()))
        .build()
        .unwrap();
    let events = service.events();

    service.load(0, "sim://clip.mp4", false, false, false);
    assert!(wait_until(2000, || {
        service.registry().get(0).map(|p| p.status()) == Some(PlaybackStatus::Playing)
    }));

    service.stop(0);
    let seen = collect_until(&events, 2000, |event| {
        matches!(
            event,
            PlayerEvent::StatusChanged {
                instance: 0,
                status: PlaybackStatus::Stopped,
                ..
            }
        )
    });
    assert!(seen.iter().any(|event| matches!(
        event,
        PlayerEvent::StatusChanged {
            status: PlaybackStatus::Stopped,
            ..
        }
    )));

    // The slot is cleared after stop, so a clear produces no notification
    service.clear(0);
    assert!(wait_until(2000, || {
        service.registry().get(0).map(|p| p.status()) == Some(PlaybackStatus::None)
    }));
    std::thread::sleep(Duration::from_millis(100));
    assert!(
        events.try_iter().all(|event| !matches!(
            event,
            PlayerEvent::StatusChanged {
                status: PlaybackStatus::None,
                ..
            }
        )),
        "status slot should have been cleared by stop"
    );

    // A fresh load re-subscribes
    service.load(0, "sim://clip.mp4", false, false, false);
    let seen = collect_until(&events, 2000, |event| {
        matches!(
            event,
            PlayerEvent::StatusChanged {
                instance: 0,
                status: PlaybackStatus::New,
                ..
            }
        )
    });
    assert!(!seen.is_empty());

    service.shutdown();
}

#[test]
fn test_duration_query_reports_media_length() {
    let service = ServiceBuilder::new()
        .config(fast_config(true))
        .engine_factory(SimEngine::factory(fast_timings()))
        .build()
        .unwrap();

    service.load(0, "sim://clip.mp4", false, false, false);
    assert!(wait_until(2000, || {
        service.registry().get(0).map(|p| p.duration_ms()) == Some(400)
    }));

    let duration = service.get_duration(0).blocking_recv().unwrap();
    assert!((duration - 0.4).abs() < 1e-9, "duration {}", duration);

    service.shutdown();
}
