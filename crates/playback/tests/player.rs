//! Player behaviour under a paused clock.
//!
//! Every test runs with `start_paused`, so sleeps advance virtual time
//! deterministically and timers fire exactly when due.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use pov_assets::{AssetStore, AssetStoreConfig, MemoryBlobStore, NewAsset, NoopProbe};
use pov_core::handle::SourceHandle;
use pov_core::scenario::node_types;
use pov_core::{AudioSettings, GraphStore, Position, TimerSettings};
use pov_playback::{
    PlaybackConfig, PlaybackEngine, PlaybackError, PlaybackEvent, PlaybackState, PlayerHandle,
    TransitionError,
};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn assets() -> Arc<AssetStore> {
    Arc::new(AssetStore::new(
        Arc::new(MemoryBlobStore::new()),
        Arc::new(NoopProbe),
        AssetStoreConfig::default(),
    ))
}

fn engine(graph: GraphStore, assets: Arc<AssetStore>, config: PlaybackConfig) -> PlaybackEngine {
    PlaybackEngine::new(Arc::new(graph), assets, config)
}

fn node(graph: &mut GraphStore, node_type: &str) -> String {
    graph.add_node(node_type, Position::default())
}

fn timer(duration: f64) -> TimerSettings {
    TimerSettings {
        duration,
        ..Default::default()
    }
}

fn set_timer(graph: &mut GraphStore, node_id: &str, settings: TimerSettings) {
    graph
        .update_content(node_id, |c| c.timer = Some(settings))
        .unwrap();
}

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

fn drain(rx: &mut broadcast::Receiver<PlaybackEvent>) -> Vec<PlaybackEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn playing(node_id: &str) -> PlaybackState {
    PlaybackState::Playing {
        node_id: node_id.to_string(),
    }
}

async fn started(engine: &PlaybackEngine) -> PlayerHandle {
    let player = engine.start().unwrap();
    // Let the player finish entering the start node.
    advance(1).await;
    player
}

// ---------------------------------------------------------------------------
// Start
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn empty_or_cyclic_graph_has_no_start() {
    let empty = engine(GraphStore::new(), assets(), PlaybackConfig::default());
    assert_matches!(empty.start().err(), Some(PlaybackError::NoStartNode));

    let mut graph = GraphStore::new();
    let a = node(&mut graph, node_types::IMAGE);
    let b = node(&mut graph, node_types::IMAGE);
    graph.connect(&a, &b, None).unwrap();
    graph.connect(&b, &a, None).unwrap();
    let cyclic = engine(graph, assets(), PlaybackConfig::default());
    assert_matches!(cyclic.start().err(), Some(PlaybackError::NoStartNode));
}

// ---------------------------------------------------------------------------
// Timers
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn image_auto_advances_when_timer_fires() {
    let mut graph = GraphStore::new();
    let a = node(&mut graph, node_types::IMAGE);
    let b = node(&mut graph, node_types::IMAGE);
    set_timer(&mut graph, &a, timer(2.0));
    graph.connect(&a, &b, None).unwrap();

    let engine = engine(graph, assets(), PlaybackConfig::default());
    let player = started(&engine).await;
    assert_eq!(player.state(), playing(&a));

    advance(1_900).await;
    assert_eq!(player.state(), playing(&a));

    advance(200).await;
    assert_eq!(player.state(), playing(&b));
    player.stop().await;
}

#[tokio::test(start_paused = true)]
async fn timer_without_successor_terminates() {
    let mut graph = GraphStore::new();
    let a = node(&mut graph, node_types::IMAGE);
    set_timer(&mut graph, &a, timer(2.0));

    let engine = engine(graph, assets(), PlaybackConfig::default());
    let player = started(&engine).await;
    let mut events = player.subscribe();

    advance(2_100).await;
    assert_eq!(player.state(), PlaybackState::Terminal { node_id: a.clone() });
    assert!(drain(&mut events).contains(&PlaybackEvent::Terminal { node_id: a }));
    player.stop().await;
}

#[tokio::test(start_paused = true)]
async fn oversized_timer_never_fires() {
    let mut graph = GraphStore::new();
    let a = node(&mut graph, node_types::IMAGE);
    let b = node(&mut graph, node_types::IMAGE);
    set_timer(&mut graph, &a, timer(1e30));
    graph.connect(&a, &b, None).unwrap();

    let engine = engine(graph, assets(), PlaybackConfig::default());
    let player = engine.start().unwrap();
    let mut events = player.subscribe();
    advance(1).await;
    assert!(drain(&mut events).contains(&PlaybackEvent::TimerArmed {
        node_id: a.clone(),
        duration_secs: 1e30,
    }));

    advance(60_000).await;
    assert_eq!(player.state(), playing(&a));
    player.stop().await;
    assert_eq!(player.state(), PlaybackState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn looping_timer_rearms_instead_of_completing() {
    let mut graph = GraphStore::new();
    let a = node(&mut graph, node_types::IMAGE);
    let b = node(&mut graph, node_types::IMAGE);
    set_timer(
        &mut graph,
        &a,
        TimerSettings {
            looping: true,
            ..timer(2.0)
        },
    );
    graph.connect(&a, &b, None).unwrap();

    let engine = engine(graph, assets(), PlaybackConfig::default());
    let player = started(&engine).await;
    let mut events = player.subscribe();

    advance(4_500).await;
    assert_eq!(player.state(), playing(&a));
    let looped = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, PlaybackEvent::Looped { .. }))
        .count();
    assert_eq!(looped, 2);
    player.stop().await;
}

#[tokio::test(start_paused = true)]
async fn disabled_auto_transition_waits() {
    let mut graph = GraphStore::new();
    let a = node(&mut graph, node_types::IMAGE);
    let b = node(&mut graph, node_types::IMAGE);
    set_timer(
        &mut graph,
        &a,
        TimerSettings {
            auto_transition: false,
            ..timer(1.0)
        },
    );
    graph.connect(&a, &b, None).unwrap();

    let engine = engine(graph, assets(), PlaybackConfig::default());
    let player = started(&engine).await;
    advance(10_000).await;
    assert_eq!(player.state(), playing(&a));
    player.stop().await;
}

#[tokio::test(start_paused = true)]
async fn interaction_cancels_pause_on_interaction_timer() {
    let mut graph = GraphStore::new();
    let a = node(&mut graph, node_types::IMAGE);
    let b = node(&mut graph, node_types::IMAGE);
    set_timer(
        &mut graph,
        &a,
        TimerSettings {
            pause_on_interaction: true,
            ..timer(5.0)
        },
    );
    graph.connect(&a, &b, None).unwrap();

    let engine = engine(graph, assets(), PlaybackConfig::default());
    let player = started(&engine).await;
    let mut events = player.subscribe();

    advance(1_000).await;
    player.interact();
    // A second interaction is a no-op; the latch does not re-arm.
    player.interact();

    advance(5_000).await;
    assert_eq!(player.state(), playing(&a));
    let cancelled: Vec<_> = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, PlaybackEvent::TimerCancelled { .. }))
        .collect();
    assert_eq!(cancelled.len(), 1);
    player.stop().await;
}

#[tokio::test(start_paused = true)]
async fn interaction_without_pause_setting_is_ignored() {
    let mut graph = GraphStore::new();
    let a = node(&mut graph, node_types::IMAGE);
    let b = node(&mut graph, node_types::IMAGE);
    set_timer(&mut graph, &a, timer(2.0));
    graph.connect(&a, &b, None).unwrap();

    let engine = engine(graph, assets(), PlaybackConfig::default());
    let player = started(&engine).await;
    player.interact();
    advance(2_100).await;
    assert_eq!(player.state(), playing(&b));
    player.stop().await;
}

#[tokio::test(start_paused = true)]
async fn timer_of_a_left_node_never_fires() {
    let mut graph = GraphStore::new();
    let a = node(&mut graph, node_types::IMAGE);
    let b = node(&mut graph, node_types::IMAGE);
    let c = node(&mut graph, node_types::IMAGE);
    set_timer(&mut graph, &a, timer(2.0));
    set_timer(&mut graph, &b, timer(3.0));
    let go = graph.add_choice(&a, "Go").unwrap();
    graph
        .connect(&a, &b, Some(&SourceHandle::for_choice(&go)))
        .unwrap();
    graph.connect(&b, &c, None).unwrap();

    let engine = engine(graph, assets(), PlaybackConfig::default());
    let player = started(&engine).await;

    advance(1_000).await;
    assert_eq!(player.select_choice(&go).await, Ok(b.clone()));

    // A's timer would have fired here.
    advance(1_500).await;
    assert_eq!(player.state(), playing(&b));

    advance(1_600).await;
    assert_eq!(player.state(), playing(&c));
    player.stop().await;
}

// ---------------------------------------------------------------------------
// Choices
// ---------------------------------------------------------------------------

struct Fork {
    graph: GraphStore,
    a: String,
    b: String,
    c: String,
    left: String,
    right: String,
    dangling: String,
}

fn fork() -> Fork {
    let mut graph = GraphStore::new();
    let a = node(&mut graph, node_types::IMAGE);
    let b = node(&mut graph, node_types::IMAGE);
    let c = node(&mut graph, node_types::IMAGE);
    set_timer(&mut graph, &a, timer(1.0));
    let left = graph.add_choice(&a, "Left").unwrap();
    let right = graph.add_choice(&a, "Right").unwrap();
    let dangling = graph.add_choice(&a, "Nowhere").unwrap();
    graph
        .connect(&a, &b, Some(&SourceHandle::for_choice(&left)))
        .unwrap();
    graph
        .connect(&a, &c, Some(&SourceHandle::for_choice(&right)))
        .unwrap();
    Fork {
        graph,
        a,
        b,
        c,
        left,
        right,
        dangling,
    }
}

#[tokio::test(start_paused = true)]
async fn timer_on_choice_node_awaits_choice() {
    let fork = fork();
    let engine = engine(fork.graph, assets(), PlaybackConfig::default());
    let player = started(&engine).await;
    let mut events = player.subscribe();

    advance(1_100).await;
    assert_eq!(
        player.state(),
        PlaybackState::AwaitingChoice {
            node_id: fork.a.clone()
        }
    );
    assert!(drain(&mut events).contains(&PlaybackEvent::AwaitingChoice {
        node_id: fork.a.clone(),
        choices: vec![fork.left.clone(), fork.right.clone()],
    }));

    assert_eq!(player.select_choice(&fork.right).await, Ok(fork.c.clone()));
    advance(1).await;
    assert_eq!(player.state(), playing(&fork.c));
    assert!(drain(&mut events).contains(&PlaybackEvent::Advanced {
        from: fork.a.clone(),
        to: fork.c.clone(),
        choice_id: Some(fork.right.clone()),
    }));
    player.stop().await;
}

#[tokio::test(start_paused = true)]
async fn choices_are_actionable_while_playing() {
    let fork = fork();
    let engine = engine(fork.graph, assets(), PlaybackConfig::default());
    let player = started(&engine).await;

    assert_eq!(player.state(), playing(&fork.a));
    assert_eq!(player.select_choice(&fork.left).await, Ok(fork.b.clone()));
    player.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failed_selections_report_why_and_stay_put() {
    let fork = fork();
    let engine = engine(fork.graph, assets(), PlaybackConfig::default());
    let player = started(&engine).await;

    assert_eq!(
        player.select_choice(&fork.dangling).await,
        Err(TransitionError::Unresolved {
            node_id: fork.a.clone(),
            choice_id: fork.dangling.clone(),
        })
    );
    assert_matches!(
        player.select_choice("no-such-choice").await,
        Err(TransitionError::UnknownChoice { .. })
    );
    assert_eq!(player.state(), playing(&fork.a));
    player.stop().await;
}

// ---------------------------------------------------------------------------
// Video and media
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn video_end_advances_and_image_ignores_it() {
    let mut graph = GraphStore::new();
    let a = node(&mut graph, node_types::VIDEO);
    let b = node(&mut graph, node_types::IMAGE);
    let c = node(&mut graph, node_types::IMAGE);
    graph.connect(&a, &b, None).unwrap();
    graph.connect(&b, &c, None).unwrap();

    let engine = engine(graph, assets(), PlaybackConfig::default());
    let player = started(&engine).await;

    player.media_ended();
    advance(1).await;
    assert_eq!(player.state(), playing(&b));

    player.media_ended();
    advance(1).await;
    assert_eq!(player.state(), playing(&b));
    player.stop().await;
}

#[tokio::test(start_paused = true)]
async fn missing_media_shows_placeholder_and_continues() {
    let mut graph = GraphStore::new();
    let a = node(&mut graph, node_types::IMAGE);
    let b = node(&mut graph, node_types::IMAGE);
    graph.set_media(&a, Some("deleted-asset".into())).unwrap();
    set_timer(&mut graph, &a, timer(1.0));
    graph.connect(&a, &b, None).unwrap();

    let engine = engine(graph, assets(), PlaybackConfig::default());
    let player = engine.start().unwrap();
    let mut events = player.subscribe();

    advance(1_100).await;
    assert_eq!(player.state(), playing(&b));
    let events = drain(&mut events);
    assert!(events.iter().any(|e| matches!(
        e,
        PlaybackEvent::MediaUnavailable { asset_id, .. } if asset_id == "deleted-asset"
    )));
    player.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stored_media_is_announced() {
    let store = assets();
    let clip = store
        .put(vec![0; 32], NewAsset::new("clip", "video/mp4"))
        .await
        .unwrap();
    let mut graph = GraphStore::new();
    let a = node(&mut graph, node_types::VIDEO);
    graph.set_media(&a, Some(clip.metadata.id.clone())).unwrap();

    let engine = engine(graph, store, PlaybackConfig::default());
    let player = engine.start().unwrap();
    let mut events = player.subscribe();
    advance(1).await;

    assert!(drain(&mut events).iter().any(|e| matches!(
        e,
        PlaybackEvent::MediaReady { asset_id, url, .. }
            if *asset_id == clip.metadata.id && url == clip.handle.url()
    )));
    player.stop().await;
}

// ---------------------------------------------------------------------------
// Audio
// ---------------------------------------------------------------------------

async fn with_theme(settings: AudioSettings) -> (GraphStore, Arc<AssetStore>, String, String) {
    let store = assets();
    let theme = store
        .put(vec![0; 16], NewAsset::new("theme", "audio/mpeg"))
        .await
        .unwrap();
    let mut graph = GraphStore::new();
    let a = node(&mut graph, node_types::IMAGE);
    let b = node(&mut graph, node_types::TEXT);
    graph.set_audio(&a, Some(theme.metadata.id.clone())).unwrap();
    graph
        .update_content(&a, |c| c.audio = Some(settings))
        .unwrap();
    set_timer(&mut graph, &a, timer(2.0));
    graph.connect(&a, &b, None).unwrap();
    (graph, store, a, b)
}

fn volumes(events: &[PlaybackEvent], node: &str) -> Vec<f64> {
    events
        .iter()
        .filter_map(|e| match e {
            PlaybackEvent::AudioVolume { node_id, volume } if node_id == node => Some(*volume),
            _ => None,
        })
        .collect()
}

fn audio_stopped(events: &[PlaybackEvent], node: &str) -> bool {
    events
        .iter()
        .any(|e| matches!(e, PlaybackEvent::AudioStopped { node_id } if node_id == node))
}

#[tokio::test(start_paused = true)]
async fn audio_fades_in_and_out_around_the_visit() {
    let settings = AudioSettings {
        volume: 0.5,
        fade_in: Some(1.0),
        fade_out: Some(1.0),
        ..Default::default()
    };
    let (graph, store, a, b) = with_theme(settings).await;
    let engine = engine(
        graph,
        store,
        PlaybackConfig {
            fade_steps: 5,
            ..Default::default()
        },
    );
    let player = engine.start().unwrap();
    let mut rx = player.subscribe();

    advance(1_100).await;
    let mut events = drain(&mut rx);
    assert_matches!(
        events.first(),
        Some(PlaybackEvent::NodeEntered { .. })
    );
    assert!(events.iter().any(|e| matches!(
        e,
        PlaybackEvent::AudioStarted { volume, .. } if *volume == 0.0
    )));
    let up = volumes(&events, &a);
    assert_eq!(up.len(), 5);
    assert!(up.windows(2).all(|w| w[0] < w[1]));
    assert!((up[4] - 0.5).abs() < 1e-9);

    // Leaving at 2s starts a one second fade-out that outlives the visit.
    advance(1_400).await;
    assert_eq!(player.state(), playing(&b));
    events = drain(&mut rx);
    assert!(!audio_stopped(&events, &a));

    advance(600).await;
    events.extend(drain(&mut rx));
    let down = volumes(&events, &a);
    assert_eq!(down.len(), 5);
    assert!(down.windows(2).all(|w| w[0] > w[1]));
    assert_eq!(down[4], 0.0);
    assert!(audio_stopped(&events, &a));
    player.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stop_cuts_audio_before_reporting_stopped() {
    let settings = AudioSettings {
        fade_out: Some(3.0),
        ..Default::default()
    };
    let (graph, store, a, _) = with_theme(settings).await;
    let engine = engine(graph, store, PlaybackConfig::default());
    let player = engine.start().unwrap();
    let mut rx = player.subscribe();
    advance(500).await;

    player.stop().await;
    let events = drain(&mut rx);
    let cut = events
        .iter()
        .position(|e| matches!(e, PlaybackEvent::AudioStopped { node_id } if *node_id == a));
    let stopped = events
        .iter()
        .position(|e| *e == PlaybackEvent::Stopped);
    assert_matches!((cut, stopped), (Some(cut), Some(stopped)) if cut < stopped);
    assert!(volumes(&events, &a).is_empty());
}

#[tokio::test(start_paused = true)]
async fn oversized_fades_hold_until_stop() {
    let settings = AudioSettings {
        fade_in: Some(1e30),
        fade_out: Some(1e30),
        ..Default::default()
    };
    let (graph, store, a, b) = with_theme(settings).await;
    let engine = engine(graph, store, PlaybackConfig::default());
    let player = engine.start().unwrap();
    let mut rx = player.subscribe();

    // The 2s timer interrupts the fade-in; the fade-out then never ends.
    advance(5_000).await;
    assert_eq!(player.state(), playing(&b));
    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        PlaybackEvent::AudioStarted { node_id, volume, .. } if *node_id == a && *volume == 0.0
    )));
    assert!(volumes(&events, &a).is_empty());
    assert!(!audio_stopped(&events, &a));

    player.stop().await;
    let events = drain(&mut rx);
    assert!(audio_stopped(&events, &a));
    assert_eq!(events.last(), Some(&PlaybackEvent::Stopped));
}

// ---------------------------------------------------------------------------
// Stop
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent_and_final() {
    let fork = fork();
    let engine = engine(fork.graph, assets(), PlaybackConfig::default());
    let player = started(&engine).await;

    player.stop().await;
    player.stop().await;
    assert!(player.is_stopped());
    assert_eq!(player.state(), PlaybackState::Stopped);
    assert_eq!(
        player.select_choice(&fork.left).await,
        Err(TransitionError::Stopped)
    );

    // Nothing fires after a stop.
    advance(5_000).await;
    assert_eq!(player.state(), PlaybackState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn every_start_is_a_fresh_player() {
    let mut graph = GraphStore::new();
    let a = node(&mut graph, node_types::IMAGE);
    let b = node(&mut graph, node_types::IMAGE);
    set_timer(&mut graph, &a, timer(1.0));
    graph.connect(&a, &b, None).unwrap();
    let engine = engine(graph, assets(), PlaybackConfig::default());

    let first = started(&engine).await;
    advance(1_100).await;
    assert_eq!(first.state(), playing(&b));
    first.stop().await;

    let second = started(&engine).await;
    assert_eq!(second.state(), playing(&a));
    second.stop().await;
}
