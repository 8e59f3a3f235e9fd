// Integration tests for the background track controller and its fades

mod common;

use approx::assert_abs_diff_eq;
use bowlsynth::background::fade::FadePlan;
use bowlsynth::background::{BackgroundTrack, TrackState};
use common::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn track() -> (BackgroundTrack, Arc<FakeLoader>) {
    let loader = Arc::new(FakeLoader::default());
    (BackgroundTrack::new(loader.clone(), 50), loader)
}

fn loaded_track() -> (BackgroundTrack, Arc<FakeLoader>) {
    let (track, loader) = track();
    track.load(&memory_source()).unwrap();
    (track, loader)
}

fn is_non_decreasing(values: &[f32]) -> bool {
    values.windows(2).all(|w| w[0] <= w[1] + 1e-6)
}

fn is_non_increasing(values: &[f32]) -> bool {
    values.windows(2).all(|w| w[0] + 1e-6 >= w[1])
}

#[test]
fn test_two_second_fade_has_one_hundred_steps() {
    let plan = FadePlan::new(0.0, 0.5, 2.0, 50).unwrap();
    assert_eq!(plan.steps(), 100);
    assert_eq!(plan.step_delay(), Duration::from_millis(20));

    let volumes: Vec<f32> = plan.volumes().collect();
    assert_eq!(volumes.len(), 101);
    assert_eq!(volumes[0], 0.0);
    assert_eq!(volumes[100], 0.5);
    assert_abs_diff_eq!(volumes[50], 0.25, epsilon = 1e-6);
    assert!(is_non_decreasing(&volumes));
}

#[test]
fn test_unloaded_track_ignores_transport() {
    let (track, _) = track();

    track.play();
    track.pause();
    assert!(track.stop().is_ok());

    assert_eq!(track.state(), TrackState::Unloaded);
    assert!(!track.is_playing());
    assert!(!track.is_loaded());
    assert_eq!(track.source_name(), None);
}

#[test]
fn test_load_prepares_stopped_track() {
    let (track, loader) = track();
    track.set_volume(0.3);
    track.set_looping(false);
    track.load(&memory_source()).unwrap();

    assert_eq!(track.state(), TrackState::Stopped);
    assert_eq!(track.source_name().as_deref(), Some("rain.ogg"));

    let pipeline = loader.last();
    assert!(!pipeline.is_playing());
    assert_eq!(pipeline.current_volume(), 0.3);
    assert!(!pipeline.state.lock().unwrap().looping);
}

#[test]
fn test_failed_load_leaves_track_unloaded() {
    let (track, loader) = loaded_track();
    track.play();
    let previous = loader.last();

    loader.fail.store(true, Ordering::SeqCst);
    assert!(track.load(&memory_source()).is_err());

    assert_eq!(track.state(), TrackState::Unloaded);
    assert!(!track.is_loaded());
    assert!(!previous.is_playing(), "previous track is released before loading");

    track.play();
    assert_eq!(track.state(), TrackState::Unloaded);
}

#[test]
fn test_load_while_playing_replaces_pipeline() {
    let (track, loader) = loaded_track();
    track.play();
    let first = loader.last();

    track.load(&memory_source()).unwrap();

    assert_eq!(loader.load_count(), 2);
    assert!(!first.is_playing());
    assert!(!loader.last().is_playing());
    assert_eq!(track.state(), TrackState::Stopped);
}

#[test]
fn test_play_and_pause_without_fades_are_immediate() {
    let (track, loader) = loaded_track();
    let pipeline = loader.last();

    track.play();
    assert_eq!(track.state(), TrackState::Playing);
    assert!(pipeline.is_playing());
    assert_eq!(pipeline.current_volume(), 0.5);

    track.play();
    assert_eq!(track.state(), TrackState::Playing);

    track.pause();
    assert_eq!(track.state(), TrackState::Paused);
    assert!(!pipeline.is_playing());

    track.pause();
    assert_eq!(track.state(), TrackState::Paused);
}

#[test]
fn test_fade_in_ramps_to_target_volume() {
    let (track, loader) = loaded_track();
    let pipeline = loader.last();
    track.set_fade_in(0.2);
    let before = pipeline.trace().len();

    let started = Instant::now();
    track.play();
    assert_eq!(track.state(), TrackState::Playing);
    assert!(track.is_fading());
    assert!(wait_for(|| !track.is_fading()));
    let elapsed = started.elapsed();

    let ramp = pipeline.trace()[before..].to_vec();
    // Initial set to zero plus ten steps and the final value
    assert!(ramp.len() >= 11, "ramp {:?}", ramp);
    assert_eq!(ramp[0], 0.0);
    assert_eq!(*ramp.last().unwrap(), 0.5);
    assert!(is_non_decreasing(&ramp), "ramp {:?}", ramp);
    assert!(elapsed >= Duration::from_millis(150), "fade took {:?}", elapsed);
    assert_eq!(track.state(), TrackState::Playing);
}

#[test]
fn test_two_second_fade_in_is_linear_in_one_hundred_steps() {
    let (track, loader) = loaded_track();
    let pipeline = loader.last();
    track.set_fade_in(2.0);
    let before = pipeline.trace().len();

    let started = Instant::now();
    track.play();
    let deadline = started + Duration::from_secs(5);
    while track.is_fading() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    let elapsed = started.elapsed();
    assert!(!track.is_fading());
    assert!(elapsed >= Duration::from_millis(1900), "fade took {:?}", elapsed);

    // One initial set to zero, then steps 0..=100
    let ramp = pipeline.trace()[before..].to_vec();
    assert_eq!(ramp.len(), 102, "ramp {:?}", ramp);
    for (i, &volume) in ramp[1..].iter().enumerate() {
        assert_abs_diff_eq!(volume, 0.5 * i as f32 / 100.0, epsilon = 1e-5);
    }
}

#[test]
fn test_fade_out_pauses_when_ramp_completes() {
    let (track, loader) = loaded_track();
    let pipeline = loader.last();
    track.play();
    track.set_fade_out(0.2);
    let before = pipeline.trace().len();

    track.pause();
    assert_eq!(track.state(), TrackState::Playing, "still playing while fading out");
    assert!(pipeline.is_playing());

    assert!(wait_for(|| track.state() == TrackState::Paused));
    assert!(!pipeline.is_playing());
    assert_eq!(pipeline.current_volume(), 0.0);

    let ramp = pipeline.trace()[before..].to_vec();
    assert_eq!(ramp[0], 0.5);
    assert!(is_non_increasing(&ramp), "ramp {:?}", ramp);

    // Settings are untouched by the fade
    assert_eq!(track.volume(), 0.5);
    track.play();
    assert_eq!(pipeline.current_volume(), 0.5);
}

#[test]
fn test_play_supersedes_pending_fade_out() {
    let (track, loader) = loaded_track();
    let pipeline = loader.last();
    track.play();
    track.set_fade_out(0.3);

    track.pause();
    thread::sleep(Duration::from_millis(100));
    track.play();

    assert_eq!(track.state(), TrackState::Playing);
    assert_eq!(pipeline.current_volume(), 0.5);

    // The cancelled fade-out must never complete its pause
    thread::sleep(Duration::from_millis(400));
    assert_eq!(track.state(), TrackState::Playing);
    assert!(pipeline.is_playing());
    assert_eq!(pipeline.current_volume(), 0.5);
}

#[test]
fn test_fade_in_after_interrupted_fade_out_starts_from_current_volume() {
    let (track, loader) = loaded_track();
    let pipeline = loader.last();
    track.play();
    track.set_fade_out(1.0);
    track.set_fade_in(0.2);

    track.pause();
    assert!(wait_for(|| pipeline.current_volume() < 0.45));
    let before = pipeline.trace().len();
    track.play();
    assert!(wait_for(|| !track.is_fading()));

    let ramp = pipeline.trace()[before..].to_vec();
    assert!(ramp[0] > 0.0, "resumed from the faded level, not silence");
    assert!(is_non_decreasing(&ramp), "ramp {:?}", ramp);
    assert_eq!(*ramp.last().unwrap(), 0.5);
}

#[test]
fn test_volume_change_during_fade_in_moves_the_target() {
    let (track, loader) = loaded_track();
    let pipeline = loader.last();
    track.set_fade_in(0.5);
    track.set_volume(0.5);

    track.play();
    thread::sleep(Duration::from_millis(100));
    track.set_volume(0.2);
    let before = pipeline.trace().len();
    assert!(wait_for(|| !track.is_fading()));

    assert_eq!(track.volume(), 0.2);
    assert_abs_diff_eq!(pipeline.current_volume(), 0.2, epsilon = 1e-6);
    let ramp = pipeline.trace()[before..].to_vec();
    assert!(ramp.iter().all(|&v| v <= 0.2 + 1e-6), "ramp {:?}", ramp);
    assert!(is_non_decreasing(&ramp), "ramp {:?}", ramp);
}

#[test]
fn test_volume_change_during_fade_out_scales_the_ramp() {
    let (track, loader) = loaded_track();
    let pipeline = loader.last();
    track.play();
    track.set_fade_out(0.5);

    track.pause();
    thread::sleep(Duration::from_millis(100));
    track.set_volume(0.1);
    let before = pipeline.trace().len();
    assert!(wait_for(|| track.state() == TrackState::Paused));

    let ramp = pipeline.trace()[before..].to_vec();
    assert!(ramp.iter().all(|&v| v <= 0.1 + 1e-6), "ramp {:?}", ramp);
    assert!(is_non_increasing(&ramp), "ramp {:?}", ramp);
    assert_eq!(pipeline.current_volume(), 0.0);
    assert!(!pipeline.is_playing());
}

#[test]
fn test_stop_mid_fade_cancels_and_rewinds() {
    let (track, loader) = loaded_track();
    let pipeline = loader.last();
    track.set_fade_in(1.0);

    track.play();
    thread::sleep(Duration::from_millis(100));
    track.stop().unwrap();

    assert_eq!(track.state(), TrackState::Stopped);
    assert_eq!(pipeline.rewinds(), 1);
    assert!(!pipeline.is_playing());
    assert_eq!(pipeline.current_volume(), 0.5, "volume restored on stop");

    let settled = pipeline.trace().len();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(pipeline.trace().len(), settled, "no fade steps after stop");
    assert!(!track.is_fading());
    assert!(track.is_loaded());
}

#[test]
fn test_volume_and_looping_apply_to_live_pipeline() {
    let (track, loader) = loaded_track();
    let pipeline = loader.last();
    track.play();

    track.set_volume(0.8);
    assert_eq!(pipeline.current_volume(), 0.8);
    track.set_volume(7.0);
    assert_eq!(track.volume(), 1.0);
    assert_eq!(pipeline.current_volume(), 1.0);

    track.set_looping(false);
    assert!(!pipeline.state.lock().unwrap().looping);
    assert!(!track.is_looping());
}

#[test]
fn test_fade_times_are_clamped() {
    let (track, _) = track();
    track.set_fade_in(30.0);
    track.set_fade_out(-1.0);
    assert_eq!(track.fade_in(), 10.0);
    assert_eq!(track.fade_out(), 0.0);
}

#[test]
fn test_finished_track_reports_stopped_and_replays_from_start() {
    let (track, loader) = loaded_track();
    let pipeline = loader.last();
    track.set_looping(false);
    track.play();

    pipeline.finish();
    assert_eq!(track.state(), TrackState::Stopped);
    assert!(!track.is_playing());

    track.play();
    assert_eq!(pipeline.rewinds(), 1);
    assert!(pipeline.is_playing());
    assert_eq!(track.state(), TrackState::Playing);
}

#[test]
fn test_release_drops_pipeline() {
    let (track, loader) = loaded_track();
    track.set_fade_in(1.0);
    track.play();

    track.release();
    track.release();

    assert_eq!(track.state(), TrackState::Unloaded);
    assert!(!loader.last().is_playing());
    assert!(!track.is_fading());
}
