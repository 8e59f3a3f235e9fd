// Renders the engine to a WAV file through the real-time paced bounce output

#![cfg(feature = "bounce")]

mod common;

use bowlsynth::platform::BounceOutput;
use bowlsynth::ToneEngine;
use common::{test_config, FakeLoader, TEST_BUFFER};
use std::f64::consts::TAU;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_bounce_writes_continuous_mono_tone() {
    let path = std::env::temp_dir().join(format!("bowlsynth-bounce-{}.wav", std::process::id()));
    let engine = ToneEngine::new(
        test_config(),
        Arc::new(BounceOutput::new(&path)),
        Arc::new(FakeLoader::default()),
    )
    .unwrap();
    for ch in 1..4 {
        engine.set_channel_enabled(ch, false).unwrap();
    }
    engine.set_channel_volume(0, 1.0).unwrap();
    engine.set_master_volume(0.5);

    engine.start().unwrap();
    thread::sleep(Duration::from_millis(100));
    engine.stop().unwrap();

    let mut reader = hound::WavReader::open(&path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, 44100);
    assert_eq!(spec.bits_per_sample, 16);

    let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert!(samples.len() >= TEST_BUFFER * 4, "only {} samples", samples.len());
    assert_eq!(samples.len() % TEST_BUFFER, 0);

    for (n, &sample) in samples.iter().enumerate() {
        let expected = ((TAU * 432.0 * n as f64 / 44100.0).sin() * 0.5 * 32767.0).round() as i32;
        assert!((sample as i32 - expected).abs() <= 1, "sample {}", n);
    }

    let _ = std::fs::remove_file(&path);
}
