// Shared fakes for integration tests: no audio hardware is touched.
#![allow(dead_code)]

use anyhow::anyhow;
use bowlsynth::background::{TrackLoader, TrackPipeline, TrackSource};
use bowlsynth::config::EngineConfig;
use bowlsynth::platform::{AudioOutput, OutputSink, PcmFormat};
use bowlsynth::ToneEngine;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub const TEST_BUFFER: usize = 256;

/// Small buffers and a short stop timeout so tests stay fast
pub fn test_config() -> EngineConfig {
    EngineConfig::default()
        .with_buffer_size(TEST_BUFFER)
        .with_stop_timeout(Duration::from_millis(300))
}

/// Poll `condition` for up to two seconds
pub fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

// =============================================================================
// Outputs
// =============================================================================

#[derive(Default)]
pub struct OutputLog {
    pub samples: Mutex<Vec<i16>>,
    pub writes: AtomicUsize,
    pub opens: AtomicUsize,
    pub pauses: AtomicUsize,
    pub flushes: AtomicUsize,
    /// Writes per opened sink, in open order
    pub sink_writes: Mutex<Vec<Arc<AtomicUsize>>>,
}

impl OutputLog {
    pub fn samples(&self) -> Vec<i16> {
        self.samples.lock().unwrap().clone()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Writes that reached the `index`-th opened sink
    pub fn sink_writes(&self, index: usize) -> usize {
        self.sink_writes
            .lock()
            .unwrap()
            .get(index)
            .map(|count| count.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

/// Records every written sample; each write sleeps briefly to stand in for device pacing
pub struct RecordingOutput {
    pub log: Arc<OutputLog>,
    pace: Duration,
    // Write failures start after this many successful writes
    fail_after: Option<usize>,
    // Every write after a sink's first blocks this long
    stall: Option<Duration>,
    // Only the first opened sink stalls
    stall_first_only: bool,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self {
            log: Arc::new(OutputLog::default()),
            pace: Duration::from_millis(1),
            fail_after: None,
            stall: None,
            stall_first_only: false,
        }
    }

    pub fn failing_after(writes: usize) -> Self {
        Self {
            fail_after: Some(writes),
            ..Self::new()
        }
    }

    pub fn stalling(stall: Duration) -> Self {
        Self {
            stall: Some(stall),
            ..Self::new()
        }
    }
}

impl RecordingOutput {
    pub fn stalling_first_sink(stall: Duration) -> Self {
        Self {
            stall: Some(stall),
            stall_first_only: true,
            ..Self::new()
        }
    }
}

impl AudioOutput for RecordingOutput {
    fn open(&self, format: PcmFormat) -> anyhow::Result<Box<dyn OutputSink>> {
        assert_eq!(format.buffer_size, TEST_BUFFER);
        let opened = self.log.opens.fetch_add(1, Ordering::SeqCst);
        let own_writes = Arc::new(AtomicUsize::new(0));
        self.log.sink_writes.lock().unwrap().push(own_writes.clone());
        let stall = if self.stall_first_only && opened > 0 {
            None
        } else {
            self.stall
        };
        Ok(Box::new(RecordingSink {
            log: self.log.clone(),
            own_writes,
            pace: self.pace,
            fail_after: self.fail_after,
            stall,
        }))
    }
}

struct RecordingSink {
    log: Arc<OutputLog>,
    own_writes: Arc<AtomicUsize>,
    pace: Duration,
    fail_after: Option<usize>,
    stall: Option<Duration>,
}

impl OutputSink for RecordingSink {
    fn write(&mut self, samples: &[i16]) -> anyhow::Result<()> {
        let written = self.log.writes.load(Ordering::SeqCst);
        if let Some(limit) = self.fail_after {
            if written >= limit {
                return Err(anyhow!("device unplugged"));
            }
        }
        if let (Some(stall), true) = (self.stall, self.own_writes.load(Ordering::SeqCst) > 0) {
            thread::sleep(stall);
        }
        self.log.samples.lock().unwrap().extend_from_slice(samples);
        self.log.writes.fetch_add(1, Ordering::SeqCst);
        self.own_writes.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.pace);
        Ok(())
    }

    fn pause(&mut self) -> anyhow::Result<()> {
        self.log.pauses.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn flush(&mut self) {
        self.log.flushes.fetch_add(1, Ordering::SeqCst);
    }
}

/// A device that cannot be opened
pub struct UnavailableOutput;

impl AudioOutput for UnavailableOutput {
    fn open(&self, _format: PcmFormat) -> anyhow::Result<Box<dyn OutputSink>> {
        Err(anyhow!("no output device available"))
    }
}

// =============================================================================
// Background pipelines
// =============================================================================

#[derive(Debug, Default)]
pub struct PipelineState {
    pub playing: bool,
    pub volume: f32,
    pub looping: bool,
    pub finished: bool,
    pub rewinds: usize,
    /// Every volume ever applied, in order
    pub volume_trace: Vec<f32>,
}

#[derive(Default)]
pub struct FakePipeline {
    pub state: Mutex<PipelineState>,
}

impl FakePipeline {
    pub fn is_playing(&self) -> bool {
        self.state.lock().unwrap().playing
    }

    pub fn current_volume(&self) -> f32 {
        self.state.lock().unwrap().volume
    }

    pub fn trace(&self) -> Vec<f32> {
        self.state.lock().unwrap().volume_trace.clone()
    }

    pub fn rewinds(&self) -> usize {
        self.state.lock().unwrap().rewinds
    }

    /// Simulate a non-looping source reaching its end
    pub fn finish(&self) {
        let mut state = self.state.lock().unwrap();
        state.finished = true;
        state.playing = false;
    }
}

impl TrackPipeline for FakePipeline {
    fn play(&self) {
        self.state.lock().unwrap().playing = true;
    }

    fn pause(&self) {
        self.state.lock().unwrap().playing = false;
    }

    fn rewind(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.playing = false;
        state.finished = false;
        state.rewinds += 1;
        Ok(())
    }

    fn set_volume(&self, volume: f32) {
        let mut state = self.state.lock().unwrap();
        state.volume = volume;
        state.volume_trace.push(volume);
    }

    fn volume(&self) -> f32 {
        self.state.lock().unwrap().volume
    }

    fn set_looping(&self, looping: bool) {
        self.state.lock().unwrap().looping = looping;
    }

    fn is_finished(&self) -> bool {
        self.state.lock().unwrap().finished
    }
}

/// Hands out [`FakePipeline`]s and keeps every one it created
#[derive(Default)]
pub struct FakeLoader {
    pub fail: AtomicBool,
    pub loaded: Mutex<Vec<Arc<FakePipeline>>>,
}

impl FakeLoader {
    pub fn last(&self) -> Arc<FakePipeline> {
        self.loaded
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("nothing loaded")
    }

    pub fn load_count(&self) -> usize {
        self.loaded.lock().unwrap().len()
    }
}

impl TrackLoader for FakeLoader {
    fn load(
        &self,
        source: &TrackSource,
        looping: bool,
        volume: f32,
    ) -> anyhow::Result<Arc<dyn TrackPipeline>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("cannot decode {}", source.name()));
        }
        let pipeline = Arc::new(FakePipeline::default());
        {
            let mut state = pipeline.state.lock().unwrap();
            state.looping = looping;
            state.volume = volume;
        }
        self.loaded.lock().unwrap().push(pipeline.clone());
        Ok(pipeline)
    }
}

pub fn memory_source() -> TrackSource {
    TrackSource::memory("rain.ogg", vec![0u8; 16])
}

/// Engine on a recording output and a fake background loader
pub fn fake_engine() -> (ToneEngine, Arc<OutputLog>, Arc<FakeLoader>) {
    engine_with(RecordingOutput::new())
}

pub fn engine_with(output: RecordingOutput) -> (ToneEngine, Arc<OutputLog>, Arc<FakeLoader>) {
    let log = output.log.clone();
    let loader = Arc::new(FakeLoader::default());
    let engine = ToneEngine::new(test_config(), Arc::new(output), loader.clone())
        .expect("engine construction");
    (engine, log, loader)
}
