//! Engine configuration and fixed parameter ranges

use std::time::Duration;

/// Number of oscillator channels
pub const CHANNEL_COUNT: usize = 4;

/// Reference sample rate in Hz
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Samples per buffer period
pub const DEFAULT_BUFFER_SIZE: usize = 2048;

pub const MIN_FREQUENCY: f32 = 20.0;
pub const MAX_FREQUENCY: f32 = 20000.0;

/// Upper bound for LFO rate. Audible-rate amplitude modulation is excluded
/// as a product limit.
pub const MAX_LFO_RATE: f32 = 20.0;

/// Upper bound for background fade durations in seconds
pub const MAX_FADE_SECONDS: f32 = 10.0;

/// Default channel frequencies (root, solar plexus, heart, throat)
pub const DEFAULT_FREQUENCIES: [f32; CHANNEL_COUNT] = [432.0, 528.0, 639.0, 741.0];

pub const DEFAULT_CHANNEL_VOLUME: f32 = 0.5;
pub const DEFAULT_MASTER_VOLUME: f32 = 0.7;
pub const DEFAULT_BGM_VOLUME: f32 = 0.5;

/// Runtime configuration for a [`ToneEngine`](crate::engine::ToneEngine)
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Samples produced per buffer period
    pub buffer_size: usize,
    /// Upper bound on how long `stop()` waits for the audio thread
    pub stop_timeout: Duration,
    /// Granularity of background fades
    pub fade_steps_per_second: u32,
    /// Snapshots that may queue for observers before frames are dropped
    pub snapshot_queue_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            stop_timeout: Duration::from_millis(500),
            fade_steps_per_second: 50,
            snapshot_queue_depth: 2,
        }
    }
}

impl EngineConfig {
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate.max(1);
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn with_fade_steps_per_second(mut self, steps: u32) -> Self {
        self.fade_steps_per_second = steps.max(1);
        self
    }

    pub fn with_snapshot_queue_depth(mut self, depth: usize) -> Self {
        self.snapshot_queue_depth = depth.max(1);
        self
    }

    /// Apply the builders' lower bounds to values set directly on the fields
    pub fn normalized(self) -> Self {
        let Self {
            sample_rate,
            buffer_size,
            fade_steps_per_second,
            snapshot_queue_depth,
            ..
        } = self;
        self.with_sample_rate(sample_rate)
            .with_buffer_size(buffer_size)
            .with_fade_steps_per_second(fade_steps_per_second)
            .with_snapshot_queue_depth(snapshot_queue_depth)
    }

    /// Wall-clock length of one buffer
    pub fn buffer_period(&self) -> Duration {
        Duration::from_secs_f64(self.buffer_size as f64 / self.sample_rate as f64)
    }
}
