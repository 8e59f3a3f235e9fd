/// Platform abstraction for audio output
/// This module provides the device boundary for the tone engine: one mono
/// 16-bit PCM sink at a fixed sample rate, opened by the playback thread.

/// Stream format requested from an output device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    /// Samples per write
    pub buffer_size: usize,
}

impl PcmFormat {
    pub fn new(sample_rate: u32, buffer_size: usize) -> Self {
        Self {
            sample_rate,
            buffer_size,
        }
    }

    /// Wall-clock length of one buffer
    pub fn buffer_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.buffer_size as f64 / self.sample_rate as f64)
    }
}

/// Trait for platform-specific audio output implementations
///
/// An `AudioOutput` is a factory. `open` is called on the playback thread
/// itself, because native streams are usually tied to the thread that built
/// them.
pub trait AudioOutput: Send + Sync {
    /// Open the device for mono 16-bit output in the given format
    fn open(&self, format: PcmFormat) -> Result<Box<dyn OutputSink>, anyhow::Error>;
}

/// An opened output device
pub trait OutputSink {
    /// Queue one buffer. Blocks until the device has room; this is what paces
    /// the playback loop.
    fn write(&mut self, samples: &[i16]) -> Result<(), anyhow::Error>;

    /// Pause the device stream
    fn pause(&mut self) -> Result<(), anyhow::Error>;

    /// Discard anything queued but not yet played
    fn flush(&mut self);
}

// Platform-specific implementations
#[cfg(feature = "native")]
pub mod cpal_output;

#[cfg(feature = "bounce")]
pub mod bounce;

// Re-export platform-specific types
#[cfg(feature = "native")]
pub use self::cpal_output::CpalOutput;

#[cfg(feature = "bounce")]
pub use self::bounce::BounceOutput;
