//! Four-channel sine tone engine with a background track
//!
//! [`ToneEngine`] drives four phase-continuous sine oscillators, each with
//! optional LFO amplitude modulation, mixes them to 16-bit mono on a
//! dedicated playback thread and publishes per-buffer waveforms for display.
//! A separately decoded background track plays through its own pipeline
//! with timed fades.

pub mod background;
pub mod config;
pub mod engine;
pub mod error;
#[cfg(feature = "native")]
pub mod ffi;
pub mod gen;
pub mod platform;
pub mod utils;
pub mod visualization;

pub use background::{BackgroundTrack, TrackLoader, TrackPipeline, TrackSource, TrackState};
pub use config::{EngineConfig, CHANNEL_COUNT};
pub use engine::{ChannelParams, ChannelSnapshot, PlaybackState, ToneEngine};
pub use error::{EngineError, Result};
pub use platform::{AudioOutput, OutputSink, PcmFormat};
pub use visualization::{ObserverId, WaveformSnapshot};
