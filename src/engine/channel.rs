//! Per-channel oscillator parameters shared between control and audio threads
//!
//! Every field is an independent atomic. Writers clamp and store one value at
//! a time; the audio thread takes a [`ChannelSnapshot`] once per buffer. There
//! is no cross-field atomicity: a buffer may see a new frequency together with
//! an old volume, which is inaudible at one buffer of staleness.

use crate::config::{
    DEFAULT_CHANNEL_VOLUME, MAX_FREQUENCY, MAX_LFO_RATE, MIN_FREQUENCY,
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Lock-free f32 cell stored as its bit pattern
#[derive(Debug)]
pub(crate) struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub(crate) fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub(crate) fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub(crate) fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Clamp that maps NaN to the lower bound instead of propagating it
pub(crate) fn clamp_param(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}

/// Parameters of one oscillator channel
///
/// Setters clamp silently; out-of-range requests are never rejected.
#[derive(Debug)]
pub struct ChannelParams {
    frequency: AtomicF32,
    volume: AtomicF32,
    enabled: AtomicBool,
    lfo_rate: AtomicF32,
    lfo_depth: AtomicF32,
}

impl ChannelParams {
    pub fn new(frequency: f32) -> Self {
        Self {
            frequency: AtomicF32::new(clamp_param(frequency, MIN_FREQUENCY, MAX_FREQUENCY)),
            volume: AtomicF32::new(DEFAULT_CHANNEL_VOLUME),
            enabled: AtomicBool::new(true),
            lfo_rate: AtomicF32::new(0.0),
            lfo_depth: AtomicF32::new(0.0),
        }
    }

    /// Set frequency in Hz, clamped to 20-20000
    pub fn set_frequency(&self, frequency: f32) {
        self.frequency
            .store(clamp_param(frequency, MIN_FREQUENCY, MAX_FREQUENCY));
    }

    pub fn frequency(&self) -> f32 {
        self.frequency.load()
    }

    /// Set linear gain, clamped to 0-1
    pub fn set_volume(&self, volume: f32) {
        self.volume.store(clamp_param(volume, 0.0, 1.0));
    }

    pub fn volume(&self) -> f32 {
        self.volume.load()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Set LFO rate in Hz, clamped to 0-20. Zero disables modulation.
    pub fn set_lfo_rate(&self, rate: f32) {
        self.lfo_rate.store(clamp_param(rate, 0.0, MAX_LFO_RATE));
    }

    pub fn lfo_rate(&self) -> f32 {
        self.lfo_rate.load()
    }

    /// Set LFO depth, clamped to 0-1
    pub fn set_lfo_depth(&self, depth: f32) {
        self.lfo_depth.store(clamp_param(depth, 0.0, 1.0));
    }

    pub fn lfo_depth(&self) -> f32 {
        self.lfo_depth.load()
    }

    /// Read every field once for the coming buffer
    pub fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            frequency: self.frequency(),
            volume: self.volume(),
            enabled: self.is_enabled(),
            lfo_rate: self.lfo_rate(),
            lfo_depth: self.lfo_depth(),
        }
    }
}

/// Plain copy of a channel's parameters, valid for one buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelSnapshot {
    pub frequency: f32,
    pub volume: f32,
    pub enabled: bool,
    pub lfo_rate: f32,
    pub lfo_depth: f32,
}

impl ChannelSnapshot {
    /// Disabled or zero-volume channels produce silence
    pub fn is_audible(&self) -> bool {
        self.enabled && self.volume > 0.0
    }

    pub fn has_lfo(&self) -> bool {
        self.lfo_rate > 0.0 && self.lfo_depth > 0.0
    }
}

impl Default for ChannelSnapshot {
    fn default() -> Self {
        Self {
            frequency: 440.0,
            volume: 1.0,
            enabled: true,
            lfo_rate: 0.0,
            lfo_depth: 0.0,
        }
    }
}
