use std::f64::consts::TAU;

/// Low Frequency Oscillator for amplitude modulation
///
/// The rate is supplied per tick so the owning channel can change it between
/// buffers without resetting the phase.
#[derive(Debug, Clone)]
pub struct Lfo {
    phase: f64,
    sample_rate: f64,
}

impl Lfo {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            phase: 0.0,
            sample_rate: sample_rate as f64,
        }
    }

    /// Return the amplitude multiplier for the current sample and advance the phase
    /// - rate: LFO frequency in Hz
    /// - depth: modulation depth (0.0 to 1.0)
    ///
    /// With rate or depth at zero the phase is left alone and the multiplier is 1.0.
    #[inline]
    pub fn tick(&mut self, rate: f32, depth: f32) -> f64 {
        if rate <= 0.0 || depth <= 0.0 {
            return 1.0;
        }

        let multiplier = amplitude_multiplier(depth, self.phase);

        self.phase += rate as f64 / self.sample_rate;
        if self.phase >= 1.0 {
            self.phase = self.phase.fract();
        }

        multiplier
    }

    /// Current phase (0.0 to 1.0)
    pub fn phase(&self) -> f64 {
        self.phase
    }
}

/// Map an LFO position to a gain in `[1 - depth, 1]`
///
/// The sine at `phase` is shifted into 0..1 and scaled by `depth`, so a full
/// depth swings between silence and unity.
#[inline]
pub fn amplitude_multiplier(depth: f32, phase: f64) -> f64 {
    let depth = depth as f64;
    let value = (TAU * phase).sin();
    1.0 - depth + depth * (value + 1.0) / 2.0
}
