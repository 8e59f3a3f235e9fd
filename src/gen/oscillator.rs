use crate::engine::channel::ChannelSnapshot;
use crate::engine::lfo::Lfo;
use std::f64::consts::TAU;

/// Phase-continuous sine voice with LFO amplitude modulation
///
/// Phase is carried across buffers and is never reset by parameter changes.
/// While a channel is silent its phases stay where they were; re-enabling
/// resumes from there.
#[derive(Debug, Clone)]
pub struct Oscillator {
    sample_rate: f64,
    phase: f64,
    lfo: Lfo,
}

impl Oscillator {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate: sample_rate as f64,
            phase: 0.0,
            lfo: Lfo::new(sample_rate),
        }
    }

    /// Generate one sample and advance both phases
    #[inline]
    pub fn tick(&mut self, params: &ChannelSnapshot) -> f64 {
        let lfo_mod = self.lfo.tick(params.lfo_rate, params.lfo_depth);
        let sample = (TAU * self.phase).sin() * params.volume as f64 * lfo_mod;

        self.phase += params.frequency as f64 / self.sample_rate;
        if self.phase >= 1.0 {
            self.phase = self.phase.fract();
        }

        sample
    }

    /// Fill `out` with samples for one buffer
    ///
    /// Returns false and writes silence without touching phase state when the
    /// channel is disabled or at zero volume.
    pub fn render(&mut self, params: &ChannelSnapshot, out: &mut [f64]) -> bool {
        if !params.is_audible() {
            out.fill(0.0);
            return false;
        }

        for sample in out.iter_mut() {
            *sample = self.tick(params);
        }
        true
    }

    /// Current oscillator phase (0.0 to 1.0)
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Current LFO phase (0.0 to 1.0)
    pub fn lfo_phase(&self) -> f64 {
        self.lfo.phase()
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate as f32
    }
}
