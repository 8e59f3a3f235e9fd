//! Channel synthesis and master mix for one buffer period

use crate::config::CHANNEL_COUNT;
use crate::engine::channel::ChannelSnapshot;
use crate::gen::oscillator::Oscillator;
use crate::visualization::WaveformSnapshot;

/// Convert a mixed sample to 16-bit PCM, saturating at the representable range
#[inline]
pub fn to_pcm16(sample: f64) -> i16 {
    let scaled = (sample * i16::MAX as f64).round();
    if scaled.is_nan() {
        return 0;
    }
    scaled.clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

/// Owns one oscillator per channel and renders the master mix
///
/// All channels are rendered at the same buffer positions before summing, so
/// sample `n` of the mix is the sum of sample `n` of every channel.
pub struct Mixer {
    oscillators: Vec<Oscillator>,
    channel_buffers: Vec<Vec<f64>>,
    mix: Vec<f64>,
    buffers_rendered: u64,
}

impl Mixer {
    pub fn new(sample_rate: f32, buffer_size: usize) -> Self {
        Self {
            oscillators: (0..CHANNEL_COUNT)
                .map(|_| Oscillator::new(sample_rate))
                .collect(),
            channel_buffers: vec![vec![0.0; buffer_size]; CHANNEL_COUNT],
            mix: vec![0.0; buffer_size],
            buffers_rendered: 0,
        }
    }

    /// Render `pcm.len()` samples
    ///
    /// Fills `pcm` with the clipped 16-bit mix and returns the float waveforms
    /// (per channel, then master after gain) for observers.
    pub fn render(
        &mut self,
        channels: &[ChannelSnapshot; CHANNEL_COUNT],
        master_volume: f32,
        pcm: &mut [i16],
    ) -> WaveformSnapshot {
        let frames = pcm.len();
        self.mix.clear();
        self.mix.resize(frames, 0.0);

        let mut channel_waves = Vec::with_capacity(CHANNEL_COUNT);
        for ((osc, buffer), params) in self
            .oscillators
            .iter_mut()
            .zip(self.channel_buffers.iter_mut())
            .zip(channels.iter())
        {
            buffer.resize(frames, 0.0);
            if osc.render(params, buffer) {
                for (acc, &s) in self.mix.iter_mut().zip(buffer.iter()) {
                    *acc += s;
                }
                channel_waves.push(buffer.iter().map(|&s| s as f32).collect());
            } else {
                channel_waves.push(vec![0.0f32; frames]);
            }
        }

        let gain = master_volume as f64;
        let mut master = Vec::with_capacity(frames);
        for (out, &sum) in pcm.iter_mut().zip(self.mix.iter()) {
            let value = sum * gain;
            *out = to_pcm16(value);
            master.push(value as f32);
        }

        self.buffers_rendered += 1;
        WaveformSnapshot::new(self.buffers_rendered, channel_waves, master)
    }

    /// Continue snapshot numbering after `rendered` earlier buffers
    pub fn with_buffers_rendered(mut self, rendered: u64) -> Self {
        self.buffers_rendered = rendered;
        self
    }

    pub fn oscillator(&self, index: usize) -> Option<&Oscillator> {
        self.oscillators.get(index)
    }

    /// Number of buffers rendered so far
    pub fn buffers_rendered(&self) -> u64 {
        self.buffers_rendered
    }
}
