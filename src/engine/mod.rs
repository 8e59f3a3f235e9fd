pub mod channel;
pub mod lfo;
pub mod mixer;
pub mod playback;

pub use channel::{ChannelParams, ChannelSnapshot};
pub use lfo::Lfo;
pub use mixer::Mixer;
pub use playback::{PlaybackLoop, PlaybackState, PlaybackStatus};

use crate::background::{BackgroundTrack, TrackLoader, TrackSource, TrackState};
use crate::config::{EngineConfig, CHANNEL_COUNT, DEFAULT_FREQUENCIES, DEFAULT_MASTER_VOLUME};
use crate::error::{EngineError, Result};
use crate::platform::AudioOutput;
use crate::visualization::{ObserverId, WaveformPublisher, WaveformSnapshot};
use channel::{clamp_param, AtomicF32};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Parameters shared with the audio thread
#[derive(Debug)]
pub struct EngineParams {
    channels: [ChannelParams; CHANNEL_COUNT],
    master_volume: AtomicF32,
}

impl EngineParams {
    pub fn new() -> Self {
        Self {
            channels: DEFAULT_FREQUENCIES.map(ChannelParams::new),
            master_volume: AtomicF32::new(DEFAULT_MASTER_VOLUME),
        }
    }

    pub fn channel(&self, index: usize) -> Result<&ChannelParams> {
        self.channels
            .get(index)
            .ok_or(EngineError::InvalidChannel(index))
    }

    /// Master gain, clamped to 0-1
    pub fn set_master_volume(&self, volume: f32) {
        self.master_volume.store(clamp_param(volume, 0.0, 1.0));
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume.load()
    }

    /// Read every channel once for the coming buffer
    pub fn channel_snapshots(&self) -> [ChannelSnapshot; CHANNEL_COUNT] {
        std::array::from_fn(|i| self.channels[i].snapshot())
    }
}

impl Default for EngineParams {
    fn default() -> Self {
        Self::new()
    }
}

/// The tone engine: four sine channels, a background track and waveform output
///
/// Every method takes `&self` and may be called from any thread; wrap the
/// engine in an `Arc` to share it.
pub struct ToneEngine {
    config: EngineConfig,
    params: Arc<EngineParams>,
    publisher: Arc<WaveformPublisher>,
    playback: Mutex<PlaybackLoop>,
    // Readable while `playback` is held by a slow start or stop
    status: PlaybackStatus,
    background: BackgroundTrack,
    released: AtomicBool,
}

impl ToneEngine {
    pub fn new(
        config: EngineConfig,
        output: Arc<dyn AudioOutput>,
        loader: Arc<dyn TrackLoader>,
    ) -> Result<Self> {
        let config = config.normalized();
        let publisher = WaveformPublisher::new(
            CHANNEL_COUNT,
            config.buffer_size,
            config.snapshot_queue_depth,
        )
        .map_err(|err| EngineError::Device(err.into()))?;

        let playback = PlaybackLoop::new(config.clone(), output);

        Ok(Self {
            params: Arc::new(EngineParams::new()),
            publisher: Arc::new(publisher),
            status: playback.status(),
            playback: Mutex::new(playback),
            background: BackgroundTrack::new(loader, config.fade_steps_per_second),
            released: AtomicBool::new(false),
            config,
        })
    }

    /// Engine on the default CPAL device with a rodio background pipeline
    #[cfg(feature = "native")]
    pub fn native(config: EngineConfig) -> Result<Self> {
        Self::new(
            config,
            Arc::new(crate::platform::CpalOutput::new()),
            Arc::new(crate::background::RodioLoader::new()),
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn playback(&self) -> MutexGuard<'_, PlaybackLoop> {
        self.playback.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ---------------------------------------------------------------------
    // Playback lifecycle
    // ---------------------------------------------------------------------

    /// Start the playback thread. No-op if already playing.
    pub fn start(&self) -> Result<()> {
        if self.released.load(Ordering::Acquire) {
            return Err(EngineError::Released);
        }
        self.playback()
            .start(self.params.clone(), self.publisher.clone())
    }

    /// Stop the playback thread. Safe to call when already stopped.
    ///
    /// Returns `StopTimeout` if the thread had to be abandoned; the engine is
    /// stopped either way.
    pub fn stop(&self) -> Result<()> {
        self.playback().stop()
    }

    pub fn is_playing(&self) -> bool {
        self.status.is_running()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.status.state()
    }

    /// The device failure that ended playback, if any. Cleared by reading.
    pub fn take_playback_error(&self) -> Option<EngineError> {
        self.playback().take_failure()
    }

    /// Stop playback and release both output pipelines. Idempotent.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(err) = self.stop() {
            log::warn!("Release: {}", err);
        }
        self.background.release();
        log::info!("Engine released");
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    // ---------------------------------------------------------------------
    // Channels
    // ---------------------------------------------------------------------

    /// Direct access to a channel's parameters
    pub fn channel(&self, index: usize) -> Result<&ChannelParams> {
        self.params.channel(index)
    }

    pub fn set_channel_frequency(&self, index: usize, frequency: f32) -> Result<()> {
        self.channel(index)?.set_frequency(frequency);
        Ok(())
    }

    pub fn channel_frequency(&self, index: usize) -> Result<f32> {
        Ok(self.channel(index)?.frequency())
    }

    pub fn set_channel_volume(&self, index: usize, volume: f32) -> Result<()> {
        self.channel(index)?.set_volume(volume);
        Ok(())
    }

    pub fn channel_volume(&self, index: usize) -> Result<f32> {
        Ok(self.channel(index)?.volume())
    }

    pub fn set_channel_enabled(&self, index: usize, enabled: bool) -> Result<()> {
        self.channel(index)?.set_enabled(enabled);
        Ok(())
    }

    pub fn is_channel_enabled(&self, index: usize) -> Result<bool> {
        Ok(self.channel(index)?.is_enabled())
    }

    pub fn set_channel_lfo_rate(&self, index: usize, rate: f32) -> Result<()> {
        self.channel(index)?.set_lfo_rate(rate);
        Ok(())
    }

    pub fn channel_lfo_rate(&self, index: usize) -> Result<f32> {
        Ok(self.channel(index)?.lfo_rate())
    }

    pub fn set_channel_lfo_depth(&self, index: usize, depth: f32) -> Result<()> {
        self.channel(index)?.set_lfo_depth(depth);
        Ok(())
    }

    pub fn channel_lfo_depth(&self, index: usize) -> Result<f32> {
        Ok(self.channel(index)?.lfo_depth())
    }

    pub fn set_master_volume(&self, volume: f32) {
        self.params.set_master_volume(volume);
    }

    pub fn master_volume(&self) -> f32 {
        self.params.master_volume()
    }

    /// Oscillator phase of a channel; only available while stopped
    pub fn channel_phase(&self, index: usize) -> Option<f64> {
        self.playback().oscillator_phase(index)
    }

    // ---------------------------------------------------------------------
    // Background track
    // ---------------------------------------------------------------------

    pub fn background(&self) -> &BackgroundTrack {
        &self.background
    }

    /// Load a background source. On failure the track is left unloaded.
    pub fn load_bgm(&self, source: &TrackSource) -> Result<()> {
        if self.released.load(Ordering::Acquire) {
            return Err(EngineError::Released);
        }
        self.background
            .load(source)
            .map_err(EngineError::BackgroundSource)
    }

    pub fn play_bgm(&self) {
        self.background.play();
    }

    pub fn pause_bgm(&self) {
        self.background.pause();
    }

    pub fn stop_bgm(&self) -> Result<()> {
        self.background
            .stop()
            .map_err(EngineError::BackgroundSource)
    }

    pub fn set_bgm_volume(&self, volume: f32) {
        self.background.set_volume(volume);
    }

    pub fn bgm_volume(&self) -> f32 {
        self.background.volume()
    }

    pub fn set_bgm_looping(&self, looping: bool) {
        self.background.set_looping(looping);
    }

    pub fn is_bgm_looping(&self) -> bool {
        self.background.is_looping()
    }

    pub fn set_bgm_fade_in(&self, seconds: f32) {
        self.background.set_fade_in(seconds);
    }

    pub fn bgm_fade_in(&self) -> f32 {
        self.background.fade_in()
    }

    pub fn set_bgm_fade_out(&self, seconds: f32) {
        self.background.set_fade_out(seconds);
    }

    pub fn bgm_fade_out(&self) -> f32 {
        self.background.fade_out()
    }

    pub fn is_bgm_playing(&self) -> bool {
        self.background.is_playing()
    }

    pub fn is_bgm_loaded(&self) -> bool {
        self.background.is_loaded()
    }

    pub fn bgm_state(&self) -> TrackState {
        self.background.state()
    }

    // ---------------------------------------------------------------------
    // Waveforms
    // ---------------------------------------------------------------------

    /// Register a callback for each buffer's waveforms
    ///
    /// Callbacks run on a dispatch thread, never on the audio thread.
    pub fn add_waveform_observer<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(Arc<WaveformSnapshot>) + Send + Sync + 'static,
    {
        self.publisher.subscribe(observer)
    }

    pub fn remove_waveform_observer(&self, id: ObserverId) -> bool {
        self.publisher.unsubscribe(id)
    }

    /// The most recent waveforms (silent before the first buffer)
    pub fn latest_waveform(&self) -> Arc<WaveformSnapshot> {
        self.publisher.latest()
    }
}

impl Drop for ToneEngine {
    fn drop(&mut self) {
        self.release();
    }
}
