//! Background track controller
//!
//! A separately decoded audio source played through its own pipeline, never
//! summed into the oscillator mix. Fades run on their own timer thread.
//!
//! States: `Unloaded -> Stopped -> Playing <-> Paused`, with `stop()`
//! returning to `Stopped` (prepared at position zero, still loaded).

pub mod fade;

#[cfg(feature = "native")]
pub mod rodio_track;

#[cfg(feature = "native")]
pub use self::rodio_track::RodioLoader;

use self::fade::{FadePlan, FadeTask};
use crate::config::{DEFAULT_BGM_VOLUME, MAX_FADE_SECONDS};
use crate::engine::channel::clamp_param;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Where the host's background audio comes from
#[derive(Debug, Clone)]
pub enum TrackSource {
    Path(PathBuf),
    Memory { name: String, bytes: Arc<[u8]> },
}

impl TrackSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        TrackSource::Path(path.into())
    }

    pub fn memory(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        TrackSource::Memory {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Display name (file name for paths)
    pub fn name(&self) -> String {
        match self {
            TrackSource::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            TrackSource::Memory { name, .. } => name.clone(),
        }
    }

    /// Whole encoded contents
    pub fn read_bytes(&self) -> std::io::Result<Arc<[u8]>> {
        match self {
            TrackSource::Path(path) => Ok(std::fs::read(path)?.into()),
            TrackSource::Memory { bytes, .. } => Ok(bytes.clone()),
        }
    }
}

/// A prepared decode-and-play pipeline for one source
pub trait TrackPipeline: Send + Sync {
    fn play(&self);
    fn pause(&self);
    /// Stop and prepare again at position zero, paused
    fn rewind(&self) -> Result<(), anyhow::Error>;
    fn set_volume(&self, volume: f32);
    fn volume(&self) -> f32;
    fn set_looping(&self, looping: bool);
    /// True once a non-looping source has played to its end
    fn is_finished(&self) -> bool;
}

/// Builds pipelines; errors mean the source is missing, unreadable or undecodable
pub trait TrackLoader: Send + Sync {
    fn load(
        &self,
        source: &TrackSource,
        looping: bool,
        volume: f32,
    ) -> Result<Arc<dyn TrackPipeline>, anyhow::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Unloaded,
    Stopped,
    Playing,
    Paused,
}

struct Inner {
    state: TrackState,
    pipeline: Option<Arc<dyn TrackPipeline>>,
    source_name: Option<String>,
    volume: f32,
    looping: bool,
    fade_in: f32,
    fade_out: f32,
    // Bumped whenever a running fade stops applying (new fade, stop, load, release)
    generation: u64,
    fade: Option<FadeTask>,
    pause_pending: bool,
}

impl Inner {
    /// Invalidate and drop the running fade, if any
    fn supersede_fade(&mut self) -> u64 {
        self.generation += 1;
        self.fade = None;
        self.pause_pending = false;
        self.generation
    }

    /// Pipeline volume as a fraction of the configured volume
    fn level_of(&self, volume: f32) -> f32 {
        if self.volume > 0.0 {
            (volume / self.volume).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    fn is_fading(&self) -> bool {
        self.fade
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// A track that ran out on its own counts as stopped
    fn settle_finished(&mut self) {
        if self.state != TrackState::Playing || self.pause_pending {
            return;
        }
        if let Some(pipeline) = &self.pipeline {
            if pipeline.is_finished() {
                log::debug!("Background track reached its end");
                self.state = TrackState::Stopped;
            }
        }
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct BackgroundTrack {
    loader: Arc<dyn TrackLoader>,
    inner: Arc<Mutex<Inner>>,
    steps_per_second: u32,
}

impl BackgroundTrack {
    pub fn new(loader: Arc<dyn TrackLoader>, steps_per_second: u32) -> Self {
        Self {
            loader,
            inner: Arc::new(Mutex::new(Inner {
                state: TrackState::Unloaded,
                pipeline: None,
                source_name: None,
                volume: DEFAULT_BGM_VOLUME,
                looping: true,
                fade_in: 0.0,
                fade_out: 0.0,
                generation: 0,
                fade: None,
                pause_pending: false,
            })),
            steps_per_second: steps_per_second.max(1),
        }
    }

    /// Load a new source, replacing any current one
    ///
    /// The previous pipeline is released first. On failure the controller is
    /// left `Unloaded`.
    pub fn load(&self, source: &TrackSource) -> Result<(), anyhow::Error> {
        let (looping, volume) = {
            let mut inner = lock(&self.inner);
            inner.supersede_fade();
            if let Some(old) = inner.pipeline.take() {
                old.pause();
            }
            inner.state = TrackState::Unloaded;
            inner.source_name = None;
            (inner.looping, inner.volume)
        };

        let pipeline = self.loader.load(source, looping, volume)?;

        let mut inner = lock(&self.inner);
        inner.supersede_fade();
        if let Some(old) = inner.pipeline.take() {
            old.pause();
        }
        // Settings may have changed while the source was loading
        pipeline.set_looping(inner.looping);
        pipeline.set_volume(inner.volume);
        inner.pipeline = Some(pipeline);
        inner.source_name = Some(source.name());
        inner.state = TrackState::Stopped;
        log::info!("Background track loaded: {}", source.name());
        Ok(())
    }

    /// Start or resume playback, fading in if a fade-in time is set
    ///
    /// No-op while unloaded or already playing. A pending fade-out pause is
    /// superseded and the track fades back in from its current volume.
    pub fn play(&self) {
        let mut inner = lock(&self.inner);
        let Some(pipeline) = inner.pipeline.clone() else {
            return;
        };

        inner.settle_finished();
        if inner.state == TrackState::Stopped && pipeline.is_finished() {
            if let Err(err) = pipeline.rewind() {
                log::error!("Could not rewind background track: {:#}", err);
                return;
            }
        }

        let from = match inner.state {
            TrackState::Unloaded => return,
            TrackState::Playing if !inner.pause_pending => return,
            TrackState::Playing => pipeline.volume(),
            TrackState::Stopped | TrackState::Paused => 0.0,
        };

        let generation = inner.supersede_fade();
        let target = inner.volume;

        match FadePlan::new(inner.level_of(from), 1.0, inner.fade_in, self.steps_per_second) {
            Some(plan) => {
                pipeline.set_volume(from);
                pipeline.play();
                log::debug!("Fading background in over {:?}", plan.duration());
                // Catch a volume change that landed between the last step and completion
                inner.fade = self.spawn_fade(plan, generation, |inner| {
                    if let Some(pipeline) = &inner.pipeline {
                        if pipeline.volume() != inner.volume {
                            pipeline.set_volume(inner.volume);
                        }
                    }
                });
                if inner.fade.is_none() {
                    pipeline.set_volume(target);
                }
            }
            None => {
                pipeline.set_volume(target);
                pipeline.play();
            }
        }
        inner.state = TrackState::Playing;
    }

    /// Pause playback, fading out first if a fade-out time is set
    ///
    /// With a fade the track stays `Playing` until the ramp reaches zero.
    /// No-op unless playing.
    pub fn pause(&self) {
        let mut inner = lock(&self.inner);
        inner.settle_finished();
        if inner.state != TrackState::Playing || inner.pause_pending {
            return;
        }
        let Some(pipeline) = inner.pipeline.clone() else {
            return;
        };

        let generation = inner.supersede_fade();

        let from = inner.level_of(pipeline.volume());
        match FadePlan::new(from, 0.0, inner.fade_out, self.steps_per_second) {
            Some(plan) => {
                log::debug!("Fading background out over {:?}", plan.duration());
                inner.pause_pending = true;
                inner.fade = self.spawn_fade(plan, generation, |inner| {
                    if let Some(pipeline) = &inner.pipeline {
                        pipeline.pause();
                    }
                    inner.state = TrackState::Paused;
                    inner.pause_pending = false;
                });
                if inner.fade.is_none() {
                    pipeline.pause();
                    inner.state = TrackState::Paused;
                    inner.pause_pending = false;
                }
            }
            None => {
                pipeline.pause();
                inner.state = TrackState::Paused;
            }
        }
    }

    /// Stop and rewind to the start; the source stays loaded
    pub fn stop(&self) -> Result<(), anyhow::Error> {
        let mut inner = lock(&self.inner);
        let Some(pipeline) = inner.pipeline.clone() else {
            return Ok(());
        };
        inner.supersede_fade();
        inner.state = TrackState::Stopped;
        pipeline.rewind()?;
        pipeline.set_volume(inner.volume);
        Ok(())
    }

    /// Drop the pipeline and any running fade
    pub fn release(&self) {
        let mut inner = lock(&self.inner);
        inner.supersede_fade();
        if let Some(pipeline) = inner.pipeline.take() {
            pipeline.pause();
            log::info!("Background track released");
        }
        inner.source_name = None;
        inner.state = TrackState::Unloaded;
    }

    /// Run a fade whose steps and completion only apply while `generation` is current
    ///
    /// Plan levels are fractions of the configured volume, read at every step
    /// so a volume change during the fade moves the rest of the ramp.
    fn spawn_fade<F>(&self, plan: FadePlan, generation: u64, on_complete: F) -> Option<FadeTask>
    where
        F: FnOnce(&mut Inner) + Send + 'static,
    {
        let step_inner: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        let done_inner = step_inner.clone();

        let step = move |level: f32| -> bool {
            let Some(inner) = step_inner.upgrade() else {
                return false;
            };
            let inner = lock(&inner);
            if inner.generation != generation {
                return false;
            }
            match &inner.pipeline {
                Some(pipeline) => {
                    pipeline.set_volume(level * inner.volume);
                    true
                }
                None => false,
            }
        };

        let complete = move || {
            if let Some(inner) = done_inner.upgrade() {
                let mut inner = lock(&inner);
                if inner.generation == generation {
                    on_complete(&mut inner);
                }
            }
        };

        match FadeTask::spawn(plan, step, complete) {
            Ok(task) => Some(task),
            Err(err) => {
                log::warn!("Could not start fade thread, applying volume directly: {}", err);
                None
            }
        }
    }

    pub fn set_volume(&self, volume: f32) {
        let mut inner = lock(&self.inner);
        inner.volume = clamp_param(volume, 0.0, 1.0);
        // A running fade picks the new volume up at its next step
        if inner.is_fading() {
            return;
        }
        if let Some(pipeline) = &inner.pipeline {
            pipeline.set_volume(inner.volume);
        }
    }

    pub fn volume(&self) -> f32 {
        lock(&self.inner).volume
    }

    pub fn set_looping(&self, looping: bool) {
        let mut inner = lock(&self.inner);
        inner.looping = looping;
        if let Some(pipeline) = &inner.pipeline {
            pipeline.set_looping(looping);
        }
    }

    pub fn is_looping(&self) -> bool {
        lock(&self.inner).looping
    }

    /// Fade-in time in seconds, clamped to 0-10
    pub fn set_fade_in(&self, seconds: f32) {
        lock(&self.inner).fade_in = clamp_param(seconds, 0.0, MAX_FADE_SECONDS);
    }

    pub fn fade_in(&self) -> f32 {
        lock(&self.inner).fade_in
    }

    /// Fade-out time in seconds, clamped to 0-10
    pub fn set_fade_out(&self, seconds: f32) {
        lock(&self.inner).fade_out = clamp_param(seconds, 0.0, MAX_FADE_SECONDS);
    }

    pub fn fade_out(&self) -> f32 {
        lock(&self.inner).fade_out
    }

    pub fn state(&self) -> TrackState {
        let mut inner = lock(&self.inner);
        inner.settle_finished();
        inner.state
    }

    pub fn is_playing(&self) -> bool {
        self.state() == TrackState::Playing
    }

    pub fn is_loaded(&self) -> bool {
        lock(&self.inner).pipeline.is_some()
    }

    /// True while a fade thread is still stepping
    pub fn is_fading(&self) -> bool {
        lock(&self.inner).is_fading()
    }

    pub fn source_name(&self) -> Option<String> {
        lock(&self.inner).source_name.clone()
    }
}

impl Drop for BackgroundTrack {
    fn drop(&mut self) {
        self.release();
    }
}
