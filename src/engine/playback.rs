//! The real-time playback thread
//!
//! One dedicated thread renders a buffer, writes it to the output sink and
//! publishes the waveform, then checks that its run is still the active one.
//! The sink write blocks until the device has room, which is the loop's only
//! pacing.
//!
//! Every `start()` issues a new run id. A thread only renders while the
//! shared active id equals its own, so a thread abandoned by a timed-out
//! `stop()` can never resume after a later `start()`.

use super::mixer::Mixer;
use super::EngineParams;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::platform::{AudioOutput, OutputSink, PcmFormat};
use crate::visualization::WaveformPublisher;
use anyhow::anyhow;
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Running,
}

/// Id of the run allowed to render; zero while stopped
const IDLE: u64 = 0;

/// Lock-free view of whether a playback run is active
#[derive(Debug, Clone)]
pub struct PlaybackStatus(Arc<AtomicU64>);

impl PlaybackStatus {
    fn new() -> Self {
        Self(Arc::new(AtomicU64::new(IDLE)))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire) != IDLE
    }

    pub fn state(&self) -> PlaybackState {
        if self.is_running() {
            PlaybackState::Running
        } else {
            PlaybackState::Stopped
        }
    }

    fn is_current(&self, run: u64) -> bool {
        self.0.load(Ordering::Acquire) == run
    }

    /// Mark `run` as ended, unless a newer run has already replaced it
    fn end(&self, run: u64) -> bool {
        self.0
            .compare_exchange(run, IDLE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Sends on drop so `stop()` learns about thread exit, including by panic
struct DoneSignal(Sender<()>);

impl Drop for DoneSignal {
    fn drop(&mut self) {
        let _ = self.0.try_send(());
    }
}

struct Worker {
    handle: JoinHandle<()>,
    done: channel::Receiver<()>,
}

/// Everything the audio thread needs, moved into it on start
struct LoopContext {
    run: u64,
    params: Arc<EngineParams>,
    publisher: Arc<WaveformPublisher>,
    status: PlaybackStatus,
    latest_run: Arc<AtomicU64>,
    failure: Arc<Mutex<Option<String>>>,
    mixer_slot: Arc<Mutex<Option<Mixer>>>,
    format: PcmFormat,
}

pub struct PlaybackLoop {
    config: EngineConfig,
    output: Arc<dyn AudioOutput>,
    status: PlaybackStatus,
    // Last issued run id; a finishing thread parks its mixer only if no newer run exists
    latest_run: Arc<AtomicU64>,
    failure: Arc<Mutex<Option<String>>>,
    // Oscillator phases survive stop/start; the thread borrows the mixer while running
    mixer_slot: Arc<Mutex<Option<Mixer>>>,
    worker: Option<Worker>,
}

impl PlaybackLoop {
    pub fn new(config: EngineConfig, output: Arc<dyn AudioOutput>) -> Self {
        let mixer = Mixer::new(config.sample_rate as f32, config.buffer_size);
        Self {
            config,
            output,
            status: PlaybackStatus::new(),
            latest_run: Arc::new(AtomicU64::new(IDLE)),
            failure: Arc::new(Mutex::new(None)),
            mixer_slot: Arc::new(Mutex::new(Some(mixer))),
            worker: None,
        }
    }

    /// Shared handle for reading the state without locking the loop
    pub fn status(&self) -> PlaybackStatus {
        self.status.clone()
    }

    pub fn state(&self) -> PlaybackState {
        self.status.state()
    }

    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }

    /// Spawn the audio thread. No-op if already running.
    ///
    /// The device is opened on the new thread; this call waits for that and
    /// returns the device error if opening fails.
    pub fn start(
        &mut self,
        params: Arc<EngineParams>,
        publisher: Arc<WaveformPublisher>,
    ) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        // A worker that ended on its own (device failure) still needs joining
        if self.worker.is_some() {
            let _ = self.stop();
        }

        let run = self.latest_run.fetch_add(1, Ordering::AcqRel) + 1;
        let context = LoopContext {
            run,
            params,
            publisher,
            status: self.status.clone(),
            latest_run: self.latest_run.clone(),
            failure: self.failure.clone(),
            mixer_slot: self.mixer_slot.clone(),
            format: PcmFormat::new(self.config.sample_rate, self.config.buffer_size),
        };
        let output = self.output.clone();
        let (ready_tx, ready_rx) = channel::bounded::<std::result::Result<(), anyhow::Error>>(1);
        let (done_tx, done_rx) = channel::bounded(1);

        self.status.0.store(run, Ordering::Release);
        let spawned = thread::Builder::new()
            .name("tone-playback".into())
            .spawn(move || {
                let _done = DoneSignal(done_tx);
                let sink = match output.open(context.format) {
                    Ok(sink) => {
                        let _ = ready_tx.send(Ok(()));
                        sink
                    }
                    Err(err) => {
                        context.status.end(context.run);
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                run_loop(context, sink);
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                self.status.end(run);
                return Err(EngineError::Device(err.into()));
            }
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {
                log::info!(
                    "Playback started: {} Hz, {} samples per buffer",
                    self.config.sample_rate,
                    self.config.buffer_size
                );
                self.worker = Some(Worker {
                    handle,
                    done: done_rx,
                });
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(EngineError::Device(err))
            }
            Err(_) => {
                self.status.end(run);
                let _ = handle.join();
                Err(EngineError::Device(anyhow!(
                    "Playback thread exited while opening the device"
                )))
            }
        }
    }

    /// Signal the thread to finish its current buffer and wait for it
    ///
    /// The wait is bounded by `stop_timeout`. On timeout the thread is
    /// abandoned, the loop is still considered stopped, and `StopTimeout` is
    /// returned so the caller can report it. The abandoned thread exits as
    /// soon as its blocked write returns.
    pub fn stop(&mut self) -> Result<()> {
        self.status.0.store(IDLE, Ordering::Release);

        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        match worker.done.recv_timeout(self.config.stop_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    log::error!("Playback thread panicked");
                }
                log::info!("Playback stopped");
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "Playback thread did not exit within {:?}, abandoning it",
                    self.config.stop_timeout
                );
                Err(EngineError::StopTimeout(self.config.stop_timeout))
            }
        }
    }

    /// Failure that ended the last run, if any. Cleared by reading.
    pub fn take_failure(&self) -> Option<EngineError> {
        lock(&self.failure).take().map(EngineError::PlaybackFailed)
    }

    /// Phase of a channel's oscillator while the loop is stopped
    pub fn oscillator_phase(&self, channel: usize) -> Option<f64> {
        lock(&self.mixer_slot)
            .as_ref()
            .and_then(|mixer| mixer.oscillator(channel))
            .map(|osc| osc.phase())
    }
}

impl Drop for PlaybackLoop {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn run_loop(context: LoopContext, mut sink: Box<dyn OutputSink>) {
    let LoopContext {
        run,
        params,
        publisher,
        status,
        latest_run,
        failure,
        mixer_slot,
        format,
    } = context;

    // The slot is empty only when an abandoned run still holds the mixer
    let mut mixer = lock(&mixer_slot).take().unwrap_or_else(|| {
        log::warn!("Oscillator state lost with an abandoned run, restarting phases");
        Mixer::new(format.sample_rate as f32, format.buffer_size)
            .with_buffers_rendered(publisher.latest().sequence())
    });
    let mut pcm = vec![0i16; format.buffer_size];

    while status.is_current(run) {
        let channels = params.channel_snapshots();
        let snapshot = mixer.render(&channels, params.master_volume(), &mut pcm);

        if let Err(err) = sink.write(&pcm) {
            if status.end(run) {
                log::error!("Output write failed, stopping playback: {:#}", err);
                *lock(&failure) = Some(format!("{:#}", err));
            }
            break;
        }

        // A write that outlived stop() must not publish into a newer run
        if !status.is_current(run) {
            break;
        }
        publisher.publish(snapshot);
    }

    if let Err(err) = sink.pause() {
        log::warn!("Failed to pause output: {:#}", err);
    }
    sink.flush();

    let mut slot = lock(&mixer_slot);
    if latest_run.load(Ordering::Acquire) == run {
        *slot = Some(mixer);
    }
}
