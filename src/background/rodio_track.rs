//! Background pipeline on rodio
//!
//! The encoded source is kept in memory. Looping is done by re-opening the
//! decoder when it runs dry, gated by a shared flag, so toggling the loop
//! setting applies to a track that is already playing.

use super::{TrackLoader, TrackPipeline, TrackSource};
use anyhow::anyhow;
use crossbeam::channel::{self, Sender};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

type SourceDecoder = Decoder<Cursor<Arc<[u8]>>>;

fn open_decoder(bytes: &Arc<[u8]>) -> Result<SourceDecoder, anyhow::Error> {
    Ok(Decoder::new(Cursor::new(bytes.clone()))?)
}

/// Decoded source that restarts from the top while `looping` is set
struct LoopingSource {
    bytes: Arc<[u8]>,
    current: SourceDecoder,
    looping: Arc<AtomicBool>,
}

impl LoopingSource {
    fn new(bytes: Arc<[u8]>, looping: Arc<AtomicBool>) -> Result<Self, anyhow::Error> {
        let current = open_decoder(&bytes)?;
        Ok(Self {
            bytes,
            current,
            looping,
        })
    }
}

impl Iterator for LoopingSource {
    type Item = i16;

    fn next(&mut self) -> Option<i16> {
        if let Some(sample) = self.current.next() {
            return Some(sample);
        }
        if !self.looping.load(Ordering::Relaxed) {
            return None;
        }
        match open_decoder(&self.bytes) {
            Ok(decoder) => {
                self.current = decoder;
                self.current.next()
            }
            Err(err) => {
                log::error!("Could not restart background track: {:#}", err);
                None
            }
        }
    }
}

impl Source for LoopingSource {
    fn current_frame_len(&self) -> Option<usize> {
        self.current.current_frame_len()
    }

    fn channels(&self) -> u16 {
        self.current.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.current.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

/// Keeps rodio's `OutputStream` (which cannot cross threads) alive on its own thread
struct OutputKeeper {
    handle: OutputStreamHandle,
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl OutputKeeper {
    fn spawn() -> Result<Self, anyhow::Error> {
        let (ready_tx, ready_rx) = channel::bounded(1);
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);

        let thread = thread::Builder::new()
            .name("bgm-output".into())
            .spawn(move || match OutputStream::try_default() {
                Ok((_stream, handle)) => {
                    let _ = ready_tx.send(Ok(handle));
                    // Returns once the keeper drops its sender
                    let _ = shutdown_rx.recv();
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(anyhow::Error::from(err)));
                }
            })?;

        let handle = ready_rx
            .recv()
            .map_err(|_| anyhow!("Background output thread exited during setup"))??;

        log::info!("Background output stream opened");
        Ok(Self {
            handle,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }
}

impl Drop for OutputKeeper {
    fn drop(&mut self) {
        self.shutdown.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Loads sources into rodio sinks on the default output device
///
/// The output stream is opened on first load and shared by every track.
pub struct RodioLoader {
    output: Mutex<Option<OutputKeeper>>,
}

impl RodioLoader {
    pub fn new() -> Self {
        Self {
            output: Mutex::new(None),
        }
    }

    fn stream_handle(&self) -> Result<OutputStreamHandle, anyhow::Error> {
        let mut output = self.output.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(keeper) = output.as_ref() {
            return Ok(keeper.handle.clone());
        }
        let keeper = OutputKeeper::spawn()?;
        let handle = keeper.handle.clone();
        *output = Some(keeper);
        Ok(handle)
    }
}

impl Default for RodioLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackLoader for RodioLoader {
    fn load(
        &self,
        source: &TrackSource,
        looping: bool,
        volume: f32,
    ) -> Result<Arc<dyn TrackPipeline>, anyhow::Error> {
        let bytes = source.read_bytes()?;
        // Probe once so corrupt or unsupported sources fail here, not mid-playback
        open_decoder(&bytes)?;

        let track = RodioTrack::new(self.stream_handle()?, bytes, looping, volume)?;
        Ok(Arc::new(track))
    }
}

pub struct RodioTrack {
    handle: OutputStreamHandle,
    bytes: Arc<[u8]>,
    looping: Arc<AtomicBool>,
    sink: Mutex<Sink>,
}

impl RodioTrack {
    fn new(
        handle: OutputStreamHandle,
        bytes: Arc<[u8]>,
        looping: bool,
        volume: f32,
    ) -> Result<Self, anyhow::Error> {
        let looping = Arc::new(AtomicBool::new(looping));
        let sink = Self::prepare(&handle, &bytes, &looping, volume)?;
        Ok(Self {
            handle,
            bytes,
            looping,
            sink: Mutex::new(sink),
        })
    }

    /// A paused sink holding the source from the beginning
    fn prepare(
        handle: &OutputStreamHandle,
        bytes: &Arc<[u8]>,
        looping: &Arc<AtomicBool>,
        volume: f32,
    ) -> Result<Sink, anyhow::Error> {
        let sink = Sink::try_new(handle)?;
        sink.pause();
        sink.set_volume(volume);
        sink.append(LoopingSource::new(bytes.clone(), looping.clone())?);
        Ok(sink)
    }

    fn sink(&self) -> MutexGuard<'_, Sink> {
        self.sink.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TrackPipeline for RodioTrack {
    fn play(&self) {
        self.sink().play();
    }

    fn pause(&self) {
        self.sink().pause();
    }

    fn rewind(&self) -> Result<(), anyhow::Error> {
        let mut sink = self.sink();
        let volume = sink.volume();
        sink.stop();
        *sink = Self::prepare(&self.handle, &self.bytes, &self.looping, volume)?;
        Ok(())
    }

    fn set_volume(&self, volume: f32) {
        self.sink().set_volume(volume);
    }

    fn volume(&self) -> f32 {
        self.sink().volume()
    }

    fn set_looping(&self, looping: bool) {
        self.looping.store(looping, Ordering::Relaxed);
    }

    fn is_finished(&self) -> bool {
        self.sink().empty()
    }
}

impl Drop for RodioTrack {
    fn drop(&mut self) {
        self.sink().stop();
    }
}
