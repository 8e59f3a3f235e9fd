//! Waveform snapshots for visualization
//!
//! The audio thread hands each finished buffer to [`WaveformPublisher::publish`].
//! The snapshot is frozen behind an `Arc` before anyone can see it, the shared
//! "latest" slot is swapped wholesale, and observer callbacks run on a separate
//! dispatch thread so the audio thread never waits on them.

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

/// Per-channel and master samples for one buffer period
///
/// Samples are roughly in -1.0..1.0. The master waveform is the mix after
/// master gain and before 16-bit clipping.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformSnapshot {
    sequence: u64,
    channels: Vec<Vec<f32>>,
    master: Vec<f32>,
}

impl WaveformSnapshot {
    pub fn new(sequence: u64, channels: Vec<Vec<f32>>, master: Vec<f32>) -> Self {
        Self {
            sequence,
            channels,
            master,
        }
    }

    /// An all-zero snapshot, used before the first buffer is rendered
    pub fn silent(channel_count: usize, frames: usize) -> Self {
        Self::new(0, vec![vec![0.0; frames]; channel_count], vec![0.0; frames])
    }

    /// Buffer number this snapshot came from (0 for the initial silent one)
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per array
    pub fn frames(&self) -> usize {
        self.master.len()
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn master(&self) -> &[f32] {
        &self.master
    }

    /// All `channel_count + 1` arrays, channels first and master last
    pub fn arrays(&self) -> impl Iterator<Item = &[f32]> {
        self.channels
            .iter()
            .map(Vec::as_slice)
            .chain(std::iter::once(self.master.as_slice()))
    }

    /// The arrays laid end to end, for hosts that want one contiguous block
    pub fn to_contiguous(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity((self.channels.len() + 1) * self.frames());
        for array in self.arrays() {
            out.extend_from_slice(array);
        }
        out
    }
}

/// Observer callback; receives an immutable snapshot it may keep
pub type WaveformObserver = Arc<dyn Fn(Arc<WaveformSnapshot>) + Send + Sync>;

/// Handle returned by [`WaveformPublisher::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    observers: Vec<(ObserverId, WaveformObserver)>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct WaveformPublisher {
    latest: Mutex<Arc<WaveformSnapshot>>,
    registry: Arc<Mutex<Registry>>,
    queue: Option<Sender<Arc<WaveformSnapshot>>>,
    dispatcher: Option<JoinHandle<()>>,
    dropped: AtomicU64,
}

impl WaveformPublisher {
    /// Create a publisher and start its dispatch thread
    ///
    /// `queue_depth` snapshots may wait for slow observers; beyond that new
    /// frames skip the observers (the latest slot is always updated).
    pub fn new(channel_count: usize, frames: usize, queue_depth: usize) -> std::io::Result<Self> {
        let registry = Arc::new(Mutex::new(Registry::default()));
        let (tx, rx) = channel::bounded(queue_depth.max(1));

        let dispatch_registry = registry.clone();
        let dispatcher = thread::Builder::new()
            .name("waveform-dispatch".into())
            .spawn(move || Self::dispatch(rx, dispatch_registry))?;

        Ok(Self {
            latest: Mutex::new(Arc::new(WaveformSnapshot::silent(channel_count, frames))),
            registry,
            queue: Some(tx),
            dispatcher: Some(dispatcher),
            dropped: AtomicU64::new(0),
        })
    }

    fn dispatch(rx: Receiver<Arc<WaveformSnapshot>>, registry: Arc<Mutex<Registry>>) {
        while let Ok(snapshot) = rx.recv() {
            // Copy the list so observers run without the registry lock
            let observers: Vec<WaveformObserver> = lock(&registry)
                .observers
                .iter()
                .map(|(_, observer)| observer.clone())
                .collect();

            for observer in observers {
                let snapshot = snapshot.clone();
                if panic::catch_unwind(AssertUnwindSafe(|| observer(snapshot))).is_err() {
                    log::error!("waveform observer panicked");
                }
            }
        }
    }

    /// Register an observer; it is called once per published buffer
    pub fn subscribe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(Arc<WaveformSnapshot>) + Send + Sync + 'static,
    {
        let mut registry = lock(&self.registry);
        registry.next_id += 1;
        let id = ObserverId(registry.next_id);
        registry.observers.push((id, Arc::new(observer)));
        id
    }

    /// Remove an observer. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut registry = lock(&self.registry);
        let before = registry.observers.len();
        registry.observers.retain(|(existing, _)| *existing != id);
        registry.observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        lock(&self.registry).observers.len()
    }

    /// Replace the latest snapshot and queue it for observers without blocking
    pub fn publish(&self, snapshot: WaveformSnapshot) {
        let snapshot = Arc::new(snapshot);
        *lock(&self.latest) = snapshot.clone();

        if self.observer_count() == 0 {
            return;
        }

        if let Some(queue) = &self.queue {
            match queue.try_send(snapshot) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    log::debug!("observers behind, skipped a waveform frame");
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
    }

    /// The most recently published snapshot
    pub fn latest(&self) -> Arc<WaveformSnapshot> {
        lock(&self.latest).clone()
    }

    /// Frames observers missed because the dispatch queue was full
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for WaveformPublisher {
    fn drop(&mut self) {
        // Closing the queue ends the dispatch loop
        self.queue.take();
        if let Some(handle) = self.dispatcher.take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}
