//! Linear volume fades for the background track
//!
//! A [`FadePlan`] is the pure step schedule. A [`FadeTask`] runs a plan on
//! its own thread, sleeping between steps on a cancellation channel so that
//! dropping the task wakes and ends it immediately.

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadePlan {
    from: f32,
    to: f32,
    steps: u32,
    step_delay: Duration,
}

impl FadePlan {
    /// Plan a fade from `from` to `to` over `seconds`
    ///
    /// Returns `None` when there is nothing to step through: a non-positive
    /// duration, or one so short that it rounds down to zero steps.
    pub fn new(from: f32, to: f32, seconds: f32, steps_per_second: u32) -> Option<Self> {
        if !(seconds > 0.0) || !seconds.is_finite() {
            return None;
        }
        let steps = (seconds * steps_per_second as f32) as u32;
        if steps == 0 {
            return None;
        }
        Some(Self {
            from,
            to,
            steps,
            step_delay: Duration::from_secs_f64(seconds as f64 / steps as f64),
        })
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn step_delay(&self) -> Duration {
        self.step_delay
    }

    pub fn duration(&self) -> Duration {
        self.step_delay * self.steps
    }

    /// Volume written at step `index` (0 ..= steps); the last step lands exactly on `to`
    pub fn volume_at(&self, index: u32) -> f32 {
        if index >= self.steps {
            return self.to;
        }
        let t = index as f32 / self.steps as f32;
        self.from + (self.to - self.from) * t
    }

    /// All `steps + 1` volumes in order
    pub fn volumes(&self) -> impl Iterator<Item = f32> + '_ {
        (0..=self.steps).map(move |i| self.volume_at(i))
    }
}

/// A running fade
///
/// Dropping or cancelling the task stops it before its next step. The task
/// never joins its thread; the step callback is expected to check validity
/// itself and return `false` once the fade no longer applies.
pub struct FadeTask {
    cancel: Option<Sender<()>>,
    finished: Arc<AtomicBool>,
}

impl FadeTask {
    /// Run `plan`, calling `step` with each volume and `on_complete` after the last one
    ///
    /// `step` returning false aborts the fade without calling `on_complete`.
    pub fn spawn<S, C>(plan: FadePlan, mut step: S, on_complete: C) -> std::io::Result<Self>
    where
        S: FnMut(f32) -> bool + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = channel::bounded::<()>(0);
        let finished = Arc::new(AtomicBool::new(false));
        let done = finished.clone();

        thread::Builder::new()
            .name("bgm-fade".into())
            .spawn(move || {
                let last = plan.steps();
                for (index, volume) in plan.volumes().enumerate() {
                    if !step(volume) {
                        log::debug!("Fade aborted at step {}/{}", index, last);
                        done.store(true, Ordering::Release);
                        return;
                    }
                    if index as u32 == last {
                        break;
                    }
                    match cancel_rx.recv_timeout(plan.step_delay()) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => {
                            log::debug!("Fade cancelled at step {}/{}", index, last);
                            done.store(true, Ordering::Release);
                            return;
                        }
                    }
                }
                on_complete();
                done.store(true, Ordering::Release);
            })?;

        Ok(Self {
            cancel: Some(cancel_tx),
            finished,
        })
    }

    /// Stop before the next step
    pub fn cancel(&mut self) {
        self.cancel.take();
    }

    /// True once the fade thread has finished, for any reason
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

impl Drop for FadeTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
