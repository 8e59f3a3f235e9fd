//! WAV file output that behaves like a real-time device
//!
//! Each write is appended to a 16-bit mono WAV file and then sleeps for the
//! remainder of one buffer period, so the playback loop runs at the same
//! cadence it would against hardware.

use super::{AudioOutput, OutputSink, PcmFormat};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub struct BounceOutput {
    path: PathBuf,
}

impl BounceOutput {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AudioOutput for BounceOutput {
    fn open(&self, format: PcmFormat) -> Result<Box<dyn OutputSink>, anyhow::Error> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: format.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let writer = WavWriter::create(&self.path, spec)?;
        log::info!("Bouncing to {}", self.path.display());

        Ok(Box::new(BounceSink {
            writer: Some(writer),
            sample_rate: format.sample_rate,
            next_deadline: None,
        }))
    }
}

struct BounceSink {
    writer: Option<WavWriter<BufWriter<File>>>,
    sample_rate: u32,
    next_deadline: Option<Instant>,
}

impl OutputSink for BounceSink {
    fn write(&mut self, samples: &[i16]) -> Result<(), anyhow::Error> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Bounce file already finalized"))?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }

        let period = Duration::from_secs_f64(samples.len() as f64 / self.sample_rate as f64);
        let deadline = self.next_deadline.unwrap_or_else(Instant::now) + period;
        let now = Instant::now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        self.next_deadline = Some(deadline.max(now));
        Ok(())
    }

    fn pause(&mut self) -> Result<(), anyhow::Error> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
        }
        self.next_deadline = None;
        Ok(())
    }

    fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(err) = writer.flush() {
                log::warn!("Bounce flush failed: {}", err);
            }
        }
    }
}

impl Drop for BounceSink {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(err) = writer.finalize() {
                log::warn!("Bounce finalize failed: {}", err);
            }
        }
    }
}
