use super::{AudioOutput, OutputSink, PcmFormat};
use anyhow::anyhow;
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Device, FromSample, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig,
};
use crossbeam::channel::{self, Receiver, SendTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Buffers that may wait between the writer and the device callback
const QUEUE_BUFFERS: usize = 2;

/// Writes that wait longer than this many buffer periods count as a stalled device
const STALL_PERIODS: u32 = 4;

/// Native output through CPAL's default host
pub struct CpalOutput {
    device_name: Option<String>,
}

impl CpalOutput {
    /// Use the host's default output device
    pub fn new() -> Self {
        Self { device_name: None }
    }

    /// Use the output device with this exact name
    pub fn with_device(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
        }
    }

    fn select_device(&self) -> Result<Device, anyhow::Error> {
        let host = cpal::default_host();

        let device = match &self.device_name {
            Some(name) => host
                .output_devices()?
                .find(|device| device.name().map(|n| &n == name).unwrap_or(false))
                .ok_or_else(|| anyhow!("Output device '{}' is not available", name))?,
            None => host
                .default_output_device()
                .ok_or_else(|| anyhow!("Default output device is not available"))?,
        };

        log::info!("Output device: {}", device.name()?);
        Ok(device)
    }

    /// Pick a config that runs at `sample_rate`, preferring native i16 output
    fn select_config(
        device: &Device,
        sample_rate: u32,
    ) -> Result<(StreamConfig, SampleFormat), anyhow::Error> {
        let candidates: Vec<_> = device
            .supported_output_configs()?
            .filter(|range| {
                range.min_sample_rate().0 <= sample_rate && range.max_sample_rate().0 >= sample_rate
            })
            .collect();

        let range = candidates
            .iter()
            .find(|range| range.sample_format() == SampleFormat::I16)
            .or_else(|| candidates.first())
            .cloned()
            .ok_or_else(|| anyhow!("No output config supports {} Hz", sample_rate))?;

        let supported = range.with_sample_rate(SampleRate(sample_rate));
        log::debug!("Output config: {:?}", supported);

        let sample_format = supported.sample_format();
        Ok((supported.into(), sample_format))
    }

    /// Create a typed stream for the given sample format
    fn make_stream<T>(
        device: &Device,
        config: &StreamConfig,
        queue: Receiver<Vec<i16>>,
        failure: Arc<Mutex<Option<String>>>,
    ) -> Result<Stream, anyhow::Error>
    where
        T: SizedSample + FromSample<i16>,
    {
        let num_channels = config.channels as usize;
        let mut feed = Feed::new(queue);

        let err_fn = move |err: cpal::StreamError| {
            log::error!("Output stream error: {}", err);
            *failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(err.to_string());
        };

        let stream = device.build_output_stream(
            config,
            move |output: &mut [T], _: &cpal::OutputCallbackInfo| {
                // Copy the mono sample to every device channel
                for frame in output.chunks_mut(num_channels) {
                    let value = T::from_sample(feed.next_sample());
                    for sample in frame.iter_mut() {
                        *sample = value;
                    }
                }
            },
            err_fn,
            None,
        )?;

        Ok(stream)
    }
}

impl Default for CpalOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for CpalOutput {
    fn open(&self, format: PcmFormat) -> Result<Box<dyn OutputSink>, anyhow::Error> {
        let device = self.select_device()?;
        let (config, sample_format) = Self::select_config(&device, format.sample_rate)?;

        let (tx, rx) = channel::bounded(QUEUE_BUFFERS);
        let failure = Arc::new(Mutex::new(None));
        let feed = rx.clone();
        let fail = failure.clone();

        let stream = match sample_format {
            SampleFormat::I8 => Self::make_stream::<i8>(&device, &config, feed, fail)?,
            SampleFormat::I16 => Self::make_stream::<i16>(&device, &config, feed, fail)?,
            SampleFormat::I32 => Self::make_stream::<i32>(&device, &config, feed, fail)?,
            SampleFormat::I64 => Self::make_stream::<i64>(&device, &config, feed, fail)?,
            SampleFormat::U8 => Self::make_stream::<u8>(&device, &config, feed, fail)?,
            SampleFormat::U16 => Self::make_stream::<u16>(&device, &config, feed, fail)?,
            SampleFormat::U32 => Self::make_stream::<u32>(&device, &config, feed, fail)?,
            SampleFormat::U64 => Self::make_stream::<u64>(&device, &config, feed, fail)?,
            SampleFormat::F32 => Self::make_stream::<f32>(&device, &config, feed, fail)?,
            SampleFormat::F64 => Self::make_stream::<f64>(&device, &config, feed, fail)?,
            sample_format => return Err(anyhow!("Unsupported sample format '{}'", sample_format)),
        };

        stream.play()?;
        log::info!(
            "Audio stream started at {} Hz, {} device channel(s)",
            format.sample_rate,
            config.channels
        );

        Ok(Box::new(CpalSink {
            stream,
            queue: tx,
            drain: rx,
            failure,
            write_timeout: format.buffer_period() * STALL_PERIODS,
        }))
    }
}

/// Callback side of the write queue
struct Feed {
    queue: Receiver<Vec<i16>>,
    current: Vec<i16>,
    position: usize,
}

impl Feed {
    fn new(queue: Receiver<Vec<i16>>) -> Self {
        Self {
            queue,
            current: Vec::new(),
            position: 0,
        }
    }

    /// Next queued sample, or silence on underrun
    #[inline]
    fn next_sample(&mut self) -> i16 {
        while self.position >= self.current.len() {
            match self.queue.try_recv() {
                Ok(buffer) => {
                    self.current = buffer;
                    self.position = 0;
                }
                Err(_) => return 0,
            }
        }
        let sample = self.current[self.position];
        self.position += 1;
        sample
    }
}

struct CpalSink {
    stream: Stream,
    queue: Sender<Vec<i16>>,
    drain: Receiver<Vec<i16>>,
    failure: Arc<Mutex<Option<String>>>,
    write_timeout: Duration,
}

impl OutputSink for CpalSink {
    fn write(&mut self, samples: &[i16]) -> Result<(), anyhow::Error> {
        if let Some(message) = self
            .failure
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            return Err(anyhow!("Output stream failed: {}", message));
        }

        match self.queue.send_timeout(samples.to_vec(), self.write_timeout) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(anyhow!("Output device stalled")),
            Err(SendTimeoutError::Disconnected(_)) => Err(anyhow!("Output stream closed")),
        }
    }

    fn pause(&mut self) -> Result<(), anyhow::Error> {
        self.stream.pause()?;
        log::info!("Audio stream paused");
        Ok(())
    }

    fn flush(&mut self) {
        while self.drain.try_recv().is_ok() {}
    }
}
