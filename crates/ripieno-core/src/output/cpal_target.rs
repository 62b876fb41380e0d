//! CPAL hardware backend.

use super::OVERLOAD_THRESHOLD;
use crate::metering::{peak, CpuMeter};
use crate::target::{CallbackSource, FrameClock, Target, TargetBinding, TargetClock};
use crate::{AtomicFlag, AtomicFloat, Error, Result, TargetConfig};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::Arc;
use std::time::Instant;
use thread_priority::ThreadPriority;

/// Channel buffers preallocated before the stream starts.
const PREALLOCATED_CHANNELS: usize = 8;

/// Wrapper to hold a `cpal::Stream` in a `Send` context.
///
/// `cpal::Stream` is `!Send` due to platform internals. The target owning it
/// is only moved between threads as a whole and never shares the stream.
struct StreamHandle(#[allow(dead_code)] cpal::Stream);

// SAFETY: the stream is owned exclusively by `CpalTarget` and is only
// dropped, never accessed, after construction.
unsafe impl Send for StreamHandle {}

/// State shared between the target and its stream callbacks.
struct StreamShared {
    gain: AtomicFloat,
    failed: AtomicFlag,
    meter: CpuMeter,
}

pub struct CpalTarget {
    source: Arc<dyn CallbackSource>,
    clock: Arc<FrameClock>,
    shared: Arc<StreamShared>,
    sample_rate: u32,
    block_size: usize,
    device_name: String,
    stream: Option<StreamHandle>,
}

impl CpalTarget {
    pub fn open(config: &TargetConfig, source: Arc<dyn CallbackSource>) -> Result<Self> {
        let device = get_device(config.output_device_index)?;
        let device_name = device.name()?;
        let supported = device.default_output_config()?;

        let sample_rate = supported.sample_rate().0;
        let block_size = config.block_size_or_default();
        let mut stream_config: cpal::StreamConfig = supported.config();
        if let Some(block) = config.block_size {
            stream_config.buffer_size = cpal::BufferSize::Fixed(block as u32);
        }

        let clock = Arc::new(FrameClock::new(sample_rate));
        let shared = Arc::new(StreamShared {
            gain: AtomicFloat::new(config.output_gain),
            failed: AtomicFlag::new(false),
            meter: CpuMeter::new(sample_rate as f64),
        });

        // Bind before the first callback so buffers are sized for this device.
        source.set_target(Some(TargetBinding::new(&clock)), block_size);
        source.set_target_sample_rate(sample_rate);

        let callback = StreamCallback {
            source: Arc::clone(&source),
            clock: Arc::clone(&clock),
            shared: Arc::clone(&shared),
            device_channels: stream_config.channels as usize,
            sample_rate,
            buffers: vec![vec![0.0; block_size.max(1) * 2]; PREALLOCATED_CHANNELS],
            priority_set: false,
            latency_reported: false,
        };

        let stream = match build_for_format(&device, &stream_config, supported.sample_format(), callback)
            .and_then(|stream| {
                stream.play()?;
                Ok(stream)
            }) {
            Ok(stream) => stream,
            Err(e) => {
                source.set_target(None, 0);
                return Err(e);
            }
        };

        Ok(Self {
            source,
            clock,
            shared,
            sample_rate,
            block_size,
            device_name,
            stream: Some(StreamHandle(stream)),
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn cpu_metrics(&self) -> crate::CpuMetrics {
        self.shared.meter.metrics()
    }
}

impl Target for CpalTarget {
    fn backend_name(&self) -> &'static str {
        "cpal"
    }

    fn is_ok(&self) -> bool {
        self.stream.is_some() && !self.shared.failed.get()
    }

    fn current_time(&self) -> f64 {
        self.clock.current_time()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn set_output_gain(&self, gain: f32) {
        self.shared.gain.set(gain.max(0.0));
    }

    fn output_gain(&self) -> f32 {
        self.shared.gain.get()
    }

    fn shutdown(&mut self) {
        if self.stream.take().is_some() {
            self.source.set_target(None, 0);
            tracing::debug!(device = %self.device_name, "Closed CPAL output");
        }
    }
}

impl Drop for CpalTarget {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Everything the data callback owns.
struct StreamCallback {
    source: Arc<dyn CallbackSource>,
    clock: Arc<FrameClock>,
    shared: Arc<StreamShared>,
    device_channels: usize,
    sample_rate: u32,
    buffers: Vec<Vec<f32>>,
    priority_set: bool,
    latency_reported: bool,
}

impl StreamCallback {
    fn render<T>(&mut self, data: &mut [T], info: &cpal::OutputCallbackInfo)
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        if !self.priority_set {
            let _ = thread_priority::set_current_thread_priority(ThreadPriority::Max);
            self.priority_set = true;
        }

        if !self.latency_reported {
            let stamp = info.timestamp();
            if let Some(latency) = stamp.playback.duration_since(&stamp.callback) {
                let frames = latency.as_secs_f64() * self.sample_rate as f64;
                self.source.set_target_play_latency(frames.round() as u64);
            }
            self.latency_reported = true;
        }

        let frames = data.len() / self.device_channels.max(1);
        let channels = self.source.target_channel_count().max(1);

        // Grows only if the device hands us a bigger period than expected.
        if self.buffers.len() < channels {
            self.buffers.resize_with(channels, Vec::new);
        }
        for buffer in &mut self.buffers[..channels] {
            if buffer.len() < frames {
                buffer.resize(frames, 0.0);
            }
        }

        let received = self
            .source
            .get_source_samples(frames, &mut self.buffers[..channels]);

        let gain = self.shared.gain.get();
        for (i, frame) in data.chunks_mut(self.device_channels.max(1)).enumerate() {
            for (ch, sample) in frame.iter_mut().enumerate() {
                let value = if i < received && ch < channels {
                    self.buffers[ch][i] * gain
                } else {
                    0.0
                };
                *sample = T::from_sample(value);
            }
        }

        let left = peak(&self.buffers[0][..received]) * gain;
        let right = if channels > 1 {
            peak(&self.buffers[1][..received]) * gain
        } else {
            left
        };
        self.source.set_output_levels(left, right);

        self.clock.advance(frames);
    }
}

fn build_for_format(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    format: cpal::SampleFormat,
    callback: StreamCallback,
) -> Result<cpal::Stream> {
    match format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, callback),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, callback),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, callback),
        format => Err(Error::InvalidConfig(format!(
            "Unsupported sample format: {:?}",
            format
        ))),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut callback: StreamCallback,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let error_shared = Arc::clone(&callback.shared);

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], info: &cpal::OutputCallbackInfo| {
            let started = Instant::now();
            let frames = data.len() / callback.device_channels.max(1);

            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback.render(data, info);
            }));

            if result.is_err() {
                // Panic in callback - output silence
                for sample in data.iter_mut() {
                    *sample = T::from_sample(0.0);
                }
            }

            let load = callback.shared.meter.record(frames, started.elapsed());
            if load > OVERLOAD_THRESHOLD {
                callback.source.audio_processing_overload();
            }
        },
        move |_err| {
            // Cannot log from the audio thread; surfaced through is_ok().
            error_shared.failed.raise();
        },
        None,
    )?;

    Ok(stream)
}

fn get_device(index: Option<usize>) -> Result<cpal::Device> {
    let host = cpal::default_host();

    if let Some(idx) = index {
        let devices: Vec<_> = host.output_devices()?.collect();

        let device_count = devices.len();
        devices.into_iter().nth(idx).ok_or_else(|| {
            Error::InvalidDevice(format!(
                "Output device index {} out of range (available: {})",
                idx, device_count
            ))
        })
    } else {
        host.default_output_device()
            .ok_or_else(|| Error::InvalidDevice("No output device available".to_string()))
    }
}

/// List available output devices as `"index: name"`.
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    host.output_devices()?
        .enumerate()
        .map(|(idx, device)| Ok(format!("{}: {}", idx, device.name()?)))
        .collect()
}
