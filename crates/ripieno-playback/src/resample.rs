//! Block-incremental sample rate conversion using rubato.
//!
//! Input arrives in arbitrary-sized blocks and is staged into fixed chunks.
//! The resampler's startup delay is measured once with an impulse and
//! trimmed, so output frame `i` lines up with input frame `i / ratio`. A
//! final flush pads the tail so that `N` input frames produce exactly
//! `ceil(N * ratio)` output frames.

use crate::Result;
use rubato::{
    FastFixedIn, PolynomialDegree, Resampler as _, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};
use serde::{Deserialize, Serialize};

/// Input chunk handed to rubato per call.
pub const RESAMPLE_CHUNK_FRAMES: usize = 1024;

/// Upper bound on zero chunks pushed through during a final flush.
const MAX_FLUSH_CHUNKS: usize = 64;

/// Chunks run through a fresh engine when measuring its delay.
const DELAY_MEASURE_CHUNKS: usize = 3;

/// Sample rate conversion quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResampleQuality {
    /// Polynomial interpolation, lowest latency and cost
    Fastest,
    /// Short sinc filter (default)
    #[default]
    Good,
    /// Long sinc filter with cubic interpolation
    Best,
}

impl ResampleQuality {
    /// Map a numeric level (0 = fastest, 2 = best) to a tier. Unknown
    /// levels fall back to [`ResampleQuality::Good`].
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => ResampleQuality::Fastest,
            2 => ResampleQuality::Best,
            _ => ResampleQuality::Good,
        }
    }

    pub fn level(&self) -> u8 {
        match self {
            ResampleQuality::Fastest => 0,
            ResampleQuality::Good => 1,
            ResampleQuality::Best => 2,
        }
    }

    fn sinc_parameters(&self) -> SincInterpolationParameters {
        match self {
            ResampleQuality::Best => SincInterpolationParameters {
                sinc_len: 256,
                f_cutoff: 0.95,
                oversampling_factor: 256,
                interpolation: SincInterpolationType::Cubic,
                window: WindowFunction::BlackmanHarris2,
            },
            _ => SincInterpolationParameters {
                sinc_len: 64,
                f_cutoff: 0.91,
                oversampling_factor: 128,
                interpolation: SincInterpolationType::Linear,
                window: WindowFunction::BlackmanHarris2,
            },
        }
    }
}

enum Engine {
    Fast(FastFixedIn<f32>),
    Sinc(SincFixedIn<f32>),
}

macro_rules! with_engine {
    ($engine:expr, $r:ident => $body:expr) => {
        match $engine {
            Engine::Fast($r) => $body,
            Engine::Sinc($r) => $body,
        }
    };
}

/// Stateful multi-channel rate converter.
pub struct Resampler {
    engine: Engine,
    quality: ResampleQuality,
    ratio: f64,
    channels: usize,
    staging: Vec<Vec<f32>>,
    staged: usize,
    scratch: Vec<Vec<f32>>,
    delay: usize,
    delay_remaining: usize,
    consumed: u64,
    produced: u64,
}

impl Resampler {
    /// `ratio` is output rate over input rate.
    pub fn new(ratio: f64, quality: ResampleQuality, channels: usize) -> Result<Self> {
        let channels = channels.max(1);
        let mut engine = match quality {
            ResampleQuality::Fastest => Engine::Fast(FastFixedIn::<f32>::new(
                ratio,
                1.1,
                PolynomialDegree::Linear,
                RESAMPLE_CHUNK_FRAMES,
                channels,
            )?),
            ResampleQuality::Good | ResampleQuality::Best => Engine::Sinc(SincFixedIn::<f32>::new(
                ratio,
                1.1,
                quality.sinc_parameters(),
                RESAMPLE_CHUNK_FRAMES,
                channels,
            )?),
        };

        let out_max = with_engine!(&engine, r => r.output_frames_max());
        let mut scratch = vec![vec![0.0; out_max]; channels];
        let delay = measure_delay(&mut engine, ratio, &mut scratch)?;

        Ok(Self {
            engine,
            quality,
            ratio,
            channels,
            staging: vec![vec![0.0; RESAMPLE_CHUNK_FRAMES]; channels],
            staged: 0,
            scratch,
            delay,
            delay_remaining: delay,
            consumed: 0,
            produced: 0,
        })
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn quality(&self) -> ResampleQuality {
        self.quality
    }

    pub fn channel_count(&self) -> usize {
        self.channels
    }

    /// Output frames trimmed from the start of each run.
    pub fn delay(&self) -> usize {
        self.delay
    }

    /// Output frames expected for `input_frames` of input.
    pub fn expected_output(&self, input_frames: u64) -> u64 {
        (input_frames as f64 * self.ratio).ceil() as u64
    }

    /// Convert `frames` frames of `input`, appending to `output`.
    ///
    /// With `final_block` set the stream is flushed and the resampler is
    /// reset for the next run. Channels missing from `input` are silent.
    /// Returns frames appended.
    pub fn process(
        &mut self,
        input: &[Vec<f32>],
        frames: usize,
        output: &mut [Vec<f32>],
        final_block: bool,
    ) -> Result<usize> {
        let mut appended = 0;
        let mut offset = 0;
        self.consumed += frames as u64;

        while offset < frames {
            let take = (RESAMPLE_CHUNK_FRAMES - self.staged).min(frames - offset);
            for (ch, staging) in self.staging.iter_mut().enumerate() {
                let dest = &mut staging[self.staged..self.staged + take];
                match input.get(ch) {
                    Some(src) => dest.copy_from_slice(&src[offset..offset + take]),
                    None => dest.fill(0.0),
                }
            }
            self.staged += take;
            offset += take;

            if self.staged == RESAMPLE_CHUNK_FRAMES {
                appended += self.run_chunk(output)?;
            }
        }

        if final_block {
            appended += self.flush(output, appended)?;
        }
        Ok(appended)
    }

    fn flush(&mut self, output: &mut [Vec<f32>], appended_so_far: usize) -> Result<usize> {
        let target = self.expected_output(self.consumed);
        let mut appended = 0;

        if self.staged > 0 {
            for staging in &mut self.staging {
                staging[self.staged..].fill(0.0);
            }
            self.staged = RESAMPLE_CHUNK_FRAMES;
            appended += self.run_chunk(output)?;
        }

        let mut guard = 0;
        while self.produced < target && guard < MAX_FLUSH_CHUNKS {
            for staging in &mut self.staging {
                staging.fill(0.0);
            }
            self.staged = RESAMPLE_CHUNK_FRAMES;
            appended += self.run_chunk(output)?;
            guard += 1;
        }

        if self.produced > target {
            let excess = ((self.produced - target) as usize).min(appended + appended_so_far);
            for channel in output.iter_mut().take(self.channels) {
                let len = channel.len();
                channel.truncate(len - excess);
            }
            appended = appended.saturating_sub(excess);
            self.produced -= excess as u64;
        }

        let total_appended = appended;
        self.reset();
        Ok(total_appended)
    }

    fn run_chunk(&mut self, output: &mut [Vec<f32>]) -> Result<usize> {
        let (_, out_frames) = with_engine!(&mut self.engine, r => {
            r.process_into_buffer(&self.staging, &mut self.scratch, None)?
        });
        self.staged = 0;

        let skip = self.delay_remaining.min(out_frames);
        self.delay_remaining -= skip;
        let emitted = out_frames - skip;
        if emitted > 0 {
            for (ch, scratch) in self.scratch.iter().enumerate() {
                if let Some(dest) = output.get_mut(ch) {
                    dest.extend_from_slice(&scratch[skip..out_frames]);
                }
            }
            self.produced += emitted as u64;
        }
        Ok(emitted)
    }

    /// Discard filter state and staged input.
    pub fn reset(&mut self) {
        with_engine!(&mut self.engine, r => r.reset());
        self.staged = 0;
        self.delay_remaining = self.delay;
        self.consumed = 0;
        self.produced = 0;
    }
}

/// Output frames between an input impulse and its peak, beyond the ideal
/// `position * ratio`. The engine is reset afterwards.
///
/// The nominal `output_delay` of the sinc engines already includes an offset
/// they compensate for internally, so the response is measured instead.
fn measure_delay(engine: &mut Engine, ratio: f64, scratch: &mut [Vec<f32>]) -> Result<usize> {
    let impulse_at = RESAMPLE_CHUNK_FRAMES / 2;
    let mut input = vec![vec![0.0_f32; RESAMPLE_CHUNK_FRAMES]; scratch.len()];
    input[0][impulse_at] = 1.0;

    let mut response = Vec::new();
    for _ in 0..DELAY_MEASURE_CHUNKS {
        let (_, out_frames) = with_engine!(&mut *engine, r => {
            r.process_into_buffer(&input, &mut *scratch, None)?
        });
        response.extend_from_slice(&scratch[0][..out_frames]);
        input[0][impulse_at] = 0.0;
    }
    with_engine!(&mut *engine, r => r.reset());

    let (peak_at, _) = response
        .iter()
        .enumerate()
        .fold((0, 0.0_f32), |best, (i, s)| {
            if s.abs() > best.1 {
                (i, s.abs())
            } else {
                best
            }
        });
    let ideal = (impulse_at as f64 * ratio).round() as usize;
    Ok(peak_at.saturating_sub(ideal))
}

impl std::fmt::Debug for Resampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resampler")
            .field("quality", &self.quality)
            .field("ratio", &self.ratio)
            .field("channels", &self.channels)
            .finish()
    }
}
