//! Waveform-similarity overlap-add (WSOLA).
//!
//! Grains of ~40ms are cut from the input every `hop / factor` frames and
//! overlap-added every `hop` frames with a periodic Hann window. Each grain
//! start is nudged within a small tolerance to line up with the natural
//! continuation of the previous grain, which keeps the waveform coherent
//! and the pitch unchanged.
//!
//! All channels share the same grain positions (found on the channel sum)
//! so the stereo image does not wander.

use std::f32::consts::PI;

const GRAIN_MS: f64 = 40.0;

/// Upper bound on silent grains pushed through during a flush.
const MAX_FLUSH_GRAINS: usize = 256;

pub struct Wsola {
    channels: usize,
    frame: usize,
    hop: usize,
    tolerance: usize,
    window: Vec<f32>,
    factor: f64,

    input: Vec<Vec<f32>>,
    position: f64,
    continuation: Option<usize>,
    overlap: Vec<Vec<f32>>,
    reference: Vec<f32>,

    trim_remaining: usize,
    consumed: u64,
    produced: u64,
}

impl Wsola {
    pub fn new(channels: usize, sample_rate: u32, factor: f64) -> Self {
        let frame = (((sample_rate as f64 * GRAIN_MS / 1000.0) as usize).max(64)) & !1;
        let hop = frame / 2;

        let window = (0..frame)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / frame as f32).cos()))
            .collect();

        let channels = channels.max(1);
        let mut wsola = Self {
            channels,
            frame,
            hop,
            tolerance: frame / 8,
            window,
            factor,
            input: vec![Vec::new(); channels],
            position: 0.0,
            continuation: None,
            overlap: vec![vec![0.0; frame]; channels],
            reference: vec![0.0; hop],
            trim_remaining: 0,
            consumed: 0,
            produced: 0,
        };
        wsola.reset();
        wsola
    }

    pub fn channel_count(&self) -> usize {
        self.channels
    }

    pub fn frame_size(&self) -> usize {
        self.frame
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn set_factor(&mut self, factor: f64) {
        self.factor = factor;
    }

    /// Input frames held back before they can be emitted.
    pub fn latency(&self) -> usize {
        self.frame + self.tolerance
    }

    pub fn reset(&mut self) {
        // Half a grain of lead-in so the first emitted frame has full window
        // coverage, plus room to search backwards.
        let lead_in = self.hop + self.tolerance;
        for input in &mut self.input {
            input.clear();
            input.resize(lead_in, 0.0);
        }
        for overlap in &mut self.overlap {
            overlap.fill(0.0);
        }
        self.position = self.tolerance as f64;
        self.continuation = None;
        self.trim_remaining = self.hop;
        self.consumed = 0;
        self.produced = 0;
    }

    /// Stretch `frames` frames of `input`, appending to `output`.
    pub fn process(&mut self, input: &[Vec<f32>], frames: usize, output: &mut [Vec<f32>]) -> usize {
        for (ch, buffer) in self.input.iter_mut().enumerate() {
            match input.get(ch) {
                Some(src) => buffer.extend_from_slice(&src[..frames]),
                None => buffer.resize(buffer.len() + frames, 0.0),
            }
        }
        self.consumed += frames as u64;
        self.run(output)
    }

    /// Emit everything still held so the total output matches
    /// `consumed * factor`, then reset.
    pub fn flush(&mut self, output: &mut [Vec<f32>]) -> usize {
        let target = (self.consumed as f64 * self.factor).round() as u64;
        let mut appended = 0;
        let mut guard = 0;

        while self.produced < target && guard < MAX_FLUSH_GRAINS {
            for buffer in &mut self.input {
                buffer.resize(buffer.len() + self.hop, 0.0);
            }
            appended += self.run(output);
            guard += 1;
        }

        if self.produced > target {
            let excess = ((self.produced - target) as usize).min(appended);
            for channel in output.iter_mut().take(self.channels) {
                let len = channel.len();
                channel.truncate(len - excess);
            }
            appended -= excess;
        }

        self.reset();
        appended
    }

    fn run(&mut self, output: &mut [Vec<f32>]) -> usize {
        let mut appended = 0;

        loop {
            let ideal = self.position.round() as usize;
            let natural = self.continuation;
            let needed = (ideal + self.tolerance).max(natural.unwrap_or(0)) + self.frame;
            if available_len(&self.input) < needed {
                break;
            }

            let start = match natural {
                Some(natural) if natural != ideal => self.best_start(ideal, natural),
                _ => ideal,
            };

            self.add_grain(start);
            appended += self.emit(output);

            self.continuation = Some(start + self.hop);
            self.position += self.hop as f64 / self.factor;
            self.compact();
        }
        appended
    }

    /// Grain start within `ideal ± tolerance` most similar to `natural`.
    fn best_start(&mut self, ideal: usize, natural: usize) -> usize {
        for (i, value) in self.reference.iter_mut().enumerate() {
            *value = self.input.iter().map(|ch| ch[natural + i]).sum();
        }
        let reference_energy: f32 = self.reference.iter().step_by(2).map(|v| v * v).sum();

        let mut best = ideal;
        let mut best_score = f32::NEG_INFINITY;
        let lo = ideal.saturating_sub(self.tolerance);
        for candidate in lo..=ideal + self.tolerance {
            let mut dot = 0.0_f32;
            let mut energy = 0.0_f32;
            for i in (0..self.hop).step_by(2) {
                let sample: f32 = self.input.iter().map(|ch| ch[candidate + i]).sum();
                dot += sample * self.reference[i];
                energy += sample * sample;
            }
            let score = dot / (energy * reference_energy + 1e-9).sqrt();
            if score > best_score {
                best_score = score;
                best = candidate;
            }
        }
        best
    }

    fn add_grain(&mut self, start: usize) {
        for (overlap, input) in self.overlap.iter_mut().zip(&self.input) {
            let grain = &input[start..start + self.frame];
            for ((acc, &sample), &w) in overlap.iter_mut().zip(grain).zip(&self.window) {
                *acc += sample * w;
            }
        }
    }

    fn emit(&mut self, output: &mut [Vec<f32>]) -> usize {
        let skip = self.trim_remaining.min(self.hop);
        self.trim_remaining -= skip;

        for (ch, overlap) in self.overlap.iter_mut().enumerate() {
            if let Some(dest) = output.get_mut(ch) {
                dest.extend_from_slice(&overlap[skip..self.hop]);
            }
            overlap.copy_within(self.hop.., 0);
            let tail = self.frame - self.hop;
            overlap[tail..].fill(0.0);
        }

        let emitted = self.hop - skip;
        self.produced += emitted as u64;
        emitted
    }

    fn compact(&mut self) {
        let reachable = (self.position.floor() as usize).saturating_sub(self.tolerance);
        let drop = self.continuation.map_or(reachable, |c| reachable.min(c));
        if drop == 0 {
            return;
        }
        for input in &mut self.input {
            input.drain(..drop);
        }
        self.position -= drop as f64;
        self.continuation = self.continuation.map(|c| c - drop);
    }
}

fn available_len(input: &[Vec<f32>]) -> usize {
    input.iter().map(Vec::len).min().unwrap_or(0)
}
