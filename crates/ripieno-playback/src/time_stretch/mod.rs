//! Constant-pitch time stretching.
//!
//! [`TimeStretcher`] wraps a multi-channel [`Wsola`] and an optional mono
//! fast path that stretches the channel average once and copies it to every
//! channel.

mod wsola;

pub use wsola::Wsola;

/// Shortest allowed stretch (4x speed).
pub const MIN_STRETCH: f64 = 0.25;
/// Longest allowed stretch (quarter speed).
pub const MAX_STRETCH: f64 = 4.0;

/// Clamp a requested factor to the supported range. Non-finite values map
/// to 1.0.
pub fn clamp_factor(factor: f64) -> f64 {
    if factor.is_finite() {
        factor.clamp(MIN_STRETCH, MAX_STRETCH)
    } else {
        1.0
    }
}

/// Stretches blocks by `factor` (output length over input length).
pub struct TimeStretcher {
    channels: usize,
    mono: bool,
    multi: Wsola,
    single: Wsola,
    mono_in: Vec<f32>,
    mono_out: Vec<Vec<f32>>,
}

impl TimeStretcher {
    pub fn new(channels: usize, sample_rate: u32, factor: f64) -> Self {
        let channels = channels.max(1);
        let factor = clamp_factor(factor);
        Self {
            channels,
            mono: false,
            multi: Wsola::new(channels, sample_rate, factor),
            single: Wsola::new(1, sample_rate, factor),
            mono_in: Vec::new(),
            mono_out: vec![Vec::new()],
        }
    }

    pub fn factor(&self) -> f64 {
        self.multi.factor()
    }

    pub fn set_factor(&mut self, factor: f64) {
        let factor = clamp_factor(factor);
        self.multi.set_factor(factor);
        self.single.set_factor(factor);
    }

    pub fn is_mono(&self) -> bool {
        self.mono
    }

    /// Switch between per-channel and combined mono processing. Resets.
    pub fn set_mono(&mut self, mono: bool) {
        if self.mono != mono {
            self.mono = mono;
            self.reset();
        }
    }

    pub fn latency(&self) -> usize {
        self.multi.latency()
    }

    pub fn reset(&mut self) {
        self.multi.reset();
        self.single.reset();
    }

    /// Stretch `frames` frames of `input`, appending to `output`.
    pub fn process(&mut self, input: &[Vec<f32>], frames: usize, output: &mut [Vec<f32>]) -> usize {
        if !self.mono || self.channels == 1 {
            return self.multi.process(input, frames, output);
        }

        self.mono_in.clear();
        let scale = 1.0 / input.len().max(1) as f32;
        self.mono_in.extend((0..frames).map(|i| {
            input.iter().map(|ch| ch[i]).sum::<f32>() * scale
        }));
        self.mono_out[0].clear();
        let produced = self
            .single
            .process(std::slice::from_ref(&self.mono_in), frames, &mut self.mono_out);
        self.spread(output);
        produced
    }

    /// Emit the retained tail and reset.
    pub fn flush(&mut self, output: &mut [Vec<f32>]) -> usize {
        if !self.mono || self.channels == 1 {
            return self.multi.flush(output);
        }
        self.mono_out[0].clear();
        let produced = self.single.flush(&mut self.mono_out);
        self.spread(output);
        produced
    }

    fn spread(&self, output: &mut [Vec<f32>]) {
        for dest in output.iter_mut().take(self.channels) {
            dest.extend_from_slice(&self.mono_out[0]);
        }
    }
}
