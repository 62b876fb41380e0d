//! Backend selection and output configuration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which audio backend [`create_target`](crate::create_target) should open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetBackend {
    /// First hardware backend that opens.
    #[default]
    Auto,
    /// CPAL (CoreAudio, WASAPI, ALSA, JACK, ...).
    Cpal,
    /// No device; blocks are pulled by the caller.
    Manual,
}

impl TargetBackend {
    pub fn name(&self) -> &'static str {
        match self {
            TargetBackend::Auto => "auto",
            TargetBackend::Cpal => "cpal",
            TargetBackend::Manual => "manual",
        }
    }
}

impl fmt::Display for TargetBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TargetBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(TargetBackend::Auto),
            "cpal" => Ok(TargetBackend::Cpal),
            "manual" | "null" | "none" => Ok(TargetBackend::Manual),
            other => Err(Error::UnknownBackend(other.to_string())),
        }
    }
}

/// Configuration passed to the backend factory at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub backend: TargetBackend,
    /// Output device index as listed by the backend (`None` = default device).
    pub output_device_index: Option<usize>,
    /// Requested hardware block size in frames.
    pub block_size: Option<usize>,
    /// Sample rate for the manual backend (hardware backends use the device rate).
    pub sample_rate: u32,
    pub output_gain: f32,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            backend: TargetBackend::Auto,
            output_device_index: None,
            block_size: None,
            sample_rate: 44100,
            output_gain: 1.0,
        }
    }
}

impl TargetConfig {
    pub const DEFAULT_BLOCK_SIZE: usize = 1024;

    pub fn manual(sample_rate: u32, block_size: usize) -> Self {
        Self {
            backend: TargetBackend::Manual,
            block_size: Some(block_size),
            sample_rate,
            ..Default::default()
        }
    }

    pub fn block_size_or_default(&self) -> usize {
        self.block_size.unwrap_or(Self::DEFAULT_BLOCK_SIZE)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(block) = self.block_size {
            if block == 0 || block > 1 << 16 {
                return Err(Error::InvalidConfig(format!(
                    "block_size {} out of range (1-65536 frames)",
                    block
                )));
            }
        }
        if !(8000..=384000).contains(&self.sample_rate) {
            return Err(Error::InvalidConfig(format!(
                "sample_rate {} out of range (8000-384000 Hz)",
                self.sample_rate
            )));
        }
        if !self.output_gain.is_finite() || self.output_gain < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "output_gain {} must be a non-negative number",
                self.output_gain
            )));
        }
        Ok(())
    }
}
