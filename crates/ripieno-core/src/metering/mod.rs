//! Output level and callback load metering.

mod cpu;
mod levels;

pub use cpu::{CpuMeter, CpuMetrics};
pub use levels::{peak, OutputLevels};
