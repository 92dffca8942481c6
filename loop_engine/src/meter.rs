use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Root-mean-square of one period. Zero for an empty slice.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Latest input level, shared between the audio thread (writer) and any number of readers.
///
/// Stored as `f32` bits in an atomic; each value is overwritten by the next period.
#[derive(Debug, Clone, Default)]
pub struct LevelMeter {
    bits: Arc<AtomicU32>,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, level: f32) {
        self.bits.store(level.to_bits(), Ordering::Relaxed);
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }
}
