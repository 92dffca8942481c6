use dasp::{signal, Signal};

use crate::generator::Generator;
use crate::SAMPLE_RATE;

pub struct SineGenerator {
    osc: signal::Sine<signal::ConstHz>,
    amplitude: f32,
}

impl SineGenerator {
    pub fn new(sample_rate: u32, hz: f64, amplitude: f32) -> Self {
        Self {
            osc: signal::rate(sample_rate as f64).const_hz(hz).sine(),
            amplitude,
        }
    }
}

impl Default for SineGenerator {
    fn default() -> Self {
        Self::new(SAMPLE_RATE, 440.0, 0.5)
    }
}

impl Generator for SineGenerator {
    fn next(&mut self) -> f32 {
        self.osc.next() as f32 * self.amplitude
    }
}
