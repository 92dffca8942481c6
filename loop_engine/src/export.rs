use std::io;
use std::path::Path;

use crate::{mix, Layer, CHANNELS, SAMPLE_RATE};

const SPEC: hound::WavSpec = hound::WavSpec {
    channels: CHANNELS,
    sample_rate: SAMPLE_RATE,
    bits_per_sample: 16,
    sample_format: hound::SampleFormat::Int,
};

#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error("nothing to export: the loop has no recorded audio")]
    NothingToExport,

    #[error(transparent)]
    IoError(#[from] io::Error),

    #[error("failed to encode wav: {source}")]
    WavError {
        source: hound::Error,
    },
}

impl From<hound::Error> for ExportError {
    fn from(e: hound::Error) -> Self {
        match e {
            hound::Error::IoError(io_error) => ExportError::IoError(io_error),
            source => ExportError::WavError { source },
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ExportReport {
    /// Frames written, equal to the first layer's length.
    pub frames: usize,
    /// Peak absolute value of the mixdown before normalization.
    pub peak: f32,
}

impl ExportReport {
    pub fn normalized(&self) -> bool {
        self.peak > 1.0
    }
}

/// Sums every layer over the first layer's length, each one wrapping by its own length. `None`
/// when there are no layers or the first one is empty.
pub fn mixdown(layers: &[Layer]) -> Option<Vec<f32>> {
    let len = layers.first().map(Layer::len).filter(|len| *len > 0)?;
    let mut buf = vec![0.0f32; len];
    mix(layers, 0, &mut buf);
    Some(buf)
}

/// Scales the buffer down by its peak if the peak exceeds 1.0. Returns the peak found.
pub fn normalize(samples: &mut [f32]) -> f32 {
    let peak = samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs()));
    if peak > 1.0 {
        for sample in samples.iter_mut() {
            *sample /= peak;
        }
    }

    peak
}

/// Clamps to [-1, 1], scales by `i16::MAX` and truncates toward zero.
pub fn quantize(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Mixes, normalizes and writes the layers as a 48 kHz mono 16-bit PCM wav file.
///
/// Nothing is written when there is nothing to export. A failed write can leave a partial file
/// behind.
pub fn export_wav(layers: &[Layer], path: impl AsRef<Path>) -> Result<ExportReport, ExportError> {
    let mut samples = mixdown(layers).ok_or(ExportError::NothingToExport)?;
    let peak = normalize(&mut samples);

    let mut writer = hound::WavWriter::create(path, SPEC)?;
    for sample in &samples {
        writer.write_sample(quantize(*sample))?;
    }
    writer.finalize()?;

    Ok(ExportReport {
        frames: samples.len(),
        peak,
    })
}
