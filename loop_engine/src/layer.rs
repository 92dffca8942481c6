/// One recorded take: a growable chunk of single channel, f32 audio.
///
/// Samples are stored exactly as captured. Nothing is clamped until export.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Layer {
    data: Vec<f32>,
}

impl Layer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty layer that can take `frames` samples before it has to grow.
    pub fn with_capacity(frames: usize) -> Self {
        Self {
            data: Vec::with_capacity(frames),
        }
    }

    pub fn append(&mut self, samples: &[f32]) {
        self.data.extend_from_slice(samples);
    }

    pub fn samples(&self) -> &[f32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }
}

impl From<Vec<f32>> for Layer {
    fn from(data: Vec<f32>) -> Self {
        Self { data }
    }
}
