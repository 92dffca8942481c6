pub mod sine;

pub use sine::SineGenerator;

/// A mono signal source, used to stand in for a microphone when driving the looper offline.
pub trait Generator: Send {
    fn next(&mut self) -> f32;

    fn fill(&mut self, buf: &mut [f32]) {
        for sample in buf.iter_mut() {
            *sample = self.next();
        }
    }
}
