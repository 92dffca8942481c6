mod layer;
mod loop_store;
mod transport;
mod looper;
mod meter;
mod player;
mod engine;
mod export;
mod config;
pub mod generator;

pub use layer::Layer;
pub use loop_store::LoopStore;
pub use transport::{Edge, Mode, Transport};
pub use looper::{Command, Looper};
pub use meter::{rms, LevelMeter};
pub use player::{Player, PlayerError};
pub use engine::{list_devices, DeviceId, Engine, EngineError};
pub use export::{export_wav, mixdown, normalize, quantize, ExportError, ExportReport};
pub use config::{ConfigError, EngineConfig};

pub type Time = usize;  // in samples

pub const SAMPLE_RATE: u32 = 48_000;
pub const CHANNELS: u16 = 1;

/// Adds every non-empty layer into `buf`, reading each one from `offset` and wrapping by its own
/// length. Nothing is cleared or clamped.
fn mix(sources: &[Layer], offset: Time, buf: &mut [f32]) {
    for source in sources {
        let data = source.samples();
        if data.is_empty() {
            continue;
        }

        let mut pos = offset % data.len();
        for out in buf.iter_mut() {
            *out += data[pos];
            pos += 1;
            if pos == data.len() {
                pos = 0;
            }
        }
    }
}
