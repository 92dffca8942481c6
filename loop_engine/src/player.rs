use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use cpal::{BufferSize, StreamConfig};
use rtrb::Consumer;

use crate::player::PlayerError::InvalidBufferSize;
use crate::{Command, Looper};

/// Output side of the audio path. Owns the consuming ends of the command and capture rings and
/// drives the looper once per period from the output callback.
pub struct Player {
    looper: Arc<Mutex<Looper>>,
    commands: Consumer<Command>,
    input: Consumer<f32>,
    missed: Arc<AtomicUsize>,
    buffer: Vec<f32>,  // one period of the mono mix
}

#[derive(thiserror::Error, Debug)]
pub enum PlayerError {
    #[error("invalid buffer size (expected a non-zero BufferSize::Fixed): {0:?}")]
    InvalidBufferSize(BufferSize),
}

impl Player {
    pub fn new(
        looper: Arc<Mutex<Looper>>,
        config: &StreamConfig,
        commands: Consumer<Command>,
        input: Consumer<f32>,
        missed: Arc<AtomicUsize>,
    ) -> Result<Self, PlayerError> {
        let buffer = match config.buffer_size {
            BufferSize::Fixed(frame_count) if frame_count > 0 => vec![0.0; frame_count as usize],
            other => return Err(InvalidBufferSize(other)),
        };

        Ok(Player {
            looper,
            commands,
            input,
            missed,
            buffer,
        })
    }

    /// Fills one device buffer. Pending commands are applied before the period is processed, so
    /// the whole period sees the new mode and layer set together.
    ///
    /// If the looper is locked by the control thread the period is played as silence, its input
    /// is discarded and the miss is counted.
    pub fn write_next_block<T>(&mut self, output: &mut [T], channels: usize)
        where
            T: cpal::Sample + cpal::FromSample<f32>,
    {
        let channels = channels.max(1);

        // Hosts don't always honour the fixed buffer size.
        for block in output.chunks_mut(self.buffer.len() * channels) {
            let frames = block.len() / channels;
            let mix = &mut self.buffer[..frames];

            match self.looper.try_lock() {
                Ok(mut looper) => {
                    while let Ok(command) = self.commands.pop() {
                        looper.apply(command);
                    }

                    let input = &mut self.input;
                    looper.process(mix, |scratch| {
                        for sample in scratch.iter_mut() {
                            match input.pop() {
                                Ok(value) => *sample = value,
                                Err(_) => break,
                            }
                        }
                    });
                }
                Err(_) => {
                    mix.fill(0.0);
                    for _ in 0..frames {
                        if self.input.pop().is_err() {
                            break;
                        }
                    }
                    self.missed.fetch_add(1, Ordering::Relaxed);
                }
            }

            for (frame, value) in block.chunks_mut(channels).zip(mix.iter()) {
                let value: T = T::from_sample(*value);

                for sample in frame.iter_mut() {
                    *sample = value;
                }
            }
        }
    }
}
