use std::{fs, io};
use std::path::Path;

use cpal::{BufferSize, SampleRate, StreamConfig};

use crate::config::ConfigError::{InvalidConfig, LoadConfigError};
use crate::{CHANNELS, SAMPLE_RATE};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Frames per audio period. Streams are opened with a fixed buffer of this size.
    pub period_frames: usize,
    /// Capacity reserved for every new take, so capture doesn't reallocate on the audio thread
    /// until a take runs longer than this.
    pub reserve_seconds: f32,
    /// Capacity reserved for the layer and redo stacks.
    pub max_layers: usize,
    /// Size of the capture ring between the input and output callbacks, in periods.
    pub input_queue_periods: usize,
    pub command_queue_capacity: usize,
    /// Index into [`crate::list_devices`]. `None` uses the host defaults.
    pub device: Option<usize>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    IoError(#[from] io::Error),

    #[error("failed to deserialize engine config: {message}")]
    LoadConfigError {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("invalid engine config: {0}")]
    InvalidConfig(&'static str),
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            period_frames: 256,
            reserve_seconds: 30.0,
            max_layers: 32,
            input_queue_periods: 8,
            command_queue_capacity: 64,
            device: None,
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let serialized = fs::read_to_string(path)?;
        Self::from_json(&serialized)
    }

    pub fn from_json(serialized: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(serialized)
            .map_err(|e| {
                LoadConfigError {
                    message: e.to_string(),
                    line: e.line(),
                    column: e.column(),
                }
            })?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.period_frames == 0 {
            return Err(InvalidConfig("period_frames must be greater than zero"));
        }

        if self.command_queue_capacity == 0 {
            return Err(InvalidConfig("command_queue_capacity must be greater than zero"));
        }

        if !self.reserve_seconds.is_finite() || self.reserve_seconds < 0.0 {
            return Err(InvalidConfig("reserve_seconds must be a non-negative number"));
        }

        Ok(())
    }

    pub fn reserve_frames(&self) -> usize {
        (SAMPLE_RATE as f32 * self.reserve_seconds) as usize
    }

    pub fn input_queue_frames(&self) -> usize {
        self.period_frames * self.input_queue_periods.max(1)
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            channels: CHANNELS,
            sample_rate: SampleRate(SAMPLE_RATE),
            buffer_size: BufferSize::Fixed(self.period_frames as u32),
        }
    }
}
