use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Host, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use rtrb::{Producer, RingBuffer};

use crate::{
    export_wav, Command, ConfigError, EngineConfig, ExportError, ExportReport, Layer, LevelMeter,
    Looper, Mode, Player, PlayerError,
};

/// Frames copied per lock when snapshotting layers.
const SNAPSHOT_CHUNK: usize = 4096;

/// Chunked snapshots restarted because the layer set changed underneath them, before falling
/// back to a single copy under the lock.
const SNAPSHOT_ATTEMPTS: usize = 3;

/// Index of a device in the order reported by [`list_devices`].
pub type DeviceId = usize;

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("no audio device with id {0}")]
    DeviceNotFound(DeviceId),

    #[error("no default {0} device available")]
    NoDefaultDevice(&'static str),

    #[error("failed to enumerate audio devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query device config: {0}")]
    DeviceConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to open audio stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("unsupported sample format: {0:?}")]
    UnsupportedSampleFormat(SampleFormat),

    #[error(transparent)]
    Player(#[from] PlayerError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("command queue is full, dropped {0:?}")]
    CommandQueueFull(Command),

    #[error("audio streams are running")]
    Streaming,

    #[error("looper state has been poisoned")]
    Poisoned,
}

/// Lists the default host's devices as `(id, name)` pairs.
pub fn list_devices() -> Result<Vec<(DeviceId, String)>, EngineError> {
    let host = cpal::default_host();
    let devices = host.devices()?
        .enumerate()
        .map(|(id, device)| {
            let name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
            (id, name)
        })
        .collect();

    Ok(devices)
}

struct Streams {
    output: Stream,
    input: Stream,
    commands: Producer<Command>,
}

/// Owned looper engine: the control surface a host talks to.
///
/// While streams are running, transport and undo/redo requests are queued to the audio thread and
/// take effect at the start of its next period. Otherwise they are applied immediately.
pub struct Engine {
    streams: Option<Streams>,
    config: EngineConfig,
    device: Option<DeviceId>,
    looper: Arc<Mutex<Looper>>,
    level: LevelMeter,
    missed: Arc<AtomicUsize>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let level = LevelMeter::new();
        let looper = Looper::new(&config, level.clone());

        Ok(Engine {
            streams: None,
            device: config.device,
            config,
            looper: Arc::new(Mutex::new(looper)),
            level,
            missed: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Selects the device used by the next [`Engine::start`]. Ignored while streaming.
    pub fn set_device_id(&mut self, id: DeviceId) {
        if self.is_streaming() {
            tracing::warn!(id, "device selection ignored while streaming");
            return;
        }

        tracing::debug!(id, "device selected");
        self.device = Some(id);
    }

    pub fn device_id(&self) -> Option<DeviceId> {
        self.device
    }

    pub fn is_streaming(&self) -> bool {
        self.streams.is_some()
    }

    /// Opens the output and input streams at 48 kHz mono with a fixed period and starts them.
    ///
    /// On any failure both streams are closed again and the engine can be started later.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.is_streaming() {
            tracing::warn!("engine already streaming");
            return Ok(());
        }

        let host = cpal::default_host();
        let (output_device, input_device) = self.devices(&host)?;
        let config = self.config.stream_config();

        let (input_tx, input_rx) = RingBuffer::new(self.config.input_queue_frames());
        let (command_tx, command_rx) = RingBuffer::new(self.config.command_queue_capacity);
        let player = Player::new(self.looper.clone(), &config, command_rx, input_rx, self.missed.clone())?;

        let output = build_output(&output_device, &config, player)?;
        let input = build_input(&input_device, &config, input_tx)?;
        output.play()?;
        input.play()?;

        tracing::info!(
            device = ?self.device,
            period_frames = self.config.period_frames,
            "audio streams started"
        );

        self.streams = Some(Streams {
            output,
            input,
            commands: command_tx,
        });

        Ok(())
    }

    /// Halts both streams, then drops every layer and the redo history, rewinds the playhead and
    /// returns to idle.
    pub fn stop(&mut self) {
        if let Some(streams) = self.streams.take() {
            drop(streams.output);
            drop(streams.input);
            tracing::info!("audio streams stopped");
        }

        self.looper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
    }

    pub fn set_mode(&mut self, mode: Mode) -> Result<(), EngineError> {
        tracing::debug!(?mode, "transport change requested");
        self.dispatch(Command::SetMode(mode))
    }

    pub fn undo(&mut self) -> Result<(), EngineError> {
        self.dispatch(Command::Undo)
    }

    pub fn redo(&mut self) -> Result<(), EngineError> {
        self.dispatch(Command::Redo)
    }

    /// RMS of the most recent input period.
    pub fn level(&self) -> f32 {
        self.level.load()
    }

    /// A cloneable reader of the input level that can be moved to another thread.
    pub fn level_meter(&self) -> LevelMeter {
        self.level.clone()
    }

    /// Periods played as silence because the looper was locked by the control thread.
    pub fn missed_periods(&self) -> usize {
        self.missed.load(Ordering::Relaxed)
    }

    /// Mode as last applied. Requests still queued for the audio thread are not reflected.
    pub fn mode(&self) -> Result<Mode, EngineError> {
        Ok(self.lock_looper()?.mode())
    }

    /// Copies of the active layers, taken a chunk at a time so the audio thread is never locked
    /// out for more than one short copy.
    pub fn snapshot(&self) -> Result<Vec<Layer>, EngineError> {
        for _ in 0..SNAPSHOT_ATTEMPTS {
            if let Some(layers) = self.snapshot_in_chunks()? {
                return Ok(layers);
            }
        }

        tracing::debug!("layers kept changing, snapshotting under one lock");
        Ok(self.lock_looper()?.snapshot())
    }

    /// `None` if undo, redo or a new take changed the layer set mid-copy. Takes still being
    /// recorded are copied up to the length they had when the copy began.
    fn snapshot_in_chunks(&self) -> Result<Option<Vec<Layer>>, EngineError> {
        let (generation, lengths) = self.lock_looper()?.layout();
        let mut layers = Vec::with_capacity(lengths.len());

        for (index, len) in lengths.into_iter().enumerate() {
            let mut data = Vec::with_capacity(len);
            let mut start = 0;
            while start < len {
                let end = (start + SNAPSHOT_CHUNK).min(len);
                let copied = self.lock_looper()?.copy_layer_range(generation, index, start..end, &mut data);
                if !copied {
                    return Ok(None);
                }
                start = end;
            }
            layers.push(Layer::from(data));
        }

        Ok(Some(layers))
    }

    /// Mixes the current layers down to a wav file at `path`.
    pub fn export_to_file(&self, path: impl AsRef<Path>) -> Result<ExportReport, EngineError> {
        let path = path.as_ref();
        let layers = self.snapshot()?;

        match export_wav(&layers, path) {
            Ok(report) => {
                tracing::info!(path = %path.display(), frames = report.frames, peak = report.peak, "loop exported");
                Ok(report)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "export failed");
                Err(e.into())
            }
        }
    }

    /// Runs the looper by hand for one block while no streams are open, e.g. to render a loop
    /// without audio hardware.
    pub fn render_offline(&self, input: &[f32], output: &mut [f32]) -> Result<(), EngineError> {
        if self.is_streaming() {
            return Err(EngineError::Streaming);
        }

        self.lock_looper()?.process_block(input, output);
        Ok(())
    }

    fn dispatch(&mut self, command: Command) -> Result<(), EngineError> {
        if let Some(streams) = self.streams.as_mut() {
            return streams.commands.push(command).map_err(|_| {
                tracing::warn!(?command, "command queue full");
                EngineError::CommandQueueFull(command)
            });
        }

        self.lock_looper()?.apply(command);
        Ok(())
    }

    fn devices(&self, host: &Host) -> Result<(Device, Device), EngineError> {
        match self.device {
            Some(id) => Ok((device_by_id(host, id)?, device_by_id(host, id)?)),
            None => {
                let output = host.default_output_device().ok_or(EngineError::NoDefaultDevice("output"))?;
                let input = host.default_input_device().ok_or(EngineError::NoDefaultDevice("input"))?;
                Ok((output, input))
            }
        }
    }

    fn lock_looper(&self) -> Result<MutexGuard<'_, Looper>, EngineError> {
        self.looper
            .lock()
            .map_err(|_| EngineError::Poisoned)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Quiesce the callbacks before the looper can go away.
        self.streams.take();
    }
}

fn device_by_id(host: &Host, id: DeviceId) -> Result<Device, EngineError> {
    host.devices()?
        .nth(id)
        .ok_or(EngineError::DeviceNotFound(id))
}

fn build_output(device: &Device, config: &StreamConfig, player: Player) -> Result<Stream, EngineError> {
    match device.default_output_config()?.sample_format() {
        SampleFormat::F32 => output_stream::<f32>(device, config, player),
        SampleFormat::I16 => output_stream::<i16>(device, config, player),
        SampleFormat::U16 => output_stream::<u16>(device, config, player),
        other => Err(EngineError::UnsupportedSampleFormat(other)),
    }
}

fn output_stream<T>(device: &Device, config: &StreamConfig, mut player: Player) -> Result<Stream, EngineError>
    where
        T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| player.write_next_block(data, channels),
        |err| tracing::error!("output stream error: {}", err),
        None,
    )?;

    Ok(stream)
}

fn build_input(device: &Device, config: &StreamConfig, input: Producer<f32>) -> Result<Stream, EngineError> {
    match device.default_input_config()?.sample_format() {
        SampleFormat::F32 => input_stream::<f32>(device, config, input),
        SampleFormat::I16 => input_stream::<i16>(device, config, input),
        SampleFormat::U16 => input_stream::<u16>(device, config, input),
        other => Err(EngineError::UnsupportedSampleFormat(other)),
    }
}

fn input_stream<T>(device: &Device, config: &StreamConfig, mut input: Producer<f32>) -> Result<Stream, EngineError>
    where
        T: SizedSample,
        f32: FromSample<T>,
{
    let channels = (config.channels as usize).max(1);
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            // first channel only; a full ring drops the rest of the block
            for frame in data.chunks(channels) {
                if input.push(frame[0].to_sample::<f32>()).is_err() {
                    break;
                }
            }
        },
        |err| tracing::error!("input stream error: {}", err),
        None,
    )?;

    Ok(stream)
}
