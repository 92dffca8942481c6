use std::ops::Range;

use crate::{mix, rms, Edge, EngineConfig, Layer, LevelMeter, LoopStore, Mode, Time, Transport};

/// A control request, applied by the audio thread at the start of a period.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Command {
    SetMode(Mode),
    Undo,
    Redo,
}

/// The device-independent looper: loop store, transport, playhead and the per-period
/// capture/mix routine.
///
/// Nothing in [`Looper::process`] blocks. The only allocation on that path is a take growing past
/// its reserved capacity.
pub struct Looper {
    store: LoopStore,
    transport: Transport,
    playhead: Time,
    scratch: Vec<f32>,
    level: LevelMeter,
    reserve_frames: usize,
}

impl Looper {
    pub fn new(config: &EngineConfig, level: LevelMeter) -> Self {
        Self {
            store: LoopStore::with_capacity(config.max_layers),
            transport: Transport::new(),
            playhead: 0,
            scratch: vec![0.0; config.period_frames.max(1)],
            level,
            reserve_frames: config.reserve_frames(),
        }
    }

    pub fn apply(&mut self, command: Command) {
        match command {
            Command::SetMode(mode) => self.set_mode(mode),
            Command::Undo => {
                self.store.undo();
            }
            Command::Redo => {
                self.store.redo();
            }
        }
    }

    pub fn set_mode(&mut self, mode: Mode) {
        match self.transport.request(mode) {
            Edge::FreshLoop => {
                self.store.start_loop(self.reserve_frames);
                self.playhead = 0;
            }
            Edge::NewTake => {
                self.store.start_take(self.reserve_frames);
                self.playhead = 0;
            }
            Edge::ModeOnly => {}
        }
    }

    /// Full teardown: drops every layer and the redo history, rewinds and returns to idle.
    pub fn reset(&mut self) {
        self.store.clear();
        self.transport.reset();
        self.playhead = 0;
        self.level.store(0.0);
    }

    pub fn mode(&self) -> Mode {
        self.transport.mode()
    }

    pub fn playhead(&self) -> Time {
        self.playhead
    }

    pub fn store(&self) -> &LoopStore {
        &self.store
    }

    pub fn snapshot(&self) -> Vec<Layer> {
        self.store.layers().to_vec()
    }

    /// Generation of the layer set and the current length of each active layer.
    pub fn layout(&self) -> (u64, Vec<usize>) {
        let lengths = self.store.layers().iter().map(Layer::len).collect();
        (self.store.generation(), lengths)
    }

    /// Appends `range` of active layer `index` to `out`. Returns false, copying nothing, if the
    /// layer set has changed since `generation` or the range is not recorded.
    pub fn copy_layer_range(&self, generation: u64, index: usize, range: Range<usize>, out: &mut Vec<f32>) -> bool {
        if self.store.generation() != generation {
            return false;
        }

        match self.store.layers().get(index).and_then(|layer| layer.samples().get(range)) {
            Some(samples) => {
                out.extend_from_slice(samples);
                true
            }
            None => false,
        }
    }

    pub fn level(&self) -> f32 {
        self.level.load()
    }

    /// Processes one block of `output.len()` frames. `capture` fills the scratch buffer with that
    /// many input frames; anything it leaves untouched reads as silence.
    ///
    /// Blocks longer than the scratch buffer are handled as consecutive periods so the scratch
    /// buffer is never resized. An empty block is ignored.
    pub fn process(&mut self, output: &mut [f32], mut capture: impl FnMut(&mut [f32])) {
        let period = self.scratch.len();
        for chunk in output.chunks_mut(period) {
            self.process_period(chunk, &mut capture);
        }
    }

    /// Convenience for callers that already hold the input block. Missing input frames are
    /// treated as silence.
    pub fn process_block(&mut self, input: &[f32], output: &mut [f32]) {
        let mut consumed = 0;
        self.process(output, |scratch| {
            let start = consumed.min(input.len());
            let available = (input.len() - start).min(scratch.len());
            scratch[..available].copy_from_slice(&input[start..start + available]);
            consumed += scratch.len();
        });
    }

    fn process_period(&mut self, output: &mut [f32], capture: &mut impl FnMut(&mut [f32])) {
        let frames = output.len();
        if frames == 0 {
            return;
        }

        let input = &mut self.scratch[..frames];
        input.fill(0.0);
        capture(input);
        self.level.store(rms(input));

        let mode = self.transport.mode();
        if mode.is_capturing() {
            if let Some(layer) = self.store.open_layer_mut() {
                layer.append(input);
            }
        }

        output.fill(0.0);
        if !mode.is_audible() {
            return;
        }

        mix(self.store.layers(), self.playhead, output);

        if mode == Mode::Overdubbing {
            for (out, live) in output.iter_mut().zip(input.iter()) {
                *out += *live;
            }
        }

        if let Some(loop_len) = self.store.loop_len() {
            self.playhead = (self.playhead + frames) % loop_len;
        }
    }
}

#[cfg(test)]
mod test {
    use approx::assert_relative_eq;

    use super::*;

    const PERIOD: usize = 4;

    fn looper() -> Looper {
        let config = EngineConfig {
            period_frames: PERIOD,
            reserve_seconds: 0.0,
            ..EngineConfig::default()
        };
        Looper::new(&config, LevelMeter::new())
    }

    fn run(looper: &mut Looper, input: &[f32]) -> Vec<f32> {
        let mut output = vec![0.0; input.len()];
        looper.process_block(input, &mut output);
        output
    }

    #[test]
    fn test_idle_to_recording_always_leaves_one_layer() {
        let mut looper = looper();
        for _ in 0..3 {
            looper.set_mode(Mode::Recording);
            run(&mut looper, &[0.1; PERIOD]);
            looper.set_mode(Mode::Playing);
            looper.set_mode(Mode::Overdubbing);
            looper.set_mode(Mode::Idle);
            looper.set_mode(Mode::Recording);
            assert_eq!(looper.store().layers().len(), 1);
            assert!(looper.store().layers()[0].is_empty());
            assert_eq!(looper.playhead(), 0);
            looper.set_mode(Mode::Idle);
        }
    }

    #[test]
    fn test_playing_to_overdubbing_adds_exactly_one_layer() {
        let mut looper = looper();
        looper.set_mode(Mode::Recording);
        run(&mut looper, &[0.1; PERIOD]);
        for expected in 2..5 {
            looper.set_mode(Mode::Playing);
            run(&mut looper, &[0.0; PERIOD]);
            looper.set_mode(Mode::Overdubbing);
            assert_eq!(looper.store().layers().len(), expected);
            assert_eq!(looper.playhead(), 0);
            run(&mut looper, &[0.0; PERIOD]);
        }
    }

    #[test]
    fn test_other_transitions_touch_no_buffers() {
        let mut looper = looper();
        looper.set_mode(Mode::Recording);
        run(&mut looper, &[0.3; PERIOD]);
        looper.set_mode(Mode::Stopped);
        looper.set_mode(Mode::Playing);
        run(&mut looper, &[0.0; 3]);
        let playhead = looper.playhead();
        looper.set_mode(Mode::Stopped);
        looper.set_mode(Mode::Recording);
        assert_eq!(looper.store().layers().len(), 1);
        assert_eq!(looper.playhead(), playhead);
    }

    #[test]
    fn test_recording_appends_input_and_stays_silent() {
        let mut looper = looper();
        looper.set_mode(Mode::Recording);
        let output = run(&mut looper, &[0.5, -0.5, 0.25, -0.25]);
        assert_eq!(output, vec![0.0; PERIOD]);
        assert_eq!(looper.store().layers()[0].samples(), &[0.5f32, -0.5, 0.25, -0.25]);
        assert_eq!(looper.playhead(), 0);
    }

    #[test]
    fn test_level_is_rms_of_latest_period() {
        let mut looper = looper();
        run(&mut looper, &[0.8; PERIOD]);
        assert_relative_eq!(looper.level(), 0.8, epsilon = 1e-6);
        run(&mut looper, &[-0.2; PERIOD]);
        assert_relative_eq!(looper.level(), 0.2, epsilon = 1e-6);
    }

    #[test]
    fn test_playback_wraps_and_advances_playhead() {
        let mut looper = looper();
        looper.set_mode(Mode::Recording);
        run(&mut looper, &[1.0, 2.0, 3.0, 4.0]);
        run(&mut looper, &[5.0, 6.0]);
        looper.set_mode(Mode::Playing);

        let output = run(&mut looper, &[9.0; PERIOD]);
        assert_eq!(output, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(looper.playhead(), 4);

        let output = run(&mut looper, &[9.0; PERIOD]);
        assert_eq!(output, vec![5.0, 6.0, 1.0, 2.0]);
        assert_eq!(looper.playhead(), 2);
        assert_eq!(looper.store().layers()[0].len(), 6);
    }

    #[test]
    fn test_layers_wrap_by_their_own_length() {
        let mut looper = looper();
        looper.set_mode(Mode::Recording);
        run(&mut looper, &[1.0, 1.0, 1.0, 1.0]);
        looper.set_mode(Mode::Playing);
        run(&mut looper, &[0.0; PERIOD]);
        looper.set_mode(Mode::Overdubbing);
        run(&mut looper, &[0.5, 0.25]);
        looper.set_mode(Mode::Playing);

        // playhead is 2 after the two frame overdub; the take is two frames long
        let output = run(&mut looper, &[0.0; PERIOD]);
        assert_eq!(output, vec![1.5, 1.25, 1.5, 1.25]);
    }

    #[test]
    fn test_overdub_hears_layers_take_and_live_input() {
        let mut looper = looper();
        looper.set_mode(Mode::Recording);
        run(&mut looper, &[0.1, 0.2, 0.3, 0.4]);
        looper.set_mode(Mode::Playing);
        looper.set_mode(Mode::Overdubbing);

        let live = [0.01, 0.02, 0.03, 0.04];
        let output = run(&mut looper, &live);
        // layer A, the take B (which already holds this period), and the live input
        let expected = [0.1 + 0.01 + 0.01, 0.2 + 0.02 + 0.02, 0.3 + 0.03 + 0.03, 0.4 + 0.04 + 0.04];
        for (got, want) in output.iter().zip(expected) {
            assert_relative_eq!(*got, want, epsilon = 1e-6);
        }
        assert_eq!(looper.store().layers()[1].samples(), &live);
    }

    #[test]
    fn test_realtime_mix_is_not_clipped() {
        let mut looper = looper();
        looper.set_mode(Mode::Recording);
        run(&mut looper, &[0.9; PERIOD]);
        looper.set_mode(Mode::Playing);
        looper.set_mode(Mode::Overdubbing);
        let output = run(&mut looper, &[0.9; PERIOD]);
        assert!(output.iter().all(|s| *s > 1.0));
    }

    #[test]
    fn test_empty_layers_and_empty_store_are_silent() {
        let mut looper = looper();
        looper.set_mode(Mode::Playing);
        assert_eq!(run(&mut looper, &[0.5; PERIOD]), vec![0.0; PERIOD]);

        looper.set_mode(Mode::Idle);
        looper.set_mode(Mode::Recording);
        looper.set_mode(Mode::Playing);
        assert_eq!(run(&mut looper, &[0.5; PERIOD]), vec![0.0; PERIOD]);
        assert_eq!(looper.playhead(), 0);
    }

    #[test]
    fn test_empty_period_is_ignored() {
        let mut looper = looper();
        looper.set_mode(Mode::Recording);
        run(&mut looper, &[0.5; PERIOD]);
        let mut output: [f32; 0] = [];
        looper.process_block(&[], &mut output);
        assert_relative_eq!(looper.level(), 0.5, epsilon = 1e-6);
        assert_eq!(looper.store().layers()[0].len(), PERIOD);
    }

    #[test]
    fn test_long_blocks_are_split_into_periods() {
        let mut looper = looper();
        looper.set_mode(Mode::Recording);
        let input: Vec<f32> = (0..10).map(|i| i as f32).collect();
        run(&mut looper, &input);
        assert_eq!(looper.store().layers()[0].samples(), &input[..]);
        assert_eq!(looper.scratch.len(), PERIOD);
        // last chunk was two frames of 8.0 and 9.0
        assert_relative_eq!(looper.level(), ((64.0f32 + 81.0) / 2.0).sqrt(), epsilon = 1e-5);
    }

    #[test]
    fn test_short_input_reads_as_silence() {
        let mut looper = looper();
        looper.set_mode(Mode::Recording);
        let mut output = [0.0; PERIOD];
        looper.process_block(&[0.5, 0.5], &mut output);
        assert_eq!(looper.store().layers()[0].samples(), &[0.5f32, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_short_input_spanning_periods_reads_as_silence() {
        let mut looper = looper();
        looper.set_mode(Mode::Recording);
        let mut output = [0.0; PERIOD * 3];
        looper.process_block(&[0.5, 0.5], &mut output);
        let mut expected = vec![0.0f32; PERIOD * 3];
        expected[..2].copy_from_slice(&[0.5, 0.5]);
        assert_eq!(looper.store().layers()[0].samples(), &expected[..]);
    }

    #[test]
    fn test_copy_layer_range_follows_generation() {
        let mut looper = looper();
        looper.set_mode(Mode::Recording);
        run(&mut looper, &[1.0, 2.0, 3.0, 4.0]);
        let (generation, lengths) = looper.layout();
        assert_eq!(lengths, vec![4]);

        let mut out = Vec::new();
        assert!(looper.copy_layer_range(generation, 0, 1..3, &mut out));
        assert_eq!(out, vec![2.0, 3.0]);
        assert!(!looper.copy_layer_range(generation, 0, 3..6, &mut out));
        assert!(!looper.copy_layer_range(generation, 1, 0..1, &mut out));

        looper.apply(Command::Undo);
        assert!(!looper.copy_layer_range(generation, 0, 0..1, &mut out));
        assert_eq!(out, vec![2.0, 3.0]);
    }

    #[test]
    fn test_stopped_keeps_layers_and_playhead() {
        let mut looper = looper();
        looper.set_mode(Mode::Recording);
        run(&mut looper, &[0.2; 8]);
        looper.set_mode(Mode::Playing);
        run(&mut looper, &[0.0; 3]);
        looper.set_mode(Mode::Stopped);
        assert_eq!(run(&mut looper, &[0.7; PERIOD]), vec![0.0; PERIOD]);
        assert_eq!(looper.playhead(), 3);
        assert_eq!(looper.store().layers()[0].len(), 8);
    }

    #[test]
    fn test_undo_during_recording_redirects_capture() {
        // Legal but unusual: undo pops the take being captured into, and capture continues into
        // whichever layer is now on top.
        let mut looper = looper();
        looper.set_mode(Mode::Recording);
        run(&mut looper, &[0.1; PERIOD]);
        looper.set_mode(Mode::Playing);
        looper.set_mode(Mode::Overdubbing);
        run(&mut looper, &[0.2; PERIOD]);

        looper.apply(Command::Undo);
        run(&mut looper, &[0.3; PERIOD]);
        assert_eq!(looper.store().layers().len(), 1);
        assert_eq!(looper.store().layers()[0].len(), 2 * PERIOD);
        assert_eq!(looper.store().redo_history()[0].samples(), &[0.2f32; PERIOD]);

        looper.apply(Command::Undo);
        looper.set_mode(Mode::Recording);
        run(&mut looper, &[0.4; PERIOD]);
        assert!(looper.store().layers().is_empty());
    }

    #[test]
    fn test_redo_restores_layer_to_the_mix() {
        let mut looper = looper();
        looper.set_mode(Mode::Recording);
        run(&mut looper, &[0.1; PERIOD]);
        looper.set_mode(Mode::Playing);
        looper.set_mode(Mode::Overdubbing);
        run(&mut looper, &[0.2; PERIOD]);
        looper.set_mode(Mode::Playing);

        looper.apply(Command::Undo);
        let output = run(&mut looper, &[0.0; PERIOD]);
        assert_relative_eq!(output[0], 0.1, epsilon = 1e-6);

        looper.apply(Command::Redo);
        let output = run(&mut looper, &[0.0; PERIOD]);
        assert_relative_eq!(output[0], 0.3, epsilon = 1e-6);
    }

    #[test]
    fn test_reset_tears_everything_down() {
        let mut looper = looper();
        looper.set_mode(Mode::Recording);
        run(&mut looper, &[0.5; 6]);
        looper.set_mode(Mode::Playing);
        run(&mut looper, &[0.5; 3]);
        looper.apply(Command::Undo);
        looper.reset();
        assert_eq!(looper.mode(), Mode::Idle);
        assert_eq!(looper.playhead(), 0);
        assert!(looper.store().layers().is_empty());
        assert!(looper.store().redo_history().is_empty());
        assert_eq!(looper.level(), 0.0);
    }
}
