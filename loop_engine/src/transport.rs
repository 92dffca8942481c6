/// Transport mode. The single source of truth for which loop store mutations are legal.
#[repr(u8)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Idle,
    Recording,
    Playing,
    Overdubbing,
    Stopped,
}

impl Mode {
    /// Input is appended to the open layer.
    pub fn is_capturing(self) -> bool {
        matches!(self, Mode::Recording | Mode::Overdubbing)
    }

    /// Layers are mixed into the output and the playhead advances.
    pub fn is_audible(self) -> bool {
        matches!(self, Mode::Playing | Mode::Overdubbing)
    }
}

/// Structural effect of a transition on the loop store.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Edge {
    /// Only the mode flag changes.
    ModeOnly,
    /// Idle -> Recording: clear everything and open the first take.
    FreshLoop,
    /// Playing -> Overdubbing: open a new take on top of the existing layers.
    NewTake,
}

#[derive(Debug, Default, Clone)]
pub struct Transport {
    mode: Mode,
}

impl Transport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Moves to `to` and reports what the caller has to do to the loop store. Every transition is
    /// accepted; only two of them touch any buffers.
    pub fn request(&mut self, to: Mode) -> Edge {
        let edge = match (self.mode, to) {
            (Mode::Idle, Mode::Recording) => Edge::FreshLoop,
            (Mode::Playing, Mode::Overdubbing) => Edge::NewTake,
            _ => Edge::ModeOnly,
        };

        self.mode = to;
        edge
    }

    pub fn reset(&mut self) {
        self.mode = Mode::Idle;
    }
}
