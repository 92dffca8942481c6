use loop_engine::{Engine, EngineError, Mode};

/// The four gestures of the single looper button.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Gesture {
    Tap,
    Hold,
    DoubleTap,
    DoubleTapHold,
}

/// What the controller needs from an engine.
pub trait LoopControl {
    type Error;

    fn start(&mut self) -> Result<(), Self::Error>;
    fn stop(&mut self);
    fn set_mode(&mut self, mode: Mode) -> Result<(), Self::Error>;
    fn undo(&mut self) -> Result<(), Self::Error>;
}

impl LoopControl for Engine {
    type Error = EngineError;

    fn start(&mut self) -> Result<(), EngineError> {
        Engine::start(self)
    }

    fn stop(&mut self) {
        Engine::stop(self)
    }

    fn set_mode(&mut self, mode: Mode) -> Result<(), EngineError> {
        Engine::set_mode(self, mode)
    }

    fn undo(&mut self) -> Result<(), EngineError> {
        Engine::undo(self)
    }
}

/// Maps button gestures onto transport requests, tracking the mode it last asked for.
pub struct LoopController<C> {
    control: C,
    mode: Mode,
}

impl<C: LoopControl> LoopController<C> {
    pub fn new(control: C) -> Self {
        Self {
            control,
            mode: Mode::Idle,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    pub fn control_mut(&mut self) -> &mut C {
        &mut self.control
    }

    pub fn on_gesture(&mut self, gesture: Gesture) -> Result<(), C::Error> {
        match gesture {
            Gesture::Tap => self.on_tap(),
            Gesture::Hold => self.on_hold(),
            Gesture::DoubleTap => self.on_double_tap(),
            Gesture::DoubleTapHold => self.on_double_tap_hold(),
        }
    }

    fn on_tap(&mut self) -> Result<(), C::Error> {
        match self.mode {
            Mode::Idle => {
                self.control.start()?;
                self.transition(Mode::Recording)
            }
            Mode::Recording => self.transition(Mode::Playing),
            Mode::Playing => self.transition(Mode::Overdubbing),
            Mode::Overdubbing => self.transition(Mode::Playing),
            Mode::Stopped => self.transition(Mode::Playing),
        }
    }

    fn on_hold(&mut self) -> Result<(), C::Error> {
        match self.mode {
            Mode::Playing | Mode::Overdubbing => self.control.undo(),
            Mode::Stopped => {
                self.delete_all();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn on_double_tap(&mut self) -> Result<(), C::Error> {
        match self.mode {
            Mode::Playing | Mode::Overdubbing => self.transition(Mode::Stopped),
            _ => Ok(()),
        }
    }

    fn on_double_tap_hold(&mut self) -> Result<(), C::Error> {
        if matches!(self.mode, Mode::Playing | Mode::Overdubbing) {
            self.delete_all();
        }

        Ok(())
    }

    /// Stopping the engine is a full teardown, which already leaves it idle.
    fn delete_all(&mut self) {
        self.control.stop();
        self.mode = Mode::Idle;
    }

    fn transition(&mut self, mode: Mode) -> Result<(), C::Error> {
        self.control.set_mode(mode)?;
        self.mode = mode;
        Ok(())
    }
}
