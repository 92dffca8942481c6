use crate::Layer;

/// Active layers plus the layers removed by undo, used as two stacks.
///
/// The store exclusively owns every layer buffer. A layer is only ever in one of the two stacks.
/// Layers are append-only; `generation` changes whenever the set of active layers does.
#[derive(Debug, Default, Clone)]
pub struct LoopStore {
    layers: Vec<Layer>,
    redo_history: Vec<Layer>,
    generation: u64,
}

impl LoopStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-reserves room for `max_layers` in both stacks so undo and redo don't reallocate.
    pub fn with_capacity(max_layers: usize) -> Self {
        Self {
            layers: Vec::with_capacity(max_layers),
            redo_history: Vec::with_capacity(max_layers),
            generation: 0,
        }
    }

    /// Drops all layers and the redo history, then opens a single fresh take.
    pub fn start_loop(&mut self, reserve_frames: usize) {
        self.clear();
        self.layers.push(Layer::with_capacity(reserve_frames));
    }

    /// Opens a new take on top of the existing layers. The redo history no longer applies once
    /// the timeline forks, so it is dropped.
    pub fn start_take(&mut self, reserve_frames: usize) {
        self.redo_history.clear();
        self.layers.push(Layer::with_capacity(reserve_frames));
        self.bump();
    }

    /// The layer currently being captured into, if any.
    pub fn open_layer_mut(&mut self) -> Option<&mut Layer> {
        self.layers.last_mut()
    }

    pub fn undo(&mut self) -> bool {
        match self.layers.pop() {
            Some(layer) => {
                self.redo_history.push(layer);
                self.bump();
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.redo_history.pop() {
            Some(layer) => {
                self.layers.push(layer);
                self.bump();
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.layers.clear();
        self.redo_history.clear();
        self.bump();
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn bump(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn redo_history(&self) -> &[Layer] {
        &self.redo_history
    }

    /// Length of the first layer, which governs playhead wrap and export length. `None` while
    /// there is no first layer or it is still empty.
    pub fn loop_len(&self) -> Option<usize> {
        self.layers.first()
            .map(Layer::len)
            .filter(|len| *len > 0)
    }
}
