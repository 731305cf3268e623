use iris_common::MaskShape;
use tracing::{debug, info};

use crate::{
    codec,
    command::EditCommand,
    edits::{BrushStroke, EraserStroke, PredictionMerge},
    error::{MaskError, Result},
    history::{DEFAULT_HISTORY_CAPACITY, History},
    stats::DrawStats,
    traits::MaskEdit,
    types::{MaskBuffers, PredictMaskPayload},
};

/// Editing state for the mask of one image.
///
/// The live buffers are what the canvas shows. Strokes update them through
/// [`MaskEditor::apply`] while the pointer moves and become undoable once
/// [`MaskEditor::checkpoint`] is called on pointer release.
#[derive(Debug, Clone)]
pub struct MaskEditor {
    shape: MaskShape,
    live: MaskBuffers,
    history: History,
    class_count: usize,
    stats: DrawStats,
    dirty: bool,
    mask_available: bool,
    last_prediction: Option<Vec<u8>>,
}

impl MaskEditor {
    /// Start editing; without a saved mask both buffers are zero-filled
    pub fn new(shape: MaskShape, saved: Option<MaskBuffers>, class_count: usize) -> Result<Self> {
        Self::with_capacity(shape, saved, class_count, DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_capacity(
        shape: MaskShape,
        saved: Option<MaskBuffers>,
        class_count: usize,
        capacity: usize,
    ) -> Result<Self> {
        shape.validate()?;
        let mask_available = saved.is_some();
        let live = match saved {
            Some(buffers) if buffers.len() != shape.len() => {
                return Err(MaskError::ShapeMismatch {
                    expected: shape.len(),
                    actual: buffers.len(),
                });
            }
            Some(buffers) => buffers,
            None => MaskBuffers::zeroed(shape.len())?,
        };
        let stats = DrawStats::compute(&live, class_count);
        Ok(Self {
            shape,
            history: History::with_capacity(live.clone(), capacity),
            live,
            class_count,
            stats,
            dirty: false,
            mask_available,
            last_prediction: None,
        })
    }

    pub fn shape(&self) -> MaskShape {
        self.shape
    }

    pub fn buffers(&self) -> &MaskBuffers {
        &self.live
    }

    pub fn stats(&self) -> &DrawStats {
        &self.stats
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Unsaved changes exist
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// A saved mask was loaded or something has been drawn since
    pub fn mask_available(&self) -> bool {
        self.mask_available
    }

    /// Last prediction merged into this mask, used by the errors overlay
    pub fn last_prediction(&self) -> Option<&[u8]> {
        self.last_prediction.as_deref()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Mutate the live buffers without recording history
    pub fn apply(&mut self, edit: &dyn MaskEdit) -> bool {
        let (mask, user) = self.live.parts_mut();
        let changed = edit.apply(self.shape, mask, user);
        if changed {
            self.touch();
        }
        changed
    }

    /// Record the live buffers if they moved away from the history head
    pub fn checkpoint(&mut self) -> bool {
        if &self.live == self.history.current_ref() {
            return false;
        }
        self.history.push(self.live.clone());
        true
    }

    /// Apply an edit and record it as one undoable step
    pub fn commit(&mut self, edit: &dyn MaskEdit) -> bool {
        let changed = self.apply(edit);
        if changed {
            self.checkpoint();
            debug!(edit = edit.label(), entries = self.history.len(), "Committed edit");
        }
        changed
    }

    pub fn undo(&mut self) -> bool {
        match self.history.undo() {
            Some(buffers) => {
                self.replace_live(buffers);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo() {
            Some(buffers) => {
                self.replace_live(buffers);
                true
            }
            None => false,
        }
    }

    /// Clear everything as a new undoable entry
    pub fn reset(&mut self) {
        let buffers = self.history.reset();
        self.replace_live(buffers);
        self.mask_available = false;
    }

    /// Fill every unmarked pixel from a model prediction
    pub fn merge_prediction(&mut self, prediction: Vec<u8>) -> Result<bool> {
        let prediction = codec::decode_prediction(&prediction, self.shape)?;
        let changed = self.commit(&PredictionMerge::new(prediction.clone()));
        self.last_prediction = Some(prediction);
        info!(changed, "Merged prediction into mask");
        Ok(changed)
    }

    /// Body for the predict endpoint built from the live buffers
    pub fn predict_payload(&self) -> PredictMaskPayload {
        PredictMaskPayload::from_buffers(&self.live)
    }

    /// Wire payload for saving
    pub fn encode(&self) -> Vec<u8> {
        codec::encode(&self.live)
    }

    /// Call after the backend accepted the encoded mask
    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    /// Run a scripted command as one committed step
    pub fn execute(&mut self, command: &EditCommand) -> bool {
        match command {
            EditCommand::Paint {
                points,
                size,
                class,
            } => self.commit(&BrushStroke::new(points.clone(), *class).with_size(*size)),
            EditCommand::Erase { points, size } => {
                self.commit(&EraserStroke::new(points.clone()).with_size(*size))
            }
            EditCommand::Reset => {
                self.reset();
                true
            }
            EditCommand::Undo => self.undo(),
            EditCommand::Redo => self.redo(),
        }
    }

    fn replace_live(&mut self, buffers: MaskBuffers) {
        self.live = buffers;
        self.touch();
    }

    fn touch(&mut self) {
        self.dirty = true;
        self.mask_available = true;
        self.stats = DrawStats::compute(&self.live, self.class_count);
    }
}
