//! # Segmentation Mask Editing Library
//!
//! Client-side model of a per-pixel segmentation mask: the binary wire
//! codec, bounded undo/redo, trait-based edits and overlay rendering.
//!
//! ## Core Features
//!
//! - **Wire codec**: sentinel-wrapped `[mask][user-edit]` payloads
//! - **History**: linear undo/redo capped at 30 snapshots
//! - **Trait-based edits**: implement [`MaskEdit`] for custom tools
//! - **Rendering**: class palettes, display modes and PNG export
//!
//! ## Quick Start
//!
//! ```rust
//! use iris_common::MaskShape;
//! use mask::{BrushStroke, MaskEditor, PixelPoint, codec};
//!
//! let shape = MaskShape::new(4, 4)?;
//! let mut editor = MaskEditor::new(shape, None, 3)?;
//! editor.commit(&BrushStroke::new(vec![PixelPoint::new(1, 1)], 2));
//!
//! let payload = editor.encode();
//! let restored = codec::decode_for_shape(&payload, shape).expect("valid mask");
//! assert_eq!(restored.mask(), editor.buffers().mask());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod codec;
pub mod command;
pub mod edits;
pub mod editor;
pub mod error;
pub mod history;
pub mod render;
pub mod stats;
pub mod traits;
pub mod types;
pub mod viewport;

pub use command::EditCommand;
pub use edits::{BrushStroke, EraserStroke, PixelPoint, PredictionMerge, ResetMask};
pub use editor::MaskEditor;
pub use error::{MaskError, Result};
pub use history::{DEFAULT_HISTORY_CAPACITY, History};
pub use render::{ClassPalette, DisplayMode, ViewFilters, render_overlay};
pub use stats::DrawStats;
pub use traits::MaskEdit;
pub use types::{MaskBuffers, PredictMaskPayload};
pub use viewport::Viewport;
