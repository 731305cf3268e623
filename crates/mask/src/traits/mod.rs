use iris_common::MaskShape;

/// A single mutation of the (mask, user-edit) buffer pair.
///
/// Implementations receive slices of exactly `shape.len()` bytes and report
/// whether any byte changed; unchanged edits never create history entries.
pub trait MaskEdit: Send + Sync {
    /// Apply the edit in place
    fn apply(&self, shape: MaskShape, mask: &mut [u8], user: &mut [u8]) -> bool;

    /// Short human-readable label, used in logs
    fn label(&self) -> &'static str;
}

impl<T: MaskEdit + ?Sized> MaskEdit for Box<T> {
    fn apply(&self, shape: MaskShape, mask: &mut [u8], user: &mut [u8]) -> bool {
        (**self).apply(shape, mask, user)
    }

    fn label(&self) -> &'static str {
        (**self).label()
    }
}
