use serde::{Deserialize, Serialize};

use crate::types::MaskBuffers;

/// How many pixels the annotator marked, split by class
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DrawStats {
    pub total: usize,
    pub class_counts: Vec<usize>,
}

impl DrawStats {
    /// Count user-marked pixels. Classes outside `0..class_count` only add to
    /// `total`.
    pub fn compute(buffers: &MaskBuffers, class_count: usize) -> Self {
        let mut class_counts = vec![0; class_count];
        let mut total = 0;
        for (&flag, &class) in buffers.user().iter().zip(buffers.mask()) {
            if flag == 0 {
                continue;
            }
            total += 1;
            if let Some(count) = class_counts.get_mut(class as usize) {
                *count += 1;
            }
        }
        Self {
            total,
            class_counts,
        }
    }

    /// Share of the marked pixels that belong to `class`, 0 when nothing is marked
    pub fn fraction(&self, class: usize) -> f64 {
        match (self.total, self.class_counts.get(class)) {
            (0, _) | (_, None) => 0.0,
            (total, Some(&count)) => count as f64 / total as f64,
        }
    }
}
