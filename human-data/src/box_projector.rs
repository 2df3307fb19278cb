//! Hand and face boxes in heatmap space.

use crate::{common::*, config::ModelConfig, preprocess::AugmentationState};

/// A heatmap-space box with its validity flag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedBox {
    pub rect: XYXY<f32>,
    /// The box geometry carries no meaning unless this is set.
    pub valid: bool,
}

impl ProjectedBox {
    /// The placeholder of an absent box, corners `(0, 0)` and `(1, 1)`.
    pub fn dummy() -> Self {
        Self {
            rect: XYXY::from_xyxy([0.0, 0.0, 1.0, 1.0]),
            valid: false,
        }
    }

    /// The `[x, y]` box center.
    pub fn center(&self) -> [f32; 2] {
        self.rect.center()
    }

    /// The `[w, h]` box size.
    pub fn size(&self) -> [f32; 2] {
        self.rect.size()
    }

    pub fn valid_flag(&self) -> f32 {
        self.valid as u8 as f32
    }
}

/// The projected hand and face boxes of one sample, keyed by anatomical side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartBoxes {
    pub lhand: ProjectedBox,
    pub rhand: ProjectedBox,
    pub face: ProjectedBox,
}

/// Projects pixel-space part boxes through the augmentation of a sample.
#[derive(Debug, Clone)]
pub struct BoxProjector {
    image_shape: HW<usize>,
    heatmap_scale: [f32; 2],
}

impl BoxProjector {
    pub fn new(image_shape: HW<usize>, model: &ModelConfig) -> Self {
        Self {
            image_shape,
            heatmap_scale: model.heatmap_scale(),
        }
    }

    /// Project one box. The result is axis-aligned even if the transform rotates.
    pub fn project(&self, bbox: Option<&XYXY<f32>>, state: &AugmentationState) -> ProjectedBox {
        let bbox = match bbox {
            Some(bbox) => bbox,
            None => return ProjectedBox::dummy(),
        };

        let bbox = if state.do_flip {
            bbox.flip_horizontal(self.image_shape.w() as f32)
        } else {
            *bbox
        };

        let [scale_x, scale_y] = self.heatmap_scale;
        let trans = state.img2bb_trans.scale_output(scale_x, scale_y);

        ProjectedBox {
            rect: bbox.transform(&trans),
            valid: true,
        }
    }

    /// Project the hand and face boxes, swapping the hands if the sample is flipped.
    pub fn project_parts(
        &self,
        lhand: Option<&XYXY<f32>>,
        rhand: Option<&XYXY<f32>>,
        face: Option<&XYXY<f32>>,
        state: &AugmentationState,
    ) -> PartBoxes {
        let lhand_box = self.project(lhand, state);
        let rhand_box = self.project(rhand, state);
        let face = self.project(face, state);

        let (lhand, rhand) = if state.do_flip {
            (rhand_box, lhand_box)
        } else {
            (lhand_box, rhand_box)
        };

        PartBoxes { lhand, rhand, face }
    }
}
