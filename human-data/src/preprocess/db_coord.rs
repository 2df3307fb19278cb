//! Dataset joint coordinates under augmentation.

use super::augmentation::AugmentationState;
use crate::{common::*, config::ModelConfig, keypoint::JointSet};
use nalgebra::Vector3;

/// Joint annotations of one sample together with its augmentation state.
#[derive(Debug, Clone, Copy)]
pub struct DbCoordInput<'a> {
    /// `(N, 3)` joints as pixel `x`, pixel `y` and depth bin.
    pub joint_img: ArrayView2<'a, f32>,
    /// `(N, 3)` root-relative camera-space joints.
    pub joint_cam: ArrayView2<'a, f32>,
    /// `(N)` joint validity.
    pub joint_valid: ArrayView1<'a, f32>,
    pub state: &'a AugmentationState,
    /// The shape of the original image.
    pub image_shape: HW<usize>,
    pub src_joints: &'a JointSet,
    pub dst_joints: &'a JointSet,
}

/// Heatmap-space joints indexed by the destination joint set.
#[derive(Debug, Clone, PartialEq)]
pub struct DbCoordOutput {
    /// `(M, 3)` heatmap-space joints.
    pub joint_img: Array2<f32>,
    /// `(M, 3)` camera-space joints after flip and rotation.
    pub joint_cam: Array2<f32>,
    /// `(M)` joint validity.
    pub joint_valid: Array1<f32>,
    /// `(M)` flags of valid joints that stay inside the heatmap volume.
    pub joint_trunc: Array1<f32>,
}

/// Transforms dataset joints into heatmap space.
pub trait DbCoordProcessor
where
    Self: Debug + Send + Sync,
{
    fn process(&self, input: DbCoordInput<'_>) -> Result<DbCoordOutput>;
}

/// Sends joints through the patch affine transform and rescales them to heatmap resolution.
#[derive(Debug, Clone)]
pub struct AffineDbCoord {
    heatmap_scale: [f32; 2],
    heatmap_volume: [f32; 3],
}

impl AffineDbCoord {
    pub fn new(model: &ModelConfig) -> Self {
        let [depth, hm_h, hm_w] = model.output_hm_shape.map(|size| size as f32);
        Self {
            heatmap_scale: model.heatmap_scale(),
            heatmap_volume: [hm_w, hm_h, depth],
        }
    }
}

impl DbCoordProcessor for AffineDbCoord {
    fn process(&self, input: DbCoordInput<'_>) -> Result<DbCoordOutput> {
        let DbCoordInput {
            joint_img,
            joint_cam,
            joint_valid,
            state,
            image_shape,
            src_joints,
            dst_joints,
        } = input;
        let num_joints = src_joints.num_joints();
        ensure!(
            joint_img.dim() == (num_joints, 3)
                && joint_cam.dim() == (num_joints, 3)
                && joint_valid.len() == num_joints,
            "joint arrays do not match the {} joints of the source joint set",
            num_joints
        );

        let mut joint_img = joint_img.to_owned();
        let mut joint_cam = joint_cam.to_owned();
        let mut joint_valid = joint_valid.to_owned();
        // joints without a positive x are unannotated and never count as inside the crop
        let mut annotated: Array1<f32> = joint_img.column(0).mapv(|x| (x > 0.0) as u8 as f32);

        if state.do_flip {
            let img_w = image_shape.w() as f32;
            joint_cam.column_mut(0).mapv_inplace(|x| -x);
            joint_img.column_mut(0).mapv_inplace(|x| img_w - 1.0 - x);

            src_joints.flip_pairs().iter().for_each(|&(lhs, rhs)| {
                swap_rows(&mut joint_img, lhs, rhs);
                swap_rows(&mut joint_cam, lhs, rhs);
                joint_valid.swap(lhs, rhs);
                annotated.swap(lhs, rhs);
            });
        }

        // undo the in-plane image rotation in camera space
        let rotation = state.camera_rotation::<f32>();
        joint_cam.outer_iter_mut().for_each(|mut joint| {
            let rotated = rotation * Vector3::new(joint[0], joint[1], joint[2]);
            joint
                .iter_mut()
                .zip(rotated.iter())
                .for_each(|(dst, &src)| *dst = src);
        });

        let [scale_x, scale_y] = self.heatmap_scale;
        let trans = state.img2bb_trans.scale_output(scale_x, scale_y);
        joint_img.outer_iter_mut().for_each(|mut joint| {
            let [x, y] = trans.apply([joint[0], joint[1]]);
            joint[0] = x;
            joint[1] = y;
        });

        let [hm_w, hm_h, hm_d] = self.heatmap_volume;
        let joint_trunc: Array1<f32> = izip!(joint_img.outer_iter(), &joint_valid, &annotated)
            .map(|(joint, &valid, &annotated)| {
                let inside = (0.0..hm_w).contains(&joint[0])
                    && (0.0..hm_h).contains(&joint[1])
                    && (0.0..hm_d).contains(&joint[2]);
                valid * annotated * inside as u8 as f32
            })
            .collect();

        let output = DbCoordOutput {
            joint_img,
            joint_cam,
            joint_valid,
            joint_trunc,
        };

        if src_joints.names() == dst_joints.names() {
            Ok(output)
        } else {
            Ok(reindex_output(output, src_joints, dst_joints))
        }
    }
}

fn swap_rows(array: &mut Array2<f32>, lhs: usize, rhs: usize) {
    let lhs_row = array.row(lhs).to_owned();
    let rhs_row = array.row(rhs).to_owned();
    array.row_mut(lhs).assign(&rhs_row);
    array.row_mut(rhs).assign(&lhs_row);
}

/// Move every joint to its slot in the destination set by name. Unmatched slots stay zero.
fn reindex_output(output: DbCoordOutput, src_joints: &JointSet, dst_joints: &JointSet) -> DbCoordOutput {
    let num_dst = dst_joints.num_joints();
    let mut joint_img = Array2::zeros((num_dst, 3));
    let mut joint_cam = Array2::zeros((num_dst, 3));
    let mut joint_valid = Array1::zeros(num_dst);
    let mut joint_trunc = Array1::zeros(num_dst);

    src_joints
        .names()
        .iter()
        .enumerate()
        .filter_map(|(src_idx, name)| Some((src_idx, dst_joints.index_of(name)?)))
        .for_each(|(src_idx, dst_idx)| {
            joint_img.row_mut(dst_idx).assign(&output.joint_img.row(src_idx));
            joint_cam.row_mut(dst_idx).assign(&output.joint_cam.row(src_idx));
            joint_valid[dst_idx] = output.joint_valid[src_idx];
            joint_trunc[dst_idx] = output.joint_trunc[src_idx];
        });

    DbCoordOutput {
        joint_img,
        joint_cam,
        joint_valid,
        joint_trunc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypoint::{SMPLX_JOINT_SET, SMPLX_POSE_JOINT_SET};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn model_config() -> ModelConfig {
        ModelConfig {
            input_img_shape: [64, 48],
            output_hm_shape: [8, 8, 6],
            ..ModelConfig::default()
        }
    }

    fn identity_state(do_flip: bool, rot: f32) -> AugmentationState {
        AugmentationState {
            img2bb_trans: Affine::identity(),
            bb2img_trans: Affine::identity(),
            rot,
            do_flip,
        }
    }

    #[test]
    fn scale_to_heatmap_and_truncate() {
        let joints = &*SMPLX_JOINT_SET;
        let num_joints = joints.num_joints();
        let mut joint_img = Array2::zeros((num_joints, 3));
        joint_img.row_mut(0).assign(&array![16.0, 32.0, 4.0]);
        // outside the input patch
        joint_img.row_mut(1).assign(&array![60.0, 32.0, 4.0]);
        // depth beyond the heatmap volume
        joint_img.row_mut(2).assign(&array![16.0, 32.0, 8.0]);
        let joint_cam = Array2::zeros((num_joints, 3));
        let joint_valid = Array1::ones(num_joints);
        let state = identity_state(false, 0.0);

        let output = AffineDbCoord::new(&model_config())
            .process(DbCoordInput {
                joint_img: joint_img.view(),
                joint_cam: joint_cam.view(),
                joint_valid: joint_valid.view(),
                state: &state,
                image_shape: HW::from_hw([64, 48]),
                src_joints: joints,
                dst_joints: joints,
            })
            .unwrap();

        assert_eq!(output.joint_img.row(0).to_vec(), vec![2.0, 4.0, 4.0]);
        assert_eq!(output.joint_trunc[0], 1.0);
        assert_eq!(output.joint_trunc[1], 0.0);
        assert_eq!(output.joint_trunc[2], 0.0);
        // unannotated joints sit at x = 0
        assert_eq!(output.joint_trunc[3], 0.0);
        assert_eq!(output.joint_valid.sum(), num_joints as f32);
    }

    #[test]
    fn flip_swaps_pairs_and_rotates_camera() {
        let joints = &*SMPLX_JOINT_SET;
        let num_joints = joints.num_joints();
        let l_hip = joints.index_of("L_Hip").unwrap();
        let r_hip = joints.index_of("R_Hip").unwrap();

        let mut joint_img = Array2::zeros((num_joints, 3));
        joint_img.row_mut(l_hip).assign(&array![10.0, 5.0, 1.0]);
        let mut joint_cam = Array2::zeros((num_joints, 3));
        joint_cam.row_mut(l_hip).assign(&array![0.2, 0.0, 0.5]);
        let mut joint_valid = Array1::ones(num_joints);
        joint_valid[r_hip] = 0.0;
        let state = identity_state(true, 90.0);

        let output = AffineDbCoord::new(&ModelConfig {
            input_img_shape: [64, 48],
            output_hm_shape: [8, 64, 48],
            ..ModelConfig::default()
        })
        .process(DbCoordInput {
            joint_img: joint_img.view(),
            joint_cam: joint_cam.view(),
            joint_valid: joint_valid.view(),
            state: &state,
            image_shape: HW::from_hw([64, 48]),
            src_joints: joints,
            dst_joints: joints,
        })
        .unwrap();

        // the left hip annotation now describes the right hip of the mirrored image
        assert_eq!(output.joint_img.row(r_hip).to_vec(), vec![37.0, 5.0, 1.0]);
        assert_eq!(output.joint_valid[l_hip], 0.0);
        assert_eq!(output.joint_valid[r_hip], 1.0);
        assert_eq!(output.joint_trunc[r_hip], 1.0);
        // x is negated to -0.2, then rotated by -90 degrees about z
        assert_abs_diff_eq!(output.joint_cam[[r_hip, 0]], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(output.joint_cam[[r_hip, 1]], 0.2, epsilon = 1e-6);
        assert_abs_diff_eq!(output.joint_cam[[r_hip, 2]], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn camera_rotation_keeps_depth_and_length() {
        let joints = &*SMPLX_JOINT_SET;
        let num_joints = joints.num_joints();
        let joint_img = Array2::zeros((num_joints, 3));
        let mut joint_cam = Array2::zeros((num_joints, 3));
        joint_cam.row_mut(1).assign(&array![0.3, 0.4, -0.7]);
        let joint_valid = Array1::ones(num_joints);
        let state = identity_state(false, 30.0);

        let output = AffineDbCoord::new(&model_config())
            .process(DbCoordInput {
                joint_img: joint_img.view(),
                joint_cam: joint_cam.view(),
                joint_valid: joint_valid.view(),
                state: &state,
                image_shape: HW::from_hw([64, 48]),
                src_joints: joints,
                dst_joints: joints,
            })
            .unwrap();

        let (sn, cs) = (-30f32).to_radians().sin_cos();
        assert_abs_diff_eq!(output.joint_cam[[1, 0]], cs * 0.3 - sn * 0.4, epsilon = 1e-6);
        assert_abs_diff_eq!(output.joint_cam[[1, 1]], sn * 0.3 + cs * 0.4, epsilon = 1e-6);
        assert_abs_diff_eq!(output.joint_cam[[1, 2]], -0.7, epsilon = 1e-6);
        let length = output.joint_cam.row(1).mapv(|v| v * v).sum().sqrt();
        assert_abs_diff_eq!(length, 0.5f32.hypot(0.7), epsilon = 1e-6);
    }

    #[test]
    fn reindex_by_name() {
        let src = &*SMPLX_POSE_JOINT_SET;
        let dst = &*SMPLX_JOINT_SET;
        let num_src = src.num_joints();
        let joint_img = Array2::from_shape_fn((num_src, 3), |(j, c)| if c == 2 { 0.0 } else { j as f32 + 1.0 });
        let joint_cam = Array2::zeros((num_src, 3));
        let joint_valid = Array1::ones(num_src);
        let state = identity_state(false, 0.0);

        let output = AffineDbCoord::new(&ModelConfig {
            input_img_shape: [64, 48],
            output_hm_shape: [8, 64, 48],
            ..ModelConfig::default()
        })
        .process(DbCoordInput {
            joint_img: joint_img.view(),
            joint_cam: joint_cam.view(),
            joint_valid: joint_valid.view(),
            state: &state,
            image_shape: HW::from_hw([64, 48]),
            src_joints: src,
            dst_joints: dst,
        })
        .unwrap();

        assert_eq!(output.joint_img.nrows(), dst.num_joints());
        let src_wrist = src.index_of("L_Wrist").unwrap();
        let dst_wrist = dst.index_of("L_Wrist").unwrap();
        assert_eq!(output.joint_img[[dst_wrist, 0]], src_wrist as f32 + 1.0);
        assert_eq!(output.joint_valid[dst_wrist], 1.0);
        // face landmarks have no counterpart in the source set
        let face = dst.index_of("Face_1").unwrap();
        assert_eq!(output.joint_valid[face], 0.0);
        assert_eq!(output.joint_img.row(face).sum(), 0.0);
    }
}
