//! Body model parameters under augmentation.

use super::augmentation::AugmentationState;
use crate::{
    common::*,
    keypoint::{JointSet, NUM_JOINTS, NUM_POSE_JOINTS, SMPLX_POSE_JOINT_SET},
    record::BodyModelParams,
};
use nalgebra::{UnitQuaternion, Vector3};

/// The number of shape coefficients fed to the body model.
pub const NUM_SHAPE_PARAMS: usize = 10;

/// The number of expression coefficients fed to the body model.
pub const NUM_EXPR_PARAMS: usize = 10;

/// Pinhole camera intrinsics of a dataset with known calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraParams {
    pub focal: [f32; 2],
    pub princpt: [f32; 2],
}

/// The body model family of the parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Smplx,
}

#[derive(Debug, Clone, Copy)]
pub struct HumanModelInput<'a> {
    pub params: &'a BodyModelParams,
    pub camera: Option<&'a CameraParams>,
    pub state: &'a AugmentationState,
    pub image_shape: HW<usize>,
    pub kind: ModelKind,
}

/// Body model targets of one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct HumanModelOutput {
    /// `(137, 3)` heatmap-space model joints.
    pub joint_img: Array2<f32>,
    /// `(137, 3)` root-relative camera-space model joints.
    pub joint_cam: Array2<f32>,
    /// `(137)` flags of model joints inside the heatmap volume.
    pub joint_trunc: Array1<f32>,
    /// `(53 * 3)` axis-angle pose after augmentation.
    pub pose: Array1<f32>,
    pub shape: Array1<f32>,
    pub expr: Array1<f32>,
    /// `(53)` per-joint pose validity.
    pub pose_valid: Array1<f32>,
    /// `(137)` model joint validity.
    pub joint_valid: Array1<f32>,
    pub expr_valid: bool,
    /// The mesh in the original camera space, if the processor regresses meshes.
    pub mesh_cam_orig: Option<Array2<f32>>,
}

/// Derives body model targets consistent with the augmentation of a sample.
pub trait HumanModelProcessor
where
    Self: Debug + Send + Sync,
{
    fn process(&self, input: HumanModelInput<'_>) -> Result<HumanModelOutput>;
}

/// Augments the pose parameters without regressing a mesh.
///
/// Model joints are reported as invalid since they require the body model assets.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParamOnlyHumanModel;

impl HumanModelProcessor for ParamOnlyHumanModel {
    fn process(&self, input: HumanModelInput<'_>) -> Result<HumanModelOutput> {
        let HumanModelInput {
            params,
            state,
            kind: ModelKind::Smplx,
            ..
        } = input;

        let mut pose = assemble_pose(params)?;
        if state.do_flip {
            flip_pose(&mut pose, &SMPLX_POSE_JOINT_SET);
        }
        rotate_root(&mut pose, SMPLX_POSE_JOINT_SET.root_joint_idx(), state);

        let (expr, expr_valid) = match &params.expression {
            Some(expr) => (fit_len(expr.view(), NUM_EXPR_PARAMS), true),
            None => (Array1::zeros(NUM_EXPR_PARAMS), false),
        };

        Ok(HumanModelOutput {
            joint_img: Array2::zeros((NUM_JOINTS, 3)),
            joint_cam: Array2::zeros((NUM_JOINTS, 3)),
            joint_trunc: Array1::zeros(NUM_JOINTS),
            pose: Array1::from_iter(pose.iter().copied()),
            shape: fit_len(params.shape.view(), NUM_SHAPE_PARAMS),
            expr,
            pose_valid: Array1::ones(NUM_POSE_JOINTS),
            joint_valid: Array1::zeros(NUM_JOINTS),
            expr_valid,
            mesh_cam_orig: None,
        })
    }
}

/// Stack the pose parameters into `(53, 3)`: root, body, left hand, right hand, jaw.
fn assemble_pose(params: &BodyModelParams) -> Result<Array2<f32>> {
    let parts = [
        ("root_pose", &params.root_pose, 1),
        ("body_pose", &params.body_pose, 21),
        ("left_hand_pose", &params.left_hand_pose, 15),
        ("right_hand_pose", &params.right_hand_pose, 15),
        ("jaw_pose", &params.jaw_pose, 1),
    ];
    let values: Vec<f32> = parts
        .iter()
        .map(|(name, values, num_joints)| -> Result<_> {
            ensure!(
                values.len() == num_joints * 3,
                "'{}' has {} values, expect {}",
                name,
                values.len(),
                num_joints * 3
            );
            Ok(values.iter().copied())
        })
        .flatten_ok()
        .try_collect()?;
    let pose = Array2::from_shape_vec((NUM_POSE_JOINTS, 3), values)?;
    Ok(pose)
}

/// Mirror the axis-angle rotations and swap left and right joints.
fn flip_pose(pose: &mut Array2<f32>, joints: &JointSet) {
    joints.flip_pairs().iter().for_each(|&(lhs, rhs)| {
        let lhs_row = pose.row(lhs).to_owned();
        let rhs_row = pose.row(rhs).to_owned();
        pose.row_mut(lhs).assign(&rhs_row);
        pose.row_mut(rhs).assign(&lhs_row);
    });
    pose.slice_mut(s![.., 1..3]).mapv_inplace(|value| -value);
}

/// Compose the root rotation with the camera rotation of the augmentation.
fn rotate_root(pose: &mut Array2<f32>, root_idx: usize, state: &AugmentationState) {
    if state.rot == 0.0 {
        return;
    }

    let mut root = pose.row_mut(root_idx);
    let root_rotation =
        UnitQuaternion::from_scaled_axis(Vector3::new(root[0], root[1], root[2]).cast::<f64>());
    let rotated = state.camera_rotation::<f64>() * root_rotation;
    root.iter_mut()
        .zip(rotated.scaled_axis().iter())
        .for_each(|(dst, &src)| *dst = src as f32);
}

/// Zero pad or truncate the coefficients to `len`.
fn fit_len(values: ArrayView1<'_, f32>, len: usize) -> Array1<f32> {
    let mut fitted = Array1::zeros(len);
    fitted
        .iter_mut()
        .zip(values.iter())
        .for_each(|(dst, &src)| *dst = src);
    fitted
}
