use crate::common::*;

/// Body model parameters of one sample, each array owned by the sample.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyModelParams {
    /// Global orientation in axis-angle, `(3)`.
    pub root_pose: Array1<f32>,
    /// Body joint rotations in axis-angle, `(21 * 3)`.
    pub body_pose: Array1<f32>,
    /// `(15 * 3)`, zeros if the archive does not carry it.
    pub left_hand_pose: Array1<f32>,
    /// `(15 * 3)`, zeros if the archive does not carry it.
    pub right_hand_pose: Array1<f32>,
    /// `(3)`, zeros if the archive does not carry it.
    pub jaw_pose: Array1<f32>,
    /// Shape coefficients.
    pub shape: Array1<f32>,
    /// Expression coefficients, if annotated.
    pub expression: Option<Array1<f32>>,
    /// Camera-space translation, `(3)`.
    pub trans: Array1<f32>,
    /// Fields without a dedicated slot, such as eye poses.
    pub extra: IndexMap<String, Array1<f32>>,
}

/// The annotation of one sample, without image pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub image_path: PathBuf,
    pub image_shape: HW<usize>,
    /// The sanitized and aspect-corrected body box in pixels.
    pub bbox: XYXY<f32>,
    pub lhand_bbox: Option<XYXY<f32>>,
    pub rhand_bbox: Option<XYXY<f32>>,
    pub face_bbox: Option<XYXY<f32>>,
    /// `(137, 2)` pixel-space keypoints.
    pub joint_img: Array2<f32>,
    /// `(137, 3)` camera-space keypoints in meters.
    pub joint_cam: Array2<f32>,
    /// `(137)` keypoint validity as 0/1 flags.
    pub joint_valid: Array1<f32>,
    pub smplx_param: BodyModelParams,
}
