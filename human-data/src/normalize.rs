//! Root-relative, heatmap-space joint targets and their validity masks.

use crate::{
    common::*,
    config::ModelConfig,
    error::DatasetError,
    keypoint::{JointSet, NUM_JOINTS, NUM_POSE_JOINTS, SMPLX_JOINT_SET},
    preprocess::{
        AffineDbCoord, AugmentationState, CameraParams, DbCoordInput, DbCoordProcessor,
        HumanModelInput, HumanModelOutput, HumanModelProcessor, ModelKind, ParamOnlyHumanModel,
    },
    record::SampleRecord,
};

/// Subtract the root joint from every camera-space joint.
pub fn root_relative(joint_cam: ArrayView2<'_, f32>, root_idx: usize) -> Array2<f32> {
    let root = joint_cam.row(root_idx).to_owned();
    &joint_cam - &root
}

/// Map a root-relative depth in meters to the heatmap depth axis.
///
/// Depths within `[-body_3d_size / 2, body_3d_size / 2]` land in `[0, depth_bins]`.
pub fn discretize_depth(depth: f32, body_3d_size: f32, depth_bins: usize) -> f32 {
    (depth / (body_3d_size / 2.0) + 1.0) / 2.0 * depth_bins as f32
}

/// The inverse of [discretize_depth].
pub fn depth_from_bins(bin: f32, body_3d_size: f32, depth_bins: usize) -> f32 {
    (bin / depth_bins as f32 * 2.0 - 1.0) * (body_3d_size / 2.0)
}

/// Repeat each per-joint flag for the 3 axis-angle components.
pub fn tile_pose_valid(pose_valid: ArrayView1<'_, f32>) -> Array1<f32> {
    pose_valid
        .iter()
        .flat_map(|&valid| [valid; 3])
        .collect()
}

/// Joint, pose and shape targets of one training sample.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedJoints {
    /// `(137, 3)` heatmap-space dataset joints.
    pub joint_img: Array2<f32>,
    /// `(137, 3)` root-relative camera-space dataset joints.
    pub joint_cam: Array2<f32>,
    pub joint_valid: Array1<f32>,
    pub joint_trunc: Array1<f32>,
    pub smplx_joint_img: Array2<f32>,
    pub smplx_joint_cam: Array2<f32>,
    pub smplx_joint_valid: Array1<f32>,
    /// Truncation flags masked by the model joint validity.
    pub smplx_joint_trunc: Array1<f32>,
    /// `(53 * 3)` axis-angle pose.
    pub smplx_pose: Array1<f32>,
    pub smplx_shape: Array1<f32>,
    pub smplx_expr: Array1<f32>,
    /// `(53 * 3)` pose validity, one flag per pose component.
    pub smplx_pose_valid: Array1<f32>,
    pub smplx_shape_valid: bool,
    pub smplx_expr_valid: bool,
}

/// Converts the joints of a record into augmentation-consistent heatmap targets.
#[derive(Debug, Clone)]
pub struct CoordinateNormalizer {
    body_3d_size: f32,
    depth_bins: usize,
    camera: Option<CameraParams>,
    db_coord: Arc<dyn DbCoordProcessor>,
    human_model: Arc<dyn HumanModelProcessor>,
}

impl CoordinateNormalizer {
    pub fn new(model: &ModelConfig) -> Self {
        Self::with_processors(
            model,
            Arc::new(AffineDbCoord::new(model)),
            Arc::new(ParamOnlyHumanModel),
        )
    }

    pub fn with_processors(
        model: &ModelConfig,
        db_coord: Arc<dyn DbCoordProcessor>,
        human_model: Arc<dyn HumanModelProcessor>,
    ) -> Self {
        Self {
            body_3d_size: model.body_3d_size.raw() as f32,
            depth_bins: model.heatmap_depth(),
            camera: None,
            db_coord,
            human_model,
        }
    }

    /// Set the camera intrinsics of a dataset with known calibration.
    pub fn camera(self, camera: Option<CameraParams>) -> Self {
        Self { camera, ..self }
    }

    pub fn normalize(
        &self,
        index: usize,
        record: &SampleRecord,
        state: &AugmentationState,
    ) -> Result<NormalizedJoints> {
        let joints: &JointSet = &SMPLX_JOINT_SET;
        let malformed = |reason: String| -> Error { DatasetError::malformed(index, reason).into() };

        if record.joint_cam.dim() != (NUM_JOINTS, 3)
            || record.joint_img.dim() != (NUM_JOINTS, 2)
            || record.joint_valid.len() != NUM_JOINTS
        {
            return Err(malformed(format!(
                "expect {} joints, but found joint_img {:?}, joint_cam {:?}, joint_valid {}",
                NUM_JOINTS,
                record.joint_img.dim(),
                record.joint_cam.dim(),
                record.joint_valid.len()
            )));
        }

        let joint_cam = root_relative(record.joint_cam.view(), joints.root_joint_idx());

        // pixel x, pixel y and the discretized root-relative depth
        let mut joint_img = Array2::zeros((NUM_JOINTS, 3));
        joint_img
            .slice_mut(s![.., ..2])
            .assign(&record.joint_img);
        joint_img
            .column_mut(2)
            .assign(&joint_cam.column(2).mapv(|depth| {
                discretize_depth(depth, self.body_3d_size, self.depth_bins)
            }));

        let coords = self
            .db_coord
            .process(DbCoordInput {
                joint_img: joint_img.view(),
                joint_cam: joint_cam.view(),
                joint_valid: record.joint_valid.view(),
                state,
                image_shape: record.image_shape,
                src_joints: joints,
                dst_joints: joints,
            })
            .map_err(|err| malformed(format!("{:#}", err)))?;
        if coords.joint_img.dim() != (NUM_JOINTS, 3)
            || coords.joint_cam.dim() != (NUM_JOINTS, 3)
            || coords.joint_valid.len() != NUM_JOINTS
            || coords.joint_trunc.len() != NUM_JOINTS
        {
            return Err(malformed(
                "joint coordinate processor returned arrays of unexpected shapes".into(),
            ));
        }

        let model = self
            .human_model
            .process(HumanModelInput {
                params: &record.smplx_param,
                camera: self.camera.as_ref(),
                state,
                image_shape: record.image_shape,
                kind: ModelKind::Smplx,
            })
            .map_err(|err| malformed(format!("{:#}", err)))?;
        check_model_output(&model).map_err(malformed)?;

        let HumanModelOutput {
            joint_img: smplx_joint_img,
            joint_cam: smplx_joint_cam,
            joint_trunc: smplx_joint_trunc,
            pose: smplx_pose,
            shape: smplx_shape,
            expr: smplx_expr,
            pose_valid,
            joint_valid: smplx_joint_valid,
            expr_valid: smplx_expr_valid,
            mesh_cam_orig: _,
        } = model;

        let smplx_joint_trunc = &smplx_joint_valid * &smplx_joint_trunc;

        Ok(NormalizedJoints {
            joint_img: coords.joint_img,
            joint_cam: coords.joint_cam,
            joint_valid: coords.joint_valid,
            joint_trunc: coords.joint_trunc,
            smplx_joint_img,
            smplx_joint_cam,
            smplx_joint_valid,
            smplx_joint_trunc,
            smplx_pose,
            smplx_shape,
            smplx_expr,
            smplx_pose_valid: tile_pose_valid(pose_valid.view()),
            smplx_shape_valid: true,
            smplx_expr_valid,
        })
    }
}

fn check_model_output(output: &HumanModelOutput) -> Result<(), String> {
    let expect = [
        ("joint_img", output.joint_img.len(), NUM_JOINTS * 3),
        ("joint_cam", output.joint_cam.len(), NUM_JOINTS * 3),
        ("joint_trunc", output.joint_trunc.len(), NUM_JOINTS),
        ("joint_valid", output.joint_valid.len(), NUM_JOINTS),
        ("pose", output.pose.len(), NUM_POSE_JOINTS * 3),
        ("pose_valid", output.pose_valid.len(), NUM_POSE_JOINTS),
    ];
    match expect.iter().find(|(_, found, expect)| found != expect) {
        Some((name, found, expect)) => Err(format!(
            "body model processor returned {} values for '{}', expect {}",
            found, name, expect
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::BodyModelParams;
    use approx::assert_abs_diff_eq;

    fn record() -> SampleRecord {
        SampleRecord {
            image_path: PathBuf::from("image.png"),
            image_shape: HW::from_hw([64, 48]),
            bbox: XYXY::from_xywh([0.0, 0.0, 48.0, 64.0]),
            lhand_bbox: None,
            rhand_bbox: None,
            face_bbox: None,
            joint_img: Array2::from_shape_fn((NUM_JOINTS, 2), |(j, c)| (j % 40 + c + 1) as f32),
            joint_cam: Array2::from_shape_fn((NUM_JOINTS, 3), |(j, c)| {
                0.001 * j as f32 + c as f32 + 1.0
            }),
            joint_valid: Array1::ones(NUM_JOINTS),
            smplx_param: BodyModelParams {
                root_pose: Array1::zeros(3),
                body_pose: Array1::zeros(63),
                left_hand_pose: Array1::zeros(45),
                right_hand_pose: Array1::zeros(45),
                jaw_pose: Array1::zeros(3),
                shape: Array1::zeros(10),
                expression: None,
                trans: Array1::zeros(3),
                extra: IndexMap::new(),
            },
        }
    }

    fn model_config() -> ModelConfig {
        ModelConfig {
            input_img_shape: [64, 48],
            output_hm_shape: [8, 64, 48],
            ..ModelConfig::default()
        }
    }

    fn identity_state() -> AugmentationState {
        AugmentationState {
            img2bb_trans: Affine::identity(),
            bb2img_trans: Affine::identity(),
            rot: 0.0,
            do_flip: false,
        }
    }

    #[test]
    fn root_joint_is_centered() {
        let record = record();
        let normalizer = CoordinateNormalizer::new(&model_config());
        let output = normalizer.normalize(0, &record, &identity_state()).unwrap();

        let root = SMPLX_JOINT_SET.root_joint_idx();
        assert_eq!(output.joint_cam.row(root).to_vec(), vec![0.0, 0.0, 0.0]);
        // the root depth sits in the middle of the depth axis
        assert_eq!(output.joint_img[[root, 2]], 4.0);
        assert_abs_diff_eq!(output.joint_cam[[10, 0]], 0.01, epsilon = 1e-6);
        assert_eq!(output.joint_img.dim(), (NUM_JOINTS, 3));
        assert_eq!(output.joint_img[[3, 0]], 4.0);
        assert_eq!(output.joint_trunc.sum(), NUM_JOINTS as f32);

        assert_eq!(output.smplx_pose_valid.len(), NUM_POSE_JOINTS * 3);
        assert_eq!(output.smplx_joint_trunc.sum(), 0.0);
        assert!(output.smplx_shape_valid);
        assert!(!output.smplx_expr_valid);
    }

    #[test]
    fn depth_discretization_is_monotonic() {
        let depths: Vec<f32> = (-10..=10).map(|step| step as f32 * 0.1).collect();
        let bins: Vec<f32> = depths
            .iter()
            .map(|&depth| discretize_depth(depth, 2.0, 8))
            .collect();
        assert_eq!(bins[0], 0.0);
        assert_eq!(bins[10], 4.0);
        assert_abs_diff_eq!(bins[20], 8.0, epsilon = 1e-5);
        bins.iter()
            .tuple_windows()
            .for_each(|(lhs, rhs)| assert!(lhs <= rhs));
        depths.iter().zip(&bins).for_each(|(&depth, &bin)| {
            assert_abs_diff_eq!(depth_from_bins(bin, 2.0, 8), depth, epsilon = 1e-5);
        });
    }

    #[test]
    fn pose_validity_is_tiled() {
        let pose_valid = Array1::from_vec(vec![1.0, 0.0, 1.0]);
        assert_eq!(
            tile_pose_valid(pose_valid.view()).to_vec(),
            vec![1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0]
        );
    }

    #[derive(Debug, Default)]
    struct CameraCapture {
        seen: std::sync::Mutex<Vec<Option<CameraParams>>>,
    }

    impl HumanModelProcessor for CameraCapture {
        fn process(&self, input: HumanModelInput<'_>) -> Result<HumanModelOutput> {
            self.seen.lock().unwrap().push(input.camera.copied());
            ParamOnlyHumanModel.process(input)
        }
    }

    #[test]
    fn camera_reaches_human_model() {
        let model = model_config();
        let capture = Arc::new(CameraCapture::default());
        let camera = CameraParams {
            focal: [5000.0, 5000.0],
            princpt: [24.0, 32.0],
        };
        let normalizer = CoordinateNormalizer::with_processors(
            &model,
            Arc::new(AffineDbCoord::new(&model)),
            capture.clone(),
        );

        let record = record();
        normalizer.normalize(0, &record, &identity_state()).unwrap();
        normalizer
            .camera(Some(camera))
            .normalize(1, &record, &identity_state())
            .unwrap();
        assert_eq!(*capture.seen.lock().unwrap(), vec![None, Some(camera)]);
    }

    #[test]
    fn reject_malformed_record() {
        let mut record = record();
        record.joint_valid = Array1::ones(10);
        let err = CoordinateNormalizer::new(&model_config())
            .normalize(5, &record, &identity_state())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::MalformedSample { index: 5, .. })
        ));
    }
}
