//! Canonical joint layouts and the native-to-canonical keypoint remapping.

use crate::{common::*, error::DatasetError};

/// The number of keypoints in the canonical SMPL-X layout.
pub const NUM_JOINTS: usize = 137;

/// The number of body model joints carrying a pose rotation.
pub const NUM_POSE_JOINTS: usize = 53;

/// Gather table from the HumanData SMPL-X keypoint ordering to the canonical 137-point ordering.
///
/// Entries 56 and 57 appear twice on purpose: the same source joint fills two canonical slots.
pub const SMPLX_137_MAPPING: [usize; NUM_JOINTS] = [
    0, 1, 2, 4, 5, 7, 8, 12, 16, 17, 18, 19, 20, 21, 60, 61, 62, 63, 64, 65, 59, 58, 57, 56, 55, 37,
    38, 39, 66, 25, 26, 27, 67, 28, 29, 30, 68, 34, 35, 36, 69, 31, 32, 33, 70, 52, 53, 54, 71, 40,
    41, 42, 72, 43, 44, 45, 73, 49, 50, 51, 74, 46, 47, 48, 75, 22, 15, 56, 57, 76, 77, 78, 79, 80,
    81, 82, 83, 84, 85, 86, 87, 88, 89, 90, 91, 92, 93, 94, 95, 96, 97, 98, 99, 100, 101, 102, 103,
    104, 105, 106, 107, 108, 109, 110, 111, 112, 113, 114, 115, 116, 117, 118, 119, 120, 121, 122,
    123, 124, 125, 126, 127, 128, 129, 130, 131, 132, 133, 134, 135, 136, 137, 138, 139, 140, 141,
    142, 143,
];

/// The canonical 137-keypoint joint set.
pub static SMPLX_JOINT_SET: Lazy<JointSet> = Lazy::new(JointSet::smplx_137);

/// The 53 body model joints in pose parameter order.
pub static SMPLX_POSE_JOINT_SET: Lazy<JointSet> = Lazy::new(JointSet::smplx_pose);

const BODY_JOINTS: [&str; 25] = [
    "Pelvis",
    "L_Hip",
    "R_Hip",
    "L_Knee",
    "R_Knee",
    "L_Ankle",
    "R_Ankle",
    "Neck",
    "L_Shoulder",
    "R_Shoulder",
    "L_Elbow",
    "R_Elbow",
    "L_Wrist",
    "R_Wrist",
    "L_Big_toe",
    "L_Small_toe",
    "L_Heel",
    "R_Big_toe",
    "R_Small_toe",
    "R_Heel",
    "L_Ear",
    "R_Ear",
    "L_Eye",
    "R_Eye",
    "Nose",
];

const POSE_BODY_JOINTS: [&str; 22] = [
    "Pelvis",
    "L_Hip",
    "R_Hip",
    "Spine_1",
    "L_Knee",
    "R_Knee",
    "Spine_2",
    "L_Ankle",
    "R_Ankle",
    "Spine_3",
    "L_Foot",
    "R_Foot",
    "Neck",
    "L_Collar",
    "R_Collar",
    "Head",
    "L_Shoulder",
    "R_Shoulder",
    "L_Elbow",
    "R_Elbow",
    "L_Wrist",
    "R_Wrist",
];

const FINGERS: [&str; 5] = ["Thumb", "Index", "Middle", "Ring", "Pinky"];

/// Finger order of the body model hand pose parameters.
const POSE_FINGERS: [&str; 5] = ["Index", "Middle", "Pinky", "Ring", "Thumb"];

/// Mirrored pairs among the 72 face landmarks, as canonical indices.
const FACE_FLIP_PAIRS: [(usize, usize); 30] = [
    // eyeballs
    (67, 68),
    // eyebrows
    (69, 78),
    (70, 77),
    (71, 76),
    (72, 75),
    (73, 74),
    // nose base
    (83, 87),
    (84, 86),
    // eyes
    (88, 97),
    (89, 96),
    (90, 95),
    (91, 94),
    (92, 99),
    (93, 98),
    // mouth
    (100, 106),
    (101, 105),
    (102, 104),
    (107, 111),
    (108, 110),
    // lips
    (112, 116),
    (113, 115),
    (117, 119),
    // contour
    (120, 136),
    (121, 135),
    (122, 134),
    (123, 133),
    (124, 132),
    (125, 131),
    (126, 130),
    (127, 129),
];

/// An ordered list of joint names with the root joint and mirrored pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JointSet {
    names: Vec<String>,
    flip_pairs: Vec<(usize, usize)>,
    root_joint_idx: usize,
}

impl JointSet {
    fn smplx_137() -> Self {
        let hand = |side: &str| -> Vec<String> {
            FINGERS
                .iter()
                .flat_map(|finger| (1..=4).map(move |nth| format!("{}_{}_{}", side, finger, nth)))
                .collect()
        };

        let names: Vec<String> = BODY_JOINTS
            .iter()
            .map(|&name| name.to_owned())
            .chain(hand("L"))
            .chain(hand("R"))
            .chain((1..=72).map(|nth| format!("Face_{}", nth)))
            .collect();
        debug_assert_eq!(names.len(), NUM_JOINTS);

        let mut flip_pairs = mirrored_pairs(&names);
        flip_pairs.extend_from_slice(&FACE_FLIP_PAIRS);

        Self {
            names,
            flip_pairs,
            root_joint_idx: 0,
        }
    }

    fn smplx_pose() -> Self {
        let hand = |side: &str| -> Vec<String> {
            POSE_FINGERS
                .iter()
                .flat_map(|finger| (1..=3).map(move |nth| format!("{}_{}_{}", side, finger, nth)))
                .collect()
        };

        let names: Vec<String> = POSE_BODY_JOINTS
            .iter()
            .map(|&name| name.to_owned())
            .chain(hand("L"))
            .chain(hand("R"))
            .chain(["Jaw".to_owned()])
            .collect();
        debug_assert_eq!(names.len(), NUM_POSE_JOINTS);

        let flip_pairs = mirrored_pairs(&names);

        Self {
            names,
            flip_pairs,
            root_joint_idx: 0,
        }
    }

    pub fn num_joints(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Index pairs of left/right counterparts that swap under horizontal flip.
    pub fn flip_pairs(&self) -> &[(usize, usize)] {
        &self.flip_pairs
    }

    pub fn root_joint_idx(&self) -> usize {
        self.root_joint_idx
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|candidate| candidate == name)
    }
}

/// Pair every `L_*` name with its `R_*` counterpart.
fn mirrored_pairs(names: &[String]) -> Vec<(usize, usize)> {
    names
        .iter()
        .enumerate()
        .filter_map(|(left_idx, name)| {
            let suffix = name.strip_prefix("L_")?;
            let right = format!("R_{}", suffix);
            let right_idx = names.iter().position(|name| *name == right)?;
            Some((left_idx, right_idx))
        })
        .collect()
}

/// Gathers native keypoint arrays into the canonical ordering.
#[derive(Debug, Clone, Copy)]
pub struct KeypointRemapper {
    table: &'static [usize],
}

impl KeypointRemapper {
    pub fn smplx_137() -> Self {
        Self {
            table: &SMPLX_137_MAPPING,
        }
    }

    pub fn num_targets(&self) -> usize {
        self.table.len()
    }

    /// The minimum number of native keypoints the table can index.
    pub fn min_source_len(&self) -> usize {
        self.table.iter().max().map(|&max| max + 1).unwrap_or(0)
    }

    /// Remap a `(samples, native keypoints, channels)` array, keeping the first `channels` channels.
    ///
    /// The result owns its storage and never aliases the input.
    pub fn remap_points(
        &self,
        points: ArrayView3<'_, f32>,
        channels: usize,
        archive_path: &Path,
    ) -> Result<Array3<f32>> {
        let (_num_samples, num_keypoints, num_channels) = points.dim();
        self.check_source_len(num_keypoints, archive_path)?;
        if num_channels < channels {
            return Err(DatasetError::corrupt_archive(
                archive_path,
                format!(
                    "keypoints carry {} channels, but at least {} are required",
                    num_channels, channels
                ),
            )
            .into());
        }

        let remapped = points
            .slice(s![.., .., ..channels])
            .select(Axis(1), self.table);
        Ok(remapped)
    }

    /// Remap a per-keypoint mask.
    pub fn remap_mask(&self, mask: ArrayView1<'_, f32>, archive_path: &Path) -> Result<Array1<f32>> {
        self.check_source_len(mask.len(), archive_path)?;
        Ok(mask.select(Axis(0), self.table))
    }

    fn check_source_len(&self, num_keypoints: usize, archive_path: &Path) -> Result<()> {
        let min_len = self.min_source_len();
        if num_keypoints < min_len {
            return Err(DatasetError::corrupt_archive(
                archive_path,
                format!(
                    "expect at least {} native keypoints, but found {}",
                    min_len, num_keypoints
                ),
            )
            .into());
        }
        Ok(())
    }
}
