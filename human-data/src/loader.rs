//! Turns a HumanData archive into sample records.

use crate::{
    archive::HumanDataArchive,
    common::*,
    config::{Config, DataSplit},
    error::DatasetError,
    keypoint::KeypointRemapper,
    preprocess::{read_image_shape, process_bbox},
    record::{BodyModelParams, SampleRecord},
};

/// The records of a loaded archive.
#[derive(Debug, Clone)]
pub struct LoadedAnnotations {
    pub records: Vec<Arc<SampleRecord>>,
    /// The number of archive rows.
    pub num_rows: usize,
    /// The number of visited rows removed by the body box filter.
    pub num_dropped: usize,
}

/// Builds [SampleRecord]s from archive rows.
#[derive(Debug, Clone)]
pub struct AnnotationLoader {
    pub annot_path: PathBuf,
    pub image_dir: PathBuf,
    pub image_shape: HW<usize>,
    pub sample_interval: NonZeroUsize,
    pub aspect_ratio: f32,
    pub bbox_padding: f32,
    pub remapper: KeypointRemapper,
}

impl AnnotationLoader {
    pub fn new(config: &Config) -> Self {
        let Config { dataset, model, .. } = config;

        Self {
            annot_path: dataset.annot_path(),
            image_dir: dataset.image_dir(),
            image_shape: dataset.image_shape(),
            sample_interval: dataset.train_sample_interval,
            aspect_ratio: model.input_aspect_ratio(),
            bbox_padding: model.bbox_padding.raw() as f32,
            remapper: KeypointRemapper::smplx_137(),
        }
    }

    /// Open the configured archive and load the records of a split.
    pub fn load(&self, split: DataSplit) -> Result<LoadedAnnotations> {
        info!("loading annotations from '{}'", self.annot_path.display());
        let since = Instant::now();
        let archive = HumanDataArchive::open(&self.annot_path)?;
        debug!(
            "read {} archive rows in {:.2?}",
            archive.num_rows(),
            since.elapsed()
        );

        let loaded = self.load_archive(&archive, split)?;
        info!(
            "loaded {} samples from {} rows, dropped {}, in {:.2?}",
            loaded.records.len(),
            loaded.num_rows,
            loaded.num_dropped,
            since.elapsed()
        );
        Ok(loaded)
    }

    /// Load the records of an archive already in memory.
    ///
    /// The sample interval applies to the training split only, and picks rows before the body box
    /// filter runs.
    pub fn load_archive(
        &self,
        archive: &HumanDataArchive,
        split: DataSplit,
    ) -> Result<LoadedAnnotations> {
        let path = self.annot_path.as_path();
        let num_rows = archive.num_rows();
        archive.validate(path)?;

        if let Some(first) = archive.image_path.first() {
            self.check_image_shape(&self.image_dir.join(first))?;
        }

        // remap once for the whole archive, rows are copied out below
        let keypoints3d = self
            .remapper
            .remap_points(archive.keypoints3d.view(), 3, path)?;
        let keypoints2d = self
            .remapper
            .remap_points(archive.keypoints2d.view(), 2, path)?;
        let keypoints3d_mask = self
            .remapper
            .remap_mask(archive.keypoints3d_mask.view(), path)?;
        let keypoints2d_mask = self
            .remapper
            .remap_mask(archive.keypoints2d_mask.view(), path)?;
        if keypoints3d_mask != keypoints2d_mask {
            return Err(DatasetError::MaskMismatch.into());
        }

        let step = match split {
            DataSplit::Train => self.sample_interval.get(),
            DataSplit::Test => 1,
        };

        let mut num_dropped = 0;
        let mut records = vec![];

        for index in (0..num_rows).step_by(step) {
            let xywh = row_xywh(archive.bbox_xywh.row(index));
            let bbox = match process_bbox(xywh, self.image_shape, self.aspect_ratio, self.bbox_padding)
            {
                Some(bbox) => bbox,
                None => {
                    debug!(
                        "drop sample {} with degenerate body box {:?}",
                        index, xywh
                    );
                    num_dropped += 1;
                    continue;
                }
            };

            let record = SampleRecord {
                image_path: self.image_dir.join(&archive.image_path[index]),
                image_shape: self.image_shape,
                bbox,
                lhand_bbox: part_bbox(archive.lhand_bbox_xywh.row(index), index)?,
                rhand_bbox: part_bbox(archive.rhand_bbox_xywh.row(index), index)?,
                face_bbox: part_bbox(archive.face_bbox_xywh.row(index), index)?,
                joint_img: keypoints2d.index_axis(Axis(0), index).to_owned(),
                joint_cam: keypoints3d.index_axis(Axis(0), index).to_owned(),
                joint_valid: keypoints3d_mask.clone(),
                smplx_param: body_model_params(&archive.smplx, index)?,
            };
            records.push(Arc::new(record));
        }

        if num_dropped > 0 {
            warn!(
                "{} samples are dropped due to degenerate body boxes",
                num_dropped
            );
        }

        Ok(LoadedAnnotations {
            records,
            num_rows,
            num_dropped,
        })
    }

    fn check_image_shape(&self, path: &Path) -> Result<()> {
        let found = read_image_shape(path).map_err(|err| match err.downcast_ref::<DatasetError>() {
            Some(_) => err,
            None => DatasetError::malformed(0, format!("{:#}", err)).into(),
        })?;
        if found != self.image_shape {
            return Err(DatasetError::ImageShapeMismatch {
                path: path.to_owned(),
                expect: self.image_shape.hw(),
                found: found.hw(),
            }
            .into());
        }
        Ok(())
    }
}

fn row_xywh(row: ArrayView1<'_, f32>) -> [f32; 4] {
    [row[0], row[1], row[2], row[3]]
}

/// Read an `(x, y, w, h, confidence)` row. Rows with non-positive confidence have no box.
fn part_bbox(row: ArrayView1<'_, f32>, index: usize) -> Result<Option<XYXY<f32>>> {
    let confidence = row[4];
    if !(confidence > 0.0) {
        return Ok(None);
    }

    let xywh = row_xywh(row);
    let rect = XYXY::try_from_xywh(xywh)
        .map_err(|err| DatasetError::malformed(index, format!("part box {:?}: {}", xywh, err)))?;
    Ok(Some(rect))
}

/// Copy the body model parameters of one row out of the archive table.
fn body_model_params(table: &IndexMap<String, ArrayD<f32>>, index: usize) -> Result<BodyModelParams> {
    let row = |name: &str| -> Option<Array1<f32>> {
        let array = table.get(name)?;
        Some(array.index_axis(Axis(0), index).iter().copied().collect())
    };
    let required = |name: &str| -> Result<Array1<f32>> {
        row(name).ok_or_else(|| {
            DatasetError::malformed(index, format!("body model parameter '{}' is missing", name))
                .into()
        })
    };

    let root_pose = required("global_orient")?;
    let body_pose = required("body_pose")?;
    let shape = required("betas")?;
    let trans = required("transl")?;
    let left_hand_pose = row("left_hand_pose").unwrap_or_else(|| Array1::zeros(45));
    let right_hand_pose = row("right_hand_pose").unwrap_or_else(|| Array1::zeros(45));
    let jaw_pose = row("jaw_pose").unwrap_or_else(|| Array1::zeros(3));
    let expression = row("expression");

    let checks = [
        ("global_orient", root_pose.len(), 3),
        ("body_pose", body_pose.len(), 63),
        ("transl", trans.len(), 3),
        ("left_hand_pose", left_hand_pose.len(), 45),
        ("right_hand_pose", right_hand_pose.len(), 45),
        ("jaw_pose", jaw_pose.len(), 3),
    ];
    if let Some((name, found, expect)) = checks.iter().find(|(_, found, expect)| found != expect) {
        return Err(DatasetError::malformed(
            index,
            format!(
                "body model parameter '{}' has {} values, expect {}",
                name, found, expect
            ),
        )
        .into());
    }

    const KNOWN_FIELDS: [&str; 8] = [
        "global_orient",
        "body_pose",
        "betas",
        "transl",
        "left_hand_pose",
        "right_hand_pose",
        "jaw_pose",
        "expression",
    ];
    let extra: IndexMap<String, Array1<f32>> = table
        .keys()
        .filter(|name| !KNOWN_FIELDS.contains(&name.as_str()))
        .filter_map(|name| Some((name.clone(), row(name)?)))
        .collect();

    Ok(BodyModelParams {
        root_pose,
        body_pose,
        left_hand_pose,
        right_hand_pose,
        jaw_pose,
        shape,
        expression,
        trans,
        extra,
    })
}
