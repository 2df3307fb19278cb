//! The indexable HumanData dataset.

use crate::{
    archive::HumanDataArchive,
    box_projector::{BoxProjector, PartBoxes, ProjectedBox},
    common::*,
    config::{Config, DataSplit},
    error::DatasetError,
    loader::{AnnotationLoader, LoadedAnnotations},
    normalize::{CoordinateNormalizer, NormalizedJoints},
    preprocess::{
        AugmentationParams, AugmentationState, Augmented, Augmenter, DiskImageLoader, ImageLoader,
        PatchAugmenter,
    },
    profiling::Timing,
    record::SampleRecord,
};

/// The dataset that can be random accessed.
pub trait RandomAccessDataset
where
    Self: Debug + Send + Sync,
{
    /// Get number of records in the dataset.
    fn num_records(&self) -> usize;

    /// Get the nth sample with freshly drawn augmentation.
    fn nth(&self, index: usize) -> Result<Sample>;
}

/// The per-fetch collaborators of a dataset.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub image_loader: Arc<dyn ImageLoader>,
    pub augmenter: Arc<dyn Augmenter>,
    pub normalizer: CoordinateNormalizer,
}

impl Pipeline {
    /// The collaborators reading images from disk.
    pub fn new(config: &Config) -> Self {
        Self {
            image_loader: Arc::new(DiskImageLoader),
            augmenter: Arc::new(PatchAugmenter::new(
                config.augmentation,
                config.model.input_shape(),
            )),
            normalizer: CoordinateNormalizer::new(&config.model).camera(config.dataset.camera),
        }
    }
}

/// One fetched sample.
#[derive(Debug, Clone)]
pub struct Sample {
    pub inputs: Inputs,
    /// Supervision targets, present on the training split only.
    pub targets: Option<Targets>,
    /// Validity and truncation flags, present on the training split only.
    pub meta_info: Option<MetaInfo>,
    /// The augmentation applied to this sample.
    pub state: AugmentationState,
}

#[derive(Debug, Clone)]
pub struct Inputs {
    /// `(3, input_h, input_w)` image with values in `[0, 1]`.
    pub image: Array3<f32>,
}

#[cfg(feature = "tch")]
impl Inputs {
    /// Copy the image into a `(3, h, w)` float tensor.
    pub fn to_tensor(&self) -> Result<tch::Tensor> {
        let (channels, height, width) = self.image.dim();
        let values: Vec<f32> = self.image.iter().copied().collect();
        let tensor = tch::Tensor::of_slice(&values).f_view([
            channels as i64,
            height as i64,
            width as i64,
        ])?;
        Ok(tensor)
    }
}

#[derive(Debug, Clone)]
pub struct Targets {
    pub joint_img: Array2<f32>,
    pub smplx_joint_img: Array2<f32>,
    pub joint_cam: Array2<f32>,
    pub smplx_joint_cam: Array2<f32>,
    pub smplx_pose: Array1<f32>,
    pub smplx_shape: Array1<f32>,
    pub smplx_expr: Array1<f32>,
    pub lhand_bbox_center: [f32; 2],
    pub lhand_bbox_size: [f32; 2],
    pub rhand_bbox_center: [f32; 2],
    pub rhand_bbox_size: [f32; 2],
    pub face_bbox_center: [f32; 2],
    pub face_bbox_size: [f32; 2],
}

#[derive(Debug, Clone)]
pub struct MetaInfo {
    pub joint_valid: Array1<f32>,
    pub joint_trunc: Array1<f32>,
    pub smplx_joint_valid: Array1<f32>,
    pub smplx_joint_trunc: Array1<f32>,
    pub smplx_pose_valid: Array1<f32>,
    pub smplx_shape_valid: f32,
    pub smplx_expr_valid: f32,
    pub is_3d: f32,
    pub lhand_bbox_valid: f32,
    pub rhand_bbox_valid: f32,
    pub face_bbox_valid: f32,
}

/// A HumanData dataset of one split, with every annotation held in memory.
#[derive(Debug, Clone)]
pub struct HumanDataset {
    config: Arc<Config>,
    split: DataSplit,
    records: Vec<Arc<SampleRecord>>,
    num_rows: usize,
    num_dropped: usize,
    pipeline: Pipeline,
    box_projector: BoxProjector,
}

impl HumanDataset {
    /// Load the configured archive with the default collaborators.
    pub fn load(config: Arc<Config>, split: DataSplit) -> Result<Self> {
        let pipeline = Pipeline::new(&config);
        Self::load_with(config, split, pipeline)
    }

    pub fn load_with(config: Arc<Config>, split: DataSplit, pipeline: Pipeline) -> Result<Self> {
        check_split(&config, split)?;
        let loaded = AnnotationLoader::new(&config).load(split)?;
        Ok(Self::from_loaded(config, split, loaded, pipeline))
    }

    /// Build the dataset from an archive already in memory.
    pub fn from_archive(
        config: Arc<Config>,
        split: DataSplit,
        archive: &HumanDataArchive,
        pipeline: Pipeline,
    ) -> Result<Self> {
        check_split(&config, split)?;
        let loaded = AnnotationLoader::new(&config).load_archive(archive, split)?;
        Ok(Self::from_loaded(config, split, loaded, pipeline))
    }

    fn from_loaded(
        config: Arc<Config>,
        split: DataSplit,
        loaded: LoadedAnnotations,
        pipeline: Pipeline,
    ) -> Self {
        let LoadedAnnotations {
            records,
            num_rows,
            num_dropped,
        } = loaded;
        let box_projector = BoxProjector::new(config.dataset.image_shape(), &config.model);

        Self {
            config,
            split,
            records,
            num_rows,
            num_dropped,
            pipeline,
            box_projector,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn split(&self) -> DataSplit {
        self.split
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The number of rows in the archive.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// The number of samples removed by the body box filter.
    pub fn num_dropped(&self) -> usize {
        self.num_dropped
    }

    pub fn records(&self) -> &[Arc<SampleRecord>] {
        &self.records
    }

    pub fn record(&self, index: usize) -> Result<&Arc<SampleRecord>> {
        self.records.get(index).ok_or_else(|| {
            DatasetError::IndexOutOfRange {
                index,
                len: self.records.len(),
            }
            .into()
        })
    }

    /// Fetch a sample, drawing the augmentation from `rng`.
    pub fn get(&self, index: usize, rng: &mut dyn RngCore) -> Result<Sample> {
        let params = self.pipeline.augmenter.sample_params(self.split, rng);
        self.get_with_params(index, &params)
    }

    /// Fetch a sample under fixed augmentation parameters.
    pub fn get_with_params(&self, index: usize, params: &AugmentationParams) -> Result<Sample> {
        let mut timing = Timing::new("fetch_sample");

        let record = self.record(index)?;
        let image = self
            .pipeline
            .image_loader
            .load(&record.image_path)
            .map_err(|err| match err.downcast_ref::<DatasetError>() {
                Some(_) => err,
                None => DatasetError::malformed(index, format!("{:#}", err)).into(),
            })?;
        timing.set_record("load_image");

        let Augmented { image, state } = self
            .pipeline
            .augmenter
            .augment(image.view(), &record.bbox, params)
            .map_err(|err| DatasetError::malformed(index, format!("{:#}", err)))?;
        timing.set_record("augment");

        let (targets, meta_info) = match self.split {
            DataSplit::Train => {
                let joints = self.pipeline.normalizer.normalize(index, record, &state)?;
                timing.set_record("normalize");

                let parts = self.box_projector.project_parts(
                    record.lhand_bbox.as_ref(),
                    record.rhand_bbox.as_ref(),
                    record.face_bbox.as_ref(),
                    &state,
                );
                timing.set_record("project_boxes");

                let (targets, meta_info) = assemble_targets(joints, parts);
                (Some(targets), Some(meta_info))
            }
            DataSplit::Test => (None, None),
        };

        timing.report();

        Ok(Sample {
            inputs: Inputs { image },
            targets,
            meta_info,
            state,
        })
    }
}

impl RandomAccessDataset for HumanDataset {
    fn num_records(&self) -> usize {
        self.len()
    }

    fn nth(&self, index: usize) -> Result<Sample> {
        let mut rng = StdRng::from_entropy();
        self.get(index, &mut rng)
    }
}

fn check_split(config: &Config, split: DataSplit) -> Result<()> {
    if !config.dataset.splits.contains(&split) {
        return Err(DatasetError::UnsupportedSplit {
            dataset: config.dataset.name.clone(),
            split,
        }
        .into());
    }
    Ok(())
}

fn assemble_targets(joints: NormalizedJoints, parts: PartBoxes) -> (Targets, MetaInfo) {
    let NormalizedJoints {
        joint_img,
        joint_cam,
        joint_valid,
        joint_trunc,
        smplx_joint_img,
        smplx_joint_cam,
        smplx_joint_valid,
        smplx_joint_trunc,
        smplx_pose,
        smplx_shape,
        smplx_expr,
        smplx_pose_valid,
        smplx_shape_valid,
        smplx_expr_valid,
    } = joints;
    let PartBoxes { lhand, rhand, face } = parts;
    let flag = |value: bool| value as u8 as f32;
    let center_size = |part: &ProjectedBox| (part.center(), part.size());

    let (lhand_bbox_center, lhand_bbox_size) = center_size(&lhand);
    let (rhand_bbox_center, rhand_bbox_size) = center_size(&rhand);
    let (face_bbox_center, face_bbox_size) = center_size(&face);

    let targets = Targets {
        joint_img,
        smplx_joint_img,
        joint_cam,
        smplx_joint_cam,
        smplx_pose,
        smplx_shape,
        smplx_expr,
        lhand_bbox_center,
        lhand_bbox_size,
        rhand_bbox_center,
        rhand_bbox_size,
        face_bbox_center,
        face_bbox_size,
    };
    let meta_info = MetaInfo {
        joint_valid,
        joint_trunc,
        smplx_joint_valid,
        smplx_joint_trunc,
        smplx_pose_valid,
        smplx_shape_valid: flag(smplx_shape_valid),
        smplx_expr_valid: flag(smplx_expr_valid),
        is_3d: 1.0,
        lhand_bbox_valid: lhand.valid_flag(),
        rhand_bbox_valid: rhand.valid_flag(),
        face_bbox_valid: face.valid_flag(),
    };

    (targets, meta_info)
}
