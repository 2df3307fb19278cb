//! Dataset and preprocessing configuration format.

use crate::common::*;

pub use augmentation::*;
pub use dataset::*;
pub use model::*;

/// The main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub augmentation: AugmentationConfig,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let text = fs::read_to_string(path)?;
        let config: Self = json5::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let Self {
            dataset,
            model,
            augmentation,
        } = self;

        let [img_h, img_w] = dataset.image_shape;
        ensure!(img_h > 0 && img_w > 0, "dataset.image_shape must be positive");
        ensure!(
            !dataset.splits.is_empty(),
            "dataset.splits must contain at least one split"
        );
        if let Some(camera) = &dataset.camera {
            ensure!(
                camera.focal.iter().all(|&focal| focal.is_finite() && focal > 0.0),
                "dataset.camera.focal must be positive"
            );
        }

        let [in_h, in_w] = model.input_img_shape;
        ensure!(in_h > 0 && in_w > 0, "model.input_img_shape must be positive");
        ensure!(
            model.output_hm_shape.iter().all(|&size| size > 0),
            "model.output_hm_shape must be positive"
        );
        ensure!(model.body_3d_size > 0.0, "model.body_3d_size must be positive");
        ensure!(model.bbox_padding > 0.0, "model.bbox_padding must be positive");

        let AugmentationConfig {
            scale_factor,
            rot_factor,
            rot_prob,
            color_factor,
            flip_prob,
        } = *augmentation;
        ensure!(
            scale_factor >= 0.0 && scale_factor < 1.0,
            "augmentation.scale_factor must be in range [0, 1)"
        );
        ensure!(rot_factor >= 0.0, "augmentation.rot_factor must be non-negative");
        ensure!(
            color_factor >= 0.0 && color_factor <= 1.0,
            "augmentation.color_factor must be in range [0, 1]"
        );
        ensure!(
            (0.0..=1.0).contains(&rot_prob.raw()),
            "augmentation.rot_prob must be in range [0, 1]"
        );
        ensure!(
            (0.0..=1.0).contains(&flip_prob.raw()),
            "augmentation.flip_prob must be in range [0, 1]"
        );

        Ok(())
    }
}

mod dataset {
    use super::*;
    use crate::preprocess::CameraParams;

    /// Dataset location and layout options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct DatasetConfig {
        /// The dataset name. Images are searched in `data_dir/<name>`.
        pub name: String,
        pub data_dir: PathBuf,
        /// The archive file name under `data_dir/preprocessed_datasets`.
        #[serde(default = "default_filename")]
        pub filename: String,
        /// The `[h, w]` shape shared by every image of the dataset.
        #[serde(default = "default_image_shape")]
        pub image_shape: [usize; 2],
        /// Keep every n-th archive row for training.
        #[serde(default = "default_sample_interval")]
        pub train_sample_interval: NonZeroUsize,
        /// The splits that have annotations.
        #[serde(default = "default_splits")]
        pub splits: HashSet<DataSplit>,
        /// Camera intrinsics handed to the body model processor, if the dataset is calibrated.
        #[serde(default)]
        pub camera: Option<CameraParams>,
    }

    impl DatasetConfig {
        pub fn image_dir(&self) -> PathBuf {
            self.data_dir.join(&self.name)
        }

        pub fn annot_path(&self) -> PathBuf {
            self.data_dir
                .join("preprocessed_datasets")
                .join(&self.filename)
        }

        pub fn image_shape(&self) -> HW<usize> {
            HW::from_hw(self.image_shape)
        }
    }

    /// The data split requested from a dataset.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum DataSplit {
        Train,
        Test,
    }

    impl Display for DataSplit {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::Train => write!(f, "train"),
                Self::Test => write!(f, "test"),
            }
        }
    }

    fn default_filename() -> String {
        "ssp3d_230525_311.npz".into()
    }

    fn default_image_shape() -> [usize; 2] {
        [512, 512]
    }

    fn default_sample_interval() -> NonZeroUsize {
        NonZeroUsize::new(1).unwrap()
    }

    fn default_splits() -> HashSet<DataSplit> {
        [DataSplit::Train].into_iter().collect()
    }
}

mod model {
    use super::*;

    /// Network input and target geometry.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(default)]
    pub struct ModelConfig {
        /// The `[h, w]` shape of the cropped network input.
        pub input_img_shape: [usize; 2],
        /// The `[d, h, w]` shape of the output heatmap.
        pub output_hm_shape: [usize; 3],
        /// The metric depth range in meters covered by the heatmap depth axis.
        pub body_3d_size: R64,
        /// The enlarging factor applied to the aspect-corrected body box.
        pub bbox_padding: R64,
    }

    impl ModelConfig {
        pub fn input_shape(&self) -> HW<usize> {
            HW::from_hw(self.input_img_shape)
        }

        pub fn heatmap_shape(&self) -> HW<usize> {
            let [_d, h, w] = self.output_hm_shape;
            HW::from_hw([h, w])
        }

        pub fn heatmap_depth(&self) -> usize {
            self.output_hm_shape[0]
        }

        /// The `w / h` ratio of the network input.
        pub fn input_aspect_ratio(&self) -> f32 {
            self.input_shape().aspect_ratio()
        }

        /// The `[x, y]` factors mapping input pixels to heatmap cells.
        pub fn heatmap_scale(&self) -> [f32; 2] {
            self.input_shape().scale_to(&self.heatmap_shape())
        }
    }

    impl Default for ModelConfig {
        fn default() -> Self {
            Self {
                input_img_shape: [512, 384],
                output_hm_shape: [8, 64, 48],
                body_3d_size: r64(2.0),
                bbox_padding: r64(1.25),
            }
        }
    }
}

mod augmentation {
    use super::*;

    /// Random augmentation options for the training split.
    #[derive(Debug, Clone, Copy, Serialize, Deserialize)]
    #[serde(default)]
    pub struct AugmentationConfig {
        /// The maximum relative deviation of the crop scale.
        pub scale_factor: R64,
        /// The standard deviation of the rotation in degrees.
        pub rot_factor: R64,
        /// The probability to apply a rotation.
        pub rot_prob: R64,
        /// The maximum relative deviation of the per-channel color scale.
        pub color_factor: R64,
        /// The probability to apply horizontal flip.
        pub flip_prob: R64,
    }

    impl Default for AugmentationConfig {
        fn default() -> Self {
            Self {
                scale_factor: r64(0.25),
                rot_factor: r64(30.0),
                rot_prob: r64(0.6),
                color_factor: r64(0.2),
                flip_prob: r64(0.5),
            }
        }
    }
}
