//! Loading and augmentation of HumanData whole-body pose datasets.

mod common;
pub mod archive;
pub mod box_projector;
pub mod config;
pub mod dataset;
pub mod error;
pub mod keypoint;
pub mod loader;
pub mod normalize;
pub mod preprocess;
pub mod profiling;
pub mod record;

pub use dataset::{HumanDataset, RandomAccessDataset, Sample};
pub use error::DatasetError;
