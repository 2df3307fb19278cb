//! Typed failure causes attached to [anyhow::Error] values.
//!
//! Library functions return [anyhow::Result]. Callers that want to tell a
//! skippable failure from a fatal one recover the cause with
//! `err.downcast_ref::<DatasetError>()`.

use crate::{common::*, config::DataSplit};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("corrupt archive '{path}': {reason}")]
    CorruptArchive { path: PathBuf, reason: String },

    #[error("image file '{path}' is missing or unreadable")]
    MissingImage { path: PathBuf },

    #[error("malformed sample {index}: {reason}")]
    MalformedSample { index: usize, reason: String },

    #[error(
        "image shape is incorrect for '{path}': expect {expect:?} (h, w), but found {found:?}"
    )]
    ImageShapeMismatch {
        path: PathBuf,
        expect: [usize; 2],
        found: [usize; 2],
    },

    #[error("the {split} split of dataset {dataset} is not supported")]
    UnsupportedSplit { dataset: String, split: DataSplit },

    #[error("the 2D and 3D keypoint validity masks differ")]
    MaskMismatch,

    #[error("index {index} is out of range for dataset of size {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

impl DatasetError {
    pub(crate) fn corrupt_archive(path: impl AsRef<Path>, reason: impl Display) -> Self {
        Self::CorruptArchive {
            path: path.as_ref().to_owned(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn malformed(index: usize, reason: impl Display) -> Self {
        Self::MalformedSample {
            index,
            reason: reason.to_string(),
        }
    }
}
