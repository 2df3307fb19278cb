//! The packed HumanData annotation archive.

use crate::{common::*, error::DatasetError};
use ndarray::{Data, Dimension};
use ndarray_npy::{NpzReader, NpzWriter, ReadNpzError, WritableElement};

/// The prefix of body model parameter entries in the archive.
pub const SMPLX_PREFIX: &str = "smplx/";

/// Body model parameter fields that every archive must provide.
pub const REQUIRED_SMPLX_FIELDS: [&str; 4] = ["global_orient", "body_pose", "betas", "transl"];

/// The in-memory content of a HumanData archive, one row per sample.
///
/// Row order is significant. Every per-row array is aligned with `image_path`.
#[derive(Debug, Clone)]
pub struct HumanDataArchive {
    /// Image paths relative to the dataset image directory.
    pub image_path: Vec<String>,
    /// `(N, >=4)` body boxes in `(x, y, w, h)`.
    pub bbox_xywh: Array2<f32>,
    /// `(N, 5)` left-hand boxes in `(x, y, w, h, confidence)`.
    pub lhand_bbox_xywh: Array2<f32>,
    /// `(N, 5)` right-hand boxes in `(x, y, w, h, confidence)`.
    pub rhand_bbox_xywh: Array2<f32>,
    /// `(N, 5)` face boxes in `(x, y, w, h, confidence)`.
    pub face_bbox_xywh: Array2<f32>,
    /// `(N, K, >=3)` camera-space keypoints in the native layout.
    pub keypoints3d: Array3<f32>,
    /// `(K)` dataset-wide 3D keypoint validity.
    pub keypoints3d_mask: Array1<f32>,
    /// `(N, K, >=2)` pixel-space keypoints in the native layout.
    pub keypoints2d: Array3<f32>,
    /// `(K)` dataset-wide 2D keypoint validity.
    pub keypoints2d_mask: Array1<f32>,
    /// Body model parameter arrays keyed by field name, each with `N` rows.
    pub smplx: IndexMap<String, ArrayD<f32>>,
}

impl HumanDataArchive {
    /// Read an `.npz` archive. The result never borrows from the file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let corrupt = |reason: String| DatasetError::corrupt_archive(path, reason);

        let file = File::open(path).map_err(|err| corrupt(err.to_string()))?;
        let mut npz = NpzReader::new(BufReader::new(file)).map_err(|err| corrupt(err.to_string()))?;
        let entries: Vec<String> = npz.names().map_err(|err| corrupt(err.to_string()))?;

        let mut reader = EntryReader {
            path,
            npz: &mut npz,
            entries: &entries,
        };

        let image_path = {
            let bytes: Array2<u8> = reader.read_u8("image_path")?;
            decode_paths(bytes.view()).map_err(|err| corrupt(err.to_string()))?
        };
        let bbox_xywh = reader.read_f32("bbox_xywh")?;
        let lhand_bbox_xywh = reader.read_f32("lhand_bbox_xywh")?;
        let rhand_bbox_xywh = reader.read_f32("rhand_bbox_xywh")?;
        let face_bbox_xywh = reader.read_f32("face_bbox_xywh")?;
        let keypoints3d = reader.read_f32("keypoints3d")?;
        let keypoints3d_mask = reader.read_f32("keypoints3d_mask")?;
        let keypoints2d = reader.read_f32("keypoints2d")?;
        let keypoints2d_mask = reader.read_f32("keypoints2d_mask")?;

        let smplx_fields: Vec<String> = entries
            .iter()
            .filter_map(|entry| {
                let name = entry.strip_suffix(".npy").unwrap_or(entry);
                name.strip_prefix(SMPLX_PREFIX).map(ToOwned::to_owned)
            })
            .collect();
        let smplx: IndexMap<String, ArrayD<f32>> = smplx_fields
            .into_iter()
            .map(|field| -> Result<_> {
                let array = reader.read_f32(&format!("{}{}", SMPLX_PREFIX, field))?;
                Ok((field, array))
            })
            .try_collect()?;

        let archive = Self {
            image_path,
            bbox_xywh,
            lhand_bbox_xywh,
            rhand_bbox_xywh,
            face_bbox_xywh,
            keypoints3d,
            keypoints3d_mask,
            keypoints2d,
            keypoints2d_mask,
            smplx,
        };
        archive.validate(path)?;
        Ok(archive)
    }

    /// Write the archive in the layout [HumanDataArchive::open] reads.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("unable to create archive '{}'", path.display()))?;
        let mut npz = NpzWriter::new(BufWriter::new(file));

        add_array(&mut npz, "image_path", &encode_paths(&self.image_path))?;
        add_array(&mut npz, "bbox_xywh", &self.bbox_xywh)?;
        add_array(&mut npz, "lhand_bbox_xywh", &self.lhand_bbox_xywh)?;
        add_array(&mut npz, "rhand_bbox_xywh", &self.rhand_bbox_xywh)?;
        add_array(&mut npz, "face_bbox_xywh", &self.face_bbox_xywh)?;
        add_array(&mut npz, "keypoints3d", &self.keypoints3d)?;
        add_array(&mut npz, "keypoints3d_mask", &self.keypoints3d_mask)?;
        add_array(&mut npz, "keypoints2d", &self.keypoints2d)?;
        add_array(&mut npz, "keypoints2d_mask", &self.keypoints2d_mask)?;
        self.smplx.iter().try_for_each(|(field, array)| {
            add_array(&mut npz, &format!("{}{}", SMPLX_PREFIX, field), array)
        })?;

        npz.finish()?;
        Ok(())
    }

    pub fn num_rows(&self) -> usize {
        self.image_path.len()
    }

    /// Check that every per-row array is aligned with `image_path`.
    pub fn validate(&self, path: &Path) -> Result<()> {
        let corrupt = |reason: String| -> Error { DatasetError::corrupt_archive(path, reason).into() };
        let num_rows = self.num_rows();

        let row_counts = [
            ("bbox_xywh", self.bbox_xywh.nrows()),
            ("lhand_bbox_xywh", self.lhand_bbox_xywh.nrows()),
            ("rhand_bbox_xywh", self.rhand_bbox_xywh.nrows()),
            ("face_bbox_xywh", self.face_bbox_xywh.nrows()),
            ("keypoints3d", self.keypoints3d.len_of(Axis(0))),
            ("keypoints2d", self.keypoints2d.len_of(Axis(0))),
        ];
        if let Some((name, count)) = row_counts.iter().find(|(_, count)| *count != num_rows) {
            return Err(corrupt(format!(
                "'{}' has {} rows, but 'image_path' has {}",
                name, count, num_rows
            )));
        }

        if self.bbox_xywh.ncols() < 4 {
            return Err(corrupt("'bbox_xywh' must have at least 4 columns".into()));
        }
        let part_boxes = [
            ("lhand_bbox_xywh", &self.lhand_bbox_xywh),
            ("rhand_bbox_xywh", &self.rhand_bbox_xywh),
            ("face_bbox_xywh", &self.face_bbox_xywh),
        ];
        if let Some((name, _)) = part_boxes.iter().find(|(_, boxes)| boxes.ncols() < 5) {
            return Err(corrupt(format!(
                "'{}' must have 5 columns (x, y, w, h, confidence)",
                name
            )));
        }

        let num_keypoints = self.keypoints3d.len_of(Axis(1));
        let keypoint_counts = [
            self.keypoints2d.len_of(Axis(1)),
            self.keypoints3d_mask.len(),
            self.keypoints2d_mask.len(),
        ];
        if keypoint_counts.iter().any(|&count| count != num_keypoints) {
            return Err(corrupt(format!(
                "keypoint arrays disagree on the number of keypoints: {} vs {:?}",
                num_keypoints, keypoint_counts
            )));
        }

        if let Some(field) = REQUIRED_SMPLX_FIELDS
            .iter()
            .find(|field| !self.smplx.contains_key(**field))
        {
            return Err(corrupt(format!(
                "body model parameter '{}{}' is missing",
                SMPLX_PREFIX, field
            )));
        }
        if let Some((field, array)) = self
            .smplx
            .iter()
            .find(|(_, array)| array.ndim() == 0 || array.len_of(Axis(0)) != num_rows)
        {
            return Err(corrupt(format!(
                "body model parameter '{}{}' has shape {:?}, expect {} rows",
                SMPLX_PREFIX,
                field,
                array.shape(),
                num_rows
            )));
        }

        Ok(())
    }
}

/// Looks up archive entries by name, with or without the `.npy` suffix.
struct EntryReader<'a, R>
where
    R: std::io::Read + std::io::Seek,
{
    path: &'a Path,
    npz: &'a mut NpzReader<R>,
    entries: &'a [String],
}

impl<'a, R> EntryReader<'a, R>
where
    R: std::io::Read + std::io::Seek,
{
    fn entry_name(&self, name: &str) -> Result<String> {
        self.entries
            .iter()
            .find(|entry| entry.as_str() == name || entry.strip_suffix(".npy") == Some(name))
            .cloned()
            .ok_or_else(|| {
                DatasetError::corrupt_archive(self.path, format!("array '{}' is missing", name))
                    .into()
            })
    }

    fn read_u8<D>(&mut self, name: &str) -> Result<Array<u8, D>>
    where
        D: Dimension,
    {
        let entry = self.entry_name(name)?;
        self.npz
            .by_name(&entry)
            .map_err(|err| self.read_error(name, err))
    }

    /// Read a float array, accepting either `f32` or `f64` storage.
    fn read_f32<D>(&mut self, name: &str) -> Result<Array<f32, D>>
    where
        D: Dimension,
    {
        let entry = self.entry_name(name)?;
        match self.npz.by_name(&entry) {
            Ok(array) => Ok(array),
            Err(ReadNpzError::Npy(_)) => {
                let array: Array<f64, D> = self
                    .npz
                    .by_name(&entry)
                    .map_err(|err| self.read_error(name, err))?;
                Ok(array.mapv(|value| value as f32))
            }
            Err(err) => Err(self.read_error(name, err)),
        }
    }

    fn read_error(&self, name: &str, err: ReadNpzError) -> Error {
        DatasetError::corrupt_archive(self.path, format!("unable to read '{}': {}", name, err)).into()
    }
}

fn add_array<W, S, D>(
    npz: &mut NpzWriter<W>,
    name: &str,
    array: &ndarray::ArrayBase<S, D>,
) -> Result<()>
where
    W: std::io::Write + std::io::Seek,
    S: Data,
    S::Elem: WritableElement,
    D: Dimension,
{
    npz.add_array(name, array)
        .with_context(|| format!("unable to write array '{}'", name))?;
    Ok(())
}

/// Pack paths into a NUL-padded `(N, L)` UTF-8 byte matrix.
pub fn encode_paths(paths: &[String]) -> Array2<u8> {
    let width = paths.iter().map(|path| path.len()).max().unwrap_or(0);
    let mut bytes = Array2::zeros((paths.len(), width));
    bytes
        .outer_iter_mut()
        .zip(paths)
        .for_each(|(mut row, path)| {
            row.iter_mut()
                .zip(path.as_bytes())
                .for_each(|(dst, &src)| *dst = src);
        });
    bytes
}

/// Unpack a NUL-padded `(N, L)` UTF-8 byte matrix into paths.
pub fn decode_paths(bytes: ArrayView2<'_, u8>) -> Result<Vec<String>> {
    bytes
        .outer_iter()
        .enumerate()
        .map(|(index, row)| {
            let row: Vec<u8> = row.iter().copied().take_while(|&byte| byte != 0).collect();
            String::from_utf8(row)
                .with_context(|| format!("image path at row {} is not valid UTF-8", index))
        })
        .try_collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_encoding() {
        let paths = vec!["images/a.png".to_owned(), "b.jpg".to_owned(), "".to_owned()];
        let bytes = encode_paths(&paths);
        assert_eq!(bytes.dim(), (3, 12));
        assert_eq!(bytes[[1, 5]], 0);
        assert_eq!(decode_paths(bytes.view()).unwrap(), paths);

        let invalid = Array2::from_elem((1, 2), 0xffu8);
        assert!(decode_paths(invalid.view()).is_err());
    }
}
