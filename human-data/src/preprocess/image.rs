//! Image decoding.

use crate::{common::*, error::DatasetError};
use std::io;

/// Decodes an image file into a `(h, w, 3)` RGB array with values in `[0, 255]`.
pub trait ImageLoader
where
    Self: Debug + Send + Sync,
{
    fn load(&self, path: &Path) -> Result<Array3<f32>>;
}

/// Reads images from the local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskImageLoader;

impl ImageLoader for DiskImageLoader {
    fn load(&self, path: &Path) -> Result<Array3<f32>> {
        if !path.is_file() {
            return Err(DatasetError::MissingImage {
                path: path.to_owned(),
            }
            .into());
        }

        let image = image::open(path)
            .with_context(|| format!("unable to decode image '{}'", path.display()))?
            .to_rgb8();
        let (width, height) = image.dimensions();
        ensure!(
            width > 0 && height > 0,
            "image '{}' is empty",
            path.display()
        );

        let array = Array3::from_shape_vec(
            (height as usize, width as usize, 3),
            image.into_raw(),
        )?
        .mapv(f32::from);
        Ok(array)
    }
}

/// Read the `(h, w)` shape from the image header without decoding pixels.
///
/// A file that does not exist is [DatasetError::MissingImage]. Other read failures and
/// unsupported or corrupted headers are untyped errors.
pub fn read_image_shape(path: &Path) -> Result<HW<usize>> {
    let size = imagesize::size(path).map_err(|err| -> Error {
        match err {
            imagesize::ImageError::IoError(err) if err.kind() == io::ErrorKind::NotFound => {
                DatasetError::MissingImage {
                    path: path.to_owned(),
                }
                .into()
            }
            imagesize::ImageError::IoError(err) => {
                Error::new(err).context(format!("unable to read image '{}'", path.display()))
            }
            imagesize::ImageError::NotSupported => {
                format_err!("the image format of '{}' is not supported", path.display())
            }
            imagesize::ImageError::CorruptedImage => {
                format_err!("the image header of '{}' is corrupted", path.display())
            }
        }
    })?;
    Ok(HW::from_hw([size.height, size.width]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_rgb_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.png");
        let image = image::RgbImage::from_fn(4, 2, |x, y| image::Rgb([x as u8, y as u8, 200]));
        image.save(&path).unwrap();

        let array = DiskImageLoader.load(&path).unwrap();
        assert_eq!(array.dim(), (2, 4, 3));
        assert_eq!(array[[1, 3, 0]], 3.0);
        assert_eq!(array[[1, 3, 1]], 1.0);
        assert_eq!(array[[0, 0, 2]], 200.0);
        assert_eq!(read_image_shape(&path).unwrap().hw(), [2, 4]);
    }

    #[test]
    fn missing_image_is_typed() {
        let err = DiskImageLoader
            .load(Path::new("/nonexistent/image.png"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::MissingImage { .. })
        ));
        let err = read_image_shape(Path::new("/nonexistent/image.png")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::MissingImage { .. })
        ));
    }

    #[test]
    fn corrupted_header_is_not_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.png");
        fs::write(&path, b"not an image").unwrap();

        let err = read_image_shape(&path).unwrap_err();
        assert!(err.downcast_ref::<DatasetError>().is_none());
        let err = DiskImageLoader.load(&path).unwrap_err();
        assert!(err.downcast_ref::<DatasetError>().is_none());

        // a directory exists but cannot be read as an image
        let err = read_image_shape(dir.path()).unwrap_err();
        assert!(err.downcast_ref::<DatasetError>().is_none());
    }
}
