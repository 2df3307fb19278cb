#![allow(dead_code)]

use human_data::{archive::HumanDataArchive, config::Config};
use indexmap::IndexMap;
use ndarray::{Array1, Array2, Array3, ArrayD};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const NUM_NATIVE_KEYPOINTS: usize = 144;
pub const IMAGE_SIZE: u32 = 40;

/// A dataset directory with an archive, images and a config file.
pub struct Fixture {
    pub dir: TempDir,
    pub archive: HumanDataArchive,
}

impl Fixture {
    /// An archive of `num_rows` valid rows with every part box present.
    pub fn new(num_rows: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let archive = build_archive(num_rows);
        Self { dir, archive }
    }

    pub fn data_dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn image_dir(&self) -> PathBuf {
        self.data_dir().join("SSP3D")
    }

    pub fn archive_path(&self) -> PathBuf {
        self.data_dir()
            .join("preprocessed_datasets")
            .join("test.npz")
    }

    /// Write the archive and one image per row.
    pub fn write(&self) {
        std::fs::create_dir_all(self.image_dir()).unwrap();
        std::fs::create_dir_all(self.archive_path().parent().unwrap()).unwrap();
        self.archive.save(self.archive_path()).unwrap();

        self.archive.image_path.iter().for_each(|path| {
            write_image(&self.image_dir().join(path), IMAGE_SIZE, IMAGE_SIZE);
        });
    }

    /// Parse a config pointing at this fixture. `extra` is spliced into the dataset section.
    pub fn config(&self, extra: &str) -> Config {
        let text = format!(
            r#"{{
                dataset: {{
                    name: "SSP3D",
                    data_dir: {:?},
                    filename: "test.npz",
                    image_shape: [{size}, {size}],
                    {}
                }},
                model: {{
                    input_img_shape: [32, 24],
                    output_hm_shape: [8, 8, 6],
                    bbox_padding: 1.0,
                }},
            }}"#,
            self.data_dir().display().to_string(),
            extra,
            size = IMAGE_SIZE,
        );
        let path = self.data_dir().join("config.json5");
        std::fs::write(&path, text).unwrap();
        Config::open(&path).unwrap()
    }
}

pub fn write_image(path: &Path, width: u32, height: u32) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let image = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 8) as u8, (y * 8) as u8, 128])
    });
    image.save(path).unwrap();
}

/// Rows whose body box becomes the exact `(0, 0)-(24, 32)` input crop.
pub fn build_archive(num_rows: usize) -> HumanDataArchive {
    let image_path = (0..num_rows).map(|row| format!("images/{}.png", row)).collect();
    let bbox_xywh = Array2::from_shape_fn((num_rows, 4), |(_, col)| [0.0, 0.0, 25.0, 33.0][col]);
    let part_boxes = |xywhc: [f32; 5]| Array2::from_shape_fn((num_rows, 5), |(_, col)| xywhc[col]);

    let keypoints3d = Array3::from_shape_fn((num_rows, NUM_NATIVE_KEYPOINTS, 4), |(_, k, c)| {
        [0.001 * k as f32, 0.002 * k as f32, 3.0 + 0.001 * k as f32, 1.0][c]
    });
    let keypoints2d = Array3::from_shape_fn((num_rows, NUM_NATIVE_KEYPOINTS, 3), |(_, k, c)| {
        [2.0 + (k % 20) as f32, 3.0 + (k % 20) as f32, 1.0][c]
    });

    let mut smplx = IndexMap::new();
    let mut insert = |name: &str, width: usize| {
        let array: ArrayD<f32> = Array2::from_elem((num_rows, width), 0.01).into_dyn();
        smplx.insert(name.to_owned(), array);
    };
    insert("global_orient", 3);
    insert("body_pose", 63);
    insert("left_hand_pose", 45);
    insert("right_hand_pose", 45);
    insert("jaw_pose", 3);
    insert("betas", 10);
    insert("expression", 10);
    insert("transl", 3);

    HumanDataArchive {
        image_path,
        bbox_xywh,
        lhand_bbox_xywh: part_boxes([6.0, 8.0, 5.0, 5.0, 1.0]),
        rhand_bbox_xywh: part_boxes([14.0, 8.0, 4.0, 6.0, 1.0]),
        face_bbox_xywh: part_boxes([10.0, 1.0, 6.0, 6.0, 1.0]),
        keypoints3d,
        keypoints3d_mask: Array1::ones(NUM_NATIVE_KEYPOINTS),
        keypoints2d,
        keypoints2d_mask: Array1::ones(NUM_NATIVE_KEYPOINTS),
        smplx,
    }
}
