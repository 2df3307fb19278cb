//! Random crop, rotation, flip and color augmentation.

use crate::{common::*, config::{AugmentationConfig, DataSplit}};
use image::{ImageBuffer, Rgb, Rgb32FImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use nalgebra::{RealField, UnitQuaternion, Vector3};

/// The random augmentation parameters of one fetch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AugmentationParams {
    /// Crop scale relative to the body box.
    pub scale: f32,
    /// In-plane rotation in degrees.
    pub rot: f32,
    /// Per-channel color multipliers in RGB order.
    pub color_scale: [f32; 3],
    pub do_flip: bool,
}

impl AugmentationParams {
    /// No scaling, no rotation, no flip and unchanged colors.
    pub fn identity() -> Self {
        Self {
            scale: 1.0,
            rot: 0.0,
            color_scale: [1.0; 3],
            do_flip: false,
        }
    }

    pub fn sample(config: &AugmentationConfig, rng: &mut dyn RngCore) -> Self {
        let AugmentationConfig {
            scale_factor,
            rot_factor,
            rot_prob,
            color_factor,
            flip_prob,
        } = *config;
        let scale_factor = scale_factor.raw() as f32;
        let rot_factor = rot_factor.raw() as f32;
        let color_factor = color_factor.raw() as f32;

        let scale = standard_normal(rng).clamp(-1.0, 1.0) * scale_factor + 1.0;
        let rot = if rng.gen_bool(rot_prob.raw()) {
            standard_normal(rng).clamp(-2.0, 2.0) * rot_factor
        } else {
            0.0
        };
        let color_scale = [(); 3].map(|()| {
            if color_factor > 0.0 {
                rng.gen_range((1.0 - color_factor)..=(1.0 + color_factor))
            } else {
                1.0
            }
        });
        let do_flip = rng.gen_bool(flip_prob.raw());

        Self {
            scale,
            rot,
            color_scale,
            do_flip,
        }
    }
}

/// The geometric state shared by every coordinate transform of one fetch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AugmentationState {
    /// Maps original image pixels to input patch pixels.
    pub img2bb_trans: Affine<f32>,
    /// Maps input patch pixels back to original image pixels.
    pub bb2img_trans: Affine<f32>,
    /// In-plane rotation in degrees.
    pub rot: f32,
    pub do_flip: bool,
}

impl AugmentationState {
    /// The camera-space rotation about the z axis that matches the in-plane patch rotation.
    pub fn camera_rotation<T>(&self) -> UnitQuaternion<T>
    where
        T: RealField,
    {
        let angle: T = nalgebra::convert(-(self.rot as f64).to_radians());
        UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angle)
    }
}

/// An augmented input patch with its geometric state.
#[derive(Debug, Clone)]
pub struct Augmented {
    /// `(3, input_h, input_w)` patch with values in `[0, 1]`.
    pub image: Array3<f32>,
    pub state: AugmentationState,
}

/// Produces the network input patch of a sample.
pub trait Augmenter
where
    Self: Debug + Send + Sync,
{
    /// Draw the parameters for one fetch on the given split.
    fn sample_params(&self, split: DataSplit, rng: &mut dyn RngCore) -> AugmentationParams;

    /// Crop the `(h, w, 3)` image around the body box under the given parameters.
    fn augment(
        &self,
        image: ArrayView3<'_, f32>,
        bbox: &XYXY<f32>,
        params: &AugmentationParams,
    ) -> Result<Augmented>;
}

/// Crops a rotated and scaled patch around the body box with bilinear sampling.
#[derive(Debug, Clone)]
pub struct PatchAugmenter {
    config: AugmentationConfig,
    out_shape: HW<usize>,
}

impl PatchAugmenter {
    pub fn new(config: AugmentationConfig, out_shape: HW<usize>) -> Self {
        Self { config, out_shape }
    }
}

impl Augmenter for PatchAugmenter {
    fn sample_params(&self, split: DataSplit, rng: &mut dyn RngCore) -> AugmentationParams {
        match split {
            DataSplit::Train => AugmentationParams::sample(&self.config, rng),
            DataSplit::Test => AugmentationParams::identity(),
        }
    }

    fn augment(
        &self,
        image: ArrayView3<'_, f32>,
        bbox: &XYXY<f32>,
        params: &AugmentationParams,
    ) -> Result<Augmented> {
        let (img_h, img_w, channels) = image.dim();
        ensure!(
            channels == 3,
            "expect a 3-channel image, but found {} channels",
            channels
        );
        ensure!(img_h > 0 && img_w > 0, "the image is empty");

        let AugmentationParams {
            scale,
            rot,
            color_scale,
            do_flip,
        } = *params;

        let image = if do_flip {
            image.slice_move(s![.., ..;-1, ..])
        } else {
            image
        };
        let [cx, cy] = bbox.center();
        let cx = if do_flip { img_w as f32 - cx - 1.0 } else { cx };
        let [bw, bh] = bbox.size();

        let img2bb_trans = patch_transform([cx, cy], [bw, bh], scale, rot, self.out_shape)?;
        let bb2img_trans = img2bb_trans.try_inverse()?;

        let patch = warp_bilinear(image, &img2bb_trans, self.out_shape)?;
        let patch = normalize_colors(patch, color_scale);

        Ok(Augmented {
            image: patch,
            state: AugmentationState {
                img2bb_trans,
                bb2img_trans,
                rot,
                do_flip,
            },
        })
    }
}

/// Build the affine transform from a rotated, scaled box to the output patch.
pub fn patch_transform(
    center: [f32; 2],
    size: [f32; 2],
    scale: f32,
    rot: f32,
    out_shape: HW<usize>,
) -> Result<Affine<f32>> {
    let [cx, cy] = center;
    let [src_w, src_h] = size.map(|side| side * scale);
    let [dst_h, dst_w] = out_shape.cast::<f32>().hw();

    let rot_rad = rot.to_radians();
    let src_down = rotate_2d([0.0, src_h * 0.5], rot_rad);
    let src_right = rotate_2d([src_w * 0.5, 0.0], rot_rad);

    let src = [
        [cx, cy],
        [cx + src_down[0], cy + src_down[1]],
        [cx + src_right[0], cy + src_right[1]],
    ];
    let dst = [
        [dst_w * 0.5, dst_h * 0.5],
        [dst_w * 0.5, dst_h],
        [dst_w, dst_h * 0.5],
    ];

    Affine::from_point_triplets(src, dst).context("the body box is degenerate")
}

fn rotate_2d(point: [f32; 2], rot_rad: f32) -> [f32; 2] {
    let [x, y] = point;
    let (sn, cs) = rot_rad.sin_cos();
    [x * cs - y * sn, x * sn + y * cs]
}

/// Resample the `(h, w, 3)` image into the patch that `img2bb_trans` maps it onto.
///
/// Pixels sampled outside the image read as zero. The output is `(3, h, w)`.
fn warp_bilinear(
    image: ArrayView3<'_, f32>,
    img2bb_trans: &Affine<f32>,
    out_shape: HW<usize>,
) -> Result<Array3<f32>> {
    let (img_h, img_w, _) = image.dim();
    let [out_h, out_w] = out_shape.hw();

    let src: Rgb32FImage = ImageBuffer::from_raw(
        img_w as u32,
        img_h as u32,
        image.iter().copied().collect(),
    )
    .ok_or_else(|| format_err!("the image buffer does not match its {}x{} shape", img_w, img_h))?;

    let [[a, b, c], [d, e, f]] = *img2bb_trans.rows();
    let projection = Projection::from_matrix([a, b, c, d, e, f, 0.0, 0.0, 1.0])
        .ok_or_else(|| format_err!("the crop transform is not invertible"))?;

    let mut patch = Rgb32FImage::new(out_w as u32, out_h as u32);
    warp_into(
        &src,
        &projection,
        Interpolation::Bilinear,
        Rgb([0.0; 3]),
        &mut patch,
    );

    let patch = Array3::from_shape_vec((out_h, out_w, 3), patch.into_raw())?
        .permuted_axes([2, 0, 1])
        .as_standard_layout()
        .into_owned();
    Ok(patch)
}

/// Apply per-channel color scales, clip to `[0, 255]` and rescale to `[0, 1]`.
fn normalize_colors(mut patch: Array3<f32>, color_scale: [f32; 3]) -> Array3<f32> {
    patch
        .outer_iter_mut()
        .zip(color_scale)
        .for_each(|(mut channel, scale)| {
            channel.mapv_inplace(|value| (value * scale).clamp(0.0, 255.0) / 255.0);
        });
    patch
}

/// Draw from the standard normal distribution with the Box-Muller transform.
fn standard_normal(rng: &mut dyn RngCore) -> f32 {
    let u1: f32 = 1.0 - rng.gen::<f32>();
    let u2: f32 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn assert_point_eq(lhs: [f32; 2], rhs: [f32; 2]) {
        assert_abs_diff_eq!(lhs[0], rhs[0], epsilon = 1e-3);
        assert_abs_diff_eq!(lhs[1], rhs[1], epsilon = 1e-3);
    }

    #[test]
    fn identity_patch_transform() {
        let out_shape = HW::from_hw([64, 48]);
        // a box of the same size as the output maps by pure translation
        let trans = patch_transform([100.0, 80.0], [48.0, 64.0], 1.0, 0.0, out_shape).unwrap();
        assert_point_eq(trans.apply([100.0, 80.0]), [24.0, 32.0]);
        assert_point_eq(trans.apply([76.0, 48.0]), [0.0, 0.0]);
    }

    #[test]
    fn rotated_patch_transform() {
        let out_shape = HW::from_hw([10, 10]);
        let trans = patch_transform([0.0, 0.0], [10.0, 10.0], 2.0, 90.0, out_shape).unwrap();
        // the source down direction rotates to the left
        assert_point_eq(trans.apply([-10.0, 0.0]), [5.0, 10.0]);
        assert_point_eq(trans.apply([0.0, 10.0]), [10.0, 5.0]);
        assert_point_eq(trans.apply([0.0, 0.0]), [5.0, 5.0]);
    }

    #[test]
    fn crop_and_color() {
        // horizontal gradient: pixel value equals x
        let image = Array3::from_shape_fn((8, 8, 3), |(_y, x, _c)| x as f32);
        let bbox = XYXY::from_xyxy([2.0, 2.0, 6.0, 6.0]);
        let augmenter = PatchAugmenter::new(AugmentationConfig::default(), HW::from_hw([4, 4]));

        let mut params = AugmentationParams::identity();
        params.color_scale = [1.0, 2.0, 0.5];
        let augmented = augmenter.augment(image.view(), &bbox, &params).unwrap();
        let patch = &augmented.image;
        assert_eq!(patch.dim(), (3, 4, 4));
        // patch pixel u samples image x = u + 2
        assert_abs_diff_eq!(patch[[0, 1, 0]], 2.0 / 255.0, epsilon = 1e-5);
        assert_abs_diff_eq!(patch[[0, 1, 3]], 5.0 / 255.0, epsilon = 1e-5);
        assert_abs_diff_eq!(patch[[1, 1, 3]], 10.0 / 255.0, epsilon = 1e-5);
        assert_abs_diff_eq!(patch[[2, 1, 3]], 2.5 / 255.0, epsilon = 1e-5);

        params.do_flip = true;
        let flipped = augmenter.augment(image.view(), &bbox, &params).unwrap();
        // the mirrored box starts at x = 1 of the mirrored image, holding value 6
        assert_abs_diff_eq!(flipped.image[[0, 1, 0]], 6.0 / 255.0, epsilon = 1e-5);
        assert!(flipped.state.do_flip);
    }

    #[test]
    fn state_holds_inverse_transforms() {
        let image = Array3::from_elem((40, 30, 3), 255.0);
        let bbox = XYXY::from_xyxy([5.0, 4.0, 25.0, 36.0]);
        let augmenter = PatchAugmenter::new(AugmentationConfig::default(), HW::from_hw([16, 12]));
        let params = AugmentationParams {
            scale: 1.1,
            rot: 30.0,
            ..AugmentationParams::identity()
        };
        let Augmented { image: patch, state } = augmenter.augment(image.view(), &bbox, &params).unwrap();

        [[3.0, -7.0], [15.0, 20.0]].into_iter().for_each(|point| {
            assert_point_eq(state.bb2img_trans.apply(state.img2bb_trans.apply(point)), point);
        });
        // the patch center samples the inside of the image, the rotated corners fall outside
        assert_abs_diff_eq!(patch[[0, 8, 6]], 1.0, epsilon = 1e-5);
        assert_eq!(patch[[0, 0, 0]], 0.0);
    }

    #[test]
    fn camera_rotation_follows_patch_rotation() {
        let state = AugmentationState {
            img2bb_trans: Affine::identity(),
            bb2img_trans: Affine::identity(),
            rot: 90.0,
            do_flip: false,
        };
        let rotated = state.camera_rotation::<f32>() * Vector3::new(1.0, 0.0, 2.0);
        assert_abs_diff_eq!(rotated.x, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(rotated.y, -1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(rotated.z, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn sampled_params_follow_config() {
        let mut rng = StdRng::seed_from_u64(7);
        let config = AugmentationConfig::default();
        (0..200).for_each(|_| {
            let params = AugmentationParams::sample(&config, &mut rng);
            assert!((0.75..=1.25).contains(&params.scale));
            assert!((-60.0..=60.0).contains(&params.rot));
            params
                .color_scale
                .iter()
                .for_each(|scale| assert!((0.8..=1.2).contains(scale)));
        });

        let augmenter = PatchAugmenter::new(config, HW::from_hw([4, 4]));
        let params = augmenter.sample_params(DataSplit::Test, &mut rng);
        assert_eq!(params, AugmentationParams::identity());
    }
}
