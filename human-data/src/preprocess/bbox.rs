//! Body box sanitization and aspect-ratio padding.

use crate::common::*;

/// Clamp a raw `[x, y, w, h]` body box into the image, then pad it to the network input aspect ratio.
///
/// Returns `None` if the box is degenerate after clamping. The `aspect_ratio` is `w / h` of the
/// network input, and `padding` enlarges both sides after the aspect correction.
pub fn process_bbox(
    xywh: [f32; 4],
    image_shape: HW<usize>,
    aspect_ratio: f32,
    padding: f32,
) -> Option<XYXY<f32>> {
    let sanitized = sanitize_bbox(xywh, image_shape)?;
    let padded = CxCyWH::from(sanitized)
        .try_expand_to_aspect(aspect_ratio)
        .ok()?
        .try_scale(padding)
        .ok()?;
    Some(padded.to_xyxy())
}

fn sanitize_bbox(xywh: [f32; 4], image_shape: HW<usize>) -> Option<XYXY<f32>> {
    if xywh.iter().any(|value| !value.is_finite()) {
        return None;
    }

    let [x, y, w, h] = xywh;
    let img_w = image_shape.w() as f32;
    let img_h = image_shape.h() as f32;

    let x1 = x.max(0.0);
    let y1 = y.max(0.0);
    let x2 = (img_w - 1.0).min(x1 + (w - 1.0).max(0.0));
    let y2 = (img_h - 1.0).min(y1 + (h - 1.0).max(0.0));

    if w * h > 0.0 && x2 > x1 && y2 > y1 {
        XYXY::try_from_xyxy([x1, y1, x2, y2]).ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn degenerate_boxes_are_rejected() {
        let shape = HW::from_hw([512, 512]);
        assert!(process_bbox([10.0, 10.0, 0.0, 50.0], shape, 0.75, 1.25).is_none());
        assert!(process_bbox([10.0, 10.0, 50.0, -3.0], shape, 0.75, 1.25).is_none());
        assert!(process_bbox([600.0, 10.0, 50.0, 50.0], shape, 0.75, 1.25).is_none());
        assert!(process_bbox([f32::NAN, 10.0, 50.0, 50.0], shape, 0.75, 1.25).is_none());
        assert!(process_bbox([10.0, f32::NAN, 50.0, 50.0], shape, 0.75, 1.25).is_none());
        assert!(process_bbox([10.0, 10.0, f32::INFINITY, 50.0], shape, 0.75, 1.25).is_none());
    }

    #[test]
    fn box_is_clamped_then_padded() {
        let shape = HW::from_hw([512, 512]);

        // clamped to corners (450, 0) and (511, 99)
        let rect = process_bbox([450.0, -5.0, 100.0, 100.0], shape, 0.75, 1.25).unwrap();
        let [cx, cy] = rect.center();
        let [w, h] = rect.size();
        assert_abs_diff_eq!(cx, 480.5, epsilon = 1e-4);
        assert_abs_diff_eq!(cy, 49.5, epsilon = 1e-4);
        // the width grows to 0.75 * 99 before padding
        assert_abs_diff_eq!(w, 99.0 * 0.75 * 1.25, epsilon = 1e-3);
        assert_abs_diff_eq!(h, 99.0 * 1.25, epsilon = 1e-3);

        // a wide box grows in height instead
        let rect = process_bbox([0.0, 0.0, 201.0, 101.0], shape, 1.0, 1.0).unwrap();
        assert_eq!(rect.size(), [200.0, 200.0]);
        assert_eq!(rect.center(), [100.0, 50.0]);
    }
}
