use super::{Rect, XYXY};
use crate::common::*;

/// Bounding box in center-size format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CxCyWH<T> {
    pub(crate) cx: T,
    pub(crate) cy: T,
    pub(crate) w: T,
    pub(crate) h: T,
}

impl<T> CxCyWH<T>
where
    T: Copy + Num + PartialOrd,
{
    pub fn try_scale(&self, scale: T) -> Result<Self> {
        self.try_scale_wh(scale, scale)
    }

    pub fn try_scale_wh(&self, scale_w: T, scale_h: T) -> Result<Self> {
        let zero = T::zero();
        ensure!(
            scale_w > zero && scale_h > zero,
            "scaling factor must be positive"
        );

        let Self { cx, cy, w, h } = *self;
        Ok(Self {
            cx,
            cy,
            w: w * scale_w,
            h: h * scale_h,
        })
    }

    /// Grow the shorter side so that `w / h` equals `aspect_ratio`, keeping the center fixed.
    pub fn try_expand_to_aspect(&self, aspect_ratio: T) -> Result<Self> {
        ensure!(aspect_ratio > T::zero(), "aspect ratio must be positive");

        let Self { cx, cy, w, h } = *self;
        let (w, h) = if w > aspect_ratio * h {
            (w, w / aspect_ratio)
        } else if w < aspect_ratio * h {
            (h * aspect_ratio, h)
        } else {
            (w, h)
        };
        Ok(Self { cx, cy, w, h })
    }
}

impl<T> Rect for CxCyWH<T>
where
    T: Copy + Num + PartialOrd,
{
    type Type = T;

    fn l(&self) -> Self::Type {
        let two = T::one() + T::one();
        self.cx - self.w / two
    }

    fn t(&self) -> Self::Type {
        let two = T::one() + T::one();
        self.cy - self.h / two
    }

    fn r(&self) -> Self::Type {
        let two = T::one() + T::one();
        self.cx + self.w / two
    }

    fn b(&self) -> Self::Type {
        let two = T::one() + T::one();
        self.cy + self.h / two
    }

    fn cx(&self) -> Self::Type {
        self.cx
    }

    fn cy(&self) -> Self::Type {
        self.cy
    }

    fn w(&self) -> Self::Type {
        self.w
    }

    fn h(&self) -> Self::Type {
        self.h
    }

    fn try_from_xyxy(xyxy: [T; 4]) -> Result<Self> {
        let [l, t, r, b] = xyxy;
        ensure!(
            r >= l && b >= t,
            "box width and height must be non-negative"
        );

        let two = T::one() + T::one();
        let w = r - l;
        let h = b - t;
        Ok(Self {
            cx: l + w / two,
            cy: t + h / two,
            w,
            h,
        })
    }

    fn try_from_xywh(xywh: [T; 4]) -> Result<Self> {
        let [l, t, w, h] = xywh;
        let zero = T::zero();
        ensure!(
            w >= zero && h >= zero,
            "box width and height must be non-negative"
        );

        let two = T::one() + T::one();
        Ok(Self {
            cx: l + w / two,
            cy: t + h / two,
            w,
            h,
        })
    }

    fn try_from_cxcywh(cxcywh: [T; 4]) -> Result<Self> {
        let [cx, cy, w, h] = cxcywh;
        let zero = T::zero();
        ensure!(
            w >= zero && h >= zero,
            "box width and height must be non-negative"
        );

        Ok(Self { cx, cy, w, h })
    }
}

impl<T> From<XYXY<T>> for CxCyWH<T>
where
    T: Copy + Num,
{
    fn from(from: XYXY<T>) -> Self {
        Self::from(&from)
    }
}

impl<T> From<&XYXY<T>> for CxCyWH<T>
where
    T: Copy + Num,
{
    fn from(from: &XYXY<T>) -> Self {
        let two = T::one() + T::one();
        let XYXY { l, t, r, b } = *from;
        let w = r - l;
        let h = b - t;
        Self {
            cx: l + w / two,
            cy: t + h / two,
            w,
            h,
        }
    }
}
