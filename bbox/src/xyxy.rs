use super::{CxCyWH, Rect, RectFloat};
use crate::{common::*, Affine};

/// Bounding box in corner format, `(xmin, ymin, xmax, ymax)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XYXY<T> {
    pub(crate) l: T,
    pub(crate) t: T,
    pub(crate) r: T,
    pub(crate) b: T,
}

impl<T> XYXY<T>
where
    T: Copy + Num + PartialOrd,
{
    /// Mirror the box about the vertical centerline of an image with `width` pixels.
    ///
    /// Pixel `x` maps to `width - x - 1`, so the former right edge becomes the left edge.
    pub fn flip_horizontal(&self, width: T) -> Self {
        let one = T::one();
        Self {
            l: width - self.r - one,
            t: self.t,
            r: width - self.l - one,
            b: self.b,
        }
    }
}

impl<T> XYXY<T>
where
    T: Float,
{
    /// Send the four corners through the affine transform and take their enclosing box.
    pub fn transform(&self, affine: &Affine<T>) -> Self {
        let corners = self.corners().map(|point| affine.apply(point));
        let [[x0, y0], [x1, y1], [x2, y2], [x3, y3]] = corners;
        Self {
            l: x0.min(x1).min(x2).min(x3),
            t: y0.min(y1).min(y2).min(y3),
            r: x0.max(x1).max(x2).max(x3),
            b: y0.max(y1).max(y2).max(y3),
        }
    }
}

impl<T> Rect for XYXY<T>
where
    T: Copy + Num + PartialOrd,
{
    type Type = T;

    fn l(&self) -> Self::Type {
        self.l
    }

    fn t(&self) -> Self::Type {
        self.t
    }

    fn r(&self) -> Self::Type {
        self.r
    }

    fn b(&self) -> Self::Type {
        self.b
    }

    fn cx(&self) -> Self::Type {
        let two = T::one() + T::one();
        (self.l + self.r) / two
    }

    fn cy(&self) -> Self::Type {
        let two = T::one() + T::one();
        (self.t + self.b) / two
    }

    fn w(&self) -> Self::Type {
        self.r - self.l
    }

    fn h(&self) -> Self::Type {
        self.b - self.t
    }

    fn try_from_xyxy(xyxy: [Self::Type; 4]) -> Result<Self> {
        let [l, t, r, b] = xyxy;
        ensure!(r >= l && b >= t, "r >= l and b >= t must hold");
        Ok(Self { l, t, r, b })
    }

    fn try_from_xywh(xywh: [Self::Type; 4]) -> Result<Self> {
        let [l, t, w, h] = xywh;
        Self::try_from_xyxy([l, t, l + w, t + h])
    }

    fn try_from_cxcywh(cxcywh: [Self::Type; 4]) -> Result<Self> {
        let [cx, cy, w, h] = cxcywh;
        let zero = T::zero();
        ensure!(w >= zero && h >= zero, "w and h must be non-negative");

        let two = T::one() + T::one();
        Ok(Self {
            l: cx - w / two,
            t: cy - h / two,
            r: cx + w / two,
            b: cy + h / two,
        })
    }
}

impl<T> From<CxCyWH<T>> for XYXY<T>
where
    T: Copy + Num,
{
    fn from(from: CxCyWH<T>) -> Self {
        Self::from(&from)
    }
}

impl<T> From<&CxCyWH<T>> for XYXY<T>
where
    T: Copy + Num,
{
    fn from(from: &CxCyWH<T>) -> Self {
        let two = T::one() + T::one();
        let CxCyWH { cx, cy, w, h } = *from;
        Self {
            l: cx - w / two,
            t: cy - h / two,
            r: cx + w / two,
            b: cy + h / two,
        }
    }
}
