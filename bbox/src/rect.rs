use super::XYXY;
use crate::common::*;

/// The generic axis-aligned rectangle in image coordinates.
///
/// The x axis points right and the y axis points down.
pub trait Rect {
    type Type;

    fn l(&self) -> Self::Type;
    fn t(&self) -> Self::Type;
    fn r(&self) -> Self::Type;
    fn b(&self) -> Self::Type;
    fn cx(&self) -> Self::Type;
    fn cy(&self) -> Self::Type;
    fn w(&self) -> Self::Type;
    fn h(&self) -> Self::Type;

    fn try_from_xyxy(xyxy: [Self::Type; 4]) -> Result<Self>
    where
        Self: Sized;

    fn try_from_xywh(xywh: [Self::Type; 4]) -> Result<Self>
    where
        Self: Sized;

    fn try_from_cxcywh(cxcywh: [Self::Type; 4]) -> Result<Self>
    where
        Self: Sized;
}

pub trait RectNum: Rect
where
    Self::Type: Num + PartialOrd,
{
    /// Panics if `r < l` or `b < t`.
    fn from_xyxy(xyxy: [Self::Type; 4]) -> Self
    where
        Self: Sized,
    {
        Self::try_from_xyxy(xyxy).unwrap()
    }

    /// Panics if the width or height is negative.
    fn from_xywh(xywh: [Self::Type; 4]) -> Self
    where
        Self: Sized,
    {
        Self::try_from_xywh(xywh).unwrap()
    }

    /// Panics if the width or height is negative.
    fn from_cxcywh(cxcywh: [Self::Type; 4]) -> Self
    where
        Self: Sized,
    {
        Self::try_from_cxcywh(cxcywh).unwrap()
    }

    fn xyxy(&self) -> [Self::Type; 4] {
        [self.l(), self.t(), self.r(), self.b()]
    }

    fn xywh(&self) -> [Self::Type; 4] {
        [self.l(), self.t(), self.w(), self.h()]
    }

    fn cxcywh(&self) -> [Self::Type; 4] {
        [self.cx(), self.cy(), self.w(), self.h()]
    }

    /// The center point in `[x, y]` order.
    fn center(&self) -> [Self::Type; 2] {
        [self.cx(), self.cy()]
    }

    /// The size in `[w, h]` order.
    fn size(&self) -> [Self::Type; 2] {
        [self.w(), self.h()]
    }

    fn to_xyxy(&self) -> XYXY<Self::Type> {
        XYXY {
            l: self.l(),
            t: self.t(),
            r: self.r(),
            b: self.b(),
        }
    }
}

pub trait RectFloat: RectNum
where
    Self::Type: Float,
{
    /// The four corners in clockwise order starting from top-left.
    fn corners(&self) -> [[Self::Type; 2]; 4] {
        let [l, t, r, b] = self.xyxy();
        [[l, t], [r, t], [r, b], [l, b]]
    }
}

impl<T> RectNum for T
where
    T: Rect,
    T::Type: Num + PartialOrd,
{
}

impl<T> RectFloat for T
where
    T: Rect,
    T::Type: Float,
{
}
