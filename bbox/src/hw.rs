use crate::common::*;

/// The `(h, w)` shape of an image, a crop or a heatmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HW<T> {
    h: T,
    w: T,
}

impl<T> HW<T>
where
    T: Num + PartialOrd + Copy,
{
    /// Build from `[h, w]`, rejecting negative sides.
    pub fn try_from_hw(hw: [T; 2]) -> Result<Self> {
        let [h, w] = hw;
        let zero = T::zero();
        ensure!(h >= zero && w >= zero, "shape sides must be non-negative");
        Ok(Self { h, w })
    }

    /// Build from `[h, w]`.
    ///
    /// # Panics
    /// If either side is negative.
    pub fn from_hw(hw: [T; 2]) -> Self {
        Self::try_from_hw(hw).unwrap()
    }

    pub fn hw(&self) -> [T; 2] {
        [self.h, self.w]
    }

    pub fn h(&self) -> T {
        self.h
    }

    pub fn w(&self) -> T {
        self.w
    }

    pub fn is_empty(&self) -> bool {
        let zero = T::zero();
        self.h == zero || self.w == zero
    }
}

impl<T> HW<T>
where
    T: ToPrimitive + Copy,
{
    pub fn try_cast<U>(self) -> Option<HW<U>>
    where
        U: NumCast,
    {
        Some(HW {
            h: U::from(self.h)?,
            w: U::from(self.w)?,
        })
    }

    pub fn cast<U>(self) -> HW<U>
    where
        U: NumCast,
    {
        self.try_cast().unwrap()
    }

    /// The `w / h` ratio.
    pub fn aspect_ratio(&self) -> f32 {
        self.cast::<f32>().w / self.cast::<f32>().h
    }

    /// The `[x, y]` factors that map coordinates in this shape to coordinates in `target`.
    pub fn scale_to<U>(&self, target: &HW<U>) -> [f32; 2]
    where
        U: ToPrimitive + Copy,
    {
        let src = self.cast::<f32>();
        let dst = target.cast::<f32>();
        [dst.w / src.w, dst.h / src.h]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_negative_sides() {
        assert!(HW::try_from_hw([-1.0, 2.0]).is_err());
        assert!(HW::from_hw([0usize, 4]).is_empty());
    }

    #[test]
    fn ratios_between_shapes() {
        let input = HW::from_hw([512usize, 384]);
        let heatmap = HW::from_hw([64usize, 48]);
        assert_eq!(input.aspect_ratio(), 0.75);
        assert_eq!(input.scale_to(&heatmap), [0.125, 0.125]);
        assert_eq!(input.cast::<f32>().hw(), [512.0, 384.0]);
    }
}
