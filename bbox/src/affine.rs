use crate::common::*;

/// A planar affine transform stored as the top two rows of a 3×3 homogeneous matrix.
///
/// A point `[x, y]` maps to `[a*x + b*y + c, d*x + e*y + f]` where the rows are
/// `[a, b, c]` and `[d, e, f]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine<T> {
    rows: [[T; 3]; 2],
}

impl<T> Affine<T> {
    pub fn from_rows(rows: [[T; 3]; 2]) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[[T; 3]; 2] {
        &self.rows
    }
}

impl<T> Affine<T>
where
    T: Copy + Num,
{
    pub fn identity() -> Self {
        let zero = T::zero();
        let one = T::one();
        Self {
            rows: [[one, zero, zero], [zero, one, zero]],
        }
    }

    pub fn from_scale_translate(sx: T, sy: T, tx: T, ty: T) -> Self {
        let zero = T::zero();
        Self {
            rows: [[sx, zero, tx], [zero, sy, ty]],
        }
    }

    pub fn apply(&self, point: [T; 2]) -> [T; 2] {
        let [x, y] = point;
        let [[a, b, c], [d, e, f]] = self.rows;
        [a * x + b * y + c, d * x + e * y + f]
    }

    /// Rescale the output coordinates per axis.
    pub fn scale_output(&self, sx: T, sy: T) -> Self {
        let zero = T::zero();
        &Self::from_scale_translate(sx, sy, zero, zero) * self
    }
}

impl<T> Affine<T>
where
    T: Float,
{
    fn determinant(&self) -> T {
        let [[a, b, _], [d, e, _]] = self.rows;
        a * e - b * d
    }

    pub fn try_inverse(&self) -> Result<Self> {
        let det = self.determinant();
        ensure!(
            det.abs() > T::epsilon(),
            "the affine transform is singular and cannot be inverted"
        );

        let [[a, b, c], [d, e, f]] = self.rows;
        let ia = e / det;
        let ib = -b / det;
        let id = -d / det;
        let ie = a / det;
        let ic = -(ia * c + ib * f);
        let if_ = -(id * c + ie * f);

        Ok(Self {
            rows: [[ia, ib, ic], [id, ie, if_]],
        })
    }

    /// Solve the unique affine transform sending three source points onto three target points.
    ///
    /// The source points must not be collinear.
    pub fn from_point_triplets(src: [[T; 2]; 3], dst: [[T; 2]; 3]) -> Result<Self> {
        let [[sx0, sy0], [sx1, sy1], [sx2, sy2]] = src;
        let [[dx0, dy0], [dx1, dy1], [dx2, dy2]] = dst;

        // linear part L satisfies L * [u1 u2] = [v1 v2] for the edge vectors u, v
        let (u1x, u1y) = (sx1 - sx0, sy1 - sy0);
        let (u2x, u2y) = (sx2 - sx0, sy2 - sy0);
        let (v1x, v1y) = (dx1 - dx0, dy1 - dy0);
        let (v2x, v2y) = (dx2 - dx0, dy2 - dy0);

        let det = u1x * u2y - u2x * u1y;
        ensure!(
            det.abs() > T::epsilon(),
            "source points are collinear, the affine transform is undetermined"
        );

        // inverse of the source edge matrix
        let (i11, i12) = (u2y / det, -u2x / det);
        let (i21, i22) = (-u1y / det, u1x / det);

        let a = v1x * i11 + v2x * i21;
        let b = v1x * i12 + v2x * i22;
        let d = v1y * i11 + v2y * i21;
        let e = v1y * i12 + v2y * i22;
        let c = dx0 - (a * sx0 + b * sy0);
        let f = dy0 - (d * sx0 + e * sy0);

        Ok(Self {
            rows: [[a, b, c], [d, e, f]],
        })
    }
}

/// `lhs * rhs` applies `rhs` first, then `lhs`.
impl<T> Mul<&Affine<T>> for &Affine<T>
where
    T: Copy + Num,
{
    type Output = Affine<T>;

    fn mul(self, rhs: &Affine<T>) -> Self::Output {
        let [[a, b, c], [d, e, f]] = self.rows;
        let [[ra, rb, rc], [rd, re, rf]] = rhs.rows;
        Affine {
            rows: [
                [a * ra + b * rd, a * rb + b * re, a * rc + b * rf + c],
                [d * ra + e * rd, d * rb + e * re, d * rc + e * rf + f],
            ],
        }
    }
}
