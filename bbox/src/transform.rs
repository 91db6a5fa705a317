use super::{Rect, TLBR};
use crate::{common::*, element::Element, Poly, HW};

/// Per-axis scaling followed by translation, `p' = s * p + t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transform<T> {
    pub sy: T,
    pub sx: T,
    pub ty: T,
    pub tx: T,
}

impl<T> Transform<T>
where
    T: Copy + Num,
{
    pub fn identity() -> Self {
        Self::scale(T::one(), T::one())
    }

    pub fn scale(sy: T, sx: T) -> Self {
        Self {
            sy,
            sx,
            ty: T::zero(),
            tx: T::zero(),
        }
    }
}

impl<T> Transform<T>
where
    T: Copy + Num + PartialOrd,
{
    /// The transform mapping `src` onto `tgt`.
    pub fn from_rects<R>(src: &R, tgt: &R) -> Self
    where
        R: Rect<Type = T>,
    {
        let sy = tgt.h() / src.h();
        let sx = tgt.w() / src.w();
        let ty = tgt.t() - src.t() * sy;
        let tx = tgt.l() - src.l() * sx;

        Self { sy, sx, ty, tx }
    }

    /// Stretch an image of size `src` to size `tgt`.
    pub fn resize(src: &HW<T>, tgt: &HW<T>) -> Self {
        Self::from_rects(&src.to_tlbr(), &tgt.to_tlbr())
    }

    /// Fit an image of size `src` into `tgt` keeping its aspect ratio,
    /// centered and padded on the short side.
    pub fn letterbox(src: &HW<T>, tgt: &HW<T>) -> Self {
        let (new_h, new_w) = if tgt.h() * src.w() <= tgt.w() * src.h() {
            (tgt.h(), src.w() * tgt.h() / src.h())
        } else {
            (src.h() * tgt.w() / src.w(), tgt.w())
        };

        let two = T::one() + T::one();
        let t = (tgt.h() - new_h) / two;
        let l = (tgt.w() - new_w) / two;
        let window = TLBR {
            t,
            l,
            b: t + new_h,
            r: l + new_w,
        };

        Self::from_rects(&src.to_tlbr(), &window)
    }

    pub fn is_uniform(&self) -> bool {
        self.sx == self.sy
    }
}

impl<T> Transform<T>
where
    T: Copy + Num + Neg<Output = T>,
{
    pub fn inverse(&self) -> Self {
        Self {
            sy: T::one() / self.sy,
            sx: T::one() / self.sx,
            ty: -self.ty / self.sy,
            tx: -self.tx / self.sx,
        }
    }
}

impl<T> Mul<&TLBR<T>> for &Transform<T>
where
    T: Copy + Num,
{
    type Output = TLBR<T>;

    fn mul(self, rhs: &TLBR<T>) -> Self::Output {
        rhs.transform(self)
    }
}

impl<T> Mul<&Poly<T>> for &Transform<T>
where
    T: Element,
{
    type Output = Poly<T>;

    fn mul(self, rhs: &Poly<T>) -> Self::Output {
        rhs.transform(self)
    }
}

/// Composition, applying `rhs` first.
impl<T> Mul<&Transform<T>> for &Transform<T>
where
    T: Copy + Num,
{
    type Output = Transform<T>;

    fn mul(self, rhs: &Transform<T>) -> Self::Output {
        Transform {
            sy: self.sy * rhs.sy,
            sx: self.sx * rhs.sx,
            ty: rhs.ty * self.sy + self.ty,
            tx: rhs.tx * self.sx + self.tx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_inverse_and_compose() {
        let transform = Transform {
            sy: 2.0,
            sx: 4.0,
            ty: 1.0,
            tx: -3.0,
        };
        assert_eq!(transform.inverse().inverse(), transform);
        assert_eq!(&transform * &transform.inverse(), Transform::identity());
        assert!(!transform.is_uniform());
    }

    #[test]
    fn transform_resize_and_letterbox() {
        let src = HW::from_hw([80.0, 80.0]);
        let tgt = HW::from_hw([20.0, 40.0]);
        assert_eq!(Transform::resize(&src, &tgt), Transform::scale(0.25, 0.5));

        let letterbox = Transform::letterbox(&src, &tgt);
        assert_eq!(
            letterbox,
            Transform {
                sy: 0.25,
                sx: 0.25,
                ty: 0.0,
                tx: 10.0,
            }
        );
        assert!(letterbox.is_uniform());
    }

    #[test]
    fn transform_poly_round_trip() {
        let transform = Transform::letterbox(&HW::from_hw([80.0, 80.0]), &HW::from_hw([20.0, 40.0]));
        let poly = Poly::try_from_flat(&[4.0, 8.0, 40.0, 8.0, 20.0, 60.0]).unwrap();
        let mapped = &transform * &poly;
        assert_eq!(mapped.to_flat(), vec![11.0, 2.0, 20.0, 2.0, 15.0, 15.0]);
        assert_eq!(&transform.inverse() * &mapped, poly);
    }
}
