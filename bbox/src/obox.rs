use crate::{
    angle::AngleRange, common::*, element::Element, point::Point, poly::Poly, rect::Rect,
    tlbr::TLBR, transform::Transform, HW,
};

/// Oriented bounding box in (cx, cy, w, h, angle) format.
///
/// The angle is in radians. Width and height are non-negative and all
/// parameters are finite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OBox<T> {
    pub(crate) cx: T,
    pub(crate) cy: T,
    pub(crate) w: T,
    pub(crate) h: T,
    pub(crate) angle: T,
}

/// Unchecked oriented box.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OBox_<T> {
    pub cx: T,
    pub cy: T,
    pub w: T,
    pub h: T,
    pub angle: T,
}

/// Image flip direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Flip {
    Horizontal,
    Vertical,
}

impl<T> OBox<T>
where
    T: Element,
{
    pub fn try_from_cxcywha(params: [T; 5]) -> Result<Self> {
        let [cx, cy, w, h, angle] = params;
        ensure!(
            params.iter().all(|value| value.is_finite()),
            "box parameters must be finite, but get {:?}",
            params
        );
        ensure!(
            w >= T::zero() && h >= T::zero(),
            "box width and height must be non-negative"
        );
        Ok(Self {
            cx,
            cy,
            w,
            h,
            angle,
        })
    }

    pub fn from_cxcywha(params: [T; 5]) -> Self {
        Self::try_from_cxcywha(params).unwrap()
    }

    pub fn cx(&self) -> T {
        self.cx
    }

    pub fn cy(&self) -> T {
        self.cy
    }

    pub fn w(&self) -> T {
        self.w
    }

    pub fn h(&self) -> T {
        self.h
    }

    pub fn angle(&self) -> T {
        self.angle
    }

    pub fn center(&self) -> Point<T> {
        Point::new(self.cx, self.cy)
    }

    pub fn cxcywha(&self) -> [T; 5] {
        [self.cx, self.cy, self.w, self.h, self.angle]
    }

    pub fn area(&self) -> T {
        self.w * self.h
    }

    pub fn try_cast<V>(self) -> Option<OBox<V>>
    where
        V: Element,
    {
        Some(OBox {
            cx: V::from(self.cx)?,
            cy: V::from(self.cy)?,
            w: V::from(self.w)?,
            h: V::from(self.h)?,
            angle: V::from(self.angle)?,
        })
    }

    /// Map the box into the canonical form of the angle convention.
    ///
    /// Regularizing a regularized box returns the same box.
    pub fn regularize(&self, range: AngleRange) -> Self {
        OBox_::from(self).regularize(range)
    }

    pub fn is_regular(&self, range: AngleRange) -> bool {
        range.contains(self.angle) && (!range.is_long_edge() || self.w >= self.h)
    }

    /// The four corners, starting at the local `(-w/2, -h/2)` corner.
    ///
    /// The corners run clockwise on screen, where y points downward.
    pub fn corners(&self) -> [Point<T>; 4] {
        let two = T::one() + T::one();
        let hw = self.w / two;
        let hh = self.h / two;
        let center = self.center();
        [
            Point::new(-hw, -hh),
            Point::new(hw, -hh),
            Point::new(hw, hh),
            Point::new(-hw, hh),
        ]
        .map(|corner| center + corner.rotate(self.angle))
    }

    pub fn to_poly(&self) -> Poly<T> {
        Poly {
            points: self.corners().to_vec(),
        }
    }

    /// The tight axis-aligned box enclosing the rotated corners.
    pub fn to_tlbr(&self) -> TLBR<T> {
        let two = T::one() + T::one();
        let (sin, cos) = self.angle.sin_cos();
        let half_x = (self.w * cos).abs() / two + (self.h * sin).abs() / two;
        let half_y = (self.w * sin).abs() / two + (self.h * cos).abs() / two;
        TLBR {
            t: self.cy - half_y,
            l: self.cx - half_x,
            b: self.cy + half_y,
            r: self.cx + half_x,
        }
    }

    /// Map the box by the transform.
    ///
    /// Uniform scaling keeps the box exact. Otherwise the mapped corners are
    /// refitted by a minimum-area rectangle.
    pub fn transform(&self, transform: &Transform<T>, range: AngleRange) -> Self {
        if transform.sx == transform.sy && transform.sx > T::zero() {
            let scale = transform.sx;
            OBox_ {
                cx: self.cx * scale + transform.tx,
                cy: self.cy * scale + transform.ty,
                w: self.w * scale,
                h: self.h * scale,
                angle: self.angle,
            }
            .regularize(range)
        } else {
            self.to_poly().transform(transform).to_obox(range)
        }
    }

    /// Flip the box within an image of the given size.
    pub fn flip(&self, flip: Flip, size: &HW<T>, range: AngleRange) -> Self {
        let (cx, cy) = match flip {
            Flip::Horizontal => (size.w() - self.cx, self.cy),
            Flip::Vertical => (self.cx, size.h() - self.cy),
        };
        OBox_ {
            cx,
            cy,
            w: self.w,
            h: self.h,
            angle: -self.angle,
        }
        .regularize(range)
    }
}

impl<T> OBox_<T>
where
    T: Element,
{
    /// Build a well-formed box in canonical form.
    ///
    /// Non-finite parameters become zero and negative sizes take their
    /// magnitude, so the result may be degenerate but never invalid.
    pub fn regularize(&self, range: AngleRange) -> OBox<T> {
        let sanitize = |value: T| if value.is_finite() { value } else { T::zero() };
        let cx = sanitize(self.cx);
        let cy = sanitize(self.cy);
        let w = sanitize(self.w).abs();
        let h = sanitize(self.h).abs();
        let angle = sanitize(self.angle);

        let (w, h, angle) = if range.is_long_edge() {
            let (w, h, angle) = if w >= h {
                (w, h, angle)
            } else {
                (h, w, angle + T::FRAC_PI_2())
            };
            (w, h, range.wrap(angle))
        } else {
            let (angle, turns) = range.wrap_with_turns(angle);
            if turns % 2 == 0 {
                (w, h, angle)
            } else {
                (h, w, angle)
            }
        };

        OBox {
            cx,
            cy,
            w,
            h,
            angle,
        }
    }
}

impl<T> TryFrom<OBox_<T>> for OBox<T>
where
    T: Element,
{
    type Error = Error;

    fn try_from(from: OBox_<T>) -> Result<Self, Self::Error> {
        Self::try_from(&from)
    }
}

impl<T> TryFrom<&OBox_<T>> for OBox<T>
where
    T: Element,
{
    type Error = Error;

    fn try_from(from: &OBox_<T>) -> Result<Self, Self::Error> {
        let OBox_ {
            cx,
            cy,
            w,
            h,
            angle,
        } = *from;
        Self::try_from_cxcywha([cx, cy, w, h, angle])
    }
}

impl<T> From<&OBox<T>> for OBox_<T>
where
    T: Copy,
{
    fn from(from: &OBox<T>) -> Self {
        let OBox {
            cx,
            cy,
            w,
            h,
            angle,
        } = *from;
        Self {
            cx,
            cy,
            w,
            h,
            angle,
        }
    }
}

impl<T> From<OBox<T>> for OBox_<T>
where
    T: Copy,
{
    fn from(from: OBox<T>) -> Self {
        Self::from(&from)
    }
}

/// Horizontal box as an oriented box with zero angle.
impl<T> From<&TLBR<T>> for OBox<T>
where
    T: Element,
{
    fn from(from: &TLBR<T>) -> Self {
        Self {
            cx: from.cx(),
            cy: from.cy(),
            w: from.w(),
            h: from.h(),
            angle: T::zero(),
        }
    }
}

impl<T> From<TLBR<T>> for OBox<T>
where
    T: Element,
{
    fn from(from: TLBR<T>) -> Self {
        Self::from(&from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RectNum;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

    #[test]
    fn obox_reject_invalid() {
        assert!(OBox::try_from_cxcywha([0.0, 0.0, -1.0, 1.0, 0.0]).is_err());
        assert!(OBox::try_from_cxcywha([f64::NAN, 0.0, 1.0, 1.0, 0.0]).is_err());
        assert!(OBox::try_from_cxcywha([0.0, 0.0, 0.0, 0.0, 0.0]).is_ok());
    }

    #[test]
    fn obox_regularize_swaps_short_width() {
        let obox = OBox::from_cxcywha([10.0, 20.0, 4.0, 8.0, 0.0]).regularize(AngleRange::Le90);
        assert_eq!(obox.w(), 8.0);
        assert_eq!(obox.h(), 4.0);
        assert_abs_diff_eq!(obox.angle(), -FRAC_PI_2, epsilon = 1e-12);

        let obox = OBox::from_cxcywha([10.0, 20.0, 4.0, 8.0, 0.0]).regularize(AngleRange::Le135);
        assert_abs_diff_eq!(obox.angle(), FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn obox_regularize_quarter_turns() {
        let obox =
            OBox::from_cxcywha([0.0, 0.0, 4.0, 8.0, FRAC_PI_2 + 0.2]).regularize(AngleRange::Oc);
        assert_eq!(obox.w(), 8.0);
        assert_eq!(obox.h(), 4.0);
        assert_abs_diff_eq!(obox.angle(), 0.2, epsilon = 1e-12);

        let obox = OBox::from_cxcywha([0.0, 0.0, 4.0, 8.0, PI + 0.2]).regularize(AngleRange::Oc);
        assert_eq!(obox.w(), 4.0);
        assert_eq!(obox.h(), 8.0);
        assert_abs_diff_eq!(obox.angle(), 0.2, epsilon = 1e-12);
    }

    #[test]
    fn obox_regularize_is_idempotent() {
        for range in [AngleRange::Le90, AngleRange::Le135, AngleRange::Oc] {
            for step in -50..50 {
                let angle = step as f32 * 0.31;
                let once = OBox::from_cxcywha([3.0, -2.0, 5.0, 7.0, angle]).regularize(range);
                assert!(once.is_regular(range));
                assert_eq!(once.regularize(range), once);
            }
        }
    }

    #[test]
    fn obox_regularize_sanitizes() {
        let obox = OBox_ {
            cx: f32::NAN,
            cy: 1.0,
            w: -3.0,
            h: f32::INFINITY,
            angle: f32::NAN,
        }
        .regularize(AngleRange::Le90);
        assert_eq!(obox.cxcywha(), [0.0, 1.0, 3.0, 0.0, 0.0]);
    }

    #[test]
    fn obox_corners_order() {
        let corners = OBox::from_cxcywha([0.0, 0.0, 4.0, 2.0, 0.0]).corners();
        assert_eq!(corners[0], Point::new(-2.0, -1.0));
        assert_eq!(corners[1], Point::new(2.0, -1.0));
        assert_eq!(corners[2], Point::new(2.0, 1.0));
        assert_eq!(corners[3], Point::new(-2.0, 1.0));
        assert!(OBox::from_cxcywha([0.0, 0.0, 4.0, 2.0, 0.3]).to_poly().signed_area() > 0.0);
    }

    #[test]
    fn obox_to_tlbr() {
        let tlbr = OBox::from_cxcywha([10.0, 10.0, 2.0, 2.0, FRAC_PI_4]).to_tlbr();
        let half = 2.0_f64.sqrt();
        assert_abs_diff_eq!(tlbr.t(), 10.0 - half, epsilon = 1e-12);
        assert_abs_diff_eq!(tlbr.l(), 10.0 - half, epsilon = 1e-12);
        assert_abs_diff_eq!(tlbr.b(), 10.0 + half, epsilon = 1e-12);
        assert_abs_diff_eq!(tlbr.r(), 10.0 + half, epsilon = 1e-12);
    }

    #[test]
    fn obox_from_tlbr() {
        let obox = OBox::from(TLBR::from_tlbr([0.0, 0.0, 10.0, 20.0]));
        assert_eq!(obox.cxcywha(), [10.0, 5.0, 20.0, 10.0, 0.0]);
    }

    #[test]
    fn obox_flip_horizontal() {
        let size = HW::from_hw([100.0, 200.0]);
        let obox = OBox::from_cxcywha([50.0, 40.0, 20.0, 10.0, 0.3]);
        let flipped = obox.flip(Flip::Horizontal, &size, AngleRange::Le90);
        assert_abs_diff_eq!(flipped.cx(), 150.0, epsilon = 1e-12);
        assert_abs_diff_eq!(flipped.cy(), 40.0, epsilon = 1e-12);
        assert_abs_diff_eq!(flipped.angle(), -0.3, epsilon = 1e-12);
        let back = flipped.flip(Flip::Horizontal, &size, AngleRange::Le90);
        assert_abs_diff_eq!(back.angle(), 0.3, epsilon = 1e-12);
    }

    #[test]
    fn obox_transform_uniform_scale() {
        let transform = Transform {
            sy: 0.5,
            sx: 0.5,
            ty: 1.0,
            tx: 2.0,
        };
        let obox = OBox::from_cxcywha([10.0, 20.0, 8.0, 4.0, 0.25]);
        let mapped = obox.transform(&transform, AngleRange::Le90);
        assert_eq!(mapped.cxcywha(), [7.0, 11.0, 4.0, 2.0, 0.25]);
    }
}
