use crate::{common::*, TLBR};

/// The height and width of an image or a feature map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HW<T> {
    h: T,
    w: T,
}

impl<T> HW<T> {
    pub fn try_cast<U>(self) -> Option<HW<U>>
    where
        T: ToPrimitive,
        U: NumCast,
    {
        Some(HW {
            h: U::from(self.h)?,
            w: U::from(self.w)?,
        })
    }
}

impl<T> HW<T>
where
    T: Num + PartialOrd + Copy,
{
    pub fn try_from_hw(hw: [T; 2]) -> Result<Self> {
        let [h, w] = hw;
        let zero = T::zero();
        ensure!(
            h >= zero && w >= zero,
            "height and width must be non-negative"
        );
        Ok(Self { h, w })
    }

    pub fn from_hw(hw: [T; 2]) -> Self {
        Self::try_from_hw(hw).unwrap()
    }

    pub fn h(&self) -> T {
        self.h
    }

    pub fn w(&self) -> T {
        self.w
    }

    pub fn hw(&self) -> [T; 2] {
        [self.h, self.w]
    }

    pub fn area(&self) -> T {
        self.h * self.w
    }

    /// The rectangle spanning from the origin to this size.
    pub fn to_tlbr(&self) -> TLBR<T> {
        TLBR {
            t: T::zero(),
            l: T::zero(),
            b: self.h,
            r: self.w,
        }
    }
}

impl HW<usize> {
    /// The size of a grid with cells of `stride` covering this size.
    pub fn div_ceil(&self, stride: usize) -> Self {
        Self {
            h: (self.h + stride - 1) / stride,
            w: (self.w + stride - 1) / stride,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RectNum;

    #[test]
    fn hw_grid_size() {
        let size = HW::from_hw([800usize, 1333]);
        assert_eq!(size.div_ceil(32).hw(), [25, 42]);
        assert_eq!(size.div_ceil(1), size);
        assert!(HW::try_from_hw([-1.0, 2.0]).is_err());
    }

    #[test]
    fn hw_window() {
        let size: HW<f32> = HW::from_hw([600usize, 800]).try_cast().unwrap();
        assert_eq!(size.to_tlbr().tlbr(), [0.0, 0.0, 600.0, 800.0]);
        assert_eq!(size.area(), 480000.0);
    }
}
