use crate::{common::*, element::Element};

/// Canonical angle conventions of oriented boxes.
///
/// The long-edge conventions [AngleRange::Le90] and [AngleRange::Le135]
/// keep `w >= h` and wrap the angle by π. The [AngleRange::Oc] convention
/// wraps the angle by π/2 and swaps width and height on every quarter turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AngleRange {
    /// Angle in `[-π/2, π/2)` with `w >= h`.
    Le90,
    /// Angle in `[-π/4, 3π/4)` with `w >= h`.
    Le135,
    /// Angle in `[0, π/2)`.
    Oc,
}

impl Default for AngleRange {
    fn default() -> Self {
        Self::Le90
    }
}

impl AngleRange {
    /// The inclusive lower bound of the range.
    pub fn start<T>(&self) -> T
    where
        T: Element,
    {
        match self {
            Self::Le90 => -T::FRAC_PI_2(),
            Self::Le135 => -T::FRAC_PI_4(),
            Self::Oc => T::zero(),
        }
    }

    /// The length of the range.
    pub fn period<T>(&self) -> T
    where
        T: Element,
    {
        match self {
            Self::Le90 | Self::Le135 => T::PI(),
            Self::Oc => T::FRAC_PI_2(),
        }
    }

    /// The exclusive upper bound of the range.
    pub fn end<T>(&self) -> T
    where
        T: Element,
    {
        self.start::<T>() + self.period::<T>()
    }

    pub fn contains<T>(&self, angle: T) -> bool
    where
        T: Element,
    {
        angle >= self.start() && angle < self.end()
    }

    /// Whether the convention requires `w >= h`.
    pub fn is_long_edge(&self) -> bool {
        matches!(self, Self::Le90 | Self::Le135)
    }

    /// Wrap the angle into the range by multiples of the period.
    pub fn wrap<T>(&self, angle: T) -> T
    where
        T: Element,
    {
        let (angle, _) = self.wrap_with_turns(angle);
        angle
    }

    /// Wrap the angle into the range and report how many periods were removed.
    pub(crate) fn wrap_with_turns<T>(&self, angle: T) -> (T, i64)
    where
        T: Element,
    {
        if self.contains(angle) {
            return (angle, 0);
        }
        if !angle.is_finite() {
            return (self.start(), 0);
        }

        let start = self.start::<T>();
        let period = self.period::<T>();
        let turns = ((angle - start) / period).floor();
        let mut wrapped = angle - turns * period;
        let mut turns = turns.to_i64().unwrap_or(0);

        if wrapped >= self.end() {
            wrapped = wrapped - period;
            turns += 1;
        }
        if wrapped < start {
            wrapped = wrapped + period;
            turns -= 1;
        }
        // rounding may still land on the boundary
        if !self.contains(wrapped) {
            wrapped = start;
        }

        (wrapped, turns)
    }
}

/// Wrap an angle difference into `[-π/2, π/2)`.
///
/// Two oriented boxes with the same size whose angles differ by π describe
/// the same rectangle, so differences are taken modulo π.
pub fn angle_diff<T>(lhs: T, rhs: T) -> T
where
    T: Element,
{
    AngleRange::Le90.wrap(lhs - rhs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

    #[test]
    fn angle_wrap_into_range() {
        let range = AngleRange::Le90;
        assert_abs_diff_eq!(range.wrap(PI), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(range.wrap(FRAC_PI_2), -FRAC_PI_2, epsilon = 1e-12);
        assert_abs_diff_eq!(range.wrap(-3.0 * FRAC_PI_4), FRAC_PI_4, epsilon = 1e-12);

        let range = AngleRange::Le135;
        assert_abs_diff_eq!(range.wrap(-FRAC_PI_2), FRAC_PI_2, epsilon = 1e-12);

        let range = AngleRange::Oc;
        assert_abs_diff_eq!(range.wrap(FRAC_PI_2 + 0.1), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn angle_wrap_is_idempotent() {
        for range in [AngleRange::Le90, AngleRange::Le135, AngleRange::Oc] {
            for step in -100..100 {
                let angle = step as f32 * 0.173;
                let once = range.wrap(angle);
                assert!(range.contains(once));
                assert_eq!(range.wrap(once), once);
            }
        }
    }

    #[test]
    fn angle_wrap_non_finite() {
        assert_eq!(AngleRange::Le90.wrap(f64::NAN), -FRAC_PI_2);
        assert_eq!(AngleRange::Oc.wrap(f64::INFINITY), 0.0);
    }

    #[test]
    fn angle_diff_wraps_by_pi() {
        assert_abs_diff_eq!(angle_diff(PI - 0.1, 0.0), -0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(angle_diff(0.2, 0.1), 0.1, epsilon = 1e-12);
    }
}
