use crate::common::*;

/// A real number within `[0, 1]`, used for thresholds and fractions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Ratio(R64);

impl Ratio {
    pub fn zero() -> Self {
        Self(r64(0.0))
    }

    pub fn one() -> Self {
        Self(r64(1.0))
    }

    pub fn to_r64(&self) -> R64 {
        self.0
    }

    pub fn to_f64(&self) -> f64 {
        self.0.raw()
    }

    pub fn to_f32(&self) -> f32 {
        self.0.raw() as f32
    }

    /// Scale a count by the ratio and round down.
    pub fn floor_of(&self, count: usize) -> usize {
        (count as f64 * self.to_f64()).floor() as usize
    }
}

impl Default for Ratio {
    fn default() -> Self {
        Self::zero()
    }
}

impl Serialize for Ratio {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Ratio {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        Self::try_from(value).map_err(|err| D::Error::custom(format!("{:?}", err)))
    }
}

impl AbsDiffEq<f64> for Ratio {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &f64, epsilon: Self::Epsilon) -> bool {
        self.0.raw().abs_diff_eq(other, epsilon)
    }
}

impl TryFrom<R64> for Ratio {
    type Error = Error;

    fn try_from(value: R64) -> Result<Self, Self::Error> {
        ensure!(
            ((0.0 - f64::default_epsilon())..=(1.0 + f64::default_epsilon()))
                .contains(&value.raw()),
            "ratio value must be within range [0.0, 1.0], but get {}",
            value
        );
        Ok(Self(r64(value.raw().clamp(0.0, 1.0))))
    }
}

impl TryFrom<f64> for Ratio {
    type Error = Error;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::try_from(R64::try_new(value).ok_or_else(|| format_err!("not a finite value"))?)
    }
}

impl TryFrom<f32> for Ratio {
    type Error = Error;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::try_from(value as f64)
    }
}

impl From<Ratio> for R64 {
    fn from(ratio: Ratio) -> Self {
        ratio.0
    }
}

impl From<Ratio> for f64 {
    fn from(ratio: Ratio) -> Self {
        ratio.0.raw()
    }
}

impl From<Ratio> for f32 {
    fn from(ratio: Ratio) -> Self {
        ratio.to_f32()
    }
}

impl Mul<Ratio> for Ratio {
    type Output = Ratio;

    fn mul(self, rhs: Ratio) -> Self::Output {
        // the product of two ratios stays in range
        Self(self.0 * rhs.0)
    }
}

impl PartialEq<f64> for Ratio {
    fn eq(&self, rhs: &f64) -> bool {
        self.0.raw().eq(rhs)
    }
}

impl Display for Ratio {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        Display::fmt(&self.to_f64(), f)
    }
}

/// Build a ratio from a literal, panicking when it is out of range.
pub fn ratio(value: f64) -> Ratio {
    Ratio::try_from(value).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_range_check() {
        assert!(Ratio::try_from(0.5).is_ok());
        assert!(Ratio::try_from(-0.1).is_err());
        assert!(Ratio::try_from(1.1).is_err());
        assert!(Ratio::try_from(f64::NAN).is_err());
        assert_eq!(ratio(0.25) * ratio(0.5), 0.125);
    }

    #[test]
    fn ratio_deserialize() {
        let value: Ratio = json5::from_str("0.4").unwrap();
        assert_eq!(value, 0.4);
        assert!(json5::from_str::<Ratio>("1.5").is_err());
        assert_eq!(ratio(0.5).floor_of(255), 127);
    }
}
