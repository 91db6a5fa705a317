use crate::common::*;

/// Scalar types usable as box coordinates.
pub trait Element: Float + FloatConst + Debug {}

impl<T> Element for T where T: Float + FloatConst + Debug {}
