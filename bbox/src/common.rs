pub use anyhow::{bail, ensure, format_err, Error, Result};
pub use num_traits::{Float, FloatConst, Num, NumCast, ToPrimitive};
#[cfg(feature = "serde")]
pub use serde::{Deserialize, Serialize};
pub use std::{
    cmp::Ordering,
    fmt::Debug,
    ops::{Add, Mul, Neg, Sub},
};
