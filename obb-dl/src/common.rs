pub use anyhow::{bail, ensure, format_err, Context as _, Error, Result};
pub use approx::{abs_diff_eq, AbsDiffEq};
pub use bbox::{prelude::*, AngleRange, OBox, OBox_, Poly, Transform, HW, TLBR};
pub use getset::{CopyGetters, Getters};
pub use itertools::{izip, Itertools as _};
pub use label::{GroundTruth, Label};
pub use log::{debug, info, warn};
pub use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
pub use noisy_float::prelude::*;
pub use rand::prelude::*;
pub use rayon::prelude::*;
pub use serde::{
    de::Error as _, Deserialize, Deserializer, Serialize, Serializer,
};
pub use std::{
    cmp::{self, Ordering},
    collections::{BTreeMap, HashMap},
    fmt::{self, Debug, Display, Formatter},
    iter,
    ops::{Add, Div, Mul, Range, Sub},
    path::Path,
    sync::Arc,
};
#[cfg(feature = "tch")]
pub use tch::{Device, IndexOp, Kind, Tensor};
