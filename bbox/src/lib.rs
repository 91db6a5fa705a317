//! Safe bounding box types and functions.
//!
//! Axis-aligned boxes ([TLBR]), oriented boxes ([OBox]) and polygons
//! ([Poly]), with conversions between them.

mod common;

pub use transform::*;
mod transform;

pub use rect::*;
pub mod rect;

pub use tlbr::*;
pub mod tlbr;

pub use angle::*;
pub mod angle;

pub use point::*;
pub mod point;

pub use obox::*;
pub mod obox;

pub use poly::*;
pub mod poly;

pub use hw::*;
pub mod hw;

pub use element::*;
pub mod element;

pub mod prelude {
    pub use crate::rect::{Rect, RectFloat, RectNum};
}
