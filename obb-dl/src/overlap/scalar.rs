use super::{ensure_aligned, kernel, ConvexShape, OverlapEngine, OverlapMode};
use crate::common::*;

/// The sequential reference engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarEngine;

impl OverlapEngine for ScalarEngine {
    fn poly_overlaps(
        &self,
        lhs: &[Poly<f32>],
        rhs: &[Poly<f32>],
        mode: OverlapMode,
    ) -> Result<Array2<f32>> {
        let lhs: Vec<_> = lhs.iter().map(ConvexShape::from_poly).collect();
        let rhs: Vec<_> = rhs.iter().map(ConvexShape::from_poly).collect();
        Ok(Array2::from_shape_fn((lhs.len(), rhs.len()), |(row, col)| {
            kernel::overlap(&lhs[row], &rhs[col], mode)
        }))
    }

    fn aligned_poly_overlaps(
        &self,
        lhs: &[Poly<f32>],
        rhs: &[Poly<f32>],
        mode: OverlapMode,
    ) -> Result<Array1<f32>> {
        ensure_aligned(lhs.len(), rhs.len())?;
        Ok(lhs
            .iter()
            .zip(rhs)
            .map(|(lhs, rhs)| {
                kernel::overlap(
                    &ConvexShape::from_poly(lhs),
                    &ConvexShape::from_poly(rhs),
                    mode,
                )
            })
            .collect())
    }

    fn overlaps(
        &self,
        lhs: &[OBox<f32>],
        rhs: &[OBox<f32>],
        mode: OverlapMode,
    ) -> Result<Array2<f32>> {
        let lhs: Vec<_> = lhs.iter().map(ConvexShape::from_obox).collect();
        let rhs: Vec<_> = rhs.iter().map(ConvexShape::from_obox).collect();
        Ok(Array2::from_shape_fn((lhs.len(), rhs.len()), |(row, col)| {
            kernel::overlap(&lhs[row], &rhs[col], mode)
        }))
    }

    fn aligned_overlaps(
        &self,
        lhs: &[OBox<f32>],
        rhs: &[OBox<f32>],
        mode: OverlapMode,
    ) -> Result<Array1<f32>> {
        ensure_aligned(lhs.len(), rhs.len())?;
        Ok(lhs
            .iter()
            .zip(rhs)
            .map(|(lhs, rhs)| {
                kernel::overlap(
                    &ConvexShape::from_obox(lhs),
                    &ConvexShape::from_obox(rhs),
                    mode,
                )
            })
            .collect())
    }
}
