use super::{ensure_aligned, kernel, ConvexShape, OverlapEngine, OverlapMode};
use crate::common::*;

/// The data-parallel CPU engine.
///
/// Shapes are prepared once and the matrix rows are computed on the rayon
/// thread pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelEngine;

impl ParallelEngine {
    fn shape_overlaps(
        &self,
        lhs: &[ConvexShape],
        rhs: &[ConvexShape],
        mode: OverlapMode,
    ) -> Result<Array2<f32>> {
        let num_cols = rhs.len();
        let mut values = vec![0f32; lhs.len() * num_cols];

        if num_cols > 0 {
            values
                .par_chunks_mut(num_cols)
                .zip(lhs.par_iter())
                .for_each(|(row, lhs)| {
                    row.iter_mut().zip(rhs).for_each(|(value, rhs)| {
                        *value = kernel::overlap(lhs, rhs, mode);
                    });
                });
        }

        Ok(Array2::from_shape_vec((lhs.len(), num_cols), values)?)
    }
}

impl OverlapEngine for ParallelEngine {
    fn poly_overlaps(
        &self,
        lhs: &[Poly<f32>],
        rhs: &[Poly<f32>],
        mode: OverlapMode,
    ) -> Result<Array2<f32>> {
        let lhs: Vec<_> = lhs.par_iter().map(ConvexShape::from_poly).collect();
        let rhs: Vec<_> = rhs.par_iter().map(ConvexShape::from_poly).collect();
        self.shape_overlaps(&lhs, &rhs, mode)
    }

    fn aligned_poly_overlaps(
        &self,
        lhs: &[Poly<f32>],
        rhs: &[Poly<f32>],
        mode: OverlapMode,
    ) -> Result<Array1<f32>> {
        ensure_aligned(lhs.len(), rhs.len())?;
        let values: Vec<_> = lhs
            .par_iter()
            .zip(rhs.par_iter())
            .map(|(lhs, rhs)| {
                kernel::overlap(
                    &ConvexShape::from_poly(lhs),
                    &ConvexShape::from_poly(rhs),
                    mode,
                )
            })
            .collect();
        Ok(Array1::from(values))
    }

    fn overlaps(
        &self,
        lhs: &[OBox<f32>],
        rhs: &[OBox<f32>],
        mode: OverlapMode,
    ) -> Result<Array2<f32>> {
        let lhs: Vec<_> = lhs.par_iter().map(ConvexShape::from_obox).collect();
        let rhs: Vec<_> = rhs.par_iter().map(ConvexShape::from_obox).collect();
        self.shape_overlaps(&lhs, &rhs, mode)
    }

    fn aligned_overlaps(
        &self,
        lhs: &[OBox<f32>],
        rhs: &[OBox<f32>],
        mode: OverlapMode,
    ) -> Result<Array1<f32>> {
        ensure_aligned(lhs.len(), rhs.len())?;
        let values: Vec<_> = lhs
            .par_iter()
            .zip(rhs.par_iter())
            .map(|(lhs, rhs)| {
                kernel::overlap(
                    &ConvexShape::from_obox(lhs),
                    &ConvexShape::from_obox(rhs),
                    mode,
                )
            })
            .collect();
        Ok(Array1::from(values))
    }
}
