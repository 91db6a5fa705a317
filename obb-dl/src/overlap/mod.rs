//! Overlap (IoU and IoF) engines for oriented boxes and polygons.
//!
//! The engines compute plain values and are not differentiable.

mod kernel;
mod parallel;
mod scalar;
#[cfg(feature = "tch")]
mod tch_engine;

pub use kernel::*;
pub use parallel::*;
pub use scalar::*;
#[cfg(feature = "tch")]
pub use tch_engine::*;

use crate::common::*;

/// The overlap measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverlapMode {
    /// Intersection over union.
    IoU,
    /// Intersection over the area of the left-hand shape.
    IoF,
}

impl Default for OverlapMode {
    fn default() -> Self {
        Self::IoU
    }
}

/// The interface of overlap computation backends.
pub trait OverlapEngine
where
    Self: Debug + Send + Sync,
{
    /// Compute the `lhs.len() × rhs.len()` overlap matrix of polygons.
    ///
    /// Non-convex polygons are replaced by their convex hulls.
    fn poly_overlaps(
        &self,
        lhs: &[Poly<f32>],
        rhs: &[Poly<f32>],
        mode: OverlapMode,
    ) -> Result<Array2<f32>>;

    /// Compute the overlaps of corresponding polygon pairs.
    fn aligned_poly_overlaps(
        &self,
        lhs: &[Poly<f32>],
        rhs: &[Poly<f32>],
        mode: OverlapMode,
    ) -> Result<Array1<f32>>;

    /// Compute the `lhs.len() × rhs.len()` overlap matrix of oriented boxes.
    fn overlaps(
        &self,
        lhs: &[OBox<f32>],
        rhs: &[OBox<f32>],
        mode: OverlapMode,
    ) -> Result<Array2<f32>> {
        let lhs: Vec<_> = lhs.iter().map(OBox::to_poly).collect();
        let rhs: Vec<_> = rhs.iter().map(OBox::to_poly).collect();
        self.poly_overlaps(&lhs, &rhs, mode)
    }

    /// Compute the overlaps of corresponding oriented box pairs.
    fn aligned_overlaps(
        &self,
        lhs: &[OBox<f32>],
        rhs: &[OBox<f32>],
        mode: OverlapMode,
    ) -> Result<Array1<f32>> {
        ensure_aligned(lhs.len(), rhs.len())?;
        let lhs: Vec<_> = lhs.iter().map(OBox::to_poly).collect();
        let rhs: Vec<_> = rhs.iter().map(OBox::to_poly).collect();
        self.aligned_poly_overlaps(&lhs, &rhs, mode)
    }
}

pub(crate) fn ensure_aligned(lhs_len: usize, rhs_len: usize) -> Result<()> {
    ensure!(
        lhs_len == rhs_len,
        "aligned overlaps require the same number of shapes, but get {} and {}",
        lhs_len,
        rhs_len
    );
    Ok(())
}

/// The choice of overlap engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineKind {
    Scalar,
    Parallel,
    #[cfg(feature = "tch")]
    Tch {
        /// The CUDA device index, or the CPU when unset.
        #[serde(default)]
        cuda_index: Option<usize>,
    },
}

impl Default for EngineKind {
    fn default() -> Self {
        Self::Parallel
    }
}

impl EngineKind {
    pub fn build(&self) -> Result<Arc<dyn OverlapEngine>> {
        let engine: Arc<dyn OverlapEngine> = match *self {
            Self::Scalar => Arc::new(ScalarEngine),
            Self::Parallel => Arc::new(ParallelEngine),
            #[cfg(feature = "tch")]
            Self::Tch { cuda_index } => {
                let device = match cuda_index {
                    Some(index) => {
                        ensure!(
                            tch::Cuda::is_available(),
                            "CUDA device {} is requested but CUDA is not available",
                            index
                        );
                        Device::Cuda(index)
                    }
                    None => Device::Cpu,
                };
                Arc::new(TchEngineInit::new(device).build()?)
            }
        };
        Ok(engine)
    }
}
