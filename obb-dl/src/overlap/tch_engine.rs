use super::{ensure_aligned, ConvexShape, OverlapEngine, OverlapMode, AREA_EPSILON};
use crate::common::*;

const INSIDE_EPSILON: f64 = 1e-6;
const MASKED_ANGLE: f64 = 100.0;

/// The tensor engine initializer.
#[derive(Debug, Clone)]
pub struct TchEngineInit {
    pub device: Device,
    /// Upper bound on `rows × cols × vertices²` elements per batch.
    pub max_elements: usize,
}

impl TchEngineInit {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            max_elements: 1 << 22,
        }
    }

    pub fn build(self) -> Result<TchEngine> {
        let Self {
            device,
            max_elements,
        } = self;
        ensure!(max_elements > 0, "max_elements must be positive");
        Ok(TchEngine {
            device,
            max_elements,
        })
    }
}

/// The vectorized engine on a tch device.
///
/// Every pair is intersected by collecting the vertices of each shape
/// inside the other and all edge crossings, sorting them by angle around
/// their centroid and measuring the shoelace area.
#[derive(Debug)]
pub struct TchEngine {
    device: Device,
    max_elements: usize,
}

#[derive(Debug)]
struct ShapeBatch {
    /// `[N, K, 2]`, padded by repeating the last vertex.
    points: Tensor,
    /// `[N]`
    areas: Tensor,
}

impl ShapeBatch {
    fn len(&self) -> i64 {
        self.points.size()[0]
    }

    fn num_vertices(&self) -> i64 {
        self.points.size()[1]
    }
}

impl TchEngine {
    fn prepare(&self, shapes: &[ConvexShape]) -> ShapeBatch {
        let num_vertices = shapes
            .iter()
            .map(|shape| shape.points().len())
            .max()
            .unwrap_or(0)
            .max(3);

        let (coords, areas): (Vec<f64>, Vec<f64>) = {
            let mut coords = Vec::with_capacity(shapes.len() * num_vertices * 2);
            let mut areas = Vec::with_capacity(shapes.len());

            for shape in shapes {
                let points = shape.points();
                let last = points.last().map(|p| [p.x, p.y]).unwrap_or([0.0, 0.0]);
                points
                    .iter()
                    .map(|p| [p.x, p.y])
                    .chain(iter::repeat(last))
                    .take(num_vertices)
                    .for_each(|[x, y]| {
                        coords.push(x);
                        coords.push(y);
                    });
                areas.push(if shape.is_degenerate() { 0.0 } else { shape.area() });
            }

            (coords, areas)
        };

        let num_shapes = shapes.len() as i64;
        let points = Tensor::of_slice(&coords)
            .view([num_shapes, num_vertices as i64, 2])
            .to_device(self.device);
        let areas = Tensor::of_slice(&areas).to_device(self.device);

        ShapeBatch { points, areas }
    }

    fn chunk_rows(&self, cols: i64, lhs_vertices: i64, rhs_vertices: i64) -> i64 {
        let per_row = (cols * lhs_vertices * rhs_vertices).max(1) as usize;
        (self.max_elements / per_row).max(1) as i64
    }

    fn shape_overlaps(
        &self,
        lhs: &[ConvexShape],
        rhs: &[ConvexShape],
        mode: OverlapMode,
    ) -> Result<Array2<f32>> {
        let (num_rows, num_cols) = (lhs.len(), rhs.len());
        if num_rows == 0 || num_cols == 0 {
            return Ok(Array2::zeros((num_rows, num_cols)));
        }

        let values = tch::no_grad(|| {
            let lhs = self.prepare(lhs);
            let rhs = self.prepare(rhs);
            let (m, k, l) = (rhs.len(), lhs.num_vertices(), rhs.num_vertices());
            let chunk = self.chunk_rows(m, k, l);

            let outputs: Vec<_> = (0..lhs.len())
                .step_by(chunk as usize)
                .map(|start| {
                    let rows = chunk.min(lhs.len() - start);
                    let lhs_points = lhs.points.narrow(0, start, rows);
                    let lhs_areas = lhs.areas.narrow(0, start, rows);

                    let lhs_points = lhs_points.unsqueeze(1).expand(&[rows, m, k, 2], false);
                    let rhs_points = rhs.points.unsqueeze(0).expand(&[rows, m, l, 2], false);
                    let inter = intersection_areas(&lhs_points, &rhs_points);

                    overlap_values(
                        &inter,
                        &lhs_areas.unsqueeze(1),
                        &rhs.areas.unsqueeze(0),
                        mode,
                    )
                })
                .collect();

            Tensor::cat(&outputs, 0)
                .to_device(Device::Cpu)
                .to_kind(Kind::Float)
                .view([-1])
        });

        let values = Vec::<f32>::from(&values);
        Ok(Array2::from_shape_vec((num_rows, num_cols), values)?)
    }

    fn aligned_shape_overlaps(
        &self,
        lhs: &[ConvexShape],
        rhs: &[ConvexShape],
        mode: OverlapMode,
    ) -> Result<Array1<f32>> {
        ensure_aligned(lhs.len(), rhs.len())?;
        if lhs.is_empty() {
            return Ok(Array1::zeros(0));
        }

        let values = tch::no_grad(|| {
            let lhs = self.prepare(lhs);
            let rhs = self.prepare(rhs);
            let (k, l) = (lhs.num_vertices(), rhs.num_vertices());
            let chunk = self.chunk_rows(1, k, l);

            let outputs: Vec<_> = (0..lhs.len())
                .step_by(chunk as usize)
                .map(|start| {
                    let rows = chunk.min(lhs.len() - start);
                    let lhs_points = lhs.points.narrow(0, start, rows).unsqueeze(1);
                    let rhs_points = rhs.points.narrow(0, start, rows).unsqueeze(1);
                    let lhs_areas = lhs.areas.narrow(0, start, rows).unsqueeze(1);
                    let rhs_areas = rhs.areas.narrow(0, start, rows).unsqueeze(1);

                    let inter = intersection_areas(&lhs_points, &rhs_points);
                    overlap_values(&inter, &lhs_areas, &rhs_areas, mode)
                })
                .collect();

            Tensor::cat(&outputs, 0)
                .to_device(Device::Cpu)
                .to_kind(Kind::Float)
                .view([-1])
        });

        Ok(Array1::from(Vec::<f32>::from(&values)))
    }
}

impl OverlapEngine for TchEngine {
    fn poly_overlaps(
        &self,
        lhs: &[Poly<f32>],
        rhs: &[Poly<f32>],
        mode: OverlapMode,
    ) -> Result<Array2<f32>> {
        let lhs: Vec<_> = lhs.iter().map(ConvexShape::from_poly).collect();
        let rhs: Vec<_> = rhs.iter().map(ConvexShape::from_poly).collect();
        self.shape_overlaps(&lhs, &rhs, mode)
    }

    fn aligned_poly_overlaps(
        &self,
        lhs: &[Poly<f32>],
        rhs: &[Poly<f32>],
        mode: OverlapMode,
    ) -> Result<Array1<f32>> {
        let lhs: Vec<_> = lhs.iter().map(ConvexShape::from_poly).collect();
        let rhs: Vec<_> = rhs.iter().map(ConvexShape::from_poly).collect();
        self.aligned_shape_overlaps(&lhs, &rhs, mode)
    }

    fn overlaps(
        &self,
        lhs: &[OBox<f32>],
        rhs: &[OBox<f32>],
        mode: OverlapMode,
    ) -> Result<Array2<f32>> {
        let lhs: Vec<_> = lhs.iter().map(ConvexShape::from_obox).collect();
        let rhs: Vec<_> = rhs.iter().map(ConvexShape::from_obox).collect();
        self.shape_overlaps(&lhs, &rhs, mode)
    }

    fn aligned_overlaps(
        &self,
        lhs: &[OBox<f32>],
        rhs: &[OBox<f32>],
        mode: OverlapMode,
    ) -> Result<Array1<f32>> {
        let lhs: Vec<_> = lhs.iter().map(ConvexShape::from_obox).collect();
        let rhs: Vec<_> = rhs.iter().map(ConvexShape::from_obox).collect();
        self.aligned_shape_overlaps(&lhs, &rhs, mode)
    }
}

/// z component of the cross product along the last dimension.
fn cross(lhs: &Tensor, rhs: &Tensor) -> Tensor {
    lhs.select(-1, 0) * rhs.select(-1, 1) - lhs.select(-1, 1) * rhs.select(-1, 0)
}

/// Intersection areas of `[C, M, K, 2]` and `[C, M, L, 2]` convex shapes.
fn intersection_areas(lhs: &Tensor, rhs: &Tensor) -> Tensor {
    let size = lhs.size();
    let (c, m, k) = (size[0], size[1], size[2]);
    let l = rhs.size()[2];
    let num_candidates = k + l + k * l;

    let lhs_edges = lhs.roll(&[-1], &[2]) - lhs;
    let rhs_edges = rhs.roll(&[-1], &[2]) - rhs;

    // [C, M, K, 1, 2] against [C, M, 1, L, 2]
    let p = lhs.unsqueeze(3);
    let r = lhs_edges.unsqueeze(3);
    let q = rhs.unsqueeze(2);
    let s = rhs_edges.unsqueeze(2);

    let lhs_inside = cross(&s, &(&p - &q)).ge(-INSIDE_EPSILON).all_dim(3, false);
    let rhs_inside = cross(&r, &(&q - &p)).ge(-INSIDE_EPSILON).all_dim(2, false);

    let (crossings, crossing_mask) = {
        let denom = cross(&r, &s);
        let is_proper = denom.abs().gt(INSIDE_EPSILON);
        let denom = denom.where_self(&is_proper, &denom.ones_like());
        let qp = &q - &p;
        let t = cross(&qp, &s) / &denom;
        let u = cross(&qp, &r) / &denom;
        let mask = is_proper
            .logical_and(&t.ge(0.0))
            .logical_and(&t.le(1.0))
            .logical_and(&u.ge(0.0))
            .logical_and(&u.le(1.0));
        let points = &p + &r * t.unsqueeze(-1);
        (points.view([c, m, k * l, 2]), mask.view([c, m, k * l]))
    };

    let candidates = Tensor::cat(&[lhs.shallow_clone(), rhs.shallow_clone(), crossings], 2);
    let mask = Tensor::cat(&[lhs_inside, rhs_inside, crossing_mask], 2);

    let sorted = {
        let weights = mask.to_kind(Kind::Double);
        let count = weights
            .sum_dim_intlist(&[2], true, Kind::Double)
            .clamp_min(1.0);
        let centroid = (&candidates * weights.unsqueeze(-1))
            .sum_dim_intlist(&[2], true, Kind::Double)
            / count.unsqueeze(-1);
        let rel = &candidates - &centroid;
        let angles = rel
            .select(-1, 1)
            .atan2(&rel.select(-1, 0))
            .masked_fill(&mask.logical_not(), MASKED_ANGLE);
        let (_, order) = angles.sort(2, false);

        let sorted = candidates.gather(
            2,
            &order.unsqueeze(-1).expand(&[c, m, num_candidates, 2], false),
            false,
        );
        let sorted_mask = mask.gather(2, &order, false);

        // unused slots collapse onto the first vertex
        let first = sorted.narrow(2, 0, 1).expand(&[c, m, num_candidates, 2], false);
        sorted.where_self(
            &sorted_mask
                .unsqueeze(-1)
                .expand(&[c, m, num_candidates, 2], false),
            &first,
        )
    };

    cross(&sorted, &sorted.roll(&[-1], &[2]))
        .sum_dim_intlist(&[2], false, Kind::Double)
        .abs()
        / 2.0
}

/// Turn `[C, M]` intersections into overlaps, given `[C, 1]` and `[1, M]`
/// areas or aligned `[C, 1]` areas.
fn overlap_values(inter: &Tensor, lhs_areas: &Tensor, rhs_areas: &Tensor, mode: OverlapMode) -> Tensor {
    let valid = lhs_areas
        .gt(0.0)
        .logical_and(&rhs_areas.gt(0.0))
        .to_kind(Kind::Double);
    let inter = inter.min1(lhs_areas).min1(rhs_areas) * &valid;

    let denominator = match mode {
        OverlapMode::IoU => lhs_areas + rhs_areas - &inter,
        OverlapMode::IoF => lhs_areas.expand_as(&inter),
    };
    (&inter / denominator.clamp_min(AREA_EPSILON)).clamp(0.0, 1.0) * valid
}
