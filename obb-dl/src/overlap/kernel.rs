//! Convex polygon intersection used by the CPU engines.

use super::OverlapMode;
use crate::common::*;
use bbox::Point;

/// Floor of the overlap denominators.
pub const AREA_EPSILON: f64 = 1e-6;

/// A convex shape prepared for repeated intersection tests.
///
/// The vertices run with positive signed area. Shapes without finite
/// vertices or with zero area are degenerate and overlap nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvexShape {
    points: Vec<Point<f64>>,
    area: f64,
    bounds: [f64; 4],
}

impl ConvexShape {
    pub fn from_obox(obox: &OBox<f32>) -> Self {
        match obox.try_cast::<f64>() {
            Some(obox) => Self::from_points(obox.to_poly().convex_hull()),
            None => Self::empty(),
        }
    }

    /// A polygon with any non-finite vertex is degenerate as a whole.
    pub fn from_poly(poly: &Poly<f32>) -> Self {
        if !poly.is_finite() {
            return Self::empty();
        }
        let points: Vec<_> = poly
            .points()
            .iter()
            .map(|p| Point::new(p.x as f64, p.y as f64))
            .collect();
        match Poly::try_from_points(points) {
            Ok(poly) => Self::from_points(poly.convex_hull()),
            Err(_) => Self::empty(),
        }
    }

    fn from_points(points: Vec<Point<f64>>) -> Self {
        let area = match Poly::try_from_points(points.clone()) {
            Ok(poly) => poly.signed_area(),
            Err(_) => return Self::empty(),
        };
        if !(area > 0.0 && area.is_finite()) {
            return Self::empty();
        }

        let bounds = points.iter().fold(
            [
                f64::INFINITY,
                f64::INFINITY,
                f64::NEG_INFINITY,
                f64::NEG_INFINITY,
            ],
            |[t, l, b, r], p| [t.min(p.y), l.min(p.x), b.max(p.y), r.max(p.x)],
        );

        Self {
            points,
            area,
            bounds,
        }
    }

    fn empty() -> Self {
        Self {
            points: vec![],
            area: 0.0,
            bounds: [0.0; 4],
        }
    }

    pub fn points(&self) -> &[Point<f64>] {
        &self.points
    }

    pub fn area(&self) -> f64 {
        self.area
    }

    pub fn is_degenerate(&self) -> bool {
        self.points.len() < 3
    }

    fn bounds_overlap(&self, other: &Self) -> bool {
        let [t1, l1, b1, r1] = self.bounds;
        let [t2, l2, b2, r2] = other.bounds;
        t1.max(t2) < b1.min(b2) && l1.max(l2) < r1.min(r2)
    }

    /// Total order used to pick the clipping operands.
    fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.area
            .total_cmp(&other.area)
            .then_with(|| self.points.len().cmp(&other.points.len()))
            .then_with(|| {
                self.points
                    .iter()
                    .zip(&other.points)
                    .map(|(lhs, rhs)| lhs.x.total_cmp(&rhs.x).then(lhs.y.total_cmp(&rhs.y)))
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(Ordering::Equal)
            })
    }
}

/// The intersection area of two convex shapes.
///
/// The result does not depend on the operand order.
pub fn intersection_area(lhs: &ConvexShape, rhs: &ConvexShape) -> f64 {
    if lhs.is_degenerate() || rhs.is_degenerate() {
        return 0.0;
    }
    if lhs.points == rhs.points {
        return lhs.area;
    }
    if !lhs.bounds_overlap(rhs) {
        return 0.0;
    }

    let (subject, clip) = match lhs.canonical_cmp(rhs) {
        Ordering::Greater => (rhs, lhs),
        _ => (lhs, rhs),
    };

    let clipped = clip_convex(&subject.points, &clip.points);
    let area = match Poly::try_from_points(clipped) {
        Ok(poly) => poly.area(),
        Err(_) => 0.0,
    };

    if area.is_finite() {
        area.min(lhs.area).min(rhs.area)
    } else {
        0.0
    }
}

/// The IoU or IoF of two convex shapes.
pub fn overlap(lhs: &ConvexShape, rhs: &ConvexShape, mode: OverlapMode) -> f32 {
    let inter = intersection_area(lhs, rhs);
    if inter <= 0.0 {
        return 0.0;
    }

    let denominator = match mode {
        OverlapMode::IoU => lhs.area + rhs.area - inter,
        OverlapMode::IoF => lhs.area,
    };
    let value = inter / denominator.max(AREA_EPSILON);

    if value.is_finite() {
        value.clamp(0.0, 1.0) as f32
    } else {
        0.0
    }
}

/// Sutherland-Hodgman clipping of a subject polygon by a convex polygon
/// with positive orientation.
fn clip_convex(subject: &[Point<f64>], clip: &[Point<f64>]) -> Vec<Point<f64>> {
    let mut output = subject.to_vec();

    for (&edge_begin, &edge_end) in clip.iter().zip(clip.iter().cycle().skip(1)) {
        if output.is_empty() {
            break;
        }
        let edge = edge_end - edge_begin;
        let side = |point: Point<f64>| edge.cross(&(point - edge_begin));

        let input = std::mem::take(&mut output);
        let mut prev = match input.last() {
            Some(&last) => last,
            None => break,
        };

        for &curr in &input {
            let prev_side = side(prev);
            let curr_side = side(curr);

            if curr_side >= 0.0 {
                if prev_side < 0.0 {
                    output.push(segment_crossing(prev, curr, prev_side, curr_side));
                }
                output.push(curr);
            } else if prev_side >= 0.0 {
                output.push(segment_crossing(prev, curr, prev_side, curr_side));
            }

            prev = curr;
        }
    }

    output
}

fn segment_crossing(
    begin: Point<f64>,
    end: Point<f64>,
    begin_side: f64,
    end_side: f64,
) -> Point<f64> {
    let ratio = begin_side / (begin_side - end_side);
    begin + (end - begin) * ratio
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

    fn shape(params: [f32; 5]) -> ConvexShape {
        ConvexShape::from_obox(&OBox::from_cxcywha(params))
    }

    #[test]
    fn kernel_axis_aligned_overlap() {
        let lhs = shape([1.0, 1.0, 2.0, 2.0, 0.0]);
        let rhs = shape([2.0, 2.0, 2.0, 2.0, 0.0]);
        assert_abs_diff_eq!(intersection_area(&lhs, &rhs), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(overlap(&lhs, &rhs, OverlapMode::IoU), 1.0 / 7.0, epsilon = 1e-6);
        assert_abs_diff_eq!(overlap(&lhs, &rhs, OverlapMode::IoF), 0.25, epsilon = 1e-6);
    }

    #[test]
    fn kernel_rotated_overlap() {
        let gt = shape([50.0, 50.0, 20.0, 10.0, 0.0]);

        let quarter = shape([50.0, 50.0, 20.0, 10.0, FRAC_PI_2]);
        assert_abs_diff_eq!(overlap(&gt, &quarter, OverlapMode::IoU), 1.0 / 3.0, epsilon = 1e-5);

        // 0.5174 from the octagonal intersection
        let diagonal = shape([50.0, 50.0, 20.0, 10.0, FRAC_PI_4]);
        assert_abs_diff_eq!(overlap(&gt, &diagonal, OverlapMode::IoU), 0.5174, epsilon = 1e-3);

        let small = shape([50.0, 50.0, 5.0, 5.0, 0.0]);
        assert_abs_diff_eq!(overlap(&gt, &small, OverlapMode::IoU), 0.125, epsilon = 1e-6);
        assert_abs_diff_eq!(overlap(&small, &gt, OverlapMode::IoF), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn kernel_self_overlap_is_one() {
        let lhs = shape([12.5, -3.0, 7.0, 2.0, 0.3]);
        assert_eq!(overlap(&lhs, &lhs.clone(), OverlapMode::IoU), 1.0);
        assert_eq!(overlap(&lhs, &lhs, OverlapMode::IoF), 1.0);
    }

    #[test]
    fn kernel_degenerate_shapes() {
        let normal = shape([0.0, 0.0, 4.0, 4.0, 0.0]);
        let flat = shape([0.0, 0.0, 4.0, 0.0, 0.0]);
        let point = shape([0.0, 0.0, 0.0, 0.0, 0.0]);
        assert!(flat.is_degenerate());
        assert_eq!(overlap(&normal, &flat, OverlapMode::IoU), 0.0);
        assert_eq!(overlap(&flat, &flat, OverlapMode::IoU), 0.0);
        assert_eq!(overlap(&point, &normal, OverlapMode::IoF), 0.0);

        let broken = ConvexShape::from_poly(&Poly::from_points(vec![
            Point::new(f32::NAN, 0.0),
            Point::new(1.0, f32::INFINITY),
            Point::new(0.0, 1.0),
        ]));
        assert_eq!(overlap(&normal, &broken, OverlapMode::IoU), 0.0);

        let square = [
            Point::new(0.0, 0.0),
            Point::new(4.0, 0.0),
            Point::new(4.0, 4.0),
            Point::new(0.0, 4.0),
        ];
        let mut corrupted = square;
        corrupted[0] = Point::new(f32::NAN, 0.0);
        let square = ConvexShape::from_poly(&Poly::from_points(square.to_vec()));
        let corrupted = ConvexShape::from_poly(&Poly::from_points(corrupted.to_vec()));
        assert!(corrupted.is_degenerate());
        assert_eq!(overlap(&square, &corrupted, OverlapMode::IoU), 0.0);
        assert_eq!(overlap(&corrupted, &square, OverlapMode::IoF), 0.0);
    }

    #[test]
    fn kernel_is_symmetric() {
        let lhs = shape([10.0, 10.0, 9.0, 3.0, 0.7]);
        let rhs = shape([11.0, 9.5, 6.0, 5.0, -0.2]);
        assert_eq!(
            intersection_area(&lhs, &rhs).to_bits(),
            intersection_area(&rhs, &lhs).to_bits()
        );
        assert_eq!(
            overlap(&lhs, &rhs, OverlapMode::IoU).to_bits(),
            overlap(&rhs, &lhs, OverlapMode::IoU).to_bits()
        );
    }

    #[test]
    fn kernel_non_convex_poly_uses_hull() {
        let arrow = ConvexShape::from_poly(&Poly::from_points(vec![
            Point::new(0.0, 0.0),
            Point::new(4.0, 0.0),
            Point::new(2.0, 1.0),
            Point::new(4.0, 4.0),
            Point::new(0.0, 4.0),
        ]));
        assert_abs_diff_eq!(arrow.area(), 16.0, epsilon = 1e-9);
    }
}
