use crate::{
    angle::AngleRange,
    common::*,
    element::Element,
    obox::{Flip, OBox, OBox_},
    point::Point,
    tlbr::TLBR,
    transform::Transform,
    HW,
};

/// Polygon box with an ordered sequence of vertices.
#[derive(Debug, Clone, PartialEq)]
pub struct Poly<T> {
    pub(crate) points: Vec<Point<T>>,
}

impl<T> Poly<T>
where
    T: Element,
{
    pub fn try_from_points(points: Vec<Point<T>>) -> Result<Self> {
        ensure!(!points.is_empty(), "polygon must have at least one vertex");
        Ok(Self { points })
    }

    pub fn from_points(points: Vec<Point<T>>) -> Self {
        Self::try_from_points(points).unwrap()
    }

    /// Build a polygon from a flat `[x1, y1, x2, y2, ...]` coordinate slice.
    pub fn try_from_flat(coords: &[T]) -> Result<Self> {
        ensure!(
            !coords.is_empty() && coords.len() % 2 == 0,
            "expect a non-empty even number of coordinates, but get {}",
            coords.len()
        );
        let points = coords
            .chunks_exact(2)
            .map(|xy| Point::new(xy[0], xy[1]))
            .collect();
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Point<T>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn to_flat(&self) -> Vec<T> {
        self.points.iter().flat_map(|p| [p.x, p.y]).collect()
    }

    /// Shoelace area, positive when the vertices run clockwise on screen.
    pub fn signed_area(&self) -> T {
        signed_area(&self.points)
    }

    pub fn area(&self) -> T {
        self.signed_area().abs()
    }

    pub fn is_finite(&self) -> bool {
        self.points.iter().all(Point::is_finite)
    }

    /// The axis-aligned box spanned by the finite vertices.
    pub fn to_tlbr(&self) -> TLBR<T> {
        let mut finite = self.points.iter().filter(|p| p.is_finite());
        let first = match finite.next() {
            Some(first) => *first,
            None => {
                return TLBR {
                    t: T::zero(),
                    l: T::zero(),
                    b: T::zero(),
                    r: T::zero(),
                }
            }
        };
        finite.fold(
            TLBR {
                t: first.y,
                l: first.x,
                b: first.y,
                r: first.x,
            },
            |tlbr, p| TLBR {
                t: tlbr.t.min(p.y),
                l: tlbr.l.min(p.x),
                b: tlbr.b.max(p.y),
                r: tlbr.r.max(p.x),
            },
        )
    }

    /// Convex hull of the finite vertices with positive signed area.
    ///
    /// Collinear and duplicated vertices are dropped. The hull of fewer
    /// than three distinct points keeps those points.
    pub fn convex_hull(&self) -> Vec<Point<T>> {
        let mut points: Vec<_> = self.points.iter().copied().filter(Point::is_finite).collect();
        points.sort_by(|lhs, rhs| lhs.lexicographic_cmp(rhs));
        points.dedup();

        if points.len() < 3 {
            return points;
        }

        let turn = |o: &Point<T>, a: &Point<T>, b: &Point<T>| (*a - *o).cross(&(*b - *o));

        let mut lower: Vec<Point<T>> = Vec::with_capacity(points.len());
        for point in &points {
            while lower.len() >= 2 && turn(&lower[lower.len() - 2], &lower[lower.len() - 1], point) <= T::zero() {
                lower.pop();
            }
            lower.push(*point);
        }

        let mut upper: Vec<Point<T>> = Vec::with_capacity(points.len());
        for point in points.iter().rev() {
            while upper.len() >= 2 && turn(&upper[upper.len() - 2], &upper[upper.len() - 1], point) <= T::zero() {
                upper.pop();
            }
            upper.push(*point);
        }

        lower.pop();
        upper.pop();
        lower.extend(upper);
        lower
    }

    /// Fit the minimum-area rectangle and regularize it.
    ///
    /// The rectangle is searched over the convex hull edges. Degenerate
    /// input yields a degenerate box: collinear points give zero height and
    /// a single point gives zero size.
    pub fn to_obox(&self, range: AngleRange) -> OBox<T> {
        min_area_rect(&self.convex_hull()).regularize(range)
    }

    /// Rotate the vertex order to best match the reference polygon.
    ///
    /// The cyclic shift minimizing the sum of distances between
    /// corresponding vertices is chosen. The smallest shift wins ties.
    pub fn best_begin_point(&self, reference: &Poly<T>) -> Result<Self> {
        ensure!(
            self.len() == reference.len(),
            "polygon has {} vertices while the reference has {}",
            self.len(),
            reference.len()
        );
        let len = self.len();

        let (best_shift, _) = (0..len).fold((0, T::infinity()), |(best_shift, best_cost), shift| {
            let cost = (0..len).fold(T::zero(), |sum, index| {
                sum + self.points[(index + shift) % len].distance_to(&reference.points[index])
            });
            if cost < best_cost {
                (shift, cost)
            } else {
                (best_shift, best_cost)
            }
        });

        let mut points = self.points.clone();
        points.rotate_left(best_shift);
        Ok(Self { points })
    }

    /// Rotate the vertex order to best match the corners of the polygon's
    /// own axis-aligned box, starting from the top-left corner.
    pub fn best_begin_point_hbb(&self) -> Self {
        let tlbr = self.to_tlbr();
        let corners = [
            Point::new(tlbr.l, tlbr.t),
            Point::new(tlbr.r, tlbr.t),
            Point::new(tlbr.r, tlbr.b),
            Point::new(tlbr.l, tlbr.b),
        ];
        let reference = Self {
            points: (0..self.len()).map(|index| corners[index % 4]).collect(),
        };
        self.best_begin_point(&reference)
            .unwrap_or_else(|_| self.clone())
    }

    pub fn transform(&self, transform: &Transform<T>) -> Self {
        let points = self
            .points
            .iter()
            .map(|p| Point::new(p.x * transform.sx + transform.tx, p.y * transform.sy + transform.ty))
            .collect();
        Self { points }
    }

    /// Flip the polygon within an image of the given size.
    ///
    /// The vertex order is reversed to keep the orientation.
    pub fn flip(&self, flip: Flip, size: &HW<T>) -> Self {
        let points = self
            .points
            .iter()
            .rev()
            .map(|p| match flip {
                Flip::Horizontal => Point::new(size.w() - p.x, p.y),
                Flip::Vertical => Point::new(p.x, size.h() - p.y),
            })
            .collect();
        Self { points }
    }
}

impl<T> From<&OBox<T>> for Poly<T>
where
    T: Element,
{
    fn from(from: &OBox<T>) -> Self {
        from.to_poly()
    }
}

impl<T> From<&TLBR<T>> for Poly<T>
where
    T: Element,
{
    fn from(from: &TLBR<T>) -> Self {
        OBox::from(from).to_poly()
    }
}

pub(crate) fn signed_area<T>(points: &[Point<T>]) -> T
where
    T: Element,
{
    if points.len() < 3 {
        return T::zero();
    }
    let two = T::one() + T::one();
    let origin = points[0];
    let sum = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .fold(T::zero(), |sum, (curr, next)| {
            sum + (*curr - origin).cross(&(*next - origin))
        });
    sum / two
}

/// Minimum-area rectangle of a convex hull with positive orientation.
fn min_area_rect<T>(hull: &[Point<T>]) -> OBox_<T>
where
    T: Element,
{
    let two = T::one() + T::one();

    match hull {
        [] => {
            return OBox_ {
                cx: T::zero(),
                cy: T::zero(),
                w: T::zero(),
                h: T::zero(),
                angle: T::zero(),
            }
        }
        [point] => {
            return OBox_ {
                cx: point.x,
                cy: point.y,
                w: T::zero(),
                h: T::zero(),
                angle: T::zero(),
            }
        }
        [lhs, rhs] => {
            let diff = *rhs - *lhs;
            let center = (*lhs + *rhs) * (T::one() / two);
            return OBox_ {
                cx: center.x,
                cy: center.y,
                w: diff.norm(),
                h: T::zero(),
                angle: diff.y.atan2(diff.x),
            };
        }
        _ => {}
    }

    let mut best: Option<(T, OBox_<T>)> = None;

    for (origin, next) in hull.iter().zip(hull.iter().cycle().skip(1)) {
        let edge = *next - *origin;
        let length = edge.norm();
        if length <= T::epsilon() {
            continue;
        }
        let u = edge * (T::one() / length);
        let v = Point::new(-u.y, u.x);

        let (min_u, max_u, min_v, max_v) = hull.iter().fold(
            (
                T::infinity(),
                T::neg_infinity(),
                T::infinity(),
                T::neg_infinity(),
            ),
            |(min_u, max_u, min_v, max_v), point| {
                let rel = *point - *origin;
                let pu = rel.dot(&u);
                let pv = rel.dot(&v);
                (min_u.min(pu), max_u.max(pu), min_v.min(pv), max_v.max(pv))
            },
        );

        let w = max_u - min_u;
        let h = max_v - min_v;
        let area = w * h;

        if best.as_ref().map_or(true, |(best_area, _)| area < *best_area) {
            let center = *origin + u * ((min_u + max_u) / two) + v * ((min_v + max_v) / two);
            best = Some((
                area,
                OBox_ {
                    cx: center.x,
                    cy: center.y,
                    w,
                    h,
                    angle: u.y.atan2(u.x),
                },
            ));
        }
    }

    match best {
        Some((_, obox)) => obox,
        None => {
            let tlbr = Poly {
                points: hull.to_vec(),
            }
            .to_tlbr();
            OBox_::from(OBox::from(&tlbr))
        }
    }
}
