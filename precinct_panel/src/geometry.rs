// ********* Planar geometry **********
//
// Coordinates are (longitude, latitude) pairs handled as plane coordinates.
// Points on a boundary count as inside.

use std::collections::BTreeMap;

use crate::config::Year;

const EPSILON: f64 = 1e-12;

#[derive(PartialEq, Debug, Clone, Copy)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
}

impl Coord {
    pub fn new(x: f64, y: f64) -> Coord {
        Coord { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// A polygon with one exterior ring and optional holes. Rings may or may not repeat
/// their first vertex at the end.
#[derive(PartialEq, Debug, Clone)]
pub struct Polygon {
    pub exterior: Vec<Coord>,
    pub holes: Vec<Vec<Coord>>,
}

#[derive(PartialEq, Debug, Clone)]
pub enum Geometry {
    Point(Coord),
    Polygon(Polygon),
    MultiPolygon(Vec<Polygon>),
}

fn ring_vertices(ring: &[Coord]) -> &[Coord] {
    match (ring.first(), ring.last()) {
        (Some(a), Some(b)) if ring.len() > 1 && a == b => &ring[..ring.len() - 1],
        _ => ring,
    }
}

fn ring_is_valid(ring: &[Coord]) -> bool {
    let vs = ring_vertices(ring);
    if vs.len() < 3 || vs.iter().any(|c| !c.is_finite()) {
        return false;
    }
    ring_area(vs).abs() > EPSILON
}

/// Signed area (shoelace) of a ring given without its closing vertex.
fn ring_area(vs: &[Coord]) -> f64 {
    let n = vs.len();
    let mut acc = 0.0;
    for i in 0..n {
        let a = vs[i];
        let b = vs[(i + 1) % n];
        acc += a.x * b.y - b.x * a.y;
    }
    acc / 2.0
}

fn edges(ring: &[Coord]) -> impl Iterator<Item = (Coord, Coord)> + '_ {
    let vs = ring_vertices(ring);
    let n = vs.len();
    (0..n).map(move |i| (vs[i], vs[(i + 1) % n]))
}

fn cross(o: Coord, a: Coord, b: Coord) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

fn on_segment(p: Coord, a: Coord, b: Coord) -> bool {
    cross(a, b, p).abs() <= EPSILON
        && p.x >= a.x.min(b.x) - EPSILON
        && p.x <= a.x.max(b.x) + EPSILON
        && p.y >= a.y.min(b.y) - EPSILON
        && p.y <= a.y.max(b.y) + EPSILON
}

fn segments_intersect(p1: Coord, p2: Coord, q1: Coord, q2: Coord) -> bool {
    let d1 = cross(q1, q2, p1);
    let d2 = cross(q1, q2, p2);
    let d3 = cross(p1, p2, q1);
    let d4 = cross(p1, p2, q2);
    if ((d1 > EPSILON && d2 < -EPSILON) || (d1 < -EPSILON && d2 > EPSILON))
        && ((d3 > EPSILON && d4 < -EPSILON) || (d3 < -EPSILON && d4 > EPSILON))
    {
        return true;
    }
    on_segment(p1, q1, q2) || on_segment(p2, q1, q2) || on_segment(q1, p1, p2) || on_segment(q2, p1, p2)
}

/// Ray casting, with points on the ring counted as inside.
fn ring_contains(ring: &[Coord], p: Coord) -> bool {
    let mut inside = false;
    for (a, b) in edges(ring) {
        if on_segment(p, a, b) {
            return true;
        }
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if p.x < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}

fn ring_on_boundary(ring: &[Coord], p: Coord) -> bool {
    edges(ring).any(|(a, b)| on_segment(p, a, b))
}

impl Polygon {
    pub fn new(exterior: Vec<Coord>) -> Polygon {
        Polygon {
            exterior,
            holes: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        ring_is_valid(&self.exterior) && self.holes.iter().all(|h| ring_is_valid(h))
    }

    /// (min x, min y, max x, max y)
    pub fn bbox(&self) -> (f64, f64, f64, f64) {
        self.exterior.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(x0, y0, x1, y1), c| (x0.min(c.x), y0.min(c.y), x1.max(c.x), y1.max(c.y)),
        )
    }

    pub fn contains(&self, p: Coord) -> bool {
        let (x0, y0, x1, y1) = self.bbox();
        if p.x < x0 - EPSILON || p.x > x1 + EPSILON || p.y < y0 - EPSILON || p.y > y1 + EPSILON {
            return false;
        }
        if !ring_contains(&self.exterior, p) {
            return false;
        }
        // The edge of a hole is still part of the polygon.
        !self
            .holes
            .iter()
            .any(|h| ring_contains(h, p) && !ring_on_boundary(h, p))
    }

    pub fn intersects(&self, other: &Polygon) -> bool {
        let (ax0, ay0, ax1, ay1) = self.bbox();
        let (bx0, by0, bx1, by1) = other.bbox();
        if ax1 < bx0 - EPSILON || bx1 < ax0 - EPSILON || ay1 < by0 - EPSILON || by1 < ay0 - EPSILON {
            return false;
        }
        if ring_vertices(&self.exterior).iter().any(|c| other.contains(*c))
            || ring_vertices(&other.exterior).iter().any(|c| self.contains(*c))
        {
            return true;
        }
        edges(&self.exterior).any(|(a, b)| {
            edges(&other.exterior).any(|(c, d)| segments_intersect(a, b, c, d))
        })
    }

    /// A point guaranteed to lie in the polygon: the area centroid when it falls
    /// inside, a vertex otherwise.
    pub fn representative_point(&self) -> Option<Coord> {
        let vs = ring_vertices(&self.exterior);
        let area = ring_area(vs);
        if vs.is_empty() {
            return None;
        }
        if area.abs() > EPSILON {
            let n = vs.len();
            let (mut cx, mut cy) = (0.0, 0.0);
            for i in 0..n {
                let a = vs[i];
                let b = vs[(i + 1) % n];
                let f = a.x * b.y - b.x * a.y;
                cx += (a.x + b.x) * f;
                cy += (a.y + b.y) * f;
            }
            let c = Coord::new(cx / (6.0 * area), cy / (6.0 * area));
            if c.is_finite() && self.contains(c) {
                return Some(c);
            }
        }
        vs.first().copied()
    }
}

impl Geometry {
    /// A geometry that can be located: finite coordinates and non-degenerate rings.
    pub fn is_valid(&self) -> bool {
        match self {
            Geometry::Point(c) => c.is_finite(),
            Geometry::Polygon(p) => p.is_valid(),
            Geometry::MultiPolygon(ps) => !ps.is_empty() && ps.iter().all(|p| p.is_valid()),
        }
    }

    pub fn polygons(&self) -> Vec<&Polygon> {
        match self {
            Geometry::Point(_) => Vec::new(),
            Geometry::Polygon(p) => vec![p],
            Geometry::MultiPolygon(ps) => ps.iter().collect(),
        }
    }

    pub fn contains_point(&self, p: Coord) -> bool {
        match self {
            Geometry::Point(c) => *c == p,
            _ => self.polygons().iter().any(|poly| poly.contains(p)),
        }
    }

    pub fn intersects(&self, other: &Geometry) -> bool {
        match (self, other) {
            (Geometry::Point(a), _) => other.contains_point(*a),
            (_, Geometry::Point(b)) => self.contains_point(*b),
            _ => self
                .polygons()
                .iter()
                .any(|a| other.polygons().iter().any(|b| a.intersects(b))),
        }
    }

    pub fn representative_point(&self) -> Option<Coord> {
        match self {
            Geometry::Point(c) => Some(*c),
            Geometry::Polygon(p) => p.representative_point(),
            Geometry::MultiPolygon(ps) => ps
                .iter()
                .max_by(|a, b| {
                    ring_area(ring_vertices(&a.exterior))
                        .abs()
                        .total_cmp(&ring_area(ring_vertices(&b.exterior)).abs())
                })
                .and_then(|p| p.representative_point()),
        }
    }
}

// ********* Boundary vintages **********

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum BoundaryKind {
    Precinct,
    District,
}

impl BoundaryKind {
    pub fn label(&self) -> &'static str {
        match self {
            BoundaryKind::Precinct => "precinct",
            BoundaryKind::District => "district",
        }
    }
}

/// The shapes of one kind of geography, as published for one year.
#[derive(PartialEq, Debug, Clone)]
pub struct BoundarySet {
    pub kind: BoundaryKind,
    pub year: Year,
    /// Geography id -> shape. Precinct ids are normalized the way merged records are.
    pub shapes: BTreeMap<String, Geometry>,
}

/// All the published vintages of one kind of geography.
#[derive(PartialEq, Debug, Clone)]
pub struct BoundaryHistory {
    pub kind: BoundaryKind,
    pub vintages: BTreeMap<Year, BoundarySet>,
}

impl BoundaryHistory {
    pub fn new(kind: BoundaryKind) -> BoundaryHistory {
        BoundaryHistory {
            kind,
            vintages: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, set: BoundarySet) {
        self.vintages.insert(set.year, set);
    }

    /// The vintage in force at a year: the latest published at or before it,
    /// else the earliest one.
    pub fn vintage_for(&self, year: Year) -> Option<&BoundarySet> {
        self.vintages
            .range(..=year)
            .next_back()
            .map(|(_, s)| s)
            .or_else(|| self.vintages.values().next())
    }

    pub fn is_empty(&self) -> bool {
        self.vintages.is_empty()
    }
}

/// Shape id of a precinct: precinct ids are only unique within a county.
pub fn precinct_shape_key(county: &str, precinct_id: &str) -> String {
    format!("{}/{}", county.trim().to_uppercase(), precinct_id)
}

/// Shape id of a district: district numbers are only unique within an office.
pub fn district_shape_key(office: &str, district: &str) -> String {
    format!("{}/{}", office, district)
}

/// Splits a district shape id back into its office and district.
pub fn split_district_key(key: &str) -> Option<(&str, &str)> {
    key.rsplit_once('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, side: f64) -> Polygon {
        Polygon::new(vec![
            Coord::new(x0, y0),
            Coord::new(x0 + side, y0),
            Coord::new(x0 + side, y0 + side),
            Coord::new(x0, y0 + side),
            Coord::new(x0, y0),
        ])
    }

    #[test]
    fn points_inside_and_on_the_boundary() {
        let sq = square(0.0, 0.0, 2.0);
        assert!(sq.contains(Coord::new(1.0, 1.0)));
        assert!(sq.contains(Coord::new(0.0, 1.0)));
        assert!(sq.contains(Coord::new(2.0, 2.0)));
        assert!(!sq.contains(Coord::new(2.5, 1.0)));
    }

    #[test]
    fn holes_are_outside() {
        let mut sq = square(0.0, 0.0, 4.0);
        sq.holes.push(square(1.0, 1.0, 2.0).exterior);
        assert!(!sq.contains(Coord::new(2.0, 2.0)));
        assert!(sq.contains(Coord::new(1.0, 2.0)));
        assert!(sq.contains(Coord::new(0.5, 0.5)));
    }

    #[test]
    fn polygon_intersections() {
        let a = Geometry::Polygon(square(0.0, 0.0, 2.0));
        let b = Geometry::Polygon(square(1.0, 1.0, 2.0));
        let c = Geometry::Polygon(square(5.0, 5.0, 1.0));
        // Crossing edges, no vertex inside the other.
        let wide = Geometry::Polygon(Polygon::new(vec![
            Coord::new(-1.0, 0.5),
            Coord::new(3.0, 0.5),
            Coord::new(3.0, 1.5),
            Coord::new(-1.0, 1.5),
        ]));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(a.intersects(&wide));
        assert!(a.intersects(&Geometry::Point(Coord::new(1.0, 1.0))));
        assert!(!c.intersects(&Geometry::Point(Coord::new(1.0, 1.0))));
    }

    #[test]
    fn degenerate_geometries_are_invalid() {
        let line = Polygon::new(vec![
            Coord::new(0.0, 0.0),
            Coord::new(1.0, 1.0),
            Coord::new(2.0, 2.0),
        ]);
        assert!(!line.is_valid());
        assert!(!Geometry::Point(Coord::new(f64::NAN, 1.0)).is_valid());
        assert!(!Geometry::MultiPolygon(vec![]).is_valid());
        assert!(Geometry::Polygon(square(0.0, 0.0, 1.0)).is_valid());
    }

    #[test]
    fn representative_point_of_a_concave_polygon() {
        // A "U" shape whose centroid falls in the notch.
        let u = Polygon::new(vec![
            Coord::new(0.0, 0.0),
            Coord::new(3.0, 0.0),
            Coord::new(3.0, 3.0),
            Coord::new(2.0, 3.0),
            Coord::new(2.0, 0.5),
            Coord::new(1.0, 0.5),
            Coord::new(1.0, 3.0),
            Coord::new(0.0, 3.0),
        ]);
        let p = u.representative_point().unwrap();
        assert!(u.contains(p));
        let sq = square(0.0, 0.0, 2.0);
        assert_eq!(sq.representative_point(), Some(Coord::new(1.0, 1.0)));
    }

    #[test]
    fn vintages_fall_back_to_the_earliest() {
        let mut h = BoundaryHistory::new(BoundaryKind::District);
        for y in [2012, 2022].iter() {
            h.insert(BoundarySet {
                kind: BoundaryKind::District,
                year: *y,
                shapes: BTreeMap::new(),
            });
        }
        assert_eq!(h.vintage_for(2018).map(|s| s.year), Some(2012));
        assert_eq!(h.vintage_for(2022).map(|s| s.year), Some(2022));
        assert_eq!(h.vintage_for(2010).map(|s| s.year), Some(2012));
    }
}
