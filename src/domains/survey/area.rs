use crate::common::GeoPoint;
use serde::{Deserialize, Serialize};

const EPSILON: f64 = 1e-12;

type Coordinate = fn(&GeoPoint) -> f64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn mid_lat(&self) -> f64 {
        (self.min_lat + self.max_lat) / 2.0
    }
}

/// A simple polygon stored as an open ring (the closing vertex is implicit).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    ring: Vec<GeoPoint>,
}

impl Polygon {
    pub fn new(mut ring: Vec<GeoPoint>) -> Self {
        if ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        Self { ring }
    }

    pub fn vertices(&self) -> &[GeoPoint] {
        &self.ring
    }

    pub fn bounds(&self) -> Option<BoundingBox> {
        let first = self.ring.first()?;
        let init = BoundingBox {
            min_lon: first.lon,
            min_lat: first.lat,
            max_lon: first.lon,
            max_lat: first.lat,
        };
        Some(self.ring.iter().fold(init, |b, p| BoundingBox {
            min_lon: b.min_lon.min(p.lon),
            min_lat: b.min_lat.min(p.lat),
            max_lon: b.max_lon.max(p.lon),
            max_lat: b.max_lat.max(p.lat),
        }))
    }

    fn edges(&self) -> impl Iterator<Item = (&GeoPoint, &GeoPoint)> {
        self.ring
            .iter()
            .zip(self.ring.iter().cycle().skip(1))
            .take(self.ring.len())
    }

    fn signed_area(&self) -> f64 {
        self.edges()
            .map(|(p, q)| p.lon * q.lat - q.lon * p.lat)
            .sum::<f64>()
            / 2.0
    }

    /// Planar area in square degrees (lon × lat).
    pub fn area(&self) -> f64 {
        if self.ring.len() < 3 {
            return 0.0;
        }
        self.signed_area().abs()
    }

    /// Fewer than three vertices, or an area negligible next to the bounding box.
    pub fn is_degenerate(&self) -> bool {
        let Some(b) = self.bounds() else {
            return true;
        };
        let box_area = (b.max_lon - b.min_lon) * (b.max_lat - b.min_lat);
        self.ring.len() < 3 || box_area <= 0.0 || self.area() <= box_area * 1e-9
    }

    pub fn centroid(&self) -> Option<GeoPoint> {
        if self.ring.is_empty() {
            return None;
        }
        let signed = self.signed_area();
        if signed.abs() < EPSILON {
            let n = self.ring.len() as f64;
            let lat = self.ring.iter().map(|p| p.lat).sum::<f64>() / n;
            let lon = self.ring.iter().map(|p| p.lon).sum::<f64>() / n;
            return Some(GeoPoint::new(lat, lon));
        }
        let (cx, cy) = self.edges().fold((0.0, 0.0), |(cx, cy), (p, q)| {
            let cross = p.lon * q.lat - q.lon * p.lat;
            (cx + (p.lon + q.lon) * cross, cy + (p.lat + q.lat) * cross)
        });
        Some(GeoPoint::new(cy / (6.0 * signed), cx / (6.0 * signed)))
    }

    /// Clip against the vertical strip `min_lon <= lon <= max_lon`.
    pub fn clip_to_lon_range(&self, min_lon: f64, max_lon: f64) -> Polygon {
        let lower = clip_half_plane(&self.ring, |p| p.lon >= min_lon, min_lon);
        let both = clip_half_plane(&lower, |p| p.lon <= max_lon, max_lon);
        let mut ring: Vec<GeoPoint> = Vec::with_capacity(both.len());
        for p in both {
            if ring.last().map_or(true, |last: &GeoPoint| !same_point(last, &p)) {
                ring.push(p);
            }
        }
        while ring.len() > 1 && same_point(&ring[0], &ring[ring.len() - 1]) {
            ring.pop();
        }
        Polygon { ring }
    }

    /// Even-odd containment; points on the boundary may fall either way.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        if self.ring.len() < 3 {
            return false;
        }
        self.edges().fold(false, |inside, (p, q)| {
            let straddles = (p.lat > point.lat) != (q.lat > point.lat);
            if straddles {
                let lon_at = p.lon + (point.lat - p.lat) * (q.lon - p.lon) / (q.lat - p.lat);
                if point.lon < lon_at {
                    return !inside;
                }
            }
            inside
        })
    }

    /// Intersect a scan line with the polygon and return the covered intervals
    /// along the line, sorted ascending by the free coordinate.
    pub fn intersect_scan_line(&self, line: ScanLine) -> Vec<(GeoPoint, GeoPoint)> {
        let lat: Coordinate = |p| p.lat;
        let lon: Coordinate = |p| p.lon;
        let (fixed, free) = match line {
            ScanLine::Horizontal { .. } => (lat, lon),
            ScanLine::Vertical { .. } => (lon, lat),
        };
        let c = line.offset();

        let mut crossings: Vec<f64> = self
            .edges()
            .filter_map(|(p, q)| {
                let (pf, qf) = (fixed(p), fixed(q));
                // half-open rule keeps shared vertices from being counted twice
                let crosses = (pf <= c && qf > c) || (qf <= c && pf > c);
                crosses.then(|| free(p) + (c - pf) * (free(q) - free(p)) / (qf - pf))
            })
            .collect();
        crossings.sort_by(f64::total_cmp);

        crossings
            .chunks_exact(2)
            .filter(|pair| pair[1] - pair[0] > EPSILON)
            .map(|pair| (line.point_at(pair[0]), line.point_at(pair[1])))
            .collect()
    }
}

fn same_point(a: &GeoPoint, b: &GeoPoint) -> bool {
    (a.lat - b.lat).abs() < EPSILON && (a.lon - b.lon).abs() < EPSILON
}

fn clip_half_plane<F>(ring: &[GeoPoint], inside: F, boundary_lon: f64) -> Vec<GeoPoint>
where
    F: Fn(&GeoPoint) -> bool,
{
    let mut out = Vec::with_capacity(ring.len() + 2);
    for (i, end) in ring.iter().enumerate() {
        let start = &ring[(i + ring.len() - 1) % ring.len()];
        let cut = || {
            let t = (boundary_lon - start.lon) / (end.lon - start.lon);
            GeoPoint::new(start.lat + t * (end.lat - start.lat), boundary_lon)
        };
        match (inside(start), inside(end)) {
            (true, true) => out.push(*end),
            (false, true) => {
                out.push(cut());
                out.push(*end);
            }
            (true, false) => out.push(cut()),
            (false, false) => {}
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScanLine {
    /// Constant latitude.
    Horizontal { lat: f64 },
    /// Constant longitude.
    Vertical { lon: f64 },
}

impl ScanLine {
    fn offset(&self) -> f64 {
        match *self {
            ScanLine::Horizontal { lat } => lat,
            ScanLine::Vertical { lon } => lon,
        }
    }

    fn point_at(&self, free: f64) -> GeoPoint {
        match *self {
            ScanLine::Horizontal { lat } => GeoPoint::new(lat, free),
            ScanLine::Vertical { lon } => GeoPoint::new(free, lon),
        }
    }
}

/// The full survey boundary, immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyArea {
    polygon: Polygon,
}

impl SurveyArea {
    pub fn new(vertices: Vec<GeoPoint>) -> Self {
        Self {
            polygon: Polygon::new(vertices),
        }
    }

    pub fn polygon(&self) -> &Polygon {
        &self.polygon
    }
}

/// One drone's share of a survey area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubRegion {
    pub index: usize,
    pub total_parts: usize,
    pub polygon: Polygon,
}

impl SubRegion {
    pub fn area(&self) -> f64 {
        self.polygon.area()
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        self.polygon.contains(point)
    }
}
