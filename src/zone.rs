//! Counting zone geometry.

use nalgebra as na;

use crate::error::ConfigError;

/// Distance under which a point is treated as lying on a zone edge.
const EDGE_TOLERANCE: f32 = 1e-3;

/// Closed polygon in frame coordinates, fixed for a session.
#[derive(Clone, Debug, PartialEq)]
pub struct Zone {
    points: Vec<na::Point2<f32>>,
    centroid: na::Point2<f32>,
}

impl Zone {
    pub fn new(points: Vec<na::Point2<f32>>) -> Result<Self, ConfigError> {
        if points.len() < 3 {
            return Err(ConfigError::ZoneTooFewPoints(points.len()));
        }
        if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(ConfigError::ZoneNonFinite);
        }
        let centroid = polygon_centroid(&points).ok_or(ConfigError::ZoneDegenerate)?;
        Ok(Self { points, centroid })
    }

    pub fn from_pairs(pairs: &[[f32; 2]]) -> Result<Self, ConfigError> {
        Self::new(pairs.iter().map(|[x, y]| na::Point2::new(*x, *y)).collect())
    }

    pub fn points(&self) -> &[na::Point2<f32>] {
        &self.points
    }

    /// Area-weighted centroid of the polygon.
    pub fn centroid(&self) -> na::Point2<f32> {
        self.centroid
    }

    pub fn distance_from_centroid(&self, p: &na::Point2<f32>) -> f32 {
        na::distance(&self.centroid, p)
    }

    /// Point-in-polygon by ray casting. Points on an edge or vertex are inside.
    pub fn contains(&self, p: &na::Point2<f32>) -> bool {
        if self.on_boundary(p) {
            return true;
        }

        let n = self.points.len();
        let mut inside = false;
        let mut j = n - 1;

        for i in 0..n {
            let (pi, pj) = (self.points[i], self.points[j]);
            if (pi.y > p.y) != (pj.y > p.y) {
                let x_cross = (pj.x - pi.x) * (p.y - pi.y) / (pj.y - pi.y) + pi.x;
                if p.x < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }

        inside
    }

    fn on_boundary(&self, p: &na::Point2<f32>) -> bool {
        let n = self.points.len();
        (0..n).any(|i| on_segment(p, &self.points[i], &self.points[(i + 1) % n]))
    }
}

fn on_segment(p: &na::Point2<f32>, a: &na::Point2<f32>, b: &na::Point2<f32>) -> bool {
    let ab = b - a;
    let ap = p - a;
    let len = ab.norm();

    if len <= f32::EPSILON {
        return ap.norm() <= EDGE_TOLERANCE;
    }

    let cross = ab.x * ap.y - ab.y * ap.x;
    if (cross / len).abs() > EDGE_TOLERANCE {
        return false;
    }

    let t = ap.dot(&ab) / (len * len);
    let slack = EDGE_TOLERANCE / len;
    (-slack..=1.0 + slack).contains(&t)
}

/// Shoelace centroid; `None` when the polygon encloses no area.
fn polygon_centroid(points: &[na::Point2<f32>]) -> Option<na::Point2<f32>> {
    let n = points.len();
    let (mut area2, mut cx, mut cy) = (0.0f64, 0.0f64, 0.0f64);

    for i in 0..n {
        let (a, b) = (points[i], points[(i + 1) % n]);
        let (ax, ay, bx, by) = (a.x as f64, a.y as f64, b.x as f64, b.y as f64);
        let cross = ax * by - bx * ay;
        area2 += cross;
        cx += (ax + bx) * cross;
        cy += (ay + by) * cross;
    }

    if area2.abs() < 1e-9 {
        return None;
    }

    Some(na::Point2::new(
        (cx / (3.0 * area2)) as f32,
        (cy / (3.0 * area2)) as f32,
    ))
}
