// THEORY:
// The `LineExtractor` reduces a balanced binary frame to the one shape that is
// most likely the line, then to its minimal-area oriented bounding box.
//
// 1.  **Dominant contour**: every outer and hole border is traced; the border with
//     the largest enclosed area wins (first found on ties).
// 2.  **Oriented box**: the line is often diagonal in frame, so an axis-aligned box
//     would lose its direction. The minimal-area rectangle is found with rotating
//     calipers: one side of the optimal rectangle is collinear with a convex hull
//     edge, so each hull edge is tried as a base and the smallest enclosing
//     rectangle kept.
// 3.  **Canonical order**: the four corners are sorted into top-left, top-right,
//     bottom-right, bottom-left, so later stages can name edges by index.

use crate::core_modules::contour::{Contour, find_contours};
use crate::core_modules::geometry::{PixelPoint, Point};
use crate::error::TrackingError;
use image::GrayImage;

/// Four corners in canonical order: top-left, top-right, bottom-right, bottom-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBox(pub [Point; 4]);

impl OrientedBox {
    pub fn corners(&self) -> &[Point; 4] {
        &self.0
    }

    pub fn top_left(&self) -> Point {
        self.0[0]
    }

    pub fn top_right(&self) -> Point {
        self.0[1]
    }

    pub fn bottom_right(&self) -> Point {
        self.0[2]
    }

    pub fn bottom_left(&self) -> Point {
        self.0[3]
    }
}

/// Sorts four corners into top-left, top-right, bottom-right, bottom-left.
///
/// The two smallest y values form the top pair, the two largest the bottom pair
/// (stable, so equal y keeps input order); inside a pair the smaller x is "left",
/// and on equal x the second point of the pair is taken as left.
pub fn order_box(corners: [Point; 4]) -> OrientedBox {
    let mut sorted = corners;
    sorted.sort_by(|a, b| a.y.total_cmp(&b.y));

    let split = |a: Point, b: Point| if a.x < b.x { (a, b) } else { (b, a) };
    let (top_left, top_right) = split(sorted[0], sorted[1]);
    let (bottom_left, bottom_right) = split(sorted[2], sorted[3]);

    OrientedBox([top_left, top_right, bottom_right, bottom_left])
}

fn cross(o: Point, a: Point, b: Point) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Convex hull (monotone chain), counter-clockwise, without collinear points.
pub fn convex_hull(points: &[PixelPoint]) -> Vec<Point> {
    let mut pts: Vec<Point> = points.iter().map(|&p| Point::from(p)).collect();
    pts.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let mut hull: Vec<Point> = Vec::with_capacity(pts.len() * 2);
    for &p in &pts {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0 {
            hull.pop();
        }
        hull.push(p);
    }
    let lower_len = hull.len() + 1;
    for &p in pts.iter().rev().skip(1) {
        while hull.len() >= lower_len
            && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0
        {
            hull.pop();
        }
        hull.push(p);
    }
    hull.pop();
    hull
}

/// Corners of the minimal-area rectangle enclosing `points`, in no particular order.
///
/// A single point yields four identical corners; collinear points yield a
/// zero-width rectangle along the segment.
pub fn min_area_rect(points: &[PixelPoint]) -> Option<[Point; 4]> {
    let hull = convex_hull(points);
    match hull.len() {
        0 => return None,
        1 => return Some([hull[0]; 4]),
        _ => {}
    }

    let mut best: Option<(f64, [Point; 4])> = None;
    for i in 0..hull.len() {
        let a = hull[i];
        let b = hull[(i + 1) % hull.len()];
        let len = a.distance(&b);
        if len == 0.0 {
            continue;
        }
        let u = Point::new((b.x - a.x) / len, (b.y - a.y) / len);
        let v = Point::new(-u.y, u.x);

        let (mut min_u, mut max_u, mut min_v, mut max_v) =
            (f64::MAX, f64::MIN, f64::MAX, f64::MIN);
        for p in &hull {
            let pu = p.x * u.x + p.y * u.y;
            let pv = p.x * v.x + p.y * v.y;
            min_u = min_u.min(pu);
            max_u = max_u.max(pu);
            min_v = min_v.min(pv);
            max_v = max_v.max(pv);
        }

        let area = (max_u - min_u) * (max_v - min_v);
        if best.as_ref().is_none_or(|(best_area, _)| area < *best_area) {
            let corner = |cu: f64, cv: f64| Point::new(cu * u.x + cv * v.x, cu * u.y + cv * v.y);
            best = Some((
                area,
                [
                    corner(min_u, min_v),
                    corner(max_u, min_v),
                    corner(max_u, max_v),
                    corner(min_u, max_v),
                ],
            ));
        }
    }
    best.map(|(_, corners)| corners)
}

/// Picks the largest-area contour of a binary frame and fits its oriented box.
pub fn extract(binary: &GrayImage) -> Result<(Contour, OrientedBox), TrackingError> {
    let contours = find_contours(binary);

    let mut dominant: Option<(f64, Contour)> = None;
    for contour in contours {
        let area = contour.area();
        if dominant.as_ref().is_none_or(|(best, _)| area > *best) {
            dominant = Some((area, contour));
        }
    }
    let Some((area, contour)) = dominant else {
        return Err(TrackingError::NoContourFound);
    };

    let corners = min_area_rect(&contour.points).ok_or(TrackingError::NoContourFound)?;
    let oriented = order_box(corners);
    log::debug!(
        "dominant contour: {} points, area {area:.1}, box {:?}",
        contour.points.len(),
        oriented
    );
    Ok((contour, oriented))
}
