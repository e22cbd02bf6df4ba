// THEORY:
// The oriented box is turned into the two numbers the drive policy needs.
//
// - The box's longer axis is assumed to be the line's direction, so the line
//   vector joins the midpoints of the two short edges. The midpoint nearer the
//   bottom of the image ("near") is where the line meets the vehicle.
// - `vertical_angle` measures how far the vector leans from straight ahead:
//   90° is straight up the image, below 90° the far end leans right, above 90°
//   it leans left (image coordinates).
// - `horizontal_shift` is the near point's offset from the image centre, as a
//   percentage of half the width.

use crate::core_modules::geometry::Point;
use crate::core_modules::line_extractor::OrientedBox;
use crate::error::TrackingError;

/// Two points along the detected line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineVector {
    /// Closer to the image bottom.
    pub near: Point,
    pub far: Point,
}

/// Orientation and lateral offset of the detected line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Degrees in `[0, 180]`; 90 is straight ahead.
    pub angle: f64,
    /// Percent of half-width; negative is left of centre.
    pub shift: f64,
}

/// Reduces a canonical box to the vector along its longer axis.
pub fn vector_from_box(oriented: &OrientedBox) -> Result<LineVector, TrackingError> {
    let [top_left, top_right, bottom_right, bottom_left] = *oriented.corners();
    let vertical = top_left.distance(&bottom_left);
    let horizontal = top_left.distance(&top_right);

    let vector = if vertical >= horizontal {
        LineVector {
            near: bottom_left.midpoint(&bottom_right),
            far: top_left.midpoint(&top_right),
        }
    } else {
        let left = top_left.midpoint(&bottom_left);
        let right = top_right.midpoint(&bottom_right);
        if right.y > left.y {
            LineVector { near: right, far: left }
        } else {
            LineVector { near: left, far: right }
        }
    };

    if vector.near == vector.far {
        return Err(TrackingError::DegenerateBox);
    }
    Ok(vector)
}

/// Angle of the line through `p1` and `p2`, in degrees, for a `width` x `height` frame.
pub fn vertical_angle(p1: Point, p2: Point, width: u32, height: u32) -> f64 {
    let half_width = width as f64 / 2.0;
    let h = height as f64;

    let px1 = p1.x - half_width;
    let px2 = p2.x - half_width;
    let py1 = h - p1.y;
    let py2 = h - p2.y;

    if px1 == px2 {
        return 90.0;
    }

    // py = a * px + b
    let a = (py2 - py1) / (px2 - px1);
    let b = py1 - a * px1;
    if a == 0.0 {
        return 0.0;
    }

    // Crossings of py = 0 and py = 1.
    let x0 = -b / a;
    let x1 = (1.0 - b) / a;
    let dx = x1 - x0;
    let angle = (1.0 / (dx * dx)).atan().to_degrees();

    if a < 0.0 { 180.0 - angle } else { angle }
}

/// Offset of `x` from the frame centre, in percent of half the width.
pub fn horizontal_shift(x: f64, width: u32) -> f64 {
    let half_width = width as f64 / 2.0;
    100.0 * (x - half_width) / half_width
}

/// Angle and shift of a line vector (the shift is measured at the near point).
pub fn pose_from_vector(vector: &LineVector, width: u32, height: u32) -> Pose {
    Pose {
        angle: vertical_angle(vector.near, vector.far, width, height),
        shift: horizontal_shift(vector.near.x, width),
    }
}
