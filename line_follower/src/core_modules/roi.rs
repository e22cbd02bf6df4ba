// THEORY:
// The camera looks forward and down, so the line only matters on the floor just in
// front of the wheels. `RegionOfInterest` is a trapezoid spanning the full width at
// the bottom of the frame and narrowing to the middle half at mid-height. It is
// built once per resolution: the polygon is rasterized into a mask (boundary pixels
// count as inside, like a polygon fill), and the mask's pixel count is cached as
// `area`, the denominator of every white-percentage computed downstream.

use crate::core_modules::geometry::PixelPoint;
use image::{GrayImage, Luma};

/// Trapezoidal mask over the lower half of the frame.
#[derive(Debug, Clone, Default)]
pub struct RegionOfInterest {
    vertices: Vec<PixelPoint>,
    mask: Option<GrayImage>,
    area: u64,
}

impl RegionOfInterest {
    /// An uninitialized region: `area()` is 0 until `initialize` runs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the trapezoid `(0,h) (w/4,h/2) (3w/4,h/2) (w,h)` and caches its area.
    pub fn initialize(&mut self, width: u32, height: u32) {
        let w = width as i32;
        let h = height as i32;
        self.vertices = vec![
            PixelPoint::new(0, h),
            PixelPoint::new(w / 4, h / 2),
            PixelPoint::new(3 * w / 4, h / 2),
            PixelPoint::new(w, h),
        ];

        let mut mask = GrayImage::new(width, height);
        for (x, y, pixel) in mask.enumerate_pixels_mut() {
            if polygon_contains(&self.vertices, x as i64, y as i64) {
                *pixel = Luma([255]);
            }
        }
        self.mask = Some(mask);

        let white = GrayImage::from_pixel(width, height, Luma([255]));
        self.area = count_non_zero(&self.mask_to_roi(&white));
        log::debug!("ROI initialized for {width}x{height}, area {} px", self.area);
    }

    /// Copies `frame` with every pixel outside the trapezoid set to zero.
    ///
    /// An uninitialized region or a frame of another size masks everything out.
    pub fn mask_to_roi(&self, frame: &GrayImage) -> GrayImage {
        let mut out = GrayImage::new(frame.width(), frame.height());
        let Some(mask) = self.mask.as_ref() else {
            return out;
        };
        if mask.dimensions() != frame.dimensions() {
            return out;
        }
        for ((dst, src), m) in out.pixels_mut().zip(frame.pixels()).zip(mask.pixels()) {
            if m[0] != 0 {
                *dst = *src;
            }
        }
        out
    }

    /// Cached pixel area; 0 means "not ready".
    pub fn area(&self) -> u64 {
        self.area
    }

    /// The resolution the mask was built for, if any.
    pub fn resolution(&self) -> Option<(u32, u32)> {
        self.mask.as_ref().map(|m| m.dimensions())
    }
}

pub fn count_non_zero(frame: &GrayImage) -> u64 {
    frame.pixels().filter(|p| p[0] != 0).count() as u64
}

/// Point-in-polygon test that treats points on an edge as inside.
fn polygon_contains(vertices: &[PixelPoint], x: i64, y: i64) -> bool {
    let n = vertices.len();
    if n == 0 {
        return false;
    }

    let mut inside = false;
    for i in 0..n {
        let a = vertices[i];
        let b = vertices[(i + 1) % n];
        let (ax, ay, bx, by) = (a.x as i64, a.y as i64, b.x as i64, b.y as i64);

        // On-edge check: collinear and inside the segment's bounding box.
        let cross = (bx - ax) * (y - ay) - (by - ay) * (x - ax);
        if cross == 0 && x >= ax.min(bx) && x <= ax.max(bx) && y >= ay.min(by) && y <= ay.max(by) {
            return true;
        }

        // Crossing number with the half-open rule on edge end points.
        if (ay > y) != (by > y) {
            let x_cross = ax as f64 + (y - ay) as f64 * (bx - ax) as f64 / (by - ay) as f64;
            if (x as f64) < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_is_zero_before_initialize() {
        let roi = RegionOfInterest::new();
        assert_eq!(roi.area(), 0);
        assert_eq!(roi.resolution(), None);
    }

    #[test]
    fn area_is_positive_and_stable() {
        for (w, h) in [(1, 1), (2, 3), (7, 5), (320, 240), (820, 616)] {
            let mut roi = RegionOfInterest::new();
            roi.initialize(w, h);
            let first = roi.area();
            assert!(first > 0, "area must be positive for {w}x{h}");
            roi.initialize(w, h);
            assert_eq!(roi.area(), first, "re-initializing {w}x{h} changed the area");
        }
    }

    #[test]
    fn trapezoid_covers_roughly_three_eighths_of_the_frame() {
        let mut roi = RegionOfInterest::new();
        roi.initialize(320, 240);
        let ratio = roi.area() as f64 / (320.0 * 240.0);
        assert!((ratio - 0.375).abs() < 0.02, "ratio {ratio}");
    }

    #[test]
    fn mask_keeps_inside_values_and_zeroes_outside() {
        let mut roi = RegionOfInterest::new();
        roi.initialize(80, 60);
        let frame = GrayImage::from_pixel(80, 60, Luma([77]));
        let masked = roi.mask_to_roi(&frame);

        // Top half is outside.
        assert_eq!(masked.get_pixel(40, 10)[0], 0);
        // Bottom centre is inside and keeps its value.
        assert_eq!(masked.get_pixel(40, 55)[0], 77);
        // Upper corners of the lower half fall outside the slanted edges.
        assert_eq!(masked.get_pixel(1, 31)[0], 0);
        assert_eq!(masked.get_pixel(78, 31)[0], 0);
        // The top edge of the trapezoid is part of the mask.
        assert_eq!(masked.get_pixel(20, 30)[0], 77);
        assert_eq!(masked.get_pixel(60, 30)[0], 77);
    }

    #[test]
    fn mask_does_not_mutate_its_input() {
        let mut roi = RegionOfInterest::new();
        roi.initialize(16, 16);
        let frame = GrayImage::from_pixel(16, 16, Luma([200]));
        let _ = roi.mask_to_roi(&frame);
        assert!(frame.pixels().all(|p| p[0] == 200));
    }
}
