use image::{Rgb, RgbImage};

pub const WIDTH: u32 = 320;
pub const HEIGHT: u32 = 240;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// White columns `x0..x1` over the full height on black.
pub fn vertical_strip(width: u32, height: u32, x0: u32, x1: u32) -> RgbImage {
    assert!(x0 < x1 && x1 <= width, "strip must lie inside the frame");
    RgbImage::from_fn(width, height, |x, _| if (x0..x1).contains(&x) { WHITE } else { BLACK })
}

/// A strip `thickness` pixels wide centred on `centre_x`.
pub fn centred_strip(width: u32, height: u32, centre_x: u32, thickness: u32) -> RgbImage {
    vertical_strip(width, height, centre_x - thickness / 2, centre_x + thickness / 2)
}

/// White band of `thickness` around the line through `(base_x, base_y)` tilted
/// `tilt_deg` from vertical; positive tilt leans the upper end to the right.
pub fn tilted_strip(
    width: u32,
    height: u32,
    base: (f64, f64),
    tilt_deg: f64,
    thickness: f64,
) -> RgbImage {
    let (sin, cos) = tilt_deg.to_radians().sin_cos();
    RgbImage::from_fn(width, height, |x, y| {
        // Distance to the line with direction (sin, -cos).
        let d = (x as f64 - base.0) * cos + (y as f64 - base.1) * sin;
        if d.abs() <= thickness / 2.0 { WHITE } else { BLACK }
    })
}

pub fn black_frame(width: u32, height: u32) -> RgbImage {
    RgbImage::new(width, height)
}
