// THEORY:
// Debug images are a side channel, not part of the per-frame result. The pipeline
// asks the sink once per frame whether it `wants` that frame, and only then hands
// it the intermediate images: the capture, the blurred grayscale, the balanced
// binary and, once geometry is complete, an annotated copy of the capture. A sink
// failure is logged and swallowed; it never changes what the frame produced.

use crate::core_modules::contour::Contour;
use crate::core_modules::geometry::Point;
use crate::core_modules::line_extractor::OrientedBox;
use crate::core_modules::pose::LineVector;
use crate::error::SinkError;
use image::{GrayImage, Rgb, RgbImage};
use std::fs;
use std::path::PathBuf;

pub const CONTOUR_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const BOX_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
pub const VECTOR_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// The pipeline stage an image was taken after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Raw,
    Grayed,
    Balanced,
    Annotated,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Raw => "raw",
            Stage::Grayed => "grayed",
            Stage::Balanced => "balanced",
            Stage::Annotated => "annotated",
        }
    }
}

/// Borrowed view of an intermediate image.
#[derive(Debug, Clone, Copy)]
pub enum DebugImage<'a> {
    Gray(&'a GrayImage),
    Rgb(&'a RgbImage),
}

pub trait DebugSink: Send {
    /// Whether the images of `frame_index` should be recorded at all.
    fn wants(&self, frame_index: u64) -> bool;

    fn record(&mut self, stage: Stage, frame_index: u64, image: DebugImage<'_>);
}

/// Writes `<stage>.png` into a directory every `every_n` frames, overwriting the
/// previous capture.
#[derive(Debug, Clone)]
pub struct DiskSink {
    dir: PathBuf,
    every_n: u64,
}

impl DiskSink {
    pub fn new(dir: impl Into<PathBuf>, every_n: u64) -> Result<Self, SinkError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            every_n: every_n.max(1),
        })
    }

    fn write(&self, stage: Stage, image: DebugImage<'_>) -> Result<PathBuf, SinkError> {
        let path = self.dir.join(format!("{}.png", stage.name()));
        match image {
            DebugImage::Gray(img) => img.save(&path)?,
            DebugImage::Rgb(img) => img.save(&path)?,
        }
        Ok(path)
    }
}

impl DebugSink for DiskSink {
    fn wants(&self, frame_index: u64) -> bool {
        frame_index % self.every_n == 0
    }

    fn record(&mut self, stage: Stage, frame_index: u64, image: DebugImage<'_>) {
        match self.write(stage, image) {
            Ok(path) => log::debug!("frame {frame_index}: wrote {}", path.display()),
            Err(e) => log::warn!("frame {frame_index}: failed to write {} image: {e}", stage.name()),
        }
    }
}

/// Copy of `frame` with the contour, the oriented box and the line vector drawn on it.
pub fn annotate(
    frame: &RgbImage,
    contour: &Contour,
    oriented: &OrientedBox,
    line: &LineVector,
) -> RgbImage {
    let mut out = frame.clone();

    for p in &contour.points {
        put(&mut out, p.x as i64, p.y as i64, CONTOUR_COLOR);
    }

    let corners = oriented.corners();
    for i in 0..corners.len() {
        draw_line(&mut out, corners[i], corners[(i + 1) % corners.len()], BOX_COLOR);
    }

    draw_line(&mut out, line.near, line.far, VECTOR_COLOR);
    out
}

fn put(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u64) < img.width() as u64 && (y as u64) < img.height() as u64 {
        img.put_pixel(x as u32, y as u32, color);
    }
}

/// Bresenham between the rounded endpoints, clipped to the image.
fn draw_line(img: &mut RgbImage, from: Point, to: Point, color: Rgb<u8>) {
    let (mut x0, mut y0) = (from.x.round() as i64, from.y.round() as i64);
    let (x1, y1) = (to.x.round() as i64, to.y.round() as i64);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        put(img, x0, y0, color);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
