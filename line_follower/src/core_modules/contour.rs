// THEORY:
// Border following after Suzuki & Abe. The binary frame is copied into a working
// grid with a one-pixel zero border (so neighbour lookups never leave the buffer)
// and compressed to 0/1. A raster scan then starts a trace at every pixel that
// begins an outer border (a 1 with a 0 to its left) or a hole border (a non-zero
// pixel with a 0 to its right). Each trace walks the 8-neighbourhood and labels
// the pixels it passes with the border number, so the same border is never traced
// twice. Outer borders and hole borders are both returned, which is what a
// two-level (component / hole) contour retrieval needs.

use crate::core_modules::geometry::PixelPoint;
use image::GrayImage;

/// 8-neighbourhood offsets `(dx, dy)`, counter-clockwise on screen starting east.
const NEIGHBORHOOD: [(i32, i32); 8] = [
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// A closed border traced in a binary frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contour {
    pub points: Vec<PixelPoint>,
    /// Whether this border surrounds a hole inside a component.
    pub hole: bool,
}

impl Contour {
    /// Enclosed area by the shoelace formula (always non-negative).
    pub fn area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let mut twice = 0i64;
        for i in 0..n {
            let a = self.points[i];
            let b = self.points[(i + 1) % n];
            twice += a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64;
        }
        (twice as f64 / 2.0).abs()
    }
}

/// Flat offsets of the neighbourhood for a padded row width, repeated twice so a
/// scan can run past index 7 without wrapping.
fn neighborhood_deltas(padded_width: isize) -> [isize; 16] {
    let mut deltas = [0isize; 16];
    for (i, (dx, dy)) in NEIGHBORHOOD.iter().enumerate() {
        let delta = *dx as isize + *dy as isize * padded_width;
        deltas[i] = delta;
        deltas[i + 8] = delta;
    }
    deltas
}

/// Copies `frame` into a zero-bordered grid, non-zero pixels become 1.
fn padded_binary(frame: &GrayImage) -> Vec<i32> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let padded_width = width + 2;
    let mut grid = vec![0i32; padded_width * (height + 2)];
    for (x, y, pixel) in frame.enumerate_pixels() {
        if pixel[0] != 0 {
            grid[(y as usize + 1) * padded_width + x as usize + 1] = 1;
        }
    }
    grid
}

/// Traces one border starting at `pos`, labelling it with `nbd`.
fn follow_border(
    grid: &mut [i32],
    pos: usize,
    nbd: i32,
    start: PixelPoint,
    hole: bool,
    deltas: &[isize; 16],
) -> Contour {
    let mut contour = Contour {
        points: Vec::new(),
        hole,
    };
    let offset = |p: usize, s: usize| (p as isize + deltas[s]) as usize;

    // Find the first non-zero neighbour, searching clockwise from the side the
    // border was entered from.
    let mut s: usize = if hole { 0 } else { 4 };
    let s_end = s;
    let mut pos1;
    loop {
        s = s.wrapping_sub(1) & 7;
        pos1 = offset(pos, s);
        if grid[pos1] != 0 || s == s_end {
            break;
        }
    }

    // Isolated pixel.
    if grid[pos1] == 0 {
        grid[pos] = -nbd;
        contour.points.push(start);
        return contour;
    }

    let mut point = start;
    let mut pos3 = pos;
    loop {
        let s_end = s;
        let mut pos4;
        loop {
            s += 1;
            pos4 = offset(pos3, s);
            if grid[pos4] != 0 {
                break;
            }
        }
        s &= 7;

        // The search wrapped past east, so the east neighbour is background.
        if s.wrapping_sub(1) < s_end {
            grid[pos3] = -nbd;
        } else if grid[pos3] == 1 {
            grid[pos3] = nbd;
        }

        contour.points.push(point);
        point.x += NEIGHBORHOOD[s].0;
        point.y += NEIGHBORHOOD[s].1;

        if pos4 == pos && pos3 == pos1 {
            break;
        }
        pos3 = pos4;
        s = (s + 4) & 7;
    }

    contour
}

/// Finds every outer and hole border of the non-zero regions of `frame`.
///
/// Contours come back in raster order of their starting pixel.
pub fn find_contours(frame: &GrayImage) -> Vec<Contour> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let mut contours = Vec::new();
    if width == 0 || height == 0 {
        return contours;
    }

    let mut grid = padded_binary(frame);
    let deltas = neighborhood_deltas((width + 2) as isize);

    let mut pos = width + 3;
    let mut nbd = 1;
    for y in 0..height {
        for x in 0..width {
            let pix = grid[pos];
            if pix != 0 {
                let outer = pix == 1 && grid[pos - 1] == 0;
                let hole = !outer && pix >= 1 && grid[pos + 1] == 0;
                if outer || hole {
                    nbd += 1;
                    let start = PixelPoint::new(x as i32, y as i32);
                    contours.push(follow_border(&mut grid, pos, nbd, start, hole, &deltas));
                }
            }
            pos += 1;
        }
        pos += 2;
    }

    contours
}
