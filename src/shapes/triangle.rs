// Triangles with integer vertices
//
// Vertices may sit up to `MARGIN` pixels outside the canvas; spans are clipped when the
// triangle is scanned. Mutation only ever accepts triangles whose angles are all wide
// enough, so slivers and collapsed triangles never reach the rasterizer.

use rand::Rng;
use serde::{Deserialize, Serialize};

use image::{Rgba, RgbaImage};
use imageproc::drawing::Blend;

use super::{draw_polygon, gaussian_int, mutate_until, MAX_MUTATION_ATTEMPTS};
use crate::raster::{Rasterizer, FULL_COVERAGE};

/// How far outside the canvas a vertex may wander
const MARGIN: i32 = 16;

/// A triangle given by its three integer vertices
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triangle {
    /// Vertices in pixel coordinates, in no particular order
    pub points: [(i32, i32); 3],
}

impl Triangle {
    /// Create a small random triangle somewhere on the canvas
    ///
    /// The raw triangle is spawned around one vertex and then mutated once, which runs it
    /// through the validity check.
    pub fn random<R: Rng>(width: i32, height: i32, rng: &mut R) -> Self {
        let x = rng.gen_range(0..width);
        let y = rng.gen_range(0..height);
        let mut tri = Self {
            points: [
                (x, y),
                (x + rng.gen_range(-15..=15), y + rng.gen_range(-15..=15)),
                (x + rng.gen_range(-15..=15), y + rng.gen_range(-15..=15)),
            ],
        };
        tri.mutate(width, height, rng);
        tri
    }

    /// Move one vertex by a Gaussian step, retrying until the triangle is valid
    ///
    /// After `MAX_MUTATION_ATTEMPTS` failures the previous geometry is kept.
    pub fn mutate<R: Rng>(&mut self, width: i32, height: i32, rng: &mut R) {
        mutate_until(
            self,
            rng,
            MAX_MUTATION_ATTEMPTS,
            "triangle",
            |tri, rng| tri.nudge_vertex(width, height, rng),
            Triangle::is_valid,
        );
    }

    /// Move one random vertex, keeping it within `MARGIN` of the canvas
    fn nudge_vertex<R: Rng>(&mut self, width: i32, height: i32, rng: &mut R) {
        let i = rng.gen_range(0..3);
        let (x, y) = self.points[i];
        self.points[i] = (
            (x + gaussian_int(rng, 16.0)).clamp(-MARGIN, width - 1 + MARGIN),
            (y + gaussian_int(rng, 16.0)).clamp(-MARGIN, height - 1 + MARGIN),
        );
    }

    /// Reject slivers: every internal angle must be above roughly 15 degrees
    ///
    /// No trigonometry: an area-vs-perimeter bound followed by a per-vertex bound on the
    /// squared cosine (cos²(15°) ≈ 0.933).
    pub fn is_valid(&self) -> bool {
        let [(x1, y1), (x2, y2), (x3, y3)] = self.points;
        let (x1, y1, x2, y2, x3, y3) = (
            x1 as f64, y1 as f64, x2 as f64, y2 as f64, x3 as f64, y3 as f64,
        );

        let (dx12, dy12) = (x2 - x1, y2 - y1);
        let (dx23, dy23) = (x3 - x2, y3 - y2);
        let (dx31, dy31) = (x1 - x3, y1 - y3);

        let len12 = dx12 * dx12 + dy12 * dy12;
        let len23 = dx23 * dx23 + dy23 * dy23;
        let len31 = dx31 * dx31 + dy31 * dy31;

        // Zero area (collinear or coincident vertices) also zeroes the bound below
        let cross = dx12 * dy31 - dy12 * dx31;
        if cross == 0.0 || cross * cross < 0.07 * (len12 + len23 + len31) {
            return false;
        }

        const MAX_COS_SQUARED: f64 = 0.933;

        // Vertex 1: edges 1->2 and 1->3
        let dot1 = dx12 * -dx31 + dy12 * -dy31;
        if dot1 * dot1 > MAX_COS_SQUARED * len12 * len31 {
            return false;
        }
        // Vertex 2: edges 2->1 and 2->3
        let dot2 = -dx12 * dx23 + -dy12 * dy23;
        if dot2 * dot2 > MAX_COS_SQUARED * len12 * len23 {
            return false;
        }
        // Vertex 3: edges 3->2 and 3->1
        let dot3 = -dx23 * dx31 + -dy23 * dy31;
        if dot3 * dot3 > MAX_COS_SQUARED * len23 * len31 {
            return false;
        }

        true
    }

    pub(crate) fn rasterize(&self, rast: &mut Rasterizer) {
        let [a, b, c] = self.points;
        rasterize_triangle(a, b, c, rast);
    }

    pub fn svg(&self, attrs: &str) -> String {
        let [(x1, y1), (x2, y2), (x3, y3)] = self.points;
        format!(
            "<polygon {} points=\"{},{} {},{} {},{}\" />",
            attrs, x1, y1, x2, y2, x3, y3
        )
    }

    pub fn draw(&self, canvas: &mut Blend<RgbaImage>, color: Rgba<u8>, scale: f64) {
        // Zero-area triangles have nothing to fill
        if is_degenerate(&self.points) {
            return;
        }
        let points: Vec<(f64, f64)> = self
            .points
            .iter()
            .map(|&(x, y)| ((x as f64 + 0.5) * scale, (y as f64 + 0.5) * scale))
            .collect();
        draw_polygon(canvas, &points, color);
    }
}

/// Zero-area triangle: repeated or collinear vertices
fn is_degenerate(points: &[(i32, i32); 3]) -> bool {
    let (p0, p1, p2) = (points[0], points[1], points[2]);

    if p0 == p1 || p1 == p2 || p0 == p2 {
        return true;
    }

    // Twice the signed area; zero means collinear
    let area = (p1.0 - p0.0) * (p2.1 - p0.1) - (p2.0 - p0.0) * (p1.1 - p0.1);
    area == 0
}

/// Scan-convert a triangle by splitting it at the middle vertex's row
fn rasterize_triangle(
    mut p1: (i32, i32),
    mut p2: (i32, i32),
    mut p3: (i32, i32),
    rast: &mut Rasterizer,
) {
    // Sort by y so p1 is the top vertex and p3 the bottom one
    if p1.1 > p3.1 {
        std::mem::swap(&mut p1, &mut p3);
    }
    if p1.1 > p2.1 {
        std::mem::swap(&mut p1, &mut p2);
    }
    if p2.1 > p3.1 {
        std::mem::swap(&mut p2, &mut p3);
    }

    if p1.1 == p3.1 {
        // All three on one row: no slopes to follow
        let lo = p1.0.min(p2.0).min(p3.0);
        let hi = p1.0.max(p2.0).max(p3.0);
        rast.push_clipped(p1.1, lo, hi, FULL_COVERAGE);
    } else if p2.1 == p3.1 {
        fill_flat_bottom(p1, p2, p3, rast);
    } else if p1.1 == p2.1 {
        fill_flat_top(p1, p2, p3, rast);
    } else {
        // Point on the long edge at the middle vertex's row
        let t = (p2.1 - p1.1) as f64 / (p3.1 - p1.1) as f64;
        let p4 = (p1.0 + (t * (p3.0 - p1.0) as f64) as i32, p2.1);
        fill_flat_bottom(p1, p2, p4, rast);
        fill_flat_top(p2, p4, p3, rast);
    }
}

/// Rows `p1.y ..= p2.y` of a triangle whose bottom edge p2-p3 is horizontal
fn fill_flat_bottom(p1: (i32, i32), p2: (i32, i32), p3: (i32, i32), rast: &mut Rasterizer) {
    let dy = (p2.1 - p1.1) as f64;
    if dy == 0.0 {
        return;
    }
    let s1 = (p2.0 - p1.0) as f64 / dy;
    let s2 = (p3.0 - p1.0) as f64 / dy;
    let mut ax = p1.0 as f64;
    let mut bx = p1.0 as f64;
    for y in p1.1..=p2.1 {
        let (a, b) = (ax as i32, bx as i32);
        ax += s1;
        bx += s2;
        rast.push_clipped(y, a.min(b), a.max(b), FULL_COVERAGE);
    }
}

/// Rows `p3.y` down to `p1.y + 1` of a triangle whose top edge p1-p2 is horizontal
fn fill_flat_top(p1: (i32, i32), p2: (i32, i32), p3: (i32, i32), rast: &mut Rasterizer) {
    let dy = (p3.1 - p1.1) as f64;
    if dy == 0.0 {
        return;
    }
    let s1 = (p3.0 - p1.0) as f64 / dy;
    let s2 = (p3.0 - p2.0) as f64 / dy;
    let mut ax = p3.0 as f64;
    let mut bx = p3.0 as f64;
    for y in (p1.1 + 1..=p3.1).rev() {
        ax -= s1;
        bx -= s2;
        let (a, b) = (ax as i32, bx as i32);
        rast.push_clipped(y, a.min(b), a.max(b), FULL_COVERAGE);
    }
}
