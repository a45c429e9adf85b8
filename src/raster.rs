// Scanline spans and the shared rasterization scratch space
//
// Every shape turns its parameters into a list of horizontal spans. The spans are what the
// compositor and the scoring functions iterate over, so a shape never touches pixels directly.

use kurbo::{BezPath, PathEl};
use serde::{Deserialize, Serialize};

/// Full coverage for a span (16-bit fixed point)
pub const FULL_COVERAGE: u32 = 0xffff;

/// A horizontal run of pixels on one row
///
/// `x1` and `x2` are both inclusive. `alpha` is the fractional coverage of every pixel in the
/// run, in `[0, 0xffff]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scanline {
    pub y: i32,
    pub x1: i32,
    pub x2: i32,
    pub alpha: u32,
}

impl Scanline {
    pub fn new(y: i32, x1: i32, x2: i32) -> Self {
        Self {
            y,
            x1,
            x2,
            alpha: FULL_COVERAGE,
        }
    }

    /// Number of pixels covered (0 for an inverted span)
    pub fn width(&self) -> usize {
        (self.x2 - self.x1 + 1).max(0) as usize
    }
}

/// Per-worker rasterization context
///
/// Holds the canvas bounds every shape is clipped to, plus scratch buffers that are reset
/// (not reallocated) on each call. Shapes borrow it mutably while they rasterize and hand the
/// resulting spans back as a slice into the scratch buffer.
#[derive(Clone, Debug)]
pub struct Rasterizer {
    width: i32,
    height: i32,
    lines: Vec<Scanline>,
    cover: Vec<f32>,
}

impl Rasterizer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width as i32,
            height: height as i32,
            // Enough for a shape spanning every row twice without growing
            lines: Vec::with_capacity(height as usize * 2),
            cover: Vec::new(),
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// Start a new rasterization, keeping the allocation
    pub(crate) fn begin(&mut self) {
        self.lines.clear();
    }

    /// Append a span, clipping it to the canvas; spans that clip away are dropped
    pub(crate) fn push_clipped(&mut self, y: i32, x1: i32, x2: i32, alpha: u32) {
        if y < 0 || y >= self.height || alpha == 0 {
            return;
        }
        let x1 = x1.max(0);
        let x2 = x2.min(self.width - 1);
        if x1 > x2 {
            return;
        }
        self.lines.push(Scanline { y, x1, x2, alpha });
    }

    /// Spans produced by the last rasterization
    pub fn lines(&self) -> &[Scanline] {
        &self.lines
    }

    /// Fill a closed polygon with anti-aliased coverage
    ///
    /// Signed-area accumulation: every edge deposits its winding-weighted height into the cells
    /// it crosses, and a running sum along each row yields the covered fraction of each pixel.
    /// Work is confined to the polygon's bounding box; rows are clipped to the canvas while
    /// columns are accumulated unclipped so off-canvas edges still close the winding.
    pub(crate) fn fill_polygon(&mut self, points: &[(f64, f64)]) {
        if points.len() < 3 {
            return;
        }

        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for &(x, y) in points {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        if !(min_x.is_finite() && min_y.is_finite() && max_x.is_finite() && max_y.is_finite()) {
            return;
        }

        let top = (min_y.floor() as i32).max(0);
        let bottom = (max_y.ceil() as i32).min(self.height);
        let left = min_x.floor() as i32;
        let right = max_x.ceil() as i32;
        if top >= bottom || right < 0 || left >= self.width {
            return;
        }

        // One spare column on the right receives the remainder of edges on the last column
        let stride = (right - left + 2) as usize;
        let rows = (bottom - top) as usize;
        self.cover.clear();
        self.cover.resize(stride * rows, 0.0);

        let n = points.len();
        for i in 0..n {
            let (x0, y0) = points[i];
            let (x1, y1) = points[(i + 1) % n];
            self.accumulate_edge(
                x0 - left as f64,
                y0 - top as f64,
                x1 - left as f64,
                y1 - top as f64,
                stride,
                rows,
            );
        }

        // Moved out while spans are pushed, so the row slices don't alias `self`
        let cover = std::mem::take(&mut self.cover);
        for row in 0..rows {
            let y = top + row as i32;
            let cells = &cover[row * stride..(row + 1) * stride];
            let mut sum = 0.0f32;
            let mut run: Option<(i32, u32)> = None;

            for (col, cell) in cells.iter().enumerate() {
                sum += cell;
                let x = left + col as i32;
                let alpha = quantize(sum);
                match run {
                    Some((_, a)) if a == alpha => {}
                    Some((start, a)) => {
                        self.push_clipped(y, start, x - 1, a);
                        run = Some((x, alpha));
                    }
                    None => run = Some((x, alpha)),
                }
            }
            if let Some((start, a)) = run {
                self.push_clipped(y, start, left + stride as i32 - 1, a);
            }
        }
        self.cover = cover;
    }

    /// Fill a closed path, flattening any curves first
    pub(crate) fn fill_path(&mut self, path: &BezPath) {
        let points = flatten_to_points(path, FLATTEN_TOLERANCE);
        self.fill_polygon(&points);
    }

    fn accumulate_edge(
        &mut self,
        x0: f64,
        y0: f64,
        x1: f64,
        y1: f64,
        stride: usize,
        rows: usize,
    ) {
        if y0 == y1 {
            return;
        }
        let (winding, x0, y0, x1, y1) = if y0 < y1 {
            (1.0, x0, y0, x1, y1)
        } else {
            (-1.0, x1, y1, x0, y0)
        };
        let dxdy = (x1 - x0) / (y1 - y0);

        let first = y0.floor().max(0.0) as usize;
        let last = (y1.ceil().max(0.0) as usize).min(rows);
        for row in first..last {
            let row_top = (row as f64).max(y0);
            let row_bottom = ((row + 1) as f64).min(y1);
            if row_top >= row_bottom {
                continue;
            }

            let height = (row_bottom - row_top) * winding;
            // Edge position at the middle of the covered slice of this row
            let x_mid = x0 + dxdy * (0.5 * (row_top + row_bottom) - y0);
            let x_mid = x_mid.clamp(0.0, (stride - 1) as f64);
            let col = (x_mid.floor() as usize).min(stride - 2);
            let frac = x_mid - col as f64;

            let base = row * stride + col;
            self.cover[base] += (height * (1.0 - frac)) as f32;
            self.cover[base + 1] += (height * frac) as f32;
        }
    }
}

/// Map an accumulated coverage sum to 16-bit coverage
fn quantize(sum: f32) -> u32 {
    let c = sum.abs();
    if c >= 0.9999 {
        FULL_COVERAGE
    } else if c <= 0.0001 {
        0
    } else {
        (c * FULL_COVERAGE as f32).round() as u32
    }
}

/// Flattening tolerance, in pixels, for curved outlines
pub(crate) const FLATTEN_TOLERANCE: f64 = 0.1;

/// Vertices of `path` once its curves are flattened into line segments
pub(crate) fn flatten_to_points(path: &BezPath, tolerance: f64) -> Vec<(f64, f64)> {
    let mut points = Vec::new();
    kurbo::flatten(path.elements().iter().copied(), tolerance, |el| match el {
        PathEl::MoveTo(p) | PathEl::LineTo(p) => points.push((p.x, p.y)),
        _ => {}
    });
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn covered_area(lines: &[Scanline]) -> f64 {
        lines
            .iter()
            .map(|l| l.width() as f64 * l.alpha as f64 / FULL_COVERAGE as f64)
            .sum()
    }

    #[test]
    fn test_push_clipped_drops_empty_spans() {
        let mut r = Rasterizer::new(10, 10);
        r.begin();
        r.push_clipped(-1, 0, 5, FULL_COVERAGE);
        r.push_clipped(10, 0, 5, FULL_COVERAGE);
        r.push_clipped(3, 12, 20, FULL_COVERAGE);
        r.push_clipped(3, -8, -2, FULL_COVERAGE);
        assert!(r.lines().is_empty());

        r.push_clipped(3, -4, 40, FULL_COVERAGE);
        assert_eq!(r.lines(), &[Scanline::new(3, 0, 9)]);
    }

    #[test]
    fn test_fill_axis_aligned_square() {
        let mut r = Rasterizer::new(20, 20);
        r.begin();
        r.fill_polygon(&[(2.0, 2.0), (8.0, 2.0), (8.0, 8.0), (2.0, 8.0)]);

        // Pixel-aligned square: six full rows of six full pixels
        let lines = r.lines();
        assert_eq!(lines.len(), 6);
        for (i, line) in lines.iter().enumerate() {
            assert_eq!(line.y, 2 + i as i32);
            assert_eq!((line.x1, line.x2), (2, 7));
            assert_eq!(line.alpha, FULL_COVERAGE);
        }
    }

    #[test]
    fn test_fill_winding_direction_does_not_matter() {
        let mut cw = Rasterizer::new(30, 30);
        cw.begin();
        cw.fill_polygon(&[(3.5, 4.0), (20.0, 6.5), (9.0, 25.0)]);

        let mut ccw = Rasterizer::new(30, 30);
        ccw.begin();
        ccw.fill_polygon(&[(9.0, 25.0), (20.0, 6.5), (3.5, 4.0)]);

        let rows = |lines: &[Scanline]| {
            let mut ys: Vec<i32> = lines.iter().map(|l| l.y).collect();
            ys.dedup();
            ys
        };
        assert_eq!(rows(cw.lines()), rows(ccw.lines()));
        assert!((covered_area(cw.lines()) - covered_area(ccw.lines())).abs() < 1e-3);
    }

    #[test]
    fn test_fill_area_matches_polygon_area() {
        let mut r = Rasterizer::new(64, 64);
        r.begin();
        // Triangle with area 0.5 * 30 * 20 = 300
        r.fill_polygon(&[(10.0, 10.0), (40.0, 10.0), (10.0, 30.0)]);
        let area = covered_area(r.lines());
        assert!((area - 300.0).abs() < 3.0, "area was {}", area);
    }

    #[test]
    fn test_fill_clips_to_canvas() {
        let mut r = Rasterizer::new(16, 16);
        r.begin();
        r.fill_polygon(&[(-10.0, -10.0), (30.0, -10.0), (30.0, 30.0), (-10.0, 30.0)]);

        let lines = r.lines();
        assert_eq!(lines.len(), 16);
        for line in lines {
            assert_eq!((line.x1, line.x2), (0, 15));
            assert_eq!(line.alpha, FULL_COVERAGE);
        }
    }

    #[test]
    fn test_fill_outside_canvas_is_empty() {
        let mut r = Rasterizer::new(16, 16);
        r.begin();
        r.fill_polygon(&[(20.0, 2.0), (30.0, 2.0), (25.0, 9.0)]);
        assert!(r.lines().is_empty());

        r.begin();
        r.fill_polygon(&[(2.0, -20.0), (9.0, -20.0), (5.0, -3.0)]);
        assert!(r.lines().is_empty());
    }

    #[test]
    fn test_flatten_quadratic_stays_on_curve() {
        let mut path = BezPath::new();
        path.move_to((0.0, 0.0));
        path.quad_to((5.0, 10.0), (10.0, 0.0));
        path.close_path();

        let pts = flatten_to_points(&path, FLATTEN_TOLERANCE);
        assert!(pts.len() > 3);
        assert_eq!(pts[0], (0.0, 0.0));
        assert!(pts.contains(&(10.0, 0.0)));
        // The curve peaks at half the control height
        let peak = pts.iter().map(|p| p.1).fold(f64::MIN, f64::max);
        assert!(peak <= 5.0 + 1e-9 && peak > 4.5, "peak {}", peak);
    }

    #[test]
    fn test_fill_path_matches_fill_polygon_for_lines() {
        let mut path = BezPath::new();
        path.move_to((10.0, 10.0));
        path.line_to((40.0, 10.0));
        path.line_to((10.0, 30.0));
        path.close_path();

        let mut a = Rasterizer::new(64, 64);
        a.begin();
        a.fill_path(&path);
        let mut b = Rasterizer::new(64, 64);
        b.begin();
        b.fill_polygon(&[(10.0, 10.0), (40.0, 10.0), (10.0, 30.0)]);
        assert!((covered_area(a.lines()) - covered_area(b.lines())).abs() < 1e-3);
    }

    #[test]
    fn test_fill_reuses_coverage_buffer() {
        // A second fill on the same rasterizer must not see the first one's coverage
        let mut r = Rasterizer::new(20, 20);
        r.begin();
        r.fill_polygon(&[(1.0, 1.0), (9.0, 1.0), (9.0, 9.0), (1.0, 9.0)]);
        r.begin();
        r.fill_polygon(&[(2.0, 2.0), (8.0, 2.0), (8.0, 8.0), (2.0, 8.0)]);
        assert_eq!(r.lines().len(), 6);
        assert!((covered_area(r.lines()) - 36.0).abs() < 1e-3);
    }
}
