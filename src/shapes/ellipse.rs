// Ellipses and circles
//
// Axis-aligned ellipses and circles are scanned row by row with whole-pixel spans. The
// rotated ellipse is approximated by quadratic bezier arcs in a kurbo path, flattened, and
// handed to the polygon filler.

use std::f64::consts::PI;

use rand::Rng;
use serde::{Deserialize, Serialize};

use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_ellipse_mut, Blend};
use kurbo::{BezPath, Point};

use super::{draw_polygon, gaussian, gaussian_int, normalize_degrees, placement};
use crate::raster::{flatten_to_points, Rasterizer, FLATTEN_TOLERANCE, FULL_COVERAGE};

/// An axis-aligned ellipse with integer center and radii
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ellipse {
    pub x: i32,
    pub y: i32,
    pub rx: i32,
    pub ry: i32,
}

impl Ellipse {
    /// Random center on the canvas, radii in [1, 32]
    pub fn random<R: Rng>(width: i32, height: i32, rng: &mut R) -> Self {
        Self {
            x: rng.gen_range(0..width),
            y: rng.gen_range(0..height),
            rx: rng.gen_range(1..=32),
            ry: rng.gen_range(1..=32),
        }
    }

    /// Move the center, or change one radius
    pub fn mutate<R: Rng>(&mut self, width: i32, height: i32, rng: &mut R) {
        match rng.gen_range(0..3) {
            0 => {
                self.x = (self.x + gaussian_int(rng, 16.0)).clamp(0, width - 1);
                self.y = (self.y + gaussian_int(rng, 16.0)).clamp(0, height - 1);
            }
            1 => self.rx = (self.rx + gaussian_int(rng, 16.0)).clamp(1, max_radius(width)),
            _ => self.ry = (self.ry + gaussian_int(rng, 16.0)).clamp(1, max_radius(height)),
        }
    }

    pub(crate) fn rasterize(&self, rast: &mut Rasterizer) {
        rasterize_ellipse(self.x, self.y, self.rx, self.ry, rast);
    }

    pub fn svg(&self, attrs: &str) -> String {
        format!(
            "<ellipse {} cx=\"{}\" cy=\"{}\" rx=\"{}\" ry=\"{}\" />",
            attrs, self.x, self.y, self.rx, self.ry
        )
    }

    pub fn draw(&self, canvas: &mut Blend<RgbaImage>, color: Rgba<u8>, scale: f64) {
        draw_ellipse(canvas, self.x, self.y, self.rx, self.ry, color, scale);
    }
}

/// A circle: an ellipse whose radii always move together
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Circle {
    pub x: i32,
    pub y: i32,
    pub r: i32,
}

impl Circle {
    pub fn random<R: Rng>(width: i32, height: i32, rng: &mut R) -> Self {
        Self {
            x: rng.gen_range(0..width),
            y: rng.gen_range(0..height),
            r: rng.gen_range(1..=32),
        }
    }

    /// Move the center, or change the radius
    pub fn mutate<R: Rng>(&mut self, width: i32, height: i32, rng: &mut R) {
        if rng.gen_bool(0.5) {
            self.x = (self.x + gaussian_int(rng, 16.0)).clamp(0, width - 1);
            self.y = (self.y + gaussian_int(rng, 16.0)).clamp(0, height - 1);
        } else {
            let limit = max_radius(width.max(height));
            self.r = (self.r + gaussian_int(rng, 16.0)).clamp(1, limit);
        }
    }

    pub(crate) fn rasterize(&self, rast: &mut Rasterizer) {
        rasterize_ellipse(self.x, self.y, self.r, self.r, rast);
    }

    pub fn svg(&self, attrs: &str) -> String {
        format!(
            "<circle {} cx=\"{}\" cy=\"{}\" r=\"{}\" />",
            attrs, self.x, self.y, self.r
        )
    }

    pub fn draw(&self, canvas: &mut Blend<RgbaImage>, color: Rgba<u8>, scale: f64) {
        draw_ellipse(canvas, self.x, self.y, self.r, self.r, color, scale);
    }
}

/// Largest radius allowed along an axis of the given length
fn max_radius(extent: i32) -> i32 {
    (extent - 1).max(1)
}

/// Scan-convert an axis-aligned ellipse, mirroring each row offset above and below the center
fn rasterize_ellipse(cx: i32, cy: i32, rx: i32, ry: i32, rast: &mut Rasterizer) {
    let (w, h) = (rast.width(), rast.height());
    if rx <= 0 || ry <= 0 {
        return;
    }
    // Bounding box entirely off the canvas
    if cx + rx < 0 || cx - rx >= w || cy + ry < 0 || cy - ry >= h {
        return;
    }

    let aspect = rx as f64 / ry as f64;
    let ry2 = ry * ry;
    for dy in 0..ry {
        let above = cy - dy;
        let below = cy + dy;
        if above < 0 && below >= h {
            break;
        }

        let half = ((ry2 - dy * dy) as f64).sqrt() * aspect;
        let half = half as i32;
        let (x1, x2) = (cx - half, cx + half);

        rast.push_clipped(above, x1, x2, FULL_COVERAGE);
        if dy > 0 {
            rast.push_clipped(below, x1, x2, FULL_COVERAGE);
        }
    }
}

fn draw_ellipse(
    canvas: &mut Blend<RgbaImage>,
    x: i32,
    y: i32,
    rx: i32,
    ry: i32,
    color: Rgba<u8>,
    scale: f64,
) {
    let center = (
        ((x as f64 + 0.5) * scale).round() as i32,
        ((y as f64 + 0.5) * scale).round() as i32,
    );
    let rx = ((rx as f64 * scale).round() as i32).max(1);
    let ry = ((ry as f64 * scale).round() as i32).max(1);
    draw_filled_ellipse_mut(canvas, center, rx, ry, color);
}

/// An ellipse with float center and radii, rotated by `angle` degrees about its center
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RotatedEllipse {
    pub x: f64,
    pub y: f64,
    pub rx: f64,
    pub ry: f64,
    pub angle: f64,
}

impl RotatedEllipse {
    /// Random center and angle, radii in [1, 32)
    pub fn random<R: Rng>(width: i32, height: i32, rng: &mut R) -> Self {
        Self {
            x: rng.gen::<f64>() * width as f64,
            y: rng.gen::<f64>() * height as f64,
            rx: rng.gen::<f64>() * 31.0 + 1.0,
            ry: rng.gen::<f64>() * 31.0 + 1.0,
            angle: rng.gen::<f64>() * 360.0,
        }
    }

    /// Move the center, resize both radii, or turn
    pub fn mutate<R: Rng>(&mut self, width: i32, height: i32, rng: &mut R) {
        let (w, h) = (width as f64, height as f64);
        match rng.gen_range(0..3) {
            0 => {
                self.x = (self.x + gaussian(rng, 16.0)).clamp(0.0, w - 1.0);
                self.y = (self.y + gaussian(rng, 16.0)).clamp(0.0, h - 1.0);
            }
            1 => {
                self.rx = (self.rx + gaussian(rng, 16.0)).clamp(1.0, w.max(2.0) - 1.0);
                self.ry = (self.ry + gaussian(rng, 16.0)).clamp(1.0, h.max(2.0) - 1.0);
            }
            _ => self.angle = normalize_degrees(self.angle + gaussian(rng, 32.0)),
        }
    }

    /// Boundary as a closed path of quadratic bezier arcs, on a canvas `scale` times the
    /// model size
    ///
    /// Each arc passes through its two end points and the true ellipse point halfway between
    /// them. Small ellipses get fewer arcs.
    fn outline(&self, scale: f64) -> BezPath {
        let arcs = if self.rx.max(self.ry) < 16.0 { 8 } else { 16 };
        let step = 2.0 * PI / arcs as f64;
        let on_ellipse = |a: f64| Point::new(self.rx * a.cos(), self.ry * a.sin());

        let mut path = BezPath::new();
        path.move_to(on_ellipse(0.0));
        for i in 0..arcs {
            let a0 = i as f64 * step;
            let (p0, mid, p1) = (
                on_ellipse(a0),
                on_ellipse(a0 + step / 2.0),
                on_ellipse(a0 + step),
            );
            // Control point that puts the curve through `mid` at t = 0.5
            let ctrl = (mid.to_vec2() * 2.0 - p0.midpoint(p1).to_vec2()).to_point();
            path.quad_to(ctrl, p1);
        }
        path.close_path();
        path.apply_affine(placement(self.x, self.y, self.angle, scale));
        path
    }

    pub(crate) fn rasterize(&self, rast: &mut Rasterizer) {
        let max_r = self.rx.max(self.ry);
        let (w, h) = (rast.width() as f64, rast.height() as f64);
        if self.x + max_r < 0.0 || self.x - max_r >= w || self.y + max_r < 0.0 || self.y - max_r >= h
        {
            return;
        }
        rast.fill_path(&self.outline(1.0));
    }

    pub fn svg(&self, attrs: &str) -> String {
        format!(
            "<g transform=\"translate({} {}) rotate({}) scale({} {})\">\
             <ellipse {} cx=\"0\" cy=\"0\" rx=\"1\" ry=\"1\" /></g>",
            self.x, self.y, self.angle, self.rx, self.ry, attrs
        )
    }

    pub fn draw(&self, canvas: &mut Blend<RgbaImage>, color: Rgba<u8>, scale: f64) {
        let points = flatten_to_points(&self.outline(scale), FLATTEN_TOLERANCE);
        draw_polygon(canvas, &points, color);
    }
}
