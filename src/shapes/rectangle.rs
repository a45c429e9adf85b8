// Rectangles: axis-aligned ones with integer corners, and rotated ones with float geometry
//
// The axis-aligned kind emits whole-pixel spans directly. The rotated kind is placed with a
// kurbo transform and filled by the anti-aliased polygon filler.

use rand::Rng;
use serde::{Deserialize, Serialize};

use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, Blend};
use imageproc::rect::Rect as PixelRect;

use kurbo::{Point, Rect};

use super::{
    draw_polygon, gaussian, gaussian_int, mutate_until, normalize_degrees, placement,
    MAX_MUTATION_ATTEMPTS,
};
use crate::raster::{Rasterizer, FULL_COVERAGE};

/// Widest allowed side ratio for rotated rectangles
const MAX_ASPECT: f64 = 5.0;

/// An axis-aligned rectangle between two inclusive corners
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rectangle {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Rectangle {
    /// Random corner anywhere on the canvas, with the opposite corner 1 to 32 pixels away
    pub fn random<R: Rng>(width: i32, height: i32, rng: &mut R) -> Self {
        let x1 = rng.gen_range(0..width);
        let y1 = rng.gen_range(0..height);
        Self {
            x1,
            y1,
            x2: (x1 + rng.gen_range(1..=32)).clamp(0, width - 1),
            y2: (y1 + rng.gen_range(1..=32)).clamp(0, height - 1),
        }
    }

    /// Move one of the two corners
    pub fn mutate<R: Rng>(&mut self, width: i32, height: i32, rng: &mut R) {
        if rng.gen_bool(0.5) {
            self.x1 = (self.x1 + gaussian_int(rng, 16.0)).clamp(0, width - 1);
            self.y1 = (self.y1 + gaussian_int(rng, 16.0)).clamp(0, height - 1);
        } else {
            self.x2 = (self.x2 + gaussian_int(rng, 16.0)).clamp(0, width - 1);
            self.y2 = (self.y2 + gaussian_int(rng, 16.0)).clamp(0, height - 1);
        }
    }

    /// Corners ordered as (left, top, right, bottom)
    fn bounds(&self) -> (i32, i32, i32, i32) {
        (
            self.x1.min(self.x2),
            self.y1.min(self.y2),
            self.x1.max(self.x2),
            self.y1.max(self.y2),
        )
    }

    /// One full-coverage span per row
    pub(crate) fn rasterize(&self, rast: &mut Rasterizer) {
        let (left, top, right, bottom) = self.bounds();
        for y in top.max(0)..=bottom.min(rast.height() - 1) {
            rast.push_clipped(y, left, right, FULL_COVERAGE);
        }
    }

    pub fn svg(&self, attrs: &str) -> String {
        let (left, top, right, bottom) = self.bounds();
        format!(
            "<rect {} x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" />",
            attrs,
            left,
            top,
            right - left + 1,
            bottom - top + 1
        )
    }

    pub fn draw(&self, canvas: &mut Blend<RgbaImage>, color: Rgba<u8>, scale: f64) {
        let (left, top, right, bottom) = self.bounds();
        let x = (left as f64 * scale).round() as i32;
        let y = (top as f64 * scale).round() as i32;
        let w = (((right - left + 1) as f64 * scale).round() as u32).max(1);
        let h = (((bottom - top + 1) as f64 * scale).round() as u32).max(1);
        draw_filled_rect_mut(canvas, PixelRect::at(x, y).of_size(w, h), color);
    }
}

/// A rectangle of size `sx` x `sy` centered on (x, y), rotated by `angle` degrees
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RotatedRectangle {
    pub x: f64,
    pub y: f64,
    pub sx: f64,
    pub sy: f64,
    pub angle: f64,
}

impl RotatedRectangle {
    /// Random center and angle, sides in [1, 32)
    pub fn random<R: Rng>(width: i32, height: i32, rng: &mut R) -> Self {
        let mut rect = Self {
            x: rng.gen::<f64>() * width as f64,
            y: rng.gen::<f64>() * height as f64,
            sx: rng.gen::<f64>() * 31.0 + 1.0,
            sy: rng.gen::<f64>() * 31.0 + 1.0,
            angle: rng.gen::<f64>() * 360.0,
        };
        // Bring a too-thin start inside the aspect bound
        if !rect.is_valid() {
            let short = rect.sx.max(rect.sy) / MAX_ASPECT;
            rect.sx = rect.sx.max(short);
            rect.sy = rect.sy.max(short);
        }
        rect
    }

    /// Perturb position, size or angle, retrying until the aspect bound holds
    ///
    /// After `MAX_MUTATION_ATTEMPTS` failures the previous geometry is kept.
    pub fn mutate<R: Rng>(&mut self, width: i32, height: i32, rng: &mut R) {
        mutate_until(
            self,
            rng,
            MAX_MUTATION_ATTEMPTS,
            "rotated-rectangle",
            |rect, rng| rect.nudge(width, height, rng),
            RotatedRectangle::is_valid,
        );
    }

    /// One unconstrained Gaussian step on a single parameter
    fn nudge<R: Rng>(&mut self, width: i32, height: i32, rng: &mut R) {
        let (w, h) = (width as f64, height as f64);
        match rng.gen_range(0..3) {
            0 => {
                self.x = (self.x + gaussian(rng, 16.0)).clamp(0.0, w - 1.0);
                self.y = (self.y + gaussian(rng, 16.0)).clamp(0.0, h - 1.0);
            }
            1 => {
                self.sx = (self.sx + gaussian(rng, 16.0)).clamp(1.0, w.max(2.0) - 1.0);
                self.sy = (self.sy + gaussian(rng, 16.0)).clamp(1.0, h.max(2.0) - 1.0);
            }
            _ => self.angle = normalize_degrees(self.angle + gaussian(rng, 32.0)),
        }
    }

    /// Whether the longer side is at most five times the shorter one
    pub fn is_valid(&self) -> bool {
        let (a, b) = (self.sx.min(self.sy), self.sx.max(self.sy));
        a > 0.0 && b / a <= MAX_ASPECT
    }

    /// Corners on a canvas `scale` times the model size, in winding order
    fn corners(&self, scale: f64) -> [(f64, f64); 4] {
        let rect = Rect::from_center_size(Point::ORIGIN, (self.sx, self.sy));
        let transform = placement(self.x, self.y, self.angle, scale);
        [
            (rect.x0, rect.y0),
            (rect.x1, rect.y0),
            (rect.x1, rect.y1),
            (rect.x0, rect.y1),
        ]
        .map(|(x, y)| {
            let p = transform * Point::new(x, y);
            (p.x, p.y)
        })
    }

    pub(crate) fn rasterize(&self, rast: &mut Rasterizer) {
        rast.fill_polygon(&self.corners(1.0));
    }

    pub fn svg(&self, attrs: &str) -> String {
        format!(
            "<g transform=\"translate({} {}) rotate({}) scale({} {})\">\
             <rect {} x=\"-0.5\" y=\"-0.5\" width=\"1\" height=\"1\" /></g>",
            self.x, self.y, self.angle, self.sx, self.sy, attrs
        )
    }

    pub fn draw(&self, canvas: &mut Blend<RgbaImage>, color: Rgba<u8>, scale: f64) {
        draw_polygon(canvas, &self.corners(scale), color);
    }
}
