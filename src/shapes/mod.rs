// Shape primitives the optimizer can place on the canvas
//
// Each variant stores only its geometric parameters. Canvas bounds and randomness are passed
// in by the caller (a Worker), so a Shape is a plain value that can be cloned freely: mutation
// always happens on an owned copy.

use std::fmt;
use std::str::FromStr;

use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_polygon_mut, Blend};
use imageproc::point::Point;
use kurbo::Affine;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::raster::{Rasterizer, Scanline};

mod ellipse;
mod rectangle;
mod triangle;

pub use ellipse::{Circle, Ellipse, RotatedEllipse};
pub use rectangle::{Rectangle, RotatedRectangle};
pub use triangle::Triangle;

/// Upper bound on retries when a mutation must satisfy a validity predicate
///
/// When it is exhausted the shape keeps its pre-mutation geometry.
pub const MAX_MUTATION_ATTEMPTS: usize = 1000;

/// The kinds of shape a run may use
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShapeKind {
    Triangle,
    Rectangle,
    RotatedRectangle,
    Ellipse,
    Circle,
    RotatedEllipse,
}

impl ShapeKind {
    pub const ALL: [ShapeKind; 6] = [
        ShapeKind::Triangle,
        ShapeKind::Rectangle,
        ShapeKind::RotatedRectangle,
        ShapeKind::Ellipse,
        ShapeKind::Circle,
        ShapeKind::RotatedEllipse,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ShapeKind::Triangle => "triangle",
            ShapeKind::Rectangle => "rectangle",
            ShapeKind::RotatedRectangle => "rotated-rectangle",
            ShapeKind::Ellipse => "ellipse",
            ShapeKind::Circle => "circle",
            ShapeKind::RotatedEllipse => "rotated-ellipse",
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ShapeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        ShapeKind::ALL
            .into_iter()
            .find(|kind| kind.name() == normalized)
            .ok_or_else(|| {
                format!(
                    "unknown shape '{}' (expected one of: triangle, rectangle, \
                     rotated-rectangle, ellipse, circle, rotated-ellipse)",
                    s
                )
            })
    }
}

/// A placed shape
///
/// Serialized with a `type` tag naming its kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Shape {
    Triangle(Triangle),
    Rectangle(Rectangle),
    RotatedRectangle(RotatedRectangle),
    Ellipse(Ellipse),
    Circle(Circle),
    RotatedEllipse(RotatedEllipse),
}

impl Shape {
    /// Create a random shape of the given kind on a `width` x `height` canvas
    pub fn random<R: Rng>(kind: ShapeKind, width: i32, height: i32, rng: &mut R) -> Self {
        match kind {
            ShapeKind::Triangle => Shape::Triangle(Triangle::random(width, height, rng)),
            ShapeKind::Rectangle => Shape::Rectangle(Rectangle::random(width, height, rng)),
            ShapeKind::RotatedRectangle => {
                Shape::RotatedRectangle(RotatedRectangle::random(width, height, rng))
            }
            ShapeKind::Ellipse => Shape::Ellipse(Ellipse::random(width, height, rng)),
            ShapeKind::Circle => Shape::Circle(Circle::random(width, height, rng)),
            ShapeKind::RotatedEllipse => {
                Shape::RotatedEllipse(RotatedEllipse::random(width, height, rng))
            }
        }
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::Triangle(_) => ShapeKind::Triangle,
            Shape::Rectangle(_) => ShapeKind::Rectangle,
            Shape::RotatedRectangle(_) => ShapeKind::RotatedRectangle,
            Shape::Ellipse(_) => ShapeKind::Ellipse,
            Shape::Circle(_) => ShapeKind::Circle,
            Shape::RotatedEllipse(_) => ShapeKind::RotatedEllipse,
        }
    }

    /// Perturb one parameter (delegates to the variant)
    pub fn mutate<R: Rng>(&mut self, width: i32, height: i32, rng: &mut R) {
        match self {
            Shape::Triangle(s) => s.mutate(width, height, rng),
            Shape::Rectangle(s) => s.mutate(width, height, rng),
            Shape::RotatedRectangle(s) => s.mutate(width, height, rng),
            Shape::Ellipse(s) => s.mutate(width, height, rng),
            Shape::Circle(s) => s.mutate(width, height, rng),
            Shape::RotatedEllipse(s) => s.mutate(width, height, rng),
        }
    }

    /// Rasterize into the rasterizer's scratch buffer and return the clipped spans
    ///
    /// The slice is only valid until the next call on the same rasterizer.
    pub fn rasterize<'a>(&self, rast: &'a mut Rasterizer) -> &'a [Scanline] {
        rast.begin();
        match self {
            Shape::Triangle(s) => s.rasterize(rast),
            Shape::Rectangle(s) => s.rasterize(rast),
            Shape::RotatedRectangle(s) => s.rasterize(rast),
            Shape::Ellipse(s) => s.rasterize(rast),
            Shape::Circle(s) => s.rasterize(rast),
            Shape::RotatedEllipse(s) => s.rasterize(rast),
        }
        rast.lines()
    }

    /// SVG element for this shape; `attrs` is spliced in verbatim (fill, opacity, ...)
    pub fn svg(&self, attrs: &str) -> String {
        match self {
            Shape::Triangle(s) => s.svg(attrs),
            Shape::Rectangle(s) => s.svg(attrs),
            Shape::RotatedRectangle(s) => s.svg(attrs),
            Shape::Ellipse(s) => s.svg(attrs),
            Shape::Circle(s) => s.svg(attrs),
            Shape::RotatedEllipse(s) => s.svg(attrs),
        }
    }

    /// Draw onto a blending canvas, with all coordinates multiplied by `scale`
    ///
    /// This is for presentation only (exports at any size); the optimizer itself works on
    /// spans from [`Shape::rasterize`].
    pub fn draw(&self, canvas: &mut Blend<RgbaImage>, color: Rgba<u8>, scale: f64) {
        match self {
            Shape::Triangle(s) => s.draw(canvas, color, scale),
            Shape::Rectangle(s) => s.draw(canvas, color, scale),
            Shape::RotatedRectangle(s) => s.draw(canvas, color, scale),
            Shape::Ellipse(s) => s.draw(canvas, color, scale),
            Shape::Circle(s) => s.draw(canvas, color, scale),
            Shape::RotatedEllipse(s) => s.draw(canvas, color, scale),
        }
    }
}

/// Gaussian delta with standard deviation `sigma`
fn gaussian<R: Rng>(rng: &mut R, sigma: f64) -> f64 {
    rng.sample::<f64, _>(StandardNormal) * sigma
}

/// Integer Gaussian delta, truncated toward zero
fn gaussian_int<R: Rng>(rng: &mut R, sigma: f64) -> i32 {
    gaussian(rng, sigma) as i32
}

/// Map shape-local coordinates, centered on the origin, onto a canvas `scale` times the model
/// size: rotate by `angle` degrees, move to `(x, y)`, then scale
fn placement(x: f64, y: f64, angle: f64, scale: f64) -> Affine {
    Affine::scale(scale) * Affine::translate((x, y)) * Affine::rotate(angle.to_radians())
}

/// Apply `step` until `valid` accepts the result, giving up after `attempts` tries
///
/// Steps accumulate: each retry starts from the previous attempt. When every attempt fails
/// the shape is restored to its value before the first step, a warning is logged, and
/// `false` is returned.
fn mutate_until<T, R, S, V>(
    shape: &mut T,
    rng: &mut R,
    attempts: usize,
    name: &str,
    mut step: S,
    valid: V,
) -> bool
where
    T: Clone,
    R: Rng,
    S: FnMut(&mut T, &mut R),
    V: Fn(&T) -> bool,
{
    let original = shape.clone();
    for _ in 0..attempts {
        step(shape, rng);
        if valid(shape) {
            return true;
        }
    }
    tracing::warn!(
        shape = name,
        attempts,
        "mutation found no valid shape, keeping previous geometry"
    );
    *shape = original;
    false
}

/// Normalize an angle in degrees to [0, 360)
fn normalize_degrees(angle: f64) -> f64 {
    let a = angle.rem_euclid(360.0);
    if a >= 360.0 {
        0.0
    } else {
        a
    }
}

/// Fill a polygon on a blending canvas
///
/// imageproc rejects polygons whose first and last points coincide, so consecutive duplicate
/// points (common after rounding small shapes) are removed first.
fn draw_polygon(canvas: &mut Blend<RgbaImage>, points: &[(f64, f64)], color: Rgba<u8>) {
    let mut poly: Vec<Point<i32>> = Vec::with_capacity(points.len());
    for &(x, y) in points {
        let p = Point::new(x.round() as i32, y.round() as i32);
        if poly.last() != Some(&p) {
            poly.push(p);
        }
    }
    while poly.len() > 1 && poly.first() == poly.last() {
        poly.pop();
    }
    if poly.len() < 3 {
        return;
    }
    draw_polygon_mut(canvas, &poly, color);
}
