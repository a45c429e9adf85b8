// Presentation of a finished model
//
// Both outputs are rebuilt from the committed-shape list, so they can be produced at any scale
// independently of the resolution the model was fitted at.

use image::RgbaImage;
use imageproc::drawing::Blend;

use crate::model::CommittedShape;
use crate::painting::Color;

fn scaled(extent: u32, scale: f64) -> u32 {
    ((extent as f64 * scale).round() as u32).max(1)
}

/// A standalone SVG document for `shapes` over a flat `background`
///
/// `width` and `height` are the model's dimensions; the document is `scale` times larger.
pub fn svg(
    width: u32,
    height: u32,
    background: Color,
    shapes: &[CommittedShape],
    scale: f64,
) -> String {
    let (w, h) = (scaled(width, scale), scaled(height, scale));
    let mut out = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" version=\"1.1\" width=\"{}\" height=\"{}\">\n",
        w, h
    );
    out.push_str(&format!(
        "<rect x=\"0\" y=\"0\" width=\"{}\" height=\"{}\" fill=\"{}\" />\n",
        w,
        h,
        background.hex()
    ));
    out.push_str(&format!("<g transform=\"scale({})\">\n", scale));
    for committed in shapes {
        let attrs = format!(
            "fill=\"{}\" fill-opacity=\"{:.6}\"",
            committed.color.hex(),
            committed.color.opacity()
        );
        out.push_str(&committed.shape.svg(&attrs));
        out.push('\n');
    }
    out.push_str("</g>\n</svg>\n");
    out
}

/// Rasterize `shapes` over a flat `background` at `scale` times the model size
pub fn render(
    width: u32,
    height: u32,
    background: Color,
    shapes: &[CommittedShape],
    scale: f64,
) -> RgbaImage {
    let mut canvas = Blend(RgbaImage::from_pixel(
        scaled(width, scale),
        scaled(height, scale),
        background.to_rgba(),
    ));
    for committed in shapes {
        committed
            .shape
            .draw(&mut canvas, committed.color.to_rgba(), scale);
    }
    canvas.0
}
