// Compositing: choosing a shape's color and blending it onto a canvas
//
// All functions here work on spans produced by the rasterizer, so their cost is proportional
// to the pixels a shape covers rather than to the image size.

use crate::raster::Scanline;

// Image types from the image crate
// RgbaImage = 2D image with RGBA pixels, stored as a flat Vec<u8> in row-major order
use image::{Rgba, RgbaImage};

use serde::{Deserialize, Serialize};

/// A solid RGBA color with straight (non-premultiplied) alpha
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Convert to the image crate's pixel type
    pub fn to_rgba(self) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, self.a])
    }

    /// `#rrggbb`, as used in SVG fill attributes
    pub fn hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Alpha as a fraction in [0, 1]
    pub fn opacity(self) -> f64 {
        self.a as f64 / 255.0
    }
}

/// Byte offset of pixel (x, y) in an RGBA8 buffer
#[inline]
fn pix_offset(width: u32, x: i32, y: i32) -> usize {
    (y as usize * width as usize + x as usize) * 4
}

/// Mean RGB color of an image, fully opaque
///
/// This is the usual starting background: it is the best single flat color under
/// squared error.
pub fn average_color(img: &RgbaImage) -> Color {
    let count = img.width() as u64 * img.height() as u64;
    if count == 0 {
        return Color::default();
    }
    let (mut r, mut g, mut b) = (0u64, 0u64, 0u64);
    for p in img.pixels() {
        r += p.0[0] as u64;
        g += p.0[1] as u64;
        b += p.0[2] as u64;
    }
    Color::new((r / count) as u8, (g / count) as u8, (b / count) as u8, 255)
}

/// Solve for the color that, drawn at `alpha` over `current`, best matches `target`
///
/// For a pixel blended as `out = cur * (1 - a) + src * a`, squared error is minimized by
/// `src = cur + (target - cur) / a`. We average that over every covered pixel, working in
/// 16-bit fixed point (`0x101` per 8-bit unit), then clamp each channel to [0, 255].
///
/// Returns `Color::default()` when the spans cover no pixels (or `alpha` is 0).
pub fn compute_color(
    target: &RgbaImage,
    current: &RgbaImage,
    lines: &[Scanline],
    alpha: u8,
) -> Color {
    if alpha == 0 {
        return Color::default();
    }

    let t = target.as_raw();
    let c = current.as_raw();
    let width = target.width();
    let a = 0x101 * 255 / alpha as i64;

    let (mut rsum, mut gsum, mut bsum, mut count) = (0i64, 0i64, 0i64, 0i64);
    for line in lines {
        let n = line.width();
        if n == 0 {
            continue;
        }
        let start = pix_offset(width, line.x1, line.y);
        for i in (start..start + n * 4).step_by(4) {
            let (tr, tg, tb) = (t[i] as i64, t[i + 1] as i64, t[i + 2] as i64);
            let (cr, cg, cb) = (c[i] as i64, c[i + 1] as i64, c[i + 2] as i64);
            rsum += (tr - cr) * a + cr * 0x101;
            gsum += (tg - cg) * a + cg * 0x101;
            bsum += (tb - cb) * a + cb * 0x101;
        }
        count += n as i64;
    }

    if count == 0 {
        return Color::default();
    }

    // Integer division truncates, the shift then floors back to 8 bits
    let channel = |sum: i64| ((sum / count) >> 8).clamp(0, 255) as u8;
    Color::new(channel(rsum), channel(gsum), channel(bsum), alpha)
}

/// Copy the pixels under `lines` from `src` into `dst`
///
/// Used to snapshot a region before a trial draw and to restore it afterwards, which is an
/// O(covered pixels) undo instead of a full canvas copy.
pub fn copy_lines(dst: &mut RgbaImage, src: &RgbaImage, lines: &[Scanline]) {
    let width = src.width();
    let s = src.as_raw();
    let d: &mut [u8] = dst;
    for line in lines {
        let n = line.width();
        if n == 0 {
            continue;
        }
        let start = pix_offset(width, line.x1, line.y);
        let end = start + n * 4;
        d[start..end].copy_from_slice(&s[start..end]);
    }
}

/// Composite `color` over `img` inside `lines`
///
/// Premultiplied "over" in 16-bit fixed point, applied to all four channels (the canvas keeps
/// a real alpha channel). Each span's own coverage scales the shape alpha.
pub fn draw_lines(img: &mut RgbaImage, color: Color, lines: &[Scanline]) {
    const M: u32 = 0xffff;

    // Premultiply and widen to 16 bits
    let sa = color.a as u32 * 0x101;
    let premul = |v: u8| v as u32 * 0x101 * color.a as u32 / 0xff;
    let (sr, sg, sb) = (premul(color.r), premul(color.g), premul(color.b));

    let width = img.width();
    let pix: &mut [u8] = img;
    for line in lines {
        let n = line.width();
        if n == 0 {
            continue;
        }
        let ma = line.alpha;
        // Weight left on the destination; bounded so dst * k + src * ma stays below 2^32
        let k = (M - sa * ma / M) * 0x101;
        let (rma, gma, bma, ama) = (sr * ma, sg * ma, sb * ma, sa * ma);

        let start = pix_offset(width, line.x1, line.y);
        for px in pix[start..start + n * 4].chunks_exact_mut(4) {
            px[0] = ((px[0] as u32 * k + rma) / M >> 8) as u8;
            px[1] = ((px[1] as u32 * k + gma) / M >> 8) as u8;
            px[2] = ((px[2] as u32 * k + bma) / M >> 8) as u8;
            px[3] = ((px[3] as u32 * k + ama) / M >> 8) as u8;
        }
    }
}
