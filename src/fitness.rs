// Error metric between the canvas and the target
//
// Score is the root-mean-square difference over all four channels, normalized to [0, 1].
// Lower is better.

use crate::raster::Scanline;

// Image type for comparing pixels
use image::RgbaImage;

// Rayon provides parallel iterators: the full difference is a plain sum, so it splits cleanly
use rayon::prelude::*;

/// Sum of squared channel differences between two RGBA8 byte slices
#[inline]
fn squared_error(a: &[u8], b: &[u8]) -> u64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = x as i64 - y as i64;
            (d * d) as u64
        })
        .sum()
}

/// Turn a total squared error into the normalized RMS score
#[inline]
fn score_from_total(total: f64, width: u32, height: u32) -> f64 {
    let n = width as f64 * height as f64 * 4.0;
    (total.max(0.0) / n).sqrt() / 255.0
}

/// RMS difference between two whole images, in [0, 1]
///
/// Used once to establish the baseline score; every later score is derived incrementally.
///
/// # Panics
/// Panics if images have different dimensions
pub fn difference_full(a: &RgbaImage, b: &RgbaImage) -> f64 {
    assert_eq!(
        a.dimensions(),
        b.dimensions(),
        "Images must have same dimensions"
    );
    let total = squared_error(a.as_raw(), b.as_raw());
    score_from_total(total as f64, a.width(), a.height())
}

/// Parallel version of [`difference_full`]
///
/// Rows are summed on rayon's pool. The sum is exact integer arithmetic, so the result is
/// bit-identical to the sequential version.
pub fn difference_full_parallel(a: &RgbaImage, b: &RgbaImage) -> f64 {
    assert_eq!(
        a.dimensions(),
        b.dimensions(),
        "Images must have same dimensions"
    );
    let row = a.width() as usize * 4;
    if row == 0 {
        return 0.0;
    }
    let total: u64 = a
        .as_raw()
        .par_chunks(row)
        .zip(b.as_raw().par_chunks(row))
        .map(|(ra, rb)| squared_error(ra, rb))
        .sum();
    score_from_total(total as f64, a.width(), a.height())
}

/// Score after replacing `before` with `after` inside `lines`
///
/// `score` must be the score of `before` against `target`. Only the pixels under the spans
/// are visited: their old contribution is subtracted and their new one added. The change is
/// accumulated exactly in integers; if it is zero the input score is returned as-is.
pub fn difference_partial(
    target: &RgbaImage,
    before: &RgbaImage,
    after: &RgbaImage,
    score: f64,
    lines: &[Scanline],
) -> f64 {
    let (width, height) = target.dimensions();
    let t = target.as_raw();
    let b = before.as_raw();
    let a = after.as_raw();

    let mut delta: i64 = 0;
    for line in lines {
        let n = line.width();
        if n == 0 {
            continue;
        }
        let start = (line.y as usize * width as usize + line.x1 as usize) * 4;
        let end = start + n * 4;
        delta -= squared_error(&t[start..end], &b[start..end]) as i64;
        delta += squared_error(&t[start..end], &a[start..end]) as i64;
    }

    if delta == 0 {
        return score;
    }

    let n = width as f64 * height as f64 * 4.0;
    let total = (score * 255.0).powi(2) * n;
    score_from_total(total + delta as f64, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::painting::{draw_lines, Color};
    use image::Rgba;

    #[test]
    fn test_identical_images() {
        let img1 = RgbaImage::from_pixel(100, 100, Rgba([128, 128, 128, 255]));
        let img2 = RgbaImage::from_pixel(100, 100, Rgba([128, 128, 128, 255]));
        assert_eq!(difference_full(&img1, &img2), 0.0);
    }

    #[test]
    fn test_black_vs_white() {
        // RGB differ by 255 everywhere, alpha matches: sqrt(3/4)
        let img1 = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255]));
        let img2 = RgbaImage::from_pixel(10, 10, Rgba([255, 255, 255, 255]));
        let diff = difference_full(&img1, &img2);
        assert!((diff - 0.75f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_alpha_counts() {
        let img1 = RgbaImage::from_pixel(10, 10, Rgba([10, 10, 10, 255]));
        let img2 = RgbaImage::from_pixel(10, 10, Rgba([10, 10, 10, 0]));
        assert!(difference_full(&img1, &img2) > 0.0);
    }

    #[test]
    fn test_parallel_equals_sequential() {
        let mut img1 = RgbaImage::new(37, 23);
        for (x, y, p) in img1.enumerate_pixels_mut() {
            *p = Rgba([(x * 7) as u8, (y * 11) as u8, (x ^ y) as u8, 255]);
        }
        let img2 = RgbaImage::from_pixel(37, 23, Rgba([110, 140, 190, 200]));

        assert_eq!(
            difference_full(&img1, &img2),
            difference_full_parallel(&img1, &img2),
            "Sequential and parallel should give identical results"
        );
    }

    #[test]
    #[should_panic(expected = "Images must have same dimensions")]
    fn test_different_sizes_panics() {
        let img1 = RgbaImage::from_pixel(100, 100, Rgba([128, 128, 128, 255]));
        let img2 = RgbaImage::from_pixel(200, 200, Rgba([128, 128, 128, 255]));
        difference_full(&img1, &img2);
    }

    #[test]
    fn test_partial_noop_returns_prior_score() {
        let target = RgbaImage::from_pixel(20, 20, Rgba([200, 50, 10, 255]));
        let canvas = RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 255]));
        let score = difference_full(&target, &canvas);
        let lines = vec![Scanline::new(3, 0, 19), Scanline::new(4, 5, 9)];

        assert_eq!(
            difference_partial(&target, &canvas, &canvas, score, &lines),
            score
        );
        assert_eq!(difference_partial(&target, &canvas, &canvas, score, &[]), score);
    }

    #[test]
    fn test_partial_matches_full_after_draw() {
        let mut target = RgbaImage::new(30, 20);
        for (x, y, p) in target.enumerate_pixels_mut() {
            *p = Rgba([(x * 8) as u8, (y * 12) as u8, 90, 255]);
        }
        let before = RgbaImage::from_pixel(30, 20, Rgba([40, 40, 40, 255]));
        let score = difference_full(&target, &before);

        let lines: Vec<Scanline> = (5..15).map(|y| Scanline::new(y, 2, 20)).collect();
        let mut after = before.clone();
        draw_lines(&mut after, Color::new(180, 90, 30, 160), &lines);

        let partial = difference_partial(&target, &before, &after, score, &lines);
        let full = difference_full(&target, &after);
        assert!((partial - full).abs() < 1e-9, "{} vs {}", partial, full);
    }
}
