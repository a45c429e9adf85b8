// End-to-end behavior of the public API

use image::{Rgba, RgbaImage};
use primitive_art::fitness::difference_full;
use primitive_art::painting::{compute_color, draw_lines};
use primitive_art::shapes::Rectangle;
use primitive_art::{export, Alpha, Color, Model, ModelParams, Rasterizer, Shape, ShapeKind};

fn params(seed: u64) -> ModelParams {
    ModelParams {
        shape_count: 5,
        shape_kinds: ShapeKind::ALL.to_vec(),
        worker_count: 3,
        trials_per_worker: 2,
        iterations_per_trial: 25,
        rng_seed: seed,
        ..ModelParams::default()
    }
}

fn checker(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        if (x / 8 + y / 8) % 2 == 0 {
            Rgba([240, 200, 40, 255])
        } else {
            Rgba([30, 60, 150, 255])
        }
    })
}

#[test]
fn full_canvas_rectangle_matches_flat_target() {
    let target = RgbaImage::from_pixel(100, 100, Rgba([255, 0, 0, 255]));
    let mut canvas = RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 255]));
    let baseline = difference_full(&target, &canvas);

    let rect = Shape::Rectangle(Rectangle {
        x1: 0,
        y1: 0,
        x2: 99,
        y2: 99,
    });
    let mut rast = Rasterizer::new(100, 100);
    let lines = rect.rasterize(&mut rast);
    assert_eq!(lines.len(), 100);

    let color = compute_color(&target, &canvas, lines, 255);
    draw_lines(&mut canvas, color, lines);
    let score = difference_full(&target, &canvas);

    assert!(score < baseline);
    assert!(score < 0.01, "score was {}", score);
}

#[test]
fn zero_shape_count_is_a_no_op() {
    let target = checker(24, 24);
    let background = Color::new(10, 10, 10, 255);
    let mut model = Model::with_background(
        target,
        background,
        ModelParams {
            shape_count: 0,
            ..params(1)
        },
    )
    .unwrap();
    let before = model.score();

    assert_eq!(model.run(), 0);
    assert!(model.shapes().is_empty());
    assert_eq!(model.score(), before);
    assert!(model
        .canvas()
        .pixels()
        .all(|p| *p == background.to_rgba()));
}

#[test]
fn same_seed_and_workers_reproduce_the_run() {
    let target = checker(40, 32);
    let bg = Color::new(128, 128, 128, 255);

    let mut a = Model::with_background(target.clone(), bg, params(42)).unwrap();
    let mut b = Model::with_background(target.clone(), bg, params(42)).unwrap();
    a.run();
    b.run();
    assert_eq!(a.shapes(), b.shapes());
    assert_eq!(a.canvas(), b.canvas());

    // The thread pool size must not matter
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(1)
        .build()
        .unwrap();
    let mut c = Model::with_background(target, bg, params(42)).unwrap();
    pool.install(|| c.run());
    assert_eq!(a.shapes(), c.shapes());
}

#[test]
fn running_score_matches_canvas() {
    let target = checker(48, 40);
    let mut model = Model::with_background(
        target.clone(),
        Color::new(0, 0, 0, 255),
        ModelParams {
            alpha: Alpha::Random,
            ..params(9)
        },
    )
    .unwrap();
    let baseline = model.score();
    model.run();

    assert_eq!(model.shapes().len(), 5);
    assert!(model.score() < baseline);
    let full = difference_full(&target, model.canvas());
    assert!((model.score() - full).abs() < 1e-9);
}

#[test]
fn exports_cover_every_shape() {
    let target = checker(32, 32);
    let bg = Color::new(50, 50, 50, 255);
    let mut model = Model::with_background(target, bg, params(3)).unwrap();
    model.run();

    let doc = export::svg(32, 32, bg, model.shapes(), 4.0);
    assert_eq!(doc.matches("fill-opacity").count(), model.shapes().len());

    let img = export::render(32, 32, bg, model.shapes(), 4.0);
    assert_eq!(img.dimensions(), (128, 128));

    let json = serde_json::to_string(model.shapes()).unwrap();
    let back: Vec<primitive_art::CommittedShape> = serde_json::from_str(&json).unwrap();
    assert_eq!(back.len(), model.shapes().len());
    for (restored, original) in back.iter().zip(model.shapes()) {
        assert_eq!(restored.shape.kind(), original.shape.kind());
        assert_eq!(restored.color, original.color);
    }
}
