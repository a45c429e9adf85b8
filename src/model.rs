// The orchestrator: owns the canonical canvas and commits one shape per round
use crate::error::{ModelError, ModelResult};
use crate::fitness::difference_full_parallel;
use crate::painting::{draw_lines, Color};
use crate::raster::Rasterizer;
use crate::shapes::{Shape, ShapeKind};
use crate::worker::{derive_seed, Alpha, Candidate, Worker};

use image::RgbaImage;

// Rayon for the per-round worker fan-out
use rayon::prelude::*;

use serde::{Deserialize, Serialize};

/// Parameters controlling a run
///
/// Built from CLI flags by the binary, or with struct-update syntax on
/// `ModelParams::default()` by library users.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    /// Stop once this many shapes have been committed
    pub shape_count: usize,

    /// Kinds to draw from; each trial picks one uniformly
    pub shape_kinds: Vec<ShapeKind>,

    pub alpha: Alpha,

    /// Parallel searchers per round. Together with `rng_seed` this fixes the result;
    /// the size of rayon's pool does not.
    pub worker_count: usize,

    /// Random restarts per worker per round
    pub trials_per_worker: usize,

    /// Hill-climbing iterations per restart
    pub iterations_per_trial: usize,

    pub rng_seed: u64,

    /// Stop early once the score falls below this
    pub score_threshold: Option<f64>,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            shape_count: 100,
            shape_kinds: vec![ShapeKind::Triangle],
            alpha: Alpha::Fixed(128),
            worker_count: rayon::current_num_threads(),
            trials_per_worker: 16,
            iterations_per_trial: 100,
            rng_seed: 0,
            score_threshold: None,
        }
    }
}

/// One entry of the finished model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommittedShape {
    pub shape: Shape,
    pub color: Color,
    /// Running score right after this shape was committed
    pub score: f64,
}

pub struct Model {
    target: RgbaImage,
    canvas: RgbaImage,
    score: f64,
    shapes: Vec<CommittedShape>,
    workers: Vec<Worker>,
    rast: Rasterizer,
    params: ModelParams,
}

impl Model {
    /// Start from an explicit initial canvas
    ///
    /// # Errors
    /// Returns a [`ModelError`] when the images are empty or mismatched, or when the
    /// parameters leave nothing to search with.
    pub fn new(target: RgbaImage, canvas: RgbaImage, params: ModelParams) -> ModelResult<Self> {
        let (width, height) = target.dimensions();
        if width == 0 || height == 0 {
            return Err(ModelError::EmptyImage { width, height });
        }
        if canvas.dimensions() != target.dimensions() {
            return Err(ModelError::DimensionMismatch {
                target_width: width,
                target_height: height,
                canvas_width: canvas.width(),
                canvas_height: canvas.height(),
            });
        }
        if params.shape_kinds.is_empty() {
            return Err(ModelError::NoShapeKinds);
        }
        if params.worker_count == 0 {
            return Err(ModelError::NoWorkers);
        }
        if params.alpha == Alpha::Fixed(0) {
            return Err(ModelError::ZeroAlpha);
        }

        let workers = (0..params.worker_count)
            .map(|i| Worker::new(i, width, height, derive_seed(params.rng_seed, i)))
            .collect();
        let score = difference_full_parallel(&target, &canvas);

        tracing::info!(
            width,
            height,
            workers = params.worker_count,
            trials = params.trials_per_worker,
            iterations = params.iterations_per_trial,
            seed = params.rng_seed,
            score,
            "model ready"
        );

        Ok(Self {
            target,
            canvas,
            score,
            shapes: Vec::with_capacity(params.shape_count),
            workers,
            rast: Rasterizer::new(width, height),
            params,
        })
    }

    /// Start from a canvas filled with `background`
    pub fn with_background(
        target: RgbaImage,
        background: Color,
        params: ModelParams,
    ) -> ModelResult<Self> {
        let canvas = RgbaImage::from_pixel(target.width(), target.height(), background.to_rgba());
        Self::new(target, canvas, params)
    }

    /// Run one round and commit its winner
    ///
    /// **Fork-join**
    /// Every worker borrows `target` and `canvas` immutably while `par_iter_mut` hands each
    /// one exclusive access to its own scratch state. The canvas can only be written after
    /// the parallel section returns.
    pub fn step(&mut self) -> &CommittedShape {
        let target = &self.target;
        let canvas = &self.canvas;
        let score = self.score;
        let params = &self.params;

        let candidates: Vec<Candidate> = self
            .workers
            .par_iter_mut()
            .map(|worker| worker.run_round(target, canvas, score, params))
            .collect();

        let (winner, best) = select_best(candidates);

        let lines = best.shape.rasterize(&mut self.rast);
        draw_lines(&mut self.canvas, best.color, lines);
        self.score = best.score;

        tracing::debug!(
            round = self.shapes.len() + 1,
            worker = winner,
            kind = %best.shape.kind(),
            score = best.score,
            "committed shape"
        );

        self.shapes.push(CommittedShape {
            shape: best.shape,
            color: best.color,
            score: best.score,
        });
        &self.shapes[self.shapes.len() - 1]
    }

    /// Run until `shape_count` shapes are committed or the score threshold is reached
    ///
    /// Returns the number of shapes added by this call.
    pub fn run(&mut self) -> usize {
        self.run_with(|_, _| {})
    }

    /// Like [`Model::run`], calling `on_commit(total_committed, shape)` after every round
    pub fn run_with<F>(&mut self, mut on_commit: F) -> usize
    where
        F: FnMut(usize, &CommittedShape),
    {
        let mut added = 0;
        while self.shapes.len() < self.params.shape_count && !self.threshold_reached() {
            self.step();
            added += 1;
            on_commit(self.shapes.len(), &self.shapes[self.shapes.len() - 1]);
        }
        added
    }

    fn threshold_reached(&self) -> bool {
        self.params
            .score_threshold
            .map_or(false, |threshold| self.score < threshold)
    }

    pub fn shapes(&self) -> &[CommittedShape] {
        &self.shapes
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    /// Energy evaluations across all workers so far
    pub fn evaluations(&self) -> u64 {
        self.workers.iter().map(Worker::evaluations).sum()
    }
}

/// Pick the lowest-scoring candidate; on a tie the lowest worker index wins
///
/// # Panics
/// Panics if `candidates` is empty. A model always has at least one worker.
fn select_best(candidates: Vec<Candidate>) -> (usize, Candidate) {
    let mut iter = candidates.into_iter().enumerate();
    let mut best = iter.next().expect("a round always has at least one candidate");
    for (index, candidate) in iter {
        if candidate.score < best.1.score {
            best = (index, candidate);
        }
    }
    best
}
