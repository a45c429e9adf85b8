// Local search: one worker's share of a round
//
// A worker runs several random restarts, hill-climbs each one, and reports the best shape it
// found. It never touches the canonical canvas. Every evaluation draws into the worker's own
// buffer and restores the touched spans afterwards, so the buffer always equals the canvas
// between evaluations.

use image::RgbaImage;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::fitness::difference_partial;
use crate::model::ModelParams;
use crate::painting::{compute_color, copy_lines, draw_lines, Color};
use crate::raster::Rasterizer;
use crate::shapes::{Shape, ShapeKind};

/// Alpha starting value for each trial in [`Alpha::Random`] mode
const RANDOM_ALPHA_START: u8 = 128;

/// Largest alpha step per mutation in [`Alpha::Random`] mode
const RANDOM_ALPHA_STEP: i32 = 10;

/// How shape opacity is chosen
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Alpha {
    /// Every shape uses this alpha
    Fixed(u8),
    /// Alpha is searched along with the geometry
    Random,
}

impl Default for Alpha {
    fn default() -> Self {
        Alpha::Fixed(128)
    }
}

/// The best shape one worker found in a round
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub shape: Shape,
    pub color: Color,
    /// Score of the canvas with this shape drawn on it
    pub score: f64,
}

/// Seed for worker `index`, derived from the run's master seed
///
/// SplitMix64 finalizer over the master seed offset by the index, so neighboring workers
/// get unrelated streams.
pub fn derive_seed(master: u64, index: usize) -> u64 {
    let mut z = master.wrapping_add((index as u64 + 1).wrapping_mul(0x9e37_79b9_7f4a_7c15));
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Search state: the geometry plus the alpha it is evaluated with
#[derive(Clone, Debug)]
struct State {
    shape: Shape,
    alpha: u8,
}

/// One parallel searcher
///
/// Owns its random stream and all scratch memory, so workers share nothing mutable during a
/// round.
pub struct Worker {
    index: usize,
    width: i32,
    height: i32,
    rng: Pcg32,
    buffer: RgbaImage,
    rast: Rasterizer,
    evaluations: u64,
}

impl Worker {
    /// Worker `index` of a `width` x `height` model, seeded with `seed`
    ///
    /// The index only labels log output; the seed alone drives the search.
    pub fn new(index: usize, width: u32, height: u32, seed: u64) -> Self {
        Self {
            index,
            width: width as i32,
            height: height as i32,
            rng: Pcg32::seed_from_u64(seed),
            buffer: RgbaImage::new(width, height),
            rast: Rasterizer::new(width, height),
            evaluations: 0,
        }
    }

    /// Total energy evaluations performed so far
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    /// Search for the best next shape on `current`, whose score against `target` is `score`
    ///
    /// Runs `trials_per_worker` restarts (at least one) and returns the lowest-energy result.
    /// On return the private buffer matches `current` again.
    pub fn run_round(
        &mut self,
        target: &RgbaImage,
        current: &RgbaImage,
        score: f64,
        params: &ModelParams,
    ) -> Candidate {
        if self.buffer.dimensions() == current.dimensions() {
            self.buffer.copy_from_slice(current.as_raw());
        } else {
            self.buffer = current.clone();
        }

        // At least one trial always runs
        let mut best = self.trial(target, current, score, params);
        for _ in 1..params.trials_per_worker {
            let found = self.trial(target, current, score, params);
            if found.score < best.score {
                best = found;
            }
        }
        tracing::trace!(
            worker = self.index,
            kind = best.shape.kind().name(),
            score = best.score,
            evaluations = self.evaluations,
            "worker round finished"
        );
        best
    }

    /// One random restart followed by hill climbing
    fn trial(
        &mut self,
        target: &RgbaImage,
        current: &RgbaImage,
        score: f64,
        params: &ModelParams,
    ) -> Candidate {
        let kind = params
            .shape_kinds
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(ShapeKind::Triangle);
        let state = State {
            shape: Shape::random(kind, self.width, self.height, &mut self.rng),
            alpha: match params.alpha {
                Alpha::Fixed(a) => a,
                Alpha::Random => RANDOM_ALPHA_START,
            },
        };
        self.hill_climb(
            target,
            current,
            score,
            state,
            params.alpha,
            params.iterations_per_trial,
        )
    }

    /// Greedy hill climbing: keep a mutation only if it strictly lowers the score
    fn hill_climb(
        &mut self,
        target: &RgbaImage,
        current: &RgbaImage,
        score: f64,
        mut state: State,
        alpha: Alpha,
        iterations: usize,
    ) -> Candidate {
        let (mut color, mut energy) = self.energy(target, current, score, &state);
        for _ in 0..iterations {
            let mut next = state.clone();
            self.mutate(&mut next, alpha);
            let (next_color, next_energy) = self.energy(target, current, score, &next);
            if next_energy < energy {
                state = next;
                color = next_color;
                energy = next_energy;
            }
        }
        Candidate {
            shape: state.shape,
            color,
            score: energy,
        }
    }

    fn mutate(&mut self, state: &mut State, alpha: Alpha) {
        state.shape.mutate(self.width, self.height, &mut self.rng);
        if alpha == Alpha::Random {
            let step = self.rng.gen_range(-RANDOM_ALPHA_STEP..=RANDOM_ALPHA_STEP);
            state.alpha = (state.alpha as i32 + step).clamp(1, 255) as u8;
        }
    }

    /// Score of `current` with the state drawn on it in its optimal color
    ///
    /// Draws into the private buffer, scores the touched spans, then copies those spans back
    /// from `current`.
    fn energy(
        &mut self,
        target: &RgbaImage,
        current: &RgbaImage,
        score: f64,
        state: &State,
    ) -> (Color, f64) {
        self.evaluations += 1;
        let lines = state.shape.rasterize(&mut self.rast);
        let color = compute_color(target, current, lines, state.alpha);
        draw_lines(&mut self.buffer, color, lines);
        let energy = difference_partial(target, current, &self.buffer, score, lines);
        copy_lines(&mut self.buffer, current, lines);
        (color, energy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitness::difference_full;
    use image::Rgba;

    fn split_target(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgba([220, 30, 30, 255])
            } else {
                Rgba([20, 40, 200, 255])
            }
        })
    }

    fn small_params() -> ModelParams {
        ModelParams {
            worker_count: 1,
            trials_per_worker: 3,
            iterations_per_trial: 40,
            ..ModelParams::default()
        }
    }

    #[test]
    fn test_derive_seed_is_stable_and_distinct() {
        assert_eq!(derive_seed(5, 0), derive_seed(5, 0));
        assert_ne!(derive_seed(5, 0), derive_seed(5, 1));
        assert_ne!(derive_seed(5, 0), derive_seed(6, 0));
    }

    #[test]
    fn test_round_leaves_buffer_equal_to_canvas() {
        let target = split_target(32, 24);
        let canvas = RgbaImage::from_pixel(32, 24, Rgba([0, 0, 0, 255]));
        let score = difference_full(&target, &canvas);

        let mut worker = Worker::new(0, 32, 24, 11);
        worker.run_round(&target, &canvas, score, &small_params());
        assert_eq!(worker.buffer, canvas);
        // 3 trials x (1 start + 40 iterations)
        assert_eq!(worker.evaluations(), 123);
    }

    #[test]
    fn test_candidate_score_matches_full_redraw() {
        let target = split_target(40, 30);
        let canvas = RgbaImage::from_pixel(40, 30, Rgba([90, 90, 90, 255]));
        let score = difference_full(&target, &canvas);

        let mut worker = Worker::new(0, 40, 30, 3);
        let candidate = worker.run_round(&target, &canvas, score, &small_params());

        let mut rast = Rasterizer::new(40, 30);
        let mut after = canvas.clone();
        draw_lines(&mut after, candidate.color, candidate.shape.rasterize(&mut rast));
        let full = difference_full(&target, &after);
        assert!((candidate.score - full).abs() < 1e-9);
        assert!(candidate.score < score);
    }

    #[test]
    fn test_same_seed_same_candidate() {
        let target = split_target(30, 30);
        let canvas = RgbaImage::from_pixel(30, 30, Rgba([0, 0, 0, 255]));
        let score = difference_full(&target, &canvas);
        let params = ModelParams {
            shape_kinds: ShapeKind::ALL.to_vec(),
            ..small_params()
        };

        let a = Worker::new(0, 30, 30, 99).run_round(&target, &canvas, score, &params);
        let b = Worker::new(0, 30, 30, 99).run_round(&target, &canvas, score, &params);
        assert_eq!(a, b);
    }

    #[test]
    fn test_random_alpha_stays_in_range() {
        let target = split_target(30, 20);
        let canvas = RgbaImage::from_pixel(30, 20, Rgba([255, 255, 255, 255]));
        let score = difference_full(&target, &canvas);
        let params = ModelParams {
            alpha: Alpha::Random,
            ..small_params()
        };

        let mut worker = Worker::new(2, 30, 20, 8);
        for _ in 0..5 {
            let candidate = worker.run_round(&target, &canvas, score, &params);
            assert!(candidate.color.a >= 1, "{:?}", candidate);
        }
    }

    #[test]
    fn test_fixed_alpha_is_used() {
        let target = split_target(30, 20);
        let canvas = RgbaImage::from_pixel(30, 20, Rgba([0, 0, 0, 255]));
        let score = difference_full(&target, &canvas);
        let params = ModelParams {
            alpha: Alpha::Fixed(200),
            shape_kinds: vec![ShapeKind::Rectangle],
            ..small_params()
        };

        let candidate = Worker::new(0, 30, 20, 1).run_round(&target, &canvas, score, &params);
        assert_eq!(candidate.color.a, 200);
        assert_eq!(candidate.shape.kind(), ShapeKind::Rectangle);
    }
}
