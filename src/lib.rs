// Library root for primitive-art
//
// Approximates an image with a sequence of semi-transparent geometric shapes, added one
// at a time by parallel hill climbing.
//
// Layers, bottom up:
//   raster   - spans and the polygon filler
//   shapes   - shape variants, their mutation and rasterization
//   painting - optimal color, blending, span copies
//   fitness  - full and incremental RMS scores
//   worker   - one searcher's random restarts and hill climbing
//   model    - the round loop that commits the best candidate
//   export   - SVG and scaled raster output

pub mod error;
pub mod export;
pub mod fitness;
pub mod model;
pub mod painting;
pub mod raster;
pub mod shapes;
pub mod worker;

// Re-export commonly used types at the library root, so users can write
//   use primitive_art::Model;
// instead of
//   use primitive_art::model::Model;
pub use error::{ModelError, ModelResult};
pub use model::{CommittedShape, Model, ModelParams};
pub use painting::{average_color, Color};
pub use raster::{Rasterizer, Scanline};
pub use shapes::{Shape, ShapeKind};
pub use worker::Alpha;
