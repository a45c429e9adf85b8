/// Convenience result type for model construction.
pub type ModelResult<T> = Result<T, ModelError>;

/// Configuration problems detected when a [`Model`](crate::Model) is built.
///
/// Once a model exists every operation on it is total.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// The starting canvas must match the target exactly.
    #[error("canvas is {canvas_width}x{canvas_height} but target is {target_width}x{target_height}")]
    DimensionMismatch {
        target_width: u32,
        target_height: u32,
        canvas_width: u32,
        canvas_height: u32,
    },

    #[error("target image is empty ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("no shape kinds configured")]
    NoShapeKinds,

    #[error("worker count must be at least 1")]
    NoWorkers,

    /// A fixed alpha of zero would make every shape invisible.
    #[error("fixed alpha must be in 1..=255")]
    ZeroAlpha,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ModelError::DimensionMismatch {
            target_width: 10,
            target_height: 20,
            canvas_width: 5,
            canvas_height: 5,
        };
        assert_eq!(err.to_string(), "canvas is 5x5 but target is 10x20");
        assert_eq!(
            ModelError::EmptyImage {
                width: 0,
                height: 3
            }
            .to_string(),
            "target image is empty (0x3)"
        );
    }
}
