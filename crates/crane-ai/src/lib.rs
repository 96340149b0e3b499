//! Inference layer: affine scoring and thresholding of embedding batches.

pub mod scorer;

pub use scorer::{ScoreError, Scorer};
