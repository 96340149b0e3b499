//! Records flowing through the pipeline.

/// One embedding vector read from input, keyed by where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub identifier: String,
    pub vector: Vec<f64>,
}

impl EmbeddingRecord {
    pub fn new(identifier: impl Into<String>, vector: Vec<f64>) -> Self {
        Self {
            identifier: identifier.into(),
            vector,
        }
    }
}

/// Scores and decisions for one record, in `classes` order.
///
/// A decision is `None` when its score is NaN: the comparison has no answer,
/// and reporting `false` would hide a broken model.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResult {
    pub identifier: String,
    pub scores: Vec<f64>,
    pub decisions: Vec<Option<bool>>,
}

impl ScoreResult {
    /// Number of classes whose decision is undefined.
    pub fn undefined_decisions(&self) -> usize {
        self.decisions.iter().filter(|d| d.is_none()).count()
    }
}
