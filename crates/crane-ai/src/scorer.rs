//! Batch scoring for linear classifiers.
//!
//! A batch of N embeddings is stacked into an N×D matrix and projected through
//! the C×D weight matrix, giving an N×C score matrix:
//! `scores = X · Wᵀ + bias`. Each score is then passed through the model's
//! decision function and compared against its class threshold.

use crane_core::{Classifier, DecisionFunction, EmbeddingRecord, ScoreResult};
use ndarray::{Array2, ArrayView1, Axis, Zip};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("record '{identifier}' has {actual} values, expected {expected}")]
    DimensionMismatch {
        identifier: String,
        expected: usize,
        actual: usize,
    },
}

/// Applies a borrowed [`Classifier`] to batches of records.
///
/// Holds no state of its own, so one scorer (or many) can share a classifier
/// across threads.
#[derive(Debug, Clone, Copy)]
pub struct Scorer<'a> {
    classifier: &'a Classifier,
}

impl<'a> Scorer<'a> {
    pub fn new(classifier: &'a Classifier) -> Self {
        Self { classifier }
    }

    /// Score a batch, returning one result per record in input order.
    ///
    /// The batch is consumed: identifiers move into the results.
    pub fn score(&self, batch: Vec<EmbeddingRecord>) -> Result<Vec<ScoreResult>, ScoreError> {
        let dim = self.classifier.dim();
        let mut x = Array2::<f64>::zeros((batch.len(), dim));
        for (mut row, record) in x.axis_iter_mut(Axis(0)).zip(&batch) {
            if record.vector.len() != dim {
                return Err(ScoreError::DimensionMismatch {
                    identifier: record.identifier.clone(),
                    expected: dim,
                    actual: record.vector.len(),
                });
            }
            row.assign(&ArrayView1::from(record.vector.as_slice()));
        }

        let scores = self.project(&x);

        Ok(batch
            .into_iter()
            .zip(scores.axis_iter(Axis(0)))
            .map(|(record, row)| {
                let (scores, decisions) = self.decide(row);
                ScoreResult {
                    identifier: record.identifier,
                    scores,
                    decisions,
                }
            })
            .collect())
    }

    /// Score a single vector. Returns `(scores, decisions)` in class order.
    pub fn score_one(&self, vector: &[f64]) -> Result<(Vec<f64>, Vec<Option<bool>>), ScoreError> {
        let dim = self.classifier.dim();
        if vector.len() != dim {
            return Err(ScoreError::DimensionMismatch {
                identifier: String::new(),
                expected: dim,
                actual: vector.len(),
            });
        }
        let x = ArrayView1::from(vector).insert_axis(Axis(0));
        let scores = self.project(&x.to_owned());
        Ok(self.decide(scores.row(0)))
    }

    /// `X · Wᵀ + bias`, with the decision function applied.
    ///
    /// Every cell is its own dot product over D, so a record's scores do not
    /// depend on which other records share its batch.
    fn project(&self, x: &Array2<f64>) -> Array2<f64> {
        let weights = self.classifier.weights();
        let bias = self.classifier.bias();
        let activation = self.classifier.decision_function();

        let mut scores = Array2::<f64>::zeros((x.nrows(), weights.nrows()));
        Zip::from(scores.rows_mut())
            .and(x.rows())
            .for_each(|out, input| {
                Zip::from(out)
                    .and(weights.rows())
                    .and(bias)
                    .for_each(|score, w, &b| {
                        *score = activate(activation, input.dot(&w) + b);
                    });
            });
        scores
    }

    fn decide(&self, scores: ArrayView1<'_, f64>) -> (Vec<f64>, Vec<Option<bool>>) {
        let threshold = self.classifier.threshold();
        let decisions = scores
            .iter()
            .enumerate()
            .map(|(class, &score)| {
                if score.is_nan() {
                    None
                } else {
                    Some(score >= threshold.for_class(class))
                }
            })
            .collect();
        (scores.to_vec(), decisions)
    }
}

/// Map a raw score through the decision function.
pub fn activate(function: DecisionFunction, x: f64) -> f64 {
    match function {
        DecisionFunction::Identity => x,
        DecisionFunction::Sigmoid => {
            // Split on sign so exp() never overflows.
            if x >= 0.0 {
                1.0 / (1.0 + (-x).exp())
            } else {
                let e = x.exp();
                e / (1.0 + e)
            }
        }
    }
}
