//! Linear model configuration.
//!
//! The config is a JSON document with a `classifier` section holding the class
//! list and the packed `beta` / `beta_bias` arrays, plus a decision
//! `threshold`. Loading decodes and validates everything up front; a
//! [`Classifier`] that exists always satisfies
//! `weights.rows == classes.len() == bias.len()`.

use std::collections::HashSet;
use std::path::Path;

use ndarray::{Array1, Array2};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::ConfigError;
use crate::codec::{self, Dtype};

/// Threshold used when the config does not give one.
pub const DEFAULT_THRESHOLD: f64 = 0.0;

/// Memory layout of the packed `beta` matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetaLayout {
    /// `classes × features`, row-major.
    #[default]
    ClassesByFeatures,
    /// `features × classes`, row-major (numpy's `(features, classes)` export).
    FeaturesByClasses,
}

/// Mapping applied to raw scores before thresholding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionFunction {
    #[default]
    Identity,
    Sigmoid,
}

/// Decision cutoff, shared by all classes or given per class.
#[derive(Debug, Clone, PartialEq)]
pub enum Threshold {
    Scalar(f64),
    PerClass(Vec<f64>),
}

impl Threshold {
    /// Cutoff for the class at `index` (in `classes` order).
    pub fn for_class(&self, index: usize) -> f64 {
        match self {
            Self::Scalar(t) => *t,
            Self::PerClass(ts) => ts[index],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawThreshold {
    Scalar(f64),
    PerClass(Vec<f64>),
}

impl From<RawThreshold> for Threshold {
    fn from(raw: RawThreshold) -> Self {
        match raw {
            RawThreshold::Scalar(t) => Self::Scalar(t),
            RawThreshold::PerClass(ts) => Self::PerClass(ts),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    classifier: Option<RawClassifier>,
    threshold: Option<RawThreshold>,
    #[serde(default)]
    metadata: Map<String, Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawClassifier {
    classes: Option<Vec<String>>,
    beta: Option<String>,
    beta_bias: Option<String>,
    #[serde(default)]
    dtype: Dtype,
    #[serde(default)]
    beta_layout: BetaLayout,
    #[serde(default)]
    decision_function: DecisionFunction,
    threshold: Option<RawThreshold>,
}

/// A loaded linear model: `scores = x · weightsᵀ + bias`.
///
/// Immutable once built. Scoring code borrows it; nothing mutates it.
#[derive(Debug, Clone)]
pub struct Classifier {
    classes: Vec<String>,
    weights: Array2<f64>,
    bias: Array1<f64>,
    threshold: Threshold,
    decision_function: DecisionFunction,
    metadata: Map<String, Value>,
}

impl Classifier {
    /// Build a classifier from already-decoded parts.
    ///
    /// `weights` is `classes × features`.
    pub fn new(
        classes: Vec<String>,
        weights: Array2<f64>,
        bias: Array1<f64>,
        threshold: Threshold,
    ) -> Result<Self, ConfigError> {
        validate_classes(&classes)?;
        let n_classes = classes.len();

        if weights.nrows() != n_classes {
            return Err(ConfigError::Invalid(format!(
                "weights have {} rows but there are {n_classes} classes",
                weights.nrows()
            )));
        }
        if weights.ncols() == 0 {
            return Err(ConfigError::Invalid("weights have zero columns".into()));
        }
        if bias.len() != n_classes {
            return Err(ConfigError::Invalid(format!(
                "bias has {} values but there are {n_classes} classes",
                bias.len()
            )));
        }
        validate_threshold(&threshold, n_classes)?;

        Ok(Self {
            classes,
            weights,
            bias,
            threshold,
            decision_function: DecisionFunction::Identity,
            metadata: Map::new(),
        })
    }

    pub fn with_decision_function(mut self, decision_function: DecisionFunction) -> Self {
        self.decision_function = decision_function;
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Read and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Parse and validate a JSON config document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(text)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let section = raw
            .classifier
            .ok_or(ConfigError::MissingField("classifier"))?;
        let classes = section
            .classes
            .ok_or(ConfigError::MissingField("classifier.classes"))?;
        let beta = section
            .beta
            .ok_or(ConfigError::MissingField("classifier.beta"))?;
        let beta_bias = section
            .beta_bias
            .ok_or(ConfigError::MissingField("classifier.beta_bias"))?;

        validate_classes(&classes)?;
        let n_classes = classes.len();
        let dtype = section.dtype;

        // D is whatever is left once the class count is divided out.
        let n_weights = codec::element_count(&beta, dtype).map_err(|source| ConfigError::Codec {
            field: "classifier.beta",
            source,
        })?;
        if n_weights == 0 || n_weights % n_classes != 0 {
            return Err(ConfigError::Invalid(format!(
                "beta holds {n_weights} values, which is not a whole number of rows for {n_classes} classes"
            )));
        }
        let dim = n_weights / n_classes;

        let decode_beta = |shape| {
            codec::decode(&beta, shape, dtype).map_err(|source| ConfigError::Codec {
                field: "classifier.beta",
                source,
            })
        };
        let weights = match section.beta_layout {
            BetaLayout::ClassesByFeatures => decode_beta((n_classes, dim))?,
            BetaLayout::FeaturesByClasses => decode_beta((dim, n_classes))?
                .reversed_axes()
                .as_standard_layout()
                .into_owned(),
        };

        let n_bias = codec::element_count(&beta_bias, dtype).map_err(|source| {
            ConfigError::Codec {
                field: "classifier.beta_bias",
                source,
            }
        })?;
        if n_bias != n_classes {
            return Err(ConfigError::Invalid(format!(
                "beta_bias has {n_bias} values but there are {n_classes} classes"
            )));
        }
        let bias = codec::decode(&beta_bias, (1, n_classes), dtype)
            .map_err(|source| ConfigError::Codec {
                field: "classifier.beta_bias",
                source,
            })?
            .row(0)
            .to_owned();

        let threshold = match raw.threshold.or(section.threshold) {
            Some(t) => Threshold::from(t),
            None => {
                warn!(
                    default = DEFAULT_THRESHOLD,
                    "config has no threshold, using default"
                );
                Threshold::Scalar(DEFAULT_THRESHOLD)
            }
        };

        let mut metadata = raw.metadata;
        metadata.extend(raw.extra);

        debug!(
            classes = n_classes,
            dim,
            %dtype,
            layout = ?section.beta_layout,
            "decoded classifier parameters"
        );

        Ok(Self::new(classes, weights, bias, threshold)?
            .with_decision_function(section.decision_function)
            .with_metadata(metadata))
    }

    /// Class names in column order.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// `classes × features` weight matrix.
    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    pub fn bias(&self) -> &Array1<f64> {
        &self.bias
    }

    pub fn threshold(&self) -> &Threshold {
        &self.threshold
    }

    pub fn decision_function(&self) -> DecisionFunction {
        self.decision_function
    }

    /// Free-form model properties, carried through untouched.
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Expected embedding dimensionality (D).
    pub fn dim(&self) -> usize {
        self.weights.ncols()
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }
}

fn validate_classes(classes: &[String]) -> Result<(), ConfigError> {
    if classes.is_empty() {
        return Err(ConfigError::Invalid("classes must not be empty".into()));
    }
    let mut seen = HashSet::with_capacity(classes.len());
    for class in classes {
        if class.trim().is_empty() {
            return Err(ConfigError::Invalid("class names must not be blank".into()));
        }
        if !seen.insert(class.as_str()) {
            return Err(ConfigError::Invalid(format!("duplicate class '{class}'")));
        }
    }
    Ok(())
}

fn validate_threshold(threshold: &Threshold, n_classes: usize) -> Result<(), ConfigError> {
    let values: &[f64] = match threshold {
        Threshold::Scalar(t) => std::slice::from_ref(t),
        Threshold::PerClass(ts) => {
            if ts.len() != n_classes {
                return Err(ConfigError::Invalid(format!(
                    "threshold has {} values but there are {n_classes} classes",
                    ts.len()
                )));
            }
            ts
        }
    };
    if values.iter().any(|t| t.is_nan()) {
        return Err(ConfigError::Invalid("threshold must not be NaN".into()));
    }
    Ok(())
}
