pub mod codec;
pub mod config;
mod error;
pub mod record;
pub mod schema;

pub use codec::Dtype;
pub use config::{BetaLayout, Classifier, DecisionFunction, Threshold};
pub use error::{CodecError, ConfigError};
pub use record::{EmbeddingRecord, ScoreResult};
