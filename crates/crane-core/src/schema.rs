//! Arrow schemas for classifier output.

use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};

/// Name of the leading output column.
pub const IDENTIFIER_COLUMN: &str = "identifier";

pub fn score_column(class: &str) -> String {
    format!("{class}_score")
}

pub fn decision_column(class: &str) -> String {
    format!("{class}_decision")
}

/// Output schema: `identifier`, then `<class>_score`, `<class>_decision` per
/// class in `classes` order. Decisions are nullable (undefined for NaN scores).
pub fn result_schema(classes: &[String]) -> SchemaRef {
    let mut fields = Vec::with_capacity(1 + 2 * classes.len());
    fields.push(Field::new(IDENTIFIER_COLUMN, DataType::Utf8, false));
    for class in classes {
        fields.push(Field::new(score_column(class), DataType::Float64, false));
        fields.push(Field::new(decision_column(class), DataType::Boolean, true));
    }
    Arc::new(Schema::new(fields))
}
