//! Predicates used by the standard number pipeline.

use crate::Value;

/// Keeps strictly positive values; zero and negatives are dropped
pub fn is_positive(value: &Value) -> bool {
    *value > 0
}

/// Keeps values that are not multiples of three
pub fn is_not_multiple_of_three(value: &Value) -> bool {
    value % 3 != 0
}
