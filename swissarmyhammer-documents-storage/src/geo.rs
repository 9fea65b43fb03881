//! Geo points: `[longitude, latitude]` pairs stored as two-element float lists.

use swissarmyhammer_documents::{Field, List, Result, Value};

/// A list of exactly two floats.
pub fn geo_point_field() -> Result<Field> {
    Ok(Field::list(Field::float())?.with_length_range(Some(2), Some(2)))
}

/// Build a point value.
pub fn geo_point(longitude: f64, latitude: f64) -> Value {
    Value::List(List::from(vec![Value::from(longitude), Value::from(latitude)]))
}
