//! Ready-made edge cost functions for the path engine.

use crate::storage::Attrs;

/// Cost read from a numeric edge attribute. Edges without it, or with a
/// non-numeric value, are impassable.
pub fn attribute(key: &str) -> impl Fn(&str, &str, &Attrs) -> Option<f64> + '_ {
    move |_, _, attrs| attrs.get(key).and_then(|v| v.as_f64())
}

/// Every edge costs 1, so distances count hops.
pub fn unit() -> impl Fn(&str, &str, &Attrs) -> Option<f64> {
    |_, _, _| Some(1.0)
}
