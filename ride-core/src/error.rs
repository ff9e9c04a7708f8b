//! Errors raised while building route data

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RouteError {
    #[error("route has no points")]
    NoPoints,

    #[error("route point {index} is at {distance:.1}m, before the previous point at {previous:.1}m")]
    NotAscending {
        index: usize,
        distance: f64,
        previous: f64,
    },

    #[error("video mapping entry {index} goes backwards (time {time:.2}s, distance {distance:.1}m)")]
    MappingNotAscending {
        index: usize,
        time: f64,
        distance: f64,
    },

    #[error("non-finite value in {field} at index {index}")]
    NonFinite { field: &'static str, index: usize },
}
