//! Binary-level error surface.

pub mod error;
