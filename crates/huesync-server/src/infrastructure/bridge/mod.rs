//! Bridge client implementations.

pub mod simulated;
