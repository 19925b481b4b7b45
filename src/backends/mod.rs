//! Execution backends
//!
//! The serial reference lives on [`crate::Matrix`]; this module holds the
//! GPU path.

pub mod gpu;
