//! # Switching Module
//!
//! Smooth, cutoff-bounded distance-decay functions and their type-pair
//! matrix.
//!
//! A switching function maps an inter-node distance to a weight in [0, 1]
//! that is exactly 1 at zero separation and exactly 0 at and beyond its
//! cutoff distance, together with the analytic derivative needed for force
//! propagation. The [`matrix`] submodule stores one function per unordered
//! pair of node types and reports the aggregate cutoff used for spatial
//! pruning.

pub mod function;
pub mod matrix;
