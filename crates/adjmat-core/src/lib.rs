//! # adjmat
//!
//! A library for building sparse, analytically differentiable contact
//! (adjacency) matrices between point-like nodes in particle simulations.
//!
//! Given a set of nodes partitioned into type groups, `adjmat` evaluates a
//! smooth, cutoff-bounded switching function of the minimum-image distance
//! for every node pair, and optionally propagates the analytic derivatives of
//! those weights — per-node force contributions and the 3×3 virial — to a
//! per-particle accumulation buffer for downstream consumers.
//!
//! ## Architectural Philosophy
//!
//! The library is organized into three layers with a strict separation of
//! concerns:
//!
//! - **[`core`]: The Foundation.** Stateless data models and pure math: the
//!   node registry, the periodic cell with minimum-image displacements,
//!   switching functions and the symmetric type-pair switching matrix, and
//!   the force accumulation arena.
//!
//! - **[`engine`]: The Logic Core.** The stateful evaluation layer: task
//!   bookkeeping over node pairs, configuration parsing, the adjacency
//!   matrix vessel produced each cycle, and the two-phase pair evaluator
//!   (weights only, or weights plus derivatives).
//!
//! - **[`workflows`]: The Public API.** The highest-level entry point, tying
//!   a node registry, a cell, and a configuration together into a single
//!   contact-map construction call.

pub mod core;
pub mod engine;
pub mod workflows;
