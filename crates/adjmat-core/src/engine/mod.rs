//! # Engine Module
//!
//! The stateful evaluation layer that turns a configured node system into an
//! adjacency matrix, once per evaluation cycle.
//!
//! ## Overview
//!
//! The engine enumerates candidate node pairs as a flat task list
//! ([`tasks`]), evaluates each task's switching-function weight and, when the
//! cycle requires it, the analytic derivatives ([`evaluator`]), and collects
//! the results in a per-cycle vessel ([`matrix`]). Configuration parsing and
//! validation live in [`config`]; all failure modes are fatal and surface
//! through [`error`].
//!
//! - **Configuration** ([`config`]) - group list, switching specifications,
//!   keyword and TOML input forms
//! - **Task bookkeeping** ([`tasks`]) - pair enumeration with contiguous
//!   per-type-pair ranges
//! - **Result vessel** ([`matrix`]) - per-task weights and derivative blocks
//! - **Pair evaluation** ([`evaluator`]) - the two-phase weight/derivative
//!   protocol
//! - **Error handling** ([`error`]) - engine-wide error type

pub mod config;
pub mod error;
pub mod evaluator;
pub mod matrix;
pub mod tasks;
