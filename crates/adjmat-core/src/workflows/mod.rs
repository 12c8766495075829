//! # Workflows Module
//!
//! High-level entry points tying the core models and the engine together.
//!
//! A workflow owns the full construction of one contact map: it validates
//! the configuration against the node registry, builds the switching matrix
//! and the pair task list, runs the requested evaluation phase, and hands
//! back everything a downstream consumer needs in one result struct.
//!
//! - **Contact map construction** ([`contact`]) - the weighted adjacency
//!   matrix with optional derivatives

pub mod contact;
