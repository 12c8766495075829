//! # Core Models Module
//!
//! Data structures describing the inputs and accumulation targets of a
//! contact-matrix evaluation.
//!
//! - [`cell`] - the periodic simulation cell and minimum-image displacements
//! - [`registry`] - node groups and the capability surface over node sources
//! - [`forces`] - the per-particle derivative accumulation buffer

pub mod cell;
pub mod forces;
pub mod registry;
