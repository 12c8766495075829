use tracing::{info, instrument};

use crate::core::models::cell::Cell;
use crate::core::models::forces::ForceBuffer;
use crate::core::models::registry::NodeRegistry;
use crate::engine::config::ContactMapConfig;
use crate::engine::error::EngineError;
use crate::engine::evaluator::{ContactEvaluator, EvaluationMode};
use crate::engine::matrix::AdjacencyMatrix;
use crate::engine::tasks::{Task, TaskTable};

/// The result of one contact-map construction cycle.
///
/// Holds the pair task list with its type-pair range table, the weighted
/// adjacency matrix, the accumulated forces when the cycle computed
/// derivatives, and the aggregate switching cutoff a spatial-pruning
/// collaborator (e.g. a neighbor-list builder) needs. Valid until the next
/// cycle replaces it.
#[derive(Debug, Clone)]
pub struct ContactMap {
    pub tasks: TaskTable,
    pub matrix: AdjacencyMatrix,
    pub forces: Option<ForceBuffer>,
    pub max_cutoff: f64,
    pub active_pairs: usize,
}

impl ContactMap {
    /// The committed weights of all pairs between two type groups.
    pub fn weights_between(
        &self,
        group_a: usize,
        group_b: usize,
    ) -> impl Iterator<Item = (Task, f64)> {
        self.matrix.block_weights(&self.tasks, group_a, group_b)
    }
}

/// Builds a contact map for the given nodes, cell and configuration.
///
/// The configured group list must match the registry's groups in order,
/// because a group's position is its type id on both sides. All failures are
/// fatal and occur before any evaluation work starts.
#[instrument(skip_all, name = "contact_map_workflow")]
pub fn run(
    registry: &NodeRegistry,
    cell: &Cell,
    config: &ContactMapConfig,
    mode: EvaluationMode,
) -> Result<ContactMap, EngineError> {
    if config.n_groups() != registry.n_groups() {
        return Err(EngineError::GroupCountMismatch {
            registry: registry.n_groups(),
            config: config.n_groups(),
        });
    }
    for (position, label) in config.groups().iter().enumerate() {
        if !registry.has_group(label) {
            return Err(EngineError::UnknownGroup(label.clone()));
        }
        let registered = registry.group(position).label();
        if registered != label {
            return Err(EngineError::GroupOrderMismatch {
                position,
                config: label.clone(),
                registry: registered.to_string(),
            });
        }
    }

    let switching = config.build_switching_matrix()?;
    for i in 0..switching.n_types() {
        for j in i..switching.n_types() {
            if let Some(function) = switching.get(i, j) {
                info!(
                    row = i + 1,
                    col = j + 1,
                    function = %function.description(),
                    "adjacency criterion between node groups"
                );
            }
        }
    }
    let max_cutoff = switching.max_cutoff();
    info!(max_cutoff, "aggregate switching cutoff for spatial pruning");

    let tasks = TaskTable::build(&registry.group_sizes());
    info!(
        n_nodes = registry.n_nodes(),
        n_tasks = tasks.len(),
        "pair task list constructed"
    );

    let output = ContactEvaluator::new(registry, cell, &switching, &tasks)
        .with_weight_tolerance(config.weight_tolerance())
        .run(mode)?;

    Ok(ContactMap {
        tasks,
        matrix: output.matrix,
        forces: output.forces,
        max_cutoff,
        active_pairs: output.active_pairs,
    })
}
