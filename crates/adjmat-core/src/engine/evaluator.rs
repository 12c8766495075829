use tracing::{debug, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::error::EngineError;
use super::matrix::{AdjacencyMatrix, PairDerivatives};
use super::tasks::TaskTable;
use crate::core::models::cell::Cell;
use crate::core::models::forces::ForceBuffer;
use crate::core::models::registry::NodeRegistry;
use crate::core::switching::matrix::{SwitchingMatrix, SwitchingMatrixError};

/// Which phase an evaluation cycle runs in.
///
/// The phase is an explicit input to every cycle rather than ambient state:
/// a weight-only pass never computes or stores derivative terms, while a
/// derivative pass additionally deposits forces and the virial for every
/// pair whose weight clears the tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationMode {
    Weights,
    WithDerivatives,
}

/// The product of one evaluation cycle.
#[derive(Debug, Clone)]
pub struct EvaluationOutput {
    pub matrix: AdjacencyMatrix,
    /// Present only for [`EvaluationMode::WithDerivatives`] cycles.
    pub forces: Option<ForceBuffer>,
    /// Pairs that cleared the tolerance and had derivatives deposited.
    pub active_pairs: usize,
}

/// Evaluates every pair task against the switching matrix.
///
/// Each task depends only on its two endpoint nodes and the shared read-only
/// switching matrix, so tasks are mapped independently (in parallel when the
/// `parallel` feature is on). The one shared mutable target, the force
/// buffer, is filled in a sequential reduction pass after the map: force
/// deposition is plain addition, so the order does not matter, and no
/// per-node synchronization is needed.
pub struct ContactEvaluator<'a> {
    registry: &'a NodeRegistry,
    cell: &'a Cell,
    switching: &'a SwitchingMatrix,
    tasks: &'a TaskTable,
    weight_tolerance: f64,
}

impl<'a> ContactEvaluator<'a> {
    pub fn new(
        registry: &'a NodeRegistry,
        cell: &'a Cell,
        switching: &'a SwitchingMatrix,
        tasks: &'a TaskTable,
    ) -> Self {
        Self {
            registry,
            cell,
            switching,
            tasks,
            weight_tolerance: 0.0,
        }
    }

    /// Sets the weight at or below which Phase D skips a pair entirely: the
    /// pair keeps its committed weight but gets no derivative block and
    /// deposits nothing.
    pub fn with_weight_tolerance(mut self, tolerance: f64) -> Self {
        self.weight_tolerance = tolerance;
        self
    }

    /// Runs one evaluation cycle, producing a fresh vessel.
    #[instrument(skip(self), name = "contact_evaluation", fields(n_tasks = self.tasks.len()))]
    pub fn run(&self, mode: EvaluationMode) -> Result<EvaluationOutput, EngineError> {
        let evaluate = |index: usize| self.evaluate_task(index, mode);

        #[cfg(feature = "parallel")]
        let results = (0..self.tasks.len())
            .into_par_iter()
            .map(evaluate)
            .collect::<Result<Vec<_>, SwitchingMatrixError>>()?;
        #[cfg(not(feature = "parallel"))]
        let results = (0..self.tasks.len())
            .map(evaluate)
            .collect::<Result<Vec<_>, SwitchingMatrixError>>()?;

        let mut matrix = AdjacencyMatrix::new(self.tasks.len());
        let mut forces = match mode {
            EvaluationMode::Weights => None,
            EvaluationMode::WithDerivatives => {
                Some(ForceBuffer::new(self.registry.n_particles()))
            }
        };

        let mut active_pairs = 0;
        for (index, (weight, derivatives)) in results.into_iter().enumerate() {
            if let (Some(block), Some(buffer)) = (&derivatives, forces.as_mut()) {
                let task = self.tasks.task(index);
                self.registry.deposit(task.row, block.on_row, buffer);
                self.registry.deposit(task.col, block.on_col, buffer);
                buffer.add_virial(block.virial);
                active_pairs += 1;
            }
            matrix.commit(index, weight, derivatives)?;
        }
        debug!(active_pairs, "evaluation cycle complete");

        Ok(EvaluationOutput {
            matrix,
            forces,
            active_pairs,
        })
    }

    fn evaluate_task(
        &self,
        index: usize,
        mode: EvaluationMode,
    ) -> Result<(f64, Option<PairDerivatives>), SwitchingMatrixError> {
        let task = self.tasks.task(index);
        let displacement = self.cell.minimum_image(
            &self.registry.position_of(task.row),
            &self.registry.position_of(task.col),
        );
        let (weight, dfunc) = self.switching.evaluate(
            self.registry.type_of(task.row),
            self.registry.type_of(task.col),
            displacement.norm(),
        )?;

        if mode == EvaluationMode::Weights || weight <= self.weight_tolerance {
            return Ok((weight, None));
        }

        let on_col = dfunc * displacement;
        let derivatives = PairDerivatives {
            on_row: -on_col,
            on_col,
            virial: -dfunc * (displacement * displacement.transpose()),
        };
        Ok((weight, Some(derivatives)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::switching::function::SwitchingFunction;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Vector3};

    const SPEC: &str = "RATIONAL R_0=1.0 NN=6 MM=12 D_MAX=1.5";

    fn single_type_switching() -> SwitchingMatrix {
        let mut switching = SwitchingMatrix::new(1);
        switching
            .set(0, 0, SwitchingFunction::parse(SPEC).unwrap())
            .unwrap();
        switching
    }

    fn four_node_registry() -> NodeRegistry {
        let mut registry = NodeRegistry::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
            Point3::new(3.0, 3.0, 3.0),
        ]);
        registry.add_particle_group("all", 0..4).unwrap();
        registry
    }

    fn two_node_registry(p0: Point3<f64>, p1: Point3<f64>) -> NodeRegistry {
        let mut registry = NodeRegistry::new(vec![p0, p1]);
        registry.add_particle_group("all", 0..2).unwrap();
        registry
    }

    #[test]
    fn four_nodes_produce_six_tasks_with_one_contact() {
        let registry = four_node_registry();
        let cell = Cell::free();
        let switching = single_type_switching();
        let tasks = TaskTable::build(&registry.group_sizes());
        assert_eq!(tasks.len(), 6);

        let output = ContactEvaluator::new(&registry, &cell, &switching, &tasks)
            .run(EvaluationMode::Weights)
            .unwrap();

        // Task 0 is the pair (1, 0) at distance 1.0, inside the cutoff.
        let contact = output.matrix.weight(0).unwrap();
        assert!(contact > 0.0 && contact < 1.0);
        // Every other pair sits beyond 1.5.
        for index in 1..tasks.len() {
            assert_eq!(output.matrix.weight(index).unwrap(), 0.0);
        }
        assert!(output.forces.is_none());
    }

    #[test]
    fn weight_only_cycles_leave_derivatives_unavailable() {
        let registry = four_node_registry();
        let cell = Cell::free();
        let switching = single_type_switching();
        let tasks = TaskTable::build(&registry.group_sizes());

        let output = ContactEvaluator::new(&registry, &cell, &switching, &tasks)
            .run(EvaluationMode::Weights)
            .unwrap();
        for index in 0..tasks.len() {
            assert!(!output.matrix.has_derivatives(index));
        }
        assert_eq!(output.active_pairs, 0);
    }

    #[test]
    fn derivative_cycle_deposits_forces_for_contacts_only() {
        let registry = four_node_registry();
        let cell = Cell::free();
        let switching = single_type_switching();
        let tasks = TaskTable::build(&registry.group_sizes());

        let output = ContactEvaluator::new(&registry, &cell, &switching, &tasks)
            .run(EvaluationMode::WithDerivatives)
            .unwrap();
        assert_eq!(output.active_pairs, 1);
        assert!(output.matrix.has_derivatives(0));
        for index in 1..tasks.len() {
            assert!(!output.matrix.has_derivatives(index));
        }

        let forces = output.forces.unwrap();
        // Nodes 2 and 3 have no contacts, so nothing lands on them.
        assert_eq!(forces.force(2), Vector3::zeros());
        assert_eq!(forces.force(3), Vector3::zeros());
        assert!(forces.force(0).norm() > 0.0);
    }

    #[test]
    fn pair_forces_are_exact_negations() {
        let registry = two_node_registry(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.7, 0.4, -0.3),
        );
        let cell = Cell::free();
        let switching = single_type_switching();
        let tasks = TaskTable::build(&registry.group_sizes());

        let output = ContactEvaluator::new(&registry, &cell, &switching, &tasks)
            .run(EvaluationMode::WithDerivatives)
            .unwrap();
        let block = output.matrix.derivatives(0).unwrap();
        assert_eq!(block.on_row, -block.on_col);

        // The pair's net contribution cancels exactly.
        let forces = output.forces.unwrap();
        assert_eq!(forces.force(0) + forces.force(1), Vector3::zeros());
    }

    #[test]
    fn virial_contribution_is_symmetric() {
        let registry = two_node_registry(
            Point3::new(0.1, -0.2, 0.3),
            Point3::new(0.9, 0.5, -0.1),
        );
        let cell = Cell::free();
        let switching = single_type_switching();
        let tasks = TaskTable::build(&registry.group_sizes());

        let output = ContactEvaluator::new(&registry, &cell, &switching, &tasks)
            .run(EvaluationMode::WithDerivatives)
            .unwrap();
        let virial = output.matrix.derivatives(0).unwrap().virial;
        assert_eq!(virial, virial.transpose());
    }

    #[test]
    fn deposited_gradient_matches_a_finite_difference_of_the_weight() {
        let p0 = Point3::new(0.0, 0.0, 0.0);
        let p1 = Point3::new(1.1, 0.3, -0.2);
        let cell = Cell::free();
        let switching = single_type_switching();

        let registry = two_node_registry(p0, p1);
        let tasks = TaskTable::build(&registry.group_sizes());
        let output = ContactEvaluator::new(&registry, &cell, &switching, &tasks)
            .run(EvaluationMode::WithDerivatives)
            .unwrap();
        let analytic = output.forces.unwrap().force(1);

        let weigh = |shifted: Point3<f64>| {
            let registry = two_node_registry(p0, shifted);
            let tasks = TaskTable::build(&registry.group_sizes());
            ContactEvaluator::new(&registry, &cell, &switching, &tasks)
                .run(EvaluationMode::Weights)
                .unwrap()
                .matrix
                .weight(0)
                .unwrap()
        };

        let h = 1e-5;
        for axis in 0..3 {
            let mut above = p1;
            let mut below = p1;
            above[axis] += h;
            below[axis] -= h;
            let numerical = (weigh(above) - weigh(below)) / (2.0 * h);
            assert_relative_eq!(analytic[axis], numerical, epsilon = 1e-8, max_relative = 1e-6);
        }
    }

    #[test]
    fn weight_tolerance_drops_small_pairs_from_phase_d() {
        let registry = two_node_registry(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
        );
        let cell = Cell::free();
        let switching = single_type_switching();
        let tasks = TaskTable::build(&registry.group_sizes());

        let output = ContactEvaluator::new(&registry, &cell, &switching, &tasks)
            .with_weight_tolerance(0.9)
            .run(EvaluationMode::WithDerivatives)
            .unwrap();
        // The weight itself is still committed...
        let weight = output.matrix.weight(0).unwrap();
        assert!(weight > 0.0 && weight < 0.9);
        // ...but the pair is not active and deposits nothing.
        assert_eq!(output.active_pairs, 0);
        assert!(!output.matrix.has_derivatives(0));
        let forces = output.forces.unwrap();
        assert_eq!(forces.force(0), Vector3::zeros());
        assert_eq!(forces.force(1), Vector3::zeros());
    }

    #[test]
    fn pair_beyond_cutoff_gets_no_derivative_block() {
        let registry = two_node_registry(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        );
        let cell = Cell::free();
        let switching = single_type_switching();
        let tasks = TaskTable::build(&registry.group_sizes());

        let output = ContactEvaluator::new(&registry, &cell, &switching, &tasks)
            .run(EvaluationMode::WithDerivatives)
            .unwrap();
        assert_eq!(output.matrix.weight(0).unwrap(), 0.0);
        assert!(matches!(
            output.matrix.derivatives(0),
            Err(EngineError::DerivativesNotAvailable { index: 0 })
        ));
    }

    #[test]
    fn periodic_wrapping_brings_boundary_pairs_into_contact() {
        let p0 = Point3::new(0.5, 5.0, 5.0);
        let p1 = Point3::new(9.5, 5.0, 5.0);
        let switching = single_type_switching();

        let registry = two_node_registry(p0, p1);
        let tasks = TaskTable::build(&registry.group_sizes());

        let periodic = Cell::orthorhombic(10.0, 10.0, 10.0).unwrap();
        let wrapped = ContactEvaluator::new(&registry, &periodic, &switching, &tasks)
            .run(EvaluationMode::Weights)
            .unwrap();
        // Distance 1.0 through the boundary.
        assert!(wrapped.matrix.weight(0).unwrap() > 0.0);

        let open = Cell::free();
        let unwrapped = ContactEvaluator::new(&registry, &open, &switching, &tasks)
            .run(EvaluationMode::Weights)
            .unwrap();
        assert_eq!(unwrapped.matrix.weight(0).unwrap(), 0.0);
    }

    #[test]
    fn centroid_nodes_spread_their_gradient_over_members() {
        let mut registry = NodeRegistry::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            // Two particles whose centroid sits at (1.0, 0, 0).
            Point3::new(0.8, 0.0, 0.0),
            Point3::new(1.2, 0.0, 0.0),
        ]);
        registry.add_particle_group("probe", 0..1).unwrap();
        registry.add_centroid_group("site", vec![vec![1, 2]]).unwrap();

        let mut switching = SwitchingMatrix::new(2);
        let function = SwitchingFunction::parse(SPEC).unwrap();
        switching.set(0, 0, function.clone()).unwrap();
        switching.set(0, 1, function.clone()).unwrap();
        switching.set(1, 1, function).unwrap();

        let cell = Cell::free();
        let tasks = TaskTable::build(&registry.group_sizes());
        assert_eq!(tasks.len(), 1);

        let output = ContactEvaluator::new(&registry, &cell, &switching, &tasks)
            .run(EvaluationMode::WithDerivatives)
            .unwrap();
        let forces = output.forces.unwrap();
        // The centroid's gradient splits equally between its two members and
        // balances the probe particle exactly.
        assert_eq!(forces.force(1), forces.force(2));
        assert_eq!(
            forces.force(0) + forces.force(1) + forces.force(2),
            Vector3::zeros()
        );
        assert!(forces.force(0).norm() > 0.0);
    }

    #[test]
    fn cross_type_pairs_use_their_own_switching_function() {
        let mut registry = NodeRegistry::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.2, 0.0, 0.0),
        ]);
        registry.add_particle_group("a", 0..1).unwrap();
        registry.add_particle_group("b", 1..2).unwrap();

        let tight = SwitchingFunction::parse("RATIONAL R_0=0.5 D_MAX=1.0").unwrap();
        let wide = SwitchingFunction::parse("RATIONAL R_0=2.0 D_MAX=4.0").unwrap();
        let mut switching = SwitchingMatrix::new(2);
        switching.set(0, 0, tight.clone()).unwrap();
        switching.set(1, 1, tight).unwrap();
        switching.set(0, 1, wide.clone()).unwrap();

        let cell = Cell::free();
        let tasks = TaskTable::build(&registry.group_sizes());
        let output = ContactEvaluator::new(&registry, &cell, &switching, &tasks)
            .run(EvaluationMode::Weights)
            .unwrap();

        let (expected, _) = wide.calculate(1.2);
        assert_relative_eq!(output.matrix.weight(0).unwrap(), expected);
        assert!(expected > 0.0);
    }
}
