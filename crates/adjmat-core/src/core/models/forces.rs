use nalgebra::{Matrix3, Vector3};

/// Accumulation buffer for the derivatives produced by a Phase-D cycle.
///
/// Holds one 3-vector slot per underlying particle plus a single 3×3 virial
/// accumulator. A node that aggregates several particles spreads its
/// contribution over the slots of its members, so the buffer is always
/// indexed by particle, not by node. Addition is commutative, which makes
/// [`ForceBuffer::merge`] a valid reduction for buffers filled by independent
/// workers.
#[derive(Debug, Clone, PartialEq)]
pub struct ForceBuffer {
    forces: Vec<Vector3<f64>>,
    virial: Matrix3<f64>,
}

impl ForceBuffer {
    pub fn new(n_particles: usize) -> Self {
        Self {
            forces: vec![Vector3::zeros(); n_particles],
            virial: Matrix3::zeros(),
        }
    }

    pub fn len(&self) -> usize {
        self.forces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forces.is_empty()
    }

    pub fn add_force(&mut self, slot: usize, force: Vector3<f64>) {
        self.forces[slot] += force;
    }

    pub fn add_virial(&mut self, contribution: Matrix3<f64>) {
        self.virial += contribution;
    }

    pub fn force(&self, slot: usize) -> Vector3<f64> {
        self.forces[slot]
    }

    pub fn forces(&self) -> &[Vector3<f64>] {
        &self.forces
    }

    pub fn virial(&self) -> Matrix3<f64> {
        self.virial
    }

    /// Folds another buffer into this one, slot by slot.
    ///
    /// Both buffers must cover the same particle count.
    pub fn merge(mut self, other: Self) -> Self {
        debug_assert_eq!(self.forces.len(), other.forces.len());
        for (acc, f) in self.forces.iter_mut().zip(other.forces.iter()) {
            *acc += f;
        }
        self.virial += other.virial;
        self
    }
}
