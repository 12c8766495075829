use super::forces::ForceBuffer;
use nalgebra::{Point3, Vector3};
use std::ops::Range;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Particle range {start}..{end} is out of bounds for {n_particles} particles")]
    RangeOutOfBounds {
        start: usize,
        end: usize,
        n_particles: usize,
    },
    #[error("Member index {index} is out of bounds for {n_particles} particles")]
    MemberOutOfBounds { index: usize, n_particles: usize },
    #[error("A centroid node must aggregate at least one particle")]
    EmptyCentroid,
    #[error("Expected {expected} particle positions, got {actual}")]
    PositionCountMismatch { expected: usize, actual: usize },
}

/// How a group derives its nodes from the underlying particles.
///
/// The set of source kinds is closed on purpose: every kind must answer the
/// same three questions (how many nodes, where is node k, how does a force on
/// node k map back onto particles), and the engine dispatches over them
/// through [`NodeRegistry`] without knowing which kind it is talking to.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeSource {
    /// One node per particle in a contiguous range.
    Particles { range: Range<usize> },
    /// One node per member list; the node sits at the unweighted mean of its
    /// member particles, and a force on the node is split equally among them.
    Centroids { members: Vec<Vec<usize>> },
}

/// A named partition of nodes sharing one switching-function type.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeGroup {
    label: String,
    source: NodeSource,
}

impl NodeGroup {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn n_nodes(&self) -> usize {
        match &self.source {
            NodeSource::Particles { range } => range.len(),
            NodeSource::Centroids { members } => members.len(),
        }
    }
}

/// The collection of nodes taking part in contact-matrix evaluation.
///
/// Owns the raw particle positions and an ordered list of node groups; the
/// position of a group in that list is its type id. Node indices are dense
/// and global: group 0's nodes come first, then group 1's, and so on.
/// Positions are refreshed between evaluation cycles with
/// [`NodeRegistry::set_positions`]; everything else is fixed once the groups
/// are registered.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRegistry {
    particles: Vec<Point3<f64>>,
    groups: Vec<NodeGroup>,
    // Cumulative node counts; offsets[g] is the global index of group g's
    // first node, offsets[len] the total node count.
    offsets: Vec<usize>,
}

impl NodeRegistry {
    pub fn new(particles: Vec<Point3<f64>>) -> Self {
        Self {
            particles,
            groups: Vec::new(),
            offsets: vec![0],
        }
    }

    /// Registers a group with one node per particle in `range`.
    ///
    /// Returns the type id assigned to the group.
    pub fn add_particle_group(
        &mut self,
        label: &str,
        range: Range<usize>,
    ) -> Result<usize, RegistryError> {
        if range.end > self.particles.len() || range.start > range.end {
            return Err(RegistryError::RangeOutOfBounds {
                start: range.start,
                end: range.end,
                n_particles: self.particles.len(),
            });
        }
        self.push_group(label, NodeSource::Particles { range })
    }

    /// Registers a group whose nodes are centroids of member particle sets.
    ///
    /// Returns the type id assigned to the group.
    pub fn add_centroid_group(
        &mut self,
        label: &str,
        members: Vec<Vec<usize>>,
    ) -> Result<usize, RegistryError> {
        for node_members in &members {
            if node_members.is_empty() {
                return Err(RegistryError::EmptyCentroid);
            }
            for &index in node_members {
                if index >= self.particles.len() {
                    return Err(RegistryError::MemberOutOfBounds {
                        index,
                        n_particles: self.particles.len(),
                    });
                }
            }
        }
        self.push_group(label, NodeSource::Centroids { members })
    }

    fn push_group(&mut self, label: &str, source: NodeSource) -> Result<usize, RegistryError> {
        let group = NodeGroup {
            label: label.to_string(),
            source,
        };
        let total = self.offsets.last().copied().unwrap_or(0) + group.n_nodes();
        self.groups.push(group);
        self.offsets.push(total);
        Ok(self.groups.len() - 1)
    }

    /// Replaces the particle positions for the next evaluation cycle.
    pub fn set_positions(&mut self, positions: Vec<Point3<f64>>) -> Result<(), RegistryError> {
        if positions.len() != self.particles.len() {
            return Err(RegistryError::PositionCountMismatch {
                expected: self.particles.len(),
                actual: positions.len(),
            });
        }
        self.particles = positions;
        Ok(())
    }

    pub fn n_particles(&self) -> usize {
        self.particles.len()
    }

    pub fn n_nodes(&self) -> usize {
        self.offsets[self.groups.len()]
    }

    pub fn n_groups(&self) -> usize {
        self.groups.len()
    }

    pub fn group(&self, type_id: usize) -> &NodeGroup {
        &self.groups[type_id]
    }

    pub fn has_group(&self, label: &str) -> bool {
        self.groups.iter().any(|g| g.label == label)
    }

    /// Node counts per group, in type-id order.
    pub fn group_sizes(&self) -> Vec<usize> {
        self.groups.iter().map(NodeGroup::n_nodes).collect()
    }

    /// The type id of a node. Panics if `node` is out of range.
    pub fn type_of(&self, node: usize) -> usize {
        self.locate(node).0
    }

    /// The position of a node. Panics if `node` is out of range.
    pub fn position_of(&self, node: usize) -> Point3<f64> {
        let (group, local) = self.locate(node);
        match &self.groups[group].source {
            NodeSource::Particles { range } => self.particles[range.start + local],
            NodeSource::Centroids { members } => {
                let node_members = &members[local];
                let sum = node_members
                    .iter()
                    .fold(Vector3::zeros(), |acc, &m| acc + self.particles[m].coords);
                Point3::from(sum / node_members.len() as f64)
            }
        }
    }

    /// Deposits a force attributed to a node onto the particle slots that
    /// define it. Panics if `node` is out of range.
    pub fn deposit(&self, node: usize, force: Vector3<f64>, buffer: &mut ForceBuffer) {
        let (group, local) = self.locate(node);
        match &self.groups[group].source {
            NodeSource::Particles { range } => buffer.add_force(range.start + local, force),
            NodeSource::Centroids { members } => {
                let node_members = &members[local];
                let share = force / node_members.len() as f64;
                for &m in node_members {
                    buffer.add_force(m, share);
                }
            }
        }
    }

    fn locate(&self, node: usize) -> (usize, usize) {
        assert!(
            node < self.n_nodes(),
            "node index {node} out of range ({} nodes)",
            self.n_nodes()
        );
        let group = self.offsets.partition_point(|&offset| offset <= node) - 1;
        (group, node - self.offsets[group])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn registry_with_two_groups() -> NodeRegistry {
        let mut registry = NodeRegistry::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
            Point3::new(0.0, 4.0, 0.0),
        ]);
        registry.add_particle_group("solute", 0..2).unwrap();
        registry.add_centroid_group("solvent", vec![vec![2, 3]]).unwrap();
        registry
    }

    #[test]
    fn groups_are_assigned_dense_type_ids_in_order() {
        let registry = registry_with_two_groups();
        assert_eq!(registry.n_groups(), 2);
        assert_eq!(registry.group(0).label(), "solute");
        assert_eq!(registry.group(1).label(), "solvent");
        assert_eq!(registry.group_sizes(), vec![2, 1]);
        assert_eq!(registry.n_nodes(), 3);
        assert_eq!(registry.n_particles(), 4);
    }

    #[test]
    fn node_types_follow_group_boundaries() {
        let registry = registry_with_two_groups();
        assert_eq!(registry.type_of(0), 0);
        assert_eq!(registry.type_of(1), 0);
        assert_eq!(registry.type_of(2), 1);
    }

    #[test]
    fn particle_nodes_report_their_particle_position() {
        let registry = registry_with_two_groups();
        assert_eq!(registry.position_of(1), Point3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn centroid_nodes_sit_at_the_member_mean() {
        let registry = registry_with_two_groups();
        let p = registry.position_of(2);
        assert_relative_eq!(p.x, 0.0);
        assert_relative_eq!(p.y, 3.0);
        assert_relative_eq!(p.z, 0.0);
    }

    #[test]
    fn particle_deposit_lands_on_the_owning_slot() {
        let registry = registry_with_two_groups();
        let mut buffer = ForceBuffer::new(registry.n_particles());
        registry.deposit(1, Vector3::new(0.5, 0.0, 0.0), &mut buffer);
        assert_eq!(buffer.force(1), Vector3::new(0.5, 0.0, 0.0));
        assert_eq!(buffer.force(0), Vector3::zeros());
    }

    #[test]
    fn centroid_deposit_splits_equally_among_members() {
        let registry = registry_with_two_groups();
        let mut buffer = ForceBuffer::new(registry.n_particles());
        registry.deposit(2, Vector3::new(1.0, 0.0, 0.0), &mut buffer);
        assert_eq!(buffer.force(2), Vector3::new(0.5, 0.0, 0.0));
        assert_eq!(buffer.force(3), Vector3::new(0.5, 0.0, 0.0));
    }

    #[test]
    fn out_of_bounds_particle_range_is_rejected() {
        let mut registry = NodeRegistry::new(vec![Point3::origin()]);
        assert!(matches!(
            registry.add_particle_group("bad", 0..2),
            Err(RegistryError::RangeOutOfBounds { .. })
        ));
    }

    #[test]
    fn out_of_bounds_centroid_member_is_rejected() {
        let mut registry = NodeRegistry::new(vec![Point3::origin()]);
        assert!(matches!(
            registry.add_centroid_group("bad", vec![vec![0, 7]]),
            Err(RegistryError::MemberOutOfBounds { index: 7, .. })
        ));
    }

    #[test]
    fn empty_centroid_member_list_is_rejected() {
        let mut registry = NodeRegistry::new(vec![Point3::origin()]);
        assert!(matches!(
            registry.add_centroid_group("bad", vec![vec![]]),
            Err(RegistryError::EmptyCentroid)
        ));
    }

    #[test]
    fn position_refresh_requires_matching_length() {
        let mut registry = registry_with_two_groups();
        assert!(matches!(
            registry.set_positions(vec![Point3::origin()]),
            Err(RegistryError::PositionCountMismatch {
                expected: 4,
                actual: 1
            })
        ));
        let shifted = vec![
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(0.0, 2.0, 1.0),
            Point3::new(0.0, 4.0, 1.0),
        ];
        registry.set_positions(shifted).unwrap();
        assert_eq!(registry.position_of(0), Point3::new(0.0, 0.0, 1.0));
    }
}
