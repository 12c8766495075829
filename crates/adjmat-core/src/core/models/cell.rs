use nalgebra::{Matrix3, Point3, Vector3};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CellError {
    #[error("Cell matrix is not invertible")]
    NotInvertible,
}

/// The simulation cell enclosing the nodes.
///
/// Stores the cell matrix `h` (lattice vectors as columns of the Cartesian
/// transform), its inverse, and a per-axis periodicity flag. Displacements
/// between nodes are computed under the minimum-image convention on the
/// periodic axes, which is valid for cutoffs up to half the smallest
/// perpendicular cell width.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    h: Matrix3<f64>,
    h_inv: Matrix3<f64>,
    periodic: [bool; 3],
}

impl Cell {
    /// Creates a general (possibly triclinic) cell.
    ///
    /// # Errors
    ///
    /// Returns [`CellError::NotInvertible`] if `h` is singular.
    pub fn new(h: Matrix3<f64>, periodic: [bool; 3]) -> Result<Self, CellError> {
        let h_inv = h.try_inverse().ok_or(CellError::NotInvertible)?;
        Ok(Self { h, h_inv, periodic })
    }

    /// Creates an orthorhombic cell with the given edge lengths, periodic on
    /// every axis.
    pub fn orthorhombic(a: f64, b: f64, c: f64) -> Result<Self, CellError> {
        Self::new(Matrix3::from_diagonal(&Vector3::new(a, b, c)), [true; 3])
    }

    /// Creates a non-periodic cell: displacements are plain Cartesian
    /// differences.
    pub fn free() -> Self {
        Self {
            h: Matrix3::identity(),
            h_inv: Matrix3::identity(),
            periodic: [false; 3],
        }
    }

    pub fn h(&self) -> &Matrix3<f64> {
        &self.h
    }

    pub fn periodic(&self) -> [bool; 3] {
        self.periodic
    }

    pub fn is_periodic(&self) -> bool {
        self.periodic.iter().any(|&p| p)
    }

    /// The minimum-image displacement from `from` to `to`.
    ///
    /// On each periodic axis the fractional component is wrapped to the
    /// nearest image; non-periodic axes keep the raw difference.
    pub fn minimum_image(&self, from: &Point3<f64>, to: &Point3<f64>) -> Vector3<f64> {
        if !self.is_periodic() {
            return to - from;
        }
        let mut frac = self.h_inv * (to - from);
        for axis in 0..3 {
            if self.periodic[axis] {
                frac[axis] -= frac[axis].round();
            }
        }
        self.h * frac
    }
}
