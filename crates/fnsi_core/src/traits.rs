use nalgebra::{DMatrix, DVector};
use std::fmt::Debug;

/// A static, localized nonlinear force element.
///
/// The element reads one or more output degrees of freedom and produces a single
/// nonlinear basis function, evaluated sample by sample.
pub trait NonlinearElement: Debug + Send + Sync {
    /// Evaluates the basis function.
    /// t: time of the first sample
    /// y: output displacements, samples x p
    /// ydot: output velocities, samples x p
    /// Returns one value per sample.
    fn evaluate(&self, t: f64, y: &DMatrix<f64>, ydot: &DMatrix<f64>) -> DVector<f64>;

    /// Whether the term enters the state equation (a column of E).
    /// Terms that only feed the output equation return false.
    fn couples_state(&self) -> bool {
        true
    }
}
