//! Catalog of nonlinear basis functions and the ordered set used by a model.

use crate::traits::NonlinearElement;
use nalgebra::{DMatrix, DVector};

/// Weighted combination `Σ wᵢ yᵢ` of the output columns, per sample.
/// `w = [1]` reads DOF 0, `w = [1, -1]` the relative motion of DOF 0 and 1.
fn combine(w: &[f64], data: &DMatrix<f64>) -> DVector<f64> {
    DVector::from_fn(data.nrows(), |t, _| {
        w.iter()
            .enumerate()
            .filter(|(dof, _)| *dof < data.ncols())
            .map(|(dof, weight)| weight * data[(t, dof)])
            .sum()
    })
}

/// Polynomial stiffness on displacement, `x^e` or `sign(x)|x|^e`.
#[derive(Debug, Clone)]
pub struct Polynomial {
    pub exponent: i32,
    pub w: Vec<f64>,
    /// Keep the sign of `x` for even exponents.
    pub signed: bool,
}

impl Polynomial {
    pub fn new(exponent: i32, w: Vec<f64>) -> Self {
        Self {
            exponent,
            w,
            signed: false,
        }
    }

    pub fn signed(exponent: i32, w: Vec<f64>) -> Self {
        Self {
            exponent,
            w,
            signed: true,
        }
    }
}

impl NonlinearElement for Polynomial {
    fn evaluate(&self, _t: f64, y: &DMatrix<f64>, _ydot: &DMatrix<f64>) -> DVector<f64> {
        combine(&self.w, y).map(|x| {
            if self.signed {
                x.abs().powi(self.exponent) * x.signum()
            } else {
                x.powi(self.exponent)
            }
        })
    }
}

/// Smoothed Coulomb friction on velocity, `tanh(v / eps)`.
#[derive(Debug, Clone)]
pub struct TanhDryFriction {
    pub eps: f64,
    pub w: Vec<f64>,
}

impl NonlinearElement for TanhDryFriction {
    fn evaluate(&self, _t: f64, _y: &DMatrix<f64>, ydot: &DMatrix<f64>) -> DVector<f64> {
        combine(&self.w, ydot).map(|v| (v / self.eps).tanh())
    }
}

/// Spring engaging once the displacement passes a gap, `max(x - gap, 0)`.
#[derive(Debug, Clone)]
pub struct UnilateralSpring {
    pub gap: f64,
    pub w: Vec<f64>,
}

impl NonlinearElement for UnilateralSpring {
    fn evaluate(&self, _t: f64, y: &DMatrix<f64>, _ydot: &DMatrix<f64>) -> DVector<f64> {
        combine(&self.w, y).map(|x| (x - self.gap).max(0.0))
    }
}

/// Ordered collection of nonlinear terms. Column `j` of `fnl` and of E/F belong
/// to the `j`-th element.
#[derive(Debug, Default)]
pub struct NonlinearitySet {
    elements: Vec<Box<dyn NonlinearElement>>,
}

impl NonlinearitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, element: impl NonlinearElement + 'static) -> Self {
        self.push(element);
        self
    }

    pub fn push(&mut self, element: impl NonlinearElement + 'static) {
        self.elements.push(Box::new(element));
    }

    /// Number of nonlinear terms.
    pub fn n_nl(&self) -> usize {
        self.elements.len()
    }

    /// Number of terms coupling into the state equation.
    pub fn n_nx(&self) -> usize {
        self.elements.iter().filter(|e| e.couples_state()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Evaluates every term; returns `samples x n_nl`.
    pub fn fnl(&self, t: f64, y: &DMatrix<f64>, ydot: &DMatrix<f64>) -> DMatrix<f64> {
        let mut out = DMatrix::zeros(y.nrows(), self.n_nl());
        for (j, element) in self.elements.iter().enumerate() {
            out.set_column(j, &element.evaluate(t, y, ydot));
        }
        out
    }
}
