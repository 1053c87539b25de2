//! Extended nonlinear state-space models.
//!
//! Discrete time:
//!
//! ```text
//! x(t+1) = A x(t) + B u(t) + E g(y(t), ẏ(t))
//! y(t)   = C x(t) + D u(t) + F g(y(t), ẏ(t))
//! ```
//!
//! The nonlinear block is carried through identification and conversion as a
//! negated pseudo-input: `Bext = [B | -E]`, `Dext = [D | -F]`, driven by the
//! extended input `[u, -g]`.

use crate::linalg::{hstack, to_complex};
use crate::lti_conversion::{discrete_to_continuous, DiscretizationMethod, LtiMatrices};
use crate::nonlinearity::NonlinearitySet;
use anyhow::{anyhow, bail, Result};
use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedStateSpace {
    pub a: DMatrix<f64>,
    pub b: DMatrix<f64>,
    pub c: DMatrix<f64>,
    pub d: DMatrix<f64>,
    pub e: DMatrix<f64>,
    pub f: DMatrix<f64>,
    pub dt: f64,
}

/// Continuous-time counterpart of [`ExtendedStateSpace`].
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuousStateSpace {
    pub a: DMatrix<f64>,
    pub b: DMatrix<f64>,
    pub c: DMatrix<f64>,
    pub d: DMatrix<f64>,
    pub e: DMatrix<f64>,
    pub f: DMatrix<f64>,
}

impl ExtendedStateSpace {
    pub fn new(
        a: DMatrix<f64>,
        b: DMatrix<f64>,
        c: DMatrix<f64>,
        d: DMatrix<f64>,
        e: DMatrix<f64>,
        f: DMatrix<f64>,
        dt: f64,
    ) -> Result<Self> {
        if dt <= 0.0 {
            bail!("Sampling interval dt must be positive.");
        }
        LtiMatrices::new(a.clone(), b.clone(), c.clone(), d.clone())?;
        let n = a.nrows();
        if e.nrows() != n || f.nrows() != c.nrows() || e.ncols() != f.ncols() {
            bail!(
                "Inconsistent nonlinear coupling shapes: E {:?}, F {:?} for n = {}, p = {}.",
                e.shape(),
                f.shape(),
                n,
                c.nrows()
            );
        }
        Ok(Self { a, b, c, d, e, f, dt })
    }

    /// Model without nonlinear terms: E is `n x 0`, F is `p x 0`.
    pub fn linear(
        a: DMatrix<f64>,
        b: DMatrix<f64>,
        c: DMatrix<f64>,
        d: DMatrix<f64>,
        dt: f64,
    ) -> Result<Self> {
        let e = DMatrix::zeros(a.nrows(), 0);
        let f = DMatrix::zeros(c.nrows(), 0);
        Self::new(a, b, c, d, e, f, dt)
    }

    pub fn n(&self) -> usize {
        self.a.nrows()
    }

    pub fn m(&self) -> usize {
        self.b.ncols()
    }

    pub fn p(&self) -> usize {
        self.c.nrows()
    }

    pub fn n_nl(&self) -> usize {
        self.e.ncols()
    }

    /// `[B | -E]`
    pub fn b_ext(&self) -> DMatrix<f64> {
        hstack(&self.b, &(-&self.e))
    }

    /// `[D | -F]`
    pub fn d_ext(&self) -> DMatrix<f64> {
        hstack(&self.d, &(-&self.f))
    }

    pub fn poles(&self) -> Vec<Complex64> {
        self.a.complex_eigenvalues().iter().copied().collect()
    }

    /// All discrete poles strictly inside the unit circle.
    pub fn is_stable(&self) -> bool {
        self.poles().iter().all(|pole| pole.norm() < 1.0)
    }

    /// Linear transfer matrix `C (zI - A)⁻¹ B + D` at `z`.
    pub fn frequency_response(&self, z: Complex64) -> Result<DMatrix<Complex64>> {
        transfer(&self.a, &self.b, &self.c, &self.d, z)
    }

    /// Continuous-time model; the extended pair is converted as one input matrix
    /// and split again after `m` columns.
    pub fn to_continuous(&self, method: DiscretizationMethod) -> Result<ContinuousStateSpace> {
        let m = self.m();
        let n_nl = self.n_nl();
        let ext = LtiMatrices {
            a: self.a.clone(),
            b: self.b_ext(),
            c: self.c.clone(),
            d: self.d_ext(),
        };
        let cont = discrete_to_continuous(&ext, self.dt, method)?;
        Ok(ContinuousStateSpace {
            a: cont.a,
            b: cont.b.columns(0, m).into_owned(),
            c: cont.c,
            d: cont.d.columns(0, m).into_owned(),
            e: -cont.b.columns(m, n_nl).into_owned(),
            f: -cont.d.columns(m, n_nl).into_owned(),
        })
    }

    /// Time-domain response to `u` (`samples x m`) from `x0`.
    ///
    /// The nonlinear terms are evaluated on the linear output `C x + D u`, with the
    /// velocity taken as the backward difference of that output.
    /// Returns the outputs (`samples x p`) and the final state.
    pub fn simulate(
        &self,
        nlx: &NonlinearitySet,
        u: &DMatrix<f64>,
        x0: Option<&DVector<f64>>,
    ) -> Result<(DMatrix<f64>, DVector<f64>)> {
        let (n, m, p) = (self.n(), self.m(), self.p());
        if u.ncols() != m {
            bail!("Input has {} channels, model expects {}.", u.ncols(), m);
        }
        if nlx.n_nl() != self.n_nl() {
            bail!(
                "Nonlinearity set has {} terms, model has {}.",
                nlx.n_nl(),
                self.n_nl()
            );
        }
        let mut x = match x0 {
            Some(x0) if x0.len() != n => bail!("Initial state has length {}, expected {}.", x0.len(), n),
            Some(x0) => x0.clone(),
            None => DVector::zeros(n),
        };

        let samples = u.nrows();
        let mut y = DMatrix::zeros(samples, p);
        let mut previous: Option<DVector<f64>> = None;
        for t in 0..samples {
            let ut = u.row(t).transpose();
            let linear = &self.c * &x + &self.d * &ut;
            let velocity = match &previous {
                Some(prev) => (&linear - prev) / self.dt,
                None => DVector::zeros(p),
            };
            let g = if nlx.is_empty() {
                DVector::zeros(0)
            } else {
                let fnl = nlx.fnl(
                    t as f64 * self.dt,
                    &DMatrix::from_row_slice(1, p, linear.as_slice()),
                    &DMatrix::from_row_slice(1, p, velocity.as_slice()),
                );
                fnl.row(0).transpose()
            };
            let yt = &linear + &self.f * &g;
            y.set_row(t, &yt.transpose());
            x = &self.a * &x + &self.b * &ut + &self.e * &g;
            previous = Some(linear);
        }
        Ok((y, x))
    }

    /// Output over the last of `periods` repetitions of one input period,
    /// starting from rest.
    pub fn simulate_periodic(
        &self,
        nlx: &NonlinearitySet,
        u_period: &DMatrix<f64>,
        periods: usize,
    ) -> Result<DMatrix<f64>> {
        if periods == 0 {
            bail!("At least one period must be simulated.");
        }
        let npp = u_period.nrows();
        let mut state: Option<DVector<f64>> = None;
        let mut output = DMatrix::zeros(npp, self.p());
        for _ in 0..periods {
            let (y, x) = self.simulate(nlx, u_period, state.as_ref())?;
            output = y;
            state = Some(x);
        }
        Ok(output)
    }
}

impl ContinuousStateSpace {
    /// Linear transfer matrix `C (sI - A)⁻¹ B + D` at `s`.
    pub fn frequency_response(&self, s: Complex64) -> Result<DMatrix<Complex64>> {
        transfer(&self.a, &self.b, &self.c, &self.d, s)
    }
}

pub(crate) fn transfer(
    a: &DMatrix<f64>,
    b: &DMatrix<f64>,
    c: &DMatrix<f64>,
    d: &DMatrix<f64>,
    z: Complex64,
) -> Result<DMatrix<Complex64>> {
    let n = a.nrows();
    let shifted = DMatrix::<Complex64>::identity(n, n) * z - to_complex(a);
    let solved = shifted
        .lu()
        .solve(&to_complex(b))
        .ok_or_else(|| anyhow!("(zI - A) is singular at z = {}.", z))?;
    Ok(to_complex(c) * solved + to_complex(d))
}

#[cfg(test)]
mod tests {
    use super::ExtendedStateSpace;
    use crate::lti_conversion::{continuous_to_discrete, DiscretizationMethod, LtiMatrices};
    use crate::nonlinearity::{NonlinearitySet, Polynomial};
    use nalgebra::{DMatrix, DVector};
    use num_complex::Complex64;

    fn discrete_oscillator() -> ExtendedStateSpace {
        ExtendedStateSpace::new(
            DMatrix::from_row_slice(2, 2, &[0.9, 0.2, -0.2, 0.9]),
            DMatrix::from_row_slice(2, 1, &[0.0, 1.0]),
            DMatrix::from_row_slice(1, 2, &[1.0, 0.0]),
            DMatrix::from_row_slice(1, 1, &[0.0]),
            DMatrix::from_row_slice(2, 1, &[0.0, -0.5]),
            DMatrix::from_row_slice(1, 1, &[0.0]),
            0.01,
        )
        .expect("valid model")
    }

    #[test]
    fn extended_matrices_negate_the_nonlinear_block() {
        let model = discrete_oscillator();
        let b_ext = model.b_ext();
        assert_eq!(b_ext.shape(), (2, 2));
        assert_eq!(b_ext[(1, 0)], 1.0);
        assert_eq!(b_ext[(1, 1)], 0.5);
        assert_eq!(model.d_ext().shape(), (1, 2));
        assert!(model.is_stable());
    }

    #[test]
    fn rejects_inconsistent_shapes() {
        let result = ExtendedStateSpace::new(
            DMatrix::zeros(2, 2),
            DMatrix::zeros(2, 1),
            DMatrix::zeros(1, 2),
            DMatrix::zeros(1, 1),
            DMatrix::zeros(3, 1),
            DMatrix::zeros(1, 1),
            1.0,
        );
        assert!(result.is_err());
    }

    #[test]
    fn simulation_applies_nonlinear_feedback() {
        let model = discrete_oscillator();
        let nlx = NonlinearitySet::new().with(Polynomial::new(3, vec![1.0]));
        let mut u = DMatrix::zeros(3, 1);
        u[(0, 0)] = 2.0;
        let (y, x) = model.simulate(&nlx, &u, None).expect("simulation");
        // x1 = [0, 2]; y1 = 0, x2 = [0.4, 1.8]; y2 = 0.4
        assert_eq!(y[(0, 0)], 0.0);
        assert_eq!(y[(1, 0)], 0.0);
        assert!((y[(2, 0)] - 0.4).abs() < 1e-15);
        let g = 0.4f64.powi(3);
        assert!((x[0] - (0.9 * 0.4 + 0.2 * 1.8)).abs() < 1e-12);
        assert!((x[1] - (-0.2 * 0.4 + 0.9 * 1.8 - 0.5 * g)).abs() < 1e-12);

        let wrong = NonlinearitySet::new();
        assert!(model.simulate(&wrong, &u, None).is_err());
        let x0 = DVector::zeros(3);
        assert!(model.simulate(&nlx, &u, Some(&x0)).is_err());
    }

    #[test]
    fn continuous_conversion_splits_extended_input() {
        let cont = LtiMatrices::new(
            DMatrix::from_row_slice(2, 2, &[0.0, 1.0, -100.0, -1.0]),
            DMatrix::from_row_slice(2, 2, &[0.0, 0.0, 1.0, -3.0]),
            DMatrix::from_row_slice(1, 2, &[1.0, 0.0]),
            DMatrix::from_row_slice(1, 2, &[0.0, 0.0]),
        )
        .expect("valid shapes");
        let dt = 1.0 / 200.0;
        let disc = continuous_to_discrete(&cont, dt, DiscretizationMethod::Zoh).expect("c2d");
        // Second extended column is -E.
        let model = ExtendedStateSpace::new(
            disc.a.clone(),
            disc.b.columns(0, 1).into_owned(),
            disc.c.clone(),
            disc.d.columns(0, 1).into_owned(),
            -disc.b.columns(1, 1).into_owned(),
            DMatrix::zeros(1, 1),
            dt,
        )
        .expect("valid model");

        let back = model.to_continuous(DiscretizationMethod::Zoh).expect("d2c");
        assert!((&back.a - &cont.a).abs().max() < 1e-7);
        assert!((back.b[(1, 0)] - 1.0).abs() < 1e-9);
        assert!((back.e[(1, 0)] - 3.0).abs() < 1e-9);
        assert_eq!(back.c, model.c);
        assert_eq!(back.f.shape(), (1, 1));

        let s = Complex64::new(0.0, 5.0);
        let h = back.frequency_response(s).expect("response");
        let expected = Complex64::new(1.0, 0.0) / (s * s + s + 100.0);
        assert!((h[(0, 0)] - expected).norm() < 1e-9);
    }
}
