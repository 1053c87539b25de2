//! Frequency-domain subspace realization from input/output spectra.
//!
//! Given spectra `U(ω_k)`, `Y(ω_k)` at normalized frequencies `f_k`, the
//! realization recovers a discrete (A, B, C, D) with `Y = (C (zI - A)⁻¹ B + D) U`,
//! `z = e^{j2πf}`:
//!
//! 1. Stack `[zⁱ U; zⁱ Y]` for `i < r` and split real and imaginary parts.
//! 2. LQ-factorize; the output block `L22` spans the extended observability matrix.
//! 3. Keep the `n` dominant left singular vectors of `L22` as `O_r`.
//! 4. `C` is the first block row of `O_r`, `A` follows from its shift invariance.
//! 5. `B`, `D` are linear in the data once A and C are known: solve by least squares.

use crate::linalg::{lstsq, to_complex};
use anyhow::{anyhow, bail, Result};
use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// How B and D are recovered once A and C are fixed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BdMethod {
    /// B and D estimated jointly.
    #[default]
    Explicit,
    /// D fixed to zero, only B estimated.
    StrictlyProper,
}

/// Per-line weighting of the B/D least-squares residual.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Weighting {
    #[default]
    Uniform,
    /// One non-negative weight per frequency line.
    PerLine(Vec<f64>),
}

#[derive(Debug, Clone)]
pub struct Realization {
    pub a: DMatrix<f64>,
    pub b: DMatrix<f64>,
    pub c: DMatrix<f64>,
    pub d: DMatrix<f64>,
    /// Singular values of `L22`, descending. Useful for choosing the order.
    pub singular_values: Vec<f64>,
    pub is_stable: bool,
}

/// Runs the realization on `F` lines.
/// freq: normalized frequencies in cycles/sample
/// u: `F x m` input spectra, y: `F x p` output spectra
pub fn subspace(
    freq: &[f64],
    n: usize,
    r: usize,
    u: &DMatrix<Complex64>,
    y: &DMatrix<Complex64>,
    bd_method: BdMethod,
    weighting: &Weighting,
) -> Result<Realization> {
    let lines = freq.len();
    let m = u.ncols();
    let p = y.ncols();
    if n == 0 {
        bail!("Model order must be positive.");
    }
    if r <= n {
        bail!("Block rows r = {} must exceed the model order n = {}.", r, n);
    }
    if u.nrows() != lines || y.nrows() != lines {
        bail!(
            "Spectra have {} and {} lines, frequency vector has {}.",
            u.nrows(),
            y.nrows(),
            lines
        );
    }
    if m == 0 || p == 0 {
        bail!("Realization needs at least one input and one output.");
    }
    if 2 * lines < r * (m + p) {
        bail!(
            "Too few frequency lines: {} lines cannot support r = {} with {} inputs and {} outputs.",
            lines,
            r,
            m,
            p
        );
    }
    let weights = match weighting {
        Weighting::Uniform => vec![1.0; lines],
        Weighting::PerLine(w) if w.len() != lines => {
            bail!("Weighting has {} entries, expected {}.", w.len(), lines)
        }
        Weighting::PerLine(w) => w.clone(),
    };

    let z: Vec<Complex64> = freq
        .iter()
        .map(|f| Complex64::from_polar(1.0, 2.0 * PI * f))
        .collect();

    // Transposed, real-stacked data matrix: row k holds Re, row F + k holds Im.
    let width = r * (m + p);
    let mut data = DMatrix::<f64>::zeros(2 * lines, width);
    for (k, zk) in z.iter().enumerate() {
        let mut power = Complex64::new(1.0, 0.0);
        for i in 0..r {
            for j in 0..m {
                let value = power * u[(k, j)];
                data[(k, i * m + j)] = value.re;
                data[(lines + k, i * m + j)] = value.im;
            }
            for j in 0..p {
                let value = power * y[(k, j)];
                data[(k, r * m + i * p + j)] = value.re;
                data[(lines + k, r * m + i * p + j)] = value.im;
            }
            power *= zk;
        }
    }

    let lower = data.qr().r().transpose();
    let l22 = lower.view((r * m, r * m), (r * p, r * p)).into_owned();
    let svd = l22.svd(true, false);
    let left = svd
        .u
        .ok_or_else(|| anyhow!("SVD of the output block did not return left singular vectors."))?;
    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by(|&i, &j| {
        svd.singular_values[j]
            .partial_cmp(&svd.singular_values[i])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let singular_values: Vec<f64> = order.iter().map(|&i| svd.singular_values[i]).collect();

    let mut observability = DMatrix::<f64>::zeros(r * p, n);
    for (col, &idx) in order.iter().take(n).enumerate() {
        observability.set_column(col, &left.column(idx));
    }

    let c = observability.rows(0, p).into_owned();
    let a = lstsq(
        &observability.rows(0, (r - 1) * p).into_owned(),
        &observability.rows(p, (r - 1) * p).into_owned(),
    )?;

    let (b, d) = estimate_bd(&a, &c, &z, u, y, bd_method, &weights)?;

    let is_stable = a
        .complex_eigenvalues()
        .iter()
        .all(|lambda| lambda.norm() < 1.0);

    Ok(Realization {
        a,
        b,
        c,
        d,
        singular_values,
        is_stable,
    })
}

/// Least-squares B, D with A and C fixed.
///
/// Unknowns are ordered `vec(B)` row-major, then `vec(D)` row-major. Each line
/// contributes `p` complex equations, split into real and imaginary rows.
fn estimate_bd(
    a: &DMatrix<f64>,
    c: &DMatrix<f64>,
    z: &[Complex64],
    u: &DMatrix<Complex64>,
    y: &DMatrix<Complex64>,
    bd_method: BdMethod,
    weights: &[f64],
) -> Result<(DMatrix<f64>, DMatrix<f64>)> {
    let n = a.nrows();
    let m = u.ncols();
    let p = y.ncols();
    let lines = z.len();
    let with_d = bd_method == BdMethod::Explicit;
    let unknowns = n * m + if with_d { p * m } else { 0 };
    if 2 * lines * p < unknowns {
        bail!(
            "Too few frequency lines ({}) to estimate {} B/D parameters.",
            lines,
            unknowns
        );
    }

    let a_c = to_complex(a);
    let c_c = to_complex(c);
    let identity = DMatrix::<Complex64>::identity(n, n);
    let mut regressor = DMatrix::<f64>::zeros(2 * lines * p, unknowns);
    let mut target = DMatrix::<f64>::zeros(2 * lines * p, 1);

    for (k, zk) in z.iter().enumerate() {
        let resolvent = (&identity * *zk - &a_c)
            .lu()
            .solve(&identity)
            .ok_or_else(|| anyhow!("(zI - A) is singular at line index {}.", k))?;
        let kernel = &c_c * resolvent;
        let w = weights[k];
        for i in 0..p {
            let re_row = k * p + i;
            let im_row = lines * p + k * p + i;
            for l in 0..n {
                for j in 0..m {
                    let value = kernel[(i, l)] * u[(k, j)] * w;
                    regressor[(re_row, l * m + j)] = value.re;
                    regressor[(im_row, l * m + j)] = value.im;
                }
            }
            if with_d {
                for j in 0..m {
                    let value = u[(k, j)] * w;
                    regressor[(re_row, n * m + i * m + j)] = value.re;
                    regressor[(im_row, n * m + i * m + j)] = value.im;
                }
            }
            let value = y[(k, i)] * w;
            target[(re_row, 0)] = value.re;
            target[(im_row, 0)] = value.im;
        }
    }

    let theta: DVector<f64> = lstsq(&regressor, &target)?.column(0).into_owned();
    let b = DMatrix::from_fn(n, m, |l, j| theta[l * m + j]);
    let d = if with_d {
        DMatrix::from_fn(p, m, |i, j| theta[n * m + i * m + j])
    } else {
        DMatrix::zeros(p, m)
    };
    Ok((b, d))
}
