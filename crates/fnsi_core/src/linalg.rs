//! Dense matrix helpers not covered by nalgebra.

use crate::error::IdentError;
use anyhow::{anyhow, bail, Result};
use nalgebra::DMatrix;
use num_complex::Complex64;

const SQRT_MAX_ITERATIONS: usize = 100;
const MAX_SQUARE_ROOTS: usize = 64;
const SERIES_MAX_TERMS: usize = 200;

/// Principal matrix logarithm by inverse scaling and squaring.
///
/// Square roots are taken until `‖X - I‖₁ < 0.25`, then `log(I + Y)` is summed
/// as a series and rescaled by `2^k`.
pub fn logm(matrix: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    if !matrix.is_square() {
        bail!("Matrix logarithm requires a square matrix.");
    }
    let dim = matrix.nrows();
    if dim == 0 {
        return Ok(DMatrix::zeros(0, 0));
    }
    let eigenvalues = matrix.complex_eigenvalues();
    let scale = matrix.norm().max(1.0);
    for lambda in eigenvalues.iter() {
        if lambda.re <= 0.0 && lambda.im.abs() <= 1e-12 * scale {
            return Err(IdentError::NoPrincipalLogarithm.into());
        }
    }

    let identity = DMatrix::<f64>::identity(dim, dim);
    let mut x = matrix.clone();
    let mut roots = 0usize;
    while one_norm(&(&x - &identity)) >= 0.25 {
        if roots >= MAX_SQUARE_ROOTS {
            bail!("Matrix logarithm did not converge after {} square roots.", roots);
        }
        x = sqrtm(&x)?;
        roots += 1;
    }

    let y = &x - &identity;
    let mut power = y.clone();
    let mut sum = y.clone();
    for j in 2..=SERIES_MAX_TERMS {
        power = &power * &y;
        let term = &power / j as f64;
        if j % 2 == 0 {
            sum -= &term;
        } else {
            sum += &term;
        }
        if one_norm(&term) <= f64::EPSILON * one_norm(&sum).max(f64::MIN_POSITIVE) {
            break;
        }
    }

    Ok(sum * 2f64.powi(roots as i32))
}

/// Principal square root by the Denman–Beavers iteration.
pub fn sqrtm(matrix: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let dim = matrix.nrows();
    let mut y = matrix.clone();
    let mut z = DMatrix::<f64>::identity(dim, dim);
    for _ in 0..SQRT_MAX_ITERATIONS {
        let y_inv = y
            .clone()
            .try_inverse()
            .ok_or_else(|| anyhow!("Singular iterate in matrix square root."))?;
        let z_inv = z
            .clone()
            .try_inverse()
            .ok_or_else(|| anyhow!("Singular iterate in matrix square root."))?;
        let y_next = (&y + &z_inv) * 0.5;
        let z_next = (&z + &y_inv) * 0.5;
        let change = one_norm(&(&y_next - &y));
        y = y_next;
        z = z_next;
        if change <= 1e-14 * one_norm(&y) {
            return Ok(y);
        }
    }
    bail!("Matrix square root did not converge in {} iterations.", SQRT_MAX_ITERATIONS)
}

/// Induced 1-norm (maximum absolute column sum).
pub fn one_norm(matrix: &DMatrix<f64>) -> f64 {
    matrix
        .column_iter()
        .map(|col| col.iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0, f64::max)
}

/// Least-squares solution of `lhs · x = rhs`.
pub fn lstsq(lhs: &DMatrix<f64>, rhs: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let svd = lhs.clone().svd(true, true);
    svd.solve(rhs, 1e-12 * svd.singular_values.max())
        .map_err(|msg| anyhow!("Least-squares solve failed: {msg}"))
}

pub fn to_complex(matrix: &DMatrix<f64>) -> DMatrix<Complex64> {
    matrix.map(|v| Complex64::new(v, 0.0))
}

/// Horizontal concatenation `[left | right]`.
pub fn hstack(left: &DMatrix<f64>, right: &DMatrix<f64>) -> DMatrix<f64> {
    let mut out = DMatrix::zeros(left.nrows(), left.ncols() + right.ncols());
    out.columns_mut(0, left.ncols()).copy_from(left);
    out.columns_mut(left.ncols(), right.ncols()).copy_from(right);
    out
}

#[cfg(test)]
mod tests {
    use super::{hstack, logm, lstsq, sqrtm};
    use crate::error::IdentError;
    use nalgebra::DMatrix;

    #[test]
    fn logm_inverts_matrix_exponential() {
        let a = DMatrix::from_row_slice(3, 3, &[-0.5, 2.0, 0.0, -2.0, -0.5, 0.3, 0.1, 0.0, -1.0]);
        let recovered = logm(&a.exp()).expect("logarithm should exist");
        assert!((recovered - a).abs().max() < 1e-9);
    }

    #[test]
    fn logm_handles_identity_blocks() {
        let a = DMatrix::from_row_slice(3, 3, &[0.9, 0.1, 0.5, -0.1, 0.9, 0.2, 0.0, 0.0, 1.0]);
        let log = logm(&a).expect("logarithm should exist");
        assert!((log.exp() - a).abs().max() < 1e-10);
        assert!(log.row(2).abs().max() < 1e-12);
    }

    #[test]
    fn logm_rejects_negative_real_eigenvalue() {
        let a = DMatrix::from_row_slice(2, 2, &[-0.5, 0.0, 0.0, 0.8]);
        let err = logm(&a).expect_err("expected error");
        assert_eq!(
            err.downcast_ref::<IdentError>(),
            Some(&IdentError::NoPrincipalLogarithm)
        );
    }

    #[test]
    fn sqrtm_squares_back() {
        let a = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 0.0, 9.0]);
        let root = sqrtm(&a).expect("square root should converge");
        assert!((&root * &root - a).abs().max() < 1e-12);
    }

    #[test]
    fn lstsq_solves_overdetermined_system() {
        let lhs = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let rhs = DMatrix::from_row_slice(3, 1, &[1.0, 2.0, 3.0]);
        let x = lstsq(&lhs, &rhs).expect("solve should succeed");
        assert!((x[(0, 0)] - 1.0).abs() < 1e-12);
        assert!((x[(1, 0)] - 2.0).abs() < 1e-12);
        let stacked = hstack(&lhs, &rhs);
        assert_eq!(stacked.shape(), (3, 3));
        assert_eq!(stacked[(2, 2)], 3.0);
    }
}
