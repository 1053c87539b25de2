//! DFT helpers over sample-major matrices.
//!
//! Transforms run along the rows (time axis) of a `samples x channels` matrix and
//! follow the unnormalized forward convention: `X[k] = Σ x[t] e^{-j2πkt/N}`.

use nalgebra::DMatrix;
use num_complex::Complex64;
use rustfft::FftPlanner;

/// Forward DFT of every column of a real matrix.
pub fn fft_columns(signal: &DMatrix<f64>) -> DMatrix<Complex64> {
    fft_columns_complex(&signal.map(|v| Complex64::new(v, 0.0)))
}

/// Forward DFT of every column of a complex matrix.
pub fn fft_columns_complex(signal: &DMatrix<Complex64>) -> DMatrix<Complex64> {
    let (rows, cols) = signal.shape();
    let mut out = DMatrix::zeros(rows, cols);
    if rows == 0 {
        return out;
    }
    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(rows);
    let mut buffer = vec![Complex64::new(0.0, 0.0); rows];
    for j in 0..cols {
        for (i, slot) in buffer.iter_mut().enumerate() {
            *slot = signal[(i, j)];
        }
        fft.process(&mut buffer);
        for (i, value) in buffer.iter().enumerate() {
            out[(i, j)] = *value;
        }
    }
    out
}

/// Inverse DFT of every column, scaled by 1/N, keeping the real part.
/// Intended for spectra with Hermitian symmetry.
pub fn ifft_real(spectrum: &DMatrix<Complex64>) -> DMatrix<f64> {
    let (rows, cols) = spectrum.shape();
    let mut out = DMatrix::zeros(rows, cols);
    if rows == 0 {
        return out;
    }
    let mut planner = FftPlanner::<f64>::new();
    let ifft = planner.plan_fft_inverse(rows);
    let mut buffer = vec![Complex64::new(0.0, 0.0); rows];
    let scale = 1.0 / rows as f64;
    for j in 0..cols {
        for (i, slot) in buffer.iter_mut().enumerate() {
            *slot = spectrum[(i, j)];
        }
        ifft.process(&mut buffer);
        for (i, value) in buffer.iter().enumerate() {
            out[(i, j)] = value.re * scale;
        }
    }
    out
}
