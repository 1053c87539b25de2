//! Frequency-domain nonlinear subspace identification (FNSI).
//!
//! The measured force is augmented with the evaluated nonlinear basis functions,
//! forming the extended input `e = [u, -g(y)]`. A linear subspace realization on
//! `e → y` yields `Bext = [B | -E]`, `Dext = [D | -F]`, from which the linear
//! dynamics and the nonlinear coupling E are read off.

use crate::error::IdentError;
use crate::nonlinearity::NonlinearitySet;
use crate::signal::Signal;
use crate::spectrum::fft_columns;
use crate::statespace::ExtendedStateSpace;
use crate::subspace::{subspace, BdMethod, Weighting};
use anyhow::{bail, Result};
use nalgebra::DMatrix;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationSettings {
    /// Model order n.
    pub order: usize,
    /// Block rows r of the subspace data matrix, r > n.
    pub block_rows: usize,
    pub bd_method: BdMethod,
    /// Lower band edge in Hz. The band is only used when both edges are set.
    pub fmin: Option<f64>,
    /// Upper band edge in Hz.
    pub fmax: Option<f64>,
    pub weighting: Weighting,
}

impl Default for EstimationSettings {
    fn default() -> Self {
        Self {
            order: 2,
            block_rows: 10,
            bd_method: BdMethod::Explicit,
            fmin: None,
            fmax: None,
            weighting: Weighting::Uniform,
        }
    }
}

impl EstimationSettings {
    pub fn new(order: usize, block_rows: usize) -> Self {
        Self {
            order,
            block_rows,
            ..Self::default()
        }
    }

    pub fn with_band(mut self, fmin: f64, fmax: f64) -> Self {
        self.fmin = Some(fmin);
        self.fmax = Some(fmax);
        self
    }
}

/// Extended spectra on the active lines, normalized by `1/sqrt(npp)`.
#[derive(Debug, Clone)]
pub struct ExtendedInput {
    /// `F x (m + n_nl)`, columns `[U | -FNL]`.
    pub u: DMatrix<Complex64>,
    /// `F x p`
    pub y: DMatrix<Complex64>,
    /// Amplitude factor applied to each nonlinear column.
    pub scaling: Vec<f64>,
    pub lines: Vec<usize>,
}

/// Builds the extended input and output spectra.
///
/// Spectra are taken of the period-averaged signals, which equals averaging the
/// per-period spectra only for truly periodic data. The nonlinear basis is
/// evaluated on the averaged output with zero velocity, and every column is
/// rescaled to the (population) standard deviation of input channel 0 before
/// transforming.
pub fn ext_input(
    signal: &Signal,
    nlx: &NonlinearitySet,
    fmin: Option<f64>,
    fmax: Option<f64>,
) -> Result<ExtendedInput> {
    if signal.realizations() != 1 {
        return Err(IdentError::MultipleRealizations {
            realizations: signal.realizations(),
        }
        .into());
    }
    let npp = signal.npp();
    let lines = active_lines(signal, fmin, fmax)?;
    if lines.is_empty() {
        bail!("No active frequency lines to identify from.");
    }

    let um = signal.um(0);
    let ym = signal.ym(0);
    let u_mean = fft_columns(um);
    let y_mean = fft_columns(ym);

    let (extended, scaling) = if nlx.is_empty() {
        (u_mean, Vec::new())
    } else {
        let velocity = DMatrix::zeros(ym.nrows(), ym.ncols());
        let mut fnl = nlx.fnl(0.0, ym, &velocity);
        let u_std = signal.u(0).column(0).variance().sqrt();
        let mut scaling = Vec::with_capacity(fnl.ncols());
        for j in 0..fnl.ncols() {
            let fnl_std = fnl.column(j).variance().sqrt();
            if fnl_std == 0.0 || !fnl_std.is_finite() {
                return Err(IdentError::DegenerateNonlinearity { term: j }.into());
            }
            let factor = u_std / fnl_std;
            fnl.column_mut(j).scale_mut(factor);
            scaling.push(factor);
        }
        let fnl_spectrum = fft_columns(&fnl);
        let m = u_mean.ncols();
        let mut extended = DMatrix::zeros(npp, m + fnl.ncols());
        extended.columns_mut(0, m).copy_from(&u_mean);
        extended
            .columns_mut(m, fnl.ncols())
            .copy_from(&(-fnl_spectrum));
        (extended, scaling)
    };

    let norm = (npp as f64).sqrt();
    let u = extended.select_rows(lines.iter()) / Complex64::new(norm, 0.0);
    let y = y_mean.select_rows(lines.iter()) / Complex64::new(norm, 0.0);
    Ok(ExtendedInput {
        u,
        y,
        scaling,
        lines,
    })
}

/// `floor(fmin/fs·npp) ..= ceil(fmax/fs·npp)` when both edges are given,
/// otherwise the signal's own lines.
fn active_lines(signal: &Signal, fmin: Option<f64>, fmax: Option<f64>) -> Result<Vec<usize>> {
    let (fmin, fmax) = match (fmin, fmax) {
        (Some(fmin), Some(fmax)) => (fmin, fmax),
        _ => return Ok(signal.lines().to_vec()),
    };
    if fmin < 0.0 || fmax < fmin {
        bail!("Invalid frequency band [{}, {}] Hz.", fmin, fmax);
    }
    let npp = signal.npp();
    let fs = signal.fs();
    let first = (fmin / fs * npp as f64).floor() as usize;
    let last = (fmax / fs * npp as f64).ceil() as usize;
    if last >= npp {
        bail!(
            "Band upper edge {} Hz maps to line {}, beyond the {} lines of a period.",
            fmax,
            last,
            npp
        );
    }
    Ok((first..=last).collect())
}

/// Outcome of one identification run.
///
/// Carries the model together with the context later steps depend on (active
/// lines, period length, scaling), so nothing has to be read back from the model.
#[derive(Debug, Clone)]
pub struct Estimation {
    pub model: ExtendedStateSpace,
    pub order: usize,
    pub block_rows: usize,
    pub lines: Vec<usize>,
    pub npp: usize,
    pub scaling: Vec<f64>,
    /// Output-equation coefficients recovered alongside E. The model keeps F at
    /// zero; this estimate is reported but not applied.
    pub f_estimate: DMatrix<f64>,
    pub singular_values: Vec<f64>,
    pub is_stable: bool,
}

/// Identifies A, B, C, D and E from a single-realization periodic signal.
pub fn estimate(
    signal: &Signal,
    nlx: &NonlinearitySet,
    settings: &EstimationSettings,
) -> Result<Estimation> {
    let n = settings.order;
    let r = settings.block_rows;
    if n == 0 {
        bail!("Model order must be positive.");
    }
    if r <= n {
        bail!("Block rows r = {} must exceed the model order n = {}.", r, n);
    }

    let ExtendedInput {
        u,
        y,
        scaling,
        lines,
    } = ext_input(signal, nlx, settings.fmin, settings.fmax)?;

    let npp = signal.npp();
    let m = signal.m();
    let p = signal.p();
    let n_nl = nlx.n_nl();
    let freq: Vec<f64> = lines.iter().map(|&l| l as f64 / npp as f64).collect();
    debug!(
        order = n,
        block_rows = r,
        lines = lines.len(),
        inputs = m,
        outputs = p,
        n_nl,
        "running frequency-domain subspace realization"
    );

    let realization = subspace(&freq, n, r, &u, &y, settings.bd_method, &settings.weighting)?;
    if !realization.is_stable {
        warn!(order = n, "identified discrete model is unstable");
    }

    let bd = &realization.b;
    let dd = &realization.d;
    let mut e = DMatrix::zeros(n, n_nl);
    let mut f = DMatrix::zeros(p, n_nl);
    for (i, factor) in scaling.iter().enumerate() {
        e.set_column(i, &(bd.column(m + i) * -factor));
        f.set_column(i, &(dd.column(m + i) * -factor));
    }

    let model = ExtendedStateSpace::new(
        realization.a,
        bd.columns(0, m).into_owned(),
        realization.c,
        dd.columns(0, m).into_owned(),
        e,
        DMatrix::zeros(p, n_nl),
        signal.dt(),
    )?;

    Ok(Estimation {
        model,
        order: n,
        block_rows: r,
        lines,
        npp,
        scaling,
        f_estimate: f,
        singular_values: realization.singular_values,
        is_stable: realization.is_stable,
    })
}
