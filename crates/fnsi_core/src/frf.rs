//! Extended FRF and frequency-dependent nonlinear coefficients.
//!
//! From the continuous-time model, the extended FRF on every active line is
//!
//! ```text
//! He(ω) = Cc (jωI - Ac)⁻¹ [Bc | -Ec] + [Dc | -Fc]
//! ```
//!
//! with one extra all-zero row standing for the ground. A nonlinearity acting
//! between the output DOFs `idx` and `l` then has the coefficient
//! `knl(ω) = He[iu, m + nl] / (He[idx, 0] - He[l, 0])`; connections to ground use
//! the zero row for `l`.

use crate::error::IdentError;
use crate::fnsi::Estimation;
use crate::linalg::{hstack, to_complex};
use crate::lti_conversion::DiscretizationMethod;
use crate::statespace::ExtendedStateSpace;
use anyhow::{bail, Result};
use nalgebra::DMatrix;
use num_complex::Complex64;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use tracing::{info, warn};

/// What to do when a frequency line cannot be evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrequencyPolicy {
    /// Fail the whole extraction with `IdentError::IllConditionedFrequency`.
    #[default]
    Abort,
    /// Fill what could not be evaluated with NaN and record the line in
    /// `ExtendedFrf::skipped`. A line whose solve succeeded keeps its FRF.
    Skip,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrfSettings {
    /// Output DOF colocated with the nonlinear connection (the force location).
    /// `p` addresses the ground row.
    pub output_index: usize,
    pub on_ill_conditioned: FrequencyPolicy,
}

#[derive(Debug, Clone)]
pub struct ExtendedFrf {
    /// Linear FRF, `p x F`.
    pub g: DMatrix<Complex64>,
    /// Nonlinear coefficients, `n_nl x F`.
    pub knl: DMatrix<Complex64>,
    /// One `(p + 1) x (m + n_nl)` slice per line; the last row is the ground.
    pub he: Vec<DMatrix<Complex64>>,
    pub lines: Vec<usize>,
    /// Frequency of each line in Hz.
    pub freq: Vec<f64>,
    /// Positions (into `lines`) that were skipped, fully or for `knl` only.
    pub skipped: Vec<usize>,
}

impl Estimation {
    /// Extended FRF and nonlinear coefficients on the estimation's lines.
    pub fn extended_frf(&self, settings: &FrfSettings) -> Result<ExtendedFrf> {
        extended_frf_and_coefficients(&self.model, self.npp, &self.lines, settings)
    }
}

pub fn extended_frf_and_coefficients(
    model: &ExtendedStateSpace,
    npp: usize,
    lines: &[usize],
    settings: &FrfSettings,
) -> Result<ExtendedFrf> {
    let (n, m, p, n_nl) = (model.n(), model.m(), model.p(), model.n_nl());
    let iu = settings.output_index;
    if iu > p {
        bail!("Output index {} is out of range for {} outputs.", iu, p);
    }
    if npp == 0 {
        bail!("Samples per period must be positive.");
    }
    if let Some(&bad) = lines.iter().find(|&&l| l >= npp) {
        bail!("Line {} is outside the {} FFT bins of a period.", bad, npp);
    }

    let cont = model.to_continuous(DiscretizationMethod::Zoh)?;
    let b_ext = to_complex(&hstack(&cont.b, &(-&cont.e)));
    let d_ext = to_complex(&hstack(&cont.d, &(-&cont.f)));
    let a_c = to_complex(&cont.a);
    let c_c = to_complex(&cont.c);
    let identity = DMatrix::<Complex64>::identity(n, n);

    let grid_step = 1.0 / (model.dt * npp as f64);
    let freq: Vec<f64> = lines.iter().map(|&l| l as f64 * grid_step).collect();
    let count = lines.len();
    let nan = Complex64::new(f64::NAN, f64::NAN);

    let mut g = DMatrix::<Complex64>::zeros(p, count);
    let mut knl = DMatrix::<Complex64>::zeros(n_nl, count);
    let mut he = Vec::with_capacity(count);
    let mut skipped = Vec::new();
    // Only connections anchored at output 0 are supported by the denominator.
    let idx = 0;
    let ground = p;

    for (k, &line) in lines.iter().enumerate() {
        let omega = 2.0 * PI * freq[k];
        let mut slice = DMatrix::<Complex64>::zeros(p + 1, m + n_nl);
        let solved = (&identity * Complex64::new(0.0, omega) - &a_c)
            .lu()
            .solve(&b_ext)
            .map(|x| &c_c * x + &d_ext)
            .filter(|block| block.iter().all(|v| v.is_finite()));

        let ill_conditioned = IdentError::IllConditionedFrequency {
            line,
            frequency: freq[k],
        };

        match solved {
            Some(block) => {
                slice.rows_mut(0, p).copy_from(&block);
                for j in 0..p {
                    g[(j, k)] = slice[(j, 0)];
                }
                let denominator = slice[(idx, 0)] - slice[(ground, 0)];
                if n_nl > 0 && (denominator.norm() == 0.0 || !denominator.is_finite()) {
                    if settings.on_ill_conditioned == FrequencyPolicy::Abort {
                        return Err(ill_conditioned.into());
                    }
                    // The FRF on this line is valid; only the coefficients are lost.
                    warn!(line, frequency = freq[k], "zero coefficient denominator, skipping knl");
                    knl.column_mut(k).fill(nan);
                    skipped.push(k);
                } else {
                    for nl in 0..n_nl {
                        knl[(nl, k)] = slice[(iu, m + nl)] / denominator;
                    }
                }
            }
            None => {
                if settings.on_ill_conditioned == FrequencyPolicy::Abort {
                    return Err(ill_conditioned.into());
                }
                warn!(line, frequency = freq[k], "skipping ill-conditioned frequency line");
                slice.rows_mut(0, p).fill(nan);
                knl.column_mut(k).fill(nan);
                g.column_mut(k).fill(nan);
                skipped.push(k);
            }
        }
        slice.row_mut(ground).fill(Complex64::zero());
        he.push(slice);
    }

    Ok(ExtendedFrf {
        g,
        knl,
        he,
        lines: lines.to_vec(),
        freq,
        skipped,
    })
}

/// Mean real and imaginary parts of one coefficient over frequency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CoefficientSummary {
    pub term: usize,
    pub mean_re: f64,
    pub mean_im: f64,
    /// `log10(|mean_re / mean_im|)`: 1 means the real part is ten times larger.
    pub log_ratio: f64,
}

impl fmt::Display for CoefficientSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "term {}: Re(mu) {:.4e}  Im(mu) {:.4e}  ratio log10(Re/Im) = {:.2}",
            self.term, self.mean_re, self.mean_im, self.log_ratio
        )
    }
}

/// Summarizes every row of `knl`, ignoring skipped (non-finite) lines.
pub fn coefficient_report(knl: &DMatrix<Complex64>) -> Vec<CoefficientSummary> {
    knl.row_iter()
        .enumerate()
        .map(|(term, row)| {
            let finite: Vec<Complex64> = row.iter().copied().filter(|v| v.is_finite()).collect();
            let count = finite.len().max(1) as f64;
            let mean_re = finite.iter().map(|v| v.re).sum::<f64>() / count;
            let mean_im = finite.iter().map(|v| v.im).sum::<f64>() / count;
            let summary = CoefficientSummary {
                term,
                mean_re,
                mean_im,
                log_ratio: (mean_re / mean_im).abs().log10(),
            };
            info!("{summary}");
            summary
        })
        .collect()
}
