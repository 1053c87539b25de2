//! Measured periodic input/output records.

use crate::spectrum::{fft_columns, ifft_real};
use anyhow::{bail, Result};
use nalgebra::DMatrix;
use num_complex::Complex64;
use num_traits::Zero;
use std::f64::consts::PI;

/// Relative magnitude below which an input line is treated as not excited.
const EXCITATION_THRESHOLD: f64 = 1e-8;

/// Periodic input/output data, one record per realization.
///
/// Each record holds `P` consecutive periods of `npp` samples; rows are samples,
/// columns are channels.
#[derive(Debug, Clone)]
pub struct Signal {
    u: Vec<DMatrix<f64>>,
    y: Vec<DMatrix<f64>>,
    um: Vec<DMatrix<f64>>,
    ym: Vec<DMatrix<f64>>,
    npp: usize,
    periods: usize,
    dt: f64,
    lines: Vec<usize>,
}

impl Signal {
    pub fn new(u: Vec<DMatrix<f64>>, y: Vec<DMatrix<f64>>, npp: usize, dt: f64) -> Result<Self> {
        if u.is_empty() {
            bail!("Signal requires at least one realization.");
        }
        if u.len() != y.len() {
            bail!(
                "Realization count mismatch: {} input records, {} output records.",
                u.len(),
                y.len()
            );
        }
        if npp == 0 {
            bail!("Samples per period must be positive.");
        }
        if dt <= 0.0 {
            bail!("Sampling interval dt must be positive.");
        }

        let samples = u[0].nrows();
        let m = u[0].ncols();
        let p = y[0].ncols();
        if m == 0 || p == 0 {
            bail!("Signal needs at least one input and one output channel.");
        }
        if samples == 0 || samples % npp != 0 {
            bail!(
                "Record length {} is not a whole number of periods of {} samples.",
                samples,
                npp
            );
        }
        for (r, (ur, yr)) in u.iter().zip(y.iter()).enumerate() {
            if ur.shape() != (samples, m) || yr.shape() != (samples, p) {
                bail!(
                    "Realization {} has shape u {:?}, y {:?}; expected ({}, {}) and ({}, {}).",
                    r,
                    ur.shape(),
                    yr.shape(),
                    samples,
                    m,
                    samples,
                    p
                );
            }
        }

        let periods = samples / npp;
        let um: Vec<DMatrix<f64>> = u.iter().map(|ur| period_mean(ur, npp, periods)).collect();
        let ym: Vec<DMatrix<f64>> = y.iter().map(|yr| period_mean(yr, npp, periods)).collect();
        let lines = excited_lines(&um[0], npp);

        Ok(Self {
            u,
            y,
            um,
            ym,
            npp,
            periods,
            dt,
            lines,
        })
    }

    /// Replaces the detected excitation lines.
    pub fn with_lines(mut self, lines: Vec<usize>) -> Result<Self> {
        if let Some(&bad) = lines.iter().find(|&&l| l >= self.npp) {
            bail!("Line {} is outside the {} FFT bins of a period.", bad, self.npp);
        }
        self.lines = lines;
        Ok(self)
    }

    pub fn npp(&self) -> usize {
        self.npp
    }

    pub fn m(&self) -> usize {
        self.u[0].ncols()
    }

    pub fn p(&self) -> usize {
        self.y[0].ncols()
    }

    pub fn realizations(&self) -> usize {
        self.u.len()
    }

    pub fn periods(&self) -> usize {
        self.periods
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn fs(&self) -> f64 {
        1.0 / self.dt
    }

    pub fn lines(&self) -> &[usize] {
        &self.lines
    }

    pub fn u(&self, realization: usize) -> &DMatrix<f64> {
        &self.u[realization]
    }

    pub fn y(&self, realization: usize) -> &DMatrix<f64> {
        &self.y[realization]
    }

    /// Input averaged over periods, `npp x m`.
    pub fn um(&self, realization: usize) -> &DMatrix<f64> {
        &self.um[realization]
    }

    /// Output averaged over periods, `npp x p`.
    pub fn ym(&self, realization: usize) -> &DMatrix<f64> {
        &self.ym[realization]
    }

    /// Every sample of one input channel, across realizations and periods.
    pub fn input_channel(&self, channel: usize) -> Vec<f64> {
        self.u
            .iter()
            .flat_map(|ur| ur.column(channel).iter().copied().collect::<Vec<_>>())
            .collect()
    }
}

fn period_mean(record: &DMatrix<f64>, npp: usize, periods: usize) -> DMatrix<f64> {
    let mut mean = DMatrix::zeros(npp, record.ncols());
    for period in 0..periods {
        mean += record.rows(period * npp, npp);
    }
    mean / periods as f64
}

fn excited_lines(um: &DMatrix<f64>, npp: usize) -> Vec<usize> {
    let spectrum = fft_columns(um);
    let half = npp.div_ceil(2);
    let magnitude = |k: usize| -> f64 {
        spectrum
            .row(k)
            .iter()
            .map(|c| c.norm())
            .fold(0.0, f64::max)
    };
    let peak = (1..half).map(magnitude).fold(0.0, f64::max);
    if peak == 0.0 {
        return Vec::new();
    }
    (1..half)
        .filter(|&k| magnitude(k) > EXCITATION_THRESHOLD * peak)
        .collect()
}

/// One period of a flat-spectrum multisine.
#[derive(Debug, Clone)]
pub struct Multisine {
    /// `npp` samples of the excitation.
    pub samples: Vec<f64>,
    /// Excited FFT lines.
    pub lines: Vec<usize>,
}

/// Schroeder-phased multisine exciting the band [f1, f2] with the given RMS.
///
/// The phases `φ_k = -π k (k-1) / K` keep the crest factor low without a random
/// generator, so the record is reproducible.
pub fn multisine(f1: f64, f2: f64, fs: f64, npp: usize, rms: f64) -> Result<Multisine> {
    if npp < 4 {
        bail!("A multisine period needs at least 4 samples.");
    }
    if fs <= 0.0 {
        bail!("Sampling frequency must be positive.");
    }
    if !(f1 >= 0.0 && f2 >= f1) {
        bail!("Invalid band [{}, {}].", f1, f2);
    }
    let first = ((f1 / fs * npp as f64).floor() as usize).max(1);
    let last = ((f2 / fs * npp as f64).ceil() as usize).min(npp.div_ceil(2) - 1);
    if first > last {
        bail!("Band [{}, {}] Hz contains no FFT line.", f1, f2);
    }

    let lines: Vec<usize> = (first..=last).collect();
    let count = lines.len() as f64;
    let mut spectrum = DMatrix::from_element(npp, 1, Complex64::zero());
    for (idx, &line) in lines.iter().enumerate() {
        let k = (idx + 1) as f64;
        let phase = -PI * k * (k - 1.0) / count;
        let value = Complex64::from_polar(1.0, phase);
        spectrum[(line, 0)] = value;
        spectrum[(npp - line, 0)] = value.conj();
    }

    let raw = ifft_real(&spectrum);
    let raw_rms = (raw.iter().map(|v| v * v).sum::<f64>() / npp as f64).sqrt();
    if raw_rms == 0.0 {
        bail!("Multisine has zero energy.");
    }
    let samples = raw.iter().map(|v| v * rms / raw_rms).collect();
    Ok(Multisine { samples, lines })
}
