//! Synthetic single-DOF oscillator records shared by the unit tests.
//!
//! `ẍ + 2ζω ẋ + ω² x + k3 x³ = f`, sampled at 1024 Hz with one 1024-sample
//! period and a 5–100 Hz multisine force.

use crate::linalg::hstack;
use crate::lti_conversion::{continuous_to_discrete, DiscretizationMethod, LtiMatrices};
use crate::nonlinearity::{NonlinearitySet, Polynomial};
use crate::signal::{multisine, Signal};
use crate::spectrum::{fft_columns, ifft_real};
use crate::statespace::{transfer, ExtendedStateSpace};
use nalgebra::DMatrix;
use num_complex::Complex64;
use std::f64::consts::PI;

pub(crate) const NPP: usize = 1024;
pub(crate) const DT: f64 = 1.0 / 1024.0;
pub(crate) const K3: f64 = 5.0e6;
const NATURAL_FREQUENCY_HZ: f64 = 20.0;
const DAMPING_RATIO: f64 = 0.02;
const FORCE_RMS: f64 = 50.0;

pub(crate) fn continuous_truth() -> LtiMatrices {
    let omega = 2.0 * PI * NATURAL_FREQUENCY_HZ;
    LtiMatrices::new(
        DMatrix::from_row_slice(2, 2, &[0.0, 1.0, -omega * omega, -2.0 * DAMPING_RATIO * omega]),
        DMatrix::from_row_slice(2, 1, &[0.0, 1.0]),
        DMatrix::from_row_slice(1, 2, &[1.0, 0.0]),
        DMatrix::zeros(1, 1),
    )
    .expect("valid shapes")
}

/// `C (j2πf I - A)⁻¹ B + D` of the continuous linear part.
pub(crate) fn analytic_frf(freq_hz: f64) -> Complex64 {
    let sys = continuous_truth();
    transfer(&sys.a, &sys.b, &sys.c, &sys.d, Complex64::new(0.0, 2.0 * PI * freq_hz))
        .expect("response")[(0, 0)]
}

/// ZOH discretization with the cubic term held like the force.
pub(crate) fn discrete_model(k3: f64) -> ExtendedStateSpace {
    let sys = continuous_truth();
    let e_c = DMatrix::from_row_slice(2, 1, &[0.0, -k3]);
    let ext = LtiMatrices::new(
        sys.a.clone(),
        hstack(&sys.b, &e_c),
        sys.c.clone(),
        DMatrix::zeros(1, 2),
    )
    .expect("valid shapes");
    let disc = continuous_to_discrete(&ext, DT, DiscretizationMethod::Zoh).expect("c2d");
    ExtendedStateSpace::new(
        disc.a,
        disc.b.columns(0, 1).into_owned(),
        disc.c,
        sys.d,
        disc.b.columns(1, 1).into_owned(),
        DMatrix::zeros(1, 1),
        DT,
    )
    .expect("valid model")
}

/// Force record and its excited lines.
fn force() -> (DMatrix<f64>, Vec<usize>) {
    let ms = multisine(5.0, 100.0, 1.0 / DT, NPP, FORCE_RMS).expect("multisine");
    (DMatrix::from_column_slice(NPP, 1, &ms.samples), ms.lines)
}

/// Steady-state response of the linear oscillator, built line by line.
pub(crate) fn linear_signal() -> Signal {
    let (u, lines) = force();
    steady_state_signal(&discrete_model(0.0), u, &lines)
}

/// Unit-frequency oscillator `ẍ + 0.1 ẋ + x = f` in continuous time.
pub(crate) fn reference_oscillator() -> LtiMatrices {
    LtiMatrices::new(
        DMatrix::from_row_slice(2, 2, &[0.0, 1.0, -1.0, -0.1]),
        DMatrix::from_row_slice(2, 1, &[0.0, 1.0]),
        DMatrix::from_row_slice(1, 2, &[1.0, 0.0]),
        DMatrix::zeros(1, 1),
    )
    .expect("valid shapes")
}

/// Steady-state response of the ZOH-sampled reference oscillator to a unit
/// RMS multisine on lines 1..=100.
pub(crate) fn reference_signal() -> Signal {
    let sys = reference_oscillator();
    let disc = continuous_to_discrete(&sys, DT, DiscretizationMethod::Zoh).expect("c2d");
    let model = ExtendedStateSpace::linear(disc.a, disc.b, disc.c, disc.d, DT).expect("model");
    let ms = multisine(1.0, 100.0, 1.0 / DT, NPP, 1.0).expect("multisine");
    let u = DMatrix::from_column_slice(NPP, 1, &ms.samples);
    steady_state_signal(&model, u, &ms.lines)
}

/// Exact periodic output of a linear model, one excited line at a time.
fn steady_state_signal(model: &ExtendedStateSpace, u: DMatrix<f64>, lines: &[usize]) -> Signal {
    let u_spec = fft_columns(&u);
    let mut y_spec = DMatrix::from_element(NPP, 1, Complex64::new(0.0, 0.0));
    for &k in lines {
        let z = Complex64::from_polar(1.0, 2.0 * PI * k as f64 / NPP as f64);
        let h = model.frequency_response(z).expect("response")[(0, 0)];
        y_spec[(k, 0)] = h * u_spec[(k, 0)];
        y_spec[(NPP - k, 0)] = y_spec[(k, 0)].conj();
    }
    let y = ifft_real(&y_spec);
    Signal::new(vec![u], vec![y], NPP, DT).expect("signal")
}

/// Steady-state response with the cubic spring, by time simulation.
pub(crate) fn nonlinear_signal() -> Signal {
    let (u, _) = force();
    let model = discrete_model(K3);
    let nlx = NonlinearitySet::new().with(Polynomial::new(3, vec![1.0]));
    let y = model.simulate_periodic(&nlx, &u, 12).expect("simulation");
    Signal::new(vec![u], vec![y], NPP, DT).expect("signal")
}
