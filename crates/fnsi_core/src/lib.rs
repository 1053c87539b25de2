//! The `fnsi_core` crate identifies grey-box nonlinear state-space models of
//! vibrating structures from periodic frequency-domain data.
//!
//! Key components:
//! - **Signal**: period-averaged input/output records and multisine excitation.
//! - **Nonlinearity**: user-chosen basis functions (`Polynomial`, `TanhDryFriction`, ...).
//! - **FNSI**: extended-input construction and subspace estimation of (A, B, C, D, E).
//! - **LTI conversion**: discrete ↔ continuous mapping (ZOH, generalized bilinear).
//! - **FRF**: extended FRF and frequency-dependent nonlinear coefficients.

pub mod error;
pub mod fnsi;
pub mod frf;
pub mod linalg;
pub mod lti_conversion;
pub mod nonlinearity;
pub mod signal;
pub mod spectrum;
pub mod statespace;
pub mod subspace;
pub mod traits;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::IdentError;
pub use fnsi::{estimate, ext_input, Estimation, EstimationSettings, ExtendedInput};
pub use frf::{
    coefficient_report, extended_frf_and_coefficients, CoefficientSummary, ExtendedFrf,
    FrequencyPolicy, FrfSettings,
};
pub use lti_conversion::DiscretizationMethod;
pub use nonlinearity::{NonlinearitySet, Polynomial, TanhDryFriction, UnilateralSpring};
pub use signal::{multisine, Signal};
pub use statespace::{ContinuousStateSpace, ExtendedStateSpace};
pub use subspace::{BdMethod, Weighting};
