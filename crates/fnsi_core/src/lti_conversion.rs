//! Conversion of (A, B, C, D) between continuous and discrete time.

use crate::error::IdentError;
use crate::linalg::logm;
use anyhow::{anyhow, bail, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum DiscretizationMethod {
    /// Zero-order hold: the input is constant between samples.
    #[default]
    Zoh,
    /// Generalized bilinear transform with weight `alpha` in [0, 1].
    Gbt { alpha: f64 },
    /// Tustin, `alpha = 0.5`.
    Bilinear,
    /// Forward Euler, `alpha = 0`.
    Euler,
    /// Backward difference, `alpha = 1`.
    BackwardDiff,
}

impl DiscretizationMethod {
    /// Parses a method name. `alpha` is only read by `gbt` and ignored otherwise.
    pub fn from_name(name: &str, alpha: Option<f64>) -> Result<Self> {
        let method = match name.to_ascii_lowercase().as_str() {
            "zoh" => DiscretizationMethod::Zoh,
            "bilinear" | "tustin" => DiscretizationMethod::Bilinear,
            "euler" | "forward_diff" => DiscretizationMethod::Euler,
            "backward_diff" => DiscretizationMethod::BackwardDiff,
            "gbt" => {
                let alpha = alpha.ok_or_else(|| anyhow!("Method gbt requires alpha."))?;
                DiscretizationMethod::Gbt { alpha }
            }
            _ => {
                return Err(IdentError::UnsupportedMethod {
                    name: name.to_string(),
                }
                .into())
            }
        };
        Ok(method)
    }

    fn gbt_alpha(self) -> Option<f64> {
        match self {
            DiscretizationMethod::Zoh => None,
            DiscretizationMethod::Gbt { alpha } => Some(alpha),
            DiscretizationMethod::Bilinear => Some(0.5),
            DiscretizationMethod::Euler => Some(0.0),
            DiscretizationMethod::BackwardDiff => Some(1.0),
        }
    }
}

/// Plain linear state-space matrices, in either time domain.
#[derive(Debug, Clone, PartialEq)]
pub struct LtiMatrices {
    pub a: DMatrix<f64>,
    pub b: DMatrix<f64>,
    pub c: DMatrix<f64>,
    pub d: DMatrix<f64>,
}

impl LtiMatrices {
    pub fn new(a: DMatrix<f64>, b: DMatrix<f64>, c: DMatrix<f64>, d: DMatrix<f64>) -> Result<Self> {
        let n = a.nrows();
        if !a.is_square() {
            bail!("A must be square, got {:?}.", a.shape());
        }
        if b.nrows() != n || c.ncols() != n || d.nrows() != c.nrows() || d.ncols() != b.ncols() {
            bail!(
                "Inconsistent shapes: A {:?}, B {:?}, C {:?}, D {:?}.",
                a.shape(),
                b.shape(),
                c.shape(),
                d.shape()
            );
        }
        Ok(Self { a, b, c, d })
    }
}

pub fn discrete_to_continuous(sys: &LtiMatrices, dt: f64, method: DiscretizationMethod) -> Result<LtiMatrices> {
    if dt <= 0.0 {
        bail!("Sampling interval dt must be positive.");
    }
    let n = sys.a.nrows();
    let m = sys.b.ncols();

    match method.gbt_alpha() {
        None => {
            // [[A, B], [0, I]] = exp([[Ac, Bc], [0, 0]] dt)
            let mut augmented = DMatrix::zeros(n + m, n + m);
            augmented.view_mut((0, 0), (n, n)).copy_from(&sys.a);
            augmented.view_mut((0, n), (n, m)).copy_from(&sys.b);
            augmented
                .view_mut((n, n), (m, m))
                .fill_with_identity();
            let log = logm(&augmented)? / dt;
            Ok(LtiMatrices {
                a: log.view((0, 0), (n, n)).into_owned(),
                b: log.view((0, n), (n, m)).into_owned(),
                c: sys.c.clone(),
                d: sys.d.clone(),
            })
        }
        Some(alpha) => {
            let identity = DMatrix::<f64>::identity(n, n);
            let denominator = &sys.a * alpha + &identity * (1.0 - alpha);
            let denominator_inv = denominator
                .try_inverse()
                .ok_or_else(|| anyhow!("GBT inverse is singular for alpha = {}.", alpha))?;
            let a = (&sys.a - &identity) * denominator_inv / dt;
            let ima = &identity - &a * (alpha * dt);
            let b = &ima * &sys.b / dt;
            let c = &sys.c * &ima;
            let d = &sys.d - &c * &sys.b * alpha;
            Ok(LtiMatrices { a, b, c, d })
        }
    }
}

pub fn continuous_to_discrete(sys: &LtiMatrices, dt: f64, method: DiscretizationMethod) -> Result<LtiMatrices> {
    if dt <= 0.0 {
        bail!("Sampling interval dt must be positive.");
    }
    let n = sys.a.nrows();
    let m = sys.b.ncols();

    match method.gbt_alpha() {
        None => {
            let mut augmented = DMatrix::zeros(n + m, n + m);
            augmented.view_mut((0, 0), (n, n)).copy_from(&(&sys.a * dt));
            augmented.view_mut((0, n), (n, m)).copy_from(&(&sys.b * dt));
            let transition = augmented.exp();
            Ok(LtiMatrices {
                a: transition.view((0, 0), (n, n)).into_owned(),
                b: transition.view((0, n), (n, m)).into_owned(),
                c: sys.c.clone(),
                d: sys.d.clone(),
            })
        }
        Some(alpha) => {
            let identity = DMatrix::<f64>::identity(n, n);
            let ima = &identity - &sys.a * (alpha * dt);
            let ima_inv = ima
                .try_inverse()
                .ok_or_else(|| anyhow!("GBT transform is singular for alpha = {}.", alpha))?;
            let a = &ima_inv * (&identity + &sys.a * ((1.0 - alpha) * dt));
            let b = &ima_inv * &sys.b * dt;
            let c = &sys.c * &ima_inv;
            let d = &sys.d + &sys.c * &b * alpha;
            Ok(LtiMatrices { a, b, c, d })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{continuous_to_discrete, discrete_to_continuous, DiscretizationMethod, LtiMatrices};
    use crate::error::IdentError;
    use nalgebra::DMatrix;

    fn oscillator() -> LtiMatrices {
        LtiMatrices::new(
            DMatrix::from_row_slice(2, 2, &[0.0, 1.0, -400.0, -2.0]),
            DMatrix::from_row_slice(2, 1, &[0.0, 1.0]),
            DMatrix::from_row_slice(1, 2, &[1.0, 0.0]),
            DMatrix::from_row_slice(1, 1, &[0.1]),
        )
        .expect("valid shapes")
    }

    fn max_diff(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
        (a - b).abs().max()
    }

    #[test]
    fn zoh_round_trip_restores_continuous_model() {
        let sys = oscillator();
        let dt = 1.0 / 256.0;
        let disc = continuous_to_discrete(&sys, dt, DiscretizationMethod::Zoh).expect("c2d");
        assert_eq!(disc.c, sys.c);
        assert_eq!(disc.d, sys.d);
        let cont = discrete_to_continuous(&disc, dt, DiscretizationMethod::Zoh).expect("d2c");
        assert!(max_diff(&cont.a, &sys.a) < 1e-7);
        assert!(max_diff(&cont.b, &sys.b) < 1e-9);
        assert_eq!(cont.c, sys.c);
        assert_eq!(cont.d, sys.d);
    }

    #[test]
    fn gbt_family_round_trips() {
        let sys = oscillator();
        let dt = 1.0 / 512.0;
        for method in [
            DiscretizationMethod::Bilinear,
            DiscretizationMethod::Euler,
            DiscretizationMethod::BackwardDiff,
            DiscretizationMethod::Gbt { alpha: 0.3 },
        ] {
            let disc = continuous_to_discrete(&sys, dt, method).expect("c2d");
            let cont = discrete_to_continuous(&disc, dt, method).expect("d2c");
            assert!(max_diff(&cont.a, &sys.a) < 1e-8, "{method:?}");
            assert!(max_diff(&cont.b, &sys.b) < 1e-10, "{method:?}");
            assert!(max_diff(&cont.c, &sys.c) < 1e-10, "{method:?}");
            assert!(max_diff(&cont.d, &sys.d) < 1e-10, "{method:?}");
        }
    }

    #[test]
    fn method_names_parse_and_reject_unknown() {
        assert_eq!(
            DiscretizationMethod::from_name("tustin", None).expect("known"),
            DiscretizationMethod::Bilinear
        );
        assert_eq!(
            DiscretizationMethod::from_name("gbt", Some(0.25)).expect("known"),
            DiscretizationMethod::Gbt { alpha: 0.25 }
        );
        assert!(DiscretizationMethod::from_name("gbt", None).is_err());
        let err = DiscretizationMethod::from_name("foh", None).expect_err("unknown");
        assert_eq!(
            err.downcast_ref::<IdentError>(),
            Some(&IdentError::UnsupportedMethod {
                name: "foh".to_string()
            })
        );
    }
}
