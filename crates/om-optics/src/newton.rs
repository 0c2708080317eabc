//! Damped Newton iteration for fixed points of nonlinear maps.

use nalgebra::{DMatrix, DVector};
use om_linalg::solve_dense;

use crate::error::{OpticsError, OpticsResult};

/// Newton solver configuration.
#[derive(Clone, Copy, Debug)]
pub struct NewtonConfig {
    /// Maximum iterations
    pub max_iterations: usize,
    /// Convergence threshold on the max-abs residual component
    pub tolerance: f64,
    /// Step relaxation λ in (0, 1]
    pub relaxation: f64,
    /// Singularity tolerance for the linear solve
    pub singular_tol: f64,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            tolerance: 1e-12,
            relaxation: 1.0,
            singular_tol: 1e-14,
        }
    }
}

/// Newton iteration result.
#[derive(Clone, Debug)]
pub struct NewtonResult {
    /// Solution vector
    pub x: DVector<f64>,
    /// Final max-abs residual
    pub residual_norm: f64,
    /// Number of Newton steps taken
    pub iterations: usize,
}

/// Max-abs norm used for mismatch.
pub fn mismatch(r: &DVector<f64>) -> f64 {
    r.amax()
}

/// Solve F(x) = 0 with X ← X − λ J⁻¹ F(X).
///
/// `on_iteration(iteration, residual)` runs once per iteration before the
/// convergence check and may abort the solve (cancellation). The Jacobian
/// callback receives the iteration index so callers can use an analytic
/// first step.
pub fn newton_solve<F, J, C>(
    x0: DVector<f64>,
    residual_fn: F,
    mut jacobian_fn: J,
    config: &NewtonConfig,
    mut on_iteration: C,
) -> OpticsResult<NewtonResult>
where
    F: Fn(&DVector<f64>) -> OpticsResult<DVector<f64>>,
    J: FnMut(usize, &DVector<f64>) -> OpticsResult<DMatrix<f64>>,
    C: FnMut(usize, f64) -> OpticsResult<()>,
{
    let mut x = x0;

    for iter in 0..config.max_iterations {
        let r = residual_fn(&x)?;
        let r_norm = mismatch(&r);
        on_iteration(iter, r_norm)?;

        if r_norm < config.tolerance {
            return Ok(NewtonResult {
                x,
                residual_norm: r_norm,
                iterations: iter,
            });
        }

        let jac = jacobian_fn(iter, &x)?;
        let dx = solve_dense(&jac, &r, config.singular_tol)?;
        x -= config.relaxation * dx;
    }

    let r = residual_fn(&x)?;
    let r_norm = mismatch(&r);
    if r_norm < config.tolerance {
        return Ok(NewtonResult {
            x,
            residual_norm: r_norm,
            iterations: config.max_iterations,
        });
    }

    let mut last_orbit = [0.0; 6];
    for (slot, v) in last_orbit.iter_mut().zip(x.iter()) {
        *slot = *v;
    }
    Err(OpticsError::ConvergenceFailure {
        iterations: config.max_iterations,
        residual: r_norm,
        last_orbit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quadratic() -> (
        impl Fn(&DVector<f64>) -> OpticsResult<DVector<f64>>,
        impl FnMut(usize, &DVector<f64>) -> OpticsResult<DMatrix<f64>>,
    ) {
        // Solve x^2 - 4 = 0
        let residual = |x: &DVector<f64>| -> OpticsResult<DVector<f64>> {
            Ok(DVector::from_element(1, x[0] * x[0] - 4.0))
        };
        let jacobian = |_: usize, x: &DVector<f64>| -> OpticsResult<DMatrix<f64>> {
            Ok(DMatrix::from_element(1, 1, 2.0 * x[0]))
        };
        (residual, jacobian)
    }

    #[test]
    fn simple_quadratic() {
        let (residual, jacobian) = quadratic();
        let x0 = DVector::from_element(1, 3.0);
        let result =
            newton_solve(x0, residual, jacobian, &NewtonConfig::default(), |_, _| Ok(())).unwrap();
        assert!((result.x[0] - 2.0).abs() < 1e-12);
        assert!(result.iterations > 0);
    }

    #[test]
    fn damped_steps_still_converge() {
        let (residual, jacobian) = quadratic();
        let config = NewtonConfig {
            relaxation: 0.5,
            max_iterations: 200,
            ..NewtonConfig::default()
        };
        let result =
            newton_solve(DVector::from_element(1, 3.0), residual, jacobian, &config, |_, _| Ok(()))
                .unwrap();
        assert!((result.x[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn cap_reports_last_iterate() {
        let (residual, jacobian) = quadratic();
        let config = NewtonConfig {
            max_iterations: 1,
            ..NewtonConfig::default()
        };
        let err = newton_solve(DVector::from_element(1, 3.0), residual, jacobian, &config, |_, _| {
            Ok(())
        })
        .unwrap_err();
        match err {
            OpticsError::ConvergenceFailure {
                iterations,
                residual,
                last_orbit,
            } => {
                assert_eq!(iterations, 1);
                assert!(residual > 0.0);
                // one Newton step from 3: 3 - 5/6
                assert!((last_orbit[0] - (3.0 - 5.0 / 6.0)).abs() < 1e-12);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn callback_can_abort() {
        let (residual, jacobian) = quadratic();
        let err = newton_solve(
            DVector::from_element(1, 3.0),
            residual,
            jacobian,
            &NewtonConfig::default(),
            |iter, _| {
                if iter == 1 {
                    Err(OpticsError::Cancelled { iterations: iter })
                } else {
                    Ok(())
                }
            },
        )
        .unwrap_err();
        assert!(matches!(err, OpticsError::Cancelled { iterations: 1 }));
    }
}
