//! Finite difference Jacobians of maps on phase space.

use nalgebra::{DMatrix, DVector};

use crate::error::OpticsResult;

/// Forward finite differences.
///
/// For each column j, perturbs x[j] by `epsilon * max(|x[j]|, scale)` and
/// computes (f(x+e) - f(x)) / e.
pub fn finite_difference_jacobian<F>(
    x: &DVector<f64>,
    f: F,
    epsilon: f64,
    scale: f64,
) -> OpticsResult<DMatrix<f64>>
where
    F: Fn(&DVector<f64>) -> OpticsResult<DVector<f64>>,
{
    let n = x.len();
    let f_x = f(x)?;
    let m = f_x.len();

    let mut jac = DMatrix::zeros(m, n);

    for j in 0..n {
        let mut x_perturbed = x.clone();
        let dx = epsilon * x[j].abs().max(scale);
        x_perturbed[j] += dx;

        let f_perturbed = f(&x_perturbed)?;
        let df = (f_perturbed - &f_x) / dx;
        jac.set_column(j, &df);
    }

    Ok(jac)
}

/// Central finite differences with absolute step `step`.
pub fn central_difference_jacobian<F>(
    x: &DVector<f64>,
    f: F,
    step: f64,
) -> OpticsResult<DMatrix<f64>>
where
    F: Fn(&DVector<f64>) -> OpticsResult<DVector<f64>>,
{
    let n = x.len();
    let mut jac = DMatrix::zeros(n, n);

    for j in 0..n {
        let mut x_plus = x.clone();
        x_plus[j] += step;
        let f_plus = f(&x_plus)?;

        let mut x_minus = x.clone();
        x_minus[j] -= step;
        let f_minus = f(&x_minus)?;

        let df = (f_plus - f_minus) / (2.0 * step);
        if df.len() != n {
            return Err(crate::error::OpticsError::invalid(
                "central difference map must be square",
            ));
        }
        jac.set_column(j, &df);
    }

    Ok(jac)
}
