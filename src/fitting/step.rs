use crate::fitting::jacobian::jacobian;
use crate::fitting::problem::{CurveModel, Dataset};
use crate::fitting::residuals::residual_vector;
use nalgebra::DVector;

/// One Levenberg-Marquardt update with fixed damping.
///
/// Forms the damped normal equations from the residuals `r = y - f(p)` and
/// the forward-difference Jacobian `J` of the predictions:
///
/// ```math
/// (J^T J + damping * I) delta = J^T r
/// ```
///
/// and returns `params + delta`. Small damping behaves like Gauss-Newton,
/// large damping like gradient descent. The damping factor is constant per
/// fit, this crate does not adapt it between iterations.
///
/// A singular or numerically failed solve returns a parameter vector filled
/// with NaN instead of skipping the update, so the error check of the main
/// loop terminates the run.
pub fn step<M: CurveModel>(
    data: &Dataset,
    params: &DVector<f64>,
    damping: f64,
    gradient_difference: f64,
    model: &M,
) -> DVector<f64> {
    let r = residual_vector(data, params, model);
    let jac = jacobian(data, params, model, gradient_difference);

    let mut hessian = jac.transpose() * &jac;
    for i in 0..hessian.nrows() {
        hessian[(i, i)] += damping;
    }
    let gradient = jac.transpose() * r;

    match hessian.lu().solve(&gradient) {
        Some(delta) => params + delta,
        None => DVector::from_element(params.len(), f64::NAN),
    }
}
