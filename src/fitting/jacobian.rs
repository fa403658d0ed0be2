use crate::fitting::problem::{CurveModel, Dataset};
use nalgebra::{DMatrix, DVector};

/// Forward-difference Jacobian of the model predictions, samples x params.
///
/// Column `k` estimates the partial derivative of the prediction with respect
/// to parameter `k`:
///
/// ```math
/// J[(i, k)] = (f(p + delta*e_k)(x_i) - f(p)(x_i)) / delta
/// ```
///
/// `gradient_difference` is taken as given, the caller tunes it: too small
/// amplifies floating-point noise, too large biases the estimate. Columns are
/// evaluated sequentially, keeping the floating-point rounding order
/// deterministic.
pub fn jacobian<M: CurveModel>(
    data: &Dataset,
    params: &DVector<f64>,
    model: &M,
    gradient_difference: f64,
) -> DMatrix<f64> {
    let m = data.len();
    let n = params.len();
    let base = DVector::from_fn(m, |i, _| model.output(params, data.x()[i]));

    let mut jac = DMatrix::zeros(m, n);
    let mut perturbed = params.clone();
    for k in 0..n {
        perturbed[k] += gradient_difference;
        for i in 0..m {
            jac[(i, k)] = (model.output(&perturbed, data.x()[i]) - base[i]) / gradient_difference;
        }
        perturbed[k] = params[k];
    }
    jac
}
