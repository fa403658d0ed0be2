use crate::fitting::problem::{CurveModel, Dataset};
use crate::fitting::utils::enorm;
use nalgebra::DVector;

/// Signed per-sample residuals `r_i = y_i - f(params)(x_i)`.
pub fn residual_vector<M: CurveModel>(
    data: &Dataset,
    params: &DVector<f64>,
    model: &M,
) -> DVector<f64> {
    DVector::from_fn(data.len(), |i, _| {
        data.y()[i] - model.output(params, data.x()[i])
    })
}

/// Scalar fit error: Euclidean norm of the residual vector.
///
/// A NaN or infinite model output propagates into the returned value, it is
/// never masked. The main loop relies on that to detect divergence.
pub fn error_of<M: CurveModel>(data: &Dataset, params: &DVector<f64>, model: &M) -> f64 {
    enorm(&residual_vector(data, params, model))
}
