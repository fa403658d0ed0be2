use nalgebra::DVector;

/// Euclidean norm of a vector.
///
/// No MINPACK-style rescaling, plain f64 accumulation is enough for the
/// problem sizes this crate targets. A NaN component propagates into the
/// returned value.
pub(crate) fn enorm(v: &DVector<f64>) -> f64 {
    let mut sum = 0.0;
    for xi in v.iter() {
        sum += xi * xi;
    }
    sum.sqrt()
}

/// Clamp every parameter element-wise into `[min, max]`.
///
/// NaN parameters fail both comparisons and pass through untouched, so a
/// failed update step stays visible to the error check of the main loop.
pub(crate) fn clamp_into_bounds(params: &mut DVector<f64>, min: &DVector<f64>, max: &DVector<f64>) {
    for i in 0..params.len() {
        if params[i] < min[i] {
            params[i] = min[i];
        }
        if params[i] > max[i] {
            params[i] = max[i];
        }
    }
}
