use crate::fitting::problem::{CurveModel, Dataset};
use nalgebra::DVector;

/// Model wrapper whose output is affinely rescaled onto the data range.
///
/// The map `y' = a*y + b` is chosen so that the model's current output range
/// `[fun_min, fun_max]` lands exactly on the observation range
/// `[data_min, data_max]`:
///
/// ```math
/// a = (data_min - data_max) / (fun_min - fun_max),  b = data_max - a * fun_max
/// ```
///
/// The wrapper is rebuilt fresh every iteration from the current parameters,
/// never cached, since the output range moves with the parameters.
pub struct AlignedModel<'a, M> {
    inner: &'a M,
    a: f64,
    b: f64,
}

impl<'a, M: CurveModel> AlignedModel<'a, M> {
    /// Build the wrapper from the model outputs sampled at the current
    /// parameters over all `x`.
    ///
    /// A constant output range (`fun_min == fun_max`) makes `a` non-finite by
    /// IEEE division. That is deliberate: the degenerate coefficients flow
    /// into the next error evaluation as a numerical failure instead of being
    /// silently patched over.
    pub fn from_outputs(
        model: &'a M,
        data_min: f64,
        data_max: f64,
        sample_outputs: &DVector<f64>,
    ) -> Self {
        let mut fun_min = f64::INFINITY;
        let mut fun_max = f64::NEG_INFINITY;
        for out in sample_outputs.iter() {
            fun_min = fun_min.min(*out);
            fun_max = fun_max.max(*out);
        }
        let a = (data_min - data_max) / (fun_min - fun_max);
        let b = data_max - a * fun_max;
        Self { inner: model, a, b }
    }

    /// Convenience constructor: sample the model over the dataset first.
    pub fn for_iteration(model: &'a M, data: &Dataset, params: &DVector<f64>) -> Self {
        let outputs = DVector::from_fn(data.len(), |i, _| model.output(params, data.x()[i]));
        let (data_min, data_max) = data.y_range();
        Self::from_outputs(model, data_min, data_max, &outputs)
    }

    /// The affine coefficients `(a, b)` of the rescaling.
    pub fn coefficients(&self) -> (f64, f64) {
        (self.a, self.b)
    }
}

impl<M: CurveModel> CurveModel for AlignedModel<'_, M> {
    fn param_count(&self) -> usize {
        self.inner.param_count()
    }

    fn output(&self, params: &DVector<f64>, x: f64) -> f64 {
        self.a * self.inner.output(params, x) + self.b
    }
}
