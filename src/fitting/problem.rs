use crate::fitting::lm::FitError;
use nalgebra::DVector;

/// A parameterized curve model.
///
/// Conceptually a function-producing function: a parameter vector selects one
/// concrete curve, which then maps a single `x` to a predicted `y`. This is
/// what the fitting loop needs from the caller. Implementations must be pure:
/// the fitter evaluates the model any number of times, with the current
/// parameters and with perturbed ones, and expects identical answers for
/// identical inputs.
pub trait CurveModel {
    /// Number of free parameters the model accepts.
    ///
    /// Sizes the default all-ones initial guess and is checked against
    /// user-supplied initial values and bounds.
    fn param_count(&self) -> usize;

    /// Evaluate the curve selected by `params` at a single `x`.
    fn output(&self, params: &DVector<f64>, x: f64) -> f64;
}

/// Closure-backed model, the shortest way to describe a curve to fit.
///
/// ```
/// use curvefit::FnModel;
/// use nalgebra::DVector;
/// let parabola = FnModel::new(3, |p: &DVector<f64>, x| p[0] * x * x + p[1] * x + p[2]);
/// ```
pub struct FnModel<F> {
    param_count: usize,
    function: F,
}

impl<F> FnModel<F>
where
    F: Fn(&DVector<f64>, f64) -> f64,
{
    pub fn new(param_count: usize, function: F) -> Self {
        Self {
            param_count,
            function,
        }
    }
}

impl<F> CurveModel for FnModel<F>
where
    F: Fn(&DVector<f64>, f64) -> f64,
{
    fn param_count(&self) -> usize {
        self.param_count
    }

    fn output(&self, params: &DVector<f64>, x: f64) -> f64 {
        (self.function)(params, x)
    }
}

/// Observed samples: `x` (independent variable) and `y` (observations).
///
/// Validated on construction and immutable for the duration of a fit.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    x: DVector<f64>,
    y: DVector<f64>,
}

impl Dataset {
    /// Build a dataset from plain vectors.
    ///
    /// Fails when the lengths differ or fewer than 2 samples are given.
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self, FitError> {
        Self::from_vectors(DVector::from_vec(x), DVector::from_vec(y))
    }

    pub fn from_vectors(x: DVector<f64>, y: DVector<f64>) -> Result<Self, FitError> {
        if x.len() != y.len() {
            return Err(FitError::LengthMismatch {
                x: x.len(),
                y: y.len(),
            });
        }
        if x.len() < 2 {
            return Err(FitError::TooFewSamples(x.len()));
        }
        Ok(Self { x, y })
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Always false: construction requires at least 2 samples.
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn x(&self) -> &DVector<f64> {
        &self.x
    }

    pub fn y(&self) -> &DVector<f64> {
        &self.y
    }

    /// Minimum and maximum of the observations, used by the alignment wrapper.
    pub fn y_range(&self) -> (f64, f64) {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for yi in self.y.iter() {
            min = min.min(*yi);
            max = max.max(*yi);
        }
        (min, max)
    }
}
