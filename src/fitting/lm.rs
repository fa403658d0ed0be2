use crate::fitting::align::AlignedModel;
use crate::fitting::problem::{CurveModel, Dataset};
use crate::fitting::residuals::error_of;
use crate::fitting::step::step;
use crate::fitting::utils::clamp_into_bounds;
use log::{debug, info, warn};
use nalgebra::DVector;
use simplelog::{ColorChoice, CombinedLogger, Config, LevelFilter, TermLogger, TerminalMode};

/// Validation failures, raised before any iteration runs.
///
/// Numerical trouble during the fit is never an error: it shows up in the
/// returned [`FitResult`] as [`FitStatus::Diverged`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FitError {
    /// Damping factor missing its contract: must be finite and > 0.
    InvalidDamping(String),
    /// Finite-difference step must be finite and > 0.
    InvalidGradientDifference(String),
    /// `x` and `y` must have the same number of samples.
    LengthMismatch { x: usize, y: usize },
    /// At least 2 samples are required.
    TooFewSamples(usize),
    /// `min_values` and `max_values` must have equal lengths.
    BoundsLengthMismatch { min: usize, max: usize },
    /// Initial values or bounds whose length differs from the model's
    /// declared parameter count.
    WrongNumberOfParameters { expected: usize, got: usize },
}

impl std::fmt::Display for FitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitError::InvalidDamping(got) => {
                write!(f, "damping must be a finite number > 0, got {}", got)
            }
            FitError::InvalidGradientDifference(got) => {
                write!(f, "gradient difference must be a finite number > 0, got {}", got)
            }
            FitError::LengthMismatch { x, y } => {
                write!(f, "x and y must have the same length, got {} and {}", x, y)
            }
            FitError::TooFewSamples(n) => {
                write!(f, "at least 2 samples are required, got {}", n)
            }
            FitError::BoundsLengthMismatch { min, max } => write!(
                f,
                "min_values and max_values must have equal lengths, got {} and {}",
                min, max
            ),
            FitError::WrongNumberOfParameters { expected, got } => write!(
                f,
                "model declares {} parameters, got a vector of length {}",
                expected, got
            ),
        }
    }
}

impl std::error::Error for FitError {}

/// Why the iteration loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitStatus {
    /// The fit error dropped to or below the error tolerance.
    Converged,
    /// The iteration budget ran out before the tolerance was reached.
    MaxIterationsReached,
    /// The fit error became NaN: a diverging model, a singular damped system
    /// or a degenerate alignment. The result carries the NaN-producing state
    /// as-is rather than the last finite one.
    Diverged,
}

impl FitStatus {
    /// Whether the outcome is considered successful.
    ///
    /// `MaxIterationsReached` is a normal return path, not a failure, but the
    /// parameters then carry no tolerance guarantee.
    pub fn was_successful(&self) -> bool {
        matches!(self, FitStatus::Converged)
    }
}

/// Final state of a fit: parameters, error and iterations at termination.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    pub parameter_values: DVector<f64>,
    pub parameter_error: f64,
    pub iterations: usize,
    pub status: FitStatus,
}

/// Configuration of a Levenberg-Marquardt curve fit.
///
/// Built once per fit call, so concurrent fits never share state. The damping
/// factor is required at construction, everything else has the defaults of
/// the table in the crate documentation and is set with the `with_*` methods.
#[derive(Debug, Clone)]
pub struct CurveFit {
    damping: f64,
    gradient_difference: f64,
    max_iterations: usize,
    error_tolerance: f64,
    align_to_data: bool,
    min_values: Option<DVector<f64>>,
    max_values: Option<DVector<f64>>,
    initial_values: Option<DVector<f64>>,
    loglevel: Option<String>,
}

impl CurveFit {
    pub fn new(damping: f64) -> Self {
        Self {
            damping,
            gradient_difference: 0.1,
            max_iterations: 100,
            error_tolerance: 0.01,
            align_to_data: false,
            min_values: None,
            max_values: None,
            initial_values: None,
            loglevel: None,
        }
    }

    /// Set the finite-difference step of the Jacobian approximation.
    #[must_use]
    pub fn with_gradient_difference(self, gradient_difference: f64) -> Self {
        Self {
            gradient_difference,
            ..self
        }
    }

    /// Set the iteration cap, the sole bound on runtime.
    #[must_use]
    pub fn with_max_iterations(self, max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..self
        }
    }

    /// Set the convergence threshold on the fit error.
    #[must_use]
    pub fn with_error_tolerance(self, error_tolerance: f64) -> Self {
        Self {
            error_tolerance,
            ..self
        }
    }

    /// Rescale the model output range onto the data range before each
    /// iteration. Helps convergence when model and data scales differ.
    #[must_use]
    pub fn with_align_to_data(self, align_to_data: bool) -> Self {
        Self {
            align_to_data,
            ..self
        }
    }

    /// Per-parameter lower bounds, clamped after every update.
    #[must_use]
    pub fn with_min_values(self, min_values: DVector<f64>) -> Self {
        Self {
            min_values: Some(min_values),
            ..self
        }
    }

    /// Per-parameter upper bounds, clamped after every update.
    #[must_use]
    pub fn with_max_values(self, max_values: DVector<f64>) -> Self {
        Self {
            max_values: Some(max_values),
            ..self
        }
    }

    /// Starting parameter vector. Defaults to all ones sized by the model's
    /// declared parameter count.
    #[must_use]
    pub fn with_initial_values(self, initial_values: DVector<f64>) -> Self {
        Self {
            initial_values: Some(initial_values),
            ..self
        }
    }

    /// Install a terminal logger before fitting ("debug", "info", "warn",
    /// "error" or "off"). Off by default: a library should not touch the
    /// global logger unless asked to.
    #[must_use]
    pub fn with_loglevel(self, loglevel: &str) -> Self {
        Self {
            loglevel: Some(loglevel.to_string()),
            ..self
        }
    }

    /// Run the fit.
    pub fn fit<M: CurveModel>(&self, data: &Dataset, model: &M) -> Result<FitResult, FitError> {
        self.fit_observed(data, model, |_, _| {})
    }

    /// Run the fit with an observer invoked after each completed iteration
    /// with the current error and a borrowed parameter vector.
    pub fn fit_observed<M, F>(
        &self,
        data: &Dataset,
        model: &M,
        observer: F,
    ) -> Result<FitResult, FitError>
    where
        M: CurveModel,
        F: FnMut(f64, &DVector<f64>),
    {
        self.init_logger();
        let n = model.param_count();
        self.validate(n)?;
        Ok(self.main_loop(data, model, n, observer))
    }

    fn validate(&self, n: usize) -> Result<(), FitError> {
        if !self.damping.is_finite() || self.damping <= 0.0 {
            return Err(FitError::InvalidDamping(self.damping.to_string()));
        }
        if !self.gradient_difference.is_finite() || self.gradient_difference <= 0.0 {
            return Err(FitError::InvalidGradientDifference(
                self.gradient_difference.to_string(),
            ));
        }
        if let (Some(min), Some(max)) = (&self.min_values, &self.max_values) {
            if min.len() != max.len() {
                return Err(FitError::BoundsLengthMismatch {
                    min: min.len(),
                    max: max.len(),
                });
            }
        }
        for bound in [&self.min_values, &self.max_values, &self.initial_values] {
            if let Some(v) = bound {
                if v.len() != n {
                    return Err(FitError::WrongNumberOfParameters {
                        expected: n,
                        got: v.len(),
                    });
                }
            }
        }
        Ok(())
    }

    fn main_loop<M, F>(&self, data: &Dataset, model: &M, n: usize, mut observer: F) -> FitResult
    where
        M: CurveModel,
        F: FnMut(f64, &DVector<f64>),
    {
        let mut params = self
            .initial_values
            .clone()
            .unwrap_or_else(|| DVector::from_element(n, 1.0));
        let min_values = self
            .min_values
            .clone()
            .unwrap_or_else(|| DVector::from_element(n, f64::NEG_INFINITY));
        let max_values = self
            .max_values
            .clone()
            .unwrap_or_else(|| DVector::from_element(n, f64::INFINITY));

        let mut error = error_of(data, &params, model);
        if error <= self.error_tolerance {
            info!("initial guess already within tolerance, error = {}", error);
            return FitResult {
                parameter_values: params,
                parameter_error: error,
                iterations: 0,
                status: FitStatus::Converged,
            };
        }

        let mut iterations = 0;
        let mut status = FitStatus::MaxIterationsReached;
        while iterations < self.max_iterations {
            if self.align_to_data {
                let aligned = AlignedModel::for_iteration(model, data, &params);
                params = step(
                    data,
                    &params,
                    self.damping,
                    self.gradient_difference,
                    &aligned,
                );
                clamp_into_bounds(&mut params, &min_values, &max_values);
                error = error_of(data, &params, &aligned);
            } else {
                params = step(
                    data,
                    &params,
                    self.damping,
                    self.gradient_difference,
                    model,
                );
                clamp_into_bounds(&mut params, &min_values, &max_values);
                error = error_of(data, &params, model);
            }
            iterations += 1;
            observer(error, &params);
            debug!("iteration = {}, error = {}", iterations, error);

            if error.is_nan() {
                warn!("fit error became NaN at iteration {}", iterations);
                status = FitStatus::Diverged;
                break;
            }
            if error <= self.error_tolerance {
                status = FitStatus::Converged;
                break;
            }
        }

        match status {
            FitStatus::Converged => {
                info!("converged after {} iterations, error = {}", iterations, error)
            }
            FitStatus::MaxIterationsReached => info!(
                "iteration budget of {} exhausted, error = {}",
                self.max_iterations, error
            ),
            FitStatus::Diverged => info!("diverged after {} iterations", iterations),
        }
        FitResult {
            parameter_values: params,
            parameter_error: error,
            iterations,
            status,
        }
    }

    fn init_logger(&self) {
        let Some(level) = self.loglevel.as_deref() else {
            return;
        };
        let filter = match level {
            "off" | "none" => return,
            "debug" => LevelFilter::Debug,
            "info" => LevelFilter::Info,
            "warn" => LevelFilter::Warn,
            "error" => LevelFilter::Error,
            // unknown levels fall back to info rather than failing the fit
            _ => LevelFilter::Info,
        };
        // Err means a logger is installed already, which is fine.
        let _ = CombinedLogger::init(vec![TermLogger::new(
            filter,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        )]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitting::problem::FnModel;
    use approx::assert_relative_eq;

    fn line_model() -> FnModel<impl Fn(&DVector<f64>, f64) -> f64> {
        FnModel::new(2, |p: &DVector<f64>, x| p[0] * x + p[1])
    }

    fn exact_line_data() -> Dataset {
        // y = 2x + 1
        Dataset::new(vec![0.0, 1.0, 2.0, 3.0], vec![1.0, 3.0, 5.0, 7.0]).unwrap()
    }

    #[test]
    fn fits_exact_line() {
        let result = CurveFit::new(0.01)
            .with_gradient_difference(0.01)
            .with_error_tolerance(1e-6)
            .with_max_iterations(50)
            .with_initial_values(DVector::from_vec(vec![0.0, 0.0]))
            .fit(&exact_line_data(), &line_model())
            .unwrap();

        assert_eq!(result.status, FitStatus::Converged);
        assert!(result.iterations < 50);
        assert!(result.parameter_error < 1e-6);
        assert_relative_eq!(result.parameter_values[0], 2.0, epsilon = 1e-4);
        assert_relative_eq!(result.parameter_values[1], 1.0, epsilon = 1e-4);
    }

    #[test]
    fn exact_starting_point_converges_in_zero_iterations() {
        let result = CurveFit::new(0.5)
            .with_error_tolerance(1e-9)
            .with_initial_values(DVector::from_vec(vec![2.0, 1.0]))
            .fit(&exact_line_data(), &line_model())
            .unwrap();

        assert_eq!(result.status, FitStatus::Converged);
        assert_eq!(result.iterations, 0);
        assert_relative_eq!(result.parameter_error, 0.0);
    }

    #[test]
    fn fits_parabola() {
        let x_data: Vec<f64> = (0..20).map(|i| i as f64 * 0.5).collect();
        let y_data: Vec<f64> = x_data.iter().map(|&x| 5.0 * x * x + 2.0 * x + 3.0).collect();
        let data = Dataset::new(x_data, y_data).unwrap();
        let model = FnModel::new(3, |p: &DVector<f64>, x| p[0] * x * x + p[1] * x + p[2]);

        let result = CurveFit::new(0.01)
            .with_gradient_difference(0.01)
            .with_error_tolerance(1e-6)
            .with_max_iterations(100)
            .fit(&data, &model)
            .unwrap();

        assert_eq!(result.status, FitStatus::Converged);
        assert_relative_eq!(result.parameter_values[0], 5.0, epsilon = 1e-3);
        assert_relative_eq!(result.parameter_values[1], 2.0, epsilon = 1e-2);
        assert_relative_eq!(result.parameter_values[2], 3.0, epsilon = 1e-2);
    }

    #[test]
    fn fits_one_parameter_exponential() {
        let x_data: Vec<f64> = (0..9).map(|i| i as f64 * 0.25).collect();
        let y_data: Vec<f64> = x_data.iter().map(|&x| (0.3 * x).exp()).collect();
        let data = Dataset::new(x_data, y_data).unwrap();
        let model = FnModel::new(1, |p: &DVector<f64>, x| (p[0] * x).exp());

        let result = CurveFit::new(1e-3)
            .with_gradient_difference(1e-5)
            .with_error_tolerance(1e-5)
            .with_max_iterations(100)
            .with_initial_values(DVector::from_vec(vec![0.8]))
            .fit(&data, &model)
            .unwrap();

        assert_eq!(result.status, FitStatus::Converged);
        assert_relative_eq!(result.parameter_values[0], 0.3, epsilon = 1e-3);
    }

    #[test]
    fn noisy_line_recovers_coefficients() {
        use rand::Rng;
        let mut rng = rand::rng();
        let x_data: Vec<f64> = (0..100).map(|i| i as f64 * 0.1).collect();
        let y_data: Vec<f64> = x_data
            .iter()
            .map(|&x| 5.0 * x + 2.0 + rng.random_range(-0.1..0.1))
            .collect();
        let data = Dataset::new(x_data, y_data).unwrap();

        let result = CurveFit::new(0.01)
            .with_gradient_difference(0.01)
            .with_error_tolerance(1e-6)
            .with_max_iterations(100)
            .fit(&data, &line_model())
            .unwrap();

        // the noise floor keeps the error above tolerance
        assert_eq!(result.status, FitStatus::MaxIterationsReached);
        assert_eq!(result.iterations, 100);
        assert_relative_eq!(result.parameter_values[0], 5.0, epsilon = 5e-2);
        assert_relative_eq!(result.parameter_values[1], 2.0, epsilon = 1e-1);
    }

    #[test]
    fn result_honors_bounds() {
        let result = CurveFit::new(0.01)
            .with_gradient_difference(0.01)
            .with_max_iterations(20)
            .with_initial_values(DVector::from_vec(vec![0.0, 0.0]))
            .with_min_values(DVector::from_vec(vec![0.0, 0.0]))
            .with_max_values(DVector::from_vec(vec![1.5, 0.5]))
            .fit(&exact_line_data(), &line_model())
            .unwrap();

        assert!(result.iterations <= 20);
        for i in 0..2 {
            assert!(result.parameter_values[i] >= 0.0);
        }
        assert!(result.parameter_values[0] <= 1.5);
        assert!(result.parameter_values[1] <= 0.5);
    }

    #[test]
    fn observer_sees_every_completed_iteration() {
        let mut seen: Vec<f64> = Vec::new();
        let result = CurveFit::new(0.01)
            .with_gradient_difference(0.01)
            .with_error_tolerance(1e-6)
            .with_max_iterations(50)
            .with_initial_values(DVector::from_vec(vec![0.0, 0.0]))
            .fit_observed(&exact_line_data(), &line_model(), |error, params| {
                assert_eq!(params.len(), 2);
                seen.push(error);
            })
            .unwrap();

        assert_eq!(seen.len(), result.iterations);
        assert_eq!(*seen.last().unwrap(), result.parameter_error);
        // no update is applied past the converging iteration
        for error in &seen[..seen.len() - 1] {
            assert!(*error > 1e-6);
        }
    }

    #[test]
    fn nan_model_diverges_with_nan_state() {
        let data = exact_line_data();
        let model = FnModel::new(2, |_: &DVector<f64>, _| f64::NAN);
        let result = CurveFit::new(0.01).fit(&data, &model).unwrap();

        assert_eq!(result.status, FitStatus::Diverged);
        assert_eq!(result.iterations, 1);
        assert!(result.parameter_error.is_nan());
        assert!(result.parameter_values.iter().all(|p| p.is_nan()));
        assert!(!result.status.was_successful());
    }

    #[test]
    fn alignment_fits_scaled_and_offset_model() {
        // raw model p*x, observations 2x + 1: alignment absorbs scale and
        // offset, so the first aligned error evaluation is already exact
        let data = exact_line_data();
        let model = FnModel::new(1, |p: &DVector<f64>, x| p[0] * x);
        let result = CurveFit::new(0.01)
            .with_align_to_data(true)
            .with_error_tolerance(1e-9)
            .with_initial_values(DVector::from_vec(vec![1.0]))
            .fit(&data, &model)
            .unwrap();

        assert_eq!(result.status, FitStatus::Converged);
        assert_eq!(result.iterations, 1);
        assert!(result.parameter_error <= 1e-9);
    }

    #[test]
    fn alignment_of_constant_model_diverges() {
        let data = exact_line_data();
        let model = FnModel::new(1, |p: &DVector<f64>, _| p[0]);
        let result = CurveFit::new(0.01)
            .with_align_to_data(true)
            .fit(&data, &model)
            .unwrap();

        assert_eq!(result.status, FitStatus::Diverged);
        assert_eq!(result.iterations, 1);
        assert!(result.parameter_error.is_nan());
    }

    #[test]
    fn zero_damping_is_a_validation_error() {
        let err = CurveFit::new(0.0)
            .fit(&exact_line_data(), &line_model())
            .unwrap_err();
        assert!(matches!(err, FitError::InvalidDamping(_)));
    }

    #[test]
    fn negative_gradient_difference_is_a_validation_error() {
        let err = CurveFit::new(0.01)
            .with_gradient_difference(-0.1)
            .fit(&exact_line_data(), &line_model())
            .unwrap_err();
        assert!(matches!(err, FitError::InvalidGradientDifference(_)));
    }

    #[test]
    fn mismatched_bounds_are_a_validation_error() {
        let err = CurveFit::new(0.01)
            .with_min_values(DVector::from_vec(vec![0.0, 0.0]))
            .with_max_values(DVector::from_vec(vec![1.0, 1.0, 1.0]))
            .fit(&exact_line_data(), &line_model())
            .unwrap_err();
        assert!(matches!(
            err,
            FitError::BoundsLengthMismatch { min: 2, max: 3 }
        ));
    }

    #[test]
    fn wrong_initial_values_length_is_a_validation_error() {
        let err = CurveFit::new(0.01)
            .with_initial_values(DVector::from_vec(vec![1.0, 2.0, 3.0]))
            .fit(&exact_line_data(), &line_model())
            .unwrap_err();
        assert!(matches!(
            err,
            FitError::WrongNumberOfParameters {
                expected: 2,
                got: 3
            }
        ));
    }

    #[test]
    fn fit_errors_render_distinct_messages() {
        let errors = [
            FitError::InvalidDamping("0".to_string()),
            FitError::InvalidGradientDifference("-1".to_string()),
            FitError::LengthMismatch { x: 3, y: 2 },
            FitError::TooFewSamples(1),
            FitError::BoundsLengthMismatch { min: 2, max: 3 },
            FitError::WrongNumberOfParameters {
                expected: 2,
                got: 3,
            },
        ];
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        for (i, a) in messages.iter().enumerate() {
            assert!(!a.is_empty());
            for b in messages.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn only_converged_counts_as_success() {
        assert!(FitStatus::Converged.was_successful());
        assert!(!FitStatus::MaxIterationsReached.was_successful());
        assert!(!FitStatus::Diverged.was_successful());
    }

    #[test]
    fn iteration_count_never_exceeds_budget() {
        // harsh damping keeps the fit from converging quickly
        let result = CurveFit::new(1e6)
            .with_error_tolerance(1e-12)
            .with_max_iterations(7)
            .with_initial_values(DVector::from_vec(vec![0.0, 0.0]))
            .fit(&exact_line_data(), &line_model())
            .unwrap();
        assert_eq!(result.status, FitStatus::MaxIterationsReached);
        assert_eq!(result.iterations, 7);
    }

    #[test]
    fn default_initial_values_are_all_ones() {
        let mut first_params: Option<DVector<f64>> = None;
        // huge damping: the first update barely moves, exposing the start point
        let _ = CurveFit::new(1e12)
            .with_max_iterations(1)
            .fit_observed(&exact_line_data(), &line_model(), |_, params| {
                if first_params.is_none() {
                    first_params = Some(params.clone());
                }
            })
            .unwrap();
        let first = first_params.unwrap();
        assert_relative_eq!(first[0], 1.0, epsilon = 1e-3);
        assert_relative_eq!(first[1], 1.0, epsilon = 1e-3);
    }
}
