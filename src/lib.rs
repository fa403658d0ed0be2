//MIT License
//! Nonlinear least-squares curve fitting.
//!
//! Given observed `(x, y)` samples and a parameterized model the crate finds
//! the parameter vector minimizing the sum of squared residuals with a
//! Levenberg-Marquardt loop: a damped Gauss-Newton update with a fixed,
//! caller-chosen damping factor.
//!
//! # Example
//! ```
//! use curvefit::{CurveFit, Dataset, FnModel};
//! use nalgebra::DVector;
//!
//! // fit y = a*x + b to an exact line
//! let data = Dataset::new(vec![0.0, 1.0, 2.0, 3.0], vec![1.0, 3.0, 5.0, 7.0]).unwrap();
//! let model = FnModel::new(2, |p: &DVector<f64>, x| p[0] * x + p[1]);
//! let result = CurveFit::new(0.01)
//!     .with_gradient_difference(0.01)
//!     .with_error_tolerance(1e-6)
//!     .with_initial_values(DVector::from_vec(vec![0.0, 0.0]))
//!     .fit(&data, &model)
//!     .unwrap();
//! assert!(result.status.was_successful());
//! assert!((result.parameter_values[0] - 2.0).abs() < 1e-4);
//! assert!((result.parameter_values[1] - 1.0).abs() < 1e-4);
//! ```
pub mod fitting;

pub use fitting::align::AlignedModel;
pub use fitting::lm::{CurveFit, FitError, FitResult, FitStatus};
pub use fitting::problem::{CurveModel, Dataset, FnModel};
