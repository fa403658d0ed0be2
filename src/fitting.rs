/// affine output-range rescaling wrapper, rebuilt before every iteration
pub mod align;
/// forward-difference jacobian of the model predictions
pub mod jacobian;
/// here is the main loop of the Levenberg-Marquardt fit: configuration,
/// termination state machine and result types
pub mod lm;
/// dataset holding the samples, the model capability trait and a closure adapter
pub mod problem;
/// residual vector and scalar fit error
pub mod residuals;
/// single damped Gauss-Newton update: normal equations with fixed damping
pub mod step;
/// small numeric helpers shared by the fitting modules
pub mod utils;
