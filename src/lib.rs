//! Implementation of [cubic regularization](https://doi.org/10.1007/s10107-006-0706-8)
//! of Newton's method using [nalgebra](https://nalgebra.org).
//!
//! This algorithm tries to solve the unconstrained minimization problem
//! ```math
//! \min_{\vec{x}\in\R^n}f(\vec{x})
//! ```
//! for a twice differentiable objective `$f\!:\R^n\to\R$`.
//!
//! At the iterate `$\vec{x}_k$` with gradient `$\vec{g}$` and Hessian `$\mathbf{H}$`
//! the next step minimizes the cubic model
//! ```math
//!   m_M(\vec{s}) = f(\vec{x}_k) + \vec{g}^\top\vec{s} + \frac{1}{2}\vec{s}^\top\mathbf{H}\vec{s} + \frac{M}{6}\|\vec{s}\|^3.
//! ```
//! If the Hessian is Lipschitz continuous with constant `$L$` and `$M \geq L$`, the
//! model is an upper bound of `$f(\vec{x}_k + \vec{s})$`. Since `$L$` is rarely known,
//! the weight `$M$` is adapted until the model is an upper bound at the new point.
//! Unlike Newton's method the iteration escapes saddle points: at a stationary point
//! with negative curvature the step follows the most negative eigendirection.
//!
//! # Inputs
//!
//! You must provide an implementation of [`Objective`](trait.Objective.html) with
//!
//! - the value `$f(\vec{x})$`, or
//! - the gradient `$\nabla f(\vec{x})$` and the Hessian `$\nabla^2 f(\vec{x})$`,
//!
//! or all three. Missing derivatives are replaced by finite differences.
//! Without values the upper bound cannot be checked, so the Lipschitz constant
//! must be given with [`with_lipschitz`](struct.CubicRegularization.html#method.with_lipschitz).
//!
//! The minimization of the model is a subproblem in its own right. It is
//! solved by one of the methods selected with [`AuxiliaryMethod`](enum.AuxiliaryMethod.html):
//! a [trust-region iteration](struct.TrustRegion.html) on the secular equation, or
//! a [scalar root](struct.MonotoneNorm.html) in the eigenbasis of the Hessian.
//!
//! # Usage Example
//!
//! We use `$f(x, y) \coloneqq x^2y^2 + x^2 + y^2$`, which is minimal at the origin
//! and has an indefinite Hessian at the start point.
//!
//! ```
//! # use approx::assert_abs_diff_eq;
//! # use nalgebra::DVector;
//! use cubic_regularization::{CubicRegularization, Objective, TerminationReason};
//!
//! struct Example;
//!
//! impl Objective<f64> for Example {
//!     fn value(&self, p: &DVector<f64>) -> Option<f64> {
//!         let (x, y) = (p[0], p[1]);
//!         Some(x * x * y * y + x * x + y * y)
//!     }
//!
//!     fn gradient(&self, p: &DVector<f64>) -> Option<DVector<f64>> {
//!         let (x, y) = (p[0], p[1]);
//!         Some(DVector::from_vec(vec![
//!             2. * x * y * y + 2. * x,
//!             2. * x * x * y + 2. * y,
//!         ]))
//!     }
//!
//!     // the Hessian is left to finite differences
//! }
//!
//! let report = CubicRegularization::new()
//!     .with_conv_tol(1e-8)
//!     .minimize(DVector::from_vec(vec![1., 2.]), Example)
//!     .unwrap();
//! assert_eq!(report.termination, TerminationReason::Converged);
//! assert_abs_diff_eq!(report.x, DVector::<f64>::zeros(2), epsilon = 1e-6);
//! ```
//!
//! # Derivative checking
//!
//! You should try using [`differentiate_numerically`](fn.differentiate_numerically.html)
//! in a unit test to verify that your gradient is correct.
//!
//! # Logging
//!
//! Progress is reported through the [`log`](https://docs.rs/log) facade: one
//! `debug` record per iteration and per tried weight, `trace` records from the
//! subproblem solvers, and a `warn` record if a run ends without convergence
//! or away from a local minimum.

mod convergence;
mod cubic_reg;
mod error;
mod monotone_norm;
mod objective;
mod subproblem;
mod trust_region;
mod utils;

pub use convergence::ConvergenceCriterion;
pub use cubic_reg::{CubicReg, CubicRegularization, MinimizationReport, TerminationReason};
pub use error::Error;
pub use monotone_norm::MonotoneNorm;
pub use objective::Objective;
pub use subproblem::{
    cubic_model, AuxiliaryMethod, AuxiliaryProblem, AuxiliarySolution, AuxiliarySolver,
    SubproblemFailure,
};
pub use trust_region::TrustRegion;

pub use utils::differentiate_numerically;
pub use utils::finite_difference::{approx_gradient, approx_hessian, default_step};
