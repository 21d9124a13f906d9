//! The auxiliary subproblem: minimizing the cubic model for a fixed weight.
use core::fmt;
use core::str::FromStr;

use nalgebra::{convert, DMatrix, DVector, RealField};
use num_traits::Float;

use crate::monotone_norm::MonotoneNorm;
use crate::trust_region::TrustRegion;
use crate::Error;

/// Value of the cubic model
/// ```math
///   m_M(\vec{s}) = f(\vec{x}) + \vec{g}^\top\vec{s} + \frac{1}{2}\vec{s}^\top\mathbf{H}\vec{s} + \frac{M}{6}\|\vec{s}\|^3.
/// ```
///
/// For `$M$` at least the Lipschitz constant of the Hessian this is an upper
/// bound of `$f(\vec{x} + \vec{s})$`.
pub fn cubic_model<F>(
    f_x: F,
    gradient: &DVector<F>,
    hessian: &DMatrix<F>,
    step: &DVector<F>,
    m: F,
) -> F
where
    F: RealField + Float,
{
    let norm = step.norm();
    f_x + gradient.dot(step)
        + (hessian * step).dot(step) * convert(0.5)
        + m / convert(6.) * norm * norm * norm
}

/// The data of one subproblem.
///
/// Borrowed from the driver for the duration of one call. Solvers keep
/// nothing between calls.
#[derive(Debug, Clone, Copy)]
pub struct AuxiliaryProblem<'a, F: RealField> {
    /// Gradient `$\vec{g}$` at the current iterate.
    pub gradient: &'a DVector<F>,
    /// Hessian `$\mathbf{H}$` at the current iterate.
    pub hessian: &'a DMatrix<F>,
    /// Weight `$M > 0$` of the cubic term.
    pub regularization: F,
    /// `$\max(0, -\lambda_{\min}(\mathbf{H}))$`.
    pub lambda_nplus: F,
    /// Tolerance on `$\bigl|\|\vec{s}\| - 2\lambda/M\bigr|$` for the trust-region method.
    pub kappa_easy: F,
    /// Maximal number of iterations of the inner root finding.
    pub max_iter: usize,
}

/// Reasons for a subproblem to give up without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubproblemFailure {
    /// `$\mathbf{H} + \lambda\mathbf{I}$` stayed indefinite for every shift tried.
    Cholesky,
}

impl fmt::Display for SubproblemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cholesky => f.write_str("Cholesky factorization failed for every shift"),
        }
    }
}

/// Step computed by an [`AuxiliarySolver`].
#[derive(Debug, Clone, PartialEq)]
pub struct AuxiliarySolution<F: RealField> {
    /// The step `$\vec{s}$`; zero on failure.
    pub step: DVector<F>,
    /// Set when the solver gave up, see [`SubproblemFailure`].
    pub failure: Option<SubproblemFailure>,
    /// `$\lambda_{\max}/\lambda_{\min}$` of the Hessian, if the method computes it.
    pub hessian_condition: Option<F>,
}

impl<F: RealField> AuxiliarySolution<F> {
    pub(crate) fn new(step: DVector<F>, hessian_condition: Option<F>) -> Self {
        Self {
            step,
            failure: None,
            hessian_condition,
        }
    }

    pub(crate) fn failed(n: usize, failure: SubproblemFailure) -> Self {
        Self {
            step: DVector::zeros(n),
            failure: Some(failure),
            hessian_condition: None,
        }
    }
}

/// A method to minimize the cubic model for a fixed weight.
pub trait AuxiliarySolver<F: RealField> {
    /// Compute the step. `Err` is reserved for failures which must not be
    /// retried; a [`SubproblemFailure`] is reported in the solution.
    fn solve(&self, problem: &AuxiliaryProblem<'_, F>) -> Result<AuxiliarySolution<F>, Error>;
}

/// Selects the [`AuxiliarySolver`] used by the driver.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum AuxiliaryMethod {
    /// See [`TrustRegion`].
    #[default]
    TrustRegion,
    /// See [`MonotoneNorm`].
    MonotoneNorm,
}

impl<F: RealField + Float> AuxiliarySolver<F> for AuxiliaryMethod {
    fn solve(&self, problem: &AuxiliaryProblem<'_, F>) -> Result<AuxiliarySolution<F>, Error> {
        match self {
            Self::TrustRegion => TrustRegion.solve(problem),
            Self::MonotoneNorm => MonotoneNorm.solve(problem),
        }
    }
}

impl FromStr for AuxiliaryMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trust_region" => Ok(Self::TrustRegion),
            "monotone_norm" => Ok(Self::MonotoneNorm),
            _ => Err(Error::UnknownMethod(s.into())),
        }
    }
}

impl fmt::Display for AuxiliaryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TrustRegion => "trust_region",
            Self::MonotoneNorm => "monotone_norm",
        })
    }
}
