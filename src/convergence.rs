//! Stopping criteria of the outer iteration.
use core::fmt;
use core::str::FromStr;

use nalgebra::{convert, DMatrix, DVector, RealField};
use num_traits::Float;

use crate::utils::pseudo_inverse;
use crate::Error;

/// Criterion checked after every accepted step.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ConvergenceCriterion {
    /// Stop as soon as a step increases the objective,
    /// `$f(\vec{x}_{k+1}) > f(\vec{x}_k)$`.
    ///
    /// This is a heuristic: the cubic upper bound usually guarantees descent,
    /// so an increase signals that round-off dominates.
    Function,
    /// Stop when `$\|\nabla f(\vec{x}_{k+1})\| \leq \mathtt{tol}$`.
    #[default]
    Gradient,
    /// Stop when the Newton decrement is small,
    /// `$\frac{1}{2}\vec{g}^\top\mathbf{H}^+\vec{g} \leq \mathtt{tol}$`
    /// with the Moore-Penrose pseudo-inverse `$\mathbf{H}^+$`.
    Decrement,
}

/// Everything a criterion may look at.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConvergenceState<'a, F: RealField> {
    pub f_old: Option<F>,
    pub f_new: Option<F>,
    pub gradient: &'a DVector<F>,
    pub hessian: &'a DMatrix<F>,
}

impl ConvergenceCriterion {
    pub(crate) fn is_converged<F>(
        self,
        state: &ConvergenceState<'_, F>,
        tol: F,
    ) -> Result<bool, Error>
    where
        F: RealField + Float,
    {
        match self {
            Self::Function => match (state.f_old, state.f_new) {
                (Some(f_old), Some(f_new)) => Ok(f_new > f_old),
                _ => Err(Error::CriterionNeedsValue),
            },
            Self::Gradient => Ok(state.gradient.norm() <= tol),
            Self::Decrement => {
                let pinv = pseudo_inverse(state.hessian)?;
                let decrement = state.gradient.dot(&(pinv * state.gradient)) * convert(0.5);
                Ok(decrement <= tol)
            }
        }
    }
}

impl FromStr for ConvergenceCriterion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "function" => Ok(Self::Function),
            "gradient" => Ok(Self::Gradient),
            "decrement" => Ok(Self::Decrement),
            _ => Err(Error::UnknownCriterion(s.into())),
        }
    }
}

impl fmt::Display for ConvergenceCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Function => "function",
            Self::Gradient => "gradient",
            Self::Decrement => "decrement",
        })
    }
}
