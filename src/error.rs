use thiserror::Error;

/// Errors which abort a run.
///
/// Non-fatal outcomes (running out of iterations, a subproblem that could not
/// be factorized) are not errors; they are reported in
/// [`MinimizationReport::termination`](struct.MinimizationReport.html#structfield.termination).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    // ---- configuration ----
    /// The start point has no components.
    #[error("the start point must have at least one component")]
    NoParameters,
    /// A scalar setting is zero, negative or not finite.
    #[error("`{name}` must be positive and finite, got {value}")]
    NonPositive { name: &'static str, value: f64 },
    /// An iteration cap is zero where at least one iteration is needed.
    #[error("`{0}` must be at least 1")]
    ZeroIterations(&'static str),
    /// Neither the objective value nor both derivatives are available.
    #[error("the objective must provide its value, or both its gradient and its Hessian")]
    MissingDerivatives,
    /// Without objective values the upper bound cannot be checked.
    #[error("a Lipschitz constant is required when the objective value is unavailable")]
    MissingLipschitz,
    /// The `function` criterion compares objective values.
    #[error("the `function` convergence criterion requires the objective value")]
    CriterionNeedsValue,
    /// A callback returned something of the wrong shape.
    #[error("{what} has {found} entries, expected {expected}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    /// Unknown name for a convergence criterion.
    #[error("unknown convergence criterion `{0}`")]
    UnknownCriterion(String),
    /// Unknown name for an auxiliary method.
    #[error("unknown auxiliary method `{0}`")]
    UnknownMethod(String),

    // ---- evaluation ----
    /// A callback which was available at the start point returned `None`.
    #[error("the {0} callback failed")]
    User(&'static str),
    /// Encountered `NaN` or `±∞`.
    #[error("non-finite {0}")]
    Numerical(&'static str),

    // ---- linear algebra ----
    /// The symmetric eigensolver did not converge.
    #[error("the eigendecomposition of the Hessian did not converge")]
    Eigendecomposition,
    /// The computed eigenvectors are not orthonormal.
    #[error("the eigenvectors of the Hessian are not orthonormal")]
    Diagonalization,
    /// The singular value decomposition did not converge.
    #[error("the singular value decomposition did not converge")]
    SingularValues,
    /// Newton's method on the monotone norm equation ran out of iterations.
    #[error("the monotone norm equation was not solved within {0} iterations")]
    RootNotFound(usize),

    // ---- outer iteration ----
    /// No weight produced a cubic upper bound within the inner iteration cap.
    ///
    /// The bound exists for every sufficiently large weight, so this points at
    /// an objective whose derivatives do not match its values.
    #[error("no cubic upper bound found after {attempts} attempts (last weight {regularization})")]
    UpperBoundNotFound { attempts: usize, regularization: f64 },
}

/// Render a scalar for an error message.
pub(crate) fn scalar<F: num_traits::ToPrimitive>(value: F) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}
