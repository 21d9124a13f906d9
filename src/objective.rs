use nalgebra::{DMatrix, DVector, RealField};

/// An unconstrained minimization problem `$\min_{\vec{x}\in\R^n} f(\vec{x})$`.
///
/// This is what [`CubicRegularization`](struct.CubicRegularization.html) needs
/// to evaluate the objective and its derivatives. Every method has a default
/// implementation returning `None`, which means _not provided_:
///
/// - without a gradient, central differences of [`value`](#method.value) are used,
/// - without a Hessian, forward differences of the gradient are used.
///
/// Which callbacks are available is decided once, by evaluating them at the
/// start point. If a callback answered there but returns `None` later on, the
/// run stops with [`Error::User`](enum.Error.html#variant.User).
///
/// You must provide at least the value, or both the gradient and the Hessian.
///
/// All callbacks must be deterministic: the same point may be evaluated
/// several times during one iteration.
pub trait Objective<F>
where
    F: RealField + Copy,
{
    /// Compute `$f(\vec{x})$`.
    fn value(&self, x: &DVector<F>) -> Option<F> {
        let _ = x;
        None
    }

    /// Compute the gradient `$\nabla f(\vec{x})\in\R^n$`.
    fn gradient(&self, x: &DVector<F>) -> Option<DVector<F>> {
        let _ = x;
        None
    }

    /// Compute the Hessian `$\nabla^2 f(\vec{x})\in\R^{n\times n}$`.
    ///
    /// Only the lower triangle is read by the eigensolvers, but the full matrix
    /// is used in the cubic model.
    fn hessian(&self, x: &DVector<F>) -> Option<DMatrix<F>> {
        let _ = x;
        None
    }
}

impl<F, O> Objective<F> for &O
where
    F: RealField + Copy,
    O: Objective<F> + ?Sized,
{
    fn value(&self, x: &DVector<F>) -> Option<F> {
        (**self).value(x)
    }

    fn gradient(&self, x: &DVector<F>) -> Option<DVector<F>> {
        (**self).gradient(x)
    }

    fn hessian(&self, x: &DVector<F>) -> Option<DMatrix<F>> {
        (**self).hessian(x)
    }
}
