//! Finite difference approximations of gradients and Hessians.
use nalgebra::{convert, DMatrix, DVector, RealField};
use num_traits::Float;

#[cfg(test)]
use approx::assert_relative_eq;

const STEP_RATIO: f64 = 2.;
const TABLEAU_SIZE: usize = 10;
const SAFE: f64 = 2.;

/// Default step for the finite differences, `$2\sqrt{\varepsilon}$` with
/// `$\varepsilon$` the machine epsilon.
pub fn default_step<F: RealField + Float>() -> F {
    Float::sqrt(F::default_epsilon()) * convert(2.)
}

/// Central difference approximation of the gradient.
///
/// Entry `$i$` is
/// ```math
///   \frac{f(\vec{x} + \epsilon\vec{e}_i) - f(\vec{x} - \epsilon\vec{e}_i)}{2\epsilon}.
/// ```
/// Returns `None` if one of the evaluations of `f` did.
pub fn approx_gradient<F>(
    f: impl Fn(&DVector<F>) -> Option<F>,
    x: &DVector<F>,
    epsilon: F,
) -> Option<DVector<F>>
where
    F: RealField + Float,
{
    let two_eps = epsilon * convert(2.);
    let mut probe = x.clone();
    let mut grad = DVector::zeros(x.nrows());
    for i in 0..x.nrows() {
        probe[i] = x[i] + epsilon;
        let forward = f(&probe)?;
        probe[i] = x[i] - epsilon;
        let backward = f(&probe)?;
        probe[i] = x[i];
        grad[i] = (forward - backward) / two_eps;
    }
    Some(grad)
}

/// Forward difference approximation of the Hessian from the gradient.
///
/// Column `$j$` is
/// ```math
///   \frac{\nabla f(\vec{x} + \epsilon\vec{e}_j) - \nabla f(\vec{x})}{\epsilon}.
/// ```
/// The result is not symmetrized. Returns `None` if one of the gradient
/// evaluations did, or if a gradient has the wrong length.
pub fn approx_hessian<F>(
    grad: impl Fn(&DVector<F>) -> Option<DVector<F>>,
    x: &DVector<F>,
    epsilon: F,
) -> Option<DMatrix<F>>
where
    F: RealField + Float,
{
    let n = x.nrows();
    let grad_x = grad(x)?;
    if grad_x.nrows() != n {
        return None;
    }
    let mut probe = x.clone();
    let mut hessian = DMatrix::zeros(n, n);
    for j in 0..n {
        probe[j] = x[j] + epsilon;
        let shifted = grad(&probe)?;
        probe[j] = x[j];
        if shifted.nrows() != n {
            return None;
        }
        hessian.set_column(j, &((shifted - &grad_x) / epsilon));
    }
    Some(hessian)
}

/// Compute the derivative of a scalar function with an extrapolated central
/// difference quotient.
///
/// The step is halved repeatedly and the central quotients are combined in a
/// Richardson tableau (Ridders' method). The entry with the smallest error
/// estimate wins. Stops early once the tableau diagonal starts to diverge,
/// which is where round-off takes over.
///
/// This is far more expensive than [`approx_gradient`] and meant for checking
/// derivative implementations, not for the iteration itself.
pub fn derivative<F>(x: F, f: impl Fn(F) -> Option<F>) -> Option<F>
where
    F: RealField + Float,
{
    let ratio: F = convert(STEP_RATIO);
    let ratio_sq = ratio * ratio;
    let two: F = convert(2.);
    let mut h: F = Float::max(Float::abs(x), F::one()) * convert(0.1);

    let mut tableau = [[F::zero(); TABLEAU_SIZE]; TABLEAU_SIZE];
    tableau[0][0] = (f(x + h)? - f(x - h)?) / (two * h);
    let mut best = tableau[0][0];
    let mut err = <F as Float>::infinity();
    for i in 1..TABLEAU_SIZE {
        h /= ratio;
        tableau[0][i] = (f(x + h)? - f(x - h)?) / (two * h);
        let mut factor = ratio_sq;
        for j in 1..=i {
            tableau[j][i] =
                (tableau[j - 1][i] * factor - tableau[j - 1][i - 1]) / (factor - F::one());
            factor *= ratio_sq;
            let estimate = Float::max(
                Float::abs(tableau[j][i] - tableau[j - 1][i]),
                Float::abs(tableau[j][i] - tableau[j - 1][i - 1]),
            );
            if estimate <= err {
                err = estimate;
                best = tableau[j][i];
            }
        }
        if Float::abs(tableau[i][i] - tableau[i - 1][i - 1]) >= err * convert(SAFE) {
            break;
        }
    }
    if Float::is_finite(best) {
        Some(best)
    } else {
        None
    }
}

#[test]
fn test_central_gradient() {
    let f = |x: &DVector<f64>| Some(x[0] * x[0] + 3. * x[0] * x[1] - x[1]);
    let x = DVector::from_vec(vec![1.5, -2.]);
    let grad = approx_gradient(f, &x, default_step()).unwrap();
    assert_relative_eq!(grad[0], 2. * 1.5 + 3. * -2., epsilon = 1e-6);
    assert_relative_eq!(grad[1], 3. * 1.5 - 1., epsilon = 1e-6);
}

#[test]
fn test_gradient_propagates_failure() {
    let f = |x: &DVector<f64>| if x[1] > 0. { None } else { Some(x[0]) };
    let x = DVector::from_vec(vec![0., 0.]);
    assert!(approx_gradient(f, &x, 1e-3).is_none());
}

#[test]
fn test_forward_hessian_is_not_symmetrized() {
    // the gradient field of no function: d/dy of the first entry differs
    // from d/dx of the second
    let grad = |x: &DVector<f64>| Some(DVector::from_vec(vec![2. * x[0] + x[1], 4. * x[1]]));
    let x = DVector::from_vec(vec![0.3, 0.7]);
    let hessian = approx_hessian(grad, &x, default_step()).unwrap();
    assert_relative_eq!(hessian[(0, 0)], 2., epsilon = 1e-6);
    assert_relative_eq!(hessian[(0, 1)], 1., epsilon = 1e-6);
    assert_relative_eq!(hessian[(1, 0)], 0., epsilon = 1e-6);
    assert_relative_eq!(hessian[(1, 1)], 4., epsilon = 1e-6);
}

#[test]
fn test_hessian_rejects_wrong_length() {
    let grad = |x: &DVector<f64>| Some(DVector::from_element(x.nrows() + 1, 1.));
    let x = DVector::from_vec(vec![0.3, 0.7]);
    assert!(approx_hessian(grad, &x, 1e-4).is_none());
}

#[test]
fn test_derivative_linear() {
    assert_relative_eq!(
        derivative(0.123f64, |x| Some(3. * x - 1.)).unwrap(),
        3.,
        epsilon = 1e-12
    );
    assert_relative_eq!(
        derivative(0.0, |x| Some(-3. * x - 1.)).unwrap(),
        -3.,
        epsilon = 1e-12
    );
    assert_relative_eq!(derivative(0.2, |_: f64| Some(1.)).unwrap(), 0.);
}

#[test]
fn test_derivative_standard_functions() {
    assert_relative_eq!(
        derivative(0., |x: f64| Some(x.exp())).unwrap(),
        1.,
        epsilon = 1e-10
    );
    assert_relative_eq!(
        derivative(-1.2, |x: f64| Some(x.exp())).unwrap(),
        (-1.2f64).exp(),
        epsilon = 1e-10
    );
    assert_relative_eq!(
        derivative(90., |x: f64| Some(x.ln())).unwrap(),
        1. / 90.,
        epsilon = 1e-10
    );
    assert_relative_eq!(
        derivative(2., |x| Some(4. * x * x - 2. * x)).unwrap(),
        14.,
        epsilon = 1e-9
    );
}
