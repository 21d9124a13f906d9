//! Solver for the cubic subproblem by a parametric trust-region iteration.
use log::trace;
use nalgebra::{convert, linalg::Cholesky, DMatrix, DVector, Dyn, RealField};
use num_traits::Float;

use crate::subproblem::{AuxiliaryProblem, AuxiliarySolution, AuxiliarySolver, SubproblemFailure};
use crate::utils::{smallest_eigenvalue, symmetric_eigen};
use crate::Error;

/// How often the shift is doubled before a factorization is given up.
const MAX_SHIFT_DOUBLINGS: usize = 64;

/// Minimize the cubic model with a secular-equation Newton iteration.
///
/// A vector `$\vec{s}$` is a global minimizer of the cubic model `$m_M$` if and only
/// if there is `$\lambda \geq \max(0, -\lambda_{\min}(\mathbf{H}))$` with
/// ```math
/// \begin{aligned}
/// (\mathbf{H} + \lambda\mathbf{I})\vec{s} &= -\vec{g}, \\
/// \lambda &= \frac{M}{2}\|\vec{s}\|.
/// \end{aligned}
/// ```
/// This is the trust-region subproblem with radius `$r = 2\lambda/M$`, and
/// `$\lambda$` is found by Newton's method on the secular equation
/// ```math
///   \phi(\lambda) = \frac{1}{\|\vec{s}(\lambda)\|} - \frac{M}{2\lambda} = 0,
/// ```
/// where `$\vec{s}(\lambda)$` comes from a Cholesky factorization
/// `$\mathbf{H} + \lambda\mathbf{I} = \mathbf{L}\mathbf{L}^\top$`. The iteration stops once
/// `$\bigl|\|\vec{s}\| - 2\lambda/M\bigr| \leq \kappa_{\text{easy}}$`.
///
/// If the solution at the smallest admissible `$\lambda$` lies inside the
/// radius (the _hard case_), the step is completed along the eigenvector
/// of the smallest eigenvalue of `$\mathbf{H}$` until it reaches the radius.
///
/// # Failure
///
/// When `$\mathbf{H} + \lambda\mathbf{I}$` cannot be factorized, the shift off
/// `$\lambda_{\min}$` is doubled and the factorization retried. If this keeps
/// failing, the solution carries [`SubproblemFailure::Cholesky`] and a zero step.
///
/// # Reference
///
/// This is a slightly modified Algorithm 7.3.6 from
///
/// > Conn, A. R., Gould, N. I., & Toint, P. L. (2000). Trust region methods. SIAM.
///
/// The shift doubling follows p. 516 of Gould, Lucidi, Roma & Toint (1999),
/// Solving the trust-region subproblem using the Lanczos method.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TrustRegion;

/// Step for a fixed `$\lambda$` together with its factorization.
struct Factorized<F: RealField> {
    lambda: F,
    step: DVector<F>,
    cholesky: Cholesky<F, Dyn>,
}

fn shifted<F: RealField + Float>(hessian: &DMatrix<F>, lambda: F) -> DMatrix<F> {
    let mut h_lambda = hessian.clone();
    for i in 0..h_lambda.nrows() {
        h_lambda[(i, i)] += lambda;
    }
    h_lambda
}

/// Solve `$(\mathbf{H} + \lambda\mathbf{I})\vec{s} = -\vec{g}$`.
///
/// On breakdown `shift` is doubled and `$\lambda$` reset to
/// `$\lambda_+ + \mathtt{shift}$`, so the returned `$\lambda$` may differ from
/// the requested one.
fn factorize<F>(
    problem: &AuxiliaryProblem<'_, F>,
    lambda: F,
    shift: &mut F,
) -> Option<Factorized<F>>
where
    F: RealField + Float,
{
    let mut lambda = lambda;
    for _ in 0..=MAX_SHIFT_DOUBLINGS {
        if let Some(cholesky) = Cholesky::new(shifted(problem.hessian, lambda)) {
            let step = cholesky.solve(&-problem.gradient);
            if step.iter().all(|v| Float::is_finite(*v)) {
                return Some(Factorized {
                    lambda,
                    step,
                    cholesky,
                });
            }
        }
        *shift *= convert::<f64, F>(2.);
        lambda = problem.lambda_nplus + *shift;
        trace!("Cholesky breakdown, retrying with lambda = {}", lambda);
    }
    None
}

/// One Newton step on the secular equation.
///
/// With `$\vec{w} = \mathbf{L}^{-1}\vec{s}$` the derivative is
/// `$\phi'(\lambda) = \|\vec{w}\|^2/\|\vec{s}\|^3 + M/(2\lambda^2)$`.
fn newton_lambda<F>(current: &Factorized<F>, m: F) -> Option<F>
where
    F: RealField + Float,
{
    let w = current.cholesky.l().solve_lower_triangular(&current.step)?;
    let lambda = current.lambda;
    let norm_s = current.step.norm();
    let two: F = convert(2.);
    let phi = F::one() / norm_s - m / (two * lambda);
    let phi_prime = w.norm_squared() / Float::powi(norm_s, 3) + m / (two * lambda * lambda);
    Some(lambda - phi / phi_prime)
}

/// Step for the hard case: `$\vec{s}_{\text{cri}} + \alpha\vec{u}_1$` on the
/// sphere of radius `$2\lambda_+/M$`.
fn hard_case<F>(problem: &AuxiliaryProblem<'_, F>) -> Result<DVector<F>, Error>
where
    F: RealField + Float,
{
    let n = problem.gradient.nrows();
    let eigen = symmetric_eigen(&shifted(problem.hessian, problem.lambda_nplus))?;
    let (index_min, _) = smallest_eigenvalue(&eigen.eigenvalues);
    let largest = eigen
        .eigenvalues
        .iter()
        .fold(F::zero(), |acc, v| Float::max(acc, Float::abs(*v)));
    let cutoff = largest * F::default_epsilon() * convert(n as f64);
    // pseudo-inverse of the diagonal
    let inverse = eigen.eigenvalues.map(|v| {
        if Float::abs(v) > cutoff {
            F::one() / v
        } else {
            F::zero()
        }
    });
    let u = &eigen.eigenvectors;
    let s_cri = -(u * (u.transpose() * problem.gradient).component_mul(&inverse));
    let u_1 = u.column(index_min).into_owned();

    let two: F = convert(2.);
    let radius = two * problem.lambda_nplus / problem.regularization;
    let a = u_1.norm_squared();
    let b = two * u_1.dot(&s_cri);
    let c = s_cri.norm_squared() - radius * radius;
    let discriminant = Float::max(b * b - convert::<f64, F>(4.) * a * c, F::zero());
    let alpha = (-b + Float::sqrt(discriminant)) / (two * a);
    Ok(s_cri + u_1 * alpha)
}

impl<F: RealField + Float> AuxiliarySolver<F> for TrustRegion {
    fn solve(&self, problem: &AuxiliaryProblem<'_, F>) -> Result<AuxiliarySolution<F>, Error> {
        let n = problem.gradient.nrows();
        let m = problem.regularization;
        let two: F = convert(2.);
        let half: F = convert(0.5);

        // stay off the eigenvalue where H + lambda I is singular
        let mut shift = (F::one() + problem.lambda_nplus) * Float::sqrt(F::default_epsilon());
        let lambda = if problem.lambda_nplus.is_zero() {
            F::zero()
        } else {
            problem.lambda_nplus + shift
        };
        let mut current = match factorize(problem, lambda, &mut shift) {
            Some(current) => current,
            None => return Ok(AuxiliarySolution::failed(n, SubproblemFailure::Cholesky)),
        };

        let norm_s = current.step.norm();
        let radius = two * current.lambda / m;
        if norm_s <= radius {
            if current.lambda.is_zero() || norm_s == radius {
                return Ok(AuxiliarySolution::new(current.step, None));
            }
            trace!("hard case at lambda_nplus = {}", problem.lambda_nplus);
            return Ok(AuxiliarySolution::new(hard_case(problem)?, None));
        }

        if current.lambda.is_zero() {
            current = match factorize(problem, shift, &mut shift) {
                Some(current) => current,
                None => return Ok(AuxiliarySolution::failed(n, SubproblemFailure::Cholesky)),
            };
        }

        let mut iterations = 0;
        while Float::abs(current.step.norm() - two * current.lambda / m) > problem.kappa_easy
            && iterations < problem.max_iter
        {
            iterations += 1;
            let next = match newton_lambda(&current, m) {
                Some(next) => next,
                None => return Ok(AuxiliarySolution::failed(n, SubproblemFailure::Cholesky)),
            };
            // keep H + lambda I definite: fall back to bisection towards lambda_nplus
            let next = if next > problem.lambda_nplus && Float::is_finite(next) {
                next
            } else {
                problem.lambda_nplus + (current.lambda - problem.lambda_nplus) * half
            };
            current = match factorize(problem, next, &mut shift) {
                Some(current) => current,
                None => return Ok(AuxiliarySolution::failed(n, SubproblemFailure::Cholesky)),
            };
        }
        trace!(
            "secular equation: lambda = {} after {} Newton steps",
            current.lambda,
            iterations
        );
        Ok(AuxiliarySolution::new(current.step, None))
    }
}
