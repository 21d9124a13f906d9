//! Solver for the cubic subproblem by diagonalization and a scalar root.
use log::trace;
use nalgebra::{convert, DVector, RealField};
use num_traits::Float;

use crate::subproblem::{AuxiliaryProblem, AuxiliarySolution, AuxiliarySolver};
use crate::utils::{is_orthonormal, smallest_eigenvalue, symmetric_eigen};
use crate::Error;

/// Floor for non-positive eigenvalues inside the scalar equation.
const EIGENVALUE_FLOOR: f64 = 1.0e-8;
/// Offset of the initial Newton guess from the pole of the scalar equation.
const SEED_OFFSET: f64 = 1.0e-4;
/// Absolute tolerance on consecutive Newton iterates.
const NEWTON_TOL: f64 = 1.48e-8;
/// Entries of the projected gradient below this count as zero.
const STATIONARY_TOL: f64 = 1.0e-8;

/// Minimize the cubic model in the eigenbasis of the Hessian.
///
/// With `$\mathbf{H} = \mathbf{O}\mathbf{\Lambda}\mathbf{O}^\top$` and the projected
/// gradient `$\vec{\eta} = \mathbf{O}^\top\vec{g}$` the step decouples into
/// `$u_i = -\eta_i / (\lambda_i + 3Mt)$`, where `$t > 0$` is the root of
/// ```math
///   \psi(t) = \left\|\frac{\vec{\eta}}{\mathbf{\Lambda} + 3Mt}\right\| - t.
/// ```
/// `$\psi$` is convex and strictly decreasing, so Newton's method started
/// left of the root converges monotonically. The step is `$\vec{s} = \mathbf{O}\vec{u}$`
/// and satisfies `$\|\vec{s}\| = t$`.
///
/// Non-positive eigenvalues are replaced by `$10^{-8}$` inside `$\psi$`.
///
/// If `$\vec{\eta} \approx 0$` the current point is stationary. At a saddle
/// point or maximum the step is the eigenvector of the most negative
/// eigenvalue; otherwise `$\vec{\eta}$` itself is returned and the iterate
/// barely moves.
///
/// The solution reports the condition number `$\lambda_{\max}/\lambda_{\min}$`
/// of the unclamped eigenvalues.
///
/// # Errors
///
/// A failed eigendecomposition, eigenvectors which are not orthonormal and
/// Newton's method running out of iterations are all errors.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MonotoneNorm;

/// Newton's method for the root of `$\psi$`.
///
/// `eigenvalues` must already be clamped. Steps which would cross the pole
/// at `$t = -\lambda_{\min}/(3M)$` are replaced by bisection towards it.
pub(crate) fn solve_norm_equation<F>(
    eta: &DVector<F>,
    eigenvalues: &DVector<F>,
    m: F,
    max_iter: usize,
) -> Result<F, Error>
where
    F: RealField + Float,
{
    let three_m: F = m * convert(3.);
    let half: F = convert(0.5);
    let tol: F = convert(NEWTON_TOL);
    let seed_offset: F = convert(SEED_OFFSET);
    let (_, min) = smallest_eigenvalue(eigenvalues);
    let pole = -min / three_m;

    let mut t = Float::max(pole + seed_offset, seed_offset);
    for iteration in 0..max_iter {
        let denominators = eigenvalues.map(|lambda| lambda + three_m * t);
        let u = eta.component_div(&denominators);
        let norm = u.norm();
        let psi = norm - t;
        let slope = if norm.is_zero() {
            -F::one()
        } else {
            // d/dt of the norm is -3M sum(eta_i^2 / d_i^3) / norm
            let weighted = u
                .iter()
                .zip(denominators.iter())
                .fold(F::zero(), |acc, (u_i, d_i)| acc + *u_i * *u_i / *d_i);
            -three_m * weighted / norm - F::one()
        };
        let mut next = t - psi / slope;
        if next <= pole || !Float::is_finite(next) {
            next = (t + pole) * half;
        }
        if Float::abs(next - t) < tol {
            trace!("norm equation: t = {} after {} Newton steps", next, iteration + 1);
            return Ok(next);
        }
        t = next;
    }
    Err(Error::RootNotFound(max_iter))
}

impl<F: RealField + Float> AuxiliarySolver<F> for MonotoneNorm {
    fn solve(&self, problem: &AuxiliaryProblem<'_, F>) -> Result<AuxiliarySolution<F>, Error> {
        let eigen = symmetric_eigen(problem.hessian)?;
        // the columns of O are the eigenvectors
        let o = &eigen.eigenvectors;
        if !is_orthonormal(o) {
            return Err(Error::Diagonalization);
        }
        let (index_min, lambda_min) = smallest_eigenvalue(&eigen.eigenvalues);
        let lambda_max = eigen
            .eigenvalues
            .iter()
            .fold(lambda_min, |acc, v| Float::max(acc, *v));
        let condition = lambda_max / lambda_min;

        let floor: F = convert(EIGENVALUE_FLOOR);
        let clamped = eigen
            .eigenvalues
            .map(|lambda| if lambda <= F::zero() { floor } else { lambda });

        let eta = o.transpose() * problem.gradient;
        let stationary_tol: F = convert(STATIONARY_TOL);
        if eta.iter().all(|v| Float::abs(*v) <= stationary_tol) {
            let step = if lambda_min < F::zero() {
                trace!("stationary point with negative curvature {}", lambda_min);
                o.column(index_min).into_owned()
            } else {
                eta
            };
            return Ok(AuxiliarySolution::new(step, Some(condition)));
        }

        let t = solve_norm_equation(&eta, &clamped, problem.regularization, problem.max_iter)?;
        let three_m_t = problem.regularization * convert(3.) * t;
        let u = -eta.component_div(&clamped.map(|lambda| lambda + three_m_t));
        Ok(AuxiliarySolution::new(o * u, Some(condition)))
    }
}
