use crate::{Error, Objective};
use nalgebra::{convert, linalg::SymmetricEigen, DMatrix, DVector, Dyn, RealField};
use num_traits::Float;

pub(crate) mod finite_difference;

/// Compute a [numerical approximation](https://en.wikipedia.org/wiki/Numerical_differentiation)
/// of the gradient for testing.
///
/// The function is intended to be used for debugging or testing.
/// You can check the [`gradient`](trait.Objective.html#method.gradient)
/// of an [`Objective`](trait.Objective.html) against it.
///
/// Every entry is an extrapolated central difference quotient, so the
/// result is considerably more accurate than the plain central differences
/// used during the iteration when no gradient is provided. Numerical
/// derivatives are still unstable: if you observe large differences the
/// reason _might_ be the approximation.
///
/// Returns `None` if the objective has no value or failed to evaluate it.
///
/// # Example
///
/// ```
/// # use approx::assert_relative_eq;
/// # use nalgebra::{DVector, DMatrix};
/// use cubic_regularization::{differentiate_numerically, Objective};
///
/// struct Paraboloid;
///
/// impl Objective<f64> for Paraboloid {
///     fn value(&self, x: &DVector<f64>) -> Option<f64> {
///         Some(x[0] * x[0] + 4. * x[1] * x[1])
///     }
///
///     fn gradient(&self, x: &DVector<f64>) -> Option<DVector<f64>> {
///         Some(DVector::from_vec(vec![2. * x[0], 8. * x[1]]))
///     }
/// }
///
/// let x = DVector::from_vec(vec![0.5, -1.25]);
/// let numerical = differentiate_numerically(&x, &Paraboloid).unwrap();
/// assert_relative_eq!(numerical, Paraboloid.gradient(&x).unwrap(), epsilon = 1e-9);
/// ```
pub fn differentiate_numerically<F, O>(x: &DVector<F>, objective: &O) -> Option<DVector<F>>
where
    F: RealField + Float,
    O: Objective<F> + ?Sized,
{
    let mut grad = DVector::zeros(x.nrows());
    for i in 0..x.nrows() {
        grad[i] = finite_difference::derivative(x[i], |xi| {
            let mut probe = x.clone();
            probe[i] = xi;
            objective.value(&probe)
        })?;
    }
    Some(grad)
}

/// Upper bound on the total number of QR sweeps of the symmetric eigensolver.
fn eigen_max_iter(n: usize) -> usize {
    1000 + 100 * n
}

/// Eigendecomposition `$\mathbf{H} = \mathbf{O}\mathbf{\Lambda}\mathbf{O}^\top$`
/// of a symmetric matrix. Eigenvalues are not sorted.
pub(crate) fn symmetric_eigen<F>(matrix: &DMatrix<F>) -> Result<SymmetricEigen<F, Dyn>, Error>
where
    F: RealField + Float,
{
    if matrix.iter().any(|v| !Float::is_finite(*v)) {
        return Err(Error::Numerical("Hessian"));
    }
    SymmetricEigen::try_new(
        matrix.clone(),
        F::default_epsilon(),
        eigen_max_iter(matrix.nrows()),
    )
    .ok_or(Error::Eigendecomposition)
}

/// Index and value of the smallest eigenvalue.
pub(crate) fn smallest_eigenvalue<F>(eigenvalues: &DVector<F>) -> (usize, F)
where
    F: RealField + Float,
{
    eigenvalues
        .iter()
        .copied()
        .enumerate()
        .fold((0, <F as Float>::infinity()), |(imin, min), (i, v)| {
            if v < min {
                (i, v)
            } else {
                (imin, min)
            }
        })
}

/// `$\max(0, -\lambda_{\min}(\mathbf{H}))$`, the shift which makes
/// `$\mathbf{H} + \lambda\mathbf{I}$` positive semi-definite.
pub(crate) fn lambda_nplus<F>(hessian: &DMatrix<F>) -> Result<F, Error>
where
    F: RealField + Float,
{
    let eigen = symmetric_eigen(hessian)?;
    let (_, min) = smallest_eigenvalue(&eigen.eigenvalues);
    Ok(Float::max(-min, F::zero()))
}

/// Spectral norm, the largest singular value.
pub(crate) fn spectral_norm<F>(matrix: DMatrix<F>) -> Result<F, Error>
where
    F: RealField + Float,
{
    if matrix.iter().any(|v| !Float::is_finite(*v)) {
        return Err(Error::Numerical("Hessian"));
    }
    let n = matrix.nrows();
    let svd = matrix
        .try_svd(false, false, F::default_epsilon(), eigen_max_iter(n))
        .ok_or(Error::SingularValues)?;
    Ok(svd
        .singular_values
        .iter()
        .fold(F::zero(), |acc, v| Float::max(acc, *v)))
}

/// Moore-Penrose pseudo-inverse. Singular values up to
/// `$\sigma_{\max}\,\varepsilon\,n$` count as zero.
pub(crate) fn pseudo_inverse<F>(matrix: &DMatrix<F>) -> Result<DMatrix<F>, Error>
where
    F: RealField + Float,
{
    if matrix.iter().any(|v| !Float::is_finite(*v)) {
        return Err(Error::Numerical("Hessian"));
    }
    let n = matrix.nrows();
    let svd = matrix
        .clone()
        .try_svd(true, true, F::default_epsilon(), eigen_max_iter(n))
        .ok_or(Error::SingularValues)?;
    let largest = svd
        .singular_values
        .iter()
        .fold(F::zero(), |acc, v| Float::max(acc, *v));
    let cutoff = largest * F::default_epsilon() * convert::<f64, F>(n as f64);
    svd.pseudo_inverse(cutoff).map_err(|_| Error::SingularValues)
}

/// Check `$\mathbf{O}^\top\mathbf{O} = \mathbf{I}$` up to a tolerance scaled
/// with the dimension.
pub(crate) fn is_orthonormal<F>(o: &DMatrix<F>) -> bool
where
    F: RealField + Float,
{
    let n = o.ncols();
    let tol: F = F::default_epsilon() * convert::<f64, F>(1e3) * convert::<f64, F>(n as f64);
    let gram = o.transpose() * o;
    gram.nrows() == gram.ncols()
        && gram.iter().enumerate().all(|(k, v)| {
            // column-major: entry k lies in row k % n and column k / n
            let expected = if k % n == k / n { F::one() } else { F::zero() };
            Float::abs(*v - expected) <= tol
        })
}
