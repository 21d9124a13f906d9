use core::cell::Cell;

use log::{debug, warn};
use nalgebra::{convert, DMatrix, DVector, RealField};
use num_traits::Float;

use crate::convergence::{ConvergenceCriterion, ConvergenceState};
use crate::error::scalar;
use crate::subproblem::{
    cubic_model, AuxiliaryMethod, AuxiliaryProblem, AuxiliarySolution, AuxiliarySolver,
    SubproblemFailure,
};
use crate::utils::finite_difference::{approx_gradient, approx_hessian, default_step};
use crate::utils::{lambda_nplus, spectral_norm};
use crate::{Error, Objective};

#[cfg(test)]
mod test_helpers;
#[cfg(test)]
mod test_init;

/// Reasons for terminating a run without an [`Error`](enum.Error.html).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The convergence criterion was met.
    Converged,
    /// The maximal number of outer iterations was hit.
    LostPatience,
    /// The subproblem solver gave up. The iterate where it happened is returned.
    Subproblem(SubproblemFailure),
}

impl TerminationReason {
    /// Was the criterion met?
    pub fn was_successful(&self) -> bool {
        matches!(self, Self::Converged)
    }
}

/// Information about the minimization.
///
/// Use this to inspect the minimization process. Most importantly
/// you may want to check [`termination`](#structfield.termination).
///
/// The per-iteration vectors have one entry for every accepted step.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimizationReport<F: RealField> {
    /// The final iterate.
    pub x: DVector<F>,
    /// Every accepted iterate, starting with `$\vec{x}_0$`.
    pub trace: Vec<DVector<F>>,
    /// Number of accepted steps.
    pub iterations: usize,
    pub termination: TerminationReason,
    /// Condition number of the Hessian as seen by the subproblem solver.
    /// Only [`MonotoneNorm`](struct.MonotoneNorm.html) computes it.
    pub hessian_conditioning: Vec<Option<F>>,
    /// The weight `$M_k$` of each accepted step.
    pub regularization: Vec<F>,
    /// How many weights were tried for each accepted step.
    pub upper_bound_attempts: Vec<usize>,
    /// Contains `$f(\vec{x})$` if the objective provides values.
    pub objective_function: Option<F>,
    /// `$\max(0, -\lambda_{\min})$` of the final Hessian.
    pub lambda_nplus: F,
    /// Whether the final Hessian is positive semi-definite. If not, the run
    /// most likely ended near a saddle point.
    pub hessian_psd: bool,
}

impl<F: RealField> MinimizationReport<F> {
    /// `0` on success or lost patience, `1` if the subproblem failed.
    pub fn failure_flag(&self) -> u8 {
        match self.termination {
            TerminationReason::Subproblem(_) => 1,
            _ => 0,
        }
    }
}

/// Cubic regularization of Newton's method.
///
/// See the [module documentation](index.html) for a usage example.
///
/// Every iteration minimizes the cubic model `$m_M$` of the objective
/// around the current iterate (see [`cubic_model`](fn.cubic_model.html)).
/// The weight starts each iteration at `$\max(M_{k-1}/2, L_0)$` and is doubled
/// until the model is an upper bound at the new point, i.e.
/// `$m_M(\vec{s}) \geq f(\vec{x} + \vec{s})$`.
///
/// The settings are checked when a run starts, invalid values are reported as
/// [`Error`](enum.Error.html) by [`minimize`](#method.minimize).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CubicRegularization<F> {
    max_iter: usize,
    submax_iter: usize,
    kappa_easy: F,
    conv_tol: F,
    conv_criterion: ConvergenceCriterion,
    epsilon: F,
    aux_method: AuxiliaryMethod,
    lipschitz: Option<F>,
    initial_regularization: Option<F>,
    symmetrize_hessian: bool,
}

impl<F: RealField + Float> CubicRegularization<F> {
    pub fn new() -> Self {
        Self {
            max_iter: 10000,
            submax_iter: 10000,
            kappa_easy: convert(1.0e-4),
            conv_tol: convert(1.0e-5),
            conv_criterion: ConvergenceCriterion::default(),
            epsilon: default_step(),
            aux_method: AuxiliaryMethod::default(),
            lipschitz: None,
            initial_regularization: None,
            symmetrize_hessian: false,
        }
    }

    /// Set the maximal number of outer iterations.
    ///
    /// Zero is allowed and returns the start point.
    pub fn with_max_iter(self, max_iter: usize) -> Self {
        Self { max_iter, ..self }
    }

    /// Set the maximal number of weights tried per iteration.
    ///
    /// This also bounds the root finding inside the subproblem solvers.
    /// Must be at least one.
    pub fn with_submax_iter(self, submax_iter: usize) -> Self {
        Self {
            submax_iter,
            ..self
        }
    }

    /// Set the tolerance of the trust-region subproblem solver.
    ///
    /// The secular iteration stops once `$\bigl|\|\vec{s}\| - 2\lambda/M\bigr| \leq \kappa_{\text{easy}}$`.
    pub fn with_kappa_easy(self, kappa_easy: F) -> Self {
        Self { kappa_easy, ..self }
    }

    /// Set the tolerance of the convergence criterion.
    pub fn with_conv_tol(self, conv_tol: F) -> Self {
        Self { conv_tol, ..self }
    }

    pub fn with_conv_criterion(self, conv_criterion: ConvergenceCriterion) -> Self {
        Self {
            conv_criterion,
            ..self
        }
    }

    /// Set the step of the finite differences used for missing derivatives.
    ///
    /// Defaults to `$2\sqrt{\varepsilon}$` with the machine epsilon `$\varepsilon$`.
    pub fn with_epsilon(self, epsilon: F) -> Self {
        Self { epsilon, ..self }
    }

    /// Select the method which minimizes the cubic model.
    pub fn with_aux_method(self, aux_method: AuxiliaryMethod) -> Self {
        Self { aux_method, ..self }
    }

    /// Provide the Lipschitz constant `$L$` of the Hessian.
    ///
    /// It serves as `$L_0$` unless that is set as well. For an objective
    /// without values it is required: the weight then stays at `$L$` and the
    /// upper bound is not checked.
    pub fn with_lipschitz(self, lipschitz: F) -> Self {
        Self {
            lipschitz: Some(lipschitz),
            ..self
        }
    }

    /// Set `$L_0$`, the lower bound for the weight `$M_k$`.
    ///
    /// Without `$L_0$` and `$L$` it is estimated from the Hessians at
    /// `$\vec{x}_0$` and `$\vec{x}_0 + \mathbb{1}$`:
    /// ```math
    ///   L_0 = \frac{\|\nabla^2 f(\vec{x}_0) - \nabla^2 f(\vec{x}_0 + \mathbb{1})\|_2}{\|\mathbb{1}\|} + \epsilon.
    /// ```
    pub fn with_initial_regularization(self, initial_regularization: F) -> Self {
        Self {
            initial_regularization: Some(initial_regularization),
            ..self
        }
    }

    /// Replace finite-difference Hessians by `$(\mathbf{H} + \mathbf{H}^\top)/2$`.
    ///
    /// Hessians provided by the objective are used unchanged.
    pub fn with_symmetrized_hessian(self, symmetrize_hessian: bool) -> Self {
        Self {
            symmetrize_hessian,
            ..self
        }
    }

    /// Try to minimize the objective starting at `x0`.
    ///
    /// # Errors
    ///
    /// Invalid settings or an objective which does not fit `x0` are reported
    /// before the first iteration; see [`Error`](enum.Error.html) for what can
    /// fail later on.
    pub fn minimize<O>(
        &self,
        x0: DVector<F>,
        objective: O,
    ) -> Result<MinimizationReport<F>, Error>
    where
        O: Objective<F>,
    {
        self.minimize_with(x0, objective, self.aux_method)
    }

    /// Like [`minimize`](#method.minimize), but the cubic model is minimized
    /// by `solver` instead of the configured [`AuxiliaryMethod`](enum.AuxiliaryMethod.html).
    pub fn minimize_with<O, S>(
        &self,
        x0: DVector<F>,
        objective: O,
        solver: S,
    ) -> Result<MinimizationReport<F>, Error>
    where
        O: Objective<F>,
        S: AuxiliarySolver<F>,
    {
        CubicReg::with_solver(self, x0, objective, solver)?.run()
    }

    fn validate(&self) -> Result<(), Error> {
        positive("kappa_easy", self.kappa_easy)?;
        positive("conv_tol", self.conv_tol)?;
        positive("epsilon", self.epsilon)?;
        if let Some(lipschitz) = self.lipschitz {
            positive("L", lipschitz)?;
        }
        if let Some(l0) = self.initial_regularization {
            positive("L0", l0)?;
        }
        if self.submax_iter == 0 {
            return Err(Error::ZeroIterations("submax_iter"));
        }
        Ok(())
    }
}

impl<F: RealField + Float> Default for CubicRegularization<F> {
    fn default() -> Self {
        Self::new()
    }
}

fn positive<F: RealField + Float>(name: &'static str, value: F) -> Result<(), Error> {
    if value > F::zero() && Float::is_finite(value) {
        Ok(())
    } else {
        Err(Error::NonPositive {
            name,
            value: scalar(value),
        })
    }
}

/// Outcome of the search for a weight.
struct Trial<F: RealField> {
    x_new: DVector<F>,
    f_new: Option<F>,
    regularization: F,
    attempts: usize,
    solution: AuxiliarySolution<F>,
}

/// One run of [`CubicRegularization`](struct.CubicRegularization.html).
///
/// [`new`](#method.new) validates the settings, probes the objective at the
/// start point and computes the derivatives there; [`run`](#method.run)
/// iterates.
pub struct CubicReg<'a, F, O, S = AuxiliaryMethod>
where
    F: RealField,
{
    config: &'a CubicRegularization<F>,
    objective: O,
    solver: S,
    has_value: bool,
    has_gradient: bool,
    has_hessian: bool,
    l0: F,
    x: DVector<F>,
    f_x: Option<F>,
    gradient: DVector<F>,
    hessian: DMatrix<F>,
    lambda_nplus: F,
}

impl<'a, F, O> CubicReg<'a, F, O>
where
    F: RealField + Float,
    O: Objective<F>,
{
    /// Set up a run with the configured [`AuxiliaryMethod`](enum.AuxiliaryMethod.html).
    ///
    /// A callback counts as provided if it returns `Some` at `x0`.
    pub fn new(
        config: &'a CubicRegularization<F>,
        x0: DVector<F>,
        objective: O,
    ) -> Result<Self, Error> {
        Self::with_solver(config, x0, objective, config.aux_method)
    }
}

impl<'a, F, O, S> CubicReg<'a, F, O, S>
where
    F: RealField + Float,
    O: Objective<F>,
    S: AuxiliarySolver<F>,
{
    /// Set up a run which minimizes the cubic model with `solver`.
    pub fn with_solver(
        config: &'a CubicRegularization<F>,
        x0: DVector<F>,
        objective: O,
        solver: S,
    ) -> Result<Self, Error> {
        config.validate()?;
        let n = x0.nrows();
        if n == 0 {
            return Err(Error::NoParameters);
        }

        let f_x = objective.value(&x0);
        let gradient = objective.gradient(&x0);
        let hessian = objective.hessian(&x0);
        if f_x.is_none() && (gradient.is_none() || hessian.is_none()) {
            return Err(Error::MissingDerivatives);
        }
        if f_x.is_none() {
            if config.lipschitz.is_none() {
                return Err(Error::MissingLipschitz);
            }
            if config.conv_criterion == ConvergenceCriterion::Function {
                return Err(Error::CriterionNeedsValue);
            }
        }
        if let Some(f_x) = f_x {
            if !Float::is_finite(f_x) {
                return Err(Error::Numerical("objective value"));
            }
        }
        if let Some(gradient) = &gradient {
            check_length("gradient", n, gradient.nrows())?;
        }
        if let Some(hessian) = &hessian {
            check_length("Hessian column", n, hessian.nrows())?;
            check_length("Hessian row", n, hessian.ncols())?;
        }

        let mut run = Self {
            config,
            has_value: f_x.is_some(),
            has_gradient: gradient.is_some(),
            has_hessian: hessian.is_some(),
            objective,
            solver,
            l0: F::zero(),
            f_x,
            gradient: DVector::zeros(n),
            hessian: DMatrix::zeros(n, n),
            lambda_nplus: F::zero(),
            x: x0,
        };
        run.gradient = match gradient {
            Some(gradient) => check_finite("gradient", gradient)?,
            None => run.eval_gradient(&run.x)?,
        };
        run.hessian = match hessian {
            Some(hessian) => hessian,
            None => run.eval_hessian(&run.x)?,
        };
        run.lambda_nplus = lambda_nplus(&run.hessian)?;
        run.l0 = match (config.initial_regularization, config.lipschitz) {
            (Some(l0), _) | (None, Some(l0)) => l0,
            (None, None) => run.estimate_l0()?,
        };
        debug!("cubic regularization on {} parameters, L0 = {}", n, run.l0);
        Ok(run)
    }

    /// `$L_0$`, the lower bound of the weights.
    pub fn lower_bound(&self) -> F {
        self.l0
    }

    fn estimate_l0(&self) -> Result<F, Error> {
        let n = self.x.nrows();
        let ones = DVector::from_element(n, F::one());
        let shifted = self.eval_hessian(&(&self.x + &ones))?;
        let difference = spectral_norm(&self.hessian - shifted)?;
        Ok(difference / ones.norm() + self.config.epsilon)
    }

    fn eval_value(&self, x: &DVector<F>) -> Result<Option<F>, Error> {
        if self.has_value {
            self.objective.value(x).ok_or(Error::User("value")).map(Some)
        } else {
            Ok(None)
        }
    }

    fn eval_gradient(&self, x: &DVector<F>) -> Result<DVector<F>, Error> {
        let gradient = if self.has_gradient {
            let gradient = self.objective.gradient(x).ok_or(Error::User("gradient"))?;
            check_length("gradient", x.nrows(), gradient.nrows())?;
            gradient
        } else {
            approx_gradient(|y| self.objective.value(y), x, self.config.epsilon)
                .ok_or(Error::User("value"))?
        };
        check_finite("gradient", gradient)
    }

    fn eval_hessian(&self, x: &DVector<F>) -> Result<DMatrix<F>, Error> {
        if self.has_hessian {
            let hessian = self.objective.hessian(x).ok_or(Error::User("hessian"))?;
            check_length("Hessian column", x.nrows(), hessian.nrows())?;
            check_length("Hessian row", x.nrows(), hessian.ncols())?;
            return Ok(hessian);
        }
        let failure = Cell::new(None);
        let hessian = approx_hessian(
            |y| {
                self.eval_gradient(y)
                    .map_err(|err| failure.set(Some(err)))
                    .ok()
            },
            x,
            self.config.epsilon,
        );
        let hessian = match hessian {
            Some(hessian) => hessian,
            None => return Err(failure.take().unwrap_or(Error::User("gradient"))),
        };
        if self.config.symmetrize_hessian {
            let transposed = hessian.transpose();
            Ok((hessian + transposed) * convert::<f64, F>(0.5))
        } else {
            Ok(hessian)
        }
    }

    /// Search the weight for the next step, starting at `$\max(M/2, L_0)$`.
    fn find_x_new(&self, mk: F) -> Result<Trial<F>, Error> {
        let mut mk = Float::max(mk * convert(0.5), self.l0);
        for attempt in 1..=self.config.submax_iter {
            if attempt > 1 {
                mk *= convert::<f64, F>(2.);
            }
            let problem = AuxiliaryProblem {
                gradient: &self.gradient,
                hessian: &self.hessian,
                regularization: mk,
                lambda_nplus: self.lambda_nplus,
                kappa_easy: self.config.kappa_easy,
                max_iter: self.config.submax_iter,
            };
            let solution = self.solver.solve(&problem)?;
            let x_new = &self.x + &solution.step;
            if solution.failure.is_some() {
                return Ok(Trial {
                    x_new,
                    f_new: self.f_x,
                    regularization: mk,
                    attempts: attempt,
                    solution,
                });
            }

            let f_new = self.eval_value(&x_new)?;
            let upper_bound = match (self.f_x, f_new) {
                (Some(f_x), Some(f_new)) => {
                    let model =
                        cubic_model(f_x, &self.gradient, &self.hessian, &solution.step, mk);
                    debug!(
                        "attempt {}: M = {}, model = {}, f = {}",
                        attempt, mk, model, f_new
                    );
                    model >= f_new
                }
                // the weight is the Lipschitz constant
                _ => true,
            };
            if upper_bound {
                return Ok(Trial {
                    x_new,
                    f_new,
                    regularization: mk,
                    attempts: attempt,
                    solution,
                });
            }
        }
        Err(Error::UpperBoundNotFound {
            attempts: self.config.submax_iter,
            regularization: scalar(mk),
        })
    }

    /// Iterate until convergence, a subproblem failure or `max_iter`.
    pub fn run(mut self) -> Result<MinimizationReport<F>, Error> {
        let mut report = MinimizationReport {
            x: self.x.clone(),
            trace: vec![self.x.clone()],
            iterations: 0,
            termination: TerminationReason::LostPatience,
            hessian_conditioning: Vec::new(),
            regularization: Vec::new(),
            upper_bound_attempts: Vec::new(),
            objective_function: self.f_x,
            lambda_nplus: self.lambda_nplus,
            hessian_psd: self.lambda_nplus.is_zero(),
        };

        let mut mk = self.l0;
        while report.iterations < self.config.max_iter {
            let trial = self.find_x_new(mk)?;
            if let Some(failure) = trial.solution.failure {
                warn!(
                    "stopped at iteration {}: {}, likely due to round-off or an ill-conditioned Hessian",
                    report.iterations, failure
                );
                report.termination = TerminationReason::Subproblem(failure);
                return Ok(self.finish(report));
            }
            mk = trial.regularization;

            let f_old = self.f_x;
            self.x = trial.x_new;
            self.f_x = trial.f_new;
            self.gradient = self.eval_gradient(&self.x)?;
            self.hessian = self.eval_hessian(&self.x)?;
            self.lambda_nplus = lambda_nplus(&self.hessian)?;
            let converged = self.config.conv_criterion.is_converged(
                &ConvergenceState {
                    f_old,
                    f_new: self.f_x,
                    gradient: &self.gradient,
                    hessian: &self.hessian,
                },
                self.config.conv_tol,
            )?;

            report.trace.push(self.x.clone());
            report.hessian_conditioning.push(trial.solution.hessian_condition);
            report.regularization.push(mk);
            report.upper_bound_attempts.push(trial.attempts);
            report.iterations += 1;
            debug!(
                "iteration {}: M = {} after {} attempts, |g| = {}, f = {:?}",
                report.iterations,
                mk,
                trial.attempts,
                self.gradient.norm(),
                self.f_x
            );

            if converged {
                report.termination = TerminationReason::Converged;
                return Ok(self.finish(report));
            }
        }
        warn!("no convergence within {} iterations", self.config.max_iter);
        Ok(self.finish(report))
    }

    fn finish(self, report: MinimizationReport<F>) -> MinimizationReport<F> {
        let hessian_psd = self.lambda_nplus.is_zero();
        if !hessian_psd {
            warn!(
                "final Hessian has eigenvalue {}, likely a saddle point or a very small gradient",
                -self.lambda_nplus
            );
        }
        MinimizationReport {
            x: self.x,
            objective_function: self.f_x,
            lambda_nplus: self.lambda_nplus,
            hessian_psd,
            ..report
        }
    }
}

fn check_length(what: &'static str, expected: usize, found: usize) -> Result<(), Error> {
    if expected == found {
        Ok(())
    } else {
        Err(Error::DimensionMismatch {
            what,
            expected,
            found,
        })
    }
}

fn check_finite<F>(what: &'static str, v: DVector<F>) -> Result<DVector<F>, Error>
where
    F: RealField + Float,
{
    if v.iter().all(|x| Float::is_finite(*x)) {
        Ok(v)
    } else {
        Err(Error::Numerical(what))
    }
}
