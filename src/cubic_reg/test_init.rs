use approx::assert_relative_eq;
use nalgebra::{DMatrix, DVector};

use super::test_helpers::{
    Cliff, FailingSolver, MockCall, MockObjective, Quadratic, Simple, ValueOnly,
};
use super::{CubicReg, CubicRegularization, TerminationReason};
use crate::utils::finite_difference::default_step;
use crate::{ConvergenceCriterion, Error, Objective, SubproblemFailure};

fn vector(entries: &[f64]) -> DVector<f64> {
    DVector::from_column_slice(entries)
}

fn identity_mock(values: Vec<Option<f64>>) -> MockObjective {
    MockObjective::new(
        values,
        vec![Some(vector(&[1., 0.]))],
        vec![Some(DMatrix::identity(2, 2))],
    )
}

#[test]
fn no_params() {
    let objective = Quadratic::isotropic(0);
    let err = CubicReg::new(&CubicRegularization::new(), DVector::zeros(0), &objective)
        .err()
        .unwrap();
    assert_eq!(err, Error::NoParameters);
}

#[test]
fn invalid_settings() {
    let x0 = vector(&[1., 1.]);
    let objective = Quadratic::isotropic(2);
    let check = |config: CubicRegularization<f64>, name: &str| {
        match CubicReg::new(&config, x0.clone(), &objective).err().unwrap() {
            Error::NonPositive { name: found, .. } => assert_eq!(found, name),
            other => panic!("unexpected error {:?}", other),
        }
    };
    check(CubicRegularization::new().with_kappa_easy(0.), "kappa_easy");
    check(CubicRegularization::new().with_conv_tol(-1e-5), "conv_tol");
    check(CubicRegularization::new().with_epsilon(f64::NAN), "epsilon");
    check(CubicRegularization::new().with_lipschitz(-2.), "L");
    check(
        CubicRegularization::new().with_initial_regularization(f64::INFINITY),
        "L0",
    );

    let err = CubicReg::new(
        &CubicRegularization::new().with_submax_iter(0),
        x0,
        &objective,
    )
    .err()
    .unwrap();
    assert_eq!(err, Error::ZeroIterations("submax_iter"));
}

#[test]
fn value_or_both_derivatives() {
    let objective = MockObjective::new(vec![None], vec![Some(vector(&[1., 0.]))], vec![None]);
    let err = CubicReg::new(&CubicRegularization::new(), vector(&[0., 0.]), &objective)
        .err()
        .unwrap();
    assert_eq!(err, Error::MissingDerivatives);
    assert_eq!(
        objective.calls(),
        [MockCall::Value, MockCall::Gradient, MockCall::Hessian]
    );
}

#[test]
fn derivatives_without_value() {
    let objective = Quadratic {
        q: DMatrix::identity(2, 2),
        with_value: false,
    };
    let x0 = vector(&[2., 2.]);
    let err = CubicReg::new(&CubicRegularization::new(), x0.clone(), &objective)
        .err()
        .unwrap();
    assert_eq!(err, Error::MissingLipschitz);

    let config = CubicRegularization::new()
        .with_lipschitz(1.)
        .with_conv_criterion(ConvergenceCriterion::Function);
    let err = CubicReg::new(&config, x0.clone(), &objective).err().unwrap();
    assert_eq!(err, Error::CriterionNeedsValue);

    // the weight stays at L and every step is accepted at once
    let config = CubicRegularization::new()
        .with_lipschitz(1.)
        .with_conv_tol(1e-8);
    let report = config.minimize(x0, &objective).unwrap();
    assert_eq!(report.termination, TerminationReason::Converged);
    assert_eq!(report.objective_function, None);
    assert!(report.regularization.iter().all(|m| *m == 1.));
    assert!(report.upper_bound_attempts.iter().all(|a| *a == 1));
    assert!(report.x.norm() < 1e-8);
}

#[test]
fn wrong_dimensions() {
    let x0 = vector(&[0., 0.]);
    let config = CubicRegularization::new();

    let objective = MockObjective::new(
        vec![Some(1.)],
        vec![Some(vector(&[1., 2., 3.]))],
        vec![None],
    );
    let err = CubicReg::new(&config, x0.clone(), &objective).err().unwrap();
    assert_eq!(
        err,
        Error::DimensionMismatch {
            what: "gradient",
            expected: 2,
            found: 3
        }
    );

    let objective = MockObjective::new(
        vec![Some(1.)],
        vec![Some(vector(&[1., 2.]))],
        vec![Some(DMatrix::zeros(2, 3))],
    );
    let err = CubicReg::new(&config, x0, &objective).err().unwrap();
    assert_eq!(
        err,
        Error::DimensionMismatch {
            what: "Hessian row",
            expected: 2,
            found: 3
        }
    );
}

#[test]
fn non_finite_start() {
    let x0 = vector(&[0., 0.]);
    let config = CubicRegularization::new();

    let err = CubicReg::new(&config, x0.clone(), identity_mock(vec![Some(f64::NAN)]))
        .err()
        .unwrap();
    assert_eq!(err, Error::Numerical("objective value"));

    let objective = MockObjective::new(
        vec![Some(1.)],
        vec![Some(vector(&[f64::INFINITY, 0.]))],
        vec![Some(DMatrix::identity(2, 2))],
    );
    let err = CubicReg::new(&config, x0.clone(), &objective).err().unwrap();
    assert_eq!(err, Error::Numerical("gradient"));

    let objective = MockObjective::new(
        vec![Some(1.)],
        vec![Some(vector(&[1., 0.]))],
        vec![Some(DMatrix::from_element(2, 2, f64::NAN))],
    );
    let err = CubicReg::new(&config, x0, &objective).err().unwrap();
    assert_eq!(err, Error::Numerical("Hessian"));
}

#[test]
fn probes_once_with_given_l0() {
    let objective = identity_mock(vec![Some(1.)]);
    let config = CubicRegularization::new().with_initial_regularization(3.);
    let run = CubicReg::new(&config, vector(&[0., 0.]), &objective)
        .ok()
        .unwrap();
    assert_eq!(run.lower_bound(), 3.);
    assert_eq!(run.lambda_nplus, 0.);
    assert_eq!(
        objective.calls(),
        [MockCall::Value, MockCall::Gradient, MockCall::Hessian]
    );
}

#[test]
fn l0_from_lipschitz() {
    let objective = Quadratic::isotropic(2);
    let x0 = vector(&[1., 1.]);

    let config = CubicRegularization::new().with_lipschitz(7.);
    let run = CubicReg::new(&config, x0.clone(), &objective).ok().unwrap();
    assert_eq!(run.lower_bound(), 7.);

    let config = config.with_initial_regularization(0.5);
    let run = CubicReg::new(&config, x0, &objective).ok().unwrap();
    assert_eq!(run.lower_bound(), 0.5);
}

#[test]
fn l0_from_hessian_difference() {
    // H(1, 2) = [[10, 8], [8, 4]] and H(2, 3) = [[20, 24], [24, 10]],
    // the difference has eigenvalues 8 ± sqrt(260)
    let config = CubicRegularization::new();
    let run = CubicReg::new(&config, vector(&[1., 2.]), &Simple).ok().unwrap();
    let expected = (8. + 260f64.sqrt()) / 2f64.sqrt() + default_step::<f64>();
    assert_relative_eq!(run.lower_bound(), expected, epsilon = 1e-12);

    // a constant Hessian leaves only the finite-difference step
    let run = CubicReg::new(&config, vector(&[1., 2.]), Quadratic::isotropic(2))
        .ok()
        .unwrap();
    assert_relative_eq!(run.lower_bound(), default_step::<f64>());
}

#[test]
fn initial_derivatives_by_finite_differences() {
    let config = CubicRegularization::new()
        .with_epsilon(1e-4)
        .with_initial_regularization(1.);
    let run = CubicReg::new(&config, vector(&[3., 1.]), &ValueOnly)
        .ok()
        .unwrap();
    assert_relative_eq!(run.gradient, vector(&[4., 6.]), epsilon = 1e-8);
    assert_relative_eq!(
        run.hessian,
        DMatrix::from_row_slice(2, 2, &[2., 0., 0., 4.]),
        epsilon = 1e-5
    );
    assert_eq!(run.f_x, Some(4. + 4.5));
}

#[test]
fn symmetrized_hessian() {
    let config = CubicRegularization::new()
        .with_initial_regularization(1.)
        .with_symmetrized_hessian(true);
    let run = CubicReg::new(&config, vector(&[0.3, -1.7]), &ValueOnly)
        .ok()
        .unwrap();
    assert_eq!(run.hessian, run.hessian.transpose());
}

#[test]
fn zero_iterations() {
    let x0 = vector(&[2., 2.]);
    let report = CubicRegularization::new()
        .with_max_iter(0)
        .minimize(x0.clone(), Quadratic::isotropic(2))
        .unwrap();
    assert_eq!(report.iterations, 0);
    assert_eq!(report.x, x0);
    assert_eq!(report.trace, vec![x0]);
    assert_eq!(report.termination, TerminationReason::LostPatience);
    assert_eq!(report.failure_flag(), 0);
    assert!(report.hessian_conditioning.is_empty());
    assert_eq!(report.objective_function, Some(8.));
}

#[test]
fn callback_fails_later() {
    let objective = identity_mock(vec![Some(1.), None]);
    let config = CubicRegularization::new().with_initial_regularization(1.);
    let err = config
        .minimize(vector(&[0., 0.]), &objective)
        .err()
        .unwrap();
    assert_eq!(err, Error::User("value"));
    assert_eq!(
        objective.calls(),
        [
            MockCall::Value,
            MockCall::Gradient,
            MockCall::Hessian,
            MockCall::Value
        ]
    );
}

#[test]
fn upper_bound_not_found() {
    // no finite value can lie below the model
    let objective = identity_mock(vec![Some(0.), Some(f64::INFINITY)]);
    let config = CubicRegularization::new()
        .with_initial_regularization(1.)
        .with_submax_iter(5);
    let err = config
        .minimize(vector(&[0., 0.]), &objective)
        .err()
        .unwrap();
    assert_eq!(
        err,
        Error::UpperBoundNotFound {
            attempts: 5,
            regularization: 16.
        }
    );
}

#[test]
fn finite_difference_hessian_reports_gradient_error() {
    // the gradient at x0 + epsilon reaches into the infinite part
    let config = CubicRegularization::new()
        .with_epsilon(1e-4)
        .with_initial_regularization(1.);
    let err = CubicReg::new(&config, vector(&[0.]), &Cliff).err().unwrap();
    assert_eq!(err, Error::Numerical("gradient"));
}

#[test]
fn subproblem_failure_keeps_accepted_steps() {
    let x0 = vector(&[2., 2.]);
    let objective = Quadratic::isotropic(2);
    let config = CubicRegularization::new().with_initial_regularization(1.);
    let report = config
        .minimize_with(x0.clone(), &objective, FailingSolver::new(2))
        .unwrap();
    assert_eq!(
        report.termination,
        TerminationReason::Subproblem(SubproblemFailure::Cholesky)
    );
    assert!(!report.termination.was_successful());
    assert_eq!(report.failure_flag(), 1);
    assert_eq!(report.iterations, 1);
    assert_eq!(report.trace.len(), 2);
    assert_eq!(report.trace[0], x0);
    assert_eq!(report.x, report.trace[1]);
    assert!(report.x.norm() < x0.norm());
    assert_eq!(report.regularization, vec![1.]);
    assert_eq!(report.upper_bound_attempts, vec![1]);
    assert_eq!(report.hessian_conditioning, vec![None]);
    assert_eq!(report.objective_function, objective.value(&report.x));
    assert!(report.hessian_psd);
}
