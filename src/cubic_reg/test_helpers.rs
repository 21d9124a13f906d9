use core::cell::{Cell, RefCell};

use nalgebra::{DMatrix, DVector};

use crate::{
    AuxiliaryProblem, AuxiliarySolution, AuxiliarySolver, Error, Objective, SubproblemFailure,
    TrustRegion,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockCall {
    Value,
    Gradient,
    Hessian,
}

/// Records every callback and replays canned answers.
///
/// A `None` entry in a list means the callback is not provided; once a list
/// is exhausted the last entry is repeated.
pub struct MockObjective {
    call_history: RefCell<Vec<MockCall>>,
    values: Vec<Option<f64>>,
    gradients: Vec<Option<DVector<f64>>>,
    hessians: Vec<Option<DMatrix<f64>>>,
    counters: RefCell<[usize; 3]>,
}

impl MockObjective {
    pub fn new(
        values: Vec<Option<f64>>,
        gradients: Vec<Option<DVector<f64>>>,
        hessians: Vec<Option<DMatrix<f64>>>,
    ) -> Self {
        Self {
            call_history: RefCell::new(vec![]),
            values,
            gradients,
            hessians,
            counters: RefCell::new([0; 3]),
        }
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.call_history.borrow().clone()
    }

    fn next<T: Clone>(&self, call: MockCall, answers: &[Option<T>]) -> Option<T> {
        self.call_history.borrow_mut().push(call);
        let mut counters = self.counters.borrow_mut();
        let index = &mut counters[call as usize];
        let answer = answers
            .get(*index)
            .or_else(|| answers.last())
            .cloned()
            .flatten();
        *index += 1;
        answer
    }
}

impl Objective<f64> for MockObjective {
    fn value(&self, _x: &DVector<f64>) -> Option<f64> {
        self.next(MockCall::Value, &self.values)
    }

    fn gradient(&self, _x: &DVector<f64>) -> Option<DVector<f64>> {
        self.next(MockCall::Gradient, &self.gradients)
    }

    fn hessian(&self, _x: &DVector<f64>) -> Option<DMatrix<f64>> {
        self.next(MockCall::Hessian, &self.hessians)
    }
}

/// `$\vec{x}^\top\mathbf{Q}\vec{x}$` with analytic derivatives.
pub struct Quadratic {
    pub q: DMatrix<f64>,
    pub with_value: bool,
}

impl Quadratic {
    pub fn isotropic(n: usize) -> Self {
        Self {
            q: DMatrix::identity(n, n),
            with_value: true,
        }
    }
}

impl Objective<f64> for Quadratic {
    fn value(&self, x: &DVector<f64>) -> Option<f64> {
        if self.with_value {
            Some(x.dot(&(&self.q * x)))
        } else {
            None
        }
    }

    fn gradient(&self, x: &DVector<f64>) -> Option<DVector<f64>> {
        Some(&self.q * x * 2.)
    }

    fn hessian(&self, _x: &DVector<f64>) -> Option<DMatrix<f64>> {
        Some(&self.q * 2.)
    }
}

/// `$x^2y^2 + x^2 + y^2$`, minimal at the origin.
pub struct Simple;

impl Objective<f64> for Simple {
    fn value(&self, x: &DVector<f64>) -> Option<f64> {
        Some(x[0] * x[0] * x[1] * x[1] + x[0] * x[0] + x[1] * x[1])
    }

    fn gradient(&self, x: &DVector<f64>) -> Option<DVector<f64>> {
        Some(DVector::from_vec(vec![
            2. * x[0] * x[1] * x[1] + 2. * x[0],
            2. * x[0] * x[0] * x[1] + 2. * x[1],
        ]))
    }

    fn hessian(&self, x: &DVector<f64>) -> Option<DMatrix<f64>> {
        let off = 4. * x[0] * x[1];
        Some(DMatrix::from_row_slice(
            2,
            2,
            &[2. * x[1] * x[1] + 2., off, off, 2. * x[0] * x[0] + 2.],
        ))
    }
}

/// Rosenbrock's banana, minimal at `$(1, 1)$`.
pub struct Rosenbrock;

impl Objective<f64> for Rosenbrock {
    fn value(&self, x: &DVector<f64>) -> Option<f64> {
        let a = 1. - x[0];
        let b = x[1] - x[0] * x[0];
        Some(a * a + 100. * b * b)
    }

    fn gradient(&self, x: &DVector<f64>) -> Option<DVector<f64>> {
        let b = x[1] - x[0] * x[0];
        Some(DVector::from_vec(vec![
            -2. * (1. - x[0]) - 400. * x[0] * b,
            200. * b,
        ]))
    }

    fn hessian(&self, x: &DVector<f64>) -> Option<DMatrix<f64>> {
        let off = -400. * x[0];
        Some(DMatrix::from_row_slice(
            2,
            2,
            &[2. - 400. * x[1] + 1200. * x[0] * x[0], off, off, 200.],
        ))
    }
}

/// `$-(x^2 + 3y^2)e^{1 - x^2 - y^2}$` with an analytic gradient only.
///
/// Minimal at `$(0, \pm 1)$`, saddle points at `$(\pm 1, 0)$`.
pub struct Bimodal;

impl Objective<f64> for Bimodal {
    fn value(&self, x: &DVector<f64>) -> Option<f64> {
        let e = (1. - x.norm_squared()).exp();
        Some(-(x[0] * x[0] + 3. * x[1] * x[1]) * e)
    }

    fn gradient(&self, x: &DVector<f64>) -> Option<DVector<f64>> {
        let e = (1. - x.norm_squared()).exp();
        let weights = [1., 3.];
        let mut grad = DVector::zeros(2);
        for (i, w) in weights.iter().enumerate() {
            // d/dx of x_i^2 e^{1 - |x|^2}
            let mut partial = x * (-2. * x[i] * x[i] * e);
            partial[i] += 2. * x[i] * e;
            grad -= partial * *w;
        }
        Some(grad)
    }
}

/// `$(x - 1)^2 + 2(y + 1/2)^2$` without derivatives.
pub struct ValueOnly;

impl Objective<f64> for ValueOnly {
    fn value(&self, x: &DVector<f64>) -> Option<f64> {
        let a = x[0] - 1.;
        let b = x[1] + 0.5;
        Some(a * a + 2. * b * b)
    }
}

/// `$x^2$` for `$x \leq 1.5 \cdot 10^{-4}$`, infinite beyond.
pub struct Cliff;

impl Objective<f64> for Cliff {
    fn value(&self, x: &DVector<f64>) -> Option<f64> {
        if x[0] <= 1.5e-4 {
            Some(x[0] * x[0])
        } else {
            Some(f64::INFINITY)
        }
    }
}

/// Delegates to [`TrustRegion`] but gives up on call number `fail_at`.
pub struct FailingSolver {
    calls: Cell<usize>,
    fail_at: usize,
}

impl FailingSolver {
    pub fn new(fail_at: usize) -> Self {
        Self {
            calls: Cell::new(0),
            fail_at,
        }
    }
}

impl AuxiliarySolver<f64> for FailingSolver {
    fn solve(&self, problem: &AuxiliaryProblem<'_, f64>) -> Result<AuxiliarySolution<f64>, Error> {
        let call = self.calls.get() + 1;
        self.calls.set(call);
        if call == self.fail_at {
            let n = problem.gradient.nrows();
            Ok(AuxiliarySolution::failed(n, SubproblemFailure::Cholesky))
        } else {
            TrustRegion.solve(problem)
        }
    }
}
