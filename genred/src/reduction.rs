//! Callable reductions

use crate::{
    arg::{Arg, Binding},
    dense,
    grad::Gradient,
    plan::{Backend, Plan, Planner, Strategy, Workload},
    program::Program,
    reducer::Reducer,
    tiled,
};
use genred_formula::{Formula, ReductionOp, Result, Role};
use ndarray::Array2;
use std::sync::{Arc, OnceLock};

/// Planner shared by reductions created without an explicit one
///
/// Configured from the environment when first used, see [crate::PlannerConfig::from_env].
pub fn global_planner() -> Arc<Planner> {
    static PLANNER: OnceLock<Arc<Planner>> = OnceLock::new();
    PLANNER
        .get_or_init(|| Arc::new(Planner::new(crate::PlannerConfig::from_env())))
        .clone()
}

/// A formula compiled for evaluation
///
/// Cloning is cheap, the formula, compiled program and planner are shared.
#[derive(Debug, Clone)]
pub struct Reduction {
    formula: Arc<Formula>,
    program: Arc<Program>,
    reducer: Reducer,
    backend: Backend,
    planner: Arc<Planner>,
    id: u64,
}

impl Reduction {
    pub fn new(formula: Formula, backend: Backend) -> Self {
        Reduction::with_planner(formula, backend, global_planner())
    }

    pub fn with_planner(formula: Formula, backend: Backend, planner: Arc<Planner>) -> Self {
        let program = Program::compile(&formula.expr, formula.axis);
        let reducer = Reducer::new(formula.op, formula.dim());
        let id = formula.id();
        Reduction {
            formula: Arc::new(formula),
            program: Arc::new(program),
            reducer,
            backend,
            planner,
            id,
        }
    }

    /// Parse `<Op>_Reduction(<formula>,<axis>)` with its aliases
    ///
    /// ```
    /// use genred::{Backend, Reduction};
    /// use ndarray::array;
    ///
    /// let r = Reduction::parse("Sum_Reduction(x*y,1)", &["x=Vx(0,1)", "y=Vy(1,1)"], Backend::Auto).unwrap();
    /// let x = array![[1.0], [2.0]];
    /// let y = array![[1.0], [2.0], [3.0]];
    /// let out = r.call(&[(&x).into(), (&y).into()]).unwrap();
    /// assert_eq!(out, array![[6.0], [12.0]]);
    /// ```
    pub fn parse<S: AsRef<str>>(text: &str, aliases: &[S], backend: Backend) -> Result<Self> {
        Ok(Reduction::new(Formula::parse(text, aliases)?, backend))
    }

    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn planner(&self) -> &Arc<Planner> {
        &self.planner
    }

    /// Same reduction with another backend
    pub fn with_backend(&self, backend: Backend) -> Self {
        Reduction {
            backend,
            ..self.clone()
        }
    }

    fn workload(&self, binding: &Binding) -> Workload {
        let (outer, inner) = binding.extents(self.formula.axis);
        let width = |role: Role| -> usize {
            self.formula
                .names
                .symbols()
                .iter()
                .filter(|s| s.role == role)
                .map(|s| s.dim)
                .sum()
        };
        Workload {
            outer,
            inner,
            dim: self.formula.dim(),
            outer_width: width(self.formula.axis.outer_role()),
            inner_width: width(self.formula.axis.inner_role()),
            state_width: self.reducer.state_width(),
            scratch_width: self.program.width(),
        }
    }

    /// Plan used for these arguments, without evaluating
    pub fn plan(&self, args: &[Arg]) -> Result<Plan> {
        let binding = Binding::new(&self.formula.names, args)?;
        self.planner
            .plan(self.id, &self.workload(&binding), self.backend)
    }

    /// Evaluate on bound arrays, ordered by argument position
    ///
    /// The output has one row per index of the axis which is not reduced.
    pub fn call(&self, args: &[Arg]) -> Result<Array2<f64>> {
        let binding = Binding::new(&self.formula.names, args)?;
        let plan = self
            .planner
            .plan(self.id, &self.workload(&binding), self.backend)?;
        log::debug!(
            "Evaluate {} on M={}, N={} with {:?}",
            self.formula,
            binding.m,
            binding.n,
            plan
        );
        match plan.strategy {
            Strategy::Dense => dense::reduce(
                &self.formula.expr,
                self.formula.axis,
                &self.reducer,
                &binding,
            ),
            _ => Ok(tiled::reduce(
                &self.program,
                &self.reducer,
                &binding,
                self.formula.axis,
                &plan,
                self.planner.config().parallel,
            )),
        }
    }

    /// Gradient with respect to the argument called `name`
    ///
    /// The adjoint formula is derived once and evaluated by the same engine.
    pub fn grad(&self, name: &str) -> Result<Gradient> {
        let adjoint = self.formula.adjoint(name)?;
        let reduction =
            Reduction::with_planner(adjoint.formula.clone(), self.backend, self.planner.clone());
        let forward = match self.formula.op {
            ReductionOp::LogSumExp => Some(self.clone()),
            _ => None,
        };
        Ok(Gradient::new(adjoint, reduction, forward))
    }

    /// Vector-Jacobian product with respect to `name`
    ///
    /// `cotangent` has the shape of the output of [Reduction::call].
    pub fn vjp(&self, name: &str, args: &[Arg], cotangent: Arg) -> Result<Array2<f64>> {
        self.grad(name)?.call(args, cotangent)
    }
}

/// Reduction of a bare formula with an explicit reduction and axis
///
/// `backend` is one of `auto`, `dense`, `row-tiled`, `col-tiled`, `double-tiled`.
pub fn reduce<S: AsRef<str>>(
    op: ReductionOp,
    formula: &str,
    aliases: &[S],
    axis: usize,
    backend: &str,
) -> Result<Reduction> {
    let backend = backend.parse::<Backend>()?;
    let formula = Formula::build(op, formula, aliases, axis)?;
    Ok(Reduction::new(formula, backend))
}

#[cfg_attr(doc, katexit::katexit)]
/// Sum reduction, $a_i = \sum_j F(p, x_i, y_j)$ for axis 1
///
/// ```
/// use genred::generic_sum;
/// use ndarray::array;
///
/// let r = generic_sum(
///     "Square(p-a)*Exp(x+y)",
///     &["p=Pm(0,1)", "a=Vy(1,1)", "x=Vx(2,1)", "y=Vy(3,1)"],
///     1,
///     "auto",
/// )
/// .unwrap();
/// let p = array![2.0];
/// let a = array![[1.0], [2.0]];
/// let x = array![[0.0]];
/// let y = array![[0.0], [0.0]];
/// let out = r.call(&[(&p).into(), (&a).into(), (&x).into(), (&y).into()]).unwrap();
/// assert_eq!(out, array![[1.0]]);
/// ```
pub fn generic_sum<S: AsRef<str>>(
    formula: &str,
    aliases: &[S],
    axis: usize,
    backend: &str,
) -> Result<Reduction> {
    reduce(ReductionOp::Sum, formula, aliases, axis, backend)
}

#[cfg_attr(doc, katexit::katexit)]
/// Log-sum-exp reduction, $a_i = \log \sum_j \exp F(p, x_i, y_j)$ for axis 1
///
/// Computed with a running maximum, so that it does not overflow where
/// $\exp F$ does.
pub fn generic_logsumexp<S: AsRef<str>>(
    formula: &str,
    aliases: &[S],
    axis: usize,
    backend: &str,
) -> Result<Reduction> {
    reduce(ReductionOp::LogSumExp, formula, aliases, axis, backend)
}
