//! Named kernels
//!
//! Kernel sums and log-sum-exps written in terms of a metric parameter
//! $\gamma$ whose shape selects how distances are measured:
//!
//! | rank of $\gamma$ | trailing size | metric |
//! |:---:|:---:|:---|
//! | 1 | 1   | $\gamma \lVert x_i - y_j \rVert^2$ |
//! | 1 | D   | $\sum_d \gamma_d (x_{id} - y_{jd})^2$ |
//! | 1 | D·D | $(x_i - y_j)^T \Gamma (x_i - y_j)$ |
//! | 2 | 1   | scalar $\gamma_i$, one per row of $x$ |
//! | 2 | D   | diagonal $\gamma_i$, one per row of $x$ |
//! | 2 | D·D | full $\Gamma_i$, one per row of $x$ |
//!
//! Rows are tried in this order and the first match wins, so that with
//! `D = 1` a single value is always a scalar metric.

use crate::{
    arg::Arg,
    plan::Backend,
    reduction::Reduction,
};
use genred_formula::{Axis, Error, Expr, Formula, Namespace, ReductionOp, Result, Role, Symbol, UnaryOp};
use ndarray::{Array2, ArrayView2, ArrayViewD, Axis as NdAxis, Ix1, Ix2};
use std::{fmt, str::FromStr};

#[cfg_attr(doc, katexit::katexit)]
/// Radial kernel $k(r^2)$ of a squared distance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelFamily {
    /// $\exp(-r^2)$
    Gaussian,
    /// $\exp(-r)$
    Laplacian,
    /// $1 / (1 + r^2)$
    Cauchy,
    /// $1 / \sqrt{1 + r^2}$
    InverseMultiquadric,
}

impl KernelFamily {
    pub fn name(&self) -> &'static str {
        match self {
            KernelFamily::Gaussian => "gaussian",
            KernelFamily::Laplacian => "laplacian",
            KernelFamily::Cauchy => "cauchy",
            KernelFamily::InverseMultiquadric => "inverse_multiquadric",
        }
    }

    /// $k(r^2)$
    fn kernel(&self, r2: &Expr) -> Result<Expr> {
        match self {
            KernelFamily::Gaussian => r2.neg()?.apply(UnaryOp::Exp),
            KernelFamily::Laplacian => r2.apply(UnaryOp::Sqrt)?.neg()?.apply(UnaryOp::Exp),
            KernelFamily::Cauchy => Expr::constant(1.0).add(r2)?.apply(UnaryOp::Inv),
            KernelFamily::InverseMultiquadric => {
                Expr::constant(1.0).add(r2)?.apply(UnaryOp::Rsqrt)
            }
        }
    }

    /// $\log k(r^2)$
    fn log_kernel(&self, r2: &Expr) -> Result<Expr> {
        match self {
            KernelFamily::Gaussian => r2.neg(),
            KernelFamily::Laplacian => r2.apply(UnaryOp::Sqrt)?.neg(),
            KernelFamily::Cauchy => Expr::constant(1.0).add(r2)?.apply(UnaryOp::Log)?.neg(),
            KernelFamily::InverseMultiquadric => Expr::constant(-0.5)
                .mul(&Expr::constant(1.0).add(r2)?.apply(UnaryOp::Log)?),
        }
    }
}

impl FromStr for KernelFamily {
    type Err = Error;

    /// Accepts the bare name, or the name applied to `(x,y)`
    fn from_str(s: &str) -> Result<Self> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let name = compact.strip_suffix("(x,y)").unwrap_or(&compact);
        match name {
            "gaussian" => Ok(KernelFamily::Gaussian),
            "laplacian" => Ok(KernelFamily::Laplacian),
            "cauchy" => Ok(KernelFamily::Cauchy),
            "inverse_multiquadric" => Ok(KernelFamily::InverseMultiquadric),
            _ => Err(Error::Parse {
                input: s.to_string(),
                position: 0,
                reason: "unknown kernel, expected gaussian, laplacian, cauchy or inverse_multiquadric"
                    .to_string(),
            }),
        }
    }
}

impl fmt::Display for KernelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg_attr(doc, katexit::katexit)]
/// How kernel values are reduced over $j$
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelMode {
    /// $\sum_j k(x_i, y_j) b_j$
    Sum,
    /// $\log \sum_j \exp(\log k(x_i, y_j) + b_j)$, with scalar $b_j$
    Lse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricForm {
    Scalar,
    Diagonal,
    Full,
}

impl MetricForm {
    fn size(self, dim: usize) -> usize {
        match self {
            MetricForm::Scalar => 1,
            MetricForm::Diagonal => dim,
            MetricForm::Full => dim * dim,
        }
    }
}

/// Metric selected from the shape of the metric parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Metric {
    pub form: MetricForm,
    /// One metric per row of `x` instead of one for all pairs
    pub per_sample: bool,
}

const METRIC_TABLE: [(usize, MetricForm); 6] = [
    (1, MetricForm::Scalar),
    (1, MetricForm::Diagonal),
    (1, MetricForm::Full),
    (2, MetricForm::Scalar),
    (2, MetricForm::Diagonal),
    (2, MetricForm::Full),
];

impl Metric {
    /// First row of the metric table matching `shape` for features of dimension `dim`
    pub fn resolve(shape: &[usize], dim: usize) -> Result<Self> {
        let trailing = shape.last().copied();
        let found = METRIC_TABLE
            .iter()
            .find(|(rank, form)| *rank == shape.len() && trailing == Some(form.size(dim)))
            .map(|&(rank, form)| Metric {
                form,
                per_sample: rank == 2,
            });
        match found {
            Some(metric) => {
                log::debug!("Metric of shape {:?} with D={}: {:?}", shape, dim, metric);
                Ok(metric)
            }
            None => Err(Error::KernelShapeAmbiguity {
                shape: shape.to_vec(),
                dim,
            }),
        }
    }

    /// Symbol of the metric parameter, at argument position 0
    fn symbol(&self, dim: usize) -> Symbol {
        let role = if self.per_sample {
            Role::Row
        } else {
            Role::Parameter
        };
        Symbol::new("gamma", role, 0, self.form.size(dim))
    }
}

/// Reduction computing a named kernel
///
/// Arguments are, in order, the metric parameter `gamma`, `x` of shape
/// `[M, dim]`, `y` of shape `[N, dim]` and the weights `b` of shape
/// `[N, b_dim]`. The reduction is along `j`.
pub fn kernel_reduction(
    family: KernelFamily,
    gamma_shape: &[usize],
    dim: usize,
    b_dim: usize,
    mode: KernelMode,
    backend: Backend,
) -> Result<Reduction> {
    let metric = Metric::resolve(gamma_shape, dim)?;
    if mode == KernelMode::Lse && b_dim != 1 {
        return Err(Error::shape_binding(
            "b",
            format!("log-sum-exp kernels take scalar weights, got dimension {}", b_dim),
        ));
    }

    let mut names = Namespace::init();
    let gamma = metric.symbol(dim);
    let x = Symbol::new("x", Role::Row, 1, dim);
    let y = Symbol::new("y", Role::Col, 2, dim);
    let b = Symbol::new("b", Role::Col, 3, b_dim);
    for symbol in [&gamma, &x, &y, &b] {
        names.declare(symbol.clone())?;
    }

    let diff = Expr::var(&x).sub(&Expr::var(&y))?;
    let r2 = Expr::weighted_sq_norm(&Expr::var(&gamma), &diff)?;
    let (op, expr) = match mode {
        KernelMode::Sum => (ReductionOp::Sum, family.kernel(&r2)?.mul(&Expr::var(&b))?),
        KernelMode::Lse => (
            ReductionOp::LogSumExp,
            family.log_kernel(&r2)?.add(&Expr::var(&b))?,
        ),
    };
    let formula = Formula::new(op, expr, Axis::J, names)?;
    log::debug!("Kernel {} as {}", family, formula);
    Ok(Reduction::new(formula, backend))
}

/// Named kernel and its metric parameter
#[derive(Debug, Clone)]
pub struct KernelSpec<'a> {
    pub family: KernelFamily,
    /// Rank 1 for a metric shared by all pairs, rank 2 for one metric per row of `x`
    pub gamma: ArrayViewD<'a, f64>,
    pub backend: Backend,
    pub mode: KernelMode,
}

fn metric_view<'a>(gamma: &ArrayViewD<'a, f64>) -> Result<ArrayView2<'a, f64>> {
    let ambiguous = |_| Error::KernelShapeAmbiguity {
        shape: gamma.shape().to_vec(),
        dim: 0,
    };
    match gamma.ndim() {
        1 => Ok(gamma
            .clone()
            .into_dimensionality::<Ix1>()
            .map_err(ambiguous)?
            .insert_axis(NdAxis(0))),
        _ => gamma.clone().into_dimensionality::<Ix2>().map_err(ambiguous),
    }
}

/// Evaluate a named kernel, `[M, b_dim]` for [KernelMode::Sum] and `[M, 1]` for [KernelMode::Lse]
pub fn kernel_eval(
    x: ArrayView2<f64>,
    y: ArrayView2<f64>,
    b: ArrayView2<f64>,
    spec: &KernelSpec,
) -> Result<Array2<f64>> {
    let reduction = kernel_reduction(
        spec.family,
        spec.gamma.shape(),
        x.ncols(),
        b.ncols(),
        spec.mode,
        spec.backend,
    )?;
    if spec.gamma.ndim() == 2 && spec.gamma.shape()[0] != x.nrows() {
        return Err(Error::shape_binding(
            "gamma",
            format!(
                "one metric per row of x expects {} rows, got {}",
                x.nrows(),
                spec.gamma.shape()[0]
            ),
        ));
    }
    let gamma = metric_view(&spec.gamma)?;
    let args: [Arg; 4] = [
        gamma.view().into(),
        x.view().into(),
        y.view().into(),
        b.view().into(),
    ];
    reduction.call(&args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_table() {
        let d = 3;
        let cases = [
            (vec![1], MetricForm::Scalar, false),
            (vec![3], MetricForm::Diagonal, false),
            (vec![9], MetricForm::Full, false),
            (vec![5, 1], MetricForm::Scalar, true),
            (vec![5, 3], MetricForm::Diagonal, true),
            (vec![5, 9], MetricForm::Full, true),
        ];
        for (shape, form, per_sample) in cases {
            assert_eq!(
                Metric::resolve(&shape, d).unwrap(),
                Metric { form, per_sample }
            );
        }
        for shape in [vec![], vec![2], vec![5, 4], vec![2, 3, 3]] {
            assert_eq!(
                Metric::resolve(&shape, d).unwrap_err(),
                Error::KernelShapeAmbiguity { shape, dim: d }
            );
        }
    }

    #[test]
    fn one_dimensional_features() {
        // every form has size 1, the scalar rows come first
        assert_eq!(
            Metric::resolve(&[1], 1).unwrap(),
            Metric {
                form: MetricForm::Scalar,
                per_sample: false
            }
        );
        assert_eq!(
            Metric::resolve(&[1, 1], 1).unwrap(),
            Metric {
                form: MetricForm::Scalar,
                per_sample: true
            }
        );
    }

    #[test]
    fn family_names() {
        for family in [
            KernelFamily::Gaussian,
            KernelFamily::Laplacian,
            KernelFamily::Cauchy,
            KernelFamily::InverseMultiquadric,
        ] {
            assert_eq!(family.name().parse::<KernelFamily>().unwrap(), family);
            assert_eq!(
                format!("{}(x, y)", family).parse::<KernelFamily>().unwrap(),
                family
            );
        }
        assert!(matches!(
            "matern".parse::<KernelFamily>(),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn formulas() {
        let r = kernel_reduction(
            KernelFamily::Gaussian,
            &[2],
            2,
            1,
            KernelMode::Sum,
            Backend::Auto,
        )
        .unwrap();
        assert_eq!(
            r.formula().to_string(),
            "Sum_Reduction(Exp(-(gamma|Square(x-y)))*b,1)"
        );
        let r = kernel_reduction(
            KernelFamily::Cauchy,
            &[4, 1],
            2,
            1,
            KernelMode::Lse,
            Backend::Auto,
        )
        .unwrap();
        assert_eq!(
            r.formula().to_string(),
            "LogSumExp_Reduction(-Log(1+gamma*SqNorm2(x-y))+b,1)"
        );
        assert!(matches!(
            kernel_reduction(
                KernelFamily::Cauchy,
                &[1],
                2,
                3,
                KernelMode::Lse,
                Backend::Auto
            ),
            Err(Error::ShapeBinding { .. })
        ));
    }
}
