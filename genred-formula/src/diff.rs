//! Symbolic differentiation
//!
//! Gradients of a reduction are ordinary reductions: [Formula::adjoint]
//! builds a new formula whose value is the vector-Jacobian product of the
//! original one, so the backward pass runs on the same engine as the
//! forward pass.

use crate::{
    error::{Error, Result},
    expr::{Expr, Node},
    formula::{Axis, Formula, ReductionOp},
    namespace::{Role, Symbol},
    ops::{BinaryOp, UnaryOp},
};

/// Sum a vector adjoint onto a scalar operand that was broadcast
fn unbroadcast(g: Expr, dim: usize) -> Result<Expr> {
    if dim == 1 && g.dim() > 1 {
        g.apply(UnaryOp::Sum)
    } else {
        Ok(g)
    }
}

impl Expr {
    #[cfg_attr(doc, katexit::katexit)]
    /// Transposed derivative $\left[\partial_v f\right]^T g$
    ///
    /// `g` has the dimension of `self`, the result has the dimension of `v`.
    ///
    /// ```
    /// use genred_formula::{Expr, Namespace, Role, Symbol};
    ///
    /// let mut names = Namespace::from_aliases(&["x=Vx(0,3)", "y=Vy(1,3)"]).unwrap();
    /// let f = Expr::parse("Exp(x-y)", &mut names).unwrap();
    /// let x = names.get("x").unwrap().clone();
    /// let g = Expr::var(&names.new_ident("G", Role::Row, 3));
    /// assert_eq!(f.diff_t(&x, &g).unwrap().to_string(), "G*Exp(x-y)");
    /// ```
    pub fn diff_t(&self, v: &Symbol, g: &Expr) -> Result<Expr> {
        if g.dim() != self.dim() {
            return Err(Error::dim_mismatch(
                "DiffT",
                format!(
                    "cotangent of dimension {} for an expression of dimension {}",
                    g.dim(),
                    self.dim()
                ),
            ));
        }
        if g.is_zero() || !self.depends_on(v) {
            return Ok(Expr::zero(v.dim));
        }
        match self.node() {
            Node::Var(s) => Ok(if s == v { g.clone() } else { Expr::zero(v.dim) }),
            Node::Const(_) | Node::Zero => Ok(Expr::zero(v.dim)),
            Node::Unary(op, a) => self.diff_unary(*op, a, v, g),
            Node::Binary(op, a, b) => self.diff_binary(*op, a, b, v, g),
        }
    }

    fn diff_unary(&self, op: UnaryOp, a: &Expr, v: &Symbol, g: &Expr) -> Result<Expr> {
        let two = Expr::constant(2.0);
        let ga = match op {
            UnaryOp::Minus => g.neg()?,
            UnaryOp::Exp => g.mul(self)?,
            UnaryOp::Log => g.div(a)?,
            UnaryOp::Sqrt => g.div(&two.mul(self)?)?,
            UnaryOp::Rsqrt => g.mul(&Expr::constant(-0.5).mul(&self.div(a)?)?)?,
            UnaryOp::Inv => g.mul(&self.apply(UnaryOp::Square)?.neg()?)?,
            UnaryOp::Square => g.mul(&two.mul(a)?)?,
            UnaryOp::Pow(0) => return Ok(Expr::zero(v.dim)),
            UnaryOp::Pow(n) => {
                let dp = a.apply(UnaryOp::Pow(n - 1))?;
                g.mul(&Expr::constant(n as f64).mul(&dp)?)?
            }
            UnaryOp::Abs => g.mul(&a.apply(UnaryOp::Sign)?)?,
            UnaryOp::Sign | UnaryOp::Step => return Ok(Expr::zero(v.dim)),
            UnaryOp::Relu => g.mul(&a.apply(UnaryOp::Step)?)?,
            UnaryOp::Sin => g.mul(&a.apply(UnaryOp::Cos)?)?,
            UnaryOp::Cos => g.mul(&a.apply(UnaryOp::Sin)?.neg()?)?,
            UnaryOp::Clamp(lo, hi) => {
                // Step(0) = 1, so the bounds themselves count as unclamped
                let above = a.sub(&Expr::constant(lo.get()))?.apply(UnaryOp::Step)?;
                let below = Expr::constant(hi.get()).sub(a)?.apply(UnaryOp::Step)?;
                g.mul(&above.mul(&below)?)?
            }
            UnaryOp::Elem(index) => g.apply(UnaryOp::ElemT {
                dim: a.dim(),
                index,
            })?,
            UnaryOp::ElemT { index, .. } => g.apply(UnaryOp::Elem(index))?,
            UnaryOp::Sum => g.apply(UnaryOp::SumT(a.dim()))?,
            UnaryOp::SumT(_) => g.apply(UnaryOp::Sum)?,
            UnaryOp::SqNorm2 => two.mul(g)?.mul(a)?,
        };
        a.diff_t(v, &ga)
    }

    fn diff_binary(
        &self,
        op: BinaryOp,
        a: &Expr,
        b: &Expr,
        v: &Symbol,
        g: &Expr,
    ) -> Result<Expr> {
        let (ga, gb) = match op {
            BinaryOp::Add => (
                unbroadcast(g.clone(), a.dim())?,
                unbroadcast(g.clone(), b.dim())?,
            ),
            BinaryOp::Sub => (
                unbroadcast(g.clone(), a.dim())?,
                unbroadcast(g.neg()?, b.dim())?,
            ),
            BinaryOp::Mul => (
                unbroadcast(g.mul(b)?, a.dim())?,
                unbroadcast(g.mul(a)?, b.dim())?,
            ),
            BinaryOp::Div => (
                unbroadcast(g.div(b)?, a.dim())?,
                unbroadcast(g.mul(self)?.div(b)?.neg()?, b.dim())?,
            ),
            BinaryOp::Scalprod => (g.mul(b)?, g.mul(a)?),
            BinaryOp::MatVecMult => (
                Expr::binary(BinaryOp::TensorProd, g, b)?,
                Expr::binary(BinaryOp::VecMatMult, g, a)?,
            ),
            BinaryOp::VecMatMult => (
                Expr::binary(BinaryOp::MatVecMult, b, g)?,
                Expr::binary(BinaryOp::TensorProd, a, g)?,
            ),
            BinaryOp::TensorProd => (
                Expr::binary(BinaryOp::MatVecMult, g, b)?,
                Expr::binary(BinaryOp::VecMatMult, a, g)?,
            ),
        };
        a.diff_t(v, &ga)?.add(&b.diff_t(v, &gb)?)
    }
}

/// Formula computing the gradient of a reduction with respect to one symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adjoint {
    /// Always a `Sum` reduction
    pub formula: Formula,
    pub target: Symbol,
    /// Cotangent argument, indexed like the forward output
    pub cotangent: Symbol,
    /// Forward output argument, needed by `LogSumExp`
    pub forward: Option<Symbol>,
}

impl Adjoint {
    /// Parameter gradients come out per row and must be summed over rows
    pub fn sums_rows(&self) -> bool {
        self.target.role == Role::Parameter
    }
}

impl Formula {
    /// Adjoint formula with respect to the symbol called `name`
    ///
    /// Arguments of the adjoint are the forward arguments followed by the
    /// cotangent `G_out` and, for `LogSumExp`, the forward output `F_out`.
    ///
    /// ```
    /// use genred_formula::Formula;
    ///
    /// let f = Formula::parse("Sum_Reduction(Square(x-y),1)", &["x=Vx(0,1)", "y=Vy(1,1)"]).unwrap();
    /// let adj = f.adjoint("y").unwrap();
    /// assert_eq!(adj.formula.to_string(), "Sum_Reduction(-(G_out*(2*(x-y))),0)");
    /// assert_eq!(adj.formula.num_args(), 3);
    /// ```
    pub fn adjoint(&self, name: &str) -> Result<Adjoint> {
        let target = match self.names.get(name) {
            Some(symbol) => symbol.clone(),
            None if name == self.output().name => self.output(),
            None => return Err(Error::not_differentiable(name, "unknown symbol")),
        };
        self.adjoint_of(&target)
    }

    pub fn adjoint_of(&self, target: &Symbol) -> Result<Adjoint> {
        let axis = match target.role {
            Role::Parameter | Role::Row => Axis::J,
            Role::Col => Axis::I,
            Role::Output => {
                return Err(Error::not_differentiable(
                    &target.name,
                    "output of the reduction",
                ))
            }
        };
        if !self.names.contains(target) {
            return Err(Error::not_differentiable(&target.name, "unknown symbol"));
        }
        if !self.op.is_differentiable() {
            return Err(Error::not_differentiable(
                &target.name,
                format!("{} reduction has no gradient", self.op.name()),
            ));
        }

        let mut names = self.names.clone();
        let outer = self.axis.outer_role();
        let cotangent = names.new_ident("G_out", outer, self.dim());
        let g = Expr::var(&cotangent);
        let (seed, forward) = match self.op {
            ReductionOp::LogSumExp => {
                let out = names.new_ident("F_out", outer, self.dim());
                let weight = self.expr.sub(&Expr::var(&out))?.apply(UnaryOp::Exp)?;
                (weight.mul(&g)?, Some(out))
            }
            _ => (g, None),
        };
        let expr = self.expr.diff_t(target, &seed)?;
        let formula = Formula::new(ReductionOp::Sum, expr, axis, names)?;
        log::debug!(
            "adjoint of {} w.r.t. {}: {}",
            self,
            target.name,
            formula
        );
        Ok(Adjoint {
            formula,
            target: target.clone(),
            cotangent,
            forward,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::Namespace;

    fn grad(text: &str, aliases: &[&str], v: &str) -> String {
        let mut names = Namespace::from_aliases(aliases).unwrap();
        let f = Expr::parse(text, &mut names).unwrap();
        let v = names.get(v).unwrap().clone();
        let g = Expr::var(&names.new_ident("G", Role::Row, f.dim()));
        f.diff_t(&v, &g).unwrap().to_string()
    }

    #[test]
    fn elementary_rules() {
        let x = ["x=Vx(0,1)"];
        assert_eq!(grad("Log(x)", &x, "x"), "G/x");
        assert_eq!(grad("Square(x)", &x, "x"), "G*(2*x)");
        assert_eq!(grad("Pow(x,3)", &x, "x"), "G*(3*Pow(x,2))");
        assert_eq!(grad("Pow(x,2)", &x, "x"), "G*(2*x)");
        assert_eq!(grad("Sin(x)", &x, "x"), "G*Cos(x)");
        assert_eq!(grad("Cos(x)", &x, "x"), "G*-Sin(x)");
        assert_eq!(grad("Sign(x)+Step(x)", &x, "x"), "Zero(1)");
        assert_eq!(grad("Clamp(x,-1,1)", &x, "x"), "G*(Step(x--1)*Step(1-x))");
        assert_eq!(grad("3*x+2", &x, "x"), "G*3");
    }

    #[test]
    fn shape_rules() {
        let xy = ["x=Vx(0,3)", "y=Vy(1,3)", "p=Pm(2,1)"];
        assert_eq!(grad("(x|y)", &xy, "x"), "G*y");
        assert_eq!(grad("Elem(x,1)", &xy, "x"), "ElemT(G,3,1)");
        assert_eq!(grad("Sum(x)", &xy, "x"), "SumT(G,3)");
        assert_eq!(grad("SqNorm2(x-y)", &xy, "y"), "-(2*G*(x-y))");
        // scalar operand broadcast against a vector
        assert_eq!(grad("p*x", &xy, "p"), "Sum(G*x)");
        assert_eq!(grad("x-p", &xy, "p"), "Sum(-G)");
    }

    #[test]
    fn matrix_rules() {
        let ax = ["A=Pm(0,6)", "x=Vx(1,3)", "u=Vy(2,2)"];
        assert_eq!(grad("MatVecMult(A,x)", &ax, "A"), "TensorProd(G,x)");
        assert_eq!(grad("MatVecMult(A,x)", &ax, "x"), "VecMatMult(G,A)");
        assert_eq!(grad("VecMatMult(u,A)", &ax, "u"), "MatVecMult(A,G)");
        assert_eq!(grad("TensorProd(u,x)", &ax, "x"), "VecMatMult(u,G)");
    }

    #[test]
    fn not_differentiable() {
        let f = Formula::parse("Max_Reduction(x*y,1)", &["x=Vx(0,1)", "y=Vy(1,1)"]).unwrap();
        assert!(matches!(
            f.adjoint("x"),
            Err(Error::NotDifferentiable { .. })
        ));
        let f = Formula::parse("Sum_Reduction(x*y,1)", &["x=Vx(0,1)", "y=Vy(1,1)"]).unwrap();
        assert!(matches!(
            f.adjoint("out"),
            Err(Error::NotDifferentiable { .. })
        ));
        assert!(matches!(
            f.adjoint_of(&f.output()),
            Err(Error::NotDifferentiable { .. })
        ));
        assert!(matches!(
            f.adjoint("z"),
            Err(Error::NotDifferentiable { .. })
        ));
    }

    #[test]
    fn adjoint_axes() {
        let f = Formula::parse(
            "Sum_Reduction(p*Exp(x+y),0)",
            &["p=Pm(0,1)", "x=Vx(1,2)", "y=Vy(2,2)"],
        )
        .unwrap();
        let adj = f.adjoint("x").unwrap();
        assert_eq!(adj.formula.axis, Axis::J);
        // cotangent follows the forward output, indexed by j
        assert_eq!(adj.cotangent.role, Role::Col);
        assert_eq!(adj.cotangent.index, 3);
        assert!(!adj.sums_rows());

        let adj = f.adjoint("y").unwrap();
        assert_eq!(adj.formula.axis, Axis::I);

        let adj = f.adjoint("p").unwrap();
        assert_eq!(adj.formula.axis, Axis::J);
        assert!(adj.sums_rows());
    }

    #[test]
    fn logsumexp_adjoint() {
        let f = Formula::parse(
            "LogSumExp_Reduction(-SqDist(x,y),1)",
            &["x=Vx(0,2)", "y=Vy(1,2)"],
        )
        .unwrap();
        let adj = f.adjoint("x").unwrap();
        let forward = adj.forward.clone().unwrap();
        assert_eq!(forward.name, "F_out");
        assert_eq!(forward.index, 3);
        assert_eq!(forward.role, Role::Row);
        assert_eq!(adj.formula.num_args(), 4);
    }
}
