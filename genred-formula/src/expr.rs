//! Typed expression tree
//!
//! Trees are immutable and share sub-trees through [Arc]. Every node knows
//! its output dimension, checked when the node is constructed, so a tree
//! that exists is dimensionally consistent.

use crate::{
    error::{Error, Result},
    namespace::{Namespace, Role, Symbol},
    ops::{BinaryOp, Scalar, UnaryOp},
    parser::{self, RawExpr},
};
use std::{fmt, sync::Arc};

#[derive(Debug, PartialEq, Eq, Hash)]
pub enum Node {
    Var(Symbol),
    /// Scalar literal
    Const(Scalar),
    /// Zero vector, produced by differentiation
    Zero,
    Unary(UnaryOp, Expr),
    Binary(BinaryOp, Expr, Expr),
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Expr {
    node: Arc<Node>,
    dim: usize,
}

impl Expr {
    fn make(node: Node, dim: usize) -> Self {
        Expr {
            node: Arc::new(node),
            dim,
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn var(symbol: &Symbol) -> Self {
        Expr::make(Node::Var(symbol.clone()), symbol.dim)
    }

    pub fn constant(value: f64) -> Self {
        Expr::make(Node::Const(Scalar::new(value)), 1)
    }

    pub fn zero(dim: usize) -> Self {
        Expr::make(Node::Zero, dim)
    }

    pub fn is_zero(&self) -> bool {
        matches!(*self.node, Node::Zero)
    }

    fn as_const(&self) -> Option<f64> {
        match *self.node {
            Node::Const(c) => Some(c.get()),
            _ => None,
        }
    }

    /// Apply a unary operator, folding constants and zeros
    ///
    /// Constants fold only to finite values so the printed form parses back.
    pub fn unary(op: UnaryOp, a: &Expr) -> Result<Expr> {
        let dim = op.output_dim(a.dim)?;
        if a.is_zero() && op.preserves_zero() {
            return Ok(Expr::zero(dim));
        }
        if op.is_elementwise() {
            if let Some(c) = a.as_const().map(|c| op.apply(c)).filter(|c| c.is_finite()) {
                return Ok(Expr::constant(c));
            }
        }
        match (op, a.node()) {
            (UnaryOp::Minus, Node::Unary(UnaryOp::Minus, inner)) => Ok(inner.clone()),
            (UnaryOp::Pow(1), _) => Ok(a.clone()),
            _ => Ok(Expr::make(Node::Unary(op, a.clone()), dim)),
        }
    }

    /// Apply a binary operator, folding constants and zeros
    pub fn binary(op: BinaryOp, a: &Expr, b: &Expr) -> Result<Expr> {
        let dim = op.output_dim(a.dim, b.dim)?;
        let (za, zb) = (a.is_zero(), b.is_zero());
        match op {
            BinaryOp::Add => {
                if za && b.dim == dim {
                    return Ok(b.clone());
                }
                if zb && a.dim == dim {
                    return Ok(a.clone());
                }
                if za && zb {
                    return Ok(Expr::zero(dim));
                }
            }
            BinaryOp::Sub => {
                if zb && a.dim == dim {
                    return Ok(a.clone());
                }
                if za && b.dim == dim {
                    return Expr::unary(UnaryOp::Minus, b);
                }
                if za && zb {
                    return Ok(Expr::zero(dim));
                }
            }
            BinaryOp::Mul => {
                if za || zb {
                    return Ok(Expr::zero(dim));
                }
                if a.as_const() == Some(1.0) && b.dim == dim {
                    return Ok(b.clone());
                }
                if b.as_const() == Some(1.0) && a.dim == dim {
                    return Ok(a.clone());
                }
            }
            BinaryOp::Div => {
                if za {
                    return Ok(Expr::zero(dim));
                }
                if b.as_const() == Some(1.0) && a.dim == dim {
                    return Ok(a.clone());
                }
            }
            _ => {
                if za || zb {
                    return Ok(Expr::zero(dim));
                }
            }
        }
        if op.is_elementwise() {
            if let (Some(x), Some(y)) = (a.as_const(), b.as_const()) {
                let c = op.apply(x, y);
                if c.is_finite() {
                    return Ok(Expr::constant(c));
                }
            }
        }
        Ok(Expr::make(Node::Binary(op, a.clone(), b.clone()), dim))
    }

    pub fn add(&self, other: &Expr) -> Result<Expr> {
        Expr::binary(BinaryOp::Add, self, other)
    }

    pub fn sub(&self, other: &Expr) -> Result<Expr> {
        Expr::binary(BinaryOp::Sub, self, other)
    }

    pub fn mul(&self, other: &Expr) -> Result<Expr> {
        Expr::binary(BinaryOp::Mul, self, other)
    }

    pub fn div(&self, other: &Expr) -> Result<Expr> {
        Expr::binary(BinaryOp::Div, self, other)
    }

    pub fn scalprod(&self, other: &Expr) -> Result<Expr> {
        Expr::binary(BinaryOp::Scalprod, self, other)
    }

    pub fn neg(&self) -> Result<Expr> {
        Expr::unary(UnaryOp::Minus, self)
    }

    pub fn apply(&self, op: UnaryOp) -> Result<Expr> {
        Expr::unary(op, self)
    }

    /// Squared norm of `x` weighted by `s`
    ///
    /// The form is chosen from the dimension of `s`, scalar first:
    ///
    /// - `1`: `s * SqNorm2(x)`
    /// - `dim(x)`: `(s|Square(x))`
    /// - `dim(x)^2`: `(x|MatVecMult(s,x))`
    ///
    pub fn weighted_sq_norm(s: &Expr, x: &Expr) -> Result<Expr> {
        let d = x.dim;
        if s.dim == 1 {
            s.mul(&x.apply(UnaryOp::SqNorm2)?)
        } else if s.dim == d {
            s.scalprod(&x.apply(UnaryOp::Square)?)
        } else if s.dim == d * d {
            x.scalprod(&Expr::binary(BinaryOp::MatVecMult, s, x)?)
        } else {
            Err(Error::dim_mismatch(
                "WeightedSqNorm",
                format!(
                    "weight of dimension {} for a vector of dimension {}",
                    s.dim, d
                ),
            ))
        }
    }

    /// Whether the value changes with `symbol`
    pub fn depends_on(&self, symbol: &Symbol) -> bool {
        match self.node() {
            Node::Var(s) => s == symbol,
            Node::Const(_) | Node::Zero => false,
            Node::Unary(_, a) => a.depends_on(symbol),
            Node::Binary(_, a, b) => a.depends_on(symbol) || b.depends_on(symbol),
        }
    }

    /// Distinct symbols in order of first appearance
    pub fn symbols(&self) -> Vec<Symbol> {
        fn walk(e: &Expr, out: &mut Vec<Symbol>) {
            match e.node() {
                Node::Var(s) => {
                    if !out.contains(s) {
                        out.push(s.clone())
                    }
                }
                Node::Const(_) | Node::Zero => {}
                Node::Unary(_, a) => walk(a, out),
                Node::Binary(_, a, b) => {
                    walk(a, out);
                    walk(b, out);
                }
            }
        }
        let mut out = Vec::new();
        walk(self, &mut out);
        out
    }

    /// Parse a formula, resolving names against `names`
    ///
    /// Inline variables such as `Vy(3,3)` are added to `names`.
    ///
    /// ```
    /// use genred_formula::{Expr, Namespace};
    ///
    /// let mut names = Namespace::from_aliases(&["p=Pm(0,1)", "a=Vy(1,1)", "x=Vx(2,3)"]).unwrap();
    /// let expr = Expr::parse("Square(p-a)*Exp(x+Vy(3,3))", &mut names).unwrap();
    /// assert_eq!(expr.dim(), 3);
    /// assert_eq!(names.num_args(), 4);
    /// ```
    pub fn parse(input: &str, names: &mut Namespace) -> Result<Expr> {
        let raw = parser::parse_expr(input)?;
        Expr::from_raw(input, &raw, names)
    }

    pub fn from_raw(input: &str, raw: &RawExpr, names: &mut Namespace) -> Result<Expr> {
        Resolver { input, names }.resolve(raw)
    }

    fn precedence(&self) -> u8 {
        match self.node() {
            Node::Binary(BinaryOp::Add | BinaryOp::Sub, ..) => 1,
            Node::Binary(BinaryOp::Mul | BinaryOp::Div, ..) => 2,
            Node::Unary(UnaryOp::Minus, _) => 3,
            Node::Const(c) if c.get().is_sign_negative() => 3,
            _ => 4,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node() {
            Node::Var(s) => write!(f, "{}", s.name),
            Node::Const(c) => write!(f, "{}", c),
            Node::Zero => write!(f, "Zero({})", self.dim),
            Node::Unary(UnaryOp::Minus, a) => {
                write!(f, "-")?;
                wrap(f, a, a.precedence() < 4)
            }
            Node::Unary(op, a) => {
                write!(f, "{}({}", op.name(), a)?;
                match op {
                    UnaryOp::Pow(n) => write!(f, ",{}", n)?,
                    UnaryOp::Clamp(lo, hi) => write!(f, ",{},{}", lo, hi)?,
                    UnaryOp::Elem(k) => write!(f, ",{}", k)?,
                    UnaryOp::ElemT { dim, index } => write!(f, ",{},{}", dim, index)?,
                    UnaryOp::SumT(n) => write!(f, ",{}", n)?,
                    _ => {}
                }
                write!(f, ")")
            }
            Node::Binary(BinaryOp::Scalprod, a, b) => write!(f, "({}|{})", a, b),
            Node::Binary(op, a, b) if op.is_elementwise() => {
                let p = self.precedence();
                wrap(f, a, a.precedence() < p)?;
                write!(f, "{}", op.name())?;
                wrap(f, b, b.precedence() <= p)
            }
            Node::Binary(op, a, b) => write!(f, "{}({},{})", op.name(), a, b),
        }
    }
}

fn wrap(f: &mut fmt::Formatter<'_>, e: &Expr, parens: bool) -> fmt::Result {
    if parens {
        write!(f, "({})", e)
    } else {
        write!(f, "{}", e)
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

fn named_unary(name: &str) -> Option<UnaryOp> {
    Some(match name {
        "Minus" => UnaryOp::Minus,
        "Exp" => UnaryOp::Exp,
        "Log" => UnaryOp::Log,
        "Sqrt" => UnaryOp::Sqrt,
        "Rsqrt" => UnaryOp::Rsqrt,
        "Inv" => UnaryOp::Inv,
        "Square" => UnaryOp::Square,
        "Abs" => UnaryOp::Abs,
        "Sign" => UnaryOp::Sign,
        "Step" => UnaryOp::Step,
        "ReLU" => UnaryOp::Relu,
        "Sin" => UnaryOp::Sin,
        "Cos" => UnaryOp::Cos,
        "Sum" => UnaryOp::Sum,
        "SqNorm2" => UnaryOp::SqNorm2,
        _ => return None,
    })
}

fn named_binary(name: &str) -> Option<BinaryOp> {
    Some(match name {
        "MatVecMult" => BinaryOp::MatVecMult,
        "VecMatMult" => BinaryOp::VecMatMult,
        "TensorProd" => BinaryOp::TensorProd,
        _ => return None,
    })
}

fn infix(op: char) -> BinaryOp {
    match op {
        '+' => BinaryOp::Add,
        '-' => BinaryOp::Sub,
        '*' => BinaryOp::Mul,
        '/' => BinaryOp::Div,
        '|' => BinaryOp::Scalprod,
        _ => unreachable!("parser emits only + - * / |"),
    }
}

struct Resolver<'a> {
    input: &'a str,
    names: &'a mut Namespace,
}

impl<'a> Resolver<'a> {
    fn error(&self, raw: &RawExpr, reason: impl ToString) -> Error {
        let rest = raw.rest().unwrap_or(self.input.len());
        parser::parse_error(self.input, rest, reason)
    }

    fn resolve(&mut self, raw: &RawExpr) -> Result<Expr> {
        match raw {
            RawExpr::Number(v) => Ok(Expr::constant(*v)),
            RawExpr::Name { name, .. } => match self.names.get(name) {
                Some(symbol) => Ok(Expr::var(symbol)),
                None => Err(self.error(raw, format!("unknown name `{}`", name))),
            },
            RawExpr::Neg(inner) => self.resolve(inner)?.neg(),
            RawExpr::Binary { op, lhs, rhs, .. } => {
                let a = self.resolve(lhs)?;
                let b = self.resolve(rhs)?;
                Expr::binary(infix(*op), &a, &b)
            }
            RawExpr::Call { name, args, .. } => self.call(raw, name, args),
        }
    }

    fn arity(&self, raw: &RawExpr, name: &str, args: &[RawExpr], n: usize) -> Result<()> {
        if args.len() == n {
            Ok(())
        } else {
            Err(self.error(
                raw,
                format!("`{}` expects {} arguments, got {}", name, n, args.len()),
            ))
        }
    }

    fn real(&self, raw: &RawExpr) -> Result<f64> {
        match raw {
            RawExpr::Number(v) => Ok(*v),
            RawExpr::Neg(inner) => Ok(-self.real(inner)?),
            _ => Err(self.error(raw, "expected a number")),
        }
    }

    fn integer(&self, raw: &RawExpr) -> Result<i64> {
        let v = self.real(raw)?;
        if v.fract() == 0.0 && v.abs() < i32::MAX as f64 {
            Ok(v as i64)
        } else {
            Err(self.error(raw, "expected an integer"))
        }
    }

    fn index(&self, raw: &RawExpr) -> Result<usize> {
        let v = self.integer(raw)?;
        usize::try_from(v).map_err(|_| self.error(raw, "expected a non-negative integer"))
    }

    fn call(&mut self, raw: &RawExpr, name: &str, args: &[RawExpr]) -> Result<Expr> {
        if let Some(op) = named_unary(name) {
            self.arity(raw, name, args, 1)?;
            return self.resolve(&args[0])?.apply(op);
        }
        if let Some(op) = named_binary(name) {
            self.arity(raw, name, args, 2)?;
            let a = self.resolve(&args[0])?;
            let b = self.resolve(&args[1])?;
            return Expr::binary(op, &a, &b);
        }
        match name {
            "Pm" | "Vx" | "Vi" | "Vy" | "Vj" => {
                let role = match name {
                    "Pm" => Role::Parameter,
                    "Vx" | "Vi" => Role::Row,
                    _ => Role::Col,
                };
                let (index, dim) = match args {
                    [index] => (self.index(index)?, 1),
                    [index, dim] => (self.index(index)?, self.index(dim)?),
                    _ => return Err(self.error(raw, format!("`{}` expects (index, dim)", name))),
                };
                if dim == 0 {
                    return Err(self.error(raw, "dimension must be positive"));
                }
                let symbol = self.names.reference(role, index, dim)?;
                Ok(Expr::var(&symbol))
            }
            "Norm2" => {
                self.arity(raw, name, args, 1)?;
                self.resolve(&args[0])?
                    .apply(UnaryOp::SqNorm2)?
                    .apply(UnaryOp::Sqrt)
            }
            "Pow" => {
                self.arity(raw, name, args, 2)?;
                let n = i32::try_from(self.integer(&args[1])?)
                    .map_err(|_| self.error(&args[1], "exponent out of range"))?;
                self.resolve(&args[0])?.apply(UnaryOp::Pow(n))
            }
            "Clamp" => {
                self.arity(raw, name, args, 3)?;
                let lo = self.real(&args[1])?;
                let hi = self.real(&args[2])?;
                if !(lo <= hi) {
                    return Err(self.error(raw, format!("empty interval [{}, {}]", lo, hi)));
                }
                self.resolve(&args[0])?
                    .apply(UnaryOp::Clamp(Scalar::new(lo), Scalar::new(hi)))
            }
            "Elem" => {
                self.arity(raw, name, args, 2)?;
                let k = self.index(&args[1])?;
                self.resolve(&args[0])?.apply(UnaryOp::Elem(k))
            }
            "ElemT" => {
                self.arity(raw, name, args, 3)?;
                let dim = self.index(&args[1])?;
                let index = self.index(&args[2])?;
                self.resolve(&args[0])?
                    .apply(UnaryOp::ElemT { dim, index })
            }
            "SumT" => {
                self.arity(raw, name, args, 2)?;
                let n = self.index(&args[1])?;
                self.resolve(&args[0])?.apply(UnaryOp::SumT(n))
            }
            "SqDist" => {
                self.arity(raw, name, args, 2)?;
                let a = self.resolve(&args[0])?;
                let b = self.resolve(&args[1])?;
                a.sub(&b)?.apply(UnaryOp::SqNorm2)
            }
            "Powf" => {
                self.arity(raw, name, args, 2)?;
                let a = self.resolve(&args[0])?;
                let b = self.resolve(&args[1])?;
                b.mul(&a.apply(UnaryOp::Log)?)?.apply(UnaryOp::Exp)
            }
            "Divide" => {
                self.arity(raw, name, args, 2)?;
                let a = self.resolve(&args[0])?;
                let b = self.resolve(&args[1])?;
                a.div(&b)
            }
            "WeightedSqNorm" => {
                self.arity(raw, name, args, 2)?;
                let s = self.resolve(&args[0])?;
                let x = self.resolve(&args[1])?;
                Expr::weighted_sq_norm(&s, &x)
            }
            "WeightedSqDist" => {
                self.arity(raw, name, args, 3)?;
                let s = self.resolve(&args[0])?;
                let x = self.resolve(&args[1])?;
                let y = self.resolve(&args[2])?;
                Expr::weighted_sq_norm(&s, &x.sub(&y)?)
            }
            "IntCst" => {
                self.arity(raw, name, args, 1)?;
                Ok(Expr::constant(self.integer(&args[0])? as f64))
            }
            "Zero" => {
                self.arity(raw, name, args, 1)?;
                let dim = self.index(&args[0])?;
                if dim == 0 {
                    return Err(self.error(raw, "dimension must be positive"));
                }
                Ok(Expr::zero(dim))
            }
            _ => Err(self.error(raw, format!("unknown operator `{}`", name))),
        }
    }
}
