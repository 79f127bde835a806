//! Closed operator vocabulary
//!
//! Each operator is one enum variant. The dimension rule and the pointwise
//! evaluation rule live here, the derivative rule lives in [crate::diff].

use crate::error::{Error, Result};
use std::{
    fmt,
    hash::{Hash, Hasher},
};

/// Floating point literal compared and hashed by its bit pattern
#[derive(Debug, Clone, Copy)]
pub struct Scalar(f64);

impl Scalar {
    pub fn new(value: f64) -> Self {
        Scalar(value)
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Scalar {}

impl Hash for Scalar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operators taking one operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Minus,
    Exp,
    Log,
    Sqrt,
    Rsqrt,
    Inv,
    Square,
    Pow(i32),
    Abs,
    Sign,
    /// 1 for `x >= 0`, 0 otherwise
    Step,
    Relu,
    Sin,
    Cos,
    Clamp(Scalar, Scalar),
    /// k-th coordinate
    Elem(usize),
    /// Scalar placed at coordinate `index` of a zero vector of size `dim`
    ElemT { dim: usize, index: usize },
    /// Sum of coordinates
    Sum,
    /// Scalar repeated `n` times
    SumT(usize),
    SqNorm2,
}

impl UnaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            UnaryOp::Minus => "Minus",
            UnaryOp::Exp => "Exp",
            UnaryOp::Log => "Log",
            UnaryOp::Sqrt => "Sqrt",
            UnaryOp::Rsqrt => "Rsqrt",
            UnaryOp::Inv => "Inv",
            UnaryOp::Square => "Square",
            UnaryOp::Pow(_) => "Pow",
            UnaryOp::Abs => "Abs",
            UnaryOp::Sign => "Sign",
            UnaryOp::Step => "Step",
            UnaryOp::Relu => "ReLU",
            UnaryOp::Sin => "Sin",
            UnaryOp::Cos => "Cos",
            UnaryOp::Clamp(..) => "Clamp",
            UnaryOp::Elem(_) => "Elem",
            UnaryOp::ElemT { .. } => "ElemT",
            UnaryOp::Sum => "Sum",
            UnaryOp::SumT(_) => "SumT",
            UnaryOp::SqNorm2 => "SqNorm2",
        }
    }

    /// Elementwise operators act on each coordinate independently
    pub fn is_elementwise(&self) -> bool {
        !matches!(
            self,
            UnaryOp::Elem(_)
                | UnaryOp::ElemT { .. }
                | UnaryOp::Sum
                | UnaryOp::SumT(_)
                | UnaryOp::SqNorm2
        )
    }

    /// `op(0) == 0` coordinatewise, so a zero operand gives a zero result
    pub fn preserves_zero(&self) -> bool {
        match self {
            UnaryOp::Minus
            | UnaryOp::Square
            | UnaryOp::Abs
            | UnaryOp::Sign
            | UnaryOp::Relu
            | UnaryOp::Sin
            | UnaryOp::Elem(_)
            | UnaryOp::ElemT { .. }
            | UnaryOp::Sum
            | UnaryOp::SumT(_)
            | UnaryOp::SqNorm2 => true,
            UnaryOp::Pow(n) => *n > 0,
            UnaryOp::Clamp(lo, hi) => lo.get() <= 0.0 && 0.0 <= hi.get(),
            _ => false,
        }
    }

    pub fn output_dim(&self, input: usize) -> Result<usize> {
        match *self {
            UnaryOp::Elem(k) => {
                if k < input {
                    Ok(1)
                } else {
                    Err(Error::dim_mismatch(
                        "Elem",
                        format!("index {} out of range for dimension {}", k, input),
                    ))
                }
            }
            UnaryOp::ElemT { dim, index } => {
                if input != 1 {
                    Err(Error::dim_mismatch(
                        "ElemT",
                        format!("operand must be scalar, got dimension {}", input),
                    ))
                } else if index >= dim {
                    Err(Error::dim_mismatch(
                        "ElemT",
                        format!("index {} out of range for dimension {}", index, dim),
                    ))
                } else {
                    Ok(dim)
                }
            }
            UnaryOp::SumT(n) => {
                if input != 1 {
                    Err(Error::dim_mismatch(
                        "SumT",
                        format!("operand must be scalar, got dimension {}", input),
                    ))
                } else if n == 0 {
                    Err(Error::dim_mismatch("SumT", "output dimension must be positive"))
                } else {
                    Ok(n)
                }
            }
            UnaryOp::Sum | UnaryOp::SqNorm2 => Ok(1),
            _ => Ok(input),
        }
    }

    /// Scalar function of an elementwise operator
    pub(crate) fn apply(&self, x: f64) -> f64 {
        match *self {
            UnaryOp::Minus => -x,
            UnaryOp::Exp => x.exp(),
            UnaryOp::Log => x.ln(),
            UnaryOp::Sqrt => x.sqrt(),
            UnaryOp::Rsqrt => x.sqrt().recip(),
            UnaryOp::Inv => x.recip(),
            UnaryOp::Square => x * x,
            UnaryOp::Pow(n) => x.powi(n),
            UnaryOp::Abs => x.abs(),
            UnaryOp::Sign => {
                if x > 0.0 {
                    1.0
                } else if x < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            }
            UnaryOp::Step => {
                if x >= 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            UnaryOp::Relu => {
                if x > 0.0 {
                    x
                } else {
                    0.0
                }
            }
            UnaryOp::Sin => x.sin(),
            UnaryOp::Cos => x.cos(),
            UnaryOp::Clamp(lo, hi) => {
                if x < lo.get() {
                    lo.get()
                } else if x > hi.get() {
                    hi.get()
                } else {
                    x
                }
            }
            UnaryOp::Elem(_)
            | UnaryOp::ElemT { .. }
            | UnaryOp::Sum
            | UnaryOp::SumT(_)
            | UnaryOp::SqNorm2 => unreachable!("{} is not elementwise", self.name()),
        }
    }

    /// Evaluate on one point; `out.len()` is the output dimension
    pub fn eval(&self, x: &[f64], out: &mut [f64]) {
        match *self {
            UnaryOp::Elem(k) => out[0] = x[k],
            UnaryOp::ElemT { index, .. } => {
                out.fill(0.0);
                out[index] = x[0];
            }
            UnaryOp::Sum => out[0] = x.iter().sum(),
            UnaryOp::SumT(_) => out.fill(x[0]),
            UnaryOp::SqNorm2 => out[0] = x.iter().map(|v| v * v).sum(),
            _ => {
                for (o, v) in out.iter_mut().zip(x) {
                    *o = self.apply(*v);
                }
            }
        }
    }
}

/// Operators taking two operands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    /// Inner product `(a|b)`
    Scalprod,
    /// Row-major `n x m` matrix times vector of size `m`
    MatVecMult,
    /// Vector of size `n` times row-major `n x m` matrix
    VecMatMult,
    /// Outer product, row-major
    TensorProd,
}

impl BinaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Scalprod => "|",
            BinaryOp::MatVecMult => "MatVecMult",
            BinaryOp::VecMatMult => "VecMatMult",
            BinaryOp::TensorProd => "TensorProd",
        }
    }

    /// Arithmetic operators broadcasting a scalar operand against a vector
    pub fn is_elementwise(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div
        )
    }

    pub fn output_dim(&self, a: usize, b: usize) -> Result<usize> {
        let mismatch = || {
            Err(Error::dim_mismatch(
                self.name(),
                format!("incompatible operand dimensions {} and {}", a, b),
            ))
        };
        match self {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                if a == b || b == 1 {
                    Ok(a)
                } else if a == 1 {
                    Ok(b)
                } else {
                    mismatch()
                }
            }
            BinaryOp::Scalprod => {
                if a == b {
                    Ok(1)
                } else {
                    mismatch()
                }
            }
            BinaryOp::MatVecMult => {
                if a % b == 0 {
                    Ok(a / b)
                } else {
                    mismatch()
                }
            }
            BinaryOp::VecMatMult => {
                if b % a == 0 {
                    Ok(b / a)
                } else {
                    mismatch()
                }
            }
            BinaryOp::TensorProd => Ok(a * b),
        }
    }

    pub(crate) fn apply(&self, x: f64, y: f64) -> f64 {
        match self {
            BinaryOp::Add => x + y,
            BinaryOp::Sub => x - y,
            BinaryOp::Mul => x * y,
            BinaryOp::Div => x / y,
            _ => unreachable!("{} is not elementwise", self.name()),
        }
    }

    /// Evaluate on one point; `out.len()` is the output dimension
    pub fn eval(&self, a: &[f64], b: &[f64], out: &mut [f64]) {
        match self {
            BinaryOp::Scalprod => out[0] = a.iter().zip(b).map(|(x, y)| x * y).sum(),
            BinaryOp::MatVecMult => {
                let m = b.len();
                for (r, o) in out.iter_mut().enumerate() {
                    *o = a[r * m..(r + 1) * m]
                        .iter()
                        .zip(b)
                        .map(|(x, y)| x * y)
                        .sum();
                }
            }
            BinaryOp::VecMatMult => {
                let m = out.len();
                out.fill(0.0);
                for (r, x) in a.iter().enumerate() {
                    for (o, y) in out.iter_mut().zip(&b[r * m..(r + 1) * m]) {
                        *o += x * y;
                    }
                }
            }
            BinaryOp::TensorProd => {
                let m = b.len();
                for (r, x) in a.iter().enumerate() {
                    for (o, y) in out[r * m..(r + 1) * m].iter_mut().zip(b) {
                        *o = x * y;
                    }
                }
            }
            _ => {
                let (sa, sb) = (a.len() == 1, b.len() == 1);
                for (k, o) in out.iter_mut().enumerate() {
                    let x = if sa { a[0] } else { a[k] };
                    let y = if sb { b[0] } else { b[k] };
                    *o = self.apply(x, y);
                }
            }
        }
    }
}
