#![cfg_attr(
    doc,
    feature(prelude_import, custom_inner_attributes, proc_macro_hygiene)
)]
#![cfg_attr(doc, katexit::katexit)]
//! Formula language for generic kernel reductions
//!
//! Generic reductions
//! -------------------
//! Many algorithms on point clouds, e.g. kernel density estimation,
//! kernel matrix-vector products, nearest neighbour search or the
//! entropic optimal transport, evaluate a small expression $F$ on every pair
//! of a row set $(x_i)_{i < M}$ and a column set $(y_j)_{j < N}$ and
//! immediately reduce the $M \times N$ values along one axis:
//! $$
//! a_i = \sum_{j} F(p, x_i, y_j)
//! $$
//! where $p$ is a parameter shared by all pairs.
//! The full $M \times N$ tensor never needs to exist in memory.
//!
//! This crate handles the symbolic part:
//!
//! - alias declarations `x = Vx(0,3)` giving each argument a role
//!   (`Pm` parameter, `Vx` indexed by $i$, `Vy` indexed by $j$),
//!   a position in the call and a dimension, see [Namespace];
//! - a small algebraic language, `Square(p-a)*Exp(x+y)`, parsed into an
//!   [Expr] tree whose dimensions are checked bottom-up;
//! - reductions `Sum_Reduction(F, 1)` wrapping an expression, see [Formula];
//! - symbolic differentiation: the gradient of a reduction is again a reduction,
//!   see [Formula::adjoint].
//!
//! Evaluation lives in the `genred` crate.
//!
//! ### Roles and axes
//!
//! Axis 1 collapses $j$ and the output has $M$ rows, axis 0 collapses $i$
//! and the output has $N$ rows. Every output row has the dimension of $F$.
//!
//! ### Gradients
//!
//! For $a_i = \sum_j F_{ij}$ and a cotangent $g_i$,
//! $$
//! \frac{\partial}{\partial x_i} \sum_{i'} g_{i'} \cdot a_{i'} = \sum_j \left[\partial_{x_i} F_{ij}\right]^T g_i
//! $$
//! is a sum over $j$ of a new expression involving the new argument $g$,
//! while the gradient along $y_j$ is a sum over $i$.
//!

pub mod diff;
pub mod error;
pub mod expr;
pub mod formula;
pub mod namespace;
pub mod ops;
pub mod parser;

pub use diff::Adjoint;
pub use error::{Error, Result};
pub use expr::{Expr, Node};
pub use formula::{Axis, Formula, ReductionOp};
pub use namespace::{Namespace, Role, Symbol};
pub use ops::{BinaryOp, Scalar, UnaryOp};
