#![cfg_attr(
    doc,
    feature(prelude_import, custom_inner_attributes, proc_macro_hygiene)
)]
#![cfg_attr(doc, katexit::katexit)]
//! Generic kernel reductions on ndarray
//!
//! Evaluates reductions such as
//! $$
//! a_i = \sum_{j=1}^N \left(p - a_j\right)^2 \exp\left(x_i + y_j\right)
//! $$
//! written in the formula language of [genred_formula], without forming the
//! $M \times N$ intermediate tensor.
//!
//! ```
//! use genred::{generic_sum, Arg};
//! use ndarray::{array, Array2};
//!
//! let r = generic_sum(
//!     "Square(p-a)*Exp(x+y)",
//!     &["p=Pm(0,1)", "a=Vy(1,1)", "x=Vx(2,3)", "y=Vy(3,3)"],
//!     1,
//!     "auto",
//! )
//! .unwrap();
//!
//! let p = array![2.0];
//! let a = Array2::<f64>::zeros((10, 1));
//! let x = Array2::<f64>::zeros((6, 3));
//! let y = Array2::<f64>::zeros((10, 3));
//! let args: [Arg; 4] = [(&p).into(), (&a).into(), (&x).into(), (&y).into()];
//! let out = r.call(&args).unwrap();
//! assert_eq!(out.dim(), (6, 3));
//! assert_eq!(out[[0, 0]], 40.0);
//! ```
//!
//! Backends
//! ---------
//! - `dense` materializes the grid with ndarray broadcasting, for small
//!   problems and as a reference,
//! - `row-tiled`, `col-tiled` and `double-tiled` run a compiled form of the
//!   formula pair by pair on tiles of the grid, in parallel with rayon,
//! - `auto` lets the [Planner] choose from the problem size.
//!
//! Gradients
//! ----------
//! [Reduction::grad] derives the adjoint formula symbolically, and it is
//! evaluated by the same backends. See [Reduction::vjp].
//!
//! Named kernels
//! --------------
//! [kernel_eval] covers the usual radial kernels with a scalar, diagonal or
//! full metric, shared or one per sample, see [kernels].

pub mod arg;
pub mod config;
pub mod dense;
pub mod grad;
pub mod kernels;
pub mod plan;
pub mod program;
pub mod reducer;
pub mod reduction;
pub mod tiled;

pub use arg::{Arg, Binding};
pub use config::PlannerConfig;
pub use grad::Gradient;
pub use kernels::{kernel_eval, kernel_reduction, KernelFamily, KernelMode, KernelSpec};
pub use plan::{Backend, Plan, Planner, Strategy};
pub use reducer::Reducer;
pub use reduction::{generic_logsumexp, generic_sum, global_planner, reduce, Reduction};

pub use genred_derive::genred;
pub use genred_formula::{Axis, Error, Formula, ReductionOp, Result};
