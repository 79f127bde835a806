//! Gradients evaluated as reductions

use crate::{arg::Arg, reduction::Reduction};
use genred_formula::{Adjoint, Error, Result, Symbol};
use ndarray::{Array2, Axis as NdAxis};

/// Gradient of a [Reduction] with respect to one argument
///
/// The adjoint is a `Sum` reduction over the arguments of the forward
/// reduction, followed by the cotangent and, for `LogSumExp`, the forward
/// output. Its output has the shape of the differentiated argument.
#[derive(Debug, Clone)]
pub struct Gradient {
    adjoint: Adjoint,
    reduction: Reduction,
    forward: Option<Reduction>,
}

impl Gradient {
    pub(crate) fn new(adjoint: Adjoint, reduction: Reduction, forward: Option<Reduction>) -> Self {
        Gradient {
            adjoint,
            reduction,
            forward,
        }
    }

    /// Reduction evaluating the adjoint
    pub fn reduction(&self) -> &Reduction {
        &self.reduction
    }

    pub fn target(&self) -> &Symbol {
        &self.adjoint.target
    }

    pub fn adjoint(&self) -> &Adjoint {
        &self.adjoint
    }

    /// Pull `cotangent` back to the target argument
    ///
    /// `args` are the arguments of the forward reduction. A parameter gets a
    /// `[1, dim]` gradient.
    pub fn call(&self, args: &[Arg], cotangent: Arg) -> Result<Array2<f64>> {
        let output = match &self.forward {
            Some(forward) => Some(forward.call(args)?),
            None => None,
        };
        let mut full: Vec<Arg> = args.iter().map(Arg::reborrow).collect();
        full.push(cotangent.reborrow());
        if let Some(output) = &output {
            full.push(output.into());
        }
        let grad = self.reduction.call(&full).map_err(|e| match e {
            Error::ShapeBinding { symbol, reason } if symbol == self.adjoint.cotangent.name => {
                Error::ShapeBinding {
                    symbol: "cotangent".to_string(),
                    reason,
                }
            }
            e => e,
        })?;
        if self.adjoint.sums_rows() {
            Ok(grad.sum_axis(NdAxis(0)).insert_axis(NdAxis(0)))
        } else {
            Ok(grad)
        }
    }
}
