//! Errors raised while resolving, parsing, binding, planning and differentiating formulas

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Alias declaration does not follow `name = Role(index, dim)`
    #[error("Invalid alias `{alias}`: {reason}")]
    AliasSyntax { alias: String, reason: String },

    #[error("Alias name `{0}` is declared more than once")]
    DuplicateAlias(String),

    /// Two declarations claim the same argument position
    #[error("Argument {index} is claimed by both `{first}` and `{second}`")]
    IndexConflict {
        index: usize,
        first: String,
        second: String,
    },

    /// `position` is the byte offset in the formula text
    #[error("Parse error at {position} in `{input}`: {reason}")]
    Parse {
        input: String,
        position: usize,
        reason: String,
    },

    #[error("Dimension mismatch in `{op}`: {reason}")]
    DimensionMismatch { op: String, reason: String },

    /// Bound array shape is inconsistent with its symbol
    #[error("Invalid binding for `{symbol}`: {reason}")]
    ShapeBinding { symbol: String, reason: String },

    #[error("No tile fits in the memory budget of {budget} bytes (smallest tile needs {required} bytes)")]
    TileTooSmall { budget: usize, required: usize },

    #[error("Unsupported backend `{0}`, expected one of auto, dense, row-tiled, col-tiled, double-tiled")]
    UnsupportedBackend(String),

    #[error("Cannot differentiate with respect to `{symbol}`: {reason}")]
    NotDifferentiable { symbol: String, reason: String },

    /// Metric parameter shape matches no row of the metric table
    #[error("Metric parameter of shape {shape:?} does not fit features of dimension {dim}")]
    KernelShapeAmbiguity { shape: Vec<usize>, dim: usize },

    #[error("Reduction axis must be 0 or 1, got {0}")]
    InvalidAxis(usize),
}

impl Error {
    pub(crate) fn dim_mismatch(op: impl ToString, reason: impl ToString) -> Self {
        Error::DimensionMismatch {
            op: op.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn alias_syntax(alias: &str, reason: impl ToString) -> Self {
        Error::AliasSyntax {
            alias: alias.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand used by the binding layer
    pub fn shape_binding(symbol: impl ToString, reason: impl ToString) -> Self {
        Error::ShapeBinding {
            symbol: symbol.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn not_differentiable(symbol: impl ToString, reason: impl ToString) -> Self {
        Error::NotDifferentiable {
            symbol: symbol.to_string(),
            reason: reason.to_string(),
        }
    }
}
