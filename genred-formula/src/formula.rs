//! Reduction formulas, e.g. `Sum_Reduction(Exp(-SqDist(x,y))*b,1)`

use crate::{
    error::{Error, Result},
    expr::Expr,
    namespace::{Namespace, Role, Symbol},
    parser::{self, RawExpr},
};
use std::{
    collections::hash_map::DefaultHasher,
    fmt,
    hash::{Hash, Hasher},
};

#[cfg_attr(doc, katexit::katexit)]
/// Reduction applied coordinatewise along the reduced axis
///
/// For a formula $F_{ij} \in \mathbb{R}^d$ reduced over $j$:
///
/// - `Sum`: $\sum_j F_{ij}$
/// - `LogSumExp`: $\log \sum_j \exp F_{ij}$
/// - `Max`, `Min`: $\max_j F_{ij}$, $\min_j F_{ij}$
/// - `ArgMax`, `ArgMin`: the smallest $j$ attaining the extremum, as a float
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReductionOp {
    Sum,
    LogSumExp,
    Max,
    Min,
    ArgMax,
    ArgMin,
}

impl ReductionOp {
    pub fn name(&self) -> &'static str {
        match self {
            ReductionOp::Sum => "Sum",
            ReductionOp::LogSumExp => "LogSumExp",
            ReductionOp::Max => "Max",
            ReductionOp::Min => "Min",
            ReductionOp::ArgMax => "ArgMax",
            ReductionOp::ArgMin => "ArgMin",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Sum" => ReductionOp::Sum,
            "LogSumExp" => ReductionOp::LogSumExp,
            "Max" => ReductionOp::Max,
            "Min" => ReductionOp::Min,
            "ArgMax" => ReductionOp::ArgMax,
            "ArgMin" => ReductionOp::ArgMin,
            _ => return None,
        })
    }

    pub fn is_differentiable(&self) -> bool {
        matches!(self, ReductionOp::Sum | ReductionOp::LogSumExp)
    }
}

/// Index collapsed by the reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Axis 0, output indexed by `j`
    I,
    /// Axis 1, output indexed by `i`
    J,
}

impl Axis {
    pub fn from_index(axis: usize) -> Result<Self> {
        match axis {
            0 => Ok(Axis::I),
            1 => Ok(Axis::J),
            _ => Err(Error::InvalidAxis(axis)),
        }
    }

    pub fn index(self) -> usize {
        match self {
            Axis::I => 0,
            Axis::J => 1,
        }
    }

    /// Role of the symbols indexed like the output
    pub fn outer_role(self) -> Role {
        match self {
            Axis::I => Role::Col,
            Axis::J => Role::Row,
        }
    }

    /// Role of the symbols indexed along the reduced axis
    pub fn inner_role(self) -> Role {
        match self {
            Axis::I => Role::Row,
            Axis::J => Role::Col,
        }
    }
}

/// Expression, symbol table, reduction and axis
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Formula {
    pub op: ReductionOp,
    pub axis: Axis,
    pub expr: Expr,
    pub names: Namespace,
}

impl Formula {
    pub fn new(op: ReductionOp, expr: Expr, axis: Axis, names: Namespace) -> Result<Self> {
        for symbol in expr.symbols() {
            if symbol.role == Role::Output {
                return Err(Error::shape_binding(
                    &symbol.name,
                    "output of a reduction cannot be an argument",
                ));
            }
            if !names.contains(&symbol) {
                return Err(Error::shape_binding(
                    &symbol.name,
                    "symbol is not declared in the namespace",
                ));
            }
        }
        Ok(Formula {
            op,
            axis,
            expr,
            names,
        })
    }

    /// Parse a bare formula with a separately given reduction and axis
    ///
    /// ```
    /// use genred_formula::{Formula, ReductionOp};
    ///
    /// let f = Formula::build(
    ///     ReductionOp::Sum,
    ///     "Square(p-a)*Exp(x+y)",
    ///     &["p=Pm(0,1)", "a=Vy(1,1)", "x=Vx(2,3)", "y=Vy(3,3)"],
    ///     1,
    /// )
    /// .unwrap();
    /// assert_eq!(f.to_string(), "Sum_Reduction(Square(p-a)*Exp(x+y),1)");
    /// assert_eq!(f.dim(), 3);
    /// ```
    pub fn build<S: AsRef<str>>(
        op: ReductionOp,
        formula: &str,
        aliases: &[S],
        axis: usize,
    ) -> Result<Self> {
        let axis = Axis::from_index(axis)?;
        let mut names = Namespace::from_aliases(aliases)?;
        let expr = Expr::parse(formula, &mut names)?;
        Formula::new(op, expr, axis, names)
    }

    /// Parse `<Op>_Reduction(<formula>,<axis>)`
    ///
    /// ```
    /// use genred_formula::{Axis, Formula, ReductionOp};
    ///
    /// let f = Formula::parse("LogSumExp_Reduction(-SqDist(x,y), 0)", &["x=Vi(0,2)", "y=Vj(1,2)"]).unwrap();
    /// assert_eq!(f.op, ReductionOp::LogSumExp);
    /// assert_eq!(f.axis, Axis::I);
    /// assert_eq!(f.dim(), 1);
    /// ```
    pub fn parse<S: AsRef<str>>(text: &str, aliases: &[S]) -> Result<Self> {
        let mut names = Namespace::from_aliases(aliases)?;
        let raw = parser::parse_expr(text)?;
        let (name, args, rest) = match &raw {
            RawExpr::Call { name, args, rest } => (*name, args, *rest),
            _ => {
                return Err(parser::parse_error(
                    text,
                    text.len(),
                    "expected a reduction such as `Sum_Reduction(formula, axis)`",
                ))
            }
        };
        let op = name
            .strip_suffix("_Reduction")
            .and_then(ReductionOp::from_name)
            .ok_or_else(|| {
                parser::parse_error(text, rest, format!("unknown reduction `{}`", name))
            })?;
        if args.len() != 2 {
            return Err(parser::parse_error(
                text,
                rest,
                format!("`{}` expects (formula, axis)", name),
            ));
        }
        let axis = match args[1] {
            RawExpr::Number(v) if v.fract() == 0.0 && v >= 0.0 => Axis::from_index(v as usize)?,
            _ => {
                return Err(parser::parse_error(
                    text,
                    rest,
                    "reduction axis must be 0 or 1",
                ))
            }
        };
        let expr = Expr::from_raw(text, &args[0], &mut names)?;
        Formula::new(op, expr, axis, names)
    }

    /// Hash of the whole formula, used as a cache key
    pub fn id(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    /// Dimension of each output row
    pub fn dim(&self) -> usize {
        self.expr.dim()
    }

    pub fn num_args(&self) -> usize {
        self.names.num_args()
    }

    /// Symbol standing for the result of this reduction
    pub fn output(&self) -> Symbol {
        Symbol::new("out", Role::Output, self.num_args(), self.dim())
    }

    /// Alias declarations reproducing the symbol table
    pub fn aliases(&self) -> Vec<String> {
        self.names.symbols().iter().map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_Reduction({},{})",
            self.op.name(),
            self.expr,
            self.axis.index()
        )
    }
}

impl fmt::Debug for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | ", self)?;
        for (n, alias) in self.aliases().iter().enumerate() {
            if n > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", alias)?;
        }
        Ok(())
    }
}
