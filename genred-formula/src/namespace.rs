use crate::{
    error::{Error, Result},
    parser,
};
use std::fmt;

/// How a symbol is indexed over the `(i, j)` grid
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub enum Role {
    /// Same value for every pair, `Pm`
    Parameter,
    /// Indexed by `i`, `Vx`
    Row,
    /// Indexed by `j`, `Vy`
    Col,
    /// Result of a reduction, never bound as an input
    Output,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Role::Parameter => "Pm",
            Role::Row => "Vx",
            Role::Col => "Vy",
            Role::Output => "Out",
        };
        write!(f, "{}", tag)
    }
}

/// Named argument of a formula
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct Symbol {
    pub name: String,
    pub role: Role,
    /// Position of the bound array in the call
    pub index: usize,
    pub dim: usize,
}

impl Symbol {
    pub fn new(name: impl Into<String>, role: Role, index: usize, dim: usize) -> Self {
        Symbol {
            name: name.into(),
            role,
            index,
            dim,
        }
    }

    /// Symbol declared without a name is referred to by its inline form, e.g. `Vx(2,3)`
    pub fn unnamed(role: Role, index: usize, dim: usize) -> Self {
        Symbol::new(inline_name(role, index, dim), role, index, dim)
    }

    pub fn is_named(&self) -> bool {
        self.name != inline_name(self.role, self.index, self.dim)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_named() {
            write!(f, "{}={}({},{})", self.name, self.role, self.index, self.dim)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

fn inline_name(role: Role, index: usize, dim: usize) -> String {
    format!("{}({},{})", role, index, dim)
}

/// Symbol table of a formula
///
/// Every symbol owns one argument position. Symbols created while building
/// adjoint formulas are issued by [Namespace::new_ident], which appends
/// a new position after the existing ones.
///
#[derive(Debug, PartialEq, Eq, Hash, Clone, Default)]
pub struct Namespace {
    symbols: Vec<Symbol>,
}

impl Namespace {
    /// Create empty namespace
    pub fn init() -> Self {
        Namespace::default()
    }

    /// Resolve alias declarations, e.g. `["p = Pm(0,1)", "x = Vx(1,3)"]`
    ///
    /// ```
    /// use genred_formula::{Namespace, Role};
    ///
    /// let names = Namespace::from_aliases(&["p=Pm(0,2)", "x = Vx(1,3)", "Vy(2,3)"]).unwrap();
    /// assert_eq!(names.num_args(), 3);
    /// assert_eq!(names.get("x").unwrap().role, Role::Row);
    /// assert_eq!(names.by_index(2).unwrap().name, "Vy(2,3)");
    /// ```
    pub fn from_aliases<S: AsRef<str>>(aliases: &[S]) -> Result<Self> {
        let mut names = Namespace::init();
        for alias in aliases {
            let alias = alias.as_ref();
            let raw = parser::parse_alias(alias)?;
            let dim = raw.dim.unwrap_or(1);
            if dim == 0 {
                return Err(Error::alias_syntax(alias, "dimension must be positive"));
            }
            let symbol = match raw.name {
                Some(name) => Symbol::new(name, raw.role, raw.index, dim),
                None => Symbol::unnamed(raw.role, raw.index, dim),
            };
            names.declare(symbol)?;
        }
        Ok(names)
    }

    /// Add a symbol, checking name and position uniqueness
    pub fn declare(&mut self, symbol: Symbol) -> Result<()> {
        if symbol.role == Role::Output {
            return Err(Error::alias_syntax(
                &symbol.name,
                "output symbols cannot be declared as arguments",
            ));
        }
        if symbol.is_named() && self.get(&symbol.name).is_some() {
            return Err(Error::DuplicateAlias(symbol.name));
        }
        if let Some(first) = self.by_index(symbol.index) {
            return Err(Error::IndexConflict {
                index: symbol.index,
                first: first.name.clone(),
                second: symbol.name,
            });
        }
        let pos = self
            .symbols
            .partition_point(|s| s.index < symbol.index);
        self.symbols.insert(pos, symbol);
        Ok(())
    }

    /// Inline reference such as `Vx(2,3)` inside a formula
    ///
    /// Re-uses the declared symbol at this position when role and dimension agree.
    pub fn reference(&mut self, role: Role, index: usize, dim: usize) -> Result<Symbol> {
        if let Some(found) = self.by_index(index) {
            if found.role == role && found.dim == dim {
                return Ok(found.clone());
            }
            return Err(Error::IndexConflict {
                index,
                first: found.name.clone(),
                second: inline_name(role, index, dim),
            });
        }
        let symbol = Symbol::unnamed(role, index, dim);
        self.declare(symbol.clone())?;
        Ok(symbol)
    }

    /// Issue a new symbol at the next free position
    ///
    /// `stem` is suffixed with `_` until it does not collide with an existing name.
    pub fn new_ident(&mut self, stem: &str, role: Role, dim: usize) -> Symbol {
        let mut name = stem.to_string();
        while self.get(&name).is_some() {
            name.push('_');
        }
        let symbol = Symbol::new(name, role, self.num_args(), dim);
        self.symbols.push(symbol.clone());
        symbol
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.name == name)
    }

    pub fn by_index(&self, index: usize) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.index == index)
    }

    /// Symbols sorted by position
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Number of arguments expected by a call
    pub fn num_args(&self) -> usize {
        self.symbols.last().map(|s| s.index + 1).unwrap_or(0)
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.by_index(symbol.index) == Some(symbol)
    }
}
