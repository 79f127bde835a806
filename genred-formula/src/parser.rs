//! Parse formulas and alias declarations
//!
//! These parsers are implemented using [nom](https://github.com/Geal/nom),
//! and corresponding EBNF-like schema are written in each document page.
//! They produce raw syntax trees; names, operators and dimensions are
//! resolved afterwards in [crate::expr].
//!

use crate::{
    error::{Error, Result},
    namespace::Role,
};
use nom::{
    branch::*, bytes::complete::*, character::complete::*, combinator::*, multi::*,
    number::complete::recognize_float, sequence::*, Finish, IResult, Parser,
};

/// Raw expression before name and dimension resolution
///
/// `rest` is the length of the input remaining where the node starts
/// (at the operator for binary nodes), used to report byte positions in errors.
#[derive(Debug, Clone, PartialEq)]
pub enum RawExpr<'input> {
    Number(f64),
    Name {
        name: &'input str,
        rest: usize,
    },
    Call {
        name: &'input str,
        args: Vec<RawExpr<'input>>,
        rest: usize,
    },
    Neg(Box<RawExpr<'input>>),
    Binary {
        op: char,
        lhs: Box<RawExpr<'input>>,
        rhs: Box<RawExpr<'input>>,
        rest: usize,
    },
}

impl<'input> RawExpr<'input> {
    /// Remaining input length where this node starts, if recorded
    pub fn rest(&self) -> Option<usize> {
        match self {
            RawExpr::Name { rest, .. }
            | RawExpr::Call { rest, .. }
            | RawExpr::Binary { rest, .. } => Some(*rest),
            RawExpr::Neg(inner) => inner.rest(),
            RawExpr::Number(_) => None,
        }
    }
}

fn ws_char<'a>(c: char) -> impl FnMut(&'a str) -> IResult<&'a str, char> {
    delimited(multispace0, char(c), multispace0)
}

/// identifier = ( letter | `_` ) { letter | digit | `_` };
pub fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))(input)
}

/// number = digit { digit } [ `.` { digit } ] [ exponent ];
pub fn number(input: &str) -> IResult<&str, f64> {
    let (_, _) = peek(satisfy(|c| c.is_ascii_digit() || c == '.'))(input)?;
    map_res(recognize_float, str::parse::<f64>)(input)
}

/// integer = digit { digit };
pub fn integer(input: &str) -> IResult<&str, usize> {
    map_res(digit1, str::parse::<usize>)(input)
}

fn binary_chain<'a>(
    input: &'a str,
    ops: &'static str,
    operand: fn(&'a str) -> IResult<&'a str, RawExpr<'a>>,
) -> IResult<&'a str, RawExpr<'a>> {
    let (mut input, mut lhs) = operand(input)?;
    loop {
        let rest = input.len();
        match preceded(multispace0, one_of(ops))(input) {
            Ok((next, op)) => {
                let (next, rhs) = cut(operand)(next)?;
                lhs = RawExpr::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    rest,
                };
                input = next;
            }
            Err(nom::Err::Error(_)) => return Ok((input, lhs)),
            Err(e) => return Err(e),
        }
    }
}

/// scalprod = [sum] { `|` [sum] };
pub fn scalprod(input: &str) -> IResult<&str, RawExpr<'_>> {
    binary_chain(input, "|", sum)
}

/// sum = [product] { ( `+` | `-` ) [product] };
pub fn sum(input: &str) -> IResult<&str, RawExpr<'_>> {
    binary_chain(input, "+-", product)
}

/// product = [unary] { ( `*` | `/` ) [unary] };
pub fn product(input: &str) -> IResult<&str, RawExpr<'_>> {
    binary_chain(input, "*/", unary)
}

/// unary = `-` [unary] | [atom];
pub fn unary(input: &str) -> IResult<&str, RawExpr<'_>> {
    let (input, _) = multispace0(input)?;
    alt((
        preceded(char('-'), cut(unary)).map(|e| RawExpr::Neg(Box::new(e))),
        atom,
    ))(input)
}

/// atom = [number] | `(` [scalprod] `)` | [call] | [identifier];
pub fn atom(input: &str) -> IResult<&str, RawExpr<'_>> {
    let (input, _) = multispace0(input)?;
    let rest = input.len();
    let (input, atom) = alt((
        number.map(RawExpr::Number),
        delimited(char('('), cut(scalprod), cut(ws_char(')'))),
        call,
        identifier.map(move |name| RawExpr::Name { name, rest }),
    ))(input)?;
    let (input, _) = multispace0(input)?;
    Ok((input, atom))
}

/// call = [identifier] `(` [scalprod] { `,` [scalprod] } `)`;
pub fn call(input: &str) -> IResult<&str, RawExpr<'_>> {
    let rest = input.len();
    let (input, name) = identifier(input)?;
    let (input, _) = ws_char('(')(input)?;
    let (input, args) = cut(separated_list1(ws_char(','), scalprod))(input)?;
    let (input, _) = cut(ws_char(')'))(input)?;
    Ok((input, RawExpr::Call { name, args, rest }))
}

/// Parse a whole formula text
pub fn parse_expr(input: &str) -> Result<RawExpr<'_>> {
    match terminated(scalprod, multispace0)(input).finish() {
        Ok(("", raw)) => Ok(raw),
        Ok((rest, _)) => Err(parse_error(input, rest.len(), "unexpected trailing input")),
        Err(e) => Err(parse_error(
            input,
            e.input.len(),
            format!("unexpected input ({:?})", e.code),
        )),
    }
}

pub(crate) fn parse_error(input: &str, rest: usize, reason: impl ToString) -> Error {
    Error::Parse {
        input: input.to_string(),
        position: input.len().saturating_sub(rest),
        reason: reason.to_string(),
    }
}

/// role = `Pm` | `Vx` | `Vi` | `Vy` | `Vj`;
pub fn role(input: &str) -> IResult<&str, Role> {
    alt((
        tag("Pm").map(|_| Role::Parameter),
        alt((tag("Vx"), tag("Vi"))).map(|_| Role::Row),
        alt((tag("Vy"), tag("Vj"))).map(|_| Role::Col),
    ))(input)
}

/// Alias declaration, e.g. `x = Vx(2,3)`
#[derive(Debug, PartialEq, Eq)]
pub struct RawAlias<'input> {
    pub name: Option<&'input str>,
    pub role: Role,
    pub index: usize,
    /// Dimension, 1 when omitted
    pub dim: Option<usize>,
}

/// alias = \[ [identifier] `=` \] [role] `(` [integer] \[ `,` [integer] \] `)`;
pub fn alias(input: &str) -> IResult<&str, RawAlias<'_>> {
    let (input, _head) = multispace0(input)?;
    let (input, name) = opt(terminated(identifier, ws_char('=')))(input)?;
    let (input, role) = role(input)?;
    let (input, _) = ws_char('(')(input)?;
    let (input, index) = integer(input)?;
    let (input, dim) = opt(preceded(ws_char(','), integer))(input)?;
    let (input, _) = ws_char(')')(input)?;
    Ok((
        input,
        RawAlias {
            name,
            role,
            index,
            dim,
        },
    ))
}

pub fn parse_alias(input: &str) -> Result<RawAlias<'_>> {
    match alias(input).finish() {
        Ok(("", raw)) => Ok(raw),
        _ => Err(Error::alias_syntax(
            input,
            "expected `name = Role(index, dim)` with Role one of Pm, Vx, Vy",
        )),
    }
}
