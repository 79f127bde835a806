//! Dense reference backend
//!
//! Every node of the tree is materialized as an `[outer, inner, dim]` array,
//! with length one along the axes it does not depend on, and combined with
//! ndarray broadcasting. Memory grows with `M x N`; this is the path the
//! tiled backends are checked against.

use crate::{arg::Binding, reducer::Reducer};
use genred_formula::{Axis, Error, Expr, Node, Result, Role};
use ndarray::{Array2, Array3, ArrayView1, ArrayView3, ArrayViewMut1, Axis as NdAxis, Zip};
use std::{collections::HashMap, rc::Rc};

/// Run `f` on a contiguous copy of the lane if it is not contiguous already
pub(crate) fn with_slice<R>(lane: ArrayView1<f64>, f: impl FnOnce(&[f64]) -> R) -> R {
    match lane.as_slice() {
        Some(s) => f(s),
        None => f(&lane.to_vec()),
    }
}

pub(crate) fn write_lane(mut lane: ArrayViewMut1<f64>, f: impl FnOnce(&mut [f64])) {
    if let Some(s) = lane.as_slice_mut() {
        return f(s);
    }
    let mut buf = vec![0.0; lane.len()];
    f(&mut buf);
    lane.assign(&ArrayView1::from(&buf[..]));
}

fn broadcast(a: &Array3<f64>, shape: (usize, usize, usize)) -> Result<ArrayView3<f64>> {
    a.broadcast(shape).ok_or_else(|| Error::DimensionMismatch {
        op: "broadcast".to_string(),
        reason: format!("cannot broadcast {:?} to {:?}", a.shape(), shape),
    })
}

/// Extent of two broadcast operands, a length of one stretches to the other
fn join(a: usize, b: usize) -> usize {
    if a == 1 {
        b
    } else {
        a
    }
}

struct Grid<'b, 'a> {
    binding: &'b Binding<'a>,
    axis: Axis,
    memo: HashMap<Expr, Rc<Array3<f64>>>,
}

impl<'b, 'a> Grid<'b, 'a> {
    fn eval(&mut self, expr: &Expr) -> Result<Rc<Array3<f64>>> {
        if let Some(value) = self.memo.get(expr) {
            return Ok(value.clone());
        }
        let value = match expr.node() {
            Node::Var(symbol) => {
                let view = self.binding.view(symbol.index).to_owned();
                match symbol.role {
                    Role::Parameter => view.insert_axis(NdAxis(0)),
                    Role::Output => {
                        return Err(Error::shape_binding(
                            &symbol.name,
                            "output of a reduction cannot be bound",
                        ))
                    }
                    role if role == self.axis.outer_role() => view.insert_axis(NdAxis(1)),
                    _ => view.insert_axis(NdAxis(0)),
                }
            }
            Node::Const(c) => Array3::from_elem((1, 1, 1), c.get()),
            Node::Zero => Array3::zeros((1, 1, expr.dim())),
            Node::Unary(op, a) => {
                let a = self.eval(a)?;
                let (o, i, _) = a.dim();
                let mut out = Array3::zeros((o, i, expr.dim()));
                Zip::from(out.lanes_mut(NdAxis(2)))
                    .and(a.lanes(NdAxis(2)))
                    .for_each(|out, x| with_slice(x, |x| write_lane(out, |out| op.eval(x, out))));
                out
            }
            Node::Binary(op, a, b) => {
                let a = self.eval(a)?;
                let b = self.eval(b)?;
                let (oa, ia, da) = a.dim();
                let (ob, ib, db) = b.dim();
                let (o, i) = (join(oa, ob), join(ia, ib));
                let a = broadcast(&a, (o, i, da))?;
                let b = broadcast(&b, (o, i, db))?;
                let mut out = Array3::zeros((o, i, expr.dim()));
                Zip::from(out.lanes_mut(NdAxis(2)))
                    .and(a.lanes(NdAxis(2)))
                    .and(b.lanes(NdAxis(2)))
                    .for_each(|out, x, y| {
                        with_slice(x, |x| {
                            with_slice(y, |y| write_lane(out, |out| op.eval(x, y, out)))
                        })
                    });
                out
            }
        };
        let value = Rc::new(value);
        self.memo.insert(expr.clone(), value.clone());
        Ok(value)
    }
}

/// Reduce `expr` along `axis` by materializing the whole grid
pub fn reduce(
    expr: &Expr,
    axis: Axis,
    reducer: &Reducer,
    binding: &Binding,
) -> Result<Array2<f64>> {
    let mut grid = Grid {
        binding,
        axis,
        memo: HashMap::new(),
    };
    let root = grid.eval(expr)?;
    let (outer, inner) = binding.extents(axis);
    let dim = expr.dim();
    let values = broadcast(&root, (outer, inner, dim))?;

    let mut out = Array2::zeros((outer, dim));
    let mut state = vec![0.0; reducer.state_width()];
    for (row, block) in out.outer_iter_mut().zip(values.outer_iter()) {
        reducer.init(&mut state);
        for (j, lane) in block.outer_iter().enumerate() {
            with_slice(lane, |x| reducer.push(&mut state, x, j));
        }
        write_lane(row, |out| reducer.finish(&state, out));
    }
    Ok(out)
}
