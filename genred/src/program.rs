//! Compiled pointwise evaluation of an expression tree
//!
//! A [Program] is a flat list of instructions in post-order, one per
//! distinct sub-tree: identical sub-trees are compiled once and their
//! result is re-used. Each instruction writes its result into a fixed
//! range of a scratch buffer, after the ranges of its operands.
//!
//! Instructions are split by what they depend on, so that a pair `(i, j)`
//! only evaluates the part of the tree involving the reduced index:
//!
//! - fixed: constants and parameters, once per call;
//! - outer: the output index, once per output row;
//! - pair: the reduced index, once per pair.

use crate::arg::Binding;
use genred_formula::{Axis, BinaryOp, Expr, Node, Role, UnaryOp};
use std::{collections::HashMap, ops::Range};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Fixed,
    Outer,
    Pair,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Instr {
    /// Copy a row of the argument at this position
    Load(usize),
    Const(f64),
    Zero,
    Unary(UnaryOp, usize),
    Binary(BinaryOp, usize, usize),
}

#[derive(Debug, Clone)]
struct Slot {
    instr: Instr,
    stage: Stage,
    offset: usize,
    dim: usize,
}

#[derive(Debug, Clone)]
pub struct Program {
    slots: Vec<Slot>,
    stages: [Vec<usize>; 3],
    root: usize,
    width: usize,
}

struct Compiler {
    axis: Axis,
    slots: Vec<Slot>,
    seen: HashMap<Expr, usize>,
    width: usize,
}

impl Compiler {
    fn stage_of(&self, role: Role) -> Stage {
        if role == Role::Parameter {
            Stage::Fixed
        } else if role == self.axis.outer_role() {
            Stage::Outer
        } else {
            Stage::Pair
        }
    }

    fn visit(&mut self, expr: &Expr) -> usize {
        if let Some(&id) = self.seen.get(expr) {
            return id;
        }
        let (instr, stage) = match expr.node() {
            Node::Var(symbol) => (Instr::Load(symbol.index), self.stage_of(symbol.role)),
            Node::Const(c) => (Instr::Const(c.get()), Stage::Fixed),
            Node::Zero => (Instr::Zero, Stage::Fixed),
            Node::Unary(op, a) => {
                let a = self.visit(a);
                (Instr::Unary(*op, a), self.slots[a].stage)
            }
            Node::Binary(op, a, b) => {
                let a = self.visit(a);
                let b = self.visit(b);
                let stage = self.slots[a].stage.max(self.slots[b].stage);
                (Instr::Binary(*op, a, b), stage)
            }
        };
        let id = self.slots.len();
        self.slots.push(Slot {
            instr,
            stage,
            offset: self.width,
            dim: expr.dim(),
        });
        self.width += expr.dim();
        self.seen.insert(expr.clone(), id);
        id
    }
}

impl Program {
    /// Compile `expr` for a reduction along `axis`
    pub fn compile(expr: &Expr, axis: Axis) -> Self {
        let mut compiler = Compiler {
            axis,
            slots: Vec::new(),
            seen: HashMap::new(),
            width: 0,
        };
        let root = compiler.visit(expr);
        let mut stages = [Vec::new(), Vec::new(), Vec::new()];
        for (id, slot) in compiler.slots.iter().enumerate() {
            stages[slot.stage as usize].push(id);
        }
        Program {
            slots: compiler.slots,
            stages,
            root,
            width: compiler.width,
        }
    }

    /// Scratch buffer length
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of distinct sub-trees
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn stage_len(&self, stage: Stage) -> usize {
        self.stages[stage as usize].len()
    }

    /// Output dimension
    pub fn dim(&self) -> usize {
        self.slots[self.root].dim
    }

    pub fn output<'s>(&self, scratch: &'s [f64]) -> &'s [f64] {
        &scratch[self.range(self.root)]
    }

    pub fn scratch(&self) -> Vec<f64> {
        vec![0.0; self.width]
    }

    /// Evaluate the fixed stage, once per call
    pub fn eval_fixed(&self, binding: &Binding, scratch: &mut [f64]) {
        self.run(Stage::Fixed, binding, 0, scratch)
    }

    /// Evaluate the outer stage for output row `i`
    pub fn eval_outer(&self, binding: &Binding, i: usize, scratch: &mut [f64]) {
        self.run(Stage::Outer, binding, i, scratch)
    }

    /// Evaluate the pair stage for reduced index `j`
    pub fn eval_pair(&self, binding: &Binding, j: usize, scratch: &mut [f64]) {
        self.run(Stage::Pair, binding, j, scratch)
    }

    fn range(&self, id: usize) -> Range<usize> {
        let slot = &self.slots[id];
        slot.offset..slot.offset + slot.dim
    }

    fn run(&self, stage: Stage, binding: &Binding, row: usize, scratch: &mut [f64]) {
        for &id in &self.stages[stage as usize] {
            let slot = &self.slots[id];
            // operands always precede the result in the buffer
            let (done, rest) = scratch.split_at_mut(slot.offset);
            let out = &mut rest[..slot.dim];
            match slot.instr {
                Instr::Load(index) => {
                    for (o, v) in out.iter_mut().zip(binding.view(index).row(row)) {
                        *o = *v;
                    }
                }
                Instr::Const(c) => out[0] = c,
                Instr::Zero => out.fill(0.0),
                Instr::Unary(op, a) => op.eval(&done[self.range(a)], out),
                Instr::Binary(op, a, b) => op.eval(&done[self.range(a)], &done[self.range(b)], out),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arg::Arg;
    use genred_formula::Namespace;
    use ndarray::array;

    #[test]
    fn structural_sharing() {
        let mut names = Namespace::from_aliases(&["x=Vx(0,1)", "y=Vy(1,1)"]).unwrap();
        let expr = Expr::parse("Exp(x-y)*Exp(x-y)+Square(x)", &mut names).unwrap();
        let program = Program::compile(&expr, Axis::J);
        // x, y, x-y, Exp, product, Square(x), sum
        assert_eq!(program.len(), 7);
        assert_eq!(program.stage_len(Stage::Outer), 2);
        assert_eq!(program.stage_len(Stage::Pair), 5);

        let reversed = Program::compile(&expr, Axis::I);
        assert_eq!(reversed.stage_len(Stage::Outer), 1);
        assert_eq!(reversed.stage_len(Stage::Pair), 6);
    }

    #[test]
    fn evaluate_pair() {
        let mut names =
            Namespace::from_aliases(&["p=Pm(0,1)", "a=Vy(1,1)", "x=Vx(2,3)", "y=Vy(3,3)"]).unwrap();
        let expr = Expr::parse("Square(p-a)*Exp(x+y)", &mut names).unwrap();
        let program = Program::compile(&expr, Axis::J);

        let p = array![2.0];
        let a = array![[1.0], [0.0]];
        let x = array![[0.0, 1.0, 2.0]];
        let y = array![[0.0, 0.0, 0.0], [1.0, -1.0, 0.5]];
        let args: Vec<Arg> = vec![(&p).into(), (&a).into(), (&x).into(), (&y).into()];
        let binding = Binding::new(&names, &args).unwrap();

        let mut scratch = program.scratch();
        program.eval_fixed(&binding, &mut scratch);
        program.eval_outer(&binding, 0, &mut scratch);
        program.eval_pair(&binding, 1, &mut scratch);
        let expected = [4.0 * 1.0f64.exp(), 4.0 * 0.0f64.exp(), 4.0 * 2.5f64.exp()];
        for (v, e) in program.output(&scratch).iter().zip(expected) {
            assert!((v - e).abs() < 1e-12);
        }
    }
}
