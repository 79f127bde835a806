//! Per-coordinate reduction states and their combiners

use genred_formula::ReductionOp;

/// Running state of one output row
///
/// A state is a flat `[f64]` of [Reducer::state_width] values so that a tile
/// stores the states of all its rows in one buffer.
/// [Reducer::merge] is commutative and associative up to rounding, which is
/// what allows tiles along the reduced axis to be combined in any order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reducer {
    op: ReductionOp,
    dim: usize,
}

fn kahan_add(sum: &mut f64, comp: &mut f64, value: f64) {
    let y = value - *comp;
    let t = *sum + y;
    *comp = (t - *sum) - y;
    *sum = t;
}

impl Reducer {
    pub fn new(op: ReductionOp, dim: usize) -> Self {
        Reducer { op, dim }
    }

    pub fn op(&self) -> ReductionOp {
        self.op
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn state_width(&self) -> usize {
        match self.op {
            ReductionOp::Sum | ReductionOp::Max | ReductionOp::Min => self.dim,
            // running max, scaled sum, compensation
            ReductionOp::LogSumExp => 3 * self.dim,
            // extremum, index
            ReductionOp::ArgMax | ReductionOp::ArgMin => 2 * self.dim,
        }
    }

    pub fn init(&self, state: &mut [f64]) {
        let d = self.dim;
        match self.op {
            ReductionOp::Sum => state.fill(0.0),
            ReductionOp::Max => state.fill(f64::NEG_INFINITY),
            ReductionOp::Min => state.fill(f64::INFINITY),
            ReductionOp::LogSumExp => {
                state[..d].fill(f64::NEG_INFINITY);
                state[d..].fill(0.0);
            }
            ReductionOp::ArgMax => {
                state[..d].fill(f64::NEG_INFINITY);
                state[d..].fill(-1.0);
            }
            ReductionOp::ArgMin => {
                state[..d].fill(f64::INFINITY);
                state[d..].fill(-1.0);
            }
        }
    }

    pub fn init_states(&self, rows: usize) -> Vec<f64> {
        let width = self.state_width();
        let mut states = vec![0.0; rows * width];
        for state in states.chunks_mut(width.max(1)) {
            self.init(state);
        }
        states
    }

    fn better(&self, x: f64, current: f64) -> bool {
        match self.op {
            ReductionOp::Max | ReductionOp::ArgMax => x > current,
            _ => x < current,
        }
    }

    /// Accumulate the value `x` of the pair at reduced index `j`
    pub fn push(&self, state: &mut [f64], x: &[f64], j: usize) {
        let d = self.dim;
        match self.op {
            ReductionOp::Sum => {
                for (s, v) in state.iter_mut().zip(x) {
                    *s += v;
                }
            }
            ReductionOp::Max | ReductionOp::Min => {
                for (s, v) in state.iter_mut().zip(x) {
                    if self.better(*v, *s) {
                        *s = *v;
                    }
                }
            }
            ReductionOp::ArgMax | ReductionOp::ArgMin => {
                let (values, indices) = state.split_at_mut(d);
                for k in 0..d {
                    // pushes arrive in increasing j, so ties keep the first index
                    if indices[k] < 0.0 || self.better(x[k], values[k]) {
                        values[k] = x[k];
                        indices[k] = j as f64;
                    }
                }
            }
            ReductionOp::LogSumExp => {
                let (m, rest) = state.split_at_mut(d);
                let (s, c) = rest.split_at_mut(d);
                for k in 0..d {
                    let v = x[k];
                    if v == f64::NEG_INFINITY {
                        continue;
                    }
                    if v > m[k] {
                        let scale = (m[k] - v).exp();
                        s[k] *= scale;
                        c[k] *= scale;
                        m[k] = v;
                    }
                    kahan_add(&mut s[k], &mut c[k], (v - m[k]).exp());
                }
            }
        }
    }

    /// Combine `other` into `state`, both partial states over disjoint index ranges
    pub fn merge(&self, state: &mut [f64], other: &[f64]) {
        let d = self.dim;
        match self.op {
            ReductionOp::Sum => {
                for (s, o) in state.iter_mut().zip(other) {
                    *s += o;
                }
            }
            ReductionOp::Max | ReductionOp::Min => {
                for (s, o) in state.iter_mut().zip(other) {
                    if self.better(*o, *s) {
                        *s = *o;
                    }
                }
            }
            ReductionOp::ArgMax | ReductionOp::ArgMin => {
                for k in 0..d {
                    let (v, i) = (other[k], other[d + k]);
                    if i < 0.0 {
                        continue;
                    }
                    let (cv, ci) = (state[k], state[d + k]);
                    if ci < 0.0 || self.better(v, cv) || (v == cv && i < ci) {
                        state[k] = v;
                        state[d + k] = i;
                    }
                }
            }
            ReductionOp::LogSumExp => {
                for k in 0..d {
                    let (om, os, oc) = (other[k], other[d + k], other[2 * d + k]);
                    if om == f64::NEG_INFINITY {
                        continue;
                    }
                    let (m, s, c) = (state[k], state[d + k], state[2 * d + k]);
                    if m == f64::NEG_INFINITY {
                        state[k] = om;
                        state[d + k] = os;
                        state[2 * d + k] = oc;
                        continue;
                    }
                    let top = m.max(om);
                    if top == f64::INFINITY {
                        state[k] = top;
                        continue;
                    }
                    let sum = (s - c) * (m - top).exp() + (os - oc) * (om - top).exp();
                    state[k] = top;
                    state[d + k] = sum;
                    state[2 * d + k] = 0.0;
                }
            }
        }
    }

    /// Write the reduced value of `state` into `out`
    pub fn finish(&self, state: &[f64], out: &mut [f64]) {
        let d = self.dim;
        match self.op {
            ReductionOp::Sum | ReductionOp::Max | ReductionOp::Min => out.copy_from_slice(state),
            ReductionOp::ArgMax | ReductionOp::ArgMin => out.copy_from_slice(&state[d..]),
            ReductionOp::LogSumExp => {
                for k in 0..d {
                    let m = state[k];
                    out[k] = if m.is_infinite() {
                        m
                    } else {
                        m + (state[d + k] - state[2 * d + k]).ln()
                    };
                }
            }
        }
    }
}
