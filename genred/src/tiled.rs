//! Tiled backends
//!
//! Output rows are split into bands of `tile_rows`, and each band is split
//! along the reduced axis into tiles of `tile_cols`. Tiles are independent:
//! each one runs the compiled [Program] pair by pair into its own reduction
//! states, and the partial states of a band are merged with
//! [Reducer::merge]. Row tiling, column tiling and double tiling only
//! differ in the tile sizes chosen by the planner.

use crate::{
    arg::Binding,
    dense::write_lane,
    plan::Plan,
    program::Program,
    reducer::Reducer,
};
use genred_formula::Axis;
use ndarray::{Array2, Axis as NdAxis};
use rayon::prelude::*;

struct Tiles<'t, 'a> {
    program: &'t Program,
    reducer: &'t Reducer,
    binding: &'t Binding<'a>,
    /// Scratch with the fixed stage already evaluated
    fixed: Vec<f64>,
    inner: usize,
    tile_cols: usize,
    parallel: bool,
}

impl<'t, 'a> Tiles<'t, 'a> {
    /// Partial states of rows `rows` over the reduced indices `cols`
    fn tile(&self, rows: (usize, usize), cols: (usize, usize)) -> Vec<f64> {
        let width = self.reducer.state_width();
        let mut states = self.reducer.init_states(rows.1 - rows.0);
        let mut scratch = self.fixed.clone();
        for (i, state) in (rows.0..rows.1).zip(states.chunks_mut(width)) {
            self.program.eval_outer(self.binding, i, &mut scratch);
            for j in cols.0..cols.1 {
                self.program.eval_pair(self.binding, j, &mut scratch);
                self.reducer.push(state, self.program.output(&scratch), j);
            }
        }
        states
    }

    fn merge(&self, mut a: Vec<f64>, b: Vec<f64>) -> Vec<f64> {
        let width = self.reducer.state_width();
        for (sa, sb) in a.chunks_mut(width).zip(b.chunks(width)) {
            self.reducer.merge(sa, sb);
        }
        a
    }

    /// Reduction states of one band of rows
    fn band(&self, rows: (usize, usize)) -> Vec<f64> {
        let starts: Vec<usize> = (0..self.inner).step_by(self.tile_cols).collect();
        let tile = |&c: &usize| self.tile(rows, (c, (c + self.tile_cols).min(self.inner)));
        let merged = if self.parallel {
            starts
                .par_iter()
                .map(tile)
                .reduce_with(|a, b| self.merge(a, b))
        } else {
            starts.iter().map(tile).reduce(|a, b| self.merge(a, b))
        };
        merged.unwrap_or_else(|| self.reducer.init_states(rows.1 - rows.0))
    }
}

/// Reduce along `axis` tile by tile
pub fn reduce(
    program: &Program,
    reducer: &Reducer,
    binding: &Binding,
    axis: Axis,
    plan: &Plan,
    parallel: bool,
) -> Array2<f64> {
    let (outer, inner) = binding.extents(axis);
    let tile_rows = plan.tile_rows.max(1);
    let mut fixed = program.scratch();
    program.eval_fixed(binding, &mut fixed);
    let tiles = Tiles {
        program,
        reducer,
        binding,
        fixed,
        inner,
        tile_cols: plan.tile_cols.max(1),
        parallel,
    };

    let starts: Vec<usize> = (0..outer).step_by(tile_rows).collect();
    let band = |&r: &usize| tiles.band((r, (r + tile_rows).min(outer)));
    let bands: Vec<Vec<f64>> = if parallel {
        starts.par_iter().map(band).collect()
    } else {
        starts.iter().map(band).collect()
    };

    let width = reducer.state_width();
    let mut out = Array2::zeros((outer, reducer.dim()));
    for (states, mut chunk) in bands.iter().zip(out.axis_chunks_iter_mut(NdAxis(0), tile_rows)) {
        for (state, row) in states.chunks(width).zip(chunk.rows_mut()) {
            write_lane(row, |out| reducer.finish(state, out));
        }
    }
    out
}
