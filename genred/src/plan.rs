//! Reduction planner
//!
//! Selects how the `(i, j)` grid is traversed. A plan is a pure function of
//! the formula, the extents and the requested backend, so it is cached.

use crate::config::PlannerConfig;
use genred_formula::{Error, Result};
use parking_lot::RwLock;
use std::{
    collections::{HashMap, VecDeque},
    fmt,
    str::FromStr,
};

/// Backend requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Dense for small grids, double tiling otherwise
    Auto,
    Dense,
    RowTiled,
    ColTiled,
    DoubleTiled,
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Auto => "auto",
            Backend::Dense => "dense",
            Backend::RowTiled => "row-tiled",
            Backend::ColTiled => "col-tiled",
            Backend::DoubleTiled => "double-tiled",
        }
    }
}

impl FromStr for Backend {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(Backend::Auto),
            "dense" => Ok(Backend::Dense),
            "row-tiled" => Ok(Backend::RowTiled),
            "col-tiled" => Ok(Backend::ColTiled),
            "double-tiled" => Ok(Backend::DoubleTiled),
            _ => Err(Error::UnsupportedBackend(s.to_string())),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Execution strategy actually used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Materialize the whole grid with ndarray broadcasting
    Dense,
    /// Tiles of output rows, each running over the full reduced axis
    RowTiled,
    /// One band of all output rows, tiled along the reduced axis
    ColTiled,
    /// Tiled along both axes
    DoubleTiled,
}

impl Strategy {
    fn tiles_rows(self) -> bool {
        matches!(self, Strategy::RowTiled | Strategy::DoubleTiled)
    }

    fn tiles_cols(self) -> bool {
        matches!(self, Strategy::ColTiled | Strategy::DoubleTiled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Plan {
    pub strategy: Strategy,
    /// Output rows per tile
    pub tile_rows: usize,
    /// Reduced indices per tile
    pub tile_cols: usize,
}

/// Sizes of one reduction call, as seen by the planner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Workload {
    /// Output rows
    pub outer: usize,
    /// Length of the reduced axis
    pub inner: usize,
    /// Output dimension
    pub dim: usize,
    /// Floats loaded per output row
    pub outer_width: usize,
    /// Floats loaded per reduced index
    pub inner_width: usize,
    /// Floats of reduction state per output row
    pub state_width: usize,
    /// Floats of scratch per worker
    pub scratch_width: usize,
}

impl Workload {
    /// Bytes touched by a tile of `rows x cols`
    pub fn working_set(&self, rows: usize, cols: usize) -> usize {
        8 * (rows * (self.outer_width + self.state_width)
            + cols * self.inner_width
            + self.scratch_width)
    }

    /// Bytes of the fully materialized grid
    pub fn dense_size(&self) -> usize {
        8 * self
            .outer
            .saturating_mul(self.inner)
            .saturating_mul(self.scratch_width)
    }
}

/// Choose the strategy and tile sizes for a workload
pub fn select(config: &PlannerConfig, w: &Workload, backend: Backend) -> Result<Plan> {
    let pairs = w.outer.saturating_mul(w.inner);
    let strategy = match backend {
        Backend::Auto => {
            let fits = config
                .memory_budget
                .map_or(true, |budget| w.dense_size() <= budget);
            if pairs < config.dense_threshold && fits {
                Strategy::Dense
            } else {
                Strategy::DoubleTiled
            }
        }
        Backend::Dense => Strategy::Dense,
        Backend::RowTiled => Strategy::RowTiled,
        Backend::ColTiled => Strategy::ColTiled,
        Backend::DoubleTiled => Strategy::DoubleTiled,
    };

    let outer = w.outer.max(1);
    let inner = w.inner.max(1);
    let mut rows = if strategy.tiles_rows() {
        config.tile_rows.clamp(1, outer)
    } else {
        outer
    };
    let mut cols = if strategy.tiles_cols() {
        config.tile_cols.clamp(1, inner)
    } else {
        inner
    };

    // the dense path is the explicit fallback and is never shrunk
    if let (Some(budget), false) = (config.memory_budget, strategy == Strategy::Dense) {
        let floor_rows = config.min_tile.clamp(1, outer);
        let floor_cols = config.min_tile.clamp(1, inner);
        loop {
            let required = w.working_set(rows, cols);
            if required <= budget {
                break;
            }
            let shrink_rows = strategy.tiles_rows() && rows > floor_rows;
            let shrink_cols = strategy.tiles_cols() && cols > floor_cols;
            match (shrink_rows, shrink_cols) {
                (true, true) if rows >= cols => rows = (rows / 2).max(floor_rows),
                (true, true) | (false, true) => cols = (cols / 2).max(floor_cols),
                (true, false) => rows = (rows / 2).max(floor_rows),
                (false, false) => return Err(Error::TileTooSmall { budget, required }),
            }
        }
    }

    Ok(Plan {
        strategy,
        tile_rows: rows,
        tile_cols: cols,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PlanKey {
    formula: u64,
    outer: usize,
    inner: usize,
    dim: usize,
    backend: Backend,
}

#[derive(Debug, Default)]
struct PlanCache {
    plans: HashMap<PlanKey, Plan>,
    // insertion order, oldest first
    order: VecDeque<PlanKey>,
}

impl PlanCache {
    fn insert(&mut self, key: PlanKey, plan: Plan, capacity: usize) {
        if self.plans.insert(key, plan).is_some() {
            return;
        }
        self.order.push_back(key);
        while self.plans.len() > capacity.max(1) {
            match self.order.pop_front() {
                Some(old) => {
                    self.plans.remove(&old);
                }
                None => break,
            }
        }
    }

    fn clear(&mut self) {
        self.plans.clear();
        self.order.clear();
    }
}

/// Planner with a bounded cache of the plans it has selected
///
/// Shared between threads; concurrent misses on one key compute the same
/// plan and the last insert wins. At most
/// [PlannerConfig::cache_capacity] plans are kept.
#[derive(Debug, Default)]
pub struct Planner {
    config: PlannerConfig,
    cache: RwLock<PlanCache>,
}

impl Planner {
    pub fn new(config: PlannerConfig) -> Self {
        Planner {
            config,
            cache: RwLock::new(PlanCache::default()),
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Plan for the formula identified by `formula_id`, see [genred_formula::Formula::id]
    pub fn plan(&self, formula_id: u64, w: &Workload, backend: Backend) -> Result<Plan> {
        let key = PlanKey {
            formula: formula_id,
            outer: w.outer,
            inner: w.inner,
            dim: w.dim,
            backend,
        };
        if let Some(plan) = self.cache.read().plans.get(&key) {
            log::trace!("Plan cache hit for {:016x}", formula_id);
            return Ok(*plan);
        }
        let plan = select(&self.config, w, backend)?;
        log::debug!(
            "Plan for {:016x} ({} x {}, {}): {:?}",
            formula_id,
            w.outer,
            w.inner,
            backend,
            plan
        );
        self.cache
            .write()
            .insert(key, plan, self.config.cache_capacity);
        Ok(plan)
    }

    /// Number of cached plans
    pub fn cached(&self) -> usize {
        self.cache.read().plans.len()
    }

    pub fn clear(&self) {
        self.cache.write().clear()
    }
}
