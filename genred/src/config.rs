//! Planner configuration

/// Tuning knobs of the [crate::Planner]
///
/// Every field can be overridden from the environment, see [PlannerConfig::from_env].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerConfig {
    /// `auto` picks the dense backend below this many `(i, j)` pairs
    pub dense_threshold: usize,
    /// Output rows per tile
    pub tile_rows: usize,
    /// Reduced rows per tile
    pub tile_cols: usize,
    /// Tiles are never shrunk below this extent to fit the memory budget
    pub min_tile: usize,
    /// Upper bound of the working set of one tile in bytes
    pub memory_budget: Option<usize>,
    /// Evaluate tiles on the rayon thread pool
    pub parallel: bool,
    /// Plans kept by the [crate::Planner], the oldest is evicted first
    pub cache_capacity: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            dense_threshold: 16384,
            tile_rows: 256,
            tile_cols: 1024,
            min_tile: 16,
            memory_budget: None,
            parallel: true,
            cache_capacity: 4096,
        }
    }
}

fn parse_usize(key: &str, raw: &str) -> Option<usize> {
    match raw.trim().parse::<usize>() {
        Ok(v) if v > 0 => Some(v),
        _ => {
            log::debug!("Ignore {}={:?}, expected a positive integer", key, raw);
            None
        }
    }
}

impl PlannerConfig {
    /// Default configuration overridden by `GENRED_*` environment variables
    ///
    /// | variable | field |
    /// |---|---|
    /// | `GENRED_DENSE_THRESHOLD` | `dense_threshold` |
    /// | `GENRED_TILE_ROWS` | `tile_rows` |
    /// | `GENRED_TILE_COLS` | `tile_cols` |
    /// | `GENRED_MIN_TILE` | `min_tile` |
    /// | `GENRED_MEMORY_BUDGET` | `memory_budget`, in bytes |
    /// | `GENRED_PLAN_CACHE` | `cache_capacity` |
    /// | `GENRED_SEQUENTIAL` | `parallel = false` when set to `1` or `true` |
    ///
    /// Malformed values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| lookup(key).and_then(|raw| parse_usize(key, &raw));
        let mut config = PlannerConfig::default();
        if let Some(v) = read("GENRED_DENSE_THRESHOLD") {
            config.dense_threshold = v;
        }
        if let Some(v) = read("GENRED_TILE_ROWS") {
            config.tile_rows = v;
        }
        if let Some(v) = read("GENRED_TILE_COLS") {
            config.tile_cols = v;
        }
        if let Some(v) = read("GENRED_MIN_TILE") {
            config.min_tile = v;
        }
        if let Some(v) = read("GENRED_MEMORY_BUDGET") {
            config.memory_budget = Some(v);
        }
        if let Some(v) = read("GENRED_PLAN_CACHE") {
            config.cache_capacity = v;
        }
        if let Some(raw) = lookup("GENRED_SEQUENTIAL") {
            match raw.trim() {
                "1" | "true" => config.parallel = false,
                "0" | "false" | "" => {}
                _ => log::debug!("Ignore GENRED_SEQUENTIAL={:?}", raw),
            }
        }
        config
    }
}
