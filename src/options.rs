use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// How the pivotal row is priced into the tableau row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PriceStrategy {
    /// Always price column-wise.
    Col,
    /// Always price row-wise with a sparse result.
    Row,
    /// Price row-wise, switching to a dense result when it fills in.
    RowSwitch,
    /// Price row-wise with a switch, but go column-wise outright for dense
    /// operands.
    RowSwitchColSwitch,
}

/// Options consumed by the solver.
#[derive(Clone, Debug)]
pub struct Options {
    /// A basic value further than this outside its bounds counts as a
    /// primal infeasibility.
    pub primal_feasibility_tolerance: f64,
    /// A reduced cost more attractive than this counts as a dual
    /// infeasibility.
    pub dual_feasibility_tolerance: f64,
    /// Permit bound shifts to absorb an infeasible entering value in
    /// phase 2. Shifts are removed again on clean-up.
    pub allow_bound_perturbation: bool,
    /// Shift bounds of basic variables that have drifted slightly outside
    /// them when recomputing primal values. Off by default; the drift scan
    /// itself always runs.
    pub use_primal_correction: bool,
    /// Number of factor updates after which a refactorization is forced.
    pub update_limit: usize,
    /// Simplex iteration limit; exceeding it bails out with a warning.
    pub iteration_limit: usize,
    /// Wall-clock limit; exceeding it bails out with a warning.
    pub time_limit: Option<Duration>,
    /// Cooperative stop flag checked together with the limits above.
    pub stop: Option<Arc<AtomicBool>>,
    pub price_strategy: PriceStrategy,
    /// 0 = cheap checks only, 1 = cross-check derived quantities,
    /// 2 = expensive invariant verification.
    pub debug_level: u8,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            primal_feasibility_tolerance: 1e-7,
            dual_feasibility_tolerance: 1e-7,
            allow_bound_perturbation: true,
            use_primal_correction: false,
            update_limit: 5000,
            iteration_limit: usize::MAX,
            time_limit: None,
            stop: None,
            price_strategy: PriceStrategy::RowSwitchColSwitch,
            debug_level: 1,
        }
    }
}
