//! The primal revised simplex engine.
//!
//! A two-phase, rebuild-driven iteration over an exclusively-owned
//! [`SimplexInstance`]. Each inner iteration composes column choice
//! (CHUZC) -> FTRAN -> row choice (CHUZR) -> bound-swap-or-pivot ->
//! update; a rebuild restores every derived quantity from scratch
//! whenever an iteration records a reason to.
//!
//! Phase 1 minimises the sum of primal infeasibilities under +/-1 costs
//! and propagates the cost changes of basic variables crossing their
//! bounds into the duals. Phase 2 minimises the true objective with
//! Devex-weighted pricing, a two-pass Harris ratio test, bound flips, and
//! optional bound perturbation to absorb an infeasible entering value.
//! Column choice in phase 2 is hyper-sparse: a bounded candidate heap is
//! maintained across iterations from the dual-change footprint of each
//! pivot, with a scalar bound on everything outside the heap proving the
//! chosen candidate optimal.
//!
//! No routine here aborts. Failures are recorded in the solve phase or
//! the rebuild reason and inspected by the outer loop.

use log::{debug, error, info, warn};

use crate::heap::{add_to_decreasing_heap, max_heap_sort, sort_decreasing_heap};
use crate::indexed_set::IndexedSet;
use crate::simplex_instance::SimplexInstance;
use crate::sparse_vector::{sparse_loop_style, SparseVector};
use crate::status::{ModelStatus, RebuildReason, SolvePhase, SolveStatus};

/// Capacity of the hyper-sparse CHUZC candidate heap.
const MAX_HYPER_CHUZC_CANDIDATES: usize = 16;

/// An entering column whose stored weight exceeds this multiple of its
/// freshly computed pivot weight counts as a bad weight.
const BAD_DEVEX_WEIGHT_FACTOR: f64 = 3.0;

/// Bad weights tolerated before the reference framework is rebuilt.
const ALLOWED_NUM_BAD_DEVEX_WEIGHT: usize = 3;

/// Relative column/row pivot disagreement that triggers a precautionary
/// refactorization, and the level at which the pivot is rejected outright.
const NUMERICAL_TROUBLE_TOLERANCE: f64 = 1e-7;
const HARD_NUMERICAL_TROUBLE_TOLERANCE: f64 = 1e-3;

pub struct PrimalSimplex {
    num_col: usize,
    num_row: usize,
    num_tot: usize,
    primal_feasibility_tolerance: f64,
    dual_feasibility_tolerance: f64,

    pub(crate) solve_phase: SolvePhase,
    pub(crate) rebuild_reason: RebuildReason,

    // working vectors, reused across iterations
    pub(crate) col_aq: SparseVector,
    pub(crate) row_ep: SparseVector,
    pub(crate) row_ap: SparseVector,
    col_basic_feasibility_change: SparseVector,
    row_basic_feasibility_change: SparseVector,

    // phase-1 ratio-test break points, (theta, encoded row) pairs; an
    // encoded row r >= 0 means the row moves toward its upper bound,
    // r - num_row means toward its lower bound
    ph1_sorter_r_theta: Vec<f64>,
    ph1_sorter_r_index: Vec<isize>,
    ph1_sorter_t_theta: Vec<f64>,
    ph1_sorter_t_index: Vec<isize>,

    // Devex reference-set weights
    pub(crate) devex_weight: Vec<f64>,
    pub(crate) devex_index: Vec<u8>,
    num_devex_iterations: usize,
    num_bad_devex_weight: usize,

    // records of the current iteration
    pub(crate) variable_in: Option<usize>,
    pub(crate) variable_out: Option<usize>,
    pub(crate) row_out: Option<usize>,
    pub(crate) move_in: i8,
    pub(crate) move_out: i8,
    pub(crate) theta_dual: f64,
    pub(crate) theta_primal: f64,
    pub(crate) value_in: f64,
    alpha_col: f64,
    alpha_row: f64,
    numerical_trouble: f64,
    pub(crate) num_flip_since_rebuild: usize,

    // hyper-sparse CHUZC state
    use_hyper_chuzc: bool,
    initialise_hyper_chuzc: bool,
    done_next_chuzc: bool,
    num_hyper_chuzc_candidates: usize,
    hyper_chuzc_measure: Vec<f64>,
    hyper_chuzc_candidate: Vec<usize>,
    max_hyper_chuzc_non_candidate_measure: f64,
    max_changed_measure_value: f64,
    max_changed_measure_column: Option<usize>,

    num_free_col: usize,
    nonbasic_free_col_set: IndexedSet,

    // long-lived diagnostic maxima, reported when they grow
    max_max_local_primal_infeasibility: f64,
    max_max_primal_correction: f64,
    max_max_correction_primal_infeasibility: f64,
}

impl PrimalSimplex {
    pub fn new(ekk: &SimplexInstance) -> PrimalSimplex {
        let num_col = ekk.num_col;
        let num_row = ekk.num_row;
        let num_tot = ekk.num_tot;
        let mut engine = PrimalSimplex {
            num_col,
            num_row,
            num_tot,
            primal_feasibility_tolerance: ekk.options.primal_feasibility_tolerance,
            dual_feasibility_tolerance: ekk.options.dual_feasibility_tolerance,
            solve_phase: SolvePhase::Unknown,
            rebuild_reason: RebuildReason::No,
            col_aq: SparseVector::new(num_row),
            row_ep: SparseVector::new(num_row),
            row_ap: SparseVector::new(num_col),
            col_basic_feasibility_change: SparseVector::new(num_row),
            row_basic_feasibility_change: SparseVector::new(num_col),
            ph1_sorter_r_theta: Vec::with_capacity(2 * num_row),
            ph1_sorter_r_index: Vec::with_capacity(2 * num_row),
            ph1_sorter_t_theta: Vec::with_capacity(2 * num_row),
            ph1_sorter_t_index: Vec::with_capacity(2 * num_row),
            devex_weight: vec![1.0; num_tot],
            devex_index: vec![0; num_tot],
            num_devex_iterations: 0,
            num_bad_devex_weight: 0,
            variable_in: None,
            variable_out: None,
            row_out: None,
            move_in: 0,
            move_out: 0,
            theta_dual: 0.0,
            theta_primal: 0.0,
            value_in: 0.0,
            alpha_col: 0.0,
            alpha_row: 0.0,
            numerical_trouble: 0.0,
            num_flip_since_rebuild: 0,
            use_hyper_chuzc: false,
            initialise_hyper_chuzc: false,
            done_next_chuzc: false,
            num_hyper_chuzc_candidates: 0,
            hyper_chuzc_measure: vec![0.0; MAX_HYPER_CHUZC_CANDIDATES],
            hyper_chuzc_candidate: vec![0; MAX_HYPER_CHUZC_CANDIDATES],
            max_hyper_chuzc_non_candidate_measure: -1.0,
            max_changed_measure_value: 0.0,
            max_changed_measure_column: None,
            num_free_col: 0,
            nonbasic_free_col_set: IndexedSet::new(num_tot),
            max_max_local_primal_infeasibility: 0.0,
            max_max_primal_correction: 0.0,
            max_max_correction_primal_infeasibility: 0.0,
        };
        engine.reset_devex(ekk);
        engine
    }

    /// Run the two-phase primal simplex on `ekk`, which must carry a
    /// fresh basis factorization. The model classification lands in
    /// `ekk.model_status`.
    pub fn solve(&mut self, ekk: &mut SimplexInstance) -> SolveStatus {
        self.initialise(ekk);
        if self.num_row == 0 {
            error!("primal simplex called for a problem without constraints");
            return self.return_from_solve(ekk, SolveStatus::Error);
        }
        if ekk.bailout_on_time_iterations() {
            return self.return_from_solve(ekk, SolveStatus::Warning);
        }
        if !ekk.allow_bound_perturbation {
            debug!("primal simplex not using bound perturbation");
        }
        if !ekk.has_invert {
            error!("primal simplex called without a basis factorization");
            return self.return_from_solve(ekk, SolveStatus::Error);
        }

        self.get_nonbasic_free_column_set(ekk);

        ekk.compute_primal();
        ekk.compute_simplex_primal_infeasible();
        self.solve_phase = if ekk.num_primal_infeasibility > 0 {
            SolvePhase::Phase1
        } else {
            SolvePhase::Phase2
        };

        if !self.debug_primal_simplex(ekk, "at solve entry") {
            return self.return_from_solve(ekk, SolveStatus::Error);
        }

        // the major solving loop
        loop {
            let it0 = ekk.iteration_count;
            ekk.has_primal_objective_value = false;
            if self.solve_phase == SolvePhase::Unknown {
                // reset the phase-2 bounds so that the true number of
                // primal infeasibilities determines the phase
                ekk.initialise_bound();
                ekk.compute_simplex_primal_infeasible();
                self.solve_phase = if ekk.num_primal_infeasibility > 0 {
                    SolvePhase::Phase1
                } else {
                    SolvePhase::Phase2
                };
            }
            match self.solve_phase {
                SolvePhase::Phase1 => {
                    self.solve_phase1(ekk);
                    ekk.primal_phase1_iteration_count += ekk.iteration_count - it0;
                }
                SolvePhase::Phase2 => {
                    self.solve_phase2(ekk);
                    ekk.primal_phase2_iteration_count += ekk.iteration_count - it0;
                }
                _ => {
                    ekk.model_status = ModelStatus::SolveError;
                    return self.return_from_solve(ekk, SolveStatus::Error);
                }
            }
            if ekk.solve_bailout {
                return self.return_from_solve(ekk, SolveStatus::Warning);
            }
            match self.solve_phase {
                SolvePhase::Error => {
                    ekk.model_status = ModelStatus::SolveError;
                    return self.return_from_solve(ekk, SolveStatus::Error);
                }
                SolvePhase::Exit => {
                    // classified as infeasible or unbounded
                    debug_assert!(matches!(
                        ekk.model_status,
                        ModelStatus::PrimalDualInfeasible
                            | ModelStatus::PrimalInfeasible
                            | ModelStatus::PrimalUnbounded
                    ));
                    break;
                }
                SolvePhase::Phase1 if ekk.model_status == ModelStatus::DualInfeasible => {
                    // primal infeasibilities after phase 2 for a problem
                    // already known to be dual infeasible
                    break;
                }
                SolvePhase::Cleanup => {
                    // dual feasible with primal infeasibilities after the
                    // shifts came off; a dual clean-up takes over
                    break;
                }
                SolvePhase::Optimal => break,
                _ => {}
            }
        }
        debug_assert!(!ekk.solve_bailout);
        if self.solve_phase == SolvePhase::Optimal {
            ekk.model_status = ModelStatus::Optimal;
        }
        if !self.debug_primal_simplex(ekk, "at solve exit") {
            return self.return_from_solve(ekk, SolveStatus::Error);
        }
        self.return_from_solve(ekk, SolveStatus::Ok)
    }

    fn initialise(&mut self, ekk: &mut SimplexInstance) {
        self.rebuild_reason = RebuildReason::No;
        self.solve_phase = SolvePhase::Unknown;
        ekk.model_status = ModelStatus::NotSet;
        ekk.solve_bailout = false;
        ekk.start_solve_clock();
        ekk.has_primal_objective_value = false;
        ekk.has_dual_objective_value = false;

        self.col_aq.clear();
        self.row_ep.clear();
        self.row_ap.clear();
        self.col_basic_feasibility_change.clear();
        self.row_basic_feasibility_change.clear();

        self.variable_in = None;
        self.variable_out = None;
        self.row_out = None;
        self.num_flip_since_rebuild = 0;
        self.use_hyper_chuzc = false;
        self.reset_devex(ekk);

        self.max_max_local_primal_infeasibility = 0.0;
        self.max_max_primal_correction = 0.0;
        self.max_max_correction_primal_infeasibility = 0.0;

        self.num_free_col = 0;
        for j in 0..self.num_tot {
            if ekk.work_lower[j] == f64::NEG_INFINITY && ekk.work_upper[j] == f64::INFINITY {
                self.num_free_col += 1;
            }
        }
        if self.num_free_col > 0 {
            info!("problem has {} free columns", self.num_free_col);
        }
    }

    fn return_from_solve(&self, ekk: &SimplexInstance, status: SolveStatus) -> SolveStatus {
        debug!(
            "primal simplex finished: status {}, model status {}, {} iterations \
             ({} in phase 1, {} in phase 2, {} flips)",
            status,
            ekk.model_status,
            ekk.iteration_count,
            ekk.primal_phase1_iteration_count,
            ekk.primal_phase2_iteration_count,
            ekk.num_bound_swap
        );
        status
    }

    fn solve_phase1(&mut self, ekk: &mut SimplexInstance) {
        ekk.has_primal_objective_value = false;
        ekk.has_dual_objective_value = false;
        if ekk.bailout_return() {
            return;
        }
        debug!("primal-phase1-start");
        loop {
            self.rebuild(ekk);
            if self.solve_phase == SolvePhase::Error {
                return;
            }
            if ekk.bailout_on_time_iterations() {
                return;
            }
            debug_assert!(self.solve_phase.is_solving());
            // no primal infeasibilities were found in the rebuild
            if self.solve_phase == SolvePhase::Phase2 {
                break;
            }
            loop {
                self.iterate(ekk);
                if ekk.bailout_on_time_iterations() {
                    return;
                }
                if self.solve_phase == SolvePhase::Error {
                    return;
                }
                debug_assert_eq!(self.solve_phase, SolvePhase::Phase1);
                if self.rebuild_reason.is_set() {
                    break;
                }
            }
            // with data fresh from a rebuild and no flips since, whatever
            // stopped the inner loop is conclusive
            if ekk.has_fresh_rebuild && self.num_flip_since_rebuild == 0 {
                break;
            }
        }
        debug_assert!(!ekk.solve_bailout);
        if !self.debug_primal_simplex(ekk, "at end of phase 1") {
            self.solve_phase = SolvePhase::Error;
            return;
        }
        if self.variable_in.is_none() && self.solve_phase == SolvePhase::Phase1 {
            // optimal in phase 1 with primal infeasibilities remaining
            debug_assert!(ekk.num_primal_infeasibility > 0);
            ekk.model_status = ModelStatus::PrimalInfeasible;
            self.solve_phase = SolvePhase::Exit;
        }
    }

    fn solve_phase2(&mut self, ekk: &mut SimplexInstance) {
        ekk.has_primal_objective_value = false;
        ekk.has_dual_objective_value = false;
        if ekk.bailout_return() {
            return;
        }
        debug!("primal-phase2-start");
        self.max_max_local_primal_infeasibility = 0.0;
        loop {
            self.rebuild(ekk);
            if self.solve_phase == SolvePhase::Error {
                return;
            }
            if ekk.bailout_on_time_iterations() {
                return;
            }
            debug_assert!(self.solve_phase.is_solving());
            // primal infeasibilities were found in the rebuild
            if self.solve_phase == SolvePhase::Phase1 {
                break;
            }
            loop {
                self.iterate(ekk);
                if ekk.bailout_on_time_iterations() {
                    return;
                }
                if self.solve_phase == SolvePhase::Error {
                    return;
                }
                debug_assert_eq!(self.solve_phase, SolvePhase::Phase2);
                if self.rebuild_reason.is_set() {
                    break;
                }
            }
            if ekk.has_fresh_rebuild && self.num_flip_since_rebuild == 0 {
                break;
            }
        }
        debug_assert!(!ekk.solve_bailout);
        if !self.debug_primal_simplex(ekk, "at end of phase 2") {
            self.solve_phase = SolvePhase::Error;
            return;
        }
        if self.solve_phase == SolvePhase::Phase1 {
            debug!("primal-return-phase1");
        } else if self.variable_in.is_none() {
            // no candidate in CHUZC even after a rebuild, so probably
            // optimal; remove any bound perturbation and check
            debug!("primal-phase-2-optimal");
            self.cleanup(ekk);
            if ekk.num_primal_infeasibility > 0 {
                self.solve_phase = SolvePhase::Cleanup;
            } else {
                self.solve_phase = SolvePhase::Optimal;
                debug!("problem-optimal");
                ekk.model_status = ModelStatus::Optimal;
                ekk.compute_dual_objective_value();
                debug!(
                    "objective {} with dual objective {}",
                    ekk.primal_objective_value, ekk.dual_objective_value
                );
            }
        } else {
            debug_assert!(self.row_out.is_none());
            // there is a candidate but no leaving row: an unbounded ray,
            // unless perturbed bounds manufactured it
            debug!("primal-phase-2-unbounded");
            if ekk.bounds_perturbed {
                self.cleanup(ekk);
            } else {
                self.solve_phase = SolvePhase::Exit;
                if ekk.model_status == ModelStatus::PrimalInfeasible {
                    debug!("problem-primal-dual-infeasible");
                    ekk.model_status = ModelStatus::PrimalDualInfeasible;
                } else {
                    debug_assert_eq!(ekk.model_status, ModelStatus::NotSet);
                    debug!("problem-primal-unbounded");
                    ekk.model_status = ModelStatus::PrimalUnbounded;
                }
                ekk.model_status = ModelStatus::PrimalUnbounded;
            }
        }
    }

    /// Remove bound perturbations, forbid further ones, and recompute the
    /// primal state against the restored bounds.
    fn cleanup(&mut self, ekk: &mut SimplexInstance) {
        debug!("primal-cleanup-shift");
        ekk.initialise_bound();
        ekk.initialise_nonbasic_work_value();
        ekk.allow_bound_perturbation = false;
        ekk.bounds_perturbed = false;
        ekk.compute_primal();
        ekk.compute_simplex_primal_infeasible();
        ekk.compute_primal_objective_value();
        ekk.updated_primal_objective_value = ekk.primal_objective_value;
        ekk.compute_simplex_dual_infeasible();
        self.report_rebuild(ekk, RebuildReason::No);
    }

    /// Restore every derived quantity from scratch: refactorize if there
    /// were updates, recompute primal and dual values, settle the phase,
    /// and correct the updated objective value.
    pub(crate) fn rebuild(&mut self, ekk: &mut SimplexInstance) {
        // once the objective value is known, the updated value must agree
        // with the recomputed one after correction
        let check_updated_objective_value = ekk.has_primal_objective_value;
        let previous_primal_objective_value = ekk.updated_primal_objective_value;

        let reason_for_rebuild = self.rebuild_reason;
        self.rebuild_reason = RebuildReason::No;

        if ekk.update_count > 0 {
            let rank_deficiency = ekk.compute_factor();
            if rank_deficiency > 0 {
                error!("primal rebuild: singular basis matrix");
                self.solve_phase = SolvePhase::Error;
                return;
            }
            ekk.update_count = 0;
        }
        ekk.compute_primal();
        if self.solve_phase == SolvePhase::Phase2 {
            self.phase2_correct_primal(ekk);
        }
        if !self.get_basic_primal_infeasibility(ekk) {
            self.solve_phase = SolvePhase::Error;
            return;
        }
        if ekk.num_primal_infeasibility > 0 {
            // primal infeasibilities, so should be in phase 1
            if self.solve_phase == SolvePhase::Phase2 {
                warn!("primal rebuild switching back to phase 1 from phase 2");
                self.solve_phase = SolvePhase::Phase1;
            }
            self.phase1_compute_dual(ekk);
        } else {
            // no primal infeasibilities, so in phase 2; reset the costs if
            // phase 1 had installed its own
            if self.solve_phase == SolvePhase::Phase1 {
                ekk.initialise_cost();
                self.solve_phase = SolvePhase::Phase2;
            }
            ekk.compute_dual();
        }
        ekk.compute_simplex_dual_infeasible();
        ekk.compute_primal_objective_value();
        if check_updated_objective_value {
            let correction = ekk.primal_objective_value - previous_primal_objective_value;
            ekk.updated_primal_objective_value += correction;
        }
        ekk.updated_primal_objective_value = ekk.primal_objective_value;

        self.report_rebuild(ekk, reason_for_rebuild);

        ekk.build_synthetic_tick = ekk.factor.build_synthetic_tick;
        ekk.total_synthetic_tick = 0.0;

        self.use_hyper_chuzc = self.solve_phase == SolvePhase::Phase2;
        self.hyper_choose_column_clear();

        self.num_flip_since_rebuild = 0;
        ekk.has_fresh_rebuild = true;
        debug_assert!(self.solve_phase.is_solving());
    }

    fn iterate(&mut self, ekk: &mut SimplexInstance) {
        if !self.debug_primal_simplex(ekk, "before iteration") {
            self.solve_phase = SolvePhase::Error;
            return;
        }

        self.chuzc(ekk);
        if self.solve_phase == SolvePhase::Error {
            return;
        }
        let Some(variable_in) = self.variable_in else {
            self.rebuild_reason = RebuildReason::PossiblyOptimal;
            return;
        };

        // FTRAN, with a cross-check of the updated dual value
        self.assess_variable_in(ekk, variable_in);
        if self.solve_phase == SolvePhase::Error {
            return;
        }

        if self.solve_phase == SolvePhase::Phase1 {
            self.phase1_choose_row(ekk);
            if self.row_out.is_none() {
                error!("primal phase 1 choose row failed");
                self.solve_phase = SolvePhase::Error;
                return;
            }
        } else {
            self.choose_row(ekk);
        }
        debug_assert!(!self.rebuild_reason.is_set());

        // a bound swap may be shorter than the pivoting step; in phase 2
        // having neither is a sign of unboundedness
        self.consider_bound_swap(ekk, variable_in);
        if self.rebuild_reason == RebuildReason::PossiblyPrimalUnbounded {
            return;
        }
        debug_assert!(!self.rebuild_reason.is_set());

        if self.row_out.is_some() {
            // unit BTRAN and PRICE for the pivotal row, with a numerical
            // check of the pivot from both sides
            self.assess_pivot(ekk, variable_in);
            if self.solve_phase == SolvePhase::Error {
                return;
            }
            if self.rebuild_reason.is_set() {
                debug_assert_eq!(self.rebuild_reason, RebuildReason::PossiblySingularBasis);
                return;
            }
        }

        self.update(ekk, variable_in);
        // force a rebuild once phase 1 has run out of infeasibilities
        if ekk.num_primal_infeasibility == 0 && self.solve_phase == SolvePhase::Phase1 {
            self.rebuild_reason = RebuildReason::UpdateLimitReached;
        }

        debug_assert!(matches!(
            self.rebuild_reason,
            RebuildReason::No
                | RebuildReason::PrimalInfeasibleInPrimalSimplex
                | RebuildReason::SyntheticClockSaysInvert
                | RebuildReason::UpdateLimitReached
        ));
        debug_assert!(self.solve_phase.is_solving());
    }

    fn chuzc(&mut self, ekk: &mut SimplexInstance) {
        if self.done_next_chuzc {
            debug_assert!(self.use_hyper_chuzc);
        }
        if self.use_hyper_chuzc {
            if !self.done_next_chuzc {
                self.choose_column(ekk, true);
            }
            if ekk.options.debug_level >= 1 {
                // check the hyper-sparse choice against a full scan; the
                // Devex measures must coincide exactly
                let hyper_sparse_variable_in = self.variable_in;
                self.choose_column(ekk, false);
                let hyper_sparse_measure = hyper_sparse_variable_in
                    .map(|v| ekk.work_dual[v].abs() / self.devex_weight[v])
                    .unwrap_or(0.0);
                let measure = self
                    .variable_in
                    .map(|v| ekk.work_dual[v].abs() / self.devex_weight[v])
                    .unwrap_or(0.0);
                if hyper_sparse_measure != measure {
                    error!(
                        "iteration {}: hyper-sparse CHUZC measure {} != {} = full CHUZC measure ({:?}, {:?})",
                        ekk.iteration_count,
                        hyper_sparse_measure,
                        measure,
                        hyper_sparse_variable_in,
                        self.variable_in
                    );
                    self.solve_phase = SolvePhase::Error;
                    return;
                }
                self.variable_in = hyper_sparse_variable_in;
            }
        } else {
            self.choose_column(ekk, false);
        }
    }

    fn choose_column(&mut self, ekk: &SimplexInstance, hyper_sparse: bool) {
        debug_assert!(!hyper_sparse || !self.done_next_chuzc);
        let mut best_measure = 0.0;
        self.variable_in = None;

        if hyper_sparse {
            if !self.initialise_hyper_chuzc {
                self.hyper_choose_column(ekk);
            }
            if self.initialise_hyper_chuzc {
                self.num_hyper_chuzc_candidates = 0;
                // nonbasic free columns first, so they get priority
                for k in 0..self.nonbasic_free_col_set.count() {
                    let column = self.nonbasic_free_col_set.entry()[k];
                    let dual_infeasibility = ekk.work_dual[column].abs();
                    if dual_infeasibility > self.dual_feasibility_tolerance {
                        let measure = dual_infeasibility / self.devex_weight[column];
                        add_to_decreasing_heap(
                            &mut self.num_hyper_chuzc_candidates,
                            MAX_HYPER_CHUZC_CANDIDATES,
                            &mut self.hyper_chuzc_measure,
                            &mut self.hyper_chuzc_candidate,
                            measure,
                            column,
                        );
                    }
                }
                for column in 0..self.num_tot {
                    let dual_infeasibility =
                        -f64::from(ekk.nonbasic_move[column]) * ekk.work_dual[column];
                    if dual_infeasibility > self.dual_feasibility_tolerance {
                        let measure = dual_infeasibility / self.devex_weight[column];
                        add_to_decreasing_heap(
                            &mut self.num_hyper_chuzc_candidates,
                            MAX_HYPER_CHUZC_CANDIDATES,
                            &mut self.hyper_chuzc_measure,
                            &mut self.hyper_chuzc_candidate,
                            measure,
                            column,
                        );
                    }
                }
                sort_decreasing_heap(
                    self.num_hyper_chuzc_candidates,
                    &mut self.hyper_chuzc_measure,
                    &mut self.hyper_chuzc_candidate,
                );
                self.initialise_hyper_chuzc = false;
                if self.num_hyper_chuzc_candidates > 0 {
                    self.variable_in = Some(self.hyper_chuzc_candidate[0]);
                    best_measure = self.hyper_chuzc_measure[0];
                    self.max_hyper_chuzc_non_candidate_measure =
                        self.hyper_chuzc_measure[self.num_hyper_chuzc_candidates - 1];
                    debug!(
                        "full CHUZC: max measure is {} for column {:?}, and max non-candidate measure of {}",
                        best_measure, self.variable_in, self.max_hyper_chuzc_non_candidate_measure
                    );
                }
            }
        } else {
            // any attractive nonbasic free column first
            for k in 0..self.nonbasic_free_col_set.count() {
                let column = self.nonbasic_free_col_set.entry()[k];
                let dual_infeasibility = ekk.work_dual[column].abs();
                if dual_infeasibility > self.dual_feasibility_tolerance
                    && dual_infeasibility > best_measure * self.devex_weight[column]
                {
                    self.variable_in = Some(column);
                    best_measure = dual_infeasibility / self.devex_weight[column];
                }
            }
            for column in 0..self.num_tot {
                let dual_infeasibility =
                    -f64::from(ekk.nonbasic_move[column]) * ekk.work_dual[column];
                if dual_infeasibility > self.dual_feasibility_tolerance
                    && dual_infeasibility > best_measure * self.devex_weight[column]
                {
                    self.variable_in = Some(column);
                    best_measure = dual_infeasibility / self.devex_weight[column];
                }
            }
        }
    }

    fn assess_variable_in(&mut self, ekk: &mut SimplexInstance, variable_in: usize) {
        self.theta_dual = ekk.work_dual[variable_in];
        // the move direction comes from the dual sign, since nonbasic_move
        // is zero for free columns
        self.move_in = if self.theta_dual > 0.0 { -1 } else { 1 };
        if ekk.nonbasic_move[variable_in] != 0 && ekk.nonbasic_move[variable_in] != self.move_in {
            error!(
                "entering variable {} moves {} against its nonbasic side {}",
                variable_in, self.move_in, ekk.nonbasic_move[variable_in]
            );
            self.solve_phase = SolvePhase::Error;
            return;
        }

        ekk.pivot_column_ftran(variable_in, &mut self.col_aq);

        // recompute the reduced cost through the pivot column and compare
        // its sign with the updated dual
        let mut computed_theta_dual = ekk.work_cost[variable_in];
        for k in 0..self.col_aq.count {
            let row = self.col_aq.index[k];
            computed_theta_dual -= self.col_aq.array[row] * ekk.work_cost[ekk.basic_index[row]];
        }
        let sign_error = computed_theta_dual * self.theta_dual < 0.0
            && computed_theta_dual.abs() > self.dual_feasibility_tolerance;
        if sign_error {
            error!(
                "primal simplex: computed / updated dual of entering variable are {} / {}: sign error",
                computed_theta_dual, self.theta_dual
            );
            self.solve_phase = SolvePhase::Error;
        }
    }

    /// Phase-1 two-pass ratio test. Each row contributes break points from
    /// two directions: it may become feasible by crossing its violated
    /// bound, and infeasible again by crossing the opposite one. The
    /// relaxed list locates the step at which the infeasibility gradient
    /// turns, the tight list supplies the largest pivot within that step.
    fn phase1_choose_row(&mut self, ekk: &SimplexInstance) {
        let tolerance = self.primal_feasibility_tolerance;
        let pivot_tolerance = if ekk.update_count < 10 {
            1e-9
        } else if ekk.update_count < 20 {
            1e-8
        } else {
            1e-7
        };
        self.ph1_sorter_r_theta.clear();
        self.ph1_sorter_r_index.clear();
        self.ph1_sorter_t_theta.clear();
        self.ph1_sorter_t_index.clear();
        for k in 0..self.col_aq.count {
            let row = self.col_aq.index[k];
            let alpha = self.col_aq.array[row] * f64::from(self.move_in);
            let value = ekk.base_value[row];
            let lower = ekk.base_lower[row];
            let upper = ekk.base_upper[row];

            // the basic variable in this row decreases
            if alpha > pivot_tolerance {
                // it can become feasible by falling below its upper bound
                if value > upper + tolerance {
                    let feas_theta = (value - upper - tolerance) / alpha;
                    self.ph1_sorter_r_theta.push(feas_theta);
                    self.ph1_sorter_r_index.push(row as isize);
                    self.ph1_sorter_t_theta.push(feas_theta);
                    self.ph1_sorter_t_index.push(row as isize);
                }
                // and infeasible again by falling below its lower bound
                if value > lower - tolerance && lower > f64::NEG_INFINITY {
                    let relax_theta = (value - lower + tolerance) / alpha;
                    let tight_theta = (value - lower) / alpha;
                    self.ph1_sorter_r_theta.push(relax_theta);
                    self.ph1_sorter_r_index
                        .push(row as isize - self.num_row as isize);
                    self.ph1_sorter_t_theta.push(tight_theta);
                    self.ph1_sorter_t_index
                        .push(row as isize - self.num_row as isize);
                }
            }

            // the basic variable in this row increases
            if alpha < -pivot_tolerance {
                // it can become feasible by rising above its lower bound
                if value < lower - tolerance {
                    let feas_theta = (value - lower + tolerance) / alpha;
                    self.ph1_sorter_r_theta.push(feas_theta);
                    self.ph1_sorter_r_index
                        .push(row as isize - self.num_row as isize);
                    self.ph1_sorter_t_theta.push(feas_theta);
                    self.ph1_sorter_t_index
                        .push(row as isize - self.num_row as isize);
                }
                // and infeasible again by rising above its upper bound
                if value < upper + tolerance && upper < f64::INFINITY {
                    let relax_theta = (value - upper - tolerance) / alpha;
                    let tight_theta = (value - upper) / alpha;
                    self.ph1_sorter_r_theta.push(relax_theta);
                    self.ph1_sorter_r_index.push(row as isize);
                    self.ph1_sorter_t_theta.push(tight_theta);
                    self.ph1_sorter_t_index.push(row as isize);
                }
            }
        }

        if self.ph1_sorter_r_theta.is_empty() {
            self.row_out = None;
            self.variable_out = None;
            return;
        }

        // walk the relaxed break points, spending the dual gradient on
        // each crossed bound; the last theta before it turns is the step
        max_heap_sort(&mut self.ph1_sorter_r_theta, &mut self.ph1_sorter_r_index);
        let mut max_theta = self.ph1_sorter_r_theta[0];
        let mut gradient = self.theta_dual.abs();
        for k in 0..self.ph1_sorter_r_theta.len() {
            let my_theta = self.ph1_sorter_r_theta[k];
            let row = decode_ph1_row(self.ph1_sorter_r_index[k], self.num_row);
            gradient -= self.col_aq.array[row].abs();
            if gradient <= 0.0 {
                break;
            }
            max_theta = my_theta;
        }

        // largest pivot available within the step
        max_heap_sort(&mut self.ph1_sorter_t_theta, &mut self.ph1_sorter_t_index);
        let mut max_alpha = 0.0_f64;
        let mut last = self.ph1_sorter_t_theta.len();
        for k in 0..self.ph1_sorter_t_theta.len() {
            if self.ph1_sorter_t_theta[k] > max_theta {
                last = k;
                break;
            }
            let row = decode_ph1_row(self.ph1_sorter_t_index[k], self.num_row);
            max_alpha = max_alpha.max(self.col_aq.array[row].abs());
        }

        // work backwards for the first acceptably large pivot
        self.row_out = None;
        self.variable_out = None;
        self.move_out = 0;
        for k in (0..last).rev() {
            let encoded = self.ph1_sorter_t_index[k];
            let row = decode_ph1_row(encoded, self.num_row);
            if self.col_aq.array[row].abs() > max_alpha * 0.1 {
                self.row_out = Some(row);
                self.move_out = if encoded >= 0 { 1 } else { -1 };
                break;
            }
        }
    }

    /// Phase-2 two-pass Harris ratio test: a relaxed first pass bounds the
    /// step using the feasibility tolerance, a second pass takes the
    /// largest pivot among rows binding within that relaxed step.
    fn choose_row(&mut self, ekk: &SimplexInstance) {
        self.row_out = None;
        let tolerance = self.primal_feasibility_tolerance;
        let alpha_tolerance = if ekk.update_count < 10 {
            1e-9
        } else if ekk.update_count < 20 {
            1e-8
        } else {
            1e-7
        };

        let mut relax_theta = 1e100;
        for k in 0..self.col_aq.count {
            let row = self.col_aq.index[k];
            let alpha = self.col_aq.array[row] * f64::from(self.move_in);
            if alpha > alpha_tolerance {
                let relax_space = ekk.base_value[row] - ekk.base_lower[row] + tolerance;
                if relax_space < relax_theta * alpha {
                    relax_theta = relax_space / alpha;
                }
            } else if alpha < -alpha_tolerance {
                let relax_space = ekk.base_value[row] - ekk.base_upper[row] - tolerance;
                if relax_space > relax_theta * alpha {
                    relax_theta = relax_space / alpha;
                }
            }
        }

        let mut best_alpha = 0.0;
        for k in 0..self.col_aq.count {
            let row = self.col_aq.index[k];
            let alpha = self.col_aq.array[row] * f64::from(self.move_in);
            if alpha > alpha_tolerance {
                let tight_space = ekk.base_value[row] - ekk.base_lower[row];
                if tight_space < relax_theta * alpha && best_alpha < alpha {
                    best_alpha = alpha;
                    self.row_out = Some(row);
                }
            } else if alpha < -alpha_tolerance {
                let tight_space = ekk.base_value[row] - ekk.base_upper[row];
                if tight_space > relax_theta * alpha && best_alpha < -alpha {
                    best_alpha = -alpha;
                    self.row_out = Some(row);
                }
            }
        }
    }

    fn consider_bound_swap(&mut self, ekk: &SimplexInstance, variable_in: usize) {
        match self.row_out {
            None => {
                debug_assert_eq!(self.solve_phase, SolvePhase::Phase2);
                // no binding ratio in CHUZR, so flip or unbounded
                self.theta_primal = f64::from(self.move_in) * f64::INFINITY;
                self.move_out = 0;
            }
            Some(row_out) => {
                self.alpha_col = self.col_aq.array[row_out];
                // in phase 1 the move depends on which bound the leaving
                // variable crosses and was fixed by the ratio test
                if self.solve_phase == SolvePhase::Phase2 {
                    self.move_out = if self.alpha_col * f64::from(self.move_in) > 0.0 {
                        -1
                    } else {
                        1
                    };
                }
                self.theta_primal = if self.move_out == 1 {
                    (ekk.base_value[row_out] - ekk.base_upper[row_out]) / self.alpha_col
                } else {
                    (ekk.base_value[row_out] - ekk.base_lower[row_out]) / self.alpha_col
                };
                debug_assert!(self.theta_primal.is_finite());
            }
        }

        // take a bound swap when the step overshoots the entering
        // variable's opposite bound
        let mut flipped = false;
        let lower_in = ekk.work_lower[variable_in];
        let upper_in = ekk.work_upper[variable_in];
        self.value_in = ekk.work_value[variable_in] + self.theta_primal;
        if self.move_in > 0 {
            if self.value_in > upper_in + self.primal_feasibility_tolerance {
                flipped = true;
                self.row_out = None;
                self.value_in = upper_in;
                self.theta_primal = upper_in - lower_in;
            }
        } else if self.value_in < lower_in - self.primal_feasibility_tolerance {
            flipped = true;
            self.row_out = None;
            self.value_in = lower_in;
            self.theta_primal = lower_in - upper_in;
        }
        let pivot_or_flipped = self.row_out.is_some() || flipped;
        if self.solve_phase == SolvePhase::Phase2 && !pivot_or_flipped {
            self.rebuild_reason = RebuildReason::PossiblyPrimalUnbounded;
            return;
        }
        debug_assert!(pivot_or_flipped);
        debug_assert_eq!(flipped, self.row_out.is_none());
    }

    fn assess_pivot(&mut self, ekk: &mut SimplexInstance, variable_in: usize) {
        let row_out = self.row_out.expect("pivot row selected");
        self.alpha_col = self.col_aq.array[row_out];
        self.variable_out = Some(ekk.basic_index[row_out]);

        ekk.unit_btran(row_out, &mut self.row_ep);
        ekk.tableau_row_price(&self.row_ep, &mut self.row_ap);

        self.update_verify(ekk, variable_in);
    }

    /// Compare the pivot seen from the column and from the row. A large
    /// relative difference rejects the pivot; a small one schedules a
    /// precautionary refactorization.
    fn update_verify(&mut self, ekk: &mut SimplexInstance, variable_in: usize) {
        self.alpha_row = if variable_in < self.num_col {
            self.row_ap.array[variable_in]
        } else {
            self.row_ep.array[variable_in - self.num_col]
        };
        let abs_alpha_from_col = self.alpha_col.abs();
        let abs_alpha_from_row = self.alpha_row.abs();
        let abs_alpha_diff = (abs_alpha_from_col - abs_alpha_from_row).abs();
        let min_abs_alpha = abs_alpha_from_col.min(abs_alpha_from_row);
        self.numerical_trouble = abs_alpha_diff / min_abs_alpha;
        if self.numerical_trouble > NUMERICAL_TROUBLE_TOLERANCE {
            warn!(
                "numerical check: iteration {}: alpha_col = {}, alpha_row = {}, measure = {}",
                ekk.iteration_count, self.alpha_col, self.alpha_row, self.numerical_trouble
            );
        }
        if self.numerical_trouble > HARD_NUMERICAL_TROUBLE_TOLERANCE {
            error!(
                "numerical check failed: pivot disagreement {} exceeds {}",
                self.numerical_trouble, HARD_NUMERICAL_TROUBLE_TOLERANCE
            );
            self.solve_phase = SolvePhase::Error;
            return;
        }
        if self.numerical_trouble > NUMERICAL_TROUBLE_TOLERANCE && ekk.update_count > 0 {
            self.rebuild_reason = RebuildReason::PossiblySingularBasis;
        }
    }

    fn update(&mut self, ekk: &mut SimplexInstance, variable_in: usize) {
        debug_assert!(!self.rebuild_reason.is_set());
        let flipped = self.row_out.is_none();
        if flipped {
            self.variable_out = Some(variable_in);
            self.alpha_col = 0.0;
            self.numerical_trouble = 0.0;
            ekk.work_value[variable_in] = self.value_in;
            debug_assert_eq!(ekk.nonbasic_move[variable_in], self.move_in);
            ekk.nonbasic_move[variable_in] = -self.move_in;
        }

        // hyper-sparse CHUZC observes the dual changes made below
        self.hyper_choose_column_start();

        if self.solve_phase == SolvePhase::Phase1 {
            self.phase1_update_primal(ekk);
            self.basic_feasibility_change_update_dual(ekk);
            self.hyper_choose_column_basic_feasibility_change(ekk);
        } else {
            self.phase2_update_primal(ekk, variable_in);
        }
        debug_assert!(matches!(
            self.rebuild_reason,
            RebuildReason::No | RebuildReason::PrimalInfeasibleInPrimalSimplex
        ));

        if flipped {
            ekk.num_bound_swap += 1;
            ekk.invalidate_dual_infeasibility_record();
            self.local_report_iter(ekk, variable_in);
            self.num_flip_since_rebuild += 1;
            ekk.total_synthetic_tick += self.col_aq.synthetic_tick;
            return;
        }

        let row_out = self.row_out.expect("pivot row selected");
        let variable_out = self.variable_out.expect("leaving variable recorded");
        ekk.base_value[row_out] = self.value_in;
        self.consider_infeasible_value_in(ekk, variable_in);

        self.update_dual(ekk, variable_in, variable_out);
        self.update_devex(ekk, variable_in, row_out);
        self.remove_nonbasic_free_column(ekk, variable_in);
        self.hyper_choose_column_dual_change(ekk, variable_out);

        ekk.update_pivots(variable_in, row_out, self.move_out);
        if ekk.update_factor(&self.col_aq, row_out) {
            self.rebuild_reason = RebuildReason::SyntheticClockSaysInvert;
        }
        ekk.update_matrix(variable_in, variable_out);
        if ekk.update_count >= ekk.options.update_limit {
            self.rebuild_reason = RebuildReason::UpdateLimitReached;
        }

        ekk.iteration_count += 1;

        if self.num_bad_devex_weight > ALLOWED_NUM_BAD_DEVEX_WEIGHT {
            self.reset_devex(ekk);
        }

        self.local_report_iter(ekk, variable_in);

        ekk.total_synthetic_tick += self.col_aq.synthetic_tick;
        ekk.total_synthetic_tick += self.row_ep.synthetic_tick;

        self.hyper_choose_column(ekk);
    }

    /// Pick the entering column for the next iteration from the candidate
    /// heap and the measures changed by this pivot. The candidate is only
    /// accepted when it provably beats every column outside the heap;
    /// otherwise the next CHUZC falls back to a full scan.
    fn hyper_choose_column(&mut self, ekk: &SimplexInstance) {
        if !self.use_hyper_chuzc {
            return;
        }
        if self.initialise_hyper_chuzc {
            return;
        }
        let mut best_measure = self.max_changed_measure_value;
        self.variable_in = self.max_changed_measure_column;
        let consider_nonbasic_free_column = self.nonbasic_free_col_set.count() > 0;
        for entry in 0..self.num_hyper_chuzc_candidates {
            let column = self.hyper_chuzc_candidate[entry];
            if !ekk.nonbasic_flag[column] {
                debug_assert_eq!(ekk.nonbasic_move[column], 0);
                continue;
            }
            let mut dual_infeasibility =
                -f64::from(ekk.nonbasic_move[column]) * ekk.work_dual[column];
            if consider_nonbasic_free_column && self.nonbasic_free_col_set.contains(column) {
                dual_infeasibility = ekk.work_dual[column].abs();
            }
            if dual_infeasibility > self.dual_feasibility_tolerance
                && dual_infeasibility > best_measure * self.devex_weight[column]
            {
                best_measure = dual_infeasibility / self.devex_weight[column];
                self.variable_in = Some(column);
            }
        }
        if self.variable_in != self.max_changed_measure_column {
            self.max_hyper_chuzc_non_candidate_measure = self
                .max_changed_measure_value
                .max(self.max_hyper_chuzc_non_candidate_measure);
        }
        if best_measure >= self.max_hyper_chuzc_non_candidate_measure {
            // as good as any column outside the candidate set, so accept
            self.done_next_chuzc = true;
        } else {
            self.done_next_chuzc = false;
            self.initialise_hyper_chuzc = true;
        }
    }

    fn hyper_choose_column_start(&mut self) {
        self.max_changed_measure_value = 0.0;
        self.max_changed_measure_column = None;
        self.done_next_chuzc = false;
    }

    fn hyper_choose_column_clear(&mut self) {
        self.initialise_hyper_chuzc = self.use_hyper_chuzc;
        self.max_hyper_chuzc_non_candidate_measure = -1.0;
        self.done_next_chuzc = false;
    }

    fn hyper_choose_column_changed_infeasibility(&mut self, infeasibility: f64, column: usize) {
        if infeasibility > self.max_changed_measure_value * self.devex_weight[column] {
            self.max_hyper_chuzc_non_candidate_measure = self
                .max_changed_measure_value
                .max(self.max_hyper_chuzc_non_candidate_measure);
            self.max_changed_measure_value = infeasibility / self.devex_weight[column];
            self.max_changed_measure_column = Some(column);
        } else if infeasibility
            > self.max_hyper_chuzc_non_candidate_measure * self.devex_weight[column]
        {
            self.max_hyper_chuzc_non_candidate_measure =
                infeasibility / self.devex_weight[column];
        }
    }

    /// Fold the dual changes from phase-1 feasibility flips into the
    /// hyper-sparse CHUZC measures.
    fn hyper_choose_column_basic_feasibility_change(&mut self, ekk: &SimplexInstance) {
        if !self.use_hyper_chuzc {
            return;
        }
        let (use_row_indices, to_entry) =
            sparse_loop_style(self.row_basic_feasibility_change.count, self.num_col);
        for entry in 0..to_entry {
            let column = if use_row_indices {
                self.row_basic_feasibility_change.index[entry]
            } else {
                entry
            };
            let dual_infeasibility =
                -f64::from(ekk.nonbasic_move[column]) * ekk.work_dual[column];
            if dual_infeasibility > self.dual_feasibility_tolerance {
                self.hyper_choose_column_changed_infeasibility(dual_infeasibility, column);
            }
        }
        let (use_col_indices, to_entry) =
            sparse_loop_style(self.col_basic_feasibility_change.count, self.num_row);
        for entry in 0..to_entry {
            let row = if use_col_indices {
                self.col_basic_feasibility_change.index[entry]
            } else {
                entry
            };
            let column = self.num_col + row;
            let dual_infeasibility =
                -f64::from(ekk.nonbasic_move[column]) * ekk.work_dual[column];
            if dual_infeasibility > self.dual_feasibility_tolerance {
                self.hyper_choose_column_changed_infeasibility(dual_infeasibility, column);
            }
        }
        // nonbasic free columns are handled with the dual changes of a
        // pivot, so only look at them here when flipping
        if self.row_out.is_none() && self.nonbasic_free_col_set.count() > 0 {
            for k in 0..self.nonbasic_free_col_set.count() {
                let column = self.nonbasic_free_col_set.entry()[k];
                let dual_infeasibility = ekk.work_dual[column].abs();
                if dual_infeasibility > self.dual_feasibility_tolerance {
                    self.hyper_choose_column_changed_infeasibility(dual_infeasibility, column);
                }
            }
        }
    }

    /// Fold the dual changes of a pivot - the tableau-row footprint, the
    /// free columns and the leaving column - into the hyper-sparse CHUZC
    /// measures.
    fn hyper_choose_column_dual_change(&mut self, ekk: &SimplexInstance, variable_out: usize) {
        if !self.use_hyper_chuzc {
            return;
        }
        let (use_row_indices, to_entry) = sparse_loop_style(self.row_ap.count, self.num_col);
        for entry in 0..to_entry {
            let column = if use_row_indices {
                self.row_ap.index[entry]
            } else {
                entry
            };
            let dual_infeasibility =
                -f64::from(ekk.nonbasic_move[column]) * ekk.work_dual[column];
            if dual_infeasibility > self.dual_feasibility_tolerance {
                self.hyper_choose_column_changed_infeasibility(dual_infeasibility, column);
            }
        }
        let (use_col_indices, to_entry) = sparse_loop_style(self.row_ep.count, self.num_row);
        for entry in 0..to_entry {
            let row = if use_col_indices {
                self.row_ep.index[entry]
            } else {
                entry
            };
            let column = row + self.num_col;
            let dual_infeasibility =
                -f64::from(ekk.nonbasic_move[column]) * ekk.work_dual[column];
            if dual_infeasibility > self.dual_feasibility_tolerance {
                self.hyper_choose_column_changed_infeasibility(dual_infeasibility, column);
            }
        }
        for k in 0..self.nonbasic_free_col_set.count() {
            let column = self.nonbasic_free_col_set.entry()[k];
            let dual_infeasibility = ekk.work_dual[column].abs();
            if dual_infeasibility > self.dual_feasibility_tolerance {
                self.hyper_choose_column_changed_infeasibility(dual_infeasibility, column);
            }
        }
        // the leaving column should be dual feasible at its new bound
        let dual_infeasibility =
            -f64::from(ekk.nonbasic_move[variable_out]) * ekk.work_dual[variable_out];
        if dual_infeasibility > self.dual_feasibility_tolerance {
            warn!(
                "dual infeasibility {} for leaving column {}",
                dual_infeasibility, variable_out
            );
            self.hyper_choose_column_changed_infeasibility(dual_infeasibility, variable_out);
        }
    }

    fn update_dual(&mut self, ekk: &mut SimplexInstance, variable_in: usize, variable_out: usize) {
        debug_assert!(self.alpha_col != 0.0);
        debug_assert!(self.row_out.is_some());
        self.theta_dual = ekk.work_dual[variable_in] / self.alpha_col;
        for k in 0..self.row_ap.count {
            let column = self.row_ap.index[k];
            ekk.work_dual[column] -= self.theta_dual * self.row_ap.array[column];
        }
        for k in 0..self.row_ep.count {
            let row = self.row_ep.index[k];
            let column = row + self.num_col;
            ekk.work_dual[column] -= self.theta_dual * self.row_ep.array[row];
        }
        ekk.work_dual[variable_in] = 0.0;
        ekk.work_dual[variable_out] = -self.theta_dual;

        ekk.invalidate_dual_infeasibility_record();
        ekk.has_dual_objective_value = false;
    }

    /// Recompute the phase-1 duals from the signed basic infeasibility
    /// costs by a full BTRAN and PRICE.
    fn phase1_compute_dual(&mut self, ekk: &mut SimplexInstance) {
        for j in 0..self.num_tot {
            ekk.work_cost[j] = 0.0;
        }
        let mut buffer = SparseVector::new(self.num_row);
        for row in 0..self.num_row {
            let mut cost = 0.0;
            if ekk.base_value[row] < ekk.base_lower[row] - self.dual_feasibility_tolerance {
                cost = -1.0;
            } else if ekk.base_value[row] > ekk.base_upper[row] + self.dual_feasibility_tolerance {
                cost = 1.0;
            }
            if cost != 0.0 {
                buffer.push(row, cost);
            }
            ekk.work_cost[ekk.basic_index[row]] = cost;
        }

        ekk.full_btran(&mut buffer);

        let mut buffer_long = SparseVector::new(self.num_col);
        ekk.full_price(&buffer, &mut buffer_long);

        for column in 0..self.num_col {
            ekk.work_dual[column] = if ekk.nonbasic_flag[column] {
                -buffer_long.array[column]
            } else {
                0.0
            };
        }
        for row in 0..self.num_row {
            let column = self.num_col + row;
            ekk.work_dual[column] = if ekk.nonbasic_flag[column] {
                -buffer.array[row]
            } else {
                0.0
            };
        }
    }

    /// Update the basic values along the pivot column, flipping phase-1
    /// costs as rows gain or lose feasibility, and collect the cost deltas
    /// so the duals can be updated.
    fn phase1_update_primal(&mut self, ekk: &mut SimplexInstance) {
        self.col_basic_feasibility_change.clear();
        for k in 0..self.col_aq.count {
            let row = self.col_aq.index[k];
            ekk.base_value[row] -= self.theta_primal * self.col_aq.array[row];
            let column = ekk.basic_index[row];
            let was_cost = ekk.work_cost[column];
            let mut cost = 0.0;
            if ekk.base_value[row] < ekk.base_lower[row] - self.primal_feasibility_tolerance {
                cost = -1.0;
            } else if ekk.base_value[row]
                > ekk.base_upper[row] + self.primal_feasibility_tolerance
            {
                cost = 1.0;
            }
            ekk.work_cost[column] = cost;
            if was_cost != 0.0 {
                if cost == 0.0 {
                    ekk.num_primal_infeasibility -= 1;
                }
            } else if cost != 0.0 {
                ekk.num_primal_infeasibility += 1;
            }
            let delta_cost = cost - was_cost;
            if delta_cost != 0.0 {
                self.col_basic_feasibility_change.push(row, delta_cost);
                // basic logicals get their cost change applied directly,
                // since PRICE yields no component for them
                if column >= self.num_col {
                    ekk.work_dual[column] += delta_cost;
                }
            }
        }
        // the leaving row's value is set after the dual update so the
        // feasibility changes are propagated consistently
    }

    /// React to an entering value landing outside its own bounds: a
    /// phase-1 cost in phase 1, a bound shift in phase 2 when permitted,
    /// otherwise a rebuild demand.
    fn consider_infeasible_value_in(&mut self, ekk: &mut SimplexInstance, variable_in: usize) {
        let lower = ekk.work_lower[variable_in];
        let upper = ekk.work_upper[variable_in];
        let mut cost = 0.0;
        let mut primal_infeasibility = 0.0;
        if self.value_in < lower - self.primal_feasibility_tolerance {
            cost = -1.0;
            primal_infeasibility = lower - self.value_in;
        } else if self.value_in > upper + self.primal_feasibility_tolerance {
            cost = 1.0;
            primal_infeasibility = self.value_in - upper;
        }
        if cost == 0.0 {
            return;
        }
        if self.solve_phase == SolvePhase::Phase1 {
            ekk.num_primal_infeasibility += 1;
            ekk.work_cost[variable_in] = cost;
            ekk.work_dual[variable_in] += cost;
        } else if ekk.allow_bound_perturbation {
            if cost > 0.0 {
                // stretch the upper bound over the infeasibility
                shift_bound(
                    false,
                    variable_in,
                    self.value_in,
                    ekk.num_tot_random_value[variable_in],
                    self.primal_feasibility_tolerance,
                    &mut ekk.work_upper[variable_in],
                    &mut ekk.work_upper_shift[variable_in],
                );
            } else {
                // stretch the lower bound under the infeasibility
                shift_bound(
                    true,
                    variable_in,
                    self.value_in,
                    ekk.num_tot_random_value[variable_in],
                    self.primal_feasibility_tolerance,
                    &mut ekk.work_lower[variable_in],
                    &mut ekk.work_lower_shift[variable_in],
                );
            }
            ekk.bounds_perturbed = true;
        } else {
            ekk.num_primal_infeasibility += 1;
            warn!(
                "entering variable has primal infeasibility of {} for [{}, {}, {}]",
                primal_infeasibility, lower, self.value_in, upper
            );
            self.rebuild_reason = RebuildReason::PrimalInfeasibleInPrimalSimplex;
        }
    }

    /// Update the basic values along the pivot column, watching for rows
    /// pushed outside their bounds, and roll the updated objective value.
    fn phase2_update_primal(&mut self, ekk: &mut SimplexInstance, variable_in: usize) {
        let mut primal_infeasible = false;
        let mut max_local_primal_infeasibility = 0.0_f64;
        for k in 0..self.col_aq.count {
            let row = self.col_aq.index[k];
            ekk.base_value[row] -= self.theta_primal * self.col_aq.array[row];
            let value = ekk.base_value[row];
            let mut primal_infeasibility = 0.0;
            if value < ekk.base_lower[row] - self.primal_feasibility_tolerance {
                primal_infeasibility = ekk.base_lower[row] - value;
            } else if value > ekk.base_upper[row] + self.primal_feasibility_tolerance {
                primal_infeasibility = value - ekk.base_upper[row];
            }
            max_local_primal_infeasibility =
                max_local_primal_infeasibility.max(primal_infeasibility);
            if primal_infeasibility > self.primal_feasibility_tolerance {
                ekk.num_primal_infeasibility += 1;
                primal_infeasible = true;
            }
        }
        if primal_infeasible {
            self.rebuild_reason = RebuildReason::PrimalInfeasibleInPrimalSimplex;
        }
        if max_local_primal_infeasibility > 2.0 * self.max_max_local_primal_infeasibility {
            self.max_max_local_primal_infeasibility = max_local_primal_infeasibility;
            debug!(
                "phase-2 primal update: max local primal infeasibility = {}",
                max_local_primal_infeasibility
            );
        }
        ekk.updated_primal_objective_value +=
            ekk.work_dual[variable_in] * self.theta_primal;
    }

    /// Scan the recomputed basic values for drift outside their bounds.
    /// With the correction enabled, absorb the drift into bound shifts;
    /// otherwise this is diagnostic only.
    fn phase2_correct_primal(&mut self, ekk: &mut SimplexInstance) {
        debug_assert_eq!(self.solve_phase, SolvePhase::Phase2);
        let use_correction = ekk.options.use_primal_correction;
        let mut num_local_primal_infeasibility = 0;
        let mut max_local_primal_infeasibility = 0.0_f64;
        let mut sum_local_primal_infeasibility = 0.0;
        let mut max_primal_correction = 0.0_f64;
        for row in 0..self.num_row {
            let value = ekk.base_value[row];
            let mut primal_infeasibility = 0.0;
            let mut correction = 0;
            if value < ekk.base_lower[row] - self.primal_feasibility_tolerance {
                primal_infeasibility = ekk.base_lower[row] - value;
                correction = -1;
            } else if value > ekk.base_upper[row] + self.primal_feasibility_tolerance {
                primal_infeasibility = value - ekk.base_upper[row];
                correction = 1;
            }
            if primal_infeasibility > 0.0 {
                if primal_infeasibility > self.primal_feasibility_tolerance {
                    num_local_primal_infeasibility += 1;
                }
                max_local_primal_infeasibility =
                    max_local_primal_infeasibility.max(primal_infeasibility);
                sum_local_primal_infeasibility += primal_infeasibility;
            }
            if use_correction && correction != 0 {
                let column = ekk.basic_index[row];
                ekk.bounds_perturbed = true;
                if correction > 0 {
                    shift_bound(
                        false,
                        column,
                        value,
                        ekk.num_tot_random_value[column],
                        self.primal_feasibility_tolerance,
                        &mut ekk.work_upper[column],
                        &mut ekk.work_upper_shift[column],
                    );
                    ekk.base_upper[row] = ekk.work_upper[column];
                } else {
                    shift_bound(
                        true,
                        column,
                        value,
                        ekk.num_tot_random_value[column],
                        self.primal_feasibility_tolerance,
                        &mut ekk.work_lower[column],
                        &mut ekk.work_lower_shift[column],
                    );
                    ekk.base_lower[row] = ekk.work_lower[column];
                }
                max_primal_correction = max_primal_correction.max(primal_infeasibility);
            }
        }
        if max_local_primal_infeasibility > 2.0 * self.max_max_correction_primal_infeasibility {
            self.max_max_correction_primal_infeasibility = max_local_primal_infeasibility;
            debug!(
                "phase-2 primal correction: num / max / sum primal infeasibilities = {} / {} / {}",
                num_local_primal_infeasibility,
                max_local_primal_infeasibility,
                sum_local_primal_infeasibility
            );
        }
        if max_primal_correction > 2.0 * self.max_max_primal_correction {
            self.max_max_primal_correction = max_primal_correction;
            debug!("phase-2 primal correction: max correction = {}", max_primal_correction);
        }
    }

    /// Propagate the phase-1 cost deltas of basic variables into the
    /// duals: BTRAN the deltas, PRICE them over the structural columns,
    /// and subtract both images.
    ///
    /// Basic logicals got their cost change added to their dual directly
    /// when the delta was recorded; the priced image carries structural
    /// components only, so the subtraction below touches no logical twice.
    fn basic_feasibility_change_update_dual(&mut self, ekk: &mut SimplexInstance) {
        self.basic_feasibility_change_btran(ekk);
        self.basic_feasibility_change_price(ekk);

        if ekk.options.debug_level >= 2 {
            for k in 0..self.row_basic_feasibility_change.count {
                let column = self.row_basic_feasibility_change.index[k];
                debug_assert!(
                    ekk.nonbasic_flag[column],
                    "priced feasibility-change image touches basic column {}",
                    column
                );
            }
        }

        let (use_row_indices, to_entry) =
            sparse_loop_style(self.row_basic_feasibility_change.count, self.num_col);
        for entry in 0..to_entry {
            let column = if use_row_indices {
                self.row_basic_feasibility_change.index[entry]
            } else {
                entry
            };
            ekk.work_dual[column] -= self.row_basic_feasibility_change.array[column];
        }
        let (use_col_indices, to_entry) =
            sparse_loop_style(self.col_basic_feasibility_change.count, self.num_row);
        for entry in 0..to_entry {
            let row = if use_col_indices {
                self.col_basic_feasibility_change.index[entry]
            } else {
                entry
            };
            let column = self.num_col + row;
            ekk.work_dual[column] -= self.col_basic_feasibility_change.array[row];
        }
        ekk.invalidate_dual_infeasibility_record();
    }

    fn basic_feasibility_change_btran(&mut self, ekk: &mut SimplexInstance) {
        ekk.full_btran(&mut self.col_basic_feasibility_change);
    }

    fn basic_feasibility_change_price(&mut self, ekk: &mut SimplexInstance) {
        let local_density =
            self.col_basic_feasibility_change.count as f64 / self.num_row as f64;
        let (use_col_price, use_row_price_w_switch) =
            ekk.choose_price_technique(local_density);
        if use_col_price {
            ekk.matrix.price_by_column(
                &mut self.row_basic_feasibility_change,
                &self.col_basic_feasibility_change,
                &ekk.nonbasic_flag,
            );
        } else if use_row_price_w_switch {
            ekk.matrix.price_by_row_with_switch(
                &mut self.row_basic_feasibility_change,
                &self.col_basic_feasibility_change,
                &ekk.nonbasic_flag,
                crate::matrix_price::HYPER_PRICE_DENSITY,
            );
        } else {
            ekk.matrix.price_by_row_sparse_result(
                &mut self.row_basic_feasibility_change,
                &self.col_basic_feasibility_change,
                &ekk.nonbasic_flag,
            );
        }
    }

    /// Reinitialise the Devex framework: unit weights, with the reference
    /// set holding every currently nonbasic variable.
    pub(crate) fn reset_devex(&mut self, ekk: &SimplexInstance) {
        self.devex_weight.iter_mut().for_each(|w| *w = 1.0);
        for column in 0..self.num_tot {
            self.devex_index[column] = u8::from(ekk.nonbasic_flag[column]);
        }
        self.num_devex_iterations = 0;
        self.num_bad_devex_weight = 0;
        self.hyper_choose_column_clear();
    }

    /// Devex weight update: the pivot weight is the reference-set norm of
    /// the pivot column, and every column touched by the tableau row takes
    /// the larger of its old weight and its image under the pivot.
    fn update_devex(&mut self, ekk: &SimplexInstance, variable_in: usize, row_out: usize) {
        let mut pivot_weight = 0.0;
        let (use_col_indices, to_entry) = sparse_loop_style(self.col_aq.count, self.num_row);
        for entry in 0..to_entry {
            let row = if use_col_indices {
                self.col_aq.index[entry]
            } else {
                entry
            };
            let column = ekk.basic_index[row];
            let alpha = f64::from(self.devex_index[column]) * self.col_aq.array[row];
            pivot_weight += alpha * alpha;
        }
        pivot_weight += f64::from(self.devex_index[variable_in]);
        pivot_weight = pivot_weight.sqrt();

        if self.devex_weight[variable_in] > BAD_DEVEX_WEIGHT_FACTOR * pivot_weight {
            self.num_bad_devex_weight += 1;
        }

        let pivot = self.col_aq.array[row_out];
        pivot_weight /= pivot.abs();

        for k in 0..self.row_ap.count {
            let column = self.row_ap.index[k];
            let alpha = self.row_ap.array[column];
            let devex = pivot_weight * alpha.abs() + f64::from(self.devex_index[column]);
            if self.devex_weight[column] < devex {
                self.devex_weight[column] = devex;
            }
        }
        for k in 0..self.row_ep.count {
            let row = self.row_ep.index[k];
            let column = row + self.num_col;
            let alpha = self.row_ep.array[row];
            let devex = pivot_weight * alpha.abs() + f64::from(self.devex_index[column]);
            if self.devex_weight[column] < devex {
                self.devex_weight[column] = devex;
            }
        }

        let variable_out = self.variable_out.expect("leaving variable recorded");
        self.devex_weight[variable_out] = pivot_weight.max(1.0);
        self.devex_weight[variable_in] = 1.0;
        self.num_devex_iterations += 1;
    }

    fn local_report_iter(&self, ekk: &SimplexInstance, variable_in: usize) {
        match self.row_out {
            Some(row_out) => debug!(
                "iter {}: column {} in, row {} out (column {:?})",
                ekk.iteration_count, variable_in, row_out, self.variable_out
            ),
            None => debug!(
                "iter {}: column {} bound flip",
                ekk.iteration_count, variable_in
            ),
        }
    }

    fn report_rebuild(&self, ekk: &SimplexInstance, reason_for_rebuild: RebuildReason) {
        debug!(
            "rebuild: phase {:?}, iteration {} ({} devex), reason {:?}, objective {}, \
             primal infeasibilities {} (max {}, sum {}), dual infeasibilities {} (max {}, sum {})",
            self.solve_phase,
            ekk.iteration_count,
            self.num_devex_iterations,
            reason_for_rebuild,
            ekk.primal_objective_value,
            ekk.num_primal_infeasibility,
            ekk.max_primal_infeasibility,
            ekk.sum_primal_infeasibility,
            ekk.num_dual_infeasibility,
            ekk.max_dual_infeasibility,
            ekk.sum_dual_infeasibility
        );
    }

    fn get_nonbasic_free_column_set(&mut self, ekk: &SimplexInstance) {
        self.nonbasic_free_col_set.clear();
        if self.num_free_col == 0 {
            return;
        }
        for column in 0..self.num_tot {
            let nonbasic_free = ekk.nonbasic_flag[column]
                && ekk.work_lower[column] == f64::NEG_INFINITY
                && ekk.work_upper[column] == f64::INFINITY;
            if nonbasic_free {
                self.nonbasic_free_col_set.add(column);
            }
        }
    }

    fn remove_nonbasic_free_column(&mut self, ekk: &SimplexInstance, variable_in: usize) {
        if ekk.nonbasic_move[variable_in] != 0 {
            return;
        }
        if !self.nonbasic_free_col_set.remove(variable_in) {
            error!(
                "failed to remove nonbasic free column {} from its set",
                variable_in
            );
            debug_assert!(false, "nonbasic free column missing from its set");
        }
    }

    /// Recount the basic primal infeasibilities and cross-check the
    /// running count maintained by the updates. Returns false on a
    /// mismatch, which is a logical error.
    fn get_basic_primal_infeasibility(&mut self, ekk: &mut SimplexInstance) -> bool {
        let updated_num = ekk
            .primal_infeasibility_count_valid
            .then_some(ekk.num_primal_infeasibility);
        let mut num = 0;
        let mut max = 0.0_f64;
        let mut sum = 0.0;
        for row in 0..self.num_row {
            let value = ekk.base_value[row];
            let mut primal_infeasibility = 0.0;
            if value < ekk.base_lower[row] - self.primal_feasibility_tolerance {
                primal_infeasibility = ekk.base_lower[row] - value;
            } else if value > ekk.base_upper[row] + self.primal_feasibility_tolerance {
                primal_infeasibility = value - ekk.base_upper[row];
            }
            if primal_infeasibility > 0.0 {
                if primal_infeasibility > self.primal_feasibility_tolerance {
                    num += 1;
                }
                max = max.max(primal_infeasibility);
                sum += primal_infeasibility;
            }
        }
        ekk.num_primal_infeasibility = num;
        ekk.max_primal_infeasibility = max;
        ekk.sum_primal_infeasibility = sum;
        ekk.primal_infeasibility_count_valid = true;
        if let Some(updated) = updated_num {
            if updated != num {
                error!(
                    "iteration {}: num_primal_infeasibility = {} != {} = updated count",
                    ekk.iteration_count, num, updated
                );
                return false;
            }
        }
        true
    }

    /// Cheap (and, at higher debug levels, expensive) invariant checks.
    /// Returns false on a logical error.
    fn debug_primal_simplex(&self, ekk: &SimplexInstance, message: &str) -> bool {
        if ekk.options.debug_level == 0 {
            return true;
        }
        let mut num_basic = 0;
        for row in 0..self.num_row {
            let column = ekk.basic_index[row];
            if column >= self.num_tot || ekk.nonbasic_flag[column] {
                error!("{}: basic index of row {} is inconsistent", message, row);
                return false;
            }
        }
        for column in 0..self.num_tot {
            if !ekk.nonbasic_flag[column] {
                num_basic += 1;
                continue;
            }
            let mv = ekk.nonbasic_move[column];
            let lower = ekk.work_lower[column];
            let upper = ekk.work_upper[column];
            let ok = match mv {
                1 => lower.is_finite(),
                -1 => upper.is_finite(),
                0 => lower == upper || (lower == f64::NEG_INFINITY && upper == f64::INFINITY),
                _ => false,
            };
            if !ok {
                error!(
                    "{}: nonbasic move {} of column {} inconsistent with bounds [{}, {}]",
                    message, mv, column, lower, upper
                );
                return false;
            }
        }
        if num_basic != self.num_row {
            error!(
                "{}: {} basic variables for {} rows",
                message, num_basic, self.num_row
            );
            return false;
        }
        for k in 0..self.nonbasic_free_col_set.count() {
            let column = self.nonbasic_free_col_set.entry()[k];
            let ok = ekk.nonbasic_flag[column]
                && ekk.work_lower[column] == f64::NEG_INFINITY
                && ekk.work_upper[column] == f64::INFINITY;
            if !ok {
                error!("{}: free-column set holds non-free column {}", message, column);
                return false;
            }
        }
        if ekk.options.debug_level >= 2 {
            // recompute the basic values and compare against the updates
            let check = recompute_basic_values(ekk);
            for row in 0..self.num_row {
                let difference = (check[row] - ekk.base_value[row]).abs();
                let scale = 1.0 + ekk.base_value[row].abs();
                if difference > 1e-6 * scale {
                    error!(
                        "{}: basic value of row {} drifted by {}",
                        message, row, difference
                    );
                    return false;
                }
            }
        }
        true
    }
}

fn decode_ph1_row(encoded: isize, num_row: usize) -> usize {
    if encoded >= 0 {
        encoded as usize
    } else {
        (encoded + num_row as isize) as usize
    }
}

/// Enlarge a violated bound so `value` becomes strictly feasible by a
/// jittered tolerance margin, accumulating the shift for later removal.
pub(crate) fn shift_bound(
    lower: bool,
    variable: usize,
    value: f64,
    random_value: f64,
    tolerance: f64,
    bound: &mut f64,
    sum_shift: &mut f64,
) {
    let feasibility = (1.0 + random_value) * tolerance;
    let old_bound = *bound;
    let infeasibility;
    let shift;
    let new_infeasibility;
    if lower {
        debug_assert!(value < *bound - tolerance);
        infeasibility = *bound - value;
        shift = infeasibility + feasibility;
        *bound -= shift;
        *sum_shift += shift;
        new_infeasibility = *bound - value;
    } else {
        debug_assert!(value > *bound + tolerance);
        infeasibility = value - *bound;
        shift = infeasibility + feasibility;
        *bound += shift;
        *sum_shift += shift;
        new_infeasibility = value - *bound;
    }
    debug_assert!(new_infeasibility < 0.0);
    let error = (-new_infeasibility - feasibility).abs();
    debug!(
        "value({}) = {} exceeds {} bound = {} by {}, so shift bound by {} to {}: infeasibility {} with error {}",
        variable,
        value,
        if lower { "lower" } else { "upper" },
        old_bound,
        infeasibility,
        shift,
        *bound,
        new_infeasibility,
        error
    );
    debug_assert!(error < 1e-12);
}

/// The basic values as recomputed from the factorization, for the
/// expensive drift check.
fn recompute_basic_values(ekk: &SimplexInstance) -> Vec<f64> {
    let mut buffer = SparseVector::new(ekk.num_row);
    for j in 0..ekk.num_tot {
        if !ekk.nonbasic_flag[j] || ekk.work_value[j] == 0.0 {
            continue;
        }
        let value = ekk.work_value[j];
        if j < ekk.num_col {
            for (r, &a) in ekk.matrix.col(j).iter() {
                buffer.array[r] -= value * a;
            }
        } else {
            buffer.array[j - ekk.num_col] -= value;
        }
    }
    buffer.pack();
    ekk.factor.ftran(&mut buffer);
    buffer.array
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lp::{Error, Lp, OptimisationDirection};
    use crate::options::Options;

    const INF: f64 = f64::INFINITY;

    fn run(lp: &Lp, options: Options) -> (SimplexInstance, PrimalSimplex, SolveStatus) {
        let mut instance = SimplexInstance::try_new(lp, options).unwrap();
        let mut engine = PrimalSimplex::new(&instance);
        let status = engine.solve(&mut instance);
        (instance, engine, status)
    }

    fn debug_options() -> Options {
        Options {
            debug_level: 2,
            ..Options::default()
        }
    }

    #[test]
    fn bounded_two_by_two() {
        // min x + y subject to x + y >= 1, 0 <= x, y <= 2
        let mut lp = Lp::new(OptimisationDirection::Minimise);
        let x = lp.add_var(1.0, (0.0, 2.0));
        let y = lp.add_var(1.0, (0.0, 2.0));
        lp.add_constraint(&[(x, 1.0), (y, 1.0)], (1.0, INF));

        let (instance, _, status) = run(&lp, debug_options());
        assert_eq!(status, SolveStatus::Ok);
        assert_eq!(instance.model_status(), ModelStatus::Optimal);
        let solution = instance.solution();
        assert!((solution.objective() - 1.0).abs() < 1e-9);
        assert!((solution[x] + solution[y] - 1.0).abs() < 1e-9);
        assert!((0.0..=2.0).contains(&solution[x]));
        assert!((0.0..=2.0).contains(&solution[y]));
        assert!(instance.iteration_count() <= 3);
    }

    #[test]
    fn unbounded_ray() {
        // min -x subject to x - y <= 0 with x, y >= 0: x = y -> infinity
        let mut lp = Lp::new(OptimisationDirection::Minimise);
        let x = lp.add_var(-1.0, (0.0, INF));
        let y = lp.add_var(0.0, (0.0, INF));
        lp.add_constraint(&[(x, 1.0), (y, -1.0)], (f64::NEG_INFINITY, 0.0));

        let (instance, _, status) = run(&lp, debug_options());
        assert_eq!(status, SolveStatus::Ok);
        assert_eq!(instance.model_status(), ModelStatus::PrimalUnbounded);
        assert!(!instance.bounds_perturbed);

        assert_eq!(lp.solve().unwrap_err(), Error::Unbounded);
    }

    #[test]
    fn infeasible_in_phase1() {
        // x + y = 1 and x + y = 2 cannot both hold
        let mut lp = Lp::new(OptimisationDirection::Minimise);
        let x = lp.add_var(0.0, (0.0, INF));
        let y = lp.add_var(0.0, (0.0, INF));
        lp.add_constraint(&[(x, 1.0), (y, 1.0)], (1.0, 1.0));
        lp.add_constraint(&[(x, 1.0), (y, 1.0)], (2.0, 2.0));

        let (instance, _, status) = run(&lp, debug_options());
        assert_eq!(status, SolveStatus::Ok);
        assert_eq!(instance.model_status(), ModelStatus::PrimalInfeasible);
        // the infeasibility is detected without ever entering phase 2
        assert_eq!(instance.primal_phase2_iteration_count, 0);

        assert_eq!(lp.solve().unwrap_err(), Error::Infeasible);
    }

    #[test]
    fn bound_flip_leaves_basis_unchanged() {
        // the full step to the constraint exceeds the box of x, so the
        // first choice flips x across it without a pivot
        let mut lp = Lp::new(OptimisationDirection::Minimise);
        let x = lp.add_var(-1.0, (0.0, 1.0));
        let y = lp.add_var(0.0, (0.0, 20.0));
        lp.add_constraint(&[(x, 1.0), (y, 1.0)], (f64::NEG_INFINITY, 10.0));

        let (instance, engine, status) = run(&lp, debug_options());
        assert_eq!(status, SolveStatus::Ok);
        assert_eq!(instance.model_status(), ModelStatus::Optimal);
        assert_eq!(instance.bound_swap_count(), 1);
        assert_eq!(instance.iteration_count(), 0);
        assert_eq!(engine.row_out, None);
        // the logical is still the only basic variable
        assert_eq!(instance.basic_index, vec![2]);
        let solution = instance.solution();
        assert_eq!(solution[x], 1.0);
        assert_eq!(solution[y], 0.0);
        assert_eq!(solution.objective(), -1.0);
    }

    #[test]
    fn phase1_ratio_test_prefers_large_pivot() {
        // rows 0 and 1 become feasible at theta ~ 1 with pivots 0.05 and
        // 1.0; row 0 has the later break point, but its pivot falls below
        // a tenth of the best available, so the backward walk rejects it
        let mut lp = Lp::new(OptimisationDirection::Minimise);
        let x = lp.add_var(1.0, (0.0, INF));
        lp.add_constraint(&[(x, 1.0)], (f64::NEG_INFINITY, 1.0));
        lp.add_constraint(&[(x, 1.0)], (f64::NEG_INFINITY, 1.0));
        let instance = {
            let mut instance = SimplexInstance::try_new(&lp, Options::default()).unwrap();
            instance.base_lower = vec![f64::NEG_INFINITY, 0.9];
            instance.base_upper = vec![1.0, 1.0];
            instance.base_value = vec![1.05005, 2.0];
            instance
        };
        let mut engine = PrimalSimplex::new(&instance);
        engine.solve_phase = SolvePhase::Phase1;
        engine.move_in = 1;
        engine.theta_dual = -2.0;
        engine.col_aq.push(0, 0.05);
        engine.col_aq.push(1, 1.0);

        engine.phase1_choose_row(&instance);
        assert_eq!(engine.row_out, Some(1));
        assert_eq!(engine.move_out, 1);
    }

    #[test]
    fn shift_bound_leaves_value_strictly_feasible() {
        let tolerance = 1e-7;
        let random_value = 0.37;
        let mut bound = 1.0;
        let mut sum_shift = 0.0;
        shift_bound(false, 0, 1.5, random_value, tolerance, &mut bound, &mut sum_shift);
        let feasibility = (1.0 + random_value) * tolerance;
        assert!(bound > 1.5);
        assert!((bound - 1.5 - feasibility).abs() < 1e-12);
        assert!((sum_shift - (bound - 1.0)).abs() < 1e-12);

        let mut lower = -2.0;
        let mut lower_shift = 0.0;
        shift_bound(true, 1, -2.5, random_value, tolerance, &mut lower, &mut lower_shift);
        assert!(lower < -2.5);
        assert!((-2.5 - lower - feasibility).abs() < 1e-12);
    }

    #[test]
    fn perturbed_bound_is_removed_by_cleanup() {
        let mut lp = Lp::new(OptimisationDirection::Minimise);
        let x = lp.add_var(1.0, (0.0, 2.0));
        lp.add_constraint(&[(x, 1.0)], (0.0, 4.0));
        let mut instance = SimplexInstance::try_new(&lp, Options::default()).unwrap();
        let mut engine = PrimalSimplex::new(&instance);
        engine.solve_phase = SolvePhase::Phase2;

        // an entering value just beyond its upper bound is absorbed by a
        // bound shift when perturbation is allowed
        engine.value_in = 2.001;
        engine.consider_infeasible_value_in(&mut instance, 0);
        assert!(instance.bounds_perturbed);
        assert!(instance.work_upper[0] > 2.001);
        assert!(instance.work_upper_shift[0] > 0.0);
        assert!(!engine.rebuild_reason.is_set());

        // cleanup restores the original bounds exactly
        engine.cleanup(&mut instance);
        assert_eq!(instance.work_upper[0], 2.0);
        assert_eq!(instance.work_upper_shift[0], 0.0);
        assert!(!instance.bounds_perturbed);
        assert!(!instance.allow_bound_perturbation);
    }

    #[test]
    fn entering_infeasibility_without_perturbation_demands_rebuild() {
        let mut lp = Lp::new(OptimisationDirection::Minimise);
        let x = lp.add_var(1.0, (0.0, 2.0));
        lp.add_constraint(&[(x, 1.0)], (0.0, 4.0));
        let options = Options {
            allow_bound_perturbation: false,
            ..Options::default()
        };
        let mut instance = SimplexInstance::try_new(&lp, options).unwrap();
        let mut engine = PrimalSimplex::new(&instance);
        engine.solve_phase = SolvePhase::Phase2;
        engine.value_in = 2.001;
        engine.consider_infeasible_value_in(&mut instance, 0);
        assert!(!instance.bounds_perturbed);
        assert_eq!(instance.work_upper[0], 2.0);
        assert_eq!(
            engine.rebuild_reason,
            RebuildReason::PrimalInfeasibleInPrimalSimplex
        );
    }

    #[test]
    fn devex_reset_restores_reference_framework() {
        let mut lp = Lp::new(OptimisationDirection::Minimise);
        let x = lp.add_var(1.0, (0.0, 2.0));
        let y = lp.add_var(1.0, (0.0, 2.0));
        lp.add_constraint(&[(x, 1.0), (y, 1.0)], (1.0, INF));
        let (mut instance, mut engine, status) = run(&lp, debug_options());
        assert_eq!(status, SolveStatus::Ok);

        engine.reset_devex(&mut instance);
        for j in 0..instance.num_tot {
            assert_eq!(engine.devex_weight[j], 1.0);
            assert_eq!(engine.devex_index[j], u8::from(instance.nonbasic_flag[j]));
        }
    }

    #[test]
    fn rebuild_is_idempotent() {
        let mut lp = Lp::new(OptimisationDirection::Minimise);
        let x = lp.add_var(1.0, (0.0, 2.0));
        let y = lp.add_var(1.0, (0.0, 2.0));
        lp.add_constraint(&[(x, 1.0), (y, 1.0)], (1.0, INF));
        let mut instance = SimplexInstance::try_new(&lp, Options::default()).unwrap();
        let mut engine = PrimalSimplex::new(&instance);
        engine.solve_phase = SolvePhase::Phase1;

        engine.rebuild(&mut instance);
        assert!(engine.solve_phase.is_solving());
        let base_value = instance.base_value.clone();
        let work_dual = instance.work_dual.clone();
        let work_cost = instance.work_cost.clone();
        let objective = instance.primal_objective_value;

        engine.rebuild(&mut instance);
        assert_eq!(instance.base_value, base_value);
        assert_eq!(instance.work_dual, work_dual);
        assert_eq!(instance.work_cost, work_cost);
        assert_eq!(instance.primal_objective_value, objective);
    }

    #[test]
    fn equality_constraint_through_phase1() {
        // min x + y subject to x + y = 2
        let mut lp = Lp::new(OptimisationDirection::Minimise);
        let x = lp.add_var(1.0, (0.0, 5.0));
        let y = lp.add_var(1.0, (0.0, 5.0));
        lp.add_constraint(&[(x, 1.0), (y, 1.0)], (2.0, 2.0));

        let (instance, _, status) = run(&lp, debug_options());
        assert_eq!(status, SolveStatus::Ok);
        assert_eq!(instance.model_status(), ModelStatus::Optimal);
        let solution = instance.solution();
        assert!((solution.objective() - 2.0).abs() < 1e-9);
        assert!((solution[x] + solution[y] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn maximise_direction() {
        let mut lp = Lp::new(OptimisationDirection::Maximise);
        let x = lp.add_var(1.0, (0.0, 3.0));
        let y = lp.add_var(2.0, (0.0, 3.0));
        lp.add_constraint(&[(x, 1.0), (y, 1.0)], (f64::NEG_INFINITY, 4.0));

        let solution = lp.solve().unwrap();
        assert!((solution.objective() - 7.0).abs() < 1e-9);
        assert!((solution[x] - 1.0).abs() < 1e-9);
        assert!((solution[y] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn free_variable_gets_priority() {
        // maximise x + 2y with y free; the free column enters on |dual|
        let mut lp = Lp::new(OptimisationDirection::Maximise);
        let x = lp.add_var(1.0, (0.0, INF));
        let y = lp.add_var(2.0, (f64::NEG_INFINITY, INF));
        lp.add_constraint(&[(x, 1.0), (y, 1.0)], (f64::NEG_INFINITY, 4.0));
        lp.add_constraint(&[(x, 1.0), (y, 1.0)], (2.0, INF));
        lp.add_constraint(&[(x, 1.0), (y, -1.0)], (0.0, INF));

        let (instance, _, status) = run(&lp, debug_options());
        assert_eq!(status, SolveStatus::Ok);
        assert_eq!(instance.model_status(), ModelStatus::Optimal);
        let solution = instance.solution();
        assert!((solution[x] - 2.0).abs() < 1e-9);
        assert!((solution[y] - 2.0).abs() < 1e-9);
        assert!((solution.objective() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn hyper_chuzc_agrees_with_full_scan() {
        // several phase-2 iterations; with debug checks on, any
        // disagreement between the candidate heap and a full scan fails
        // the solve
        let mut lp = Lp::new(OptimisationDirection::Maximise);
        let x1 = lp.add_var(2.0, (0.0, 6.0));
        let x2 = lp.add_var(3.0, (0.0, 6.0));
        let x3 = lp.add_var(4.0, (0.0, 6.0));
        let x4 = lp.add_var(1.0, (0.0, 6.0));
        lp.add_constraint(
            &[(x1, 1.0), (x2, 1.0), (x3, 1.0), (x4, 1.0)],
            (f64::NEG_INFINITY, 10.0),
        );
        lp.add_constraint(&[(x1, 1.0), (x2, 2.0)], (f64::NEG_INFINITY, 8.0));
        lp.add_constraint(&[(x3, 3.0), (x4, 1.0)], (f64::NEG_INFINITY, 15.0));

        let (instance, _, status) = run(&lp, debug_options());
        assert_eq!(status, SolveStatus::Ok);
        assert_eq!(instance.model_status(), ModelStatus::Optimal);
        let solution = instance.solution();
        assert!((solution.objective() - 33.0).abs() < 1e-8);
    }

    #[test]
    fn tight_update_limit_still_solves() {
        let mut lp = Lp::new(OptimisationDirection::Maximise);
        let x1 = lp.add_var(2.0, (0.0, 6.0));
        let x2 = lp.add_var(3.0, (0.0, 6.0));
        let x3 = lp.add_var(4.0, (0.0, 6.0));
        lp.add_constraint(&[(x1, 1.0), (x2, 1.0), (x3, 1.0)], (f64::NEG_INFINITY, 10.0));
        lp.add_constraint(&[(x1, 1.0), (x2, 2.0)], (f64::NEG_INFINITY, 8.0));
        let options = Options {
            update_limit: 1,
            debug_level: 2,
            ..Options::default()
        };
        let (instance, _, status) = run(&lp, options);
        assert_eq!(status, SolveStatus::Ok);
        assert_eq!(instance.model_status(), ModelStatus::Optimal);
    }

    #[test]
    fn iteration_limit_bails_out_with_warning() {
        let mut lp = Lp::new(OptimisationDirection::Minimise);
        let x = lp.add_var(1.0, (0.0, 2.0));
        let y = lp.add_var(1.0, (0.0, 2.0));
        lp.add_constraint(&[(x, 1.0), (y, 1.0)], (1.0, INF));
        let options = Options {
            iteration_limit: 0,
            ..Options::default()
        };
        let (instance, _, status) = run(&lp, options);
        assert_eq!(status, SolveStatus::Warning);
        assert_eq!(instance.model_status(), ModelStatus::NotSet);
    }
}
