//! The exclusively-owned solver-state aggregate.
//!
//! One `SimplexInstance` holds everything a solve mutates: the basis, the
//! work and base vectors, the factorization and price clients, counters
//! and objective bookkeeping. The iterating engine borrows it mutably per
//! operation and records its outcome explicitly, so there is no shared
//! mutable graph between components.
//!
//! Variables are indexed `0..num_tot` with the structural columns first
//! and one logical per row after them; logical `i` carries the value
//! `-(Ax)_i`, so its bounds are the negated, swapped row bounds and the
//! full system is `[A I]x = 0`.

use std::sync::atomic::Ordering;
use std::time::Instant;

use log::warn;
use rand::Rng;
use rand_chacha::rand_core::SeedableRng;

use crate::basis_factor::BasisFactor;
use crate::lp::{Error, Lp, OptimisationDirection, Solution};
use crate::matrix_price::{PriceMatrix, HYPER_PRICE_DENSITY};
use crate::options::{Options, PriceStrategy};
use crate::sparse_vector::SparseVector;
use crate::status::ModelStatus;

/// Operand density beyond which the switching strategy prices column-wise.
const COL_PRICE_DENSITY: f64 = 0.75;

/// Seed for the per-variable jitter vector; fixed so bound shifts are
/// deterministic across runs.
const RANDOM_JITTER_SEED: u64 = 42;

#[derive(Debug)]
pub struct SimplexInstance {
    pub(crate) num_col: usize,
    pub(crate) num_row: usize,
    pub(crate) num_tot: usize,
    pub(crate) options: Options,

    sense: OptimisationDirection,
    orig_col_cost: Vec<f64>,
    /// Computational-form bounds before any perturbation.
    orig_lower: Vec<f64>,
    orig_upper: Vec<f64>,

    pub(crate) matrix: PriceMatrix,
    pub(crate) factor: BasisFactor,

    pub(crate) basic_index: Vec<usize>,
    /// true = nonbasic.
    pub(crate) nonbasic_flag: Vec<bool>,
    /// +1 at lower bound, -1 at upper bound, 0 for free or fixed.
    pub(crate) nonbasic_move: Vec<i8>,

    pub(crate) work_cost: Vec<f64>,
    pub(crate) work_dual: Vec<f64>,
    pub(crate) work_lower: Vec<f64>,
    pub(crate) work_upper: Vec<f64>,
    pub(crate) work_value: Vec<f64>,
    pub(crate) work_lower_shift: Vec<f64>,
    pub(crate) work_upper_shift: Vec<f64>,

    pub(crate) base_lower: Vec<f64>,
    pub(crate) base_upper: Vec<f64>,
    pub(crate) base_value: Vec<f64>,

    pub(crate) num_tot_random_value: Vec<f64>,

    pub(crate) num_primal_infeasibility: usize,
    pub(crate) max_primal_infeasibility: f64,
    pub(crate) sum_primal_infeasibility: f64,
    pub(crate) primal_infeasibility_count_valid: bool,
    pub(crate) num_dual_infeasibility: usize,
    pub(crate) max_dual_infeasibility: f64,
    pub(crate) sum_dual_infeasibility: f64,
    pub(crate) dual_infeasibility_count_valid: bool,

    pub(crate) primal_objective_value: f64,
    pub(crate) updated_primal_objective_value: f64,
    pub(crate) dual_objective_value: f64,
    pub(crate) has_primal_objective_value: bool,
    pub(crate) has_dual_objective_value: bool,

    pub(crate) iteration_count: usize,
    pub(crate) primal_phase1_iteration_count: usize,
    pub(crate) primal_phase2_iteration_count: usize,
    pub(crate) update_count: usize,
    pub(crate) num_bound_swap: usize,

    pub(crate) has_invert: bool,
    pub(crate) has_fresh_rebuild: bool,
    pub(crate) bounds_perturbed: bool,
    pub(crate) allow_bound_perturbation: bool,

    pub(crate) build_synthetic_tick: f64,
    pub(crate) total_synthetic_tick: f64,

    pub(crate) model_status: ModelStatus,
    pub(crate) solve_bailout: bool,
    start_time: Instant,
}

impl SimplexInstance {
    /// Build a solver instance from an LP, starting from the logical basis
    /// with every structural variable nonbasic on a bound (or at zero if
    /// free).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoConstraints`] for a problem without rows and
    /// [`Error::Infeasible`] when some variable or row has crossed bounds.
    pub fn try_new(lp: &Lp, options: Options) -> Result<SimplexInstance, Error> {
        let num_col = lp.num_col();
        let num_row = lp.num_row();
        let num_tot = num_col + num_row;
        if num_row == 0 {
            return Err(Error::NoConstraints);
        }
        for j in 0..num_col {
            if lp.col_lower[j] > lp.col_upper[j] {
                return Err(Error::Infeasible);
            }
        }
        for i in 0..num_row {
            if lp.row_lower[i] > lp.row_upper[i] {
                return Err(Error::Infeasible);
            }
        }

        let mut orig_lower = Vec::with_capacity(num_tot);
        let mut orig_upper = Vec::with_capacity(num_tot);
        orig_lower.extend_from_slice(&lp.col_lower);
        orig_upper.extend_from_slice(&lp.col_upper);
        for i in 0..num_row {
            orig_lower.push(-lp.row_upper[i]);
            orig_upper.push(-lp.row_lower[i]);
        }

        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(RANDOM_JITTER_SEED);
        let num_tot_random_value: Vec<f64> = (0..num_tot).map(|_| rng.gen::<f64>()).collect();

        let mut instance = SimplexInstance {
            num_col,
            num_row,
            num_tot,
            options,
            sense: lp.direction,
            orig_col_cost: lp.col_cost.clone(),
            orig_lower,
            orig_upper,
            matrix: PriceMatrix::new(lp.to_csr()),
            factor: BasisFactor::new(num_row),
            basic_index: (num_col..num_tot).collect(),
            nonbasic_flag: (0..num_tot).map(|j| j < num_col).collect(),
            nonbasic_move: vec![0; num_tot],
            work_cost: vec![0.0; num_tot],
            work_dual: vec![0.0; num_tot],
            work_lower: vec![0.0; num_tot],
            work_upper: vec![0.0; num_tot],
            work_value: vec![0.0; num_tot],
            work_lower_shift: vec![0.0; num_tot],
            work_upper_shift: vec![0.0; num_tot],
            base_lower: vec![0.0; num_row],
            base_upper: vec![0.0; num_row],
            base_value: vec![0.0; num_row],
            num_tot_random_value,
            num_primal_infeasibility: 0,
            max_primal_infeasibility: 0.0,
            sum_primal_infeasibility: 0.0,
            primal_infeasibility_count_valid: false,
            num_dual_infeasibility: 0,
            max_dual_infeasibility: 0.0,
            sum_dual_infeasibility: 0.0,
            dual_infeasibility_count_valid: false,
            primal_objective_value: 0.0,
            updated_primal_objective_value: 0.0,
            dual_objective_value: 0.0,
            has_primal_objective_value: false,
            has_dual_objective_value: false,
            iteration_count: 0,
            primal_phase1_iteration_count: 0,
            primal_phase2_iteration_count: 0,
            update_count: 0,
            num_bound_swap: 0,
            has_invert: false,
            has_fresh_rebuild: false,
            bounds_perturbed: false,
            allow_bound_perturbation: false,
            model_status: ModelStatus::NotSet,
            solve_bailout: false,
            build_synthetic_tick: 0.0,
            total_synthetic_tick: 0.0,
            start_time: Instant::now(),
        };
        instance.allow_bound_perturbation = instance.options.allow_bound_perturbation;

        instance.initialise_bound();
        instance.initialise_cost();
        for j in 0..num_tot {
            if !instance.nonbasic_flag[j] {
                continue;
            }
            let lower = instance.work_lower[j];
            let upper = instance.work_upper[j];
            let (mv, value) = if lower == upper {
                (0, lower)
            } else if lower.is_finite() && upper.is_finite() {
                if lower.abs() <= upper.abs() {
                    (1, lower)
                } else {
                    (-1, upper)
                }
            } else if lower.is_finite() {
                (1, lower)
            } else if upper.is_finite() {
                (-1, upper)
            } else {
                (0, 0.0)
            };
            instance.nonbasic_move[j] = mv;
            instance.work_value[j] = value;
        }

        let rank_deficiency = instance.compute_factor();
        debug_assert_eq!(rank_deficiency, 0, "logical basis must be nonsingular");
        instance.has_invert = rank_deficiency == 0;

        instance.compute_primal();
        instance.compute_simplex_primal_infeasible();
        Ok(instance)
    }

    pub(crate) fn start_solve_clock(&mut self) {
        self.start_time = Instant::now();
    }

    /// Refactorize the basis selected by `basic_index`. Returns the rank
    /// deficiency; on success the factorization is fresh and the eta file
    /// is empty.
    pub(crate) fn compute_factor(&mut self) -> usize {
        let SimplexInstance {
            factor,
            matrix,
            basic_index,
            num_col,
            ..
        } = self;
        let rank_deficiency = factor.factorize(*num_col, basic_index, matrix.csc());
        if rank_deficiency == 0 {
            self.has_invert = true;
        }
        rank_deficiency
    }

    /// Solve `B col_aq = a_variable` for the entering column.
    pub(crate) fn pivot_column_ftran(&self, variable: usize, col_aq: &mut SparseVector) {
        col_aq.clear();
        if variable < self.num_col {
            for (r, &a) in self.matrix.col(variable).iter() {
                col_aq.push(r, a);
            }
        } else {
            col_aq.push(variable - self.num_col, 1.0);
        }
        self.factor.ftran(col_aq);
    }

    /// Solve `B^T row_ep = e_row` for the pivotal row.
    pub(crate) fn unit_btran(&self, row: usize, row_ep: &mut SparseVector) {
        row_ep.clear();
        row_ep.push(row, 1.0);
        self.factor.btran(row_ep);
    }

    pub(crate) fn full_btran(&self, buffer: &mut SparseVector) {
        self.factor.btran(buffer);
    }

    pub(crate) fn full_price(&self, buffer: &SparseVector, result: &mut SparseVector) {
        self.matrix.full_price(buffer, result);
    }

    /// Price the pivotal row into `row_ap` over the nonbasic structural
    /// columns, selecting the technique from the operand density.
    pub(crate) fn tableau_row_price(&self, row_ep: &SparseVector, row_ap: &mut SparseVector) {
        let density = row_ep.count as f64 / self.num_row as f64;
        let (use_col_price, use_row_price_w_switch) = self.choose_price_technique(density);
        // a sparse result can never exceed the nonbasic partition size, so
        // a small partition makes the switch machinery pointless
        let result_can_fill = self.matrix.nonbasic_nnz() as f64
            > HYPER_PRICE_DENSITY * self.num_col as f64;
        if use_col_price {
            self.matrix
                .price_by_column(row_ap, row_ep, &self.nonbasic_flag);
        } else if use_row_price_w_switch && result_can_fill {
            self.matrix.price_by_row_with_switch(
                row_ap,
                row_ep,
                &self.nonbasic_flag,
                HYPER_PRICE_DENSITY,
            );
        } else {
            self.matrix
                .price_by_row_sparse_result(row_ap, row_ep, &self.nonbasic_flag);
        }
    }

    /// Returns `(use_col_price, use_row_price_with_switch)`.
    pub(crate) fn choose_price_technique(&self, density: f64) -> (bool, bool) {
        match self.options.price_strategy {
            PriceStrategy::Col => (true, false),
            PriceStrategy::Row => (false, false),
            PriceStrategy::RowSwitch => (false, true),
            PriceStrategy::RowSwitchColSwitch => (density > COL_PRICE_DENSITY, true),
        }
    }

    /// Compute the basic values `B x_B = -N x_N` from scratch and refresh
    /// the basic bound views.
    pub(crate) fn compute_primal(&mut self) {
        let mut buffer = SparseVector::new(self.num_row);
        for j in 0..self.num_tot {
            if !self.nonbasic_flag[j] || self.work_value[j] == 0.0 {
                continue;
            }
            let value = self.work_value[j];
            if j < self.num_col {
                for (r, &a) in self.matrix.col(j).iter() {
                    buffer.array[r] -= value * a;
                }
            } else {
                buffer.array[j - self.num_col] -= value;
            }
        }
        buffer.pack();
        self.factor.ftran(&mut buffer);
        for r in 0..self.num_row {
            self.base_value[r] = buffer.array[r];
            let variable = self.basic_index[r];
            self.base_lower[r] = self.work_lower[variable];
            self.base_upper[r] = self.work_upper[variable];
        }
    }

    /// Compute all duals from scratch: `B^T pi = c_B`, then reduced costs
    /// for the nonbasic columns (zero for basic ones).
    pub(crate) fn compute_dual(&mut self) {
        let mut buffer = SparseVector::new(self.num_row);
        for r in 0..self.num_row {
            buffer.array[r] = self.work_cost[self.basic_index[r]];
        }
        buffer.pack();
        self.factor.btran(&mut buffer);

        let mut buffer_long = SparseVector::new(self.num_col);
        self.matrix.full_price(&buffer, &mut buffer_long);
        for j in 0..self.num_col {
            self.work_dual[j] = self.work_cost[j] - buffer_long.array[j];
        }
        for i in 0..self.num_row {
            let j = self.num_col + i;
            self.work_dual[j] = self.work_cost[j] - buffer.array[i];
        }
        for j in 0..self.num_tot {
            if !self.nonbasic_flag[j] {
                self.work_dual[j] = 0.0;
            }
        }
    }

    /// Count primal infeasibilities over nonbasic values and basic values.
    pub(crate) fn compute_simplex_primal_infeasible(&mut self) {
        let tolerance = self.options.primal_feasibility_tolerance;
        let mut num = 0;
        let mut max = 0.0_f64;
        let mut sum = 0.0;
        for j in 0..self.num_tot {
            if !self.nonbasic_flag[j] {
                continue;
            }
            let value = self.work_value[j];
            let mut infeasibility = 0.0;
            if value < self.work_lower[j] - tolerance {
                infeasibility = self.work_lower[j] - value;
            } else if value > self.work_upper[j] + tolerance {
                infeasibility = value - self.work_upper[j];
            }
            if infeasibility > 0.0 {
                num += 1;
                max = max.max(infeasibility);
                sum += infeasibility;
            }
        }
        for r in 0..self.num_row {
            let value = self.base_value[r];
            let mut infeasibility = 0.0;
            if value < self.base_lower[r] - tolerance {
                infeasibility = self.base_lower[r] - value;
            } else if value > self.base_upper[r] + tolerance {
                infeasibility = value - self.base_upper[r];
            }
            if infeasibility > 0.0 {
                num += 1;
                max = max.max(infeasibility);
                sum += infeasibility;
            }
        }
        self.num_primal_infeasibility = num;
        self.max_primal_infeasibility = max;
        self.sum_primal_infeasibility = sum;
        self.primal_infeasibility_count_valid = true;
    }

    /// Count dual infeasibilities over the nonbasic columns.
    pub(crate) fn compute_simplex_dual_infeasible(&mut self) {
        let tolerance = self.options.dual_feasibility_tolerance;
        let mut num = 0;
        let mut max = 0.0_f64;
        let mut sum = 0.0;
        for j in 0..self.num_tot {
            if !self.nonbasic_flag[j] {
                continue;
            }
            let free = self.work_lower[j] == f64::NEG_INFINITY && self.work_upper[j] == f64::INFINITY;
            let infeasibility = if free {
                self.work_dual[j].abs()
            } else {
                -f64::from(self.nonbasic_move[j]) * self.work_dual[j]
            };
            if infeasibility > 0.0 {
                if infeasibility > tolerance {
                    num += 1;
                }
                max = max.max(infeasibility);
                sum += infeasibility;
            }
        }
        self.num_dual_infeasibility = num;
        self.max_dual_infeasibility = max;
        self.sum_dual_infeasibility = sum;
        self.dual_infeasibility_count_valid = true;
    }

    /// Reset the working bounds to their unperturbed values and clear the
    /// shift accumulators.
    pub(crate) fn initialise_bound(&mut self) {
        self.work_lower.copy_from_slice(&self.orig_lower);
        self.work_upper.copy_from_slice(&self.orig_upper);
        self.work_lower_shift.iter_mut().for_each(|s| *s = 0.0);
        self.work_upper_shift.iter_mut().for_each(|s| *s = 0.0);
    }

    /// Reset the working costs to the sense-signed objective (zero for
    /// logicals).
    pub(crate) fn initialise_cost(&mut self) {
        let sense_sign = match self.sense {
            OptimisationDirection::Minimise => 1.0,
            OptimisationDirection::Maximise => -1.0,
        };
        for j in 0..self.num_col {
            self.work_cost[j] = sense_sign * self.orig_col_cost[j];
        }
        for j in self.num_col..self.num_tot {
            self.work_cost[j] = 0.0;
        }
    }

    /// Put every bounded nonbasic variable back on the bound selected by
    /// its move; free variables keep their value.
    pub(crate) fn initialise_nonbasic_work_value(&mut self) {
        for j in 0..self.num_tot {
            if !self.nonbasic_flag[j] {
                continue;
            }
            if self.work_lower[j] == self.work_upper[j] {
                self.work_value[j] = self.work_lower[j];
            } else if self.nonbasic_move[j] > 0 {
                self.work_value[j] = self.work_lower[j];
            } else if self.nonbasic_move[j] < 0 {
                self.work_value[j] = self.work_upper[j];
            }
        }
    }

    /// Objective of the current point under the working costs.
    pub(crate) fn compute_primal_objective_value(&mut self) {
        let mut objective = 0.0;
        for r in 0..self.num_row {
            objective += self.base_value[r] * self.work_cost[self.basic_index[r]];
        }
        for j in 0..self.num_tot {
            if self.nonbasic_flag[j] {
                objective += self.work_value[j] * self.work_cost[j];
            }
        }
        self.primal_objective_value = objective;
        self.has_primal_objective_value = true;
    }

    pub(crate) fn compute_dual_objective_value(&mut self) {
        let mut objective = 0.0;
        for j in 0..self.num_tot {
            if self.nonbasic_flag[j] {
                objective += self.work_value[j] * self.work_dual[j];
            }
        }
        self.dual_objective_value = objective;
        self.has_dual_objective_value = true;
    }

    /// Swap the entering and leaving variables in the basis records. The
    /// leaving variable lands on its lower bound for `move_out == -1`, its
    /// upper bound for `move_out == +1`, or its fixed value.
    pub(crate) fn update_pivots(&mut self, variable_in: usize, row_out: usize, move_out: i8) {
        let variable_out = self.basic_index[row_out];
        self.basic_index[row_out] = variable_in;
        self.nonbasic_flag[variable_in] = false;
        self.nonbasic_move[variable_in] = 0;
        self.nonbasic_flag[variable_out] = true;
        if self.work_lower[variable_out] == self.work_upper[variable_out] {
            self.work_value[variable_out] = self.work_lower[variable_out];
            self.nonbasic_move[variable_out] = 0;
        } else if move_out == -1 {
            self.work_value[variable_out] = self.work_lower[variable_out];
            self.nonbasic_move[variable_out] = 1;
        } else {
            self.work_value[variable_out] = self.work_upper[variable_out];
            self.nonbasic_move[variable_out] = -1;
        }
        self.base_lower[row_out] = self.work_lower[variable_in];
        self.base_upper[row_out] = self.work_upper[variable_in];
        self.has_fresh_rebuild = false;
    }

    /// Apply the rank-one factor update for the pivot. Returns true when
    /// the synthetic clock says a refactorization now beats further
    /// updates.
    pub(crate) fn update_factor(&mut self, col_aq: &SparseVector, row_out: usize) -> bool {
        self.factor.update(col_aq, row_out);
        self.update_count += 1;
        self.total_synthetic_tick > self.build_synthetic_tick
    }

    /// Track the structural partition change for the price client.
    pub(crate) fn update_matrix(&mut self, variable_in: usize, variable_out: usize) {
        let entering = (variable_in < self.num_col).then_some(variable_in);
        let leaving = (variable_out < self.num_col).then_some(variable_out);
        self.matrix.update_partition(entering, leaving);
    }

    pub(crate) fn invalidate_dual_infeasibility_record(&mut self) {
        self.dual_infeasibility_count_valid = false;
    }

    pub(crate) fn bailout_return(&self) -> bool {
        self.solve_bailout
    }

    /// Check the iteration, time and stop-flag limits, latching the
    /// bailout state.
    pub(crate) fn bailout_on_time_iterations(&mut self) -> bool {
        if self.solve_bailout {
            return true;
        }
        if self.iteration_count >= self.options.iteration_limit {
            warn!(
                "reached iteration limit {} - bailing out",
                self.options.iteration_limit
            );
            self.solve_bailout = true;
        } else if let Some(limit) = self.options.time_limit {
            if self.start_time.elapsed() >= limit {
                warn!("reached time limit {:?} - bailing out", limit);
                self.solve_bailout = true;
            }
        }
        if let Some(stop) = &self.options.stop {
            if stop.load(Ordering::Relaxed) {
                warn!("stop requested - bailing out");
                self.solve_bailout = true;
            }
        }
        self.solve_bailout
    }

    /// Number of simplex iterations performed so far.
    pub fn iteration_count(&self) -> usize {
        self.iteration_count
    }

    /// Number of bound swaps performed so far.
    pub fn bound_swap_count(&self) -> usize {
        self.num_bound_swap
    }

    /// The model classification reached by the last solve.
    pub fn model_status(&self) -> ModelStatus {
        self.model_status
    }

    /// Extract the structural solution and the sense-corrected objective.
    pub fn solution(&self) -> Solution {
        let mut col_value = vec![0.0; self.num_col];
        for j in 0..self.num_col {
            if self.nonbasic_flag[j] {
                col_value[j] = self.work_value[j];
            }
        }
        for r in 0..self.num_row {
            let variable = self.basic_index[r];
            if variable < self.num_col {
                col_value[variable] = self.base_value[r];
            }
        }
        let objective = col_value
            .iter()
            .zip(&self.orig_col_cost)
            .map(|(x, c)| x * c)
            .sum();
        Solution {
            col_value,
            objective,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lp::Lp;

    fn small_lp() -> Lp {
        let mut lp = Lp::new(OptimisationDirection::Minimise);
        let x = lp.add_var(1.0, (0.0, 2.0));
        let y = lp.add_var(1.0, (0.0, 2.0));
        lp.add_constraint(&[(x, 1.0), (y, 1.0)], (1.0, f64::INFINITY));
        lp
    }

    #[test]
    fn computational_form() {
        let instance = SimplexInstance::try_new(&small_lp(), Options::default()).unwrap();
        assert_eq!(instance.num_tot, 3);
        // logical bounds are the negated, swapped row bounds
        assert_eq!(instance.work_lower[2], f64::NEG_INFINITY);
        assert_eq!(instance.work_upper[2], -1.0);
        // logical basis, structurals nonbasic at their lower bounds
        assert_eq!(instance.basic_index, vec![2]);
        assert_eq!(instance.nonbasic_move[0], 1);
        assert_eq!(instance.nonbasic_move[1], 1);
        // the logical sits at 0, above its upper bound of -1
        assert_eq!(instance.base_value[0], 0.0);
        assert_eq!(instance.num_primal_infeasibility, 1);
    }

    #[test]
    fn crossed_bounds_rejected() {
        let mut lp = Lp::new(OptimisationDirection::Minimise);
        let x = lp.add_var(1.0, (1.0, 0.0));
        lp.add_constraint(&[(x, 1.0)], (0.0, 1.0));
        assert_eq!(
            SimplexInstance::try_new(&lp, Options::default()).unwrap_err(),
            Error::Infeasible
        );

        let empty = Lp::new(OptimisationDirection::Minimise);
        assert_eq!(
            SimplexInstance::try_new(&empty, Options::default()).unwrap_err(),
            Error::NoConstraints
        );
    }

    #[test]
    fn compute_dual_masks_basic_columns() {
        let mut instance = SimplexInstance::try_new(&small_lp(), Options::default()).unwrap();
        // phase-2 costs: structural duals are the costs under the logical
        // basis (pi = 0), logical duals zero because the logical is basic
        instance.compute_dual();
        assert_eq!(instance.work_dual[0], 1.0);
        assert_eq!(instance.work_dual[1], 1.0);
        assert_eq!(instance.work_dual[2], 0.0);
    }
}
