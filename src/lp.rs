//! Problem container and public entry points.
//!
//! A linear program is held in standard computational form: minimise (or
//! maximise) a linear objective over box-bounded variables subject to
//! doubly-bounded linear constraints `L <= Ax <= U`. Internally the solver
//! appends one logical variable per constraint with `x_logical = -(Ax)_row`,
//! giving the square system `[A I]x = 0` in which every constraint bound
//! becomes a variable bound.

use crate::options::Options;
use crate::primal_simplex::PrimalSimplex;
use crate::simplex_instance::SimplexInstance;
use crate::status::ModelStatus;

pub(crate) type CsMat = sprs::CsMatI<f64, usize>;

/// An enum indicating whether to minimise or maximise the objective.
#[derive(Clone, Copy, Debug)]
pub enum OptimisationDirection {
    /// Minimise the objective function.
    Minimise,
    /// Maximise the objective function.
    Maximise,
}

/// A reference to a variable in a linear programming problem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Variable(pub(crate) usize);

impl Variable {
    /// Sequence number of the variable in the addition order.
    pub fn idx(&self) -> usize {
        self.0
    }
}

/// An error encountered while building or solving a problem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Constraints can't simultaneously be satisfied.
    Infeasible,
    /// The objective function is unbounded.
    Unbounded,
    /// The problem has no constraint rows; there is no basis to iterate on.
    NoConstraints,
    /// The solve ended without classifying the model (bailout or a
    /// numerical/logical failure).
    SolveFailed,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let msg = match self {
            Error::Infeasible => "problem is infeasible",
            Error::Unbounded => "problem is unbounded",
            Error::NoConstraints => "problem has no constraints",
            Error::SolveFailed => "solve failed without classifying the problem",
        };
        msg.fmt(f)
    }
}

impl std::error::Error for Error {}

/// A specification of a linear programming problem.
#[derive(Clone)]
pub struct Lp {
    pub(crate) direction: OptimisationDirection,
    pub(crate) col_cost: Vec<f64>,
    pub(crate) col_lower: Vec<f64>,
    pub(crate) col_upper: Vec<f64>,
    pub(crate) row_lower: Vec<f64>,
    pub(crate) row_upper: Vec<f64>,
    rows: Vec<(Vec<usize>, Vec<f64>)>,
}

impl std::fmt::Debug for Lp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only printing sizes here because actual data is probably huge.
        f.debug_struct("Lp")
            .field("direction", &self.direction)
            .field("num_col", &self.num_col())
            .field("num_row", &self.num_row())
            .finish()
    }
}

impl Lp {
    /// Create a new problem instance.
    pub fn new(direction: OptimisationDirection) -> Self {
        Lp {
            direction,
            col_cost: vec![],
            col_lower: vec![],
            col_upper: vec![],
            row_lower: vec![],
            row_upper: vec![],
            rows: vec![],
        }
    }

    /// Add a new variable with its objective coefficient and (inclusive)
    /// bounds. Use `f64::NEG_INFINITY` / `f64::INFINITY` for absent bounds.
    pub fn add_var(&mut self, obj_coeff: f64, (min, max): (f64, f64)) -> Variable {
        let var = Variable(self.col_cost.len());
        self.col_cost.push(obj_coeff);
        self.col_lower.push(min);
        self.col_upper.push(max);
        var
    }

    /// Add a doubly-bounded linear constraint `min <= expr <= max`.
    ///
    /// Equality constraints use `min == max`; one-sided constraints use an
    /// infinite bound on the unused side.
    ///
    /// # Panics
    ///
    /// Will panic if a variable appears more than once in `expr`.
    pub fn add_constraint(&mut self, expr: &[(Variable, f64)], (min, max): (f64, f64)) {
        let mut terms: Vec<(usize, f64)> = expr.iter().map(|&(v, c)| (v.0, c)).collect();
        terms.sort_unstable_by_key(|&(v, _)| v);
        for pair in terms.windows(2) {
            assert_ne!(pair[0].0, pair[1].0, "duplicate variable in constraint");
        }
        let (indices, values) = terms.into_iter().unzip();
        self.rows.push((indices, values));
        self.row_lower.push(min);
        self.row_upper.push(max);
    }

    /// Number of structural columns.
    pub fn num_col(&self) -> usize {
        self.col_cost.len()
    }

    /// Number of constraint rows.
    pub fn num_row(&self) -> usize {
        self.rows.len()
    }

    /// Assemble the structural matrix row-wise.
    pub(crate) fn to_csr(&self) -> CsMat {
        let mut indptr = Vec::with_capacity(self.num_row() + 1);
        let mut indices = vec![];
        let mut data = vec![];
        indptr.push(0);
        for (row_indices, row_values) in &self.rows {
            indices.extend_from_slice(row_indices);
            data.extend_from_slice(row_values);
            indptr.push(indices.len());
        }
        CsMat::new((self.num_row(), self.num_col()), indptr, indices, data)
    }

    /// Solve the problem with default options.
    ///
    /// # Errors
    ///
    /// Will return an error if the problem is infeasible, unbounded, has no
    /// constraints, or if the solve fails.
    pub fn solve(&self) -> Result<Solution, Error> {
        self.solve_with(Options::default())
    }

    /// Solve the problem with the given options.
    pub fn solve_with(&self, options: Options) -> Result<Solution, Error> {
        let mut instance = SimplexInstance::try_new(self, options)?;
        let mut engine = PrimalSimplex::new(&instance);
        engine.solve(&mut instance);
        match instance.model_status {
            ModelStatus::Optimal => Ok(instance.solution()),
            ModelStatus::PrimalInfeasible => Err(Error::Infeasible),
            ModelStatus::PrimalUnbounded | ModelStatus::PrimalDualInfeasible => {
                Err(Error::Unbounded)
            }
            _ => Err(Error::SolveFailed),
        }
    }
}

/// A solution of a problem: objective value and variable values.
#[derive(Clone, Debug)]
pub struct Solution {
    pub(crate) col_value: Vec<f64>,
    pub(crate) objective: f64,
}

impl Solution {
    /// The optimal value of the objective function, in the problem's
    /// optimisation direction.
    pub fn objective(&self) -> f64 {
        self.objective
    }

    /// Value of the variable in the optimal solution.
    pub fn var_value(&self, var: Variable) -> f64 {
        self.col_value[var.0]
    }
}

impl std::ops::Index<Variable> for Solution {
    type Output = f64;

    fn index(&self, var: Variable) -> &Self::Output {
        &self.col_value[var.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_assemble() {
        let mut lp = Lp::new(OptimisationDirection::Minimise);
        let x = lp.add_var(1.0, (0.0, 2.0));
        let y = lp.add_var(1.0, (0.0, 2.0));
        lp.add_constraint(&[(y, 2.0), (x, 1.0)], (1.0, f64::INFINITY));
        assert_eq!(lp.num_col(), 2);
        assert_eq!(lp.num_row(), 1);

        let csr = lp.to_csr();
        let row = csr.outer_view(0).unwrap();
        let entries: Vec<(usize, f64)> = row.iter().map(|(j, &v)| (j, v)).collect();
        assert_eq!(entries, vec![(0, 1.0), (1, 2.0)]);
    }

    #[test]
    #[should_panic(expected = "duplicate variable")]
    fn duplicate_variable_panics() {
        let mut lp = Lp::new(OptimisationDirection::Minimise);
        let x = lp.add_var(1.0, (0.0, 1.0));
        lp.add_constraint(&[(x, 1.0), (x, 2.0)], (0.0, 1.0));
    }
}
