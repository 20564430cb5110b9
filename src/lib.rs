/*!
A primal revised simplex solver for linear programming.

[Linear programming](https://en.wikipedia.org/wiki/Linear_programming) is a
technique for finding the minimum (or maximum) of a linear function of a set
of continuous variables subject to linear constraints.

# Features

* Pure Rust implementation of the primal revised simplex method on a
  factorized basis, in two phases.
* Devex pricing with a hyper-sparse candidate heap in phase 2.
* Harris-style two-pass ratio tests, bound flips, and bound perturbation to
  recover from an infeasible entering value.
* Cooperative bailout on iteration count, wall-clock time or an external
  stop flag.

# Entry points

Begin by creating an [`Lp`], declaring variables and adding doubly-bounded
constraints. Solving it produces a [`Solution`] with the optimal objective
value and variable values. For control over options and access to solver
state, build a [`SimplexInstance`] and drive a [`PrimalSimplex`] directly.

# Example

```
use primalp::{Lp, OptimisationDirection};

// Maximise x + 2y subject to x + y <= 4, 2x + y >= 2,
// with x >= 0 and 0 <= y <= 3.
let mut lp = Lp::new(OptimisationDirection::Maximise);
let x = lp.add_var(1.0, (0.0, f64::INFINITY));
let y = lp.add_var(2.0, (0.0, 3.0));
lp.add_constraint(&[(x, 1.0), (y, 1.0)], (f64::NEG_INFINITY, 4.0));
lp.add_constraint(&[(x, 2.0), (y, 1.0)], (2.0, f64::INFINITY));

// The optimal value is 7, achieved at x = 1 and y = 3.
let solution = lp.solve().unwrap();
assert_eq!(solution.objective(), 7.0);
assert_eq!(solution[x], 1.0);
assert_eq!(solution[y], 3.0);
```
*/

mod basis_factor;
mod heap;
mod indexed_set;
pub mod lp;
mod matrix_price;
pub mod options;
pub mod primal_simplex;
pub mod simplex_instance;
mod sparse_vector;
pub mod status;

pub use lp::{Error, Lp, OptimisationDirection, Solution, Variable};
pub use options::{Options, PriceStrategy};
pub use primal_simplex::PrimalSimplex;
pub use simplex_instance::SimplexInstance;
pub use status::{ModelStatus, SolveStatus};
