//! Factorization client for the simplex basis.
//!
//! Holds an LU factorization (partial pivoting) of the current basis matrix
//! of `[A I]` together with a product-form eta file accumulated from pivot
//! updates. Forward solves (FTRAN) run the LU solve and then the eta
//! inverses in push order; transpose solves (BTRAN) run the eta transposes
//! in reverse order and then the transposed LU solve.
//!
//! The factorization is deliberately dense: the engine above it is the
//! subject, and all of its hybrid sparse/dense behavior is driven by the
//! packed result vectors, which this client maintains.

use crate::lp::CsMat;
use crate::sparse_vector::SparseVector;

/// A pivot smaller than this during factorization marks the basis as rank
/// deficient.
const SINGULAR_PIVOT_TOLERANCE: f64 = 1e-11;

/// Eta entries smaller than this are not stored.
const ETA_DROP_TOLERANCE: f64 = 1e-14;

#[derive(Debug)]
pub(crate) struct BasisFactor {
    num_row: usize,
    /// Row-major LU storage: unit-diagonal L strictly below the diagonal,
    /// U on and above it.
    lu: Vec<f64>,
    /// Row permutation: permuted equation `k` is original row `perm[k]`.
    perm: Vec<usize>,
    eta: EtaFile,
    /// Cost estimate of the factorization, against which accumulated
    /// update ticks are compared to schedule the next refactorization.
    pub build_synthetic_tick: f64,
}

#[derive(Default, Debug)]
struct EtaFile {
    pivot_rows: Vec<usize>,
    starts: Vec<usize>,
    indices: Vec<usize>,
    values: Vec<f64>,
}

impl EtaFile {
    fn len(&self) -> usize {
        self.pivot_rows.len()
    }

    fn clear(&mut self) {
        self.pivot_rows.clear();
        self.starts.clear();
        self.starts.push(0);
        self.indices.clear();
        self.values.clear();
    }

    fn col(&self, k: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.starts[k]..self.starts[k + 1];
        self.indices[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }
}

impl BasisFactor {
    pub fn new(num_row: usize) -> BasisFactor {
        let mut eta = EtaFile::default();
        eta.clear();
        BasisFactor {
            num_row,
            lu: vec![0.0; num_row * num_row],
            perm: (0..num_row).collect(),
            eta,
            build_synthetic_tick: 0.0,
        }
    }

    /// Factorize the basis selected by `basic_index` from the columns of
    /// `[A I]`, where `csc` holds the structural columns. Clears the eta
    /// file. Returns the rank deficiency (0 for a nonsingular basis).
    pub fn factorize(&mut self, num_col: usize, basic_index: &[usize], csc: &CsMat) -> usize {
        let n = self.num_row;
        debug_assert_eq!(basic_index.len(), n);
        self.lu.iter_mut().for_each(|v| *v = 0.0);
        for (k, &var) in basic_index.iter().enumerate() {
            if var < num_col {
                for (row, &value) in csc.outer_view(var).expect("column in range").iter() {
                    self.lu[row * n + k] = value;
                }
            } else {
                self.lu[(var - num_col) * n + k] = 1.0;
            }
        }
        for (k, p) in self.perm.iter_mut().enumerate() {
            *p = k;
        }

        let mut rank_deficiency = 0;
        for k in 0..n {
            let mut pivot_row = k;
            let mut pivot_abs = self.lu[k * n + k].abs();
            for r in k + 1..n {
                let candidate = self.lu[r * n + k].abs();
                if candidate > pivot_abs {
                    pivot_abs = candidate;
                    pivot_row = r;
                }
            }
            if pivot_row != k {
                self.perm.swap(k, pivot_row);
                for c in 0..n {
                    self.lu.swap(k * n + c, pivot_row * n + c);
                }
            }
            if pivot_abs < SINGULAR_PIVOT_TOLERANCE {
                rank_deficiency += 1;
                self.lu[k * n + k] = 1.0;
            }
            let pivot = self.lu[k * n + k];
            for r in k + 1..n {
                let multiplier = self.lu[r * n + k] / pivot;
                if multiplier != 0.0 {
                    self.lu[r * n + k] = multiplier;
                    for c in k + 1..n {
                        self.lu[r * n + c] -= multiplier * self.lu[k * n + c];
                    }
                }
            }
        }

        self.eta.clear();
        self.build_synthetic_tick = 10.0 * n as f64 + 0.5 * (n * n) as f64;
        rank_deficiency
    }

    /// Solve `B x = rhs` in place, leaving the result packed.
    pub fn ftran(&self, rhs: &mut SparseVector) {
        let n = self.num_row;
        let mut x = vec![0.0; n];
        for k in 0..n {
            x[k] = rhs.array[self.perm[k]];
        }
        for k in 0..n {
            let xk = x[k];
            if xk != 0.0 {
                for r in k + 1..n {
                    x[r] -= self.lu[r * n + k] * xk;
                }
            }
        }
        for k in (0..n).rev() {
            let mut sum = x[k];
            for c in k + 1..n {
                sum -= self.lu[k * n + c] * x[c];
            }
            x[k] = sum / self.lu[k * n + k];
        }
        rhs.array.copy_from_slice(&x);

        // apply eta inverses in push order
        for e in 0..self.eta.len() {
            let pivot_row = self.eta.pivot_rows[e];
            let coeff = rhs.array[pivot_row];
            if coeff != 0.0 {
                for (r, v) in self.eta.col(e) {
                    rhs.array[r] -= coeff * v;
                }
            }
        }
        rhs.pack();
        rhs.synthetic_tick =
            n as f64 + 10.0 * rhs.count as f64 + self.eta.values.len() as f64;
    }

    /// Solve `B^T y = rhs` in place, leaving the result packed.
    pub fn btran(&self, rhs: &mut SparseVector) {
        let n = self.num_row;
        // apply transposed eta inverses in reverse order
        for e in (0..self.eta.len()).rev() {
            let mut coeff = 0.0;
            for (r, v) in self.eta.col(e) {
                coeff += v * rhs.array[r];
            }
            rhs.array[self.eta.pivot_rows[e]] -= coeff;
        }

        let mut z = vec![0.0; n];
        z.copy_from_slice(&rhs.array);
        // forward solve through U', backward through unit-diagonal L'
        for k in 0..n {
            let mut sum = z[k];
            for r in 0..k {
                sum -= self.lu[r * n + k] * z[r];
            }
            z[k] = sum / self.lu[k * n + k];
        }
        for k in (0..n).rev() {
            let zk = z[k];
            if zk != 0.0 {
                for r in 0..k {
                    z[r] -= self.lu[k * n + r] * zk;
                }
            }
        }
        for k in 0..n {
            rhs.array[self.perm[k]] = z[k];
        }
        rhs.pack();
        rhs.synthetic_tick =
            n as f64 + 10.0 * rhs.count as f64 + self.eta.values.len() as f64;
    }

    /// Record the rank-one basis change that replaces the column pivotal in
    /// `row_out` with the entering column whose FTRANned image is `col_aq`.
    pub fn update(&mut self, col_aq: &SparseVector, row_out: usize) {
        let pivot = col_aq.array[row_out];
        debug_assert!(pivot != 0.0);
        self.eta.pivot_rows.push(row_out);
        for (r, w) in col_aq.iter() {
            let v = if r == row_out {
                1.0 - 1.0 / pivot
            } else {
                w / pivot
            };
            if v.abs() > ETA_DROP_TOLERANCE {
                self.eta.indices.push(r);
                self.eta.values.push(v);
            }
        }
        self.eta.starts.push(self.eta.indices.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lp::CsMat;

    fn two_by_two() -> CsMat {
        // structural columns [2, 1]' and [1, 3]'
        CsMat::new_csc((2, 2), vec![0, 2, 4], vec![0, 1, 0, 1], vec![2.0, 1.0, 1.0, 3.0])
    }

    fn packed(dim: usize, entries: &[(usize, f64)]) -> SparseVector {
        let mut v = SparseVector::new(dim);
        for &(i, x) in entries {
            v.push(i, x);
        }
        v
    }

    #[test]
    fn ftran_btran_round_trip() {
        let csc = two_by_two();
        let mut factor = BasisFactor::new(2);
        assert_eq!(factor.factorize(2, &[0, 1], &csc), 0);

        // B = [[2,1],[1,3]], det 5
        let mut rhs = packed(2, &[(0, 1.0), (1, 0.0)]);
        factor.ftran(&mut rhs);
        assert!((rhs.array[0] - 0.6).abs() < 1e-12);
        assert!((rhs.array[1] + 0.2).abs() < 1e-12);

        let mut rhs = packed(2, &[(0, 1.0)]);
        factor.btran(&mut rhs);
        // B' x = e_0 => x = [0.6, -0.2]
        assert!((rhs.array[0] - 0.6).abs() < 1e-12);
        assert!((rhs.array[1] + 0.2).abs() < 1e-12);
    }

    #[test]
    fn logical_columns_form_identity() {
        let csc = two_by_two();
        let mut factor = BasisFactor::new(2);
        assert_eq!(factor.factorize(2, &[2, 3], &csc), 0);
        let mut rhs = packed(2, &[(0, 5.0), (1, -3.0)]);
        factor.ftran(&mut rhs);
        assert_eq!(rhs.array, vec![5.0, -3.0]);
    }

    #[test]
    fn rank_deficiency_is_reported() {
        // two copies of the same column
        let csc = CsMat::new_csc(
            (2, 2),
            vec![0, 2, 4],
            vec![0, 1, 0, 1],
            vec![1.0, 2.0, 1.0, 2.0],
        );
        let mut factor = BasisFactor::new(2);
        assert_eq!(factor.factorize(2, &[0, 1], &csc), 1);
    }

    #[test]
    fn update_matches_refactorization() {
        let csc = two_by_two();
        let mut factor = BasisFactor::new(2);
        factor.factorize(2, &[2, 3], &csc);

        // bring structural column 0 into basis position 0
        let mut col_aq = packed(2, &[(0, 2.0), (1, 1.0)]);
        factor.ftran(&mut col_aq);
        factor.update(&col_aq, 0);

        let mut solved = packed(2, &[(0, 1.0), (1, 1.0)]);
        factor.ftran(&mut solved);

        let mut refactored = BasisFactor::new(2);
        refactored.factorize(2, &[0, 3], &csc);
        let mut reference = packed(2, &[(0, 1.0), (1, 1.0)]);
        refactored.ftran(&mut reference);

        for r in 0..2 {
            assert!((solved.array[r] - reference.array[r]).abs() < 1e-12);
        }

        let mut solved_t = packed(2, &[(1, 1.0)]);
        factor.btran(&mut solved_t);
        let mut reference_t = packed(2, &[(1, 1.0)]);
        refactored.btran(&mut reference_t);
        for r in 0..2 {
            assert!((solved_t.array[r] - reference_t.array[r]).abs() < 1e-12);
        }
    }
}
