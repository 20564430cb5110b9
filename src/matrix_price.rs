//! Price client over the structural columns.
//!
//! PRICE forms the product of a row vector (in basis space) with the
//! structural matrix, producing the tableau-row image over nonbasic
//! structural columns. Three variants are kept: column-wise (dense
//! operand), row-wise with a sparse result (sparse operand), and row-wise
//! with a switch to dense accumulation when the result fills in. Both
//! matrix orientations are held, as the solver touches rows and columns.

use crate::lp::CsMat;
use crate::sparse_vector::{SparseVector, ZERO_DROP_TOLERANCE};

/// Result density at which row-wise PRICE abandons its sparse result.
pub(crate) const HYPER_PRICE_DENSITY: f64 = 0.1;

/// Sentinel magnitude marking a cancelled result entry as still listed.
const CANCELLED_ENTRY: f64 = 1e-50;

#[derive(Debug)]
pub(crate) struct PriceMatrix {
    num_col: usize,
    csr: CsMat,
    csc: CsMat,
    /// Nonzeros over the nonbasic structural columns; the expected result
    /// size of a row-wise PRICE.
    nonbasic_nnz: usize,
}

impl PriceMatrix {
    pub fn new(csr: CsMat) -> PriceMatrix {
        let csc = csr.to_csc();
        let nonbasic_nnz = csr.nnz();
        let num_col = csr.cols();
        PriceMatrix {
            num_col,
            csr,
            csc,
            nonbasic_nnz,
        }
    }

    pub fn csc(&self) -> &CsMat {
        &self.csc
    }

    pub fn nonbasic_nnz(&self) -> usize {
        self.nonbasic_nnz
    }

    pub fn col(&self, j: usize) -> sprs::CsVecViewI<'_, f64, usize> {
        self.csc.outer_view(j).expect("column in range")
    }

    /// Track a structural column moving between the basic and nonbasic
    /// partitions.
    pub fn update_partition(&mut self, entering: Option<usize>, leaving: Option<usize>) {
        if let Some(j) = entering {
            self.nonbasic_nnz -= self.col(j).nnz();
        }
        if let Some(j) = leaving {
            self.nonbasic_nnz += self.col(j).nnz();
        }
    }

    /// Column-wise PRICE. Computes every structural component, then zeroes
    /// the basic ones so the result is supported on nonbasic columns only.
    pub fn price_by_column(
        &self,
        result: &mut SparseVector,
        input: &SparseVector,
        nonbasic_flag: &[bool],
    ) {
        result.clear();
        for j in 0..self.num_col {
            if !nonbasic_flag[j] {
                continue;
            }
            let mut sum = 0.0;
            for (r, &a) in self.col(j).iter() {
                sum += input.array[r] * a;
            }
            result.array[j] = sum;
        }
        result.pack();
    }

    /// Row-wise PRICE with a sparse result, skipping basic columns.
    pub fn price_by_row_sparse_result(
        &self,
        result: &mut SparseVector,
        input: &SparseVector,
        nonbasic_flag: &[bool],
    ) {
        result.clear();
        for k in 0..input.count {
            let row = input.index[k];
            let multiplier = input.array[row];
            self.price_row_into(result, row, multiplier, nonbasic_flag);
        }
        drop_cancelled(result);
    }

    /// Row-wise PRICE that abandons index maintenance once the result
    /// grows past `switch_density`, finishing densely.
    pub fn price_by_row_with_switch(
        &self,
        result: &mut SparseVector,
        input: &SparseVector,
        nonbasic_flag: &[bool],
        switch_density: f64,
    ) {
        result.clear();
        let switch_count = (switch_density * self.num_col as f64) as usize;
        let mut next = 0;
        while next < input.count {
            if result.count > switch_count {
                break;
            }
            let row = input.index[next];
            let multiplier = input.array[row];
            self.price_row_into(result, row, multiplier, nonbasic_flag);
            next += 1;
        }
        if next < input.count {
            // finish the remaining rows without touching the index list
            for k in next..input.count {
                let row = input.index[k];
                let multiplier = input.array[row];
                for (j, &a) in self.csr.outer_view(row).expect("row in range").iter() {
                    if nonbasic_flag[j] {
                        result.array[j] += multiplier * a;
                    }
                }
            }
            result.pack();
        } else {
            drop_cancelled(result);
        }
    }

    /// Dense PRICE of every structural component, basic columns included.
    pub fn full_price(&self, input: &SparseVector, result: &mut SparseVector) {
        result.clear();
        for j in 0..self.num_col {
            let mut sum = 0.0;
            for (r, &a) in self.col(j).iter() {
                sum += input.array[r] * a;
            }
            result.array[j] = sum;
        }
        result.pack();
    }

    fn price_row_into(
        &self,
        result: &mut SparseVector,
        row: usize,
        multiplier: f64,
        nonbasic_flag: &[bool],
    ) {
        for (j, &a) in self.csr.outer_view(row).expect("row in range").iter() {
            if !nonbasic_flag[j] {
                continue;
            }
            if result.array[j] == 0.0 {
                result.index[result.count] = j;
                result.count += 1;
            }
            result.array[j] += multiplier * a;
            if result.array[j] == 0.0 {
                // keep cancelled entries listed until the final sweep
                result.array[j] = CANCELLED_ENTRY;
            }
        }
    }
}

/// Compact the index list, dropping entries that cancelled away.
fn drop_cancelled(result: &mut SparseVector) {
    let mut kept = 0;
    for k in 0..result.count {
        let j = result.index[k];
        if result.array[j].abs() > ZERO_DROP_TOLERANCE {
            result.index[kept] = j;
            kept += 1;
        } else {
            result.array[j] = 0.0;
        }
    }
    result.count = kept;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_matrix() -> PriceMatrix {
        // rows: [1 2 0 1; 0 1 3 0; 2 0 0 -1]
        let csr = CsMat::new(
            (3, 4),
            vec![0, 3, 5, 7],
            vec![0, 1, 3, 1, 2, 0, 3],
            vec![1.0, 2.0, 1.0, 1.0, 3.0, 2.0, -1.0],
        );
        PriceMatrix::new(csr)
    }

    fn packed(dim: usize, entries: &[(usize, f64)]) -> SparseVector {
        let mut v = SparseVector::new(dim);
        for &(i, x) in entries {
            v.push(i, x);
        }
        v
    }

    #[test]
    fn column_and_row_price_agree() {
        let matrix = test_matrix();
        let input = packed(3, &[(0, 2.0), (2, -1.0)]);
        let flag = vec![true, true, false, true];

        let mut by_col = SparseVector::new(4);
        matrix.price_by_column(&mut by_col, &input, &flag);
        let mut by_row = SparseVector::new(4);
        matrix.price_by_row_sparse_result(&mut by_row, &input, &flag);
        let mut by_switch = SparseVector::new(4);
        matrix.price_by_row_with_switch(&mut by_switch, &input, &flag, 0.25);

        // expected: col0: 2*1 - 1*2 = 0, col1: 2*2 = 4, col2 masked, col3: 2*1 + 1 = 3
        for j in 0..4 {
            assert!((by_col.array[j] - by_row.array[j]).abs() < 1e-12);
            assert!((by_col.array[j] - by_switch.array[j]).abs() < 1e-12);
        }
        assert_eq!(by_col.array[1], 4.0);
        assert_eq!(by_col.array[2], 0.0);
        assert_eq!(by_col.array[3], 3.0);
        // the cancelled component of column 0 must not be listed
        assert!(!by_row.iter().any(|(j, _)| j == 0));
    }

    #[test]
    fn full_price_ignores_partition() {
        let matrix = test_matrix();
        let input = packed(3, &[(1, 1.0)]);
        let mut result = SparseVector::new(4);
        matrix.full_price(&input, &mut result);
        assert_eq!(result.array, vec![0.0, 1.0, 3.0, 0.0]);
    }

    #[test]
    fn partition_tracking() {
        let mut matrix = test_matrix();
        let total = matrix.nonbasic_nnz;
        matrix.update_partition(Some(0), None);
        assert_eq!(matrix.nonbasic_nnz, total - 2);
        matrix.update_partition(None, Some(0));
        assert_eq!(matrix.nonbasic_nnz, total);
    }
}
