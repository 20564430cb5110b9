/// A hybrid sparse/dense working vector.
///
/// The dense `array` always holds the full vector; `index[..count]` lists
/// the positions of its nonzeros when the vector is in packed form. Callers
/// that fill entries directly are responsible for keeping the list in step,
/// or for calling [`SparseVector::pack`] to rebuild it by scanning.
///
/// `synthetic_tick` is a running cost estimate of the work spent producing
/// the current contents; the solver compares accumulated ticks against the
/// cost of refactorizing to decide when an update sequence has become more
/// expensive than starting over.
#[derive(Clone, Debug)]
pub(crate) struct SparseVector {
    pub count: usize,
    pub index: Vec<usize>,
    pub array: Vec<f64>,
    pub synthetic_tick: f64,
}

/// Entries smaller than this in magnitude are dropped when packing.
pub(crate) const ZERO_DROP_TOLERANCE: f64 = 1e-14;

impl SparseVector {
    pub fn new(dim: usize) -> SparseVector {
        SparseVector {
            count: 0,
            index: vec![0; dim],
            array: vec![0.0; dim],
            synthetic_tick: 0.0,
        }
    }

    pub fn dim(&self) -> usize {
        self.array.len()
    }

    /// Zero the vector, using the index list when it is sparse enough for
    /// a packed clear to beat a dense fill.
    pub fn clear(&mut self) {
        if self.count * 4 < self.dim() {
            for k in 0..self.count {
                self.array[self.index[k]] = 0.0;
            }
        } else {
            self.array.iter_mut().for_each(|v| *v = 0.0);
        }
        self.count = 0;
        self.synthetic_tick = 0.0;
    }

    /// Append a nonzero at position `i`. The position must currently be
    /// zero and not listed.
    pub fn push(&mut self, i: usize, value: f64) {
        self.array[i] = value;
        self.index[self.count] = i;
        self.count += 1;
    }

    /// Rebuild the index list by scanning the dense array, dropping
    /// near-zero entries.
    pub fn pack(&mut self) {
        self.count = 0;
        for i in 0..self.array.len() {
            if self.array[i].abs() > ZERO_DROP_TOLERANCE {
                self.index[self.count] = i;
                self.count += 1;
            } else {
                self.array[i] = 0.0;
            }
        }
    }

    /// Iterate the packed nonzeros as `(position, value)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.index[..self.count].iter().map(|&i| (i, self.array[i]))
    }
}

/// Decide between iterating a packed index list and scanning the dense
/// array: indices win while the vector is under a tenth full. Returns
/// `(use_indices, loop_bound)`.
pub(crate) fn sparse_loop_style(count: usize, dim: usize) -> (bool, usize) {
    if count > 0 && count * 10 < dim {
        (true, count)
    } else {
        (false, dim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_clear_pack() {
        let mut v = SparseVector::new(8);
        v.push(3, 1.5);
        v.push(6, -2.0);
        assert_eq!(v.count, 2);
        assert_eq!(v.iter().collect::<Vec<_>>(), vec![(3, 1.5), (6, -2.0)]);

        v.clear();
        assert_eq!(v.count, 0);
        assert!(v.array.iter().all(|&x| x == 0.0));

        v.array[1] = 0.5;
        v.array[4] = 1e-30;
        v.array[7] = -3.0;
        v.pack();
        assert_eq!(v.count, 2);
        assert_eq!(v.iter().collect::<Vec<_>>(), vec![(1, 0.5), (7, -3.0)]);
        assert_eq!(v.array[4], 0.0);
    }

    #[test]
    fn loop_style_threshold() {
        assert_eq!(sparse_loop_style(0, 100), (false, 100));
        assert_eq!(sparse_loop_style(5, 100), (true, 5));
        assert_eq!(sparse_loop_style(10, 100), (false, 100));
        assert_eq!(sparse_loop_style(50, 100), (false, 100));
    }
}
