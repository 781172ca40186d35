//! Immutable nonzero structure of matrix-valued quantities.
//!
//! Patterns are stored in compressed column format: `colind[c]..colind[c + 1]`
//! indexes the nonzeros of column `c`, whose row indices are strictly
//! increasing. The nonzeros are therefore enumerated in column-major order,
//! and two patterns compare equal only when their coordinate lists are
//! identical.

use std::fmt;

use crate::error::{Error, Result};

/// Nonzero structure of an `nrow x ncol` matrix.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "CompressedData"))]
pub struct Sparsity {
    nrow: usize,
    ncol: usize,
    colind: Vec<usize>,
    row: Vec<usize>,
}

#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct CompressedData {
    nrow: usize,
    ncol: usize,
    colind: Vec<usize>,
    row: Vec<usize>,
}

#[cfg(feature = "serde")]
impl TryFrom<CompressedData> for Sparsity {
    type Error = Error;

    fn try_from(d: CompressedData) -> Result<Self> {
        Sparsity::from_compressed(d.nrow, d.ncol, d.colind, d.row)
    }
}

impl Sparsity {
    /// Fully populated `nrow x ncol` pattern.
    pub fn dense(nrow: usize, ncol: usize) -> Self {
        let mut colind = Vec::with_capacity(ncol + 1);
        let mut row = Vec::with_capacity(nrow * ncol);
        colind.push(0);
        for _ in 0..ncol {
            row.extend(0..nrow);
            colind.push(row.len());
        }
        Sparsity {
            nrow,
            ncol,
            colind,
            row,
        }
    }

    /// Dense `1 x 1` pattern.
    pub fn scalar() -> Self {
        Self::dense(1, 1)
    }

    /// Dense column vector.
    pub fn column(n: usize) -> Self {
        Self::dense(n, 1)
    }

    /// `nrow x ncol` pattern without any nonzero.
    pub fn empty(nrow: usize, ncol: usize) -> Self {
        Sparsity {
            nrow,
            ncol,
            colind: vec![0; ncol + 1],
            row: Vec::new(),
        }
    }

    /// Square diagonal pattern.
    pub fn diag(n: usize) -> Self {
        Sparsity {
            nrow: n,
            ncol: n,
            colind: (0..=n).collect(),
            row: (0..n).collect(),
        }
    }

    /// Build a pattern from `(row, col)` coordinate lists.
    ///
    /// Coordinates may come in any order; duplicates are merged.
    pub fn from_triplets(nrow: usize, ncol: usize, rows: &[usize], cols: &[usize]) -> Result<Self> {
        if rows.len() != cols.len() {
            return Err(Error::InvalidSparsity(format!(
                "{} row indices but {} column indices",
                rows.len(),
                cols.len()
            )));
        }
        let mut coords: Vec<(usize, usize)> = Vec::with_capacity(rows.len());
        for (&r, &c) in rows.iter().zip(cols) {
            if r >= nrow || c >= ncol {
                return Err(Error::InvalidSparsity(format!(
                    "coordinate ({r}, {c}) outside a {nrow}x{ncol} matrix"
                )));
            }
            coords.push((c, r));
        }
        coords.sort_unstable();
        coords.dedup();

        let mut colind = vec![0usize; ncol + 1];
        for &(c, _) in &coords {
            colind[c + 1] += 1;
        }
        for c in 0..ncol {
            colind[c + 1] += colind[c];
        }
        let row = coords.into_iter().map(|(_, r)| r).collect();
        Ok(Sparsity {
            nrow,
            ncol,
            colind,
            row,
        })
    }

    /// Adopt compressed column arrays, checking that they describe a valid
    /// pattern.
    pub fn from_compressed(
        nrow: usize,
        ncol: usize,
        colind: Vec<usize>,
        row: Vec<usize>,
    ) -> Result<Self> {
        if colind.len() != ncol + 1 {
            return Err(Error::InvalidSparsity(format!(
                "{} column offsets for {ncol} columns",
                colind.len()
            )));
        }
        if colind[0] != 0 || colind[ncol] != row.len() {
            return Err(Error::InvalidSparsity(format!(
                "column offsets span {}..{} but there are {} nonzeros",
                colind[0],
                colind[ncol],
                row.len()
            )));
        }
        for c in 0..ncol {
            if colind[c] > colind[c + 1] {
                return Err(Error::InvalidSparsity(format!(
                    "column offsets decrease at column {c}"
                )));
            }
            let rows = &row[colind[c]..colind[c + 1]];
            if rows.iter().any(|&r| r >= nrow) {
                return Err(Error::InvalidSparsity(format!(
                    "row index out of range in column {c} of a {nrow}x{ncol} matrix"
                )));
            }
            if rows.windows(2).any(|w| w[0] >= w[1]) {
                return Err(Error::InvalidSparsity(format!(
                    "rows of column {c} are not strictly increasing"
                )));
            }
        }
        Ok(Sparsity {
            nrow,
            ncol,
            colind,
            row,
        })
    }

    #[inline]
    pub fn nrow(&self) -> usize {
        self.nrow
    }

    #[inline]
    pub fn ncol(&self) -> usize {
        self.ncol
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.nrow, self.ncol)
    }

    /// Number of entries, structural zeros included.
    #[inline]
    pub fn numel(&self) -> usize {
        self.nrow * self.ncol
    }

    /// Number of structural nonzeros.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.row.len()
    }

    pub fn is_dense(&self) -> bool {
        self.nnz() == self.numel()
    }

    /// `true` when the pattern has no nonzero at all.
    pub fn is_empty(&self) -> bool {
        self.row.is_empty()
    }

    pub fn is_scalar(&self) -> bool {
        self.nrow == 1 && self.ncol == 1
    }

    pub fn colind(&self) -> &[usize] {
        &self.colind
    }

    pub fn row(&self) -> &[usize] {
        &self.row
    }

    /// `(row, col)` of every nonzero, in column-major order.
    pub fn coordinates(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.ncol).flat_map(move |c| {
            self.row[self.colind[c]..self.colind[c + 1]]
                .iter()
                .map(move |&r| (r, c))
        })
    }

    /// Nonzero index of `(r, c)`, or `None` for a structural zero.
    pub fn get_nz(&self, r: usize, c: usize) -> Option<usize> {
        if r >= self.nrow || c >= self.ncol {
            return None;
        }
        let start = self.colind[c];
        let col = &self.row[start..self.colind[c + 1]];
        col.binary_search(&r).ok().map(|k| start + k)
    }

    pub fn same_shape(&self, other: &Sparsity) -> bool {
        self.shape() == other.shape()
    }

    /// Every nonzero of `self` is also a nonzero of `other`.
    pub fn is_subset(&self, other: &Sparsity) -> bool {
        self.same_shape(other) && self.coordinates().all(|(r, c)| other.get_nz(r, c).is_some())
    }

    /// For every nonzero of `target`, the nonzero of `self` at the same
    /// coordinate (`None` where `self` has a structural zero).
    ///
    /// Nonzeros of `self` that `target` does not contain are dropped.
    pub fn project_map(&self, target: &Sparsity) -> Result<Vec<Option<usize>>> {
        if !self.same_shape(target) {
            return Err(Error::Projection {
                from: self.dim(),
                to: target.dim(),
            });
        }
        let mut map = Vec::with_capacity(target.nnz());
        for c in 0..self.ncol {
            let mut k = self.colind[c];
            let end = self.colind[c + 1];
            for &r in &target.row[target.colind[c]..target.colind[c + 1]] {
                while k < end && self.row[k] < r {
                    k += 1;
                }
                if k < end && self.row[k] == r {
                    map.push(Some(k));
                } else {
                    map.push(None);
                }
            }
        }
        Ok(map)
    }

    /// Pattern holding the nonzeros of both operands.
    pub fn union(&self, other: &Sparsity) -> Result<Sparsity> {
        if !self.same_shape(other) {
            return Err(Error::Projection {
                from: other.dim(),
                to: self.dim(),
            });
        }
        if self == other {
            return Ok(self.clone());
        }
        let mut colind = Vec::with_capacity(self.ncol + 1);
        let mut row = Vec::with_capacity(self.nnz().max(other.nnz()));
        colind.push(0);
        for c in 0..self.ncol {
            let a = &self.row[self.colind[c]..self.colind[c + 1]];
            let b = &other.row[other.colind[c]..other.colind[c + 1]];
            let (mut i, mut j) = (0, 0);
            while i < a.len() || j < b.len() {
                let next = match (a.get(i), b.get(j)) {
                    (Some(&x), Some(&y)) if x == y => {
                        i += 1;
                        j += 1;
                        x
                    }
                    (Some(&x), Some(&y)) if x < y => {
                        i += 1;
                        x
                    }
                    (Some(_), Some(&y)) => {
                        j += 1;
                        y
                    }
                    (Some(&x), None) => {
                        i += 1;
                        x
                    }
                    (None, Some(&y)) => {
                        j += 1;
                        y
                    }
                    (None, None) => unreachable!(),
                };
                row.push(next);
            }
            colind.push(row.len());
        }
        Ok(Sparsity {
            nrow: self.nrow,
            ncol: self.ncol,
            colind,
            row,
        })
    }

    /// `"<nrow>x<ncol>"`, plus the nonzero count when not dense.
    pub fn dim(&self) -> String {
        if self.is_dense() {
            format!("{}x{}", self.nrow, self.ncol)
        } else {
            format!("{}x{},{}nz", self.nrow, self.ncol, self.nnz())
        }
    }
}

impl fmt::Display for Sparsity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_coordinates_are_column_major() {
        let sp = Sparsity::dense(2, 2);
        let coords: Vec<_> = sp.coordinates().collect();
        assert_eq!(coords, vec![(0, 0), (1, 0), (0, 1), (1, 1)]);
    }

    #[test]
    fn union_merges_columns() {
        let a = Sparsity::from_triplets(3, 2, &[0, 2], &[0, 1]).unwrap();
        let b = Sparsity::from_triplets(3, 2, &[1, 2], &[0, 1]).unwrap();
        let u = a.union(&b).unwrap();
        let coords: Vec<_> = u.coordinates().collect();
        assert_eq!(coords, vec![(0, 0), (1, 0), (2, 1)]);
    }

    #[test]
    fn project_map_drops_and_fills() {
        let from = Sparsity::from_triplets(3, 1, &[0, 2], &[0, 0]).unwrap();
        let to = Sparsity::from_triplets(3, 1, &[1, 2], &[0, 0]).unwrap();
        assert_eq!(from.project_map(&to).unwrap(), vec![None, Some(1)]);
    }
}
