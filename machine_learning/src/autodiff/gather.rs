use ndarray::{Array2, s};

use crate::{MlErr, Result};

/// A row gathering table.
///
/// Output row `r` is made of `taps` blocks, block `t` being a copy of the source row
/// `index[r * taps + t]`, or zeros when that entry is `None`. Its adjoint, `scatter_add`,
/// accumulates every block back into the source row it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatherIndex {
    src_rows: usize,
    out_rows: usize,
    taps: usize,
    index: Vec<Option<usize>>,
}

impl GatherIndex {
    /// Creates a new `GatherIndex`.
    ///
    /// # Arguments
    /// * `src_rows` - The amount of rows of the gathered matrix.
    /// * `taps` - The amount of blocks per output row.
    /// * `index` - The source row for each (output row, tap) pair, in row-major order.
    ///
    /// # Returns
    /// A new `GatherIndex` or an error if the table is inconsistent.
    pub fn new(src_rows: usize, taps: usize, index: Vec<Option<usize>>) -> Result<Self> {
        if taps == 0 {
            return Err(MlErr::SizeMismatch {
                what: "gather taps",
                got: 0,
                expected: 1,
            });
        }

        if index.len() % taps != 0 {
            return Err(MlErr::SizeMismatch {
                what: "gather index length",
                got: index.len(),
                expected: index.len().next_multiple_of(taps),
            });
        }

        if let Some(&bad) = index.iter().flatten().find(|&&src| src >= src_rows) {
            return Err(MlErr::SizeMismatch {
                what: "gather index source row",
                got: bad,
                expected: src_rows,
            });
        }

        Ok(Self {
            src_rows,
            out_rows: index.len() / taps,
            taps,
            index,
        })
    }

    pub fn src_rows(&self) -> usize {
        self.src_rows
    }

    pub fn out_rows(&self) -> usize {
        self.out_rows
    }

    pub fn taps(&self) -> usize {
        self.taps
    }

    pub(super) fn gather(&self, x: &Array2<f32>) -> Array2<f32> {
        let c = x.ncols();
        let mut out = Array2::zeros((self.out_rows, self.taps * c));

        for (r, mut row) in out.rows_mut().into_iter().enumerate() {
            for t in 0..self.taps {
                if let Some(src) = self.index[r * self.taps + t] {
                    row.slice_mut(s![t * c..(t + 1) * c]).assign(&x.row(src));
                }
            }
        }

        out
    }

    pub(super) fn scatter_add(&self, g: &Array2<f32>) -> Array2<f32> {
        let c = g.ncols() / self.taps;
        let mut out = Array2::zeros((self.src_rows, c));

        for (r, row) in g.rows().into_iter().enumerate() {
            for t in 0..self.taps {
                if let Some(src) = self.index[r * self.taps + t] {
                    let mut dst = out.row_mut(src);
                    dst += &row.slice(s![t * c..(t + 1) * c]);
                }
            }
        }

        out
    }
}
