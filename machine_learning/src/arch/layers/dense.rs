use super::conv::check_shape;
use crate::{MlErr, Result, autodiff::Var};

/// `x · w + b` for a `(n, d_in)` input, a `(d_in, d_out)` weight matrix and a `(1, d_out)` bias.
pub fn dense(x: &Var, w: &Var, b: &Var) -> Result<Var> {
    let (n, d_in) = x.shape();
    let (rows, d_out) = w.shape();

    if d_in != rows {
        return Err(MlErr::SizeMismatch {
            what: "dense layer input features",
            got: d_in,
            expected: rows,
        });
    }

    check_shape("dense bias", b, (1, d_out))?;
    Ok(x.matmul(w).add(&b.broadcast_rows(n)))
}
