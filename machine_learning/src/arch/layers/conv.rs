use std::{collections::HashMap, sync::Arc};

use log::debug;
use parking_lot::RwLock;

use crate::{
    MlErr, Result,
    autodiff::{GatherIndex, Var},
};

const KERNEL: usize = 3;
const STRIDE: usize = 2;

/// A 3x3, stride 2 convolution with `SAME` padding over `(n * h * w, c)` feature maps.
///
/// The kernel is a `(9 * c_in, c_out)` matrix whose row `(kh * 3 + kw) * c_in + c` holds the
/// weights of input channel `c` at kernel position `(kh, kw)`. The patch extraction tables are
/// built the first time a batch size is seen and reused afterwards.
#[derive(Debug)]
pub struct Conv2d {
    height: usize,
    width: usize,
    in_channels: usize,
    out_channels: usize,
    patches: RwLock<HashMap<usize, Arc<GatherIndex>>>,
}

impl Conv2d {
    pub fn new(height: usize, width: usize, in_channels: usize, out_channels: usize) -> Self {
        Self {
            height,
            width,
            in_channels,
            out_channels,
            patches: RwLock::new(HashMap::new()),
        }
    }

    pub fn kernel_shape(&self) -> (usize, usize) {
        (KERNEL * KERNEL * self.in_channels, self.out_channels)
    }

    /// The `(fan_in, fan_out)` of the kernel, each output (input) unit sees a 3x3 window of
    /// every input (output) channel.
    pub fn fans(&self) -> (usize, usize) {
        (KERNEL * KERNEL * self.in_channels, KERNEL * KERNEL * self.out_channels)
    }

    /// The `(height, width)` of the produced feature maps.
    pub fn output_size(&self) -> (usize, usize) {
        (self.height.div_ceil(STRIDE), self.width.div_ceil(STRIDE))
    }

    /// How many batch sizes have a patch table built.
    pub fn cached_batches(&self) -> usize {
        self.patches.read().len()
    }

    /// Convolves the feature maps `x` with `kernel` and adds `bias`.
    ///
    /// # Arguments
    /// * `x` - A `(n * height * width, in_channels)` matrix, pixels in row-major order.
    /// * `kernel` - A `kernel_shape()` matrix.
    /// * `bias` - A `(1, out_channels)` matrix.
    ///
    /// # Returns
    /// The `(n * out_h * out_w, out_channels)` output or an error if any shape is off.
    pub fn forward(&self, x: &Var, kernel: &Var, bias: &Var) -> Result<Var> {
        let (rows, channels) = x.shape();
        let pixels = self.height * self.width;

        if channels != self.in_channels || rows % pixels != 0 {
            return Err(MlErr::ShapeMismatch {
                what: "convolution input".into(),
                got: (rows, channels),
                expected: (rows.next_multiple_of(pixels.max(1)), self.in_channels),
            });
        }

        check_shape("convolution kernel", kernel, self.kernel_shape())?;
        check_shape("convolution bias", bias, (1, self.out_channels))?;

        let patches = self.patches(rows / pixels)?;
        let out = x.gather(&patches).matmul(kernel);
        Ok(out.add(&bias.broadcast_rows(out.shape().0)))
    }

    fn patches(&self, batch: usize) -> Result<Arc<GatherIndex>> {
        if let Some(index) = self.patches.read().get(&batch) {
            return Ok(Arc::clone(index));
        }

        let index = Arc::new(self.build_patches(batch)?);
        debug!(
            batch = batch, height = self.height, width = self.width;
            "built convolution patch table"
        );

        let mut patches = self.patches.write();
        Ok(Arc::clone(patches.entry(batch).or_insert(index)))
    }

    fn build_patches(&self, batch: usize) -> Result<GatherIndex> {
        let (h, w) = (self.height, self.width);
        let (oh, ow) = self.output_size();
        let pad_top = ((oh - 1) * STRIDE + KERNEL).saturating_sub(h) / 2;
        let pad_left = ((ow - 1) * STRIDE + KERNEL).saturating_sub(w) / 2;

        let mut index = Vec::with_capacity(batch * oh * ow * KERNEL * KERNEL);

        for n in 0..batch {
            for i in 0..oh {
                for j in 0..ow {
                    for kh in 0..KERNEL {
                        for kw in 0..KERNEL {
                            let r = (i * STRIDE + kh).checked_sub(pad_top).filter(|&r| r < h);
                            let c = (j * STRIDE + kw).checked_sub(pad_left).filter(|&c| c < w);
                            index.push(r.zip(c).map(|(r, c)| (n * h + r) * w + c));
                        }
                    }
                }
            }
        }

        GatherIndex::new(batch * h * w, KERNEL * KERNEL, index)
    }
}

pub(crate) fn check_shape(what: &str, var: &Var, expected: (usize, usize)) -> Result<()> {
    if var.shape() != expected {
        return Err(MlErr::ShapeMismatch {
            what: what.to_string(),
            got: var.shape(),
            expected,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, array};

    use super::*;

    #[test]
    fn same_padding_halves_the_resolution() {
        assert_eq!(Conv2d::new(120, 120, 3, 32).output_size(), (60, 60));
        assert_eq!(Conv2d::new(15, 15, 32, 32).output_size(), (8, 8));
        assert_eq!(Conv2d::new(1, 1, 32, 32).output_size(), (1, 1));
    }

    #[test]
    fn center_tap_kernel_subsamples() {
        // A 4x4 single channel image, the kernel only looks at its center tap.
        let conv = Conv2d::new(4, 4, 1, 1);
        let x = Var::constant(Array2::from_shape_fn((16, 1), |(i, _)| i as f32));
        let mut k = Array2::zeros((9, 1));
        k[[4, 0]] = 1.;

        let out = conv
            .forward(&x, &Var::constant(k), &Var::constant(array![[0.5]]))
            .unwrap();

        // The padding goes to the bottom and right, so the centers are (1,1) (1,3) (3,1) (3,3).
        assert_eq!(out.value(), &array![[5.5], [7.5], [13.5], [15.5]]);
    }

    #[test]
    fn padding_taps_read_zeros() {
        let conv = Conv2d::new(2, 2, 1, 1);
        let x = Var::constant(array![[1.], [2.], [3.], [4.]]);
        let k = Var::constant(Array2::ones((9, 1)));

        let out = conv.forward(&x, &k, &Var::constant(array![[0.]])).unwrap();

        // One output pixel whose window covers the whole image plus padding.
        assert_eq!(out.value(), &array![[10.]]);
    }

    #[test]
    fn batches_do_not_mix() {
        let conv = Conv2d::new(2, 2, 1, 1);
        let x = Var::constant(array![[1.], [2.], [3.], [4.], [10.], [20.], [30.], [40.]]);
        let k = Var::constant(Array2::ones((9, 1)));

        let out = conv.forward(&x, &k, &Var::constant(array![[0.]])).unwrap();

        assert_eq!(out.value(), &array![[10.], [100.]]);
    }

    #[test]
    fn patch_tables_are_cached_per_batch_size() {
        let conv = Conv2d::new(2, 2, 1, 1);
        let k = Var::constant(Array2::ones((9, 1)));
        let b = Var::constant(array![[0.]]);
        assert_eq!(conv.cached_batches(), 0);

        conv.forward(&Var::constant(Array2::zeros((4, 1))), &k, &b).unwrap();
        conv.forward(&Var::constant(Array2::zeros((4, 1))), &k, &b).unwrap();
        assert_eq!(conv.cached_batches(), 1);

        conv.forward(&Var::constant(Array2::zeros((8, 1))), &k, &b).unwrap();
        assert_eq!(conv.cached_batches(), 2);
    }

    #[test]
    fn rejects_wrong_channels() {
        let conv = Conv2d::new(2, 2, 3, 1);
        let k = Var::constant(Array2::ones((27, 1)));
        let b = Var::constant(array![[0.]]);

        assert!(matches!(
            conv.forward(&Var::constant(Array2::zeros((4, 1))), &k, &b),
            Err(MlErr::ShapeMismatch { .. })
        ));
    }
}
