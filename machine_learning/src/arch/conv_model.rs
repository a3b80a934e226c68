use std::{cell::RefCell, rc::Rc};

use rand::rngs::StdRng;

use super::{
    Model,
    activations::ActFn,
    layers::{Conv2d, batch_norm, dense, global_avg_pool},
};
use crate::{
    MlErr, Result,
    autodiff::Var,
    initialization::{ConstParamGen, ParamGen, RandParamGen},
    params::{ParamStore, Weights, weight},
};

const BLOCKS: usize = 4;

/// Four `conv 3x3 / stride 2 -> batch norm -> relu` blocks, a global average pool and a linear
/// head.
///
/// Inputs are `(n, img_size * img_size * channels)` rows holding the images in `HWC` order.
/// Weights are `conv1..conv4` with biases `b1..b4`, then `w5` and `b5` for the head.
#[derive(Debug)]
pub struct VanillaConvModel {
    channels: usize,
    dim_hidden: usize,
    dim_output: usize,
    img_size: usize,
    convs: Vec<Conv2d>,
    act_fn: ActFn,
}

impl VanillaConvModel {
    pub const NAME: &'static str = "VanillaConvModel";

    /// Creates a new `VanillaConvModel`.
    ///
    /// # Arguments
    /// * `channels` - The channels of the input images.
    /// * `dim_hidden` - The amount of filters of every convolution.
    /// * `dim_output` - The amount of logits.
    /// * `img_size` - The side of the square input images.
    pub fn new(channels: usize, dim_hidden: usize, dim_output: usize, img_size: usize) -> Self {
        let mut convs = Vec::with_capacity(BLOCKS);
        let mut side = img_size;
        let mut in_channels = channels;

        for _ in 0..BLOCKS {
            let conv = Conv2d::new(side, side, in_channels, dim_hidden);
            side = conv.output_size().0;
            in_channels = dim_hidden;
            convs.push(conv);
        }

        Self {
            channels,
            dim_hidden,
            dim_output,
            img_size,
            convs,
            act_fn: ActFn::Relu,
        }
    }

    /// The side of the feature maps entering the pooling layer.
    pub fn final_side(&self) -> usize {
        self.convs.last().map_or(self.img_size, |c| c.output_size().0)
    }

    /// How many batch sizes the convolutions have patch tables for.
    pub fn cached_batches(&self) -> usize {
        self.convs.first().map_or(0, Conv2d::cached_batches)
    }
}

impl Model for VanillaConvModel {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn dim_input(&self) -> usize {
        self.img_size * self.img_size * self.channels
    }

    fn dim_output(&self) -> usize {
        self.dim_output
    }

    fn init_params(&self, rng: Rc<RefCell<StdRng>>) -> Result<ParamStore> {
        let mut store = ParamStore::new();

        for (i, conv) in self.convs.iter().enumerate() {
            let (rows, out) = conv.kernel_shape();
            let (fan_in, fan_out) = conv.fans();

            let mut kernel = RandParamGen::xavier_uniform(rng.clone(), fan_in, fan_out)?;
            store.insert(format!("conv{}", i + 1), kernel.generate((rows, out)));
            store.insert(format!("b{}", i + 1), ConstParamGen::zeros().generate((1, out)));
        }

        let head = (self.dim_hidden, self.dim_output);
        let mut w5 = RandParamGen::normal(rng, 0., 0.01)?;
        store.insert("w5", w5.generate(head));
        store.insert("b5", ConstParamGen::zeros().generate((1, head.1)));

        Ok(store)
    }

    fn forward(&self, x: &Var, weights: &Weights) -> Result<Var> {
        let (n, features) = x.shape();
        if features != self.dim_input() {
            return Err(MlErr::SizeMismatch {
                what: "model input features",
                got: features,
                expected: self.dim_input(),
            });
        }

        let side = self.img_size;
        let mut hidden = x.reshape(n * side * side, self.channels);

        for (i, conv) in self.convs.iter().enumerate() {
            let kernel = weight(weights, &format!("conv{}", i + 1))?;
            let bias = weight(weights, &format!("b{}", i + 1))?;

            let out = conv.forward(&hidden, kernel, bias)?;
            hidden = self.act_fn.apply(&batch_norm(&out));
        }

        let side = self.final_side();
        let pooled = global_avg_pool(&hidden, side * side);

        dense(&pooled, weight(weights, "w5")?, weight(weights, "b5")?)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    fn rng() -> Rc<RefCell<StdRng>> {
        Rc::new(RefCell::new(StdRng::seed_from_u64(123)))
    }

    #[test]
    fn weight_keys_and_shapes() {
        let model = VanillaConvModel::new(3, 8, 7, 16);
        let store = model.init_params(rng()).unwrap();

        let keys: Vec<_> = store.keys().cloned().collect();
        assert_eq!(
            keys,
            ["b1", "b2", "b3", "b4", "b5", "conv1", "conv2", "conv3", "conv4", "w5"]
        );
        assert_eq!(store.get("conv1").unwrap().dim(), (27, 8));
        assert_eq!(store.get("conv4").unwrap().dim(), (72, 8));
        assert_eq!(store.get("w5").unwrap().dim(), (8, 7));
        assert_eq!(store.get("b5").unwrap().dim(), (1, 7));
        assert_eq!(model.final_side(), 1);
    }

    #[test]
    fn forward_shape() {
        let model = VanillaConvModel::new(3, 4, 7, 8);
        let weights = model.init_params(rng()).unwrap().leaves(false);
        let x = Var::constant(ndarray::Array2::from_shape_fn((5, 8 * 8 * 3), |(i, j)| {
            ((i * 31 + j * 7) % 11) as f32 / 11.
        }));

        let logits = model.forward(&x, &weights).unwrap();

        assert_eq!(logits.shape(), (5, 7));
        assert!(logits.value().iter().all(|v| v.is_finite()));
        assert_eq!(model.cached_batches(), 1);
    }

    #[test]
    fn missing_weight() {
        let model = VanillaConvModel::new(3, 4, 7, 8);
        let mut weights = model.init_params(rng()).unwrap().leaves(false);
        weights.remove("conv3");
        let x = Var::constant(ndarray::Array2::zeros((2, 8 * 8 * 3)));

        assert_eq!(
            model.forward(&x, &weights).unwrap_err(),
            MlErr::MissingParam {
                name: "conv3".into()
            }
        );
    }

    #[test]
    fn wrong_input_width() {
        let model = VanillaConvModel::new(3, 4, 7, 8);
        let weights = model.init_params(rng()).unwrap().leaves(false);
        let x = Var::constant(ndarray::Array2::zeros((2, 10)));

        assert!(matches!(
            model.forward(&x, &weights),
            Err(MlErr::SizeMismatch { .. })
        ));
    }

    #[test]
    fn same_seed_same_init() {
        let model = VanillaConvModel::new(3, 4, 7, 8);
        assert_eq!(
            model.init_params(rng()).unwrap(),
            model.init_params(rng()).unwrap()
        );
    }
}
