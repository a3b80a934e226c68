use std::{cell::RefCell, rc::Rc};

use rand::rngs::StdRng;

use super::{Model, activations::ActFn, layers::dense};
use crate::{
    MlErr, Result,
    autodiff::Var,
    initialization::{ConstParamGen, ParamGen, RandParamGen},
    params::{ParamStore, Weights, weight},
};

/// A fully connected network over the flattened image, hidden widths `4h, 2h, h`.
#[derive(Debug)]
pub struct VanillaDenseModel {
    dims: Vec<usize>,
    act_fn: ActFn,
}

impl VanillaDenseModel {
    pub const NAME: &'static str = "VanillaDenseModel";

    pub fn new(channels: usize, dim_hidden: usize, dim_output: usize, img_size: usize) -> Self {
        let dim_input = img_size * img_size * channels;

        Self {
            dims: vec![
                dim_input,
                4 * dim_hidden,
                2 * dim_hidden,
                dim_hidden,
                dim_output,
            ],
            act_fn: ActFn::Relu,
        }
    }

    fn layers(&self) -> impl Iterator<Item = (usize, (usize, usize))> + '_ {
        self.dims
            .windows(2)
            .enumerate()
            .map(|(i, dim)| (i + 1, (dim[0], dim[1])))
    }
}

impl Model for VanillaDenseModel {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn dim_input(&self) -> usize {
        self.dims[0]
    }

    fn dim_output(&self) -> usize {
        self.dims[self.dims.len() - 1]
    }

    fn init_params(&self, rng: Rc<RefCell<StdRng>>) -> Result<ParamStore> {
        let mut store = ParamStore::new();

        for (i, (fan_in, fan_out)) in self.layers() {
            let mut w = RandParamGen::normal(rng.clone(), 0., 0.01)?;
            store.insert(format!("w{i}"), w.generate((fan_in, fan_out)));
            store.insert(format!("b{i}"), ConstParamGen::zeros().generate((1, fan_out)));
        }

        Ok(store)
    }

    fn forward(&self, x: &Var, weights: &Weights) -> Result<Var> {
        let features = x.shape().1;
        if features != self.dim_input() {
            return Err(MlErr::SizeMismatch {
                what: "model input features",
                got: features,
                expected: self.dim_input(),
            });
        }

        let last = self.dims.len() - 1;
        let mut hidden = x.clone();

        for (i, _) in self.layers() {
            let w = weight(weights, &format!("w{i}"))?;
            let b = weight(weights, &format!("b{i}"))?;

            hidden = dense(&hidden, w, b)?;
            if i < last {
                hidden = self.act_fn.apply(&hidden);
            }
        }

        Ok(hidden)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn layer_shapes_and_forward() {
        let model = VanillaDenseModel::new(3, 2, 3, 2);
        let rng = Rc::new(RefCell::new(StdRng::seed_from_u64(0)));
        let store = model.init_params(rng).unwrap();

        assert_eq!(store.get("w1").unwrap().dim(), (12, 8));
        assert_eq!(store.get("w2").unwrap().dim(), (8, 4));
        assert_eq!(store.get("w3").unwrap().dim(), (4, 2));
        assert_eq!(store.get("w4").unwrap().dim(), (2, 3));
        assert_eq!(store.len(), 8);

        let x = Var::constant(Array2::ones((5, 12)));
        let logits = model.forward(&x, &store.leaves(false)).unwrap();
        assert_eq!(logits.shape(), (5, 3));
    }
}
