use std::{cell::RefCell, rc::Rc};

use machine_learning::{
    arch::{
        ModelSpec, SUPPORTED_MODELS, build_model,
        loss::{LossFn, SoftmaxCrossEntropy},
    },
    autodiff::{GradMode, Var, grad},
    optimization::OptimizerSpec,
};
use ndarray::Array2;
use rand::{SeedableRng, rngs::StdRng};

const SPEC: ModelSpec = ModelSpec {
    channels: 3,
    dim_hidden: 4,
    dim_output: 3,
    img_size: 8,
};

fn batch() -> (Var, Var) {
    let x = Array2::from_shape_fn((6, 8 * 8 * 3), |(i, j)| ((i * 31 + j * 7) % 17) as f32 / 17.);
    let y = Array2::from_shape_fn((6, 3), |(i, j)| if j == usize::from(i >= 4) { 1. } else { 0. });
    (Var::constant(x), Var::constant(y))
}

fn rng() -> Rc<RefCell<StdRng>> {
    Rc::new(RefCell::new(StdRng::seed_from_u64(5)))
}

#[test]
fn every_model_has_a_gradient_for_every_weight() {
    let (x, y) = batch();

    for name in SUPPORTED_MODELS {
        let model = build_model(name, SPEC).unwrap();
        let weights = model.init_params(rng()).unwrap().leaves(true);
        let wrt: Vec<Var> = weights.values().cloned().collect();

        let loss = SoftmaxCrossEntropy
            .loss(&model.forward(&x, &weights).unwrap(), &y)
            .unwrap();
        let grads = grad(&loss, &wrt, GradMode::Graph).unwrap();

        for (w, g) in wrt.iter().zip(&grads) {
            assert_eq!(w.shape(), g.shape(), "{name}");
            assert!(g.value().iter().all(|v| v.is_finite()), "{name}");
        }
    }
}

#[test]
fn gradient_descent_lowers_the_loss() {
    let (x, y) = batch();
    let model = build_model("VanillaDenseModel", SPEC).unwrap();
    let mut params = model.init_params(rng()).unwrap();
    let spec = OptimizerSpec::GradientDescent { learning_rate: 0.1 };
    let mut losses = Vec::new();

    for _ in 0..10 {
        let weights = params.leaves(true);
        let wrt: Vec<Var> = weights.values().cloned().collect();
        let loss = SoftmaxCrossEntropy
            .loss(&model.forward(&x, &weights).unwrap(), &y)
            .unwrap();
        let grads = grad(&loss, &wrt, GradMode::Detached).unwrap();
        losses.push(loss.item());

        for ((_, value), g) in params.iter_mut().zip(&grads) {
            spec.build(value.dim()).update(g.value(), value).unwrap();
        }
    }

    assert!(losses[9] < losses[0], "{losses:?}");
}
