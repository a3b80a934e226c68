mod cross_entropy;
mod loss_fn;

pub use cross_entropy::{SigmoidCrossEntropy, SoftmaxCrossEntropy};
pub use loss_fn::LossFn;
