pub mod activations;
pub mod layers;
pub mod loss;
mod conv_model;
mod dense_model;
mod model;
mod registry;

pub use conv_model::VanillaConvModel;
pub use dense_model::VanillaDenseModel;
pub use model::Model;
pub use registry::{ModelSpec, SUPPORTED_MODELS, build_model};
