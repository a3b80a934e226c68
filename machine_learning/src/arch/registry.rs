use serde::{Deserialize, Serialize};

use super::{Model, VanillaConvModel, VanillaDenseModel};
use crate::{MlErr, Result};

/// The names `build_model` knows about.
pub const SUPPORTED_MODELS: [&str; 2] = [VanillaConvModel::NAME, VanillaDenseModel::NAME];

/// The hyperparameters shared by every registered model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub channels: usize,
    pub dim_hidden: usize,
    pub dim_output: usize,
    pub img_size: usize,
}

/// Builds the model registered under `name`.
///
/// # Returns
/// The model or `MlErr::UnsupportedModel` if no model has that name.
pub fn build_model(name: &str, spec: ModelSpec) -> Result<Box<dyn Model>> {
    let ModelSpec {
        channels,
        dim_hidden,
        dim_output,
        img_size,
    } = spec;

    match name {
        VanillaConvModel::NAME => Ok(Box::new(VanillaConvModel::new(
            channels, dim_hidden, dim_output, img_size,
        ))),
        VanillaDenseModel::NAME => Ok(Box::new(VanillaDenseModel::new(
            channels, dim_hidden, dim_output, img_size,
        ))),
        _ => Err(MlErr::UnsupportedModel {
            name: name.to_string(),
            supported: SUPPORTED_MODELS.to_vec(),
        }),
    }
}
