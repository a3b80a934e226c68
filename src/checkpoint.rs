//! Meta parameter checkpoints.
//!
//! A checkpoint is a safetensors file called `model<itr>.safetensors`. Shared weights are stored
//! as `weights/<key>` and learned inner learning rates under their own `inner_update_lr/..`
//! names, every tensor being a 2D `f32` one.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use log::{debug, info};
use ndarray::Array2;
use safetensors::{Dtype, SafeTensors, tensor::TensorView};

use crate::{MamlErr, Result, maml::MetaParams};

const PREFIX: &str = "model";
const EXTENSION: &str = "safetensors";

/// The path of the checkpoint of iteration `itr` inside `dir`.
pub fn checkpoint_path(dir: &Path, itr: usize) -> PathBuf {
    dir.join(format!("{PREFIX}{itr}.{EXTENSION}"))
}

fn tensor_name(key: &str, is_weight: bool) -> String {
    if is_weight {
        format!("weights/{key}")
    } else {
        key.to_string()
    }
}

/// Every `(tensor name, value)` pair of `params`.
fn named_tensors(params: &MetaParams) -> Vec<(String, &Array2<f32>)> {
    let weights = params
        .weights()
        .iter()
        .map(|(key, value)| (tensor_name(key, true), value));

    let rates = params
        .inner_lrs()
        .into_iter()
        .flat_map(|rates| rates.iter())
        .map(|(key, value)| (tensor_name(key, false), value));

    weights.chain(rates).collect()
}

/// Writes `params` as the checkpoint of iteration `itr`, creating `dir` if needed.
///
/// # Returns
/// The path of the written file.
pub fn save(params: &MetaParams, dir: &Path, itr: usize) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let data: Vec<(String, Vec<f32>, Vec<usize>)> = named_tensors(params)
        .into_iter()
        .map(|(name, value)| {
            let (rows, cols) = value.dim();
            (name, value.iter().copied().collect(), vec![rows, cols])
        })
        .collect();

    let views = data
        .iter()
        .map(|(name, values, shape)| {
            let view = TensorView::new(Dtype::F32, shape.clone(), bytemuck::cast_slice(values))?;
            Ok((name.clone(), view))
        })
        .collect::<Result<Vec<_>>>()?;

    let metadata = HashMap::from([("itr".to_string(), itr.to_string())]);
    let path = checkpoint_path(dir, itr);
    safetensors::serialize_to_file(views, &Some(metadata), &path)?;

    info!(path:? = path, tensors = data.len(); "saved checkpoint");
    Ok(path)
}

/// Finds the checkpoint with the highest iteration in `dir`.
///
/// # Returns
/// The iteration and path of that checkpoint, or `MamlErr::NoCheckpoint` if `dir` has none.
pub fn latest(dir: &Path) -> Result<(usize, PathBuf)> {
    let no_checkpoint = || MamlErr::NoCheckpoint {
        dir: dir.to_path_buf(),
    };

    let entries = fs::read_dir(dir).map_err(|_| no_checkpoint())?;
    let mut best = None;

    for entry in entries {
        let path = entry?.path();
        let itr = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_prefix(PREFIX))
            .and_then(|name| name.strip_suffix(EXTENSION))
            .and_then(|name| name.strip_suffix('.'))
            .and_then(|itr| itr.parse::<usize>().ok());

        if let Some(itr) = itr
            && best.as_ref().is_none_or(|(max, _)| itr > *max)
        {
            best = Some((itr, path));
        }
    }

    best.ok_or_else(no_checkpoint)
}

/// Overwrites `params` with the values stored at `path`.
///
/// Every parameter of `params` must be present with its exact shape. Nothing is changed unless
/// all of them are.
pub fn restore(params: &mut MetaParams, path: &Path) -> Result<()> {
    let bytes = fs::read(path)?;
    let tensors = SafeTensors::deserialize(&bytes)?;
    let names = tensors.names();

    let mut staged = Vec::new();
    for (name, current) in named_tensors(params) {
        if !names.contains(&&name) {
            return Err(MamlErr::MissingTensor { name });
        }

        let view = tensors.tensor(&name)?;
        let shape = view.shape();
        let expected = current.dim();

        if view.dtype() != Dtype::F32 || shape != [expected.0, expected.1] {
            return Err(MamlErr::TaskShape {
                what: "checkpoint tensor",
                got: shape.iter().product(),
                expected: current.len(),
            });
        }

        let values: Vec<f32> = view
            .data()
            .chunks_exact(size_of::<f32>())
            .map(bytemuck::pod_read_unaligned)
            .collect();

        let value = Array2::from_shape_vec(expected, values).map_err(|_| MamlErr::TaskShape {
            what: "checkpoint tensor data",
            got: view.data().len() / size_of::<f32>(),
            expected: current.len(),
        })?;

        staged.push((name, value));
    }

    for (name, value) in staged {
        let key = name.strip_prefix("weights/").unwrap_or(&name);
        params.store_of_mut(key)?.assign(key, value)?;
    }

    debug!(path:? = path; "restored checkpoint");
    Ok(())
}
