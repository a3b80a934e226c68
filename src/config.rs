use std::{
    fs,
    path::{Path, PathBuf},
};

use machine_learning::arch::{ModelSpec, SUPPORTED_MODELS};
use serde::{Deserialize, Serialize};

use crate::{
    MamlErr, Result,
    dataset::{SamplingMode, SyntheticConfig},
    labels::{LabelCodec, LabelScheme},
};

/// Every hyperparameter of an experiment.
///
/// Missing fields take their default value when deserializing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MamlConfig {
    /// Examples per support set, and per query set.
    pub support_size: usize,
    pub meta_batch_size: usize,
    pub meta_lr: f32,
    pub inner_update_lr: f32,
    /// The hidden width of the model, filters per convolution for the convolutional one.
    pub num_filters: usize,
    pub num_inner_updates: usize,
    pub learn_inner_update_lr: bool,
    pub iterations: usize,
    /// The inner learning rate the restored checkpoint was trained with, when it differs from
    /// the one used to meta-test.
    pub meta_train_inner_update_lr: Option<f32>,
    /// Classes per task.
    pub label_subset_size: usize,
    pub log_frequency: usize,
    pub test_log_frequency: usize,
    pub model_class: String,
    pub multilabel_scheme: LabelScheme,
    pub sampling_mode: SamplingMode,
    pub logdir: PathBuf,
    pub scalar_logdir: PathBuf,
    pub img_size: usize,
    pub channels: usize,
    pub seed: u64,
    pub meta_test_seed: u64,
    pub num_meta_test_points: usize,
    pub first_order: bool,
    /// Whether to meta-train, meta-test otherwise.
    pub meta_train: bool,
    pub experiment_name: Option<String>,
    pub synthetic_noise: f32,
}

impl Default for MamlConfig {
    fn default() -> Self {
        Self {
            support_size: 8,
            meta_batch_size: 4,
            meta_lr: 0.001,
            inner_update_lr: 0.4,
            num_filters: 32,
            num_inner_updates: 1,
            learn_inner_update_lr: false,
            iterations: 15000,
            meta_train_inner_update_lr: None,
            label_subset_size: 3,
            log_frequency: 5,
            test_log_frequency: 25,
            model_class: "VanillaConvModel".into(),
            multilabel_scheme: LabelScheme::Powerset,
            sampling_mode: SamplingMode::Greedy,
            logdir: PathBuf::from("./checkpoints"),
            scalar_logdir: PathBuf::from("./tensorboard_logs"),
            img_size: 120,
            channels: 3,
            seed: 123,
            meta_test_seed: 1,
            num_meta_test_points: 600,
            first_order: false,
            meta_train: true,
            experiment_name: None,
            synthetic_noise: 0.1,
        }
    }
}

impl MamlConfig {
    /// Reads a configuration out of a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Checks the configuration can run.
    ///
    /// # Returns
    /// `MamlErr::InvalidConfig` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("support_size", self.support_size),
            ("meta_batch_size", self.meta_batch_size),
            ("num_filters", self.num_filters),
            ("num_inner_updates", self.num_inner_updates),
            ("iterations", self.iterations),
            ("label_subset_size", self.label_subset_size),
            ("log_frequency", self.log_frequency),
            ("test_log_frequency", self.test_log_frequency),
            ("img_size", self.img_size),
            ("channels", self.channels),
            ("num_meta_test_points", self.num_meta_test_points),
        ];

        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(MamlErr::InvalidConfig(format!("{name} must be positive")));
        }

        let rates = [
            ("meta_lr", Some(self.meta_lr)),
            ("inner_update_lr", Some(self.inner_update_lr)),
            ("meta_train_inner_update_lr", self.meta_train_inner_update_lr),
            ("synthetic_noise", Some(self.synthetic_noise)),
        ];

        for (name, value) in rates {
            if let Some(value) = value.filter(|v| !v.is_finite() || *v < 0.) {
                return Err(MamlErr::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }

        if !SUPPORTED_MODELS.contains(&self.model_class.as_str()) {
            return Err(MamlErr::InvalidConfig(format!(
                "model class '{}' is not one of {}",
                self.model_class,
                SUPPORTED_MODELS.join(", ")
            )));
        }

        if self.label_subset_size >= usize::BITS as usize {
            return Err(MamlErr::InvalidConfig(format!(
                "label_subset_size {} does not fit a powerset label",
                self.label_subset_size
            )));
        }

        Ok(())
    }

    /// The inner learning rate the checkpoints of this experiment are named after.
    pub fn train_inner_update_lr(&self) -> f32 {
        self.meta_train_inner_update_lr.unwrap_or(self.inner_update_lr)
    }

    /// The directory name of the checkpoints of this experiment.
    pub fn exp_string(&self) -> String {
        format!(
            "supsize_{}.mbs_{}.inner_numstep_{}.inner_updatelr_{}.learn_inner_update_lr_{}",
            self.support_size,
            self.meta_batch_size,
            self.num_inner_updates,
            self.train_inner_update_lr(),
            self.learn_inner_update_lr,
        )
    }

    /// The name of the scalar log directory of this run: the experiment name, whether it trains
    /// or tests, and the checkpoint directory name.
    pub fn experiment_fullname(&self) -> String {
        let mode = if self.meta_train { "train" } else { "test" };

        match &self.experiment_name {
            Some(name) => format!("{name}.{mode}.{}", self.exp_string()),
            None => format!("{mode}.{}", self.exp_string()),
        }
    }

    pub fn scalar_dir(&self) -> PathBuf {
        self.scalar_logdir.join(self.experiment_fullname())
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.logdir.join(self.exp_string())
    }

    pub fn label_codec(&self) -> LabelCodec {
        LabelCodec::new(self.multilabel_scheme, self.label_subset_size)
    }

    /// The width of the model output under the configured label scheme.
    pub fn dim_output(&self) -> usize {
        self.label_codec().dim_output()
    }

    pub fn model_spec(&self) -> ModelSpec {
        ModelSpec {
            channels: self.channels,
            dim_hidden: self.num_filters,
            dim_output: self.dim_output(),
            img_size: self.img_size,
        }
    }

    pub fn synthetic(&self) -> SyntheticConfig {
        SyntheticConfig {
            img_size: self.img_size,
            channels: self.channels,
            support_size: self.support_size,
            label_subset_size: self.label_subset_size,
            noise_std: self.synthetic_noise,
            seed: self.seed,
        }
    }
}
