use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::info;
use maml::{
    MamlConfig,
    dataset::{SamplingMode, SyntheticPatches},
    driver,
    labels::LabelScheme,
    maml::Maml,
    scalars::JsonlScalarWriter,
};

#[derive(Parser)]
#[command(name = "maml")]
#[command(about = "Few-shot multi-label land-cover classification with MAML")]
#[command(version)]
struct Cli {
    /// JSON file with the base configuration, flags override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// Examples per support set, and per query set
    #[arg(long)]
    support_size: Option<usize>,
    #[arg(long)]
    meta_batch_size: Option<usize>,
    #[arg(long)]
    meta_lr: Option<f32>,
    #[arg(long)]
    inner_update_lr: Option<f32>,
    /// The inner learning rate the checkpoint to test was trained with
    #[arg(long)]
    meta_train_inner_update_lr: Option<f32>,
    #[arg(long)]
    num_inner_updates: Option<usize>,
    #[arg(long)]
    num_filters: Option<usize>,
    /// Meta-training iterations
    #[arg(long)]
    iterations: Option<usize>,
    /// Learn one inner learning rate per weight and inner step
    #[arg(long)]
    learn_inner_lr: bool,
    /// Meta-test the latest checkpoint instead of training
    #[arg(long)]
    test: bool,
    /// Ignore second-order terms of the meta-gradient
    #[arg(long)]
    first_order: bool,
    /// Classes per task
    #[arg(long)]
    label_subset_size: Option<usize>,
    #[arg(long)]
    log_frequency: Option<usize>,
    #[arg(long)]
    test_log_frequency: Option<usize>,
    #[arg(long)]
    experiment_name: Option<String>,
    #[arg(long)]
    model_class_name: Option<String>,
    /// greedy or uniform
    #[arg(long)]
    sampling_mode: Option<SamplingMode>,
    /// powerset or bin_rel
    #[arg(long)]
    multilabel_scheme: Option<LabelScheme>,
    #[arg(long)]
    logdir: Option<PathBuf>,
    #[arg(long)]
    scalar_logdir: Option<PathBuf>,
    #[arg(long)]
    img_size: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    num_meta_test_points: Option<usize>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<MamlConfig> {
        let mut config = match &self.config {
            Some(path) => MamlConfig::from_json_file(path)
                .with_context(|| format!("cannot load config '{}'", path.display()))?,
            None => MamlConfig::default(),
        };

        set(&mut config.support_size, self.support_size);
        set(&mut config.meta_batch_size, self.meta_batch_size);
        set(&mut config.meta_lr, self.meta_lr);
        set(&mut config.inner_update_lr, self.inner_update_lr);
        set(&mut config.num_inner_updates, self.num_inner_updates);
        set(&mut config.num_filters, self.num_filters);
        set(&mut config.iterations, self.iterations);
        set(&mut config.label_subset_size, self.label_subset_size);
        set(&mut config.log_frequency, self.log_frequency);
        set(&mut config.test_log_frequency, self.test_log_frequency);
        set(&mut config.model_class, self.model_class_name);
        set(&mut config.sampling_mode, self.sampling_mode);
        set(&mut config.multilabel_scheme, self.multilabel_scheme);
        set(&mut config.logdir, self.logdir);
        set(&mut config.scalar_logdir, self.scalar_logdir);
        set(&mut config.img_size, self.img_size);
        set(&mut config.seed, self.seed);
        set(&mut config.num_meta_test_points, self.num_meta_test_points);

        if self.meta_train_inner_update_lr.is_some() {
            config.meta_train_inner_update_lr = self.meta_train_inner_update_lr;
        }
        if self.experiment_name.is_some() {
            config.experiment_name = self.experiment_name;
        }

        config.learn_inner_update_lr |= self.learn_inner_lr;
        config.first_order |= self.first_order;
        config.meta_train &= !self.test;

        Ok(config)
    }
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = Cli::parse().into_config()?;
    config.validate()?;
    info!(
        experiment:% = config.experiment_fullname(),
        scheme:% = config.multilabel_scheme;
        "starting"
    );

    let mut sampler = SyntheticPatches::new(config.synthetic())?;
    let mut writer = JsonlScalarWriter::create(&config.scalar_dir())?;
    let mut learner = Maml::new(&config)?;

    if config.meta_train {
        let summary = driver::meta_train(&mut learner, &mut sampler, &mut writer, &config)?;
        info!("Saved to {}", summary.checkpoint.display());
    } else {
        let report = driver::meta_test(&mut learner, &mut sampler, &mut writer, &config)?;
        println!("{report}");
    }

    Ok(())
}
