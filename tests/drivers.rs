use maml::{
    MamlConfig, MamlErr, checkpoint,
    dataset::{SamplingMode, Split, SyntheticPatches},
    driver::{meta_test, meta_train, sample_tasks},
    maml::Maml,
    scalars::MemoryScalarWriter,
};

fn config(logdir: &std::path::Path) -> MamlConfig {
    MamlConfig {
        support_size: 2,
        meta_batch_size: 2,
        num_filters: 2,
        label_subset_size: 2,
        img_size: 4,
        iterations: 11,
        log_frequency: 5,
        test_log_frequency: 10,
        num_meta_test_points: 3,
        logdir: logdir.to_path_buf(),
        ..Default::default()
    }
}

#[test]
fn training_logs_on_schedule_and_saves_the_last_iteration() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let mut sampler = SyntheticPatches::new(config.synthetic()).unwrap();
    let mut writer = MemoryScalarWriter::new();
    let mut maml = Maml::new(&config).unwrap();

    let summary = meta_train(&mut maml, &mut sampler, &mut writer, &config).unwrap();

    assert_eq!(summary.last_itr, 10);
    assert_eq!(summary.checkpoint, checkpoint::checkpoint_path(&config.checkpoint_dir(), 10));
    assert!(summary.checkpoint.exists());

    for metric in ["loss", "precision", "recall", "F1"] {
        assert_eq!(writer.steps(&format!("Inner {metric}")), vec![5, 10]);
        assert_eq!(writer.steps(&format!("Outer {metric}")), vec![10]);
    }
    assert_eq!(writer.records.len(), 12);
}

#[test]
fn meta_test_restores_the_trained_weights() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let mut sampler = SyntheticPatches::new(config.synthetic()).unwrap();
    let mut trained = Maml::new(&config).unwrap();
    meta_train(&mut trained, &mut sampler, &mut MemoryScalarWriter::new(), &config).unwrap();

    let test_config = MamlConfig {
        meta_train: false,
        seed: 7,
        ..config.clone()
    };
    let mut fresh = Maml::new(&test_config).unwrap();
    let mut writer = MemoryScalarWriter::new();

    let report = meta_test(&mut fresh, &mut sampler, &mut writer, &test_config).unwrap();

    assert_eq!(fresh.params(), trained.params());
    assert_eq!(report.checkpoint_itr, 10);
    assert_eq!(writer.steps("Meta-test F1"), vec![0, 1, 2]);
    assert!((0. ..=1.).contains(&report.f1.mean));
    assert!(report.loss.half_width >= 0.);

    let again = meta_test(&mut fresh, &mut sampler, &mut MemoryScalarWriter::new(), &test_config)
        .unwrap();
    assert_eq!(again, report);
}

#[test]
fn checkpoint_round_trip_reproduces_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let mut sampler = SyntheticPatches::new(config.synthetic()).unwrap();
    let codec = config.label_codec();
    let train = sample_tasks(&mut sampler, 2, Split::Train, SamplingMode::Greedy, &codec).unwrap();
    let held_out = sample_tasks(&mut sampler, 2, Split::Test, SamplingMode::Greedy, &codec).unwrap();

    let mut maml = Maml::new(&config).unwrap();
    maml.train_step(&train).unwrap();
    let expected = maml.eval_step(&held_out).unwrap();
    let path = checkpoint::save(maml.params(), &config.checkpoint_dir(), 1).unwrap();

    let mut restored = Maml::new(&MamlConfig {
        seed: 99,
        ..config.clone()
    })
    .unwrap();
    assert_ne!(restored.params(), maml.params());

    checkpoint::restore(restored.params_mut(), &path).unwrap();

    assert_eq!(restored.params(), maml.params());
    assert_eq!(restored.eval_step(&held_out).unwrap(), expected);
}

#[test]
fn meta_test_without_checkpoint_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let mut sampler = SyntheticPatches::new(config.synthetic()).unwrap();
    let mut maml = Maml::new(&config).unwrap();

    let err = meta_test(&mut maml, &mut sampler, &mut MemoryScalarWriter::new(), &config)
        .unwrap_err();

    assert!(matches!(err, MamlErr::NoCheckpoint { .. }));
}
