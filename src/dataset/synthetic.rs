use std::ops::Range;

use log::debug;
use ndarray::{Array1, Array2, Array3, s};
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use rand_distr::{Distribution, Normal};

use super::{SampledBatch, SamplingMode, Split, TaskSampler};
use crate::{MamlErr, Result};

/// The land-cover classes of the BigEarthNet 19 class nomenclature.
pub const BIGEARTHNET_CLASSES: [&str; 19] = [
    "Urban fabric",
    "Industrial or commercial units",
    "Arable land",
    "Permanent crops",
    "Pastures",
    "Complex cultivation patterns",
    "Land principally occupied by agriculture, with significant areas of natural vegetation",
    "Agro-forestry areas",
    "Broad-leaved forest",
    "Coniferous forest",
    "Mixed forest",
    "Natural grassland and sparsely vegetated areas",
    "Moors, heathland and sclerophyllous vegetation",
    "Transitional woodland, shrub",
    "Beaches, dunes, sands",
    "Inland wetlands",
    "Coastal wetlands",
    "Inland waters",
    "Marine waters",
];

fn split_classes(split: Split) -> Range<usize> {
    match split {
        Split::Train => 0..10,
        Split::Val => 10..14,
        Split::Test => 14..19,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticConfig {
    pub img_size: usize,
    pub channels: usize,
    /// Examples per half of a task.
    pub support_size: usize,
    pub label_subset_size: usize,
    pub noise_std: f32,
    pub seed: u64,
}

/// A seeded stand-in for a patch archive.
///
/// Every class owns a fixed random prototype patch. An example with label set `L` is the mean
/// of the prototypes of `L` plus Gaussian noise, so label sets are recoverable from the pixels
/// and few-shot adaptation has something to learn.
pub struct SyntheticPatches {
    config: SyntheticConfig,
    prototypes: Array2<f32>,
    noise: Normal<f32>,
    rng: StdRng,
}

impl SyntheticPatches {
    /// Creates a new `SyntheticPatches` sampler.
    ///
    /// # Returns
    /// The sampler or an error if the tasks cannot be drawn from every split or the noise is
    /// not a valid standard deviation.
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        let smallest_split = [Split::Train, Split::Val, Split::Test]
            .into_iter()
            .map(|split| split_classes(split).len())
            .min()
            .unwrap_or_default();

        if config.label_subset_size == 0 || config.label_subset_size > smallest_split {
            return Err(MamlErr::InvalidConfig(format!(
                "label subset size must be in 1..={smallest_split}, got {}",
                config.label_subset_size
            )));
        }

        if config.support_size == 0 || config.img_size == 0 || config.channels == 0 {
            return Err(MamlErr::InvalidConfig(
                "support size, image size and channels must be positive".into(),
            ));
        }

        let noise = Normal::new(0., config.noise_std)
            .map_err(|e| MamlErr::InvalidConfig(format!("synthetic noise: {e}")))?;

        let dim = config.img_size * config.img_size * config.channels;
        let mut proto_rng = StdRng::seed_from_u64(config.seed);
        let prototypes = Array2::from_shape_simple_fn((BIGEARTHNET_CLASSES.len(), dim), || {
            proto_rng.random::<f32>()
        });

        Ok(Self {
            config,
            prototypes,
            noise,
            rng: StdRng::seed_from_u64(config.seed.wrapping_add(1)),
        })
    }

    pub fn dim_input(&self) -> usize {
        self.prototypes.ncols()
    }

    /// Draws the label set of the `j`-th example of a task half.
    fn label_set(&mut self, j: usize, mode: SamplingMode) -> Vec<bool> {
        let k = self.config.label_subset_size;

        match mode {
            SamplingMode::Uniform => {
                let bits = self.rng.random_range(1..(1usize << k));
                (0..k).map(|i| bits & (1 << i) != 0).collect()
            }
            SamplingMode::Greedy => {
                let mut set: Vec<bool> = (0..k).map(|_| self.rng.random_bool(0.5)).collect();

                // The first k examples of each half cover the k classes.
                if j < k {
                    set[j] = true;
                }

                if !set.contains(&true) {
                    set[self.rng.random_range(0..k)] = true;
                }

                set
            }
        }
    }

    fn example(&mut self, classes: &[usize], set: &[bool]) -> Array1<f32> {
        let active: Vec<usize> = classes
            .iter()
            .zip(set)
            .filter_map(|(&class, &on)| on.then_some(class))
            .collect();

        let mut x = Array1::zeros(self.dim_input());
        for &class in &active {
            x += &self.prototypes.row(class);
        }
        x /= active.len().max(1) as f32;

        for v in x.iter_mut() {
            *v += self.noise.sample(&mut self.rng);
        }

        x
    }
}

impl TaskSampler for SyntheticPatches {
    fn label_subset_size(&self) -> usize {
        self.config.label_subset_size
    }

    fn examples_per_task(&self) -> usize {
        2 * self.config.support_size
    }

    fn sample_batch(
        &mut self,
        batch_size: usize,
        split: Split,
        mode: SamplingMode,
    ) -> Result<SampledBatch> {
        let k = self.config.label_subset_size;
        let half = self.config.support_size;
        let examples = self.examples_per_task();
        let pool = split_classes(split);

        let mut inputs = Array3::zeros((batch_size, examples, self.dim_input()));
        let mut labels = Array3::zeros((batch_size, examples, k));
        let mut debug_labels = Vec::with_capacity(batch_size);

        for t in 0..batch_size {
            let classes: Vec<usize> = rand::seq::index::sample(&mut self.rng, pool.len(), k)
                .into_iter()
                .map(|i| pool.start + i)
                .collect();

            for h in 0..2 {
                let mut sets: Vec<Vec<bool>> = (0..half).map(|j| self.label_set(j, mode)).collect();
                sets.shuffle(&mut self.rng);

                for (j, set) in sets.iter().enumerate() {
                    let e = h * half + j;
                    let x = self.example(&classes, set);
                    inputs.slice_mut(s![t, e, ..]).assign(&x);

                    for (l, &on) in set.iter().enumerate() {
                        labels[[t, e, l]] = if on { 1. } else { 0. };
                    }
                }
            }

            debug_labels.push(
                classes
                    .iter()
                    .map(|&c| BIGEARTHNET_CLASSES[c].to_string())
                    .collect(),
            );
        }

        debug!(batch_size = batch_size, split:? = split, mode:? = mode; "sampled task batch");

        Ok(SampledBatch {
            inputs,
            labels,
            debug_labels,
        })
    }

    fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use ndarray::Axis;

    use super::*;

    fn config() -> SyntheticConfig {
        SyntheticConfig {
            img_size: 4,
            channels: 3,
            support_size: 4,
            label_subset_size: 3,
            noise_std: 0.05,
            seed: 7,
        }
    }

    #[test]
    fn batch_shapes() {
        let mut sampler = SyntheticPatches::new(config()).unwrap();

        let batch = sampler
            .sample_batch(2, Split::Train, SamplingMode::Greedy)
            .unwrap();

        assert_eq!(batch.inputs.dim(), (2, 8, 48));
        assert_eq!(batch.labels.dim(), (2, 8, 3));
        assert_eq!(batch.debug_labels.len(), 2);
        assert!(batch.debug_labels.iter().all(|names| names.len() == 3));
    }

    #[test]
    fn every_example_has_a_label() {
        let mut sampler = SyntheticPatches::new(config()).unwrap();

        for mode in [SamplingMode::Greedy, SamplingMode::Uniform] {
            let batch = sampler.sample_batch(4, Split::Val, mode).unwrap();
            for task in batch.labels.axis_iter(Axis(0)) {
                assert!(task.axis_iter(Axis(0)).all(|row| row.sum() >= 1.));
            }
        }
    }

    #[test]
    fn greedy_covers_every_class_in_both_halves() {
        let mut sampler = SyntheticPatches::new(config()).unwrap();
        let batch = sampler
            .sample_batch(8, Split::Test, SamplingMode::Greedy)
            .unwrap();

        for task in batch.labels.axis_iter(Axis(0)) {
            for half in [task.slice(s![..4, ..]), task.slice(s![4.., ..])] {
                let counts = half.sum_axis(Axis(0));
                assert!(counts.iter().all(|c| *c >= 1.));
            }
        }
    }

    #[test]
    fn splits_are_disjoint() {
        let mut sampler = SyntheticPatches::new(config()).unwrap();
        let mut seen = Vec::new();

        for split in [Split::Train, Split::Val, Split::Test] {
            let batch = sampler.sample_batch(16, split, SamplingMode::Uniform).unwrap();
            let names: HashSet<String> = batch.debug_labels.into_iter().flatten().collect();
            seen.push(names);
        }

        assert!(seen[0].is_disjoint(&seen[1]));
        assert!(seen[0].is_disjoint(&seen[2]));
        assert!(seen[1].is_disjoint(&seen[2]));
    }

    #[test]
    fn reseeding_replays_the_stream() {
        let mut sampler = SyntheticPatches::new(config()).unwrap();

        sampler.reseed(1);
        let a = sampler.sample_batch(1, Split::Test, SamplingMode::Greedy).unwrap();
        sampler.reseed(1);
        let b = sampler.sample_batch(1, Split::Test, SamplingMode::Greedy).unwrap();

        assert_eq!(a.inputs, b.inputs);
        assert_eq!(a.labels, b.labels);
    }

    #[test]
    fn rejects_subsets_larger_than_a_split() {
        let config = SyntheticConfig {
            label_subset_size: 5,
            ..config()
        };

        assert!(matches!(
            SyntheticPatches::new(config),
            Err(MamlErr::InvalidConfig(_))
        ));
    }
}
