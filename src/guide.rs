//! Concurrent training/sampling wrapper.
//!
//! A [`Guide`] owns two copies of a distribution: a read-only *sampling*
//! snapshot that serves draws and pdf queries, and a writable *training*
//! distribution that absorbs splats. Draws mix the learned density with a
//! uniform fallback so every point keeps positive probability while the
//! distribution is still wrong.
//!
//! One reader/writer lock guards the pair. Sampling, pdf evaluation and
//! splatting all run under the shared lock (splats touch nothing but atomic
//! accumulators); only the periodic rebuild takes the exclusive lock, when
//! the cumulative sample count crosses a geometrically growing milestone:
//! build the training tree, copy it into the sampling slot, refine the
//! training tree for the next epoch, double the milestone.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard};
use std::time::Instant;

use rand::Rng;

use crate::config::{GuideSettings, Verbosity};
use crate::tree::{DensityTree, Distribution};
use crate::utils::Parallelism;
use crate::value::Value;
use crate::{Float, Vector};

/// Cumulative sample count that triggers the first rebuild; every rebuild
/// doubles it.
pub const FIRST_MILESTONE: u64 = 1024;

const LOCK_POISONED: &str = "guide lock poisoned";

/// The distribution pair owned by a [`Guide`], exposed for instrumentation.
pub struct Trees<T> {
    /// Read-only snapshot serving draws and pdf queries.
    pub sampling: T,
    /// Accumulating distribution for the current epoch.
    pub training: T,
    next_milestone: u64,
}

impl<T> Trees<T> {
    /// The sample count at which the next rebuild happens.
    pub fn next_milestone(&self) -> u64 {
        self.next_milestone
    }
}

/// Concurrent guided-sampling wrapper around a [`Distribution`].
pub struct Guide<const D: usize, T: Distribution<D>> {
    settings: GuideSettings,
    trees: RwLock<Trees<T>>,
    samples_so_far: AtomicU64,
}

impl<const D: usize, const A: usize, V: Value> Guide<D, DensityTree<D, A, V>> {
    /// Create a guide over a fresh [`DensityTree`] configured from
    /// `settings.tree`.
    pub fn new(settings: GuideSettings) -> Self {
        let prototype = DensityTree::new(settings.tree);
        Self::with_distribution(settings, prototype)
    }
}

impl<const D: usize, T: Distribution<D>> Guide<D, T> {
    /// Create a guide over any distribution implementation. The prototype is
    /// reset, so prior learning does not leak in.
    pub fn with_distribution(settings: GuideSettings, mut prototype: T) -> Self {
        prototype.reset();
        let trees = Trees {
            sampling: prototype.clone(),
            training: prototype,
            next_milestone: FIRST_MILESTONE,
        };
        Self {
            settings,
            trees: RwLock::new(trees),
            samples_so_far: AtomicU64::new(0),
        }
    }

    /// The settings this guide was created with.
    pub fn settings(&self) -> &GuideSettings {
        &self.settings
    }

    /// Number of samples splatted since construction or the last reset.
    pub fn samples_so_far(&self) -> u64 {
        self.samples_so_far.load(Ordering::Relaxed)
    }

    /// Shared access to the distribution pair (blocks a pending rebuild for
    /// as long as the guard is held).
    pub fn trees(&self) -> RwLockReadGuard<'_, Trees<T>> {
        self.trees.read().expect(LOCK_POISONED)
    }

    /// Forget everything learned and restart the milestone schedule.
    pub fn reset(&self) {
        let mut trees = self.trees.write().expect(LOCK_POISONED);
        trees.training.reset();
        trees.sampling.reset();
        trees.next_milestone = FIRST_MILESTONE;
        self.samples_so_far.store(0, Ordering::Relaxed);
    }

    /// Warp a uniform `u` into a draw from the mixture of the learned
    /// density and the uniform fallback, overwriting `u` with the drawn
    /// point and returning the mixture pdf there.
    ///
    /// `u[0]` doubles as the branch selector: the sub-`uniform_prob` range
    /// keeps the point uniform, the rest is rescaled and warped through the
    /// sampling snapshot. Either way the returned pdf is
    /// `uniform_prob + (1 - uniform_prob) * learned_pdf(point)`.
    pub fn sample(&self, u: &mut Vector<D>) -> Float {
        let uniform_prob = self.settings.uniform_prob;
        if uniform_prob == 1.0 {
            return 1.0;
        }

        let trees = self.trees.read().expect(LOCK_POISONED);
        let learned_pdf = if u[0] < uniform_prob {
            u[0] /= uniform_prob;
            trees.sampling.pdf(u)
        } else {
            u[0] = (u[0] - uniform_prob) / (1.0 - uniform_prob);
            let draw = trees.sampling.sample(*u);
            *u = draw.point;
            draw.pdf
        };

        uniform_prob + (1.0 - uniform_prob) * learned_pdf
    }

    /// Draw a point using fresh uniform randomness from `rng`.
    pub fn sample_with<R: Rng + ?Sized>(&self, rng: &mut R) -> (Vector<D>, Float) {
        let mut u = [0.0 as Float; D];
        for coord in &mut u {
            *coord = rng.gen();
        }
        let pdf = self.sample(&mut u);
        (u, pdf)
    }

    /// Mixture pdf at `x`.
    pub fn pdf(&self, x: &Vector<D>) -> Float {
        let uniform_prob = self.settings.uniform_prob;
        if uniform_prob == 1.0 {
            return 1.0;
        }
        let trees = self.trees.read().expect(LOCK_POISONED);
        uniform_prob + (1.0 - uniform_prob) * trees.sampling.pdf(x)
    }

    /// Deposit one weighted sample into the training distribution and
    /// advance the milestone schedule.
    ///
    /// Splats are counted even when the guide is configured fully uniform;
    /// the training side keeps learning either way.
    pub fn splat(&self, x: &Vector<D>, value: &T::Value, weight: Float) {
        let next_milestone = {
            let trees = self.trees.read().expect(LOCK_POISONED);
            trees.training.splat(x, value, weight);
            trees.next_milestone
        };

        let seen = self.samples_so_far.fetch_add(1, Ordering::Relaxed) + 1;
        if seen > next_milestone {
            self.step();
        }
    }

    /// Splat a batch of `(position, value, weight)` samples, optionally in
    /// parallel.
    pub fn splat_batch(&self, parallelism: Parallelism, samples: &[(Vector<D>, T::Value, Float)]) {
        parallelism.maybe_par_for_each(samples, |(x, value, weight)| {
            self.splat(x, value, *weight);
        });
    }

    /// Rebuild at a milestone crossing: normalize the training distribution,
    /// snapshot it into the sampling slot, refine the training side for the
    /// next epoch and double the milestone.
    fn step(&self) {
        let mut trees = self.trees.write().expect(LOCK_POISONED);
        if self.samples_so_far.load(Ordering::Relaxed) < trees.next_milestone {
            // Another thread rebuilt for this milestone first.
            return;
        }

        let started =
            (self.settings.verbosity >= Verbosity::Debug).then(Instant::now);

        trees.training.build();
        trees.sampling = trees.training.clone();
        trees.training.refine();
        trees.next_milestone *= 2;

        if self.settings.verbosity >= Verbosity::Info {
            eprintln!(
                "[densitree] rebuilt at {} samples, next milestone {}",
                self.samples_so_far.load(Ordering::Relaxed),
                trees.next_milestone
            );
        }
        if let Some(started) = started {
            eprintln!("[densitree] rebuild took {:.2?}", started.elapsed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Scalar;
    use crate::{Guide1, Guide2};

    #[test]
    fn fresh_guide_mixture_pdf_is_one() {
        let guide = Guide2::<Scalar>::new(GuideSettings::default());
        // Sampling tree is uniform, so the mixture pdf is
        // 0.5 + 0.5 * 1 everywhere.
        assert_eq!(guide.pdf(&[0.1, 0.8]), 1.0);
    }

    #[test]
    fn uniform_branch_rescales_the_selector() {
        let guide = Guide1::<Scalar>::new(GuideSettings::default());
        let mut u = [0.2];
        let pdf = guide.sample(&mut u);
        assert!((u[0] - 0.4).abs() < 1e-6);
        assert_eq!(pdf, 1.0);
    }

    #[test]
    fn guided_branch_rescales_the_selector() {
        let guide = Guide1::<Scalar>::new(GuideSettings::default());
        let mut u = [0.8];
        let pdf = guide.sample(&mut u);
        // (0.8 - 0.5) / 0.5 = 0.6 through a uniform sampling tree.
        assert!((u[0] - 0.6).abs() < 1e-6);
        assert_eq!(pdf, 1.0);
    }

    #[test]
    fn fully_uniform_guide_short_circuits() {
        let settings = GuideSettings::builder().uniform_prob(1.0).build().unwrap();
        let guide = Guide1::<Scalar>::new(settings);
        let mut u = [0.7];
        assert_eq!(guide.sample(&mut u), 1.0);
        assert_eq!(u, [0.7]);
        assert_eq!(guide.pdf(&[0.3]), 1.0);
    }

    #[test]
    fn splat_counts_samples() {
        let guide = Guide2::<Scalar>::new(GuideSettings::default());
        for _ in 0..5 {
            guide.splat(&[0.5, 0.5], &Scalar(1.0), 1.0);
        }
        assert_eq!(guide.samples_so_far(), 5);
        assert_eq!(guide.trees().next_milestone(), FIRST_MILESTONE);
    }

    #[test]
    fn reset_restarts_the_schedule() {
        let guide = Guide1::<Scalar>::new(GuideSettings::default());
        for _ in 0..1500 {
            guide.splat(&[0.5], &Scalar(1.0), 1.0);
        }
        assert!(guide.trees().next_milestone() > FIRST_MILESTONE);

        guide.reset();
        assert_eq!(guide.samples_so_far(), 0);
        assert_eq!(guide.trees().next_milestone(), FIRST_MILESTONE);
        assert_eq!(guide.pdf(&[0.25]), 1.0);
    }

    #[test]
    fn with_distribution_resets_the_prototype() {
        use crate::DensityTree1;
        use crate::TreeSettings;

        let mut learned = DensityTree1::<Scalar>::new(TreeSettings::default());
        learned.splat(&[0.5], &Scalar(1.0), 10.0);
        let guide: Guide<1, _> =
            Guide::with_distribution(GuideSettings::default(), learned);
        assert_eq!(guide.trees().training.estimate(), Scalar(0.0));
    }

    #[test]
    fn splat_batch_sequential_and_parallel_agree_on_count() {
        let samples: Vec<([Float; 2], Scalar, Float)> = (0..100)
            .map(|i| {
                let t = (i as Float + 0.5) / 100.0;
                ([t, 1.0 - t], Scalar(1.0), 1.0)
            })
            .collect();

        let guide = Guide2::<Scalar>::new(GuideSettings::default());
        guide.splat_batch(Parallelism::Sequential, &samples);
        assert_eq!(guide.samples_so_far(), 100);

        let guide = Guide2::<Scalar>::new(GuideSettings::default());
        guide.splat_batch(Parallelism::Parallel, &samples);
        assert_eq!(guide.samples_so_far(), 100);
    }
}
