//! Seeded sample-stream generators shared by the test suites and benches.

use rand::prelude::*;

use crate::value::Scalar;
use crate::{Float, Vector};

/// Uniformly distributed points in `[0,1)^D`.
pub fn uniform_points<const D: usize>(count: usize, seed: u64) -> Vec<Vector<D>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let mut point = [0.0 as Float; D];
            for coord in &mut point {
                *coord = rng.gen();
            }
            point
        })
        .collect()
}

/// One-dimensional stream with uniformly placed samples whose target is
/// `high` below 0.5 and `low` above it.
pub fn step_stream(
    count: usize,
    seed: u64,
    high: Float,
    low: Float,
) -> Vec<([Float; 1], Scalar, Float)> {
    uniform_points::<1>(count, seed)
        .into_iter()
        .map(|point| {
            let value = if point[0] < 0.5 { high } else { low };
            (point, Scalar(value), 1.0)
        })
        .collect()
}

/// Two-dimensional stream with two equal-mass peaks on the main diagonal
/// plus a faint uniform background so no region starves.
///
/// The peak jitter is mirrored between the two clusters, so the regions
/// around (0.25, 0.25) and (0.75, 0.75) receive identical mass.
pub fn diagonal_peaks_stream(
    pairs: usize,
    background: usize,
    seed: u64,
) -> Vec<([Float; 2], Scalar, Float)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut samples = Vec::with_capacity(2 * pairs + background);

    for _ in 0..pairs {
        let dx = rng.gen::<Float>() * 0.1 - 0.05;
        let dy = rng.gen::<Float>() * 0.1 - 0.05;
        samples.push(([0.25 + dx, 0.25 + dy], Scalar(1.0), 1.0));
        samples.push(([0.75 + dx, 0.75 + dy], Scalar(1.0), 1.0));
    }
    for _ in 0..background {
        samples.push(([rng.gen(), rng.gen()], Scalar(0.05), 1.0));
    }
    samples
}
