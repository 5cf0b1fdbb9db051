//! densitree: online adaptive importance sampling over the unit hypercube.
//!
//! A spatial binary tree learns a probability density on `[0,1)^D` from a
//! stream of weighted samples while concurrently serving draws from the
//! density it has learned so far. The typical host is a guided Monte Carlo
//! integrator (e.g. a path tracer learning incident radiance), which feeds
//! `(position, value, weight)` triples in and pulls `(point, pdf)` pairs out.
//!
//! # Key Types
//!
//! - [`DensityTree`] - Self-refining spatial tree distribution
//! - [`Guide`] - Concurrent training/sampling wrapper with a uniform fallback
//! - [`TreeSettings`] / [`GuideSettings`] - Configuration builders
//! - [`Value`] - Capability trait for the quantity accumulated in leaves
//! - [`Scalar`] / [`Rgb`] - Ready-made value types with lock-free accumulators
//!
//! # Learning loop
//!
//! A [`Guide`] pairs a read-only *sampling* snapshot with a writable
//! *training* tree. Threads sample and splat concurrently; once the sample
//! count crosses a geometric milestone the guide rebuilds: the training tree
//! is normalized into a fresh sampling snapshot, then split and zeroed for
//! the next epoch.
//!
//! ```
//! use densitree::{Guide2, GuideSettings, Scalar};
//!
//! let guide = Guide2::<Scalar>::new(GuideSettings::default());
//!
//! // Host loop: draw a guided point, evaluate the integrand, feed it back.
//! let mut u = [0.3, 0.7];
//! let pdf = guide.sample(&mut u);
//! assert!(pdf >= 0.5); // uniform fallback keeps every point reachable
//! guide.splat(&u, &Scalar(1.0), 1.0);
//! assert_eq!(guide.samples_so_far(), 1);
//! ```

pub mod accum;
pub mod config;
pub mod guide;
pub mod io;
pub mod testing;
pub mod tree;
pub mod utils;
pub mod value;

pub use accum::{AtomicFloat, MutexAccumulator, ValueAccumulator};
pub use config::{ConfigError, GuideSettings, TreeSettings, Verbosity};
pub use guide::{Guide, Trees, FIRST_MILESTONE};
pub use io::{ReadBinary, ReadError, WriteBinary};
pub use tree::{DensityTree, Distribution, Draw, TreeError};
pub use utils::Parallelism;
pub use value::{Rgb, Scalar, Value};

/// Crate-wide scalar type; all coordinates, densities, weights and
/// probabilities use it. `f32` unless the `f64` feature is enabled.
#[cfg(not(feature = "f64"))]
pub type Float = f32;
/// Crate-wide scalar type; all coordinates, densities, weights and
/// probabilities use it. `f32` unless the `f64` feature is enabled.
#[cfg(feature = "f64")]
pub type Float = f64;

/// A point in (or an offset within) the unit hypercube `[0,1)^D`.
pub type Vector<const D: usize> = [Float; D];

/// Index of a node inside a tree's node vector. The root is always 0.
pub type NodeId = u32;

/// One-dimensional tree distribution (binary tree).
pub type DensityTree1<V = Scalar> = DensityTree<1, 2, V>;
/// Two-dimensional tree distribution (quadtree).
pub type DensityTree2<V = Scalar> = DensityTree<2, 4, V>;
/// Three-dimensional tree distribution (octree).
pub type DensityTree3<V = Scalar> = DensityTree<3, 8, V>;

/// Guided wrapper over a one-dimensional tree.
pub type Guide1<V = Scalar> = Guide<1, DensityTree1<V>>;
/// Guided wrapper over a two-dimensional tree.
pub type Guide2<V = Scalar> = Guide<2, DensityTree2<V>>;
/// Guided wrapper over a three-dimensional tree.
pub type Guide3<V = Scalar> = Guide<3, DensityTree3<V>>;
