//! Value types accumulated inside tree leaves.
//!
//! The tree is generic over the quantity it estimates. A [`Value`] only
//! needs to be additive, scalable, and to project itself onto the
//! non-negative scalar ([`target`](Value::target)) that drives density
//! adaptation. [`Scalar`] covers plain integrands; [`Rgb`] covers
//! three-channel radiance.

use crate::accum::{AtomicFloat, ValueAccumulator};
use crate::Float;

/// Capability set for the quantity a tree estimates.
///
/// `Default` is the zero of the additive structure. [`target`](Self::target)
/// must be non-negative for every value the host splats.
pub trait Value: Clone + Default + Send + Sync + 'static {
    /// Accumulator layout used inside tree nodes.
    type Accumulator: ValueAccumulator<Self>;

    /// Add `other` into `self`.
    fn accumulate(&mut self, other: &Self);

    /// Multiply by a scalar.
    fn scaled(&self, factor: Float) -> Self;

    /// Divide by a positive scalar.
    fn divided(&self, divisor: Float) -> Self {
        debug_assert!(divisor > 0.0, "divisor must be positive");
        self.scaled(1.0 / divisor)
    }

    /// Non-negative scalar projection driving density adaptation.
    fn target(&self) -> Float;
}

// =============================================================================
// Scalar
// =============================================================================

/// Single-float value; the target is the value itself.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Scalar(pub Float);

impl Value for Scalar {
    type Accumulator = ScalarAccumulator;

    #[inline]
    fn accumulate(&mut self, other: &Self) {
        self.0 += other.0;
    }

    #[inline]
    fn scaled(&self, factor: Float) -> Self {
        Self(self.0 * factor)
    }

    #[inline]
    fn target(&self) -> Float {
        self.0
    }
}

impl From<Float> for Scalar {
    fn from(value: Float) -> Self {
        Self(value)
    }
}

impl From<Scalar> for Float {
    fn from(value: Scalar) -> Self {
        value.0
    }
}

/// Lock-free accumulator for [`Scalar`].
#[derive(Debug, Default)]
pub struct ScalarAccumulator(AtomicFloat);

impl ValueAccumulator<Scalar> for ScalarAccumulator {
    fn new(value: Scalar) -> Self {
        Self(AtomicFloat::new(value.0))
    }

    #[inline]
    fn add(&self, value: &Scalar) {
        self.0.fetch_add(value.0);
    }

    #[inline]
    fn load(&self) -> Scalar {
        Scalar(self.0.load())
    }

    fn store(&mut self, value: Scalar) {
        self.0.set(value.0);
    }
}

// =============================================================================
// Rgb
// =============================================================================

/// Three-channel value (radiance in a renderer); the target is the mean
/// channel.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rgb(pub [Float; 3]);

impl Rgb {
    /// Construct from individual channels.
    pub fn new(r: Float, g: Float, b: Float) -> Self {
        Self([r, g, b])
    }
}

impl Value for Rgb {
    type Accumulator = RgbAccumulator;

    #[inline]
    fn accumulate(&mut self, other: &Self) {
        for (channel, added) in self.0.iter_mut().zip(other.0.iter()) {
            *channel += *added;
        }
    }

    #[inline]
    fn scaled(&self, factor: Float) -> Self {
        Self(self.0.map(|channel| channel * factor))
    }

    #[inline]
    fn target(&self) -> Float {
        (self.0[0] + self.0[1] + self.0[2]) / 3.0
    }
}

/// Per-channel lock-free accumulator for [`Rgb`].
#[derive(Debug, Default)]
pub struct RgbAccumulator([AtomicFloat; 3]);

impl ValueAccumulator<Rgb> for RgbAccumulator {
    fn new(value: Rgb) -> Self {
        Self(value.0.map(AtomicFloat::new))
    }

    #[inline]
    fn add(&self, value: &Rgb) {
        for (channel, added) in self.0.iter().zip(value.0.iter()) {
            channel.fetch_add(*added);
        }
    }

    #[inline]
    fn load(&self) -> Rgb {
        Rgb([self.0[0].load(), self.0[1].load(), self.0[2].load()])
    }

    fn store(&mut self, value: Rgb) {
        for (channel, stored) in self.0.iter_mut().zip(value.0.iter()) {
            channel.set(*stored);
        }
    }
}
