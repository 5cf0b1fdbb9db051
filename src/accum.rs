//! Thread-safe additive accumulators.
//!
//! Splatting threads only ever *add* into tree nodes, so the accumulators
//! here expose a deliberately narrow contract: concurrent [`add`] calls are
//! linearizable, [`load`] observes some prefix of completed adds, and
//! overwriting requires `&mut` access (the single-writer rebuild phases).
//!
//! [`add`]: ValueAccumulator::add
//! [`load`]: ValueAccumulator::load

use std::fmt;
use std::sync::Mutex;

#[cfg(not(feature = "f64"))]
use std::sync::atomic::AtomicU32 as AtomicBits;
#[cfg(feature = "f64")]
use std::sync::atomic::AtomicU64 as AtomicBits;
use std::sync::atomic::Ordering;

use crate::value::Value;
use crate::Float;

// =============================================================================
// AtomicFloat
// =============================================================================

/// A [`Float`] supporting lock-free concurrent addition.
///
/// Stores the IEEE-754 bit pattern in an atomic integer and performs adds as
/// a compare-and-swap loop with relaxed ordering. No ordering is implied
/// between adds from different threads; the accumulated total is exact up to
/// the usual floating-point reassociation.
pub struct AtomicFloat(AtomicBits);

impl AtomicFloat {
    /// Create an accumulator holding `value`.
    pub fn new(value: Float) -> Self {
        Self(AtomicBits::new(value.to_bits()))
    }

    /// Read the current value.
    #[inline]
    pub fn load(&self) -> Float {
        Float::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// Overwrite the current value.
    ///
    /// Safe against concurrent [`load`](Self::load)s but not against
    /// concurrent [`fetch_add`](Self::fetch_add)s (an in-flight add may be
    /// lost); callers store only during single-writer phases.
    #[inline]
    pub fn store(&self, value: Float) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Atomically add `rhs`, returning the previous value.
    #[inline]
    pub fn fetch_add(&self, rhs: Float) -> Float {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let updated = (Float::from_bits(current) + rhs).to_bits();
            match self
                .0
                .compare_exchange_weak(current, updated, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return Float::from_bits(current),
                Err(actual) => current = actual,
            }
        }
    }

    /// Overwrite through exclusive access, without an atomic operation.
    #[inline]
    pub fn set(&mut self, value: Float) {
        *self.0.get_mut() = value.to_bits();
    }
}

impl Default for AtomicFloat {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Clone for AtomicFloat {
    fn clone(&self) -> Self {
        Self::new(self.load())
    }
}

impl fmt::Debug for AtomicFloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicFloat").field(&self.load()).finish()
    }
}

impl From<Float> for AtomicFloat {
    fn from(value: Float) -> Self {
        Self::new(value)
    }
}

// =============================================================================
// ValueAccumulator
// =============================================================================

/// Concurrent accumulator for a [`Value`].
///
/// Each value type picks its own accumulator layout via
/// [`Value::Accumulator`]; scalar-shaped values use [`AtomicFloat`]s per
/// component, anything else can fall back to [`MutexAccumulator`].
pub trait ValueAccumulator<V: Value>: Send + Sync {
    /// Create an accumulator holding `value`.
    fn new(value: V) -> Self;

    /// Add `value` into the accumulator. Safe against concurrent adds and
    /// loads.
    fn add(&self, value: &V);

    /// Snapshot the current value.
    fn load(&self) -> V;

    /// Overwrite the accumulator. Exclusive access makes this trivially safe
    /// against everything else.
    fn store(&mut self, value: V);

    /// Snapshot scaled by a factor.
    fn scaled(&self, factor: Float) -> V {
        self.load().scaled(factor)
    }

    /// Snapshot divided by a positive factor.
    fn divided(&self, divisor: Float) -> V {
        self.load().divided(divisor)
    }
}

/// Mutex-serialized accumulator for value types without a lock-free layout.
pub struct MutexAccumulator<V>(Mutex<V>);

impl<V: Value> ValueAccumulator<V> for MutexAccumulator<V> {
    fn new(value: V) -> Self {
        Self(Mutex::new(value))
    }

    fn add(&self, value: &V) {
        self.0
            .lock()
            .expect("value accumulator mutex poisoned")
            .accumulate(value);
    }

    fn load(&self) -> V {
        self.0
            .lock()
            .expect("value accumulator mutex poisoned")
            .clone()
    }

    fn store(&mut self, value: V) {
        *self.0.get_mut().expect("value accumulator mutex poisoned") = value;
    }
}
