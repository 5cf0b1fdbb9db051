//! Tree node storage.

use std::fmt;

use crate::accum::{AtomicFloat, ValueAccumulator};
use crate::io::{ReadBinary, WriteBinary};
use crate::value::Value;
use crate::{Float, NodeId};

/// One cell of the spatial partition.
///
/// Children are indexed by a D-bit key: bit `d` set means the upper half
/// along dimension `d` (bit 0 is dimension 0). `children[0] == 0` marks a
/// leaf; the root occupies index 0, so no inner node can point at it.
///
/// During an epoch `density` accumulates target mass, `value` accumulates
/// `value * weight` and `weight` accumulates the raw sample weights, all
/// through relaxed atomics. After a build, `density` holds the normalized
/// probability density of the cell, `value` the mean estimate and `weight`
/// the mass the mean was formed from.
pub struct Node<const A: usize, V: Value> {
    children: [NodeId; A],
    density: AtomicFloat,
    value: V::Accumulator,
    weight: AtomicFloat,
}

impl<const A: usize, V: Value> Node<A, V> {
    /// A fresh leaf covering its whole cell with unit density.
    pub fn uniform_leaf() -> Self {
        Self {
            children: [0; A],
            density: AtomicFloat::new(1.0),
            value: V::Accumulator::new(V::default()),
            weight: AtomicFloat::new(0.0),
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children[0] == 0
    }

    #[inline]
    pub fn mark_leaf(&mut self) {
        self.children[0] = 0;
    }

    /// Flag this node as having received too few samples to be trusted.
    /// Only meaningful inside a build pass; built trees never retain it.
    #[inline]
    pub fn mark_invalid(&mut self) {
        self.weight.set(-1.0);
    }

    #[inline]
    pub fn child(&self, key: usize) -> NodeId {
        self.children[key]
    }

    #[inline]
    pub fn set_child(&mut self, key: usize, child: NodeId) {
        self.children[key] = child;
    }

    #[inline]
    pub fn density(&self) -> Float {
        self.density.load()
    }

    #[inline]
    pub fn set_density(&mut self, density: Float) {
        self.density.set(density);
    }

    #[inline]
    pub fn weight(&self) -> Float {
        self.weight.load()
    }

    #[inline]
    pub fn set_weight(&mut self, weight: Float) {
        self.weight.set(weight);
    }

    #[inline]
    pub fn value_snapshot(&self) -> V {
        self.value.load()
    }

    #[inline]
    pub fn value_accumulator(&self) -> &V::Accumulator {
        &self.value
    }

    pub fn set_value(&mut self, value: V) {
        self.value.store(value);
    }

    /// Deposit one weighted sample into the accumulators.
    ///
    /// Concurrency-safe against other splats and reads; the tree topology
    /// must not be mutated while splats are in flight.
    pub fn splat(&self, value: &V, weight: Float, second_moment: bool) {
        let mut target = value.target();
        debug_assert!(weight >= 0.0, "sample weight must be non-negative");
        debug_assert!(target >= 0.0, "target projection must be non-negative");
        if second_moment {
            target *= target;
        }

        self.weight.fetch_add(weight);
        self.value.add(&value.scaled(weight));
        self.density.fetch_add(target * weight);
    }

    /// Zero the accumulators. Single-writer phases only.
    pub fn reset(&mut self) {
        self.density.set(0.0);
        self.value.store(V::default());
        self.weight.set(0.0);
    }

    /// Height of the subtree rooted here; a leaf has depth 1.
    pub fn depth(&self, nodes: &[Node<A, V>]) -> u32 {
        if self.is_leaf() {
            return 1;
        }
        let mut max_depth = 0;
        for key in 0..A {
            max_depth = max_depth.max(nodes[self.child(key) as usize].depth(nodes));
        }
        max_depth + 1
    }
}

impl<const A: usize, V: Value> Clone for Node<A, V> {
    fn clone(&self) -> Self {
        Self {
            children: self.children,
            density: self.density.clone(),
            value: V::Accumulator::new(self.value.load()),
            weight: self.weight.clone(),
        }
    }
}

impl<const A: usize, V: Value + fmt::Debug> fmt::Debug for Node<A, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("children", &self.children)
            .field("density", &self.density())
            .field("value", &self.value_snapshot())
            .field("weight", &self.weight())
            .finish()
    }
}

// Serialized record layout: density, value, weight, children.

impl<const A: usize, V: Value + WriteBinary> WriteBinary for Node<A, V> {
    fn write_binary<W: std::io::Write + ?Sized>(&self, writer: &mut W) -> std::io::Result<()> {
        self.density().write_binary(writer)?;
        self.value_snapshot().write_binary(writer)?;
        self.weight().write_binary(writer)?;
        self.children.write_binary(writer)
    }
}

impl<const A: usize, V: Value + ReadBinary> ReadBinary for Node<A, V> {
    fn read_binary<R: std::io::Read + ?Sized>(reader: &mut R) -> std::io::Result<Self> {
        let density = Float::read_binary(reader)?;
        let value = V::read_binary(reader)?;
        let weight = Float::read_binary(reader)?;
        let children = <[NodeId; A]>::read_binary(reader)?;
        Ok(Self {
            children,
            density: AtomicFloat::new(density),
            value: V::Accumulator::new(value),
            weight: AtomicFloat::new(weight),
        })
    }
}
