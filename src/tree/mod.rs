//! Spatial binary tree distribution over the unit hypercube.
//!
//! This module provides:
//! - [`DensityTree`]: the self-refining tree distribution
//! - [`Distribution`]: the capability contract a guide samples through
//! - [`Draw`]: the result of drawing from a distribution
//!
//! # Layout
//!
//! The tree is an arena: a vector of nodes addressed by [`NodeId`], with the
//! root at index 0 and every child index strictly greater than its parent.
//! That ordering makes the structure acyclic by construction and lets
//! rebuilds emit nodes in pre-order without pointer fix-ups.
//!
//! # Epochs
//!
//! Between two builds the tree only accumulates: `splat` deposits weighted
//! samples into leaf accumulators through relaxed atomics, so any number of
//! threads may splat concurrently as long as nobody mutates the topology.
//! `build` then turns the accumulated mass into a normalized density
//! (pruning starved leaves), and `refine` splits overdense leaves and zeroes
//! the accumulators for the next epoch. Structural mutation is `&mut self`
//! and therefore excluded from the concurrent phase by the borrow checker.

mod node;

use std::io::{Read, Write};

use thiserror::Error;

use crate::accum::ValueAccumulator;
use crate::config::TreeSettings;
use crate::io::{ReadBinary, ReadError, WriteBinary};
use crate::value::Value;
use crate::{Float, NodeId, Vector};

use node::Node;

// =============================================================================
// Distribution
// =============================================================================

/// The result of drawing from a [`Distribution`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Draw<const D: usize, V> {
    /// The warped point in `[0,1)^D`.
    pub point: Vector<D>,
    /// Probability density at `point`.
    pub pdf: Float,
    /// Snapshot of the mean value estimate in the cell `point` landed in.
    pub value: V,
}

/// Capability contract for a learnable distribution on `[0,1)^D`.
///
/// [`DensityTree`] is the implementor shipped here; a
/// [`Guide`](crate::Guide) is generic over this trait so other spatial
/// structures can slot in.
pub trait Distribution<const D: usize>: Clone + Send + Sync {
    /// Quantity estimated alongside the density.
    type Value: Value;

    /// Deposit one weighted sample at `x`. Safe to call concurrently with
    /// other splats and with reads; not with structural mutation.
    fn splat(&self, x: &Vector<D>, value: &Self::Value, weight: Float);

    /// Probability density at `x`. Valid after a build; a fresh
    /// distribution is uniform.
    fn pdf(&self, x: &Vector<D>) -> Float;

    /// Warp a uniform `u` into a draw from the learned density.
    fn sample(&self, u: Vector<D>) -> Draw<D, Self::Value>;

    /// Turn the epoch's accumulated mass into a normalized density.
    fn build(&mut self);

    /// Adapt the structure for the next epoch: split overdense leaves,
    /// zero the accumulators.
    fn refine(&mut self);

    /// Forget everything learned; return to the uniform state.
    fn reset(&mut self);

    /// Snapshot of the overall integral estimate.
    fn estimate(&self) -> Self::Value;

    /// Diagnostic description of the distribution type.
    fn type_id(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

// =============================================================================
// TreeError
// =============================================================================

/// Structural validation errors for [`DensityTree`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    /// Tree has no nodes.
    #[error("tree has no nodes")]
    Empty,
    /// A child index references past the end of the node vector.
    #[error("node {node}: child {child} is out of bounds ({n_nodes} nodes)")]
    ChildOutOfBounds {
        node: NodeId,
        child: NodeId,
        n_nodes: usize,
    },
    /// A child index does not follow its parent in the node vector.
    #[error("node {node}: child {child} does not follow its parent")]
    ChildOrdering { node: NodeId, child: NodeId },
    /// A node is referenced by more than one parent.
    #[error("node {node} is referenced by more than one parent")]
    DuplicateChild { node: NodeId },
    /// A node exists in storage but no parent references it.
    #[error("node {node} is unreachable from the root")]
    Unreachable { node: NodeId },
}

// =============================================================================
// DensityTree
// =============================================================================

/// Spatial binary tree distribution over `[0,1)^D`.
///
/// `A` is the node arity and must equal `2^D`; stable Rust cannot derive one
/// const parameter from the other, so both are spelled out (the
/// [`DensityTree1`](crate::DensityTree1)/[`DensityTree2`](crate::DensityTree2)/
/// [`DensityTree3`](crate::DensityTree3) aliases cover the common cases and a
/// mismatched pair fails to compile).
#[derive(Clone, Debug)]
pub struct DensityTree<const D: usize, const A: usize, V: Value = crate::value::Scalar> {
    nodes: Vec<Node<A, V>>,
    settings: TreeSettings,
}

impl<const D: usize, const A: usize, V: Value> DensityTree<D, A, V> {
    const ARITY_MATCHES: () = assert!(A == 1 << D, "node arity must equal 2^D");

    /// Create a fresh (uniform) distribution.
    pub fn new(settings: TreeSettings) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::ARITY_MATCHES;
        let mut tree = Self {
            nodes: Vec::new(),
            settings,
        };
        tree.set_uniform();
        tree
    }

    /// The settings this instance was created with.
    pub fn settings(&self) -> &TreeSettings {
        &self.settings
    }

    /// Reduce to a single leaf with unit density and zero weight.
    pub fn set_uniform(&mut self) {
        self.nodes.clear();
        self.nodes.push(Node::uniform_leaf());
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Number of nodes in the arena.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Height of the tree; a single leaf has depth 1.
    pub fn depth(&self) -> u32 {
        self.nodes[0].depth(&self.nodes)
    }

    /// Whether `node` is a leaf.
    #[inline]
    pub fn is_leaf(&self, node: NodeId) -> bool {
        self.nodes[node as usize].is_leaf()
    }

    /// Child of `node` under the D-bit key `key`.
    #[inline]
    pub fn child(&self, node: NodeId, key: usize) -> NodeId {
        self.nodes[node as usize].child(key)
    }

    /// Density stored at `node` (only leaves are authoritative after a
    /// refine).
    #[inline]
    pub fn density(&self, node: NodeId) -> Float {
        self.nodes[node as usize].density()
    }

    /// Weight mass stored at `node`.
    #[inline]
    pub fn weight(&self, node: NodeId) -> Float {
        self.nodes[node as usize].weight()
    }

    /// Snapshot of the value estimate stored at `node`.
    #[inline]
    pub fn value(&self, node: NodeId) -> V {
        self.nodes[node as usize].value_snapshot()
    }

    /// The value accumulator of the leaf containing `x`.
    pub fn at(&self, x: &Vector<D>) -> &V::Accumulator {
        let (leaf, _) = self.leaf_at(x);
        self.nodes[leaf as usize].value_accumulator()
    }

    /// Descend to the leaf containing `x`, returning its id and depth.
    ///
    /// Accepts the closed upper boundary: a coordinate that rounded up to
    /// exactly 1.0 during sampling resolves to the last cell.
    pub fn leaf_at(&self, x: &Vector<D>) -> (NodeId, u32) {
        debug_assert_domain(x);

        let mut local = *x;
        let mut index = 0usize;
        let mut depth = 0u32;
        while !self.nodes[index].is_leaf() {
            let mut key = 0usize;
            for (dim, coord) in local.iter_mut().enumerate() {
                if *coord >= 0.5 {
                    key |= 1 << dim;
                    *coord -= 0.5;
                }
                *coord *= 2.0;
            }

            let next = self.nodes[index].child(key) as usize;
            debug_assert!(next > index);
            index = next;
            depth += 1;
        }
        (index as NodeId, depth)
    }

    /// Check the structural invariants of the arena.
    pub fn validate(&self) -> Result<(), TreeError> {
        let n_nodes = self.nodes.len();
        if n_nodes == 0 {
            return Err(TreeError::Empty);
        }

        // Parents precede children, so a single in-order pass sees every
        // reachable node after its parent.
        let mut reachable = vec![false; n_nodes];
        reachable[0] = true;

        for (index, node) in self.nodes.iter().enumerate() {
            if !reachable[index] || node.is_leaf() {
                continue;
            }
            for key in 0..A {
                let child = node.child(key);
                let child_index = child as usize;
                if child_index >= n_nodes {
                    return Err(TreeError::ChildOutOfBounds {
                        node: index as NodeId,
                        child,
                        n_nodes,
                    });
                }
                if child_index <= index {
                    return Err(TreeError::ChildOrdering {
                        node: index as NodeId,
                        child,
                    });
                }
                if reachable[child_index] {
                    return Err(TreeError::DuplicateChild { node: child });
                }
                reachable[child_index] = true;
            }
        }

        if let Some(node) = reachable.iter().position(|&r| !r) {
            return Err(TreeError::Unreachable {
                node: node as NodeId,
            });
        }
        Ok(())
    }

    // =========================================================================
    // Splatting
    // =========================================================================

    /// Box-filtered splat: spread the sample over every leaf overlapping a
    /// box the size of the leaf containing `x`.
    ///
    /// The deposited weight is `weight * overlap / size²`; the normalization
    /// by the squared footprint is dimension-independent by contract.
    fn splat_filtered_from(
        &self,
        index: usize,
        origin_min: &Vector<D>,
        origin_max: &Vector<D>,
        node_min: Vector<D>,
        node_size: Float,
        value: &V,
        weight: Float,
    ) {
        let mut node_max = node_min;
        for coord in &mut node_max {
            *coord += node_size;
        }
        let overlap = box_overlap(origin_min, origin_max, &node_min, &node_max);
        if overlap <= 0.0 {
            return;
        }

        let node = &self.nodes[index];
        if node.is_leaf() {
            node.splat(value, weight * overlap, self.settings.second_moment);
            return;
        }

        let child_size = 0.5 * node_size;
        for key in 0..A {
            let mut child_min = node_min;
            for (dim, coord) in child_min.iter_mut().enumerate() {
                if key & (1 << dim) != 0 {
                    *coord += child_size;
                }
            }
            self.splat_filtered_from(
                node.child(key) as usize,
                origin_min,
                origin_max,
                child_min,
                child_size,
                value,
                weight,
            );
        }
    }

    // =========================================================================
    // Building
    // =========================================================================

    /// First build pass: emit a pre-order copy of the subtree at `index`
    /// into `rebuilt`, converting accumulated mass into (unnormalized)
    /// densities and pruning starved regions.
    ///
    /// Starved leaves are flagged with a negative weight; an internal node
    /// whose children are all starved propagates the flag, and one with a
    /// mix of starved and valid children collapses to a leaf carrying the
    /// aggregate. The flag never survives into the finished tree.
    fn build_into(&self, index: usize, rebuilt: &mut Vec<Node<A, V>>, scale: Float) {
        let node = &self.nodes[index];
        let new_index = rebuilt.len();
        rebuilt.push(node.clone());

        if node.is_leaf() {
            let weight = node.weight();
            if self.settings.leaf_reweighting && weight < self.settings.starvation_threshold {
                rebuilt[new_index].mark_invalid();
                return;
            }

            let w = if self.settings.leaf_reweighting {
                1.0 / weight
            } else {
                scale
            };
            debug_assert!(w >= 0.0);

            let mut density = node.density() * w;
            if self.settings.second_moment {
                density = density.sqrt();
            }

            let value = node.value_accumulator().scaled(w);
            let fresh = &mut rebuilt[new_index];
            fresh.mark_leaf();
            fresh.set_density(density);
            fresh.set_value(value);
            fresh.set_weight(weight);
            return;
        }

        let mut valid_count = 0usize;
        let mut density_sum: Float = 0.0;
        let mut weight_sum: Float = 0.0;
        let mut value_sum = V::default();

        for key in 0..A {
            let new_child_index = rebuilt.len();
            self.build_into(node.child(key) as usize, rebuilt, scale * A as Float);
            rebuilt[new_index].set_child(key, new_child_index as NodeId);

            let child = &rebuilt[new_child_index];
            if child.weight() >= 0.0 {
                density_sum += child.density();
                value_sum.accumulate(&child.value_snapshot());
                weight_sum += child.weight();
                valid_count += 1;
            }
        }

        if !self.settings.leaf_reweighting {
            // Naive building ignores starvation entirely.
            valid_count = A;
        }

        if valid_count == 0 {
            rebuilt[new_index].mark_invalid();
            return;
        }

        let parent = &mut rebuilt[new_index];
        parent.set_density(density_sum / valid_count as Float);
        parent.set_value(value_sum.divided(valid_count as Float));
        parent.set_weight(weight_sum);

        if valid_count < A {
            // Some children starved: drop the whole subtree and keep the
            // aggregate as a leaf.
            rebuilt.truncate(new_index + 1);
            rebuilt[new_index].mark_leaf();
        }
    }

    // =========================================================================
    // Refinement
    // =========================================================================

    fn refine_from(&mut self, index: usize, scale: Float) {
        if self.nodes[index].is_leaf() {
            let criterion = self.nodes[index].density() / scale;
            if criterion >= self.settings.split_threshold {
                self.split(index);
            } else {
                self.nodes[index].reset();
                return;
            }
        }

        for key in 0..A {
            let child = self.nodes[index].child(key) as usize;
            self.refine_from(child, scale * A as Float);
        }
    }

    /// Split a leaf into `A` children inheriting its state, appended at the
    /// end of the arena so the topological ordering is preserved.
    fn split(&mut self, index: usize) {
        debug_assert!(self.nodes[index].is_leaf());
        let first_child = self.nodes.len() as NodeId;
        debug_assert!(first_child as usize > index);

        for _ in 0..A {
            let inherited = self.nodes[index].clone();
            self.nodes.push(inherited);
        }
        for key in 0..A {
            self.nodes[index].set_child(key, first_child + key as NodeId);
        }
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    /// Write the node vector as a raw host-endian blob: a `u64` count
    /// followed by per-node records of density, value, weight and children.
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> std::io::Result<()>
    where
        V: WriteBinary,
    {
        self.nodes.write_binary(writer)
    }

    /// Read a blob produced by [`write_to`](Self::write_to) and validate its
    /// structure. The reader must have been compiled with the same `D`,
    /// [`Float`] width, value layout and [`NodeId`] width as the writer.
    pub fn read_from<R: Read + ?Sized>(
        reader: &mut R,
        settings: TreeSettings,
    ) -> Result<Self, ReadError>
    where
        V: ReadBinary,
    {
        let nodes: Vec<Node<A, V>> = Vec::read_binary(reader)?;
        if nodes.is_empty() {
            return Err(ReadError::Empty);
        }

        let tree = Self { nodes, settings };
        tree.validate()?;
        Ok(tree)
    }
}

impl<const D: usize, const A: usize, V: Value> Default for DensityTree<D, A, V> {
    fn default() -> Self {
        Self::new(TreeSettings::default())
    }
}

impl<const D: usize, const A: usize, V: Value> Distribution<D> for DensityTree<D, A, V> {
    type Value = V;

    fn splat(&self, x: &Vector<D>, value: &V, weight: Float) {
        debug_assert_domain(x);

        if !self.settings.filtering {
            let (leaf, _) = self.leaf_at(x);
            self.nodes[leaf as usize].splat(value, weight, self.settings.second_moment);
            return;
        }

        let (_, depth) = self.leaf_at(x);
        let size = (0.5 as Float).powi(depth as i32);

        let mut origin_min = [0.0 as Float; D];
        let mut origin_max = [0.0 as Float; D];
        for dim in 0..D {
            origin_min[dim] = x[dim] - 0.5 * size;
            origin_max[dim] = x[dim] + 0.5 * size;
        }

        self.splat_filtered_from(
            0,
            &origin_min,
            &origin_max,
            [0.0; D],
            1.0,
            value,
            weight / (size * size),
        );
    }

    fn pdf(&self, x: &Vector<D>) -> Float {
        let (leaf, _) = self.leaf_at(x);
        self.nodes[leaf as usize].density()
    }

    fn sample(&self, mut u: Vector<D>) -> Draw<D, V> {
        debug_assert_unit(&u);

        let mut base = [0.0 as Float; D];
        let mut scale: Float = 1.0;
        let mut index = 0usize;

        while !self.nodes[index].is_leaf() {
            let node = &self.nodes[index];
            let mut key = 0usize;

            // Sample one axis at a time, marginalizing the not-yet-chosen
            // dimensions by summing the densities of matching children.
            for dim in 0..D {
                let mut halves: [Float; 2] = [0.0, 0.0];
                for sub in 0..(1usize << (D - dim)) {
                    let child = node.child((sub << dim) | key) as usize;
                    halves[sub & 1] += self.nodes[child].density();
                }

                let total = halves[0] + halves[1];
                debug_assert!(halves[0] >= 0.0 && halves[1] >= 0.0);
                debug_assert!(total > 0.0, "descendant densities must not vanish");
                let q = halves[0] / total;

                if u[dim] < q {
                    u[dim] /= q;
                } else {
                    key |= 1 << dim;
                    u[dim] = (u[dim] - q) / (1.0 - q);
                    base[dim] += 0.5 * scale;
                }
            }

            let next = node.child(key) as usize;
            debug_assert!(next > index);
            index = next;
            scale *= 0.5;
        }

        let leaf = &self.nodes[index];
        debug_assert!(leaf.density() > 0.0);

        let mut point = base;
        for dim in 0..D {
            point[dim] += scale * u[dim];
        }

        Draw {
            point,
            pdf: leaf.density(),
            value: leaf.value_snapshot(),
        }
    }

    fn build(&mut self) {
        let mut rebuilt = Vec::with_capacity(self.nodes.len());
        self.build_into(0, &mut rebuilt, 1.0);

        if rebuilt[0].weight() <= 0.0 || rebuilt[0].density() == 0.0 {
            // An epoch without samples; start over from uniform.
            self.set_uniform();
            return;
        }

        self.nodes = rebuilt;
        let norm = self.nodes[0].density();
        let total_weight = self.nodes[0].weight();

        for node in &mut self.nodes {
            let density = node.density();
            node.set_density(density / norm);
            if !self.settings.leaf_reweighting {
                let value = node.value_snapshot().divided(total_weight);
                node.set_value(value);
            }
        }
    }

    fn refine(&mut self) {
        self.refine_from(0, 1.0);
    }

    fn reset(&mut self) {
        self.set_uniform();
    }

    fn estimate(&self) -> V {
        self.nodes[0].value_snapshot()
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Volume of the intersection of two axis-aligned boxes.
fn box_overlap<const D: usize>(
    a_min: &Vector<D>,
    a_max: &Vector<D>,
    b_min: &Vector<D>,
    b_max: &Vector<D>,
) -> Float {
    let mut overlap: Float = 1.0;
    for dim in 0..D {
        overlap *= (a_max[dim].min(b_max[dim]) - a_min[dim].max(b_min[dim])).max(0.0);
    }
    overlap
}

fn debug_assert_unit<const D: usize>(x: &Vector<D>) {
    for (dim, coord) in x.iter().enumerate() {
        debug_assert!(
            (0.0..1.0).contains(coord),
            "coordinate {} outside [0,1): {}",
            dim,
            coord
        );
    }
}

fn debug_assert_domain<const D: usize>(x: &Vector<D>) {
    for (dim, coord) in x.iter().enumerate() {
        debug_assert!(
            (0.0..=1.0).contains(coord),
            "coordinate {} outside [0,1]: {}",
            dim,
            coord
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Scalar;
    use crate::{DensityTree1, DensityTree2};

    fn no_filter_settings() -> TreeSettings {
        TreeSettings::builder().filtering(false).build().unwrap()
    }

    #[test]
    fn fresh_tree_is_uniform() {
        let tree = DensityTree2::<Scalar>::default();
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.pdf(&[0.3, 0.9]), 1.0);
        tree.validate().unwrap();
    }

    #[test]
    fn leaf_at_descends_by_halves() {
        let mut tree = DensityTree2::<Scalar>::default();
        tree.split(0);
        // Children keys: bit 0 = dim 0 upper, bit 1 = dim 1 upper.
        assert_eq!(tree.leaf_at(&[0.1, 0.1]).0, tree.child(0, 0));
        assert_eq!(tree.leaf_at(&[0.9, 0.1]).0, tree.child(0, 1));
        assert_eq!(tree.leaf_at(&[0.1, 0.9]).0, tree.child(0, 2));
        assert_eq!(tree.leaf_at(&[0.9, 0.9]).0, tree.child(0, 3));
        assert_eq!(tree.leaf_at(&[0.9, 0.9]).1, 1);
    }

    #[test]
    fn split_preserves_topological_order() {
        let mut tree = DensityTree2::<Scalar>::default();
        tree.split(0);
        tree.split(tree.child(0, 2) as usize);
        tree.validate().unwrap();
        assert_eq!(tree.node_count(), 9);
        assert_eq!(tree.depth(), 3);
    }

    #[test]
    fn split_children_inherit_parent_state() {
        let mut tree = DensityTree1::<Scalar>::new(no_filter_settings());
        tree.splat(&[0.2], &Scalar(1.0), 4.0);
        tree.split(0);
        for key in 0..2 {
            let child = tree.child(0, key);
            assert_eq!(tree.weight(child), 4.0);
            // 1 (uniform start) + target * weight.
            assert_eq!(tree.density(child), 5.0);
        }
    }

    #[test]
    fn unfiltered_splat_reaches_only_the_containing_leaf() {
        let mut tree = DensityTree2::<Scalar>::new(no_filter_settings());
        tree.split(0);
        tree.splat(&[0.1, 0.1], &Scalar(1.0), 1.0);
        let hit = tree.child(0, 0);
        let missed = tree.child(0, 3);
        assert_eq!(tree.weight(hit), 1.0);
        assert_eq!(tree.weight(missed), 0.0);
    }

    #[test]
    fn filtered_splat_spreads_by_overlap() {
        let mut tree = DensityTree2::<Scalar>::default();
        tree.split(0);
        // The containing leaf has depth 1, so the filter box has side 0.5
        // centered at (0.5, 0.5) and overlaps all four quadrants equally.
        tree.splat(&[0.5, 0.5], &Scalar(1.0), 1.0);
        for key in 0..4 {
            let child = tree.child(0, key);
            assert!((tree.weight(child) - 0.25).abs() < 1e-5);
        }
    }

    #[test]
    fn build_on_empty_epoch_resets_to_uniform() {
        let mut tree = DensityTree2::<Scalar>::default();
        tree.split(0);
        tree.build();
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.pdf(&[0.7, 0.2]), 1.0);
    }

    #[test]
    fn build_normalizes_root_density_to_one() {
        let mut tree = DensityTree2::<Scalar>::new(no_filter_settings());
        tree.splat(&[0.25, 0.25], &Scalar(2.0), 3.0);
        tree.build();
        assert_eq!(tree.density(0), 1.0);
    }

    #[test]
    fn build_prunes_starved_siblings_into_the_parent() {
        let mut tree = DensityTree2::<Scalar>::new(no_filter_settings());
        tree.split(0);
        // Only one quadrant receives weight; its siblings starve, so the
        // root collapses back into a single leaf carrying the aggregate.
        for _ in 0..10 {
            tree.splat(&[0.1, 0.1], &Scalar(1.0), 1.0);
        }
        tree.build();
        assert_eq!(tree.node_count(), 1);
        assert!(tree.is_leaf(0));
        assert_eq!(tree.weight(0), 10.0);
    }

    #[test]
    fn build_second_moment_takes_square_root() {
        let settings = TreeSettings::builder()
            .filtering(false)
            .second_moment(true)
            .build()
            .unwrap();
        let mut tree = DensityTree1::<Scalar>::new(settings);
        tree.split(0);
        for key in 0..2 {
            let child = tree.child(0, key) as usize;
            tree.nodes[child].reset();
        }

        // Accumulated target² is 16 vs 1; the square root flattens the
        // learned ratio to 4:1 instead of 16:1.
        tree.splat(&[0.25], &Scalar(4.0), 1.0);
        tree.splat(&[0.75], &Scalar(1.0), 1.0);
        tree.build();
        assert!((tree.pdf(&[0.2]) - 1.6).abs() < 1e-5);
        assert!((tree.pdf(&[0.8]) - 0.4).abs() < 1e-5);
        // The value estimate is untouched by the second-moment transform.
        assert_eq!(tree.value(tree.leaf_at(&[0.2]).0), Scalar(4.0));
    }

    #[test]
    fn refine_splits_overdense_leaves_and_zeroes_the_rest() {
        let settings = TreeSettings::builder()
            .filtering(false)
            .split_threshold(0.1)
            .build()
            .unwrap();
        let mut tree = DensityTree2::<Scalar>::new(settings);
        tree.splat(&[0.4, 0.4], &Scalar(1.0), 1.0);
        tree.build();
        tree.refine();

        // Root (density 1) splits; children (criterion 1/4) split again;
        // grandchildren (criterion 1/16 < 0.1) stay leaves and are reset.
        assert!(!tree.is_leaf(0));
        assert_eq!(tree.depth(), 3);
        tree.validate().unwrap();
        for node in 0..tree.node_count() as NodeId {
            if tree.is_leaf(node) {
                assert_eq!(tree.density(node), 0.0);
                assert_eq!(tree.weight(node), 0.0);
            }
        }
    }

    #[test]
    fn sample_on_uniform_tree_is_identity() {
        let tree = DensityTree2::<Scalar>::default();
        let draw = tree.sample([0.3, 0.8]);
        assert_eq!(draw.point, [0.3, 0.8]);
        assert_eq!(draw.pdf, 1.0);
    }

    #[test]
    fn sample_lands_in_the_heavy_half() {
        let mut tree = DensityTree1::<Scalar>::new(no_filter_settings());
        tree.split(0);
        for key in 0..2 {
            let child = tree.child(0, key) as usize;
            tree.nodes[child].reset();
        }

        // Mean target 9 below 0.5, mean target 1 above: pdf 1.8 vs 0.2.
        tree.splat(&[0.25], &Scalar(9.0), 1.0);
        tree.splat(&[0.75], &Scalar(1.0), 1.0);
        tree.build();

        // q = 0.9 for the lower half: u = 0.45 maps to 0.5 within it.
        let draw = tree.sample([0.45]);
        assert!((draw.point[0] - 0.25).abs() < 1e-6);
        assert!((draw.pdf - 1.8).abs() < 1e-5);

        // u past 0.9 lands in the light half.
        let draw = tree.sample([0.95]);
        assert!(draw.point[0] >= 0.5);
        assert!((draw.pdf - 0.2).abs() < 1e-5);
    }

    #[test]
    fn estimate_tracks_the_root_mean() {
        let mut tree = DensityTree2::<Scalar>::new(no_filter_settings());
        tree.splat(&[0.5, 0.5], &Scalar(3.0), 2.0);
        tree.build();
        assert_eq!(tree.estimate(), Scalar(3.0));
    }

    #[test]
    fn reset_restores_post_construction_state() {
        let mut tree = DensityTree2::<Scalar>::default();
        tree.split(0);
        tree.splat(&[0.2, 0.2], &Scalar(1.0), 1.0);
        tree.reset();
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.pdf(&[0.2, 0.2]), 1.0);
        assert_eq!(tree.weight(0), 0.0);
    }

    #[test]
    fn validate_rejects_out_of_order_children() {
        let mut tree = DensityTree1::<Scalar>::default();
        tree.split(0);
        tree.split(tree.child(0, 1) as usize);
        // Rewire a child to point backwards.
        tree.nodes[2].set_child(0, 1);
        assert!(matches!(
            tree.validate(),
            Err(TreeError::ChildOrdering { .. }) | Err(TreeError::DuplicateChild { .. })
        ));
    }

    #[test]
    fn box_overlap_clips_and_multiplies() {
        let full = box_overlap(&[0.0, 0.0], &[1.0, 1.0], &[0.0, 0.0], &[1.0, 1.0]);
        assert_eq!(full, 1.0);
        let quarter = box_overlap(&[0.25, 0.25], &[0.75, 0.75], &[0.0, 0.0], &[0.5, 0.5]);
        assert!((quarter - 0.0625).abs() < 1e-6);
        let disjoint = box_overlap(&[0.0, 0.0], &[0.2, 0.2], &[0.5, 0.5], &[1.0, 1.0]);
        assert_eq!(disjoint, 0.0);
    }

    #[test]
    fn type_id_names_the_tree() {
        let tree = DensityTree2::<Scalar>::default();
        assert!(tree.type_id().contains("DensityTree"));
    }
}
