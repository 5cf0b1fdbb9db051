//! Shared helpers for the integration suites.

#![allow(dead_code)]

use densitree::{DensityTree, Float, NodeId, Value};

/// Integral of the piecewise-constant leaf density over `[0,1)^D`.
pub fn leaf_integral<const D: usize, const A: usize, V: Value>(
    tree: &DensityTree<D, A, V>,
) -> Float {
    fn visit<const D: usize, const A: usize, V: Value>(
        tree: &DensityTree<D, A, V>,
        node: NodeId,
        volume: Float,
    ) -> Float {
        if tree.is_leaf(node) {
            tree.density(node) * volume
        } else {
            (0..A)
                .map(|key| visit(tree, tree.child(node, key), volume / A as Float))
                .sum()
        }
    }
    visit(tree, 0, 1.0)
}

/// Visit every leaf with its id and depth.
pub fn for_each_leaf<const D: usize, const A: usize, V: Value>(
    tree: &DensityTree<D, A, V>,
    mut f: impl FnMut(NodeId, u32),
) {
    let mut stack = vec![(0 as NodeId, 0u32)];
    while let Some((node, depth)) = stack.pop() {
        if tree.is_leaf(node) {
            f(node, depth);
        } else {
            for key in 0..A {
                stack.push((tree.child(node, key), depth + 1));
            }
        }
    }
}
