//! Structural traversal of a thunk tree.
//!
//! The walk is pre-order and left to right. Control thunks are never handed
//! to the visitor; their nested sequences are walked instead:
//! - `Sequential`: children in list order.
//! - `Conditional`: every branch, whichever one would run.
//! - `While`: the condition sequence, then the body sequence, once each.
//!
//! Every leaf is therefore visited exactly once, and repeated walks over an
//! unmodified tree visit leaves in the same order.

use std::fmt;

use super::{Thunk, ThunkBody, ThunkKind, ThunkSequence};

/// Apply `visit` to every leaf thunk under `seq`, however deeply nested.
pub fn for_all_thunks<F>(mut visit: F, seq: &mut ThunkSequence)
where
    F: FnMut(&mut Thunk),
{
    walk_mut(&mut visit, seq);
}

fn walk_mut(visit: &mut dyn FnMut(&mut Thunk), seq: &mut [Thunk]) {
    for thunk in seq.iter_mut() {
        match &mut thunk.body {
            ThunkBody::Leaf(_) => visit(thunk),
            ThunkBody::Sequential(thunks) => walk_mut(visit, thunks),
            ThunkBody::Conditional { branches, .. } => {
                for branch in branches.iter_mut() {
                    walk_mut(visit, branch);
                }
            }
            ThunkBody::While { condition, body, .. } => {
                walk_mut(visit, condition);
                walk_mut(visit, body);
            }
        }
    }
}

/// Read-only counterpart of [`for_all_thunks`], for serialization and metrics.
pub fn for_all_thunks_ref<F>(mut visit: F, seq: &ThunkSequence)
where
    F: FnMut(&Thunk),
{
    walk_ref(&mut visit, seq);
}

fn walk_ref(visit: &mut dyn FnMut(&Thunk), seq: &[Thunk]) {
    for thunk in seq {
        match &thunk.body {
            ThunkBody::Sequential(thunks) => walk_ref(visit, thunks),
            ThunkBody::Conditional { branches, .. } => {
                for branch in branches {
                    walk_ref(visit, branch);
                }
            }
            ThunkBody::While { condition, body, .. } => {
                walk_ref(visit, condition);
                walk_ref(visit, body);
            }
            ThunkBody::Leaf(_) => visit(thunk),
        }
    }
}

/// Shape summary of a thunk tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThunkStats {
    pub kernels: usize,
    pub copies: usize,
    pub memsets: usize,
    pub control_thunks: usize,
    /// Deepest control nesting; a flat sequence of leaves has depth 0.
    pub max_depth: usize,
}

impl ThunkStats {
    pub fn collect(seq: &ThunkSequence) -> Self {
        let mut stats = ThunkStats::default();
        for_all_thunks_ref(
            |thunk| match thunk.kind() {
                ThunkKind::Kernel => stats.kernels += 1,
                ThunkKind::Copy => stats.copies += 1,
                ThunkKind::Memset => stats.memsets += 1,
                _ => {}
            },
            seq,
        );
        let (control, depth) = control_shape(seq);
        stats.control_thunks = control;
        stats.max_depth = depth;
        stats
    }

    pub fn leaves(&self) -> usize {
        self.kernels + self.copies + self.memsets
    }
}

fn control_shape(seq: &[Thunk]) -> (usize, usize) {
    let mut count = 0;
    let mut depth = 0;
    for thunk in seq {
        let nested: Vec<&ThunkSequence> = match &thunk.body {
            ThunkBody::Leaf(_) => continue,
            ThunkBody::Sequential(thunks) => vec![thunks],
            ThunkBody::Conditional { branches, .. } => branches.iter().collect(),
            ThunkBody::While { condition, body, .. } => vec![condition, body],
        };
        count += 1;
        for child in nested {
            let (c, d) = control_shape(child);
            count += c;
            depth = depth.max(d + 1);
        }
        depth = depth.max(1);
    }
    (count, depth)
}

impl fmt::Display for ThunkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} leaves ({} kernels, {} copies, {} memsets), {} control thunks, depth {}",
            self.leaves(),
            self.kernels,
            self.copies,
            self.memsets,
            self.control_thunks,
            self.max_depth
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferSlice;
    use crate::thunk::{CopyDirection, LaunchDimensions, ThunkInfo};

    fn k(name: &str) -> Thunk {
        Thunk::kernel(
            ThunkInfo::for_instruction(name),
            name,
            vec![],
            LaunchDimensions { blocks: 1, threads_per_block: 1 },
        )
    }

    fn s() -> BufferSlice {
        BufferSlice::new(0, 0, 4)
    }

    fn nested_tree() -> ThunkSequence {
        vec![
            k("a"),
            Thunk::sequential(ThunkInfo::default(), vec![k("b"), k("c")]),
            Thunk::conditional(
                ThunkInfo::default(),
                s(),
                vec![
                    vec![k("d")],
                    vec![Thunk::while_loop(
                        ThunkInfo::default(),
                        s(),
                        vec![k("e")],
                        vec![k("f"), Thunk::sequential(ThunkInfo::default(), vec![k("g")])],
                        Some(3),
                    )],
                    vec![],
                ],
            ),
            Thunk::copy(ThunkInfo::for_instruction("h"), CopyDirection::DeviceToDevice, s(), s()),
        ]
    }

    fn visit_order(seq: &ThunkSequence) -> Vec<String> {
        let mut order = Vec::new();
        for_all_thunks_ref(
            |t| order.push(t.info().source_instruction.clone().unwrap_or_default()),
            seq,
        );
        order
    }

    #[test]
    fn test_preorder_left_to_right() {
        let tree = nested_tree();
        assert_eq!(visit_order(&tree), vec!["a", "b", "c", "d", "e", "f", "g", "h"]);
    }

    #[test]
    fn test_control_thunks_are_not_visited() {
        let mut tree = nested_tree();
        let mut kinds = Vec::new();
        for_all_thunks(|t| kinds.push(t.kind()), &mut tree);

        assert_eq!(kinds.len(), 8);
        assert!(kinds.iter().all(|kind| !kind.is_control()));
    }

    #[test]
    fn test_mutation_reaches_every_leaf() {
        let mut tree = nested_tree();
        for_all_thunks(|t| t.clear_compile_time_info(), &mut tree);

        let mut remaining = 0;
        for_all_thunks_ref(|t| remaining += usize::from(!t.info().is_empty()), &tree);
        assert_eq!(remaining, 0);
    }

    #[test]
    fn test_empty_sequence() {
        let mut tree = ThunkSequence::new();
        let mut count = 0;
        for_all_thunks(|_| count += 1, &mut tree);
        assert_eq!(count, 0);
        assert_eq!(ThunkStats::collect(&tree), ThunkStats::default());
    }

    #[test]
    fn test_stats() {
        let stats = ThunkStats::collect(&nested_tree());
        assert_eq!(stats.kernels, 7);
        assert_eq!(stats.copies, 1);
        assert_eq!(stats.leaves(), 8);
        assert_eq!(stats.control_thunks, 4);
        assert_eq!(stats.max_depth, 3);
    }
}
