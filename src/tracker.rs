use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

// ─── MutationTracker ────────────────────────────────────────────────────────

/// Hierarchical dirty flag.
///
/// Each segment owns one node; a node holds its parent, never its children.
/// `mark_dirty` walks upward eagerly, so `is_dirty` on any ancestor is a
/// single load. Dirty state is never cleared.
#[derive(Clone, Default)]
pub struct MutationTracker(Rc<TrackerNode>);

#[derive(Default)]
struct TrackerNode {
    dirty: Cell<bool>,
    parent: Option<MutationTracker>,
}

impl MutationTracker {
    /// A root tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// A child whose mutations are visible to `self` and its ancestors.
    pub fn create_child(&self) -> Self {
        MutationTracker(Rc::new(TrackerNode {
            dirty: Cell::new(false),
            parent: Some(self.clone()),
        }))
    }

    pub fn mark_dirty(&self) {
        let mut node = Some(self);
        while let Some(current) = node {
            // Ancestors of a dirty node are already dirty.
            if current.0.dirty.replace(true) {
                break;
            }
            node = current.0.parent.as_ref();
        }
    }

    /// True if this node or any descendant was marked.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.0.dirty.get()
    }
}

impl fmt::Debug for MutationTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationTracker")
            .field("dirty", &self.is_dirty())
            .field("has_parent", &self.0.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_propagates_upward_only() {
        let root = MutationTracker::new();
        let child = root.create_child();
        let sibling = root.create_child();
        let grandchild = child.create_child();

        grandchild.mark_dirty();

        assert!(grandchild.is_dirty());
        assert!(child.is_dirty());
        assert!(root.is_dirty());
        assert!(!sibling.is_dirty());
    }

    #[test]
    fn test_child_outlives_parent_handle() {
        let child = {
            let root = MutationTracker::new();
            root.create_child()
        };
        child.mark_dirty();
        assert!(child.is_dirty());
    }
}
