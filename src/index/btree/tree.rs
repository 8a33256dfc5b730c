//! B+ tree index over the buffer pool.
//!
//! The tree owns nothing in memory beyond its configuration: the root is
//! tracked in a persisted header page, and every node access goes through
//! buffer pool page guards.
//!
//! # Latching protocol
//! - Reads crab downward with read latches: the child is latched before
//!   the parent's latch is released, so no split can invalidate the
//!   descent.
//! - Inserts crab downward with write latches and keep the whole unsafe
//!   prefix of the path (plus the header page) latched. A node is safe
//!   when inserting below it cannot split it; once a safe node is
//!   latched, all ancestor latches are released. Split propagation then
//!   consumes the retained stack bottom-up.
//! - Removes never restructure (no merge/redistribute), so every node is
//!   safe and a remove holds at most two latches at a time.

use std::cmp::Ordering;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::buffer::{BufferPoolManager, PageReadGuard, PageWriteGuard};
use crate::common::{PageId, Result, Rid};
use crate::index::btree::header::{HeaderMut, HeaderRef};
use crate::index::btree::iterator::TreeIterator;
use crate::index::btree::node::{
    internal_capacity, leaf_capacity, InternalMut, InternalRef, LeafMut, LeafRef, NodeMut, NodeRef,
};
use crate::index::key::IndexKey;

/// Write latches retained during an insert descent.
///
/// `header` is `Some` for as long as the root id may still change;
/// `path` holds the latched ancestors, deepest last.
struct InsertContext<'a> {
    header: Option<PageWriteGuard<'a>>,
    path: Vec<PageWriteGuard<'a>>,
}

/// A disk-resident ordered map from fixed-length keys to record ids.
///
/// Keys are unique; `insert` rejects duplicates. Ordering comes from the
/// comparator supplied at construction.
pub struct BPlusTree<K, C>
where
    K: IndexKey,
    C: Fn(&K, &K) -> Ordering,
{
    name: String,
    header_page_id: PageId,
    bpm: Arc<BufferPoolManager>,
    comparator: C,
    leaf_max_size: usize,
    internal_max_size: usize,
    _marker: PhantomData<fn(K)>,
}

impl<K, C> BPlusTree<K, C>
where
    K: IndexKey,
    C: Fn(&K, &K) -> Ordering,
{
    /// Create a tree over `header_page_id`.
    ///
    /// Writes an invalid root id into the header page: this constructs a
    /// fresh index, it does not reopen one.
    ///
    /// # Panics
    /// Panics if either max size doesn't fit in a page.
    pub fn new(
        name: impl Into<String>,
        header_page_id: PageId,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        assert!(
            (2..=leaf_capacity::<K>()).contains(&leaf_max_size),
            "leaf_max_size {} out of range",
            leaf_max_size
        );
        assert!(
            (3..=internal_capacity::<K>()).contains(&internal_max_size),
            "internal_max_size {} out of range",
            internal_max_size
        );

        let mut header_guard = bpm.fetch_page_write(header_page_id)?;
        HeaderMut::new(header_guard.as_mut_slice()).set_root_page_id(PageId::INVALID);
        drop(header_guard);

        Ok(Self {
            name: name.into(),
            header_page_id,
            bpm,
            comparator,
            leaf_max_size,
            internal_max_size,
            _marker: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the tree holds no entries.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(!self.root_page_id()?.is_valid())
    }

    /// The current root's page id (`INVALID` when empty).
    pub fn root_page_id(&self) -> Result<PageId> {
        let guard = self.bpm.fetch_page_read(self.header_page_id)?;
        Ok(HeaderRef::new(guard.as_slice()).root_page_id())
    }

    // ========================================================================
    // Point query
    // ========================================================================

    /// Look up `key`, returning its record id if present.
    pub fn get_value(&self, key: &K) -> Result<Option<Rid>> {
        let header_guard = self.bpm.fetch_page_read(self.header_page_id)?;
        let root_id = HeaderRef::new(header_guard.as_slice()).root_page_id();
        if !root_id.is_valid() {
            return Ok(None);
        }

        let mut guard = self.bpm.fetch_page_read(root_id)?;
        drop(header_guard);

        loop {
            if NodeRef::new(guard.as_slice()).is_leaf() {
                let leaf = LeafRef::<K>::new(guard.as_slice());
                return Ok(leaf.lookup(key, &self.comparator));
            }

            let child_id = {
                let internal = InternalRef::<K>::new(guard.as_slice());
                internal.child_at(internal.find_child_index(key, &self.comparator))
            };
            // Crab: latch the child before releasing the parent.
            let child_guard = self.bpm.fetch_page_read(child_id)?;
            guard = child_guard;
        }
    }

    // ========================================================================
    // Insertion
    // ========================================================================

    /// Insert `key -> rid`. Returns `false` if the key already exists.
    pub fn insert(&self, key: &K, rid: Rid) -> Result<bool> {
        let mut header_guard = self.bpm.fetch_page_write(self.header_page_id)?;
        let root_id = HeaderRef::new(header_guard.as_slice()).root_page_id();

        // Empty tree: the new root is a leaf holding the single entry.
        if !root_id.is_valid() {
            let mut root_guard = self.bpm.new_page()?;
            let root_id = root_guard.page_id();
            let mut leaf =
                LeafMut::<K>::init(root_guard.as_mut_slice(), root_id, self.leaf_max_size);
            leaf.set_is_root(true);
            leaf.insert_at(0, key, rid);
            HeaderMut::new(header_guard.as_mut_slice()).set_root_page_id(root_id);
            return Ok(true);
        }

        let mut ctx = InsertContext {
            header: Some(header_guard),
            path: Vec::new(),
        };

        // Write-latch crab down to the target leaf.
        let mut current = root_id;
        loop {
            let guard = self.bpm.fetch_page_write(current)?;
            let node = NodeRef::new(guard.as_slice());
            let is_leaf = node.is_leaf();
            let safe = if is_leaf {
                node.size() < node.max_size() - 1
            } else {
                node.size() < node.max_size()
            };

            if safe {
                ctx.header = None;
                ctx.path.clear();
            }

            if is_leaf {
                ctx.path.push(guard);
                break;
            }

            let internal = InternalRef::<K>::new(guard.as_slice());
            current = internal.child_at(internal.find_child_index(key, &self.comparator));
            ctx.path.push(guard);
        }

        let mut leaf_guard = ctx.path.pop().expect("descent latched the leaf");

        let (pos, duplicate, size, max_size) = {
            let leaf = LeafRef::<K>::new(leaf_guard.as_slice());
            let pos = leaf.lower_bound(key, &self.comparator);
            let duplicate =
                pos < leaf.size() && (self.comparator)(&leaf.key_at(pos), key) == Ordering::Equal;
            (pos, duplicate, leaf.size(), NodeRef::new(leaf_guard.as_slice()).max_size())
        };

        if duplicate {
            return Ok(false);
        }

        if size < max_size - 1 {
            LeafMut::<K>::new(leaf_guard.as_mut_slice()).insert_at(pos, key, rid);
            return Ok(true);
        }

        self.split_leaf(&mut ctx, leaf_guard, key, rid)?;
        Ok(true)
    }

    /// Split a full leaf while inserting `(key, rid)`, then propagate the
    /// middle key upward.
    fn split_leaf<'a>(
        &'a self,
        ctx: &mut InsertContext<'a>,
        mut leaf_guard: PageWriteGuard<'a>,
        key: &K,
        rid: Rid,
    ) -> Result<()> {
        // Sorted view of the existing entries plus the new one.
        let mut entries: Vec<(K, Rid)> = {
            let leaf = LeafRef::<K>::new(leaf_guard.as_slice());
            (0..leaf.size())
                .map(|i| (leaf.key_at(i), leaf.rid_at(i)))
                .collect()
        };
        let pos = LeafRef::<K>::new(leaf_guard.as_slice()).lower_bound(key, &self.comparator);
        entries.insert(pos, (*key, rid));

        let split_at = self.leaf_max_size / 2;
        let old_next = LeafRef::<K>::new(leaf_guard.as_slice()).next_page_id();

        let mut new_guard = self.bpm.new_page()?;
        let new_id = new_guard.page_id();
        {
            let mut right =
                LeafMut::<K>::init(new_guard.as_mut_slice(), new_id, self.leaf_max_size);
            for (i, (k, r)) in entries[split_at..].iter().enumerate() {
                right.set_entry(i, k, *r);
            }
            right.set_size(entries.len() - split_at);
            // The new leaf takes over the old leaf's position in the chain.
            right.set_next_page_id(old_next);
        }
        {
            let mut left = LeafMut::<K>::new(leaf_guard.as_mut_slice());
            for (i, (k, r)) in entries[..split_at].iter().enumerate() {
                left.set_entry(i, k, *r);
            }
            left.set_size(split_at);
            left.set_next_page_id(new_id);
        }

        let middle_key = entries[split_at].0;
        self.insert_into_parent(ctx, leaf_guard, middle_key, new_guard)
    }

    /// Install `(middle_key, new)` above `old`, splitting ancestors as
    /// needed. `old` and `new` are the two halves of a just-split node.
    fn insert_into_parent<'a>(
        &'a self,
        ctx: &mut InsertContext<'a>,
        old_guard: PageWriteGuard<'a>,
        middle_key: K,
        new_guard: PageWriteGuard<'a>,
    ) -> Result<()> {
        let mut old_guard = old_guard;
        let mut middle_key = middle_key;
        let mut new_guard = new_guard;

        loop {
            // The old node was the root: grow the tree by one level.
            if NodeRef::new(old_guard.as_slice()).is_root() {
                let mut root_guard = self.bpm.new_page()?;
                let root_id = root_guard.page_id();
                {
                    let mut root = InternalMut::<K>::init(
                        root_guard.as_mut_slice(),
                        root_id,
                        self.internal_max_size,
                    );
                    root.set_is_root(true);
                    root.set_child_at(0, old_guard.page_id());
                    root.set_size(1);
                    root.insert_at(1, &middle_key, new_guard.page_id());
                }

                let mut old = NodeMut::new(old_guard.as_mut_slice());
                old.set_is_root(false);
                old.set_parent(root_id);
                NodeMut::new(new_guard.as_mut_slice()).set_parent(root_id);

                let header_guard = ctx
                    .header
                    .as_mut()
                    .expect("header stays latched while the root may change");
                HeaderMut::new(header_guard.as_mut_slice()).set_root_page_id(root_id);
                return Ok(());
            }

            let mut parent_guard = ctx
                .path
                .pop()
                .expect("unsafe child keeps its parent latched");
            let parent_id = parent_guard.page_id();

            // Room in the parent: plain insert, done.
            if NodeRef::new(parent_guard.as_slice()).size() < self.internal_max_size {
                let pos = InternalRef::<K>::new(parent_guard.as_slice())
                    .find_insert_pos(&middle_key, &self.comparator);
                InternalMut::<K>::new(parent_guard.as_mut_slice()).insert_at(
                    pos,
                    &middle_key,
                    new_guard.page_id(),
                );
                NodeMut::new(new_guard.as_mut_slice()).set_parent(parent_id);
                return Ok(());
            }

            // Split the parent. Combined entry list, slot-0 key junk
            // included so child pointers keep their slots.
            let mut entries: Vec<(K, PageId)> = {
                let parent = InternalRef::<K>::new(parent_guard.as_slice());
                (0..parent.size())
                    .map(|i| (parent.key_at(i), parent.child_at(i)))
                    .collect()
            };
            let pos = InternalRef::<K>::new(parent_guard.as_slice())
                .find_insert_pos(&middle_key, &self.comparator);
            entries.insert(pos, (middle_key, new_guard.page_id()));

            let split_at = (self.internal_max_size + 2) / 2;
            let lifted_key = entries[split_at].0;

            let mut right_guard = self.bpm.new_page()?;
            let right_id = right_guard.page_id();
            {
                let mut right = InternalMut::<K>::init(
                    right_guard.as_mut_slice(),
                    right_id,
                    self.internal_max_size,
                );
                // The lifted key rides along in slot 0, where key bytes
                // are never consulted.
                for (i, (k, c)) in entries[split_at..].iter().enumerate() {
                    right.set_key_at(i, k);
                    right.set_child_at(i, *c);
                }
                right.set_size(entries.len() - split_at);
            }
            {
                let mut left = InternalMut::<K>::new(parent_guard.as_mut_slice());
                for (i, (k, c)) in entries[..split_at].iter().enumerate() {
                    left.set_key_at(i, k);
                    left.set_child_at(i, *c);
                }
                left.set_size(split_at);
            }

            // Children that migrated to the right node need their parent
            // pointers updated. The two halves of the split below us are
            // already write-latched here; latch the rest one at a time.
            for (_, child_id) in &entries[split_at..] {
                if *child_id == old_guard.page_id() {
                    NodeMut::new(old_guard.as_mut_slice()).set_parent(right_id);
                } else if *child_id == new_guard.page_id() {
                    NodeMut::new(new_guard.as_mut_slice()).set_parent(right_id);
                } else {
                    let mut child_guard = self.bpm.fetch_page_write(*child_id)?;
                    NodeMut::new(child_guard.as_mut_slice()).set_parent(right_id);
                }
            }
            if entries[..split_at]
                .iter()
                .any(|(_, c)| *c == new_guard.page_id())
            {
                NodeMut::new(new_guard.as_mut_slice()).set_parent(parent_id);
            }

            // One level up: the parent is now the split node.
            drop(old_guard);
            drop(new_guard);
            old_guard = parent_guard;
            middle_key = lifted_key;
            new_guard = right_guard;
        }
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Remove `key` if present. Leaves are never merged or rebalanced;
    /// after this returns, `get_value(key)` reports not-found.
    pub fn remove(&self, key: &K) -> Result<()> {
        let header_guard = self.bpm.fetch_page_read(self.header_page_id)?;
        let root_id = HeaderRef::new(header_guard.as_slice()).root_page_id();
        if !root_id.is_valid() {
            return Ok(());
        }

        // Deletion never propagates, so every child is safe: hold only
        // the current node's latch (write, since the leaf is modified in
        // place and we cannot know it is a leaf before latching it).
        let mut guard = self.bpm.fetch_page_write(root_id)?;
        drop(header_guard);

        loop {
            if NodeRef::new(guard.as_slice()).is_leaf() {
                let pos = {
                    let leaf = LeafRef::<K>::new(guard.as_slice());
                    let pos = leaf.lower_bound(key, &self.comparator);
                    if pos >= leaf.size()
                        || (self.comparator)(&leaf.key_at(pos), key) != Ordering::Equal
                    {
                        return Ok(());
                    }
                    pos
                };
                LeafMut::<K>::new(guard.as_mut_slice()).remove_at(pos);
                return Ok(());
            }

            let child_id = {
                let internal = InternalRef::<K>::new(guard.as_slice());
                internal.child_at(internal.find_child_index(key, &self.comparator))
            };
            let child_guard = self.bpm.fetch_page_write(child_id)?;
            guard = child_guard;
        }
    }

    // ========================================================================
    // Iteration
    // ========================================================================

    /// Iterator over all entries in key order.
    pub fn begin(&self) -> Result<TreeIterator<'_, K>> {
        let header_guard = self.bpm.fetch_page_read(self.header_page_id)?;
        let root_id = HeaderRef::new(header_guard.as_slice()).root_page_id();
        if !root_id.is_valid() {
            return Ok(TreeIterator::exhausted(&self.bpm));
        }

        let mut guard = self.bpm.fetch_page_read(root_id)?;
        drop(header_guard);

        loop {
            if NodeRef::new(guard.as_slice()).is_leaf() {
                return self.iter_from(guard, 0);
            }
            let child_id = InternalRef::<K>::new(guard.as_slice()).child_at(0);
            let child_guard = self.bpm.fetch_page_read(child_id)?;
            guard = child_guard;
        }
    }

    /// Iterator starting at the first entry whose key is `>= key`.
    pub fn begin_at(&self, key: &K) -> Result<TreeIterator<'_, K>> {
        let header_guard = self.bpm.fetch_page_read(self.header_page_id)?;
        let root_id = HeaderRef::new(header_guard.as_slice()).root_page_id();
        if !root_id.is_valid() {
            return Ok(TreeIterator::exhausted(&self.bpm));
        }

        let mut guard = self.bpm.fetch_page_read(root_id)?;
        drop(header_guard);

        loop {
            if NodeRef::new(guard.as_slice()).is_leaf() {
                let pos = LeafRef::<K>::new(guard.as_slice()).lower_bound(key, &self.comparator);
                return self.iter_from(guard, pos);
            }
            let child_id = {
                let internal = InternalRef::<K>::new(guard.as_slice());
                internal.child_at(internal.find_child_index(key, &self.comparator))
            };
            let child_guard = self.bpm.fetch_page_read(child_id)?;
            guard = child_guard;
        }
    }

    /// The past-the-end iterator.
    pub fn end(&self) -> TreeIterator<'_, K> {
        TreeIterator::exhausted(&self.bpm)
    }

    /// Normalize a starting position to the first occupied slot at or
    /// after it, hopping over empty leaves, so that a position past the
    /// last entry compares equal to [`end`](Self::end).
    fn iter_from<'a>(
        &'a self,
        mut guard: PageReadGuard<'a>,
        mut pos: usize,
    ) -> Result<TreeIterator<'a, K>> {
        loop {
            let leaf = LeafRef::<K>::new(guard.as_slice());
            if pos < leaf.size() {
                return Ok(TreeIterator::at(&self.bpm, guard.page_id(), pos));
            }
            let next = leaf.next_page_id();
            if !next.is_valid() {
                return Ok(TreeIterator::exhausted(&self.bpm));
            }
            let next_guard = self.bpm.fetch_page_read(next)?;
            guard = next_guard;
            pos = 0;
        }
    }
}
