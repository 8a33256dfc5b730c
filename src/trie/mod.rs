//! Persistent (copy-on-write) trie.
//!
//! An immutable key-value store keyed by byte strings. Mutating
//! operations return a *new* trie that shares every untouched subtree
//! with the old one; existing handles keep observing exactly the tree
//! they were given. [`store::TrieStore`] adds a concurrent front-end.

pub mod store;

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// A shareable value slot. `dyn Any` lets one trie hold values of mixed
/// types; lookups downcast and treat a type mismatch as a miss.
type ValueSlot = Arc<dyn Any + Send + Sync>;

/// One immutable trie node: a child per key byte, plus an optional
/// value. A node with `value: Some(..)` is a value-bearing node; with
/// `None` it is a plain interior node.
///
/// Nodes are only ever mutated while being built, before they are
/// wrapped in an `Arc` and published.
struct TrieNode {
    children: HashMap<u8, Arc<TrieNode>>,
    value: Option<ValueSlot>,
}

impl TrieNode {
    fn empty() -> Self {
        Self {
            children: HashMap::new(),
            value: None,
        }
    }

    /// Shallow copy: clones the child map (bumping refcounts) and the
    /// value handle, not the subtrees.
    fn shallow_clone(&self) -> Self {
        Self {
            children: self.children.clone(),
            value: self.value.clone(),
        }
    }
}

/// Handle to an immutable trie. Cloning is cheap (one refcount bump) and
/// yields an independent snapshot.
#[derive(Clone, Default)]
pub struct Trie {
    root: Option<Arc<TrieNode>>,
}

impl Trie {
    /// The empty trie.
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Look up `key`, returning the stored value if it exists *and* has
    /// type `T`. A type mismatch is indistinguishable from a missing
    /// key.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        let node = self.lookup_node(key)?;
        node.value.as_ref()?.downcast_ref::<T>()
    }

    /// Produce a new trie with `key` bound to `value`.
    ///
    /// Only the nodes along the key's path are copied; everything else
    /// is shared with `self`.
    pub fn put<T: Any + Send + Sync>(&self, key: &str, value: T) -> Trie {
        let value: ValueSlot = Arc::new(value);
        let new_root = put_rec(self.root.as_ref(), key.as_bytes(), value);
        Trie {
            root: Some(Arc::new(new_root)),
        }
    }

    /// Produce a new trie with `key` unbound.
    ///
    /// The terminal node loses its value; nodes left with no value and
    /// no children are pruned bottom-up. Removing an absent key returns
    /// an equivalent trie (sharing the same root).
    pub fn remove(&self, key: &str) -> Trie {
        let Some(root) = self.root.as_ref() else {
            return self.clone();
        };
        Trie {
            root: remove_rec(root, key.as_bytes()),
        }
    }

    /// Walk to the node for `key`, if the path exists.
    fn lookup_node(&self, key: &str) -> Option<&Arc<TrieNode>> {
        let mut current = self.root.as_ref()?;
        for byte in key.as_bytes() {
            current = current.children.get(byte)?;
        }
        Some(current)
    }

    /// The stored value handle for `key`, already narrowed to `T`.
    /// Used by the store's guard, which needs ownership rather than a
    /// borrow.
    pub(crate) fn get_arc<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let slot = self.lookup_node(key)?.value.clone()?;
        slot.downcast::<T>().ok()
    }
}

/// Copy-on-write insertion: rebuild the path, share the rest.
fn put_rec(node: Option<&Arc<TrieNode>>, key: &[u8], value: ValueSlot) -> TrieNode {
    let mut copy = match node {
        Some(n) => n.shallow_clone(),
        None => TrieNode::empty(),
    };

    match key.split_first() {
        None => {
            copy.value = Some(value);
        }
        Some((&byte, rest)) => {
            let child = copy.children.get(&byte).cloned();
            let new_child = put_rec(child.as_ref(), rest, value);
            copy.children.insert(byte, Arc::new(new_child));
        }
    }

    copy
}

/// Copy-on-write removal. Returns the replacement node, or `None` when
/// the node ends up with no value and no children and should disappear
/// from its parent. An untouched subtree is returned as-is (shared).
fn remove_rec(node: &Arc<TrieNode>, key: &[u8]) -> Option<Arc<TrieNode>> {
    match key.split_first() {
        None => {
            if node.value.is_none() {
                // Nothing bound here; the trie is unchanged.
                return Some(Arc::clone(node));
            }
            if node.children.is_empty() {
                return None;
            }
            Some(Arc::new(TrieNode {
                children: node.children.clone(),
                value: None,
            }))
        }
        Some((&byte, rest)) => {
            let Some(child) = node.children.get(&byte) else {
                // Key not present; share the whole subtree.
                return Some(Arc::clone(node));
            };

            let new_child = remove_rec(child, rest);

            if let Some(ref c) = new_child {
                if Arc::ptr_eq(c, child) {
                    // Nothing below changed.
                    return Some(Arc::clone(node));
                }
            }

            let mut copy = node.shallow_clone();
            match new_child {
                Some(c) => {
                    copy.children.insert(byte, c);
                }
                None => {
                    copy.children.remove(&byte);
                    if copy.children.is_empty() && copy.value.is_none() {
                        return None;
                    }
                }
            }
            Some(Arc::new(copy))
        }
    }
}
