//! A thread-safe element tree living in process memory.

// In-memory document - a thread-safe element tree for tests and headless use
//
// All elements of a document live in one slab arena guarded by a parking_lot
// RwLock. A MemoryElement is a (tree, slot key, generation) triple: slots are
// reused by the slab, so the generation tells a live element apart from a
// stale handle whose slot was recycled. Every operation on a stale handle is
// a no-op that returns the empty default.
//
// RELEASE MODEL:
// - release() marks the element and its whole subtree released and runs
//   their listeners (children first) after the arena lock is dropped
// - a released element stays in the tree until it is replaced or removed,
//   so a component can still swap it for its fresh render
// - once a released element is detached, it and its subtree are purged

use crate::dom::{Document, Element, ReleaseListener};
use crate::hash::{AttributeMap, attribute_map};
use parking_lot::RwLock;
use slab::Slab;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Storage for one element in the arena.
struct ElementData {
    generation: u64,
    tag: String,
    namespace: Option<String>,
    attributes: AttributeMap,
    text: Option<String>,
    parent: Option<usize>,
    children: Vec<usize>,
    listeners: Vec<ReleaseListener>,
    released: bool,
}

struct Tree {
    arena: RwLock<Slab<ElementData>>,
    next_generation: AtomicU64,
}

impl Tree {
    fn insert(self: &Arc<Self>, tag: &str, namespace: Option<&str>) -> MemoryElement {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let key = self.arena.write().insert(ElementData {
            generation,
            tag: tag.to_owned(),
            namespace: namespace.map(str::to_owned),
            attributes: attribute_map(),
            text: None,
            parent: None,
            children: Vec::new(),
            listeners: Vec::new(),
            released: false,
        });

        MemoryElement {
            tree: self.clone(),
            key,
            generation,
        }
    }
}

/// Document whose elements live in process memory.
///
/// Cloning shares the same tree.
#[derive(Clone)]
pub struct MemoryDocument {
    tree: Arc<Tree>,
    body: MemoryElement,
}

impl MemoryDocument {
    /// Create a document containing an empty `body`
    pub fn new() -> Self {
        let tree = Arc::new(Tree {
            arena: RwLock::new(Slab::new()),
            next_generation: AtomicU64::new(0),
        });
        let body = tree.insert("body", None);
        Self { tree, body }
    }

    /// Number of elements currently held by the arena (body included)
    pub fn element_count(&self) -> usize {
        self.tree.arena.read().len()
    }
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDocument")
            .field("elements", &self.element_count())
            .finish()
    }
}

impl Document for MemoryDocument {
    type Element = MemoryElement;

    fn create_element(&self, tag: &str) -> MemoryElement {
        self.tree.insert(tag, None)
    }

    fn create_element_ns(&self, namespace: &str, tag: &str) -> MemoryElement {
        self.tree.insert(tag, Some(namespace))
    }

    fn body(&self) -> MemoryElement {
        self.body.clone()
    }
}

/// Handle to an element of a [`MemoryDocument`].
#[derive(Clone)]
pub struct MemoryElement {
    tree: Arc<Tree>,
    key: usize,
    generation: u64,
}

impl MemoryElement {
    fn get<'a>(&self, arena: &'a Slab<ElementData>) -> Option<&'a ElementData> {
        let data = arena
            .get(self.key)
            .filter(|data| data.generation == self.generation);
        if data.is_none() {
            cov_mark::hit!(stale_element_access);
            tracing::trace!(key = self.key, "access to purged element");
        }
        data
    }

    fn get_mut<'a>(&self, arena: &'a mut Slab<ElementData>) -> Option<&'a mut ElementData> {
        arena
            .get_mut(self.key)
            .filter(|data| data.generation == self.generation)
    }

    fn with<R>(&self, f: impl FnOnce(&ElementData) -> R) -> Option<R> {
        let arena = self.tree.arena.read();
        self.get(&arena).map(f)
    }

    fn with_mut<R>(&self, f: impl FnOnce(&mut ElementData) -> R) -> Option<R> {
        let mut arena = self.tree.arena.write();
        self.get_mut(&mut arena).map(f)
    }

    fn handle(&self, arena: &Slab<ElementData>, key: usize) -> Option<MemoryElement> {
        arena.get(key).map(|data| MemoryElement {
            tree: self.tree.clone(),
            key,
            generation: data.generation,
        })
    }

    fn same_tree(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.tree, &other.tree)
    }

    /// Tag name, `None` for a purged element
    pub fn tag(&self) -> Option<String> {
        self.with(|data| data.tag.clone())
    }

    /// Namespace given at creation
    pub fn namespace(&self) -> Option<String> {
        self.with(|data| data.namespace.clone()).flatten()
    }

    /// Value of attribute `name`
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.with(|data| data.attributes.get(name).cloned())
            .flatten()
    }

    /// All attributes in insertion order
    pub fn attributes(&self) -> Vec<(String, String)> {
        self.with(|data| {
            data.attributes
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect()
        })
        .unwrap_or_default()
    }

    /// Text content
    pub fn text(&self) -> Option<String> {
        self.with(|data| data.text.clone()).flatten()
    }

    /// Children in document order
    pub fn children(&self) -> Vec<MemoryElement> {
        let arena = self.tree.arena.read();
        let Some(data) = self.get(&arena) else {
            return Vec::new();
        };
        data.children
            .iter()
            .filter_map(|&child| self.handle(&arena, child))
            .collect()
    }

    /// Number of children
    pub fn child_count(&self) -> usize {
        self.with(|data| data.children.len()).unwrap_or(0)
    }

    /// Parent element, `None` when detached
    pub fn parent(&self) -> Option<MemoryElement> {
        let arena = self.tree.arena.read();
        let parent = self.get(&arena)?.parent?;
        self.handle(&arena, parent)
    }

    /// Whether the element was released (purged elements count as released)
    pub fn is_released(&self) -> bool {
        self.with(|data| data.released).unwrap_or(true)
    }

    /// Whether the element is still held by the arena
    pub fn is_alive(&self) -> bool {
        let arena = self.tree.arena.read();
        arena
            .get(self.key)
            .is_some_and(|data| data.generation == self.generation)
    }

    /// Detach from the parent and release.
    pub fn remove(&self) {
        {
            let mut arena = self.tree.arena.write();
            if self.get_mut(&mut arena).is_none() {
                return;
            }
            detach(&mut arena, self.key);
        }
        self.release();
    }
}

/// Whether `ancestor` is `key` or one of its ancestors.
fn is_ancestor_or_self(arena: &Slab<ElementData>, ancestor: usize, key: usize) -> bool {
    let mut current = Some(key);
    while let Some(node) = current {
        if node == ancestor {
            return true;
        }
        current = arena.get(node).and_then(|data| data.parent);
    }
    false
}

/// Unlink `key` from its parent's child list.
fn detach(arena: &mut Slab<ElementData>, key: usize) {
    let parent = arena.get_mut(key).and_then(|data| data.parent.take());
    if let Some(parent) = parent.and_then(|parent| arena.get_mut(parent)) {
        parent.children.retain(|&child| child != key);
    }
}

/// Mark the subtree below `key` released and collect its pending listeners,
/// children before parents.
fn take_listeners(arena: &mut Slab<ElementData>, key: usize, listeners: &mut Vec<ReleaseListener>) {
    let children = match arena.get(key) {
        Some(data) => data.children.clone(),
        None => return,
    };
    for child in children {
        take_listeners(arena, child, listeners);
    }
    if let Some(data) = arena.get_mut(key) {
        data.released = true;
        listeners.append(&mut data.listeners);
    }
}

/// Drop `key` and its subtree from the arena.
fn purge(arena: &mut Slab<ElementData>, key: usize) {
    let mut stack = vec![key];
    while let Some(key) = stack.pop() {
        if let Some(data) = arena.try_remove(key) {
            stack.extend(data.children);
        }
    }
}

impl Element for MemoryElement {
    fn append_child(&self, child: &Self) {
        if !self.same_tree(child) {
            tracing::trace!("append_child across documents ignored");
            return;
        }

        let mut arena = self.tree.arena.write();
        if self.get_mut(&mut arena).is_none() || child.get_mut(&mut arena).is_none() {
            return;
        }
        if is_ancestor_or_self(&arena, child.key, self.key) {
            return;
        }

        detach(&mut arena, child.key);
        if let Some(data) = self.get_mut(&mut arena) {
            data.children.push(child.key);
        }
        if let Some(data) = child.get_mut(&mut arena) {
            data.parent = Some(self.key);
        }
    }

    fn replace_with(&self, new: Self) -> Self {
        if !self.same_tree(&new) || *self == new {
            return new;
        }

        let mut arena = self.tree.arena.write();
        if new.get_mut(&mut arena).is_none() {
            return new;
        }
        let Some(parent) = self.get_mut(&mut arena).and_then(|data| data.parent) else {
            return new;
        };
        if is_ancestor_or_self(&arena, new.key, parent) {
            return new;
        }

        // Unlink first: `new` may be a sibling, which shifts the position
        detach(&mut arena, new.key);
        if let Some(children) = arena.get_mut(parent).map(|data| &mut data.children) {
            if let Some(slot) = children.iter_mut().find(|child| **child == self.key) {
                *slot = new.key;
            }
        }
        if let Some(data) = new.get_mut(&mut arena) {
            data.parent = Some(parent);
        }

        let released = match self.get_mut(&mut arena) {
            Some(data) => {
                data.parent = None;
                data.released
            }
            None => false,
        };
        if released {
            purge(&mut arena, self.key);
        }

        new
    }

    fn add_release_listener(&self, listener: ReleaseListener) {
        let listener = {
            let mut arena = self.tree.arena.write();
            match self.get_mut(&mut arena) {
                Some(data) if !data.released => {
                    data.listeners.push(listener);
                    return;
                }
                _ => listener,
            }
        };

        cov_mark::hit!(listener_added_after_release);
        listener();
    }

    fn release(&self) {
        let listeners = {
            let mut arena = self.tree.arena.write();
            if self.get_mut(&mut arena).is_none() {
                return;
            }
            let mut listeners = Vec::new();
            take_listeners(&mut arena, self.key, &mut listeners);
            listeners
        };

        // Listeners may touch the tree again
        for listener in listeners {
            listener();
        }

        let mut arena = self.tree.arena.write();
        let detached = self
            .get_mut(&mut arena)
            .is_some_and(|data| data.released && data.parent.is_none());
        if detached {
            purge(&mut arena, self.key);
        }
    }

    fn clear(&self) {
        let children: Vec<MemoryElement> = {
            let mut arena = self.tree.arena.write();
            let Some(data) = self.get_mut(&mut arena) else {
                return;
            };
            let keys = std::mem::take(&mut data.children);
            keys.into_iter()
                .filter_map(|key| {
                    let child = arena.get_mut(key)?;
                    child.parent = None;
                    Some(MemoryElement {
                        tree: self.tree.clone(),
                        key,
                        generation: child.generation,
                    })
                })
                .collect()
        };

        for child in children {
            child.release();
        }
    }

    fn set_attribute(&self, name: &str, value: &str) {
        self.with_mut(|data| {
            data.attributes.insert(name.to_owned(), value.to_owned());
        });
    }

    fn remove_attribute(&self, name: &str) {
        self.with_mut(|data| {
            data.attributes.shift_remove(name);
        });
    }

    fn set_text(&self, text: &str) {
        self.with_mut(|data| data.text = Some(text.to_owned()));
    }
}

impl PartialEq for MemoryElement {
    fn eq(&self, other: &Self) -> bool {
        self.same_tree(other) && self.key == other.key && self.generation == other.generation
    }
}

impl Eq for MemoryElement {}

impl fmt::Debug for MemoryElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = self.with(|data| data.tag.clone());
        f.debug_struct("MemoryElement")
            .field("tag", &tag)
            .field("key", &self.key)
            .field("generation", &self.generation)
            .finish()
    }
}
