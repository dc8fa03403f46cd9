//! Document capabilities the engine relies on, and an in-memory implementation.

// Document collaborator - the capabilities the engine needs from a DOM
//
// The engine never creates elements on its own. Everything it does to the
// tree goes through the Element trait below, and element allocation goes
// through Document, which is passed explicitly to the helpers that need it.
//
// Two implementations are expected:
// - a binding to a real document (wasm, webview), living outside this crate
// - MemoryDocument (in `memory`), an in-process tree used by tests

pub mod memory;

pub use memory::{MemoryDocument, MemoryElement};

/// Callback fired once when an element is released.
///
/// Listeners wait inside the element tree until the release, so they have to
/// be `Sync` for the tree to be shared between threads.
pub type ReleaseListener = Box<dyn FnOnce() + Send + Sync>;

/// A live element handle.
///
/// Handles are cheap to clone; clones refer to the same element.
pub trait Element: Clone + Send + Sync + 'static {
    /// Append `child` as the last child. A child that already has a parent is moved.
    fn append_child(&self, child: &Self);

    /// Put `new` at this element's position in its parent and return it.
    ///
    /// The parent observes a single in-place replacement, never a removal
    /// followed by an insertion. A detached element is left as is.
    fn replace_with(&self, new: Self) -> Self;

    /// Run `listener` once when this element is released.
    ///
    /// Listeners added to an already released element run immediately.
    fn add_release_listener(&self, listener: ReleaseListener);

    /// Release this element and its descendants, running all release
    /// listeners. Releasing twice is a no-op.
    fn release(&self);

    /// Detach and release all children.
    fn clear(&self);

    /// Set an attribute, replacing a previous value.
    fn set_attribute(&self, name: &str, value: &str);

    /// Remove an attribute if present.
    fn remove_attribute(&self, name: &str);

    /// Replace the text content.
    fn set_text(&self, text: &str);
}

/// Element factory and page access.
pub trait Document: Send + Sync {
    /// Element type produced by this document
    type Element: Element;

    /// Create a detached element in the default (HTML) namespace
    fn create_element(&self, tag: &str) -> Self::Element;

    /// Create a detached element in `namespace`, e.g. for SVG
    fn create_element_ns(&self, namespace: &str, tag: &str) -> Self::Element;

    /// The page body
    fn body(&self) -> Self::Element;
}
