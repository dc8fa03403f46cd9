#![deny(missing_docs)]

//! Explicitly invalidated DOM components, without diffing.
//!
//! A program describes its page as a tree of renderables and attaches it to a
//! live element. Parts of the tree that change are components: calling
//! [`invalidate()`](Component::invalidate) renders the component again and
//! swaps the fresh element in place of the old one, at every place the
//! component is attached. Everything else is rendered once.
//!
//! # Quick Start
//!
//! ```ignore
//! use renderable::{Component, MemoryDocument, attach, element, text};
//!
//! let doc = MemoryDocument::new();
//! let label = Arc::new(Mutex::new(String::from("hello")));
//!
//! let greeting = Component::from_fn({
//!     let (doc, label) = (doc.clone(), label.clone());
//!     move || element(&doc, "h1", [text(&label.lock()).into()])
//! });
//!
//! attach(doc.body(), [greeting.clone().into()]).element();
//!
//! *label.lock() = String::from("bye");
//! greeting.invalidate();  // the h1 is rendered again and replaced
//! ```
//!
//! # Renderables
//!
//! - [`Node`] - allocates a new element each time it is invoked.
//! - [`Modifier`] - changes an existing element in place.
//! - [`Component`] - renders a node and re-renders it on invalidation.
//! - [`Renderable::Absent`] - nothing, for optional parts of a tree.
//!
//! [`Renderable`] is the closed union of the four. Untyped values can be
//! classified with [`Renderable::from_value`], which rejects anything else
//! with a [`CompositionError`].
//!
//! # Lifecycle
//!
//! Attaching a component registers one observer on it per mount site, and a
//! release listener on the attached element that removes the observer again.
//! Releasing an element (removing it from the page, or a re-render of an
//! enclosing component) therefore ends every subscription below it.
//!
//! ```ignore
//! let page = element(&doc, "main", [counter.clone().into()]).element();
//! doc.body().append_child(&page);
//! assert_eq!(counter.observers().live_count(), 1);
//!
//! page.remove();
//! assert_eq!(counter.observers().live_count(), 0);
//! counter.invalidate();  // nothing left to re-render
//! ```
//!
//! # Documents
//!
//! The engine only talks to elements through the [`Element`] trait, and
//! element allocation goes through a [`Document`] passed to the helpers that
//! need it. [`MemoryDocument`] is a thread-safe in-process implementation.
//!
//! # Re-render depth
//!
//! Re-rendering is synchronous. Components that invalidate each other while
//! rendering nest re-renders on the stack; past [`max_render_depth()`] a
//! re-render is skipped (and logged) instead, leaving that mount unchanged
//! until its next invalidation. See [`with_max_render_depth`].

mod attach;
mod component;
pub mod dom;
mod error;
mod hash;
mod helpers;
mod observer;
mod property;
mod renderable;

// Core types
pub use component::{Component, View, WeakComponent};
pub use error::CompositionError;
pub use observer::{Callback, Handle, Observers};
pub use property::Property;
pub use renderable::{Kind, Modifier, Node, Renderable};

// Engine
pub use attach::{DEFAULT_MAX_RENDER_DEPTH, attach, max_render_depth, with_max_render_depth};

// Collaborator
pub use dom::{Document, Element, MemoryDocument, MemoryElement, ReleaseListener};

// Composition
pub use helpers::{
    attr, element, element_ns, fragment, for_each, if_flag, if_property, inside_dom, join,
    modifiers, render_body, text, with, with_component,
};
