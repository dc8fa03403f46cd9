//! Composition helpers built on [`attach`](crate::attach).
//!
//! Everything here is a [`Modifier`], a [`Node`] or a plain list of
//! renderables; none of these helpers hold state of their own.

use crate::attach::{apply, apply_all, attach};
use crate::component::Component;
use crate::dom::{Document, Element};
use crate::property::Property;
use crate::renderable::{Modifier, Node, Renderable};
use std::sync::Arc;

/// Merge one renderable and any number of others into one list.
pub fn join<E: Element>(
    first: impl Into<Renderable<E>>,
    rest: impl IntoIterator<Item = Renderable<E>>,
) -> Vec<Renderable<E>> {
    let rest = rest.into_iter();
    let mut joined = Vec::with_capacity(rest.size_hint().0 + 1);
    joined.push(first.into());
    joined.extend(rest);
    joined
}

/// A node allocating a new `tag` element on every invocation, with
/// `renderables` applied to it.
pub fn element<D>(
    document: &D,
    tag: &str,
    renderables: impl IntoIterator<Item = Renderable<D::Element>>,
) -> Node<D::Element>
where
    D: Document + Clone + 'static,
{
    let document = document.clone();
    let tag = tag.to_owned();
    let renderables: Arc<[Renderable<D::Element>]> = renderables.into_iter().collect();

    Node::new(move || {
        let element = document.create_element(&tag);
        apply_all(&element, &renderables);
        element
    })
}

/// Like [`element`], in a specific namespace (SVG and friends).
pub fn element_ns<D>(
    document: &D,
    namespace: &str,
    tag: &str,
    renderables: impl IntoIterator<Item = Renderable<D::Element>>,
) -> Node<D::Element>
where
    D: Document + Clone + 'static,
{
    let document = document.clone();
    let namespace = namespace.to_owned();
    let tag = tag.to_owned();
    let renderables: Arc<[Renderable<D::Element>]> = renderables.into_iter().collect();

    Node::new(move || {
        let element = document.create_element_ns(&namespace, &tag);
        apply_all(&element, &renderables);
        element
    })
}

/// Set attribute `name` to `value`.
pub fn attr<E: Element>(name: &str, value: &str) -> Modifier<E> {
    let name = name.to_owned();
    let value = value.to_owned();
    Modifier::new(move |element: &E| element.set_attribute(&name, &value))
}

/// Set the text content.
pub fn text<E: Element>(content: &str) -> Modifier<E> {
    let content = content.to_owned();
    Modifier::new(move |element: &E| element.set_text(&content))
}

/// Choose a branch once, at construction.
///
/// The other branch is dropped right away and never applied, whatever
/// happens to the condition later. Use [`if_property`] for a branch that
/// follows a changing value.
pub fn if_flag<E: Element>(
    flag: bool,
    positive: impl Into<Renderable<E>>,
    negative: impl Into<Renderable<E>>,
) -> Modifier<E> {
    let chosen = if flag { positive.into() } else { negative.into() };
    Modifier::new(move |element: &E| apply(element, &chosen))
}

/// Apply the branch matching `property` now, and the matching branch again
/// in place on every change, without re-rendering.
///
/// The subscription ends when the modified element is released.
pub fn if_property<E: Element>(
    property: &Property<bool>,
    positive: Option<Modifier<E>>,
    negative: Option<Modifier<E>>,
) -> Modifier<E> {
    let property = property.clone();

    Modifier::new(move |element: &E| {
        let current = if property.get() { &positive } else { &negative };
        if let Some(modifier) = current {
            modifier.modify(element);
        }

        let target = element.clone();
        let positive = positive.clone();
        let negative = negative.clone();
        let handle = property.observe(move |_: &bool, new: &bool| {
            let branch = if *new { &positive } else { &negative };
            if let Some(modifier) = branch {
                modifier.modify(&target);
            }
        });
        element.add_release_listener(Box::new(move || handle.release()));
    })
}

/// Apply `modifiers` right after every future render of `renderable`.
///
/// A component has its post-modifier list replaced (see [`with_component`]);
/// the component is shared, so this affects every place it is attached.
pub fn with<E: Element>(
    renderable: impl Into<Renderable<E>>,
    modifiers: impl IntoIterator<Item = Modifier<E>>,
) -> Renderable<E> {
    let modifiers: Vec<Modifier<E>> = modifiers.into_iter().collect();

    match renderable.into() {
        Renderable::Component(component) => {
            Renderable::Component(with_component(component, modifiers))
        }
        Renderable::Node(node) => Renderable::Node(Node::new(move || {
            let element = node.element();
            for modifier in &modifiers {
                modifier.modify(&element);
            }
            element
        })),
        Renderable::Modifier(primary) => Renderable::Modifier(Modifier::new(move |element: &E| {
            primary.modify(element);
            for modifier in &modifiers {
                modifier.modify(element);
            }
        })),
        Renderable::Absent => Renderable::Absent,
    }
}

/// Replace the post-modifiers of `component` and return it.
///
/// Calling this twice replaces the first list rather than extending it.
pub fn with_component<E: Element>(
    component: Component<E>,
    modifiers: impl IntoIterator<Item = Modifier<E>>,
) -> Component<E> {
    component.set_post_modifiers(modifiers.into_iter().collect());
    component
}

/// Raw access to the element. Think twice before keeping the element
/// around; tie anything long-lived to [`Element::add_release_listener`].
pub fn inside_dom<E: Element>(f: impl Fn(&E) + Send + Sync + 'static) -> Modifier<E> {
    Modifier::new(f)
}

/// Apply `build(i)` for every `i` in `0..count`, in order.
pub fn for_each<E, R>(count: usize, build: impl Fn(usize) -> R + Send + Sync + 'static) -> Modifier<E>
where
    E: Element,
    R: Into<Renderable<E>>,
{
    Modifier::new(move |element: &E| {
        for index in 0..count {
            apply(element, &build(index).into());
        }
    })
}

/// Apply several renderables as one, without a container element.
pub fn fragment<E: Element>(renderables: impl IntoIterator<Item = Renderable<E>>) -> Renderable<E> {
    let renderables: Arc<[Renderable<E>]> = renderables.into_iter().collect();
    Renderable::Modifier(Modifier::new(move |element: &E| {
        apply_all(element, &renderables)
    }))
}

/// Combine several modifiers into one.
pub fn modifiers<E: Element>(modifiers: impl IntoIterator<Item = Modifier<E>>) -> Modifier<E> {
    let modifiers: Vec<Modifier<E>> = modifiers.into_iter().collect();
    Modifier::new(move |element: &E| {
        for modifier in &modifiers {
            modifier.modify(element);
        }
    })
}

/// Clear the page body and attach `renderable` to it.
pub fn render_body<D: Document>(document: &D, renderable: impl Into<Renderable<D::Element>>) -> D::Element {
    let body = document.body();
    body.clear();
    attach(body, [renderable.into()]).element()
}
