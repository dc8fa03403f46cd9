use crate::component::Component;
use crate::dom::Element;
use crate::error::CompositionError;
use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

/// Allocates a new element each time it is invoked.
///
/// Nodes are stateless: every call to [`element`](Node::element) yields an
/// independent element.
pub struct Node<E> {
    build: Arc<dyn Fn() -> E + Send + Sync>,
}

impl<E: Element> Node<E> {
    /// Wrap an element factory
    pub fn new(build: impl Fn() -> E + Send + Sync + 'static) -> Self {
        Self {
            build: Arc::new(build),
        }
    }

    /// Produce the element
    pub fn element(&self) -> E {
        (self.build)()
    }
}

impl<E> Clone for Node<E> {
    fn clone(&self) -> Self {
        Self {
            build: self.build.clone(),
        }
    }
}

/// Changes an existing element in place: attributes, content, listeners or
/// children appended through other renderables.
pub struct Modifier<E> {
    apply: Arc<dyn Fn(&E) + Send + Sync>,
}

impl<E: Element> Modifier<E> {
    /// Wrap an element mutation
    pub fn new(apply: impl Fn(&E) + Send + Sync + 'static) -> Self {
        Self {
            apply: Arc::new(apply),
        }
    }

    /// Apply the changes to `element`
    pub fn modify(&self, element: &E) {
        (self.apply)(element);
    }
}

impl<E> Clone for Modifier<E> {
    fn clone(&self) -> Self {
        Self {
            apply: self.apply.clone(),
        }
    }
}

/// Discriminant of a [`Renderable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Yields a new element per invocation
    Node,
    /// Mutates an element in place
    Modifier,
    /// Renders a node and re-renders it on invalidation
    Component,
    /// Nothing to apply
    Absent,
}

/// Unit of composition: exactly one of the three renderable kinds, or nothing.
///
/// `Absent` makes optional parts of a tree easy to express; applying it is a
/// no-op. Every shape the engine accepts is a variant of this enum, so typed
/// composition is checked by the compiler. Untyped values go through
/// [`Renderable::from_value`], which rejects anything else.
pub enum Renderable<E: Element> {
    /// See [`Node`]
    Node(Node<E>),
    /// See [`Modifier`]
    Modifier(Modifier<E>),
    /// See [`Component`]
    Component(Component<E>),
    /// Skipped when applied
    Absent,
}

impl<E: Element> Renderable<E> {
    /// Which kind this renderable is
    pub fn kind(&self) -> Kind {
        match self {
            Renderable::Node(_) => Kind::Node,
            Renderable::Modifier(_) => Kind::Modifier,
            Renderable::Component(_) => Kind::Component,
            Renderable::Absent => Kind::Absent,
        }
    }

    /// Whether this is the no-op renderable
    pub fn is_absent(&self) -> bool {
        matches!(self, Renderable::Absent)
    }

    /// Classify an arbitrary value.
    ///
    /// Accepts a [`Renderable`], [`Node`], [`Modifier`] or [`Component`] for
    /// the same element type, an `Option` of any of those (`None` is absent)
    /// and `()` (absent). Any other type is a composition error naming the
    /// type.
    pub fn from_value<T: Any>(value: T) -> Result<Self, CompositionError> {
        let mut slot = Some(value);

        if let Some(renderable) = take::<T, Renderable<E>>(&mut slot) {
            return Ok(renderable);
        }
        if let Some(node) = take::<T, Node<E>>(&mut slot) {
            return Ok(Renderable::Node(node));
        }
        if let Some(modifier) = take::<T, Modifier<E>>(&mut slot) {
            return Ok(Renderable::Modifier(modifier));
        }
        if let Some(component) = take::<T, Component<E>>(&mut slot) {
            return Ok(Renderable::Component(component));
        }
        if let Some(optional) = take::<T, Option<Renderable<E>>>(&mut slot) {
            return Ok(optional.unwrap_or(Renderable::Absent));
        }
        if let Some(optional) = take::<T, Option<Node<E>>>(&mut slot) {
            return Ok(optional.into());
        }
        if let Some(optional) = take::<T, Option<Modifier<E>>>(&mut slot) {
            return Ok(optional.into());
        }
        if let Some(optional) = take::<T, Option<Component<E>>>(&mut slot) {
            return Ok(optional.into());
        }
        if take::<T, ()>(&mut slot).is_some() {
            return Ok(Renderable::Absent);
        }

        Err(CompositionError::Unrecognized {
            type_name: type_name::<T>(),
        })
    }
}

/// Move the value out of `slot` if it has type `U`.
fn take<T: Any, U: Any>(slot: &mut Option<T>) -> Option<U> {
    let slot: &mut dyn Any = slot;
    slot.downcast_mut::<Option<U>>().and_then(Option::take)
}

impl<E: Element> Clone for Renderable<E> {
    fn clone(&self) -> Self {
        match self {
            Renderable::Node(node) => Renderable::Node(node.clone()),
            Renderable::Modifier(modifier) => Renderable::Modifier(modifier.clone()),
            Renderable::Component(component) => Renderable::Component(component.clone()),
            Renderable::Absent => Renderable::Absent,
        }
    }
}

impl<E: Element> fmt::Debug for Renderable<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Renderable::{:?}", self.kind())
    }
}

impl<E: Element> From<Node<E>> for Renderable<E> {
    fn from(node: Node<E>) -> Self {
        Renderable::Node(node)
    }
}

impl<E: Element> From<Modifier<E>> for Renderable<E> {
    fn from(modifier: Modifier<E>) -> Self {
        Renderable::Modifier(modifier)
    }
}

impl<E: Element> From<Component<E>> for Renderable<E> {
    fn from(component: Component<E>) -> Self {
        Renderable::Component(component)
    }
}

impl<E: Element, T: Into<Renderable<E>>> From<Option<T>> for Renderable<E> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Renderable::Absent, Into::into)
    }
}

impl<E: Element> From<()> for Renderable<E> {
    fn from((): ()) -> Self {
        Renderable::Absent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Document, MemoryDocument, MemoryElement};

    type R = Renderable<MemoryElement>;

    #[test]
    fn classifies_each_kind() {
        let doc = MemoryDocument::new();
        let node = Node::new(move || doc.create_element("div"));
        let modifier = Modifier::new(|_: &MemoryElement| {});
        let component = Component::from_fn({
            let node = node.clone();
            move || node.clone()
        });

        assert_eq!(R::from_value(node).unwrap().kind(), Kind::Node);
        assert_eq!(R::from_value(modifier).unwrap().kind(), Kind::Modifier);
        assert_eq!(R::from_value(component).unwrap().kind(), Kind::Component);
        assert_eq!(R::from_value(()).unwrap().kind(), Kind::Absent);
        assert!(R::from_value(None::<R>).unwrap().is_absent());
        assert_eq!(R::from_value(R::Absent).unwrap().kind(), Kind::Absent);
    }

    #[test]
    fn classifies_optional_kinds() {
        let doc = MemoryDocument::new();
        let node = Node::new(move || doc.create_element("div"));
        let modifier = Modifier::new(|_: &MemoryElement| {});
        let component = Component::from_fn({
            let node = node.clone();
            move || node.clone()
        });

        assert_eq!(R::from_value(Some(node)).unwrap().kind(), Kind::Node);
        assert_eq!(R::from_value(Some(modifier)).unwrap().kind(), Kind::Modifier);
        assert_eq!(R::from_value(Some(component)).unwrap().kind(), Kind::Component);
        assert!(R::from_value(None::<Node<MemoryElement>>).unwrap().is_absent());
        assert!(R::from_value(None::<Modifier<MemoryElement>>).unwrap().is_absent());
        assert!(R::from_value(None::<Component<MemoryElement>>).unwrap().is_absent());

        // Only options of renderables are accepted
        assert!(R::from_value(Some(42_u32)).is_err());
    }

    #[test]
    fn rejects_unrecognized_values_by_type_name() {
        let error = R::from_value(42_u32).unwrap_err();
        assert_eq!(
            error,
            CompositionError::Unrecognized {
                type_name: "u32"
            }
        );
        assert!(error.to_string().contains("'u32'"));

        // Local types are reported with their full path
        struct Foreign;
        let error = R::from_value(Foreign).unwrap_err();
        assert!(error.to_string().contains("Foreign"));
    }

    #[test]
    fn optional_values_convert_to_absent() {
        let missing: Option<Modifier<MemoryElement>> = None;
        assert!(R::from(missing).is_absent());

        let present = Some(Modifier::new(|_: &MemoryElement| {}));
        assert_eq!(R::from(present).kind(), Kind::Modifier);
    }

    #[test]
    fn nodes_yield_independent_elements() {
        let doc = MemoryDocument::new();
        let node = Node::new(move || doc.create_element("li"));

        let first = node.element();
        let second = node.element();
        assert_ne!(first, second);
    }
}
