use crate::dom::Element;
use crate::observer::{Handle, Observers};
use crate::renderable::{Modifier, Node};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};

/// Construction plan of a component: produces the root node of one render.
///
/// Any `Fn() -> Node<E>` closure is a view, so small components need no
/// dedicated type.
pub trait View<E: Element>: Send + Sync + 'static {
    /// Build the root node for the current state
    fn render(&self) -> Node<E>;
}

impl<E, F> View<E> for F
where
    E: Element,
    F: Fn() -> Node<E> + Send + Sync + 'static,
{
    fn render(&self) -> Node<E> {
        self()
    }
}

struct ComponentInner<E: Element> {
    view: Box<dyn View<E>>,
    observers: Observers,
    /// Applied to the root element after every render, in order
    post_modifiers: Mutex<Vec<Modifier<E>>>,
}

/// A view with persistent identity that re-renders when invalidated.
///
/// The component owns its view, an observer registry and a list of
/// post-modifiers. Every place the component is attached registers one
/// observer; [`invalidate`](Component::invalidate) makes each of them render
/// the view again and swap the fresh element in place of the old one.
///
/// Clones share the same component.
///
/// # Usage
/// ```ignore
/// struct Counter {
///     clicks: AtomicUsize,
/// }
///
/// impl View<MemoryElement> for Counter {
///     fn render(&self) -> Node<MemoryElement> {
///         let clicks = self.clicks.load(Ordering::Relaxed);
///         element(&doc, "span", [text(&clicks.to_string()).into()])
///     }
/// }
///
/// let counter = Component::new(Counter { clicks: AtomicUsize::new(0) });
/// attach(doc.body(), [counter.clone().into()]).element();
///
/// counter.invalidate();  // the span is rendered again and replaced
/// ```
pub struct Component<E: Element> {
    inner: Arc<ComponentInner<E>>,
}

impl<E: Element> Component<E> {
    /// Create a component rendering `view`
    pub fn new(view: impl View<E>) -> Self {
        Self {
            inner: Arc::new(ComponentInner {
                view: Box::new(view),
                observers: Observers::new(),
                post_modifiers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Create a component from a render closure
    pub fn from_fn(render: impl Fn() -> Node<E> + Send + Sync + 'static) -> Self {
        Self::new(render)
    }

    /// Create a component whose view can reach the component itself.
    ///
    /// The view receives a weak reference, typically used by event handlers
    /// to invalidate the component after changing its state.
    pub fn new_cyclic<V: View<E>>(build: impl FnOnce(WeakComponent<E>) -> V) -> Self {
        let inner = Arc::new_cyclic(|weak| {
            let view = build(WeakComponent {
                inner: weak.clone(),
            });
            ComponentInner {
                view: Box::new(view) as Box<dyn View<E>>,
                observers: Observers::new(),
                post_modifiers: Mutex::new(Vec::new()),
            }
        });
        Self { inner }
    }

    /// Root node of the current state
    pub fn render(&self) -> Node<E> {
        self.inner.view.render()
    }

    /// Render, allocate the root element and apply the post-modifiers.
    pub(crate) fn render_element(&self) -> E {
        let element = self.render().element();
        for modifier in self.post_modifiers() {
            modifier.modify(&element);
        }
        element
    }

    /// Notify every observer; each mount site re-renders.
    pub fn invalidate(&self) {
        self.inner.observers.invalidate();
    }

    /// Register `observer` to run on every following [`invalidate`](Self::invalidate).
    pub fn observe(&self, observer: impl Fn() + Send + Sync + 'static) -> Handle {
        self.inner.observers.observe(Arc::new(observer))
    }

    /// The component's observer registry
    pub fn observers(&self) -> &Observers {
        &self.inner.observers
    }

    /// Snapshot of the post-modifiers
    pub fn post_modifiers(&self) -> Vec<Modifier<E>> {
        self.inner.post_modifiers.lock().clone()
    }

    /// Replace the post-modifiers used by all future renders
    pub fn set_post_modifiers(&self, modifiers: Vec<Modifier<E>>) {
        *self.inner.post_modifiers.lock() = modifiers;
    }

    /// Non-owning reference to this component
    pub fn downgrade(&self) -> WeakComponent<E> {
        WeakComponent {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether both values are the same component
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<E: Element> Clone for Component<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E: Element> fmt::Debug for Component<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("observers", &self.inner.observers)
            .field("post_modifiers", &self.inner.post_modifiers.lock().len())
            .finish()
    }
}

/// Weak reference to a [`Component`].
pub struct WeakComponent<E: Element> {
    inner: Weak<ComponentInner<E>>,
}

impl<E: Element> WeakComponent<E> {
    /// The component, if it still exists
    pub fn upgrade(&self) -> Option<Component<E>> {
        self.inner.upgrade().map(|inner| Component { inner })
    }

    /// Invalidate the component if it still exists
    pub fn invalidate(&self) {
        if let Some(component) = self.upgrade() {
            component.invalidate();
        }
    }
}

impl<E: Element> Clone for WeakComponent<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}
