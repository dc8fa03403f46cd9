// Attachment engine - applies renderables to an element and keeps every
// attached component in sync with its latest render
//
// For each component attached to a target, one MountSite is created. It owns
// the live attachment record (current element + subscription handle) and is
// reachable only from the observer registered on the component:
//
//   Component ──registry──> observer closure ──Arc──> MountSite
//   MountSite ──Arc──> Component
//   element ──release listener──> Handle ──Weak──> registry
//
// A live mount keeps its component alive through this cycle. Releasing the
// element releases the handle, which empties the registry slot and drops the
// closure, so the cycle ends together with the attachment.
//
// MOUNT:
// 1. render + post-modifiers -> x
// 2. observe the component -> h
// 3. append x to the target
// 4. release listener on x releases h
//
// RE-RENDER (observer fired):
// 1. release x (its listener releases h, the observer being run right now)
// 2. release h again (idempotent)
// 3. render + post-modifiers -> x2
// 4. x.replace_with(x2), same slot in the parent
// 5. observe again, release listener on x2
//
// Re-renders of one site never overlap. An invalidation arriving while the
// site is rendering on another thread marks it pending, and the rendering
// thread runs one more pass once it is done.
//
// Nothing is caught: a panicking render aborts the attach or re-render and
// leaves the torn-down state as is.

use crate::component::Component;
use crate::dom::Element;
use crate::observer::Handle;
use crate::renderable::{Node, Renderable};
use parking_lot::Mutex;
use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Default limit of nested invalidation-driven re-renders on one thread.
pub const DEFAULT_MAX_RENDER_DEPTH: usize = 64;

// Thread-local re-render nesting, and the limit in effect on this thread.
// A re-render that would go past the limit is skipped; see MountSite::rerender.
thread_local! {
    static RENDER_DEPTH: Cell<usize> = const { Cell::new(0) };
    static MAX_RENDER_DEPTH: Cell<usize> = const { Cell::new(DEFAULT_MAX_RENDER_DEPTH) };
}

/// Limit of nested re-renders in effect on the current thread
pub fn max_render_depth() -> usize {
    MAX_RENDER_DEPTH.with(Cell::get)
}

/// Run `f` with a different re-render nesting limit on the current thread.
///
/// The previous limit is restored afterwards, also when `f` panics.
///
/// # Example
/// ```ignore
/// // Components invalidating each other from their render functions
/// // may chain at most 8 re-renders deep while handling this event.
/// with_max_render_depth(8, || button_clicked());
/// ```
pub fn with_max_render_depth<R>(limit: usize, f: impl FnOnce() -> R) -> R {
    struct Restore(usize);

    impl Drop for Restore {
        fn drop(&mut self) {
            MAX_RENDER_DEPTH.with(|max| max.set(self.0));
        }
    }

    let _restore = Restore(MAX_RENDER_DEPTH.with(|max| max.replace(limit)));
    f()
}

/// RAII token for one nesting level of re-rendering.
struct RenderDepthGuard;

impl RenderDepthGuard {
    /// Enter one level, or `None` if the limit is reached.
    fn enter() -> Option<Self> {
        let limit = max_render_depth();
        RENDER_DEPTH.with(|depth| {
            let current = depth.get();
            if current >= limit {
                return None;
            }
            depth.set(current + 1);
            Some(RenderDepthGuard)
        })
    }
}

impl Drop for RenderDepthGuard {
    fn drop(&mut self) {
        RENDER_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Apply `renderables` to `target`, lazily.
///
/// Nothing happens until the returned node is invoked. Each invocation then
/// applies the renderables in order and yields `target`:
/// - a node is invoked and its element appended to `target`
/// - a modifier modifies `target`
/// - a component is mounted: rendered, appended, and kept up to date until
///   its element is released
/// - absent is skipped
pub fn attach<E: Element>(
    target: E,
    renderables: impl IntoIterator<Item = Renderable<E>>,
) -> Node<E> {
    let renderables: Arc<[Renderable<E>]> = renderables.into_iter().collect();
    Node::new(move || {
        apply_all(&target, &renderables);
        target.clone()
    })
}

/// Apply one renderable to `target` right away.
pub(crate) fn apply<E: Element>(target: &E, renderable: &Renderable<E>) {
    match renderable {
        Renderable::Node(node) => target.append_child(&node.element()),
        Renderable::Modifier(modifier) => modifier.modify(target),
        Renderable::Component(component) => {
            mount(target, component);
        }
        Renderable::Absent => {}
    }
}

/// Apply `renderables` to `target` right away, in order.
pub(crate) fn apply_all<E: Element>(target: &E, renderables: &[Renderable<E>]) {
    for renderable in renderables {
        apply(target, renderable);
    }
}

/// Attach `component` to `target` and keep it re-rendering in place.
fn mount<E: Element>(target: &E, component: &Component<E>) -> Arc<MountSite<E>> {
    let element = component.render_element();

    let site = Arc::new(MountSite {
        component: component.clone(),
        record: Mutex::new(MountRecord {
            element: element.clone(),
            handle: Handle::detached(),
        }),
        rendering: Mutex::new(()),
        pending: AtomicBool::new(false),
    });
    let handle = site.subscribe(component);

    target.append_child(&element);
    tracing::trace!(handle = handle.index(), "component mounted");
    site.install(element, handle);
    site
}

/// Live attachment record of one mount site.
struct MountRecord<E> {
    /// Element currently attached for the component
    element: E,
    /// Subscription that re-renders `element`
    handle: Handle,
}

/// One component attached at one place in the tree.
struct MountSite<E: Element> {
    component: Component<E>,
    record: Mutex<MountRecord<E>>,
    /// Held for the duration of one re-render
    rendering: Mutex<()>,
    /// Set by every invalidation, consumed by the thread that renders
    pending: AtomicBool,
}

impl<E: Element> MountSite<E> {
    fn subscribe(self: &Arc<Self>, component: &Component<E>) -> Handle {
        let site = self.clone();
        component.observe(move || site.rerender())
    }

    /// Make `element` and `handle` the live record. Releasing the element
    /// from now on ends the subscription.
    fn install(&self, element: E, handle: Handle) {
        let subscription = handle.clone();
        element.add_release_listener(Box::new(move || subscription.release()));
        *self.record.lock() = MountRecord { element, handle };
    }

    /// Release the current element and its subscription, returning the
    /// element so it can be replaced.
    fn teardown(&self) -> E {
        let (element, handle) = {
            let record = self.record.lock();
            (record.element.clone(), record.handle.clone())
        };

        // The element's release listener already releases the handle
        element.release();
        handle.release();
        element
    }

    fn rerender(self: &Arc<Self>) {
        self.pending.store(true, Ordering::SeqCst);
        loop {
            let Some(_rendering) = self.rendering.try_lock() else {
                // The thread holding the lock picks the pending flag up
                cov_mark::hit!(rerender_coalesced);
                return;
            };
            if !self.pending.swap(false, Ordering::SeqCst) {
                return;
            }
            if !self.render_again() {
                return;
            }
        }
    }

    /// One re-render pass. Returns whether the site is still mounted.
    fn render_again(self: &Arc<Self>) -> bool {
        // Released elsewhere, e.g. by an observer called from a stale snapshot
        if self.record.lock().handle.is_released() {
            return false;
        }

        // Checked before any teardown, a skipped site stays fully intact
        let Some(_depth) = RenderDepthGuard::enter() else {
            cov_mark::hit!(render_depth_exceeded);
            tracing::error!(
                limit = max_render_depth(),
                "re-render skipped: components keep invalidating each other while rendering"
            );
            return true;
        };

        let stale = self.teardown();
        let fresh = stale.replace_with(self.component.render_element());
        let handle = self.subscribe(&self.component);

        tracing::trace!(handle = handle.index(), "component re-rendered");
        self.install(fresh, handle);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Document, MemoryDocument, MemoryElement};
    use crate::renderable::Modifier;
    use std::sync::atomic::AtomicUsize;

    fn tag_component(doc: &MemoryDocument, tag: &'static str) -> Component<MemoryElement> {
        let doc = doc.clone();
        Component::from_fn(move || {
            let doc = doc.clone();
            Node::new(move || doc.create_element(tag))
        })
    }

    #[test]
    fn attach_is_lazy() {
        let doc = MemoryDocument::new();
        let target = doc.create_element("div");
        let child = doc.clone();

        let node = attach(
            target.clone(),
            [Node::new(move || child.create_element("span")).into()],
        );
        assert_eq!(target.child_count(), 0);

        assert_eq!(node.element(), target);
        assert_eq!(target.child_count(), 1);
    }

    #[test]
    fn applies_each_kind_in_order() {
        let doc = MemoryDocument::new();
        let target = doc.create_element("div");
        let child = doc.clone();

        attach(
            target.clone(),
            [
                Node::new(move || child.create_element("span")).into(),
                Modifier::new(|e: &MemoryElement| e.set_attribute("id", "root")).into(),
                Renderable::Absent,
                tag_component(&doc, "p").into(),
            ],
        )
        .element();

        let tags: Vec<_> = target.children().iter().filter_map(MemoryElement::tag).collect();
        assert_eq!(tags, vec!["span", "p"]);
        assert_eq!(target.attribute("id").as_deref(), Some("root"));
    }

    #[test]
    fn mount_subscribes_once_per_site() {
        let doc = MemoryDocument::new();
        let component = tag_component(&doc, "p");
        let target = doc.create_element("div");

        attach(target.clone(), [component.clone().into()]).element();
        assert_eq!(component.observers().live_count(), 1);

        component.invalidate();
        component.invalidate();
        assert_eq!(component.observers().live_count(), 1);
        assert_eq!(target.child_count(), 1);
    }

    #[test]
    fn rerender_releases_the_old_element() {
        let doc = MemoryDocument::new();
        let component = tag_component(&doc, "p");
        let target = doc.create_element("div");
        attach(target.clone(), [component.clone().into()]).element();
        let before = doc.element_count();

        let old = target.children()[0].clone();
        component.invalidate();

        let new = target.children()[0].clone();
        assert_ne!(old, new);
        assert!(!old.is_alive());
        assert!(!new.is_released());
        assert_eq!(doc.element_count(), before);
    }

    #[test]
    fn post_modifiers_are_reapplied_on_rerender() {
        let doc = MemoryDocument::new();
        let component = tag_component(&doc, "p");
        component.set_post_modifiers(vec![Modifier::new(|e: &MemoryElement| {
            e.set_attribute("class", "styled")
        })]);
        let target = doc.create_element("div");
        attach(target.clone(), [component.clone().into()]).element();

        component.invalidate();

        let element = target.children()[0].clone();
        assert_eq!(element.attribute("class").as_deref(), Some("styled"));
    }

    #[test]
    fn depth_limit_is_scoped() {
        assert_eq!(max_render_depth(), DEFAULT_MAX_RENDER_DEPTH);
        let inner = with_max_render_depth(3, max_render_depth);
        assert_eq!(inner, 3);
        assert_eq!(max_render_depth(), DEFAULT_MAX_RENDER_DEPTH);

        let result = std::panic::catch_unwind(|| {
            with_max_render_depth(1, || panic!("render failed"));
        });
        assert!(result.is_err());
        assert_eq!(max_render_depth(), DEFAULT_MAX_RENDER_DEPTH);
    }

    #[test]
    fn skipped_rerender_keeps_the_mount_intact() {
        cov_mark::check!(render_depth_exceeded);

        let doc = MemoryDocument::new();
        let renders = Arc::new(AtomicUsize::new(0));
        let counter = renders.clone();
        let factory = doc.clone();
        let component = Component::from_fn(move || {
            counter.fetch_add(1, Ordering::Relaxed);
            let doc = factory.clone();
            Node::new(move || doc.create_element("p"))
        });
        let target = doc.create_element("div");
        attach(target.clone(), [component.clone().into()]).element();
        let element = target.children()[0].clone();

        with_max_render_depth(0, || component.invalidate());

        assert_eq!(renders.load(Ordering::Relaxed), 1);
        assert_eq!(target.children()[0], element);
        assert!(!element.is_released());
        assert_eq!(component.observers().live_count(), 1);

        // The next invalidation outside the limit renders normally
        component.invalidate();
        assert_eq!(renders.load(Ordering::Relaxed), 2);
        assert_ne!(target.children()[0], element);
    }

    #[test]
    fn overlapping_rerender_runs_once_more_afterwards() {
        cov_mark::check!(rerender_coalesced);

        let doc = MemoryDocument::new();
        let renders = Arc::new(AtomicUsize::new(0));
        let site_slot: Arc<Mutex<Option<Arc<MountSite<MemoryElement>>>>> =
            Arc::new(Mutex::new(None));
        let armed = Arc::new(AtomicBool::new(false));

        let component = Component::from_fn({
            let (doc, renders, site_slot, armed) =
                (doc.clone(), renders.clone(), site_slot.clone(), armed.clone());
            move || {
                renders.fetch_add(1, Ordering::Relaxed);
                if armed.swap(false, Ordering::Relaxed) {
                    // Same site asked to render again while it is rendering
                    let site = site_slot.lock().clone();
                    if let Some(site) = site {
                        site.rerender();
                    }
                }
                let doc = doc.clone();
                Node::new(move || doc.create_element("p"))
            }
        });
        let target = doc.create_element("div");
        *site_slot.lock() = Some(mount(&target, &component));
        let elements = doc.element_count();

        armed.store(true, Ordering::Relaxed);
        component.invalidate();

        assert_eq!(renders.load(Ordering::Relaxed), 3);
        assert_eq!(target.child_count(), 1);
        assert_eq!(component.observers().live_count(), 1);
        assert_eq!(doc.element_count(), elements);
        site_slot.lock().take();
    }

    #[test]
    fn released_site_ignores_late_rerender() {
        let doc = MemoryDocument::new();
        let renders = Arc::new(AtomicUsize::new(0));
        let counter = renders.clone();
        let factory = doc.clone();
        let component = Component::from_fn(move || {
            counter.fetch_add(1, Ordering::Relaxed);
            let doc = factory.clone();
            Node::new(move || doc.create_element("p"))
        });
        let target = doc.create_element("div");
        let site = mount(&target, &component);

        target.clear();
        // An observer snapshot taken before the release still reaches the site
        site.rerender();

        assert_eq!(renders.load(Ordering::Relaxed), 1);
        assert_eq!(target.child_count(), 0);
        assert_eq!(component.observers().live_count(), 0);
        assert_eq!(doc.element_count(), 2);
    }
}
