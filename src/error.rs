//! Errors raised while composing renderables.

/// A value handed to the engine is not one of the renderable kinds.
///
/// Composition errors are configuration mistakes: they are reported at the
/// point where the value is turned into a [`Renderable`](crate::Renderable)
/// and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompositionError {
    /// The value's type is neither a node, a modifier, a component nor absent.
    #[error(
        "the type '{type_name}' must be either a Node, a Modifier or a Component. \
         Did you forget to wrap it with Node::new, Modifier::new or Component::new?"
    )]
    Unrecognized {
        /// Fully qualified name of the rejected type.
        type_name: &'static str,
    },
}
