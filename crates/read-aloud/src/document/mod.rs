//! Host document surface.
//!
//! The core never touches a concrete DOM. It selects elements, reads and writes attributes,
//! toggles classes and prepends icon markup through [`Document`]. [`MemoryDocument`] is the
//! in-process implementation used by the CLI and the tests.

mod memory;
mod selector;

use std::fmt;

pub use memory::{FixtureElement, MemoryDocument, PageFixture};
pub use selector::{Selector, SelectorError, SelectorTarget};

/// Opaque, stable identity of an element in the host document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    #[error("unknown element {0}")]
    UnknownElement(ElementId),
    #[error("invalid markup {markup:?}: {reason}")]
    InvalidMarkup { markup: String, reason: &'static str },
}

/// Selection, attribute and class operations the core needs from the host.
///
/// Methods take `&self`; implementations provide their own interior mutability, the way a
/// DOM handle does.
pub trait Document: Send + Sync {
    /// All elements matching `selector`, in document order.
    fn select(&self, selector: &Selector) -> Vec<ElementId>;

    /// Descendants of `scope` matching `selector`, in document order.
    fn find(&self, scope: ElementId, selector: &Selector) -> Vec<ElementId>;

    /// `el` itself or its nearest ancestor matching `selector`.
    fn closest(&self, el: ElementId, selector: &Selector) -> Option<ElementId>;

    fn attr(&self, el: ElementId, name: &str) -> Option<String>;

    fn set_attr(&self, el: ElementId, name: &str, value: &str) -> Result<(), DocumentError>;

    fn has_class(&self, el: ElementId, class: &str) -> bool;

    fn add_class(&self, el: ElementId, class: &str) -> Result<(), DocumentError>;

    fn remove_class(&self, el: ElementId, class: &str) -> Result<(), DocumentError>;

    /// Check that `markup` is something [`Document::prepend`] accepts, without inserting it.
    fn check_markup(&self, markup: &str) -> Result<(), DocumentError>;

    /// Parse `markup` into an element, add `class` to it and insert it as the first child
    /// of `parent`.
    fn prepend(
        &self,
        parent: ElementId,
        markup: &str,
        class: &str,
    ) -> Result<ElementId, DocumentError>;
}
