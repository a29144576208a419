//! Leaf detection and fragment collection over an abstract element tree.
//!
//! Nothing here knows about HTML parsing: [`Element`] is implemented for the
//! parsed DOM in `dom.rs` and for synthetic trees in the tests below.

use crate::namespace::Namespace;

/// The minimal view of a DOM element needed to resolve includes.
pub trait Element: Sized + Clone {
    /// Value of attribute `name`, if present.
    fn attribute(&self, name: &str) -> Option<String>;
    /// Enclosing element, `None` at the top of the tree.
    fn parent_element(&self) -> Option<Self>;
    /// Direct element children, in document order.
    fn child_elements(&self) -> Vec<Self>;
}

fn is_annotated<E: Element>(el: &E, ns: &Namespace) -> bool {
    el.attribute(ns.as_str()).is_some()
}

/// All annotated elements under (and including) `root`, in document order.
pub fn annotated<E: Element>(root: &E, ns: &Namespace) -> Vec<E> {
    let mut found = Vec::new();
    let mut stack = vec![root.clone()];
    while let Some(el) = stack.pop() {
        if is_annotated(&el, ns) {
            found.push(el.clone());
        }
        // Reverse so the first child is visited first.
        stack.extend(el.child_elements().into_iter().rev());
    }
    found
}

/// True when any element strictly below `el` carries the attribute.
pub fn has_annotated_descendant<E: Element>(el: &E, ns: &Namespace) -> bool {
    let mut stack = el.child_elements();
    while let Some(child) = stack.pop() {
        if is_annotated(&child, ns) {
            return true;
        }
        stack.extend(child.child_elements());
    }
    false
}

/// Annotated elements with no annotated descendant: the units that fetch.
pub fn leaves<E: Element>(root: &E, ns: &Namespace) -> Vec<E> {
    annotated(root, ns)
        .into_iter()
        .filter(|el| !has_annotated_descendant(el, ns))
        .collect()
}

/// Attribute values of `leaf` and each annotated ancestor, outermost first.
///
/// Ancestors without the attribute contribute nothing.
pub fn fragments<E: Element>(leaf: &E, ns: &Namespace) -> Vec<String> {
    let mut out = Vec::new();
    let mut cursor = Some(leaf.clone());
    while let Some(el) = cursor {
        if let Some(value) = el.attribute(ns.as_str()) {
            out.push(value);
        }
        cursor = el.parent_element();
    }
    out.reverse();
    out
}

/// Join fragments with `/`. No normalisation: empty fragments stay empty segments.
pub fn join_fragments(fragments: &[String]) -> String {
    fragments.join("/")
}

/// The path a leaf fetches.
pub fn fetch_path<E: Element>(leaf: &E, ns: &Namespace) -> String {
    join_fragments(&fragments(leaf, ns))
}
