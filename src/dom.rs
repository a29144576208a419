//! html5ever-backed document: parsing, the [`Element`] view used by
//! `tree.rs`, fragment injection and serialization.

use kuchikiki::traits::TendrilSink;
use kuchikiki::NodeRef;

use crate::error::ReadoutError;
use crate::tree::Element;

/// Parse a full HTML document.
pub fn parse_document(html: &str) -> NodeRef {
    kuchikiki::parse_html().one(html)
}

impl Element for NodeRef {
    fn attribute(&self, name: &str) -> Option<String> {
        let element = self.as_element()?;
        let attrs = element.attributes.borrow();
        attrs.get(name).map(str::to_owned)
    }

    fn parent_element(&self) -> Option<Self> {
        self.parent().filter(|p| p.as_element().is_some())
    }

    fn child_elements(&self) -> Vec<Self> {
        self.children()
            .filter(|c| c.as_element().is_some())
            .collect()
    }
}

/// Replace every child of `element` with the nodes parsed from `html`.
///
/// `html` is parsed as a fragment in the context of `element` itself, the way
/// assigning `innerHTML` does: leading `<style>`, `<link>` or comments stay in
/// place instead of being hoisted into a `<head>`.
pub fn replace_children_with_html(element: &NodeRef, html: &str) {
    let Some(data) = element.as_element() else {
        return;
    };
    let context = data.name.clone();

    for child in element.children().collect::<Vec<_>>() {
        child.detach();
    }

    let fragment = kuchikiki::parse_fragment(context, Vec::new()).one(html);
    // The fragment parser wraps the result in a single <html> element.
    let Some(wrapper) = fragment.first_child() else {
        return;
    };
    // Collect first: append() detaches from the fragment and breaks sibling links.
    let nodes: Vec<NodeRef> = wrapper.children().collect();
    for node in nodes {
        element.append(node);
    }
}

/// Serialize a document (or any subtree) back to HTML.
pub fn serialize(node: &NodeRef) -> Result<String, ReadoutError> {
    let mut bytes = Vec::new();
    node.serialize(&mut bytes).map_err(ReadoutError::Serialize)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Inner HTML of `element`.
#[cfg(test)]
pub fn inner_html(element: &NodeRef) -> Result<String, ReadoutError> {
    let mut out = String::new();
    for child in element.children() {
        out.push_str(&serialize(&child)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::Namespace;
    use crate::tree;

    fn ids(nodes: &[NodeRef]) -> Vec<String> {
        nodes
            .iter()
            .map(|n| n.attribute("id").unwrap_or_default())
            .collect()
    }

    #[test]
    fn leaves_found_in_parsed_markup() {
        let doc = parse_document(
            r#"<div id="a" data-readout-src="docs">
                 <section id="b">
                   <p id="c" data-readout-src="intro.md"></p>
                 </section>
                 <p id="d" data-readout-src="usage.md"></p>
               </div>
               <p id="e" data-readout-src="/changelog.md"></p>"#,
        );
        let ns = Namespace::default();
        let leaves = tree::leaves(&doc, &ns);
        assert_eq!(ids(&leaves), ["c", "d", "e"]);

        let paths: Vec<String> = leaves.iter().map(|l| tree::fetch_path(l, &ns)).collect();
        assert_eq!(paths, ["docs/intro.md", "docs/usage.md", "/changelog.md"]);
    }

    #[test]
    fn custom_namespace_matches_lowercased_markup() {
        let doc = parse_document(r#"<p id="x" DATA-DOC="a.md"></p>"#);
        let ns = Namespace::new("data-doc").unwrap();
        assert_eq!(ids(&tree::leaves(&doc, &ns)), ["x"]);
    }

    #[test]
    fn parent_element_stops_at_document() {
        let doc = parse_document("<p>x</p>");
        let html = doc.child_elements().into_iter().next().unwrap();
        assert!(html.parent_element().is_none());
    }

    #[test]
    fn replace_children_swaps_content() {
        let doc = parse_document(r#"<div id="t"><span>old</span>text</div>"#);
        let target = doc.select_first("#t").unwrap().as_node().clone();

        replace_children_with_html(&target, "<h1>New</h1>\n<p>body</p>\n");

        let inner = inner_html(&target).unwrap();
        assert!(!inner.contains("old"), "old content must be gone: {inner}");
        assert!(inner.contains("<h1>New</h1>"), "got: {inner}");
        assert!(inner.contains("<p>body</p>"), "got: {inner}");
    }

    #[test]
    fn replace_keeps_leading_style_and_comments() {
        let doc = parse_document(r#"<html><head></head><body><div id="t">old</div></body></html>"#);
        let target = doc.select_first("#t").unwrap().as_node().clone();

        replace_children_with_html(
            &target,
            "<style>.note { color: red }</style>\n<!-- raw HTML omitted -->\n<p>Some text</p>\n",
        );

        let inner = inner_html(&target).unwrap();
        assert!(inner.starts_with("<style>.note { color: red }</style>"), "got: {inner}");
        assert!(inner.contains("<!-- raw HTML omitted -->"), "got: {inner}");
        assert!(inner.contains("<p>Some text</p>"), "got: {inner}");
        let head = doc.select_first("head").unwrap();
        assert_eq!(inner_html(head.as_node()).unwrap(), "");
    }

    #[test]
    fn replace_parses_in_context_of_target() {
        let doc = parse_document(r#"<table><tbody id="t"><tr><td>old</td></tr></tbody></table>"#);
        let target = doc.select_first("#t").unwrap().as_node().clone();

        replace_children_with_html(&target, "<tr><td>new</td></tr>");

        assert_eq!(inner_html(&target).unwrap(), "<tr><td>new</td></tr>");
    }

    #[test]
    fn replace_with_empty_html_clears_element() {
        let doc = parse_document(r#"<div id="t">old</div>"#);
        let target = doc.select_first("#t").unwrap().as_node().clone();
        replace_children_with_html(&target, "");
        assert_eq!(inner_html(&target).unwrap(), "");
    }

    #[test]
    fn serialize_round_trips_attributes() {
        let doc = parse_document(r#"<p data-readout-src="a.md">x</p>"#);
        let html = serialize(&doc).unwrap();
        assert!(html.contains(r#"<p data-readout-src="a.md">x</p>"#), "got: {html}");
    }
}
