//! Markdown to HTML conversion for fetched fragments.
//!
//! Uses comrak with GFM extensions. Headings receive slug `id`s so injected
//! fragments can be linked to, deduplicated within one fragment.

use std::collections::HashMap;

use comrak::{
    arena_tree::NodeEdge,
    format_html,
    nodes::{AstNode, NodeValue},
    parse_document, Arena, Options,
};

/// Knobs for the converter.
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    /// Pass raw HTML in the markdown source through to the output.
    ///
    /// Fetched documents are trusted, so this defaults to `true`; when `false`
    /// raw HTML is replaced with `<!-- raw HTML omitted -->`.
    pub raw_html: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { raw_html: true }
    }
}

/// A heading found while rendering, with its assigned anchor id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingEntry {
    /// Heading level (1–6).
    pub level: u8,
    /// First occurrence of a slug is bare (`my-heading`); repeats get a
    /// numeric suffix (`my-heading-1`, `my-heading-2`).
    pub anchor_id: String,
    /// Which literal `<hN>` in the rendered output opens this heading,
    /// counting raw HTML that emits the same tag.
    pub occurrence: usize,
}

fn make_options(render: RenderOptions) -> Options<'static> {
    let mut options = Options::default();
    options.extension.strikethrough = true;
    options.extension.table = true;
    options.extension.autolink = true;
    options.extension.tasklist = true;
    options.render.unsafe_ = render.raw_html;
    options
}

/// Lowercase, map spaces/hyphens/underscores to `-`, drop other
/// non-alphanumerics, collapse and trim hyphens.
fn slugify(text: &str) -> String {
    let mut slug = String::new();
    for c in text.to_lowercase().chars() {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if (c == ' ' || c == '-' || c == '_') && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_owned()
}

fn collect_heading_text<'a>(node: &'a AstNode<'a>) -> String {
    let mut text = String::new();
    for child in node.children() {
        match &child.data.borrow().value {
            NodeValue::Text(s) => text.push_str(s),
            NodeValue::Code(c) => text.push_str(&c.literal),
            NodeValue::SoftBreak | NodeValue::LineBreak => text.push(' '),
            _ => text.push_str(&collect_heading_text(child)),
        }
    }
    text
}

fn heading_tag(level: u8) -> String {
    format!("<h{}>", level)
}

fn collect_headings<'a>(root: &'a AstNode<'a>, render: RenderOptions) -> Vec<HeadingEntry> {
    let mut entries = Vec::new();
    let mut slug_counter: HashMap<String, usize> = HashMap::new();
    // Literal `<hN>` tags emitted so far, per level.
    let mut emitted = [0usize; 7];

    for edge in root.traverse() {
        let NodeEdge::Start(node) = edge else {
            continue;
        };
        match &node.data.borrow().value {
            NodeValue::Heading(nh) => {
                let text = collect_heading_text(node);
                let base_slug = slugify(&text);

                let count = slug_counter.entry(base_slug.clone()).or_insert(0);
                let anchor_id = if *count == 0 {
                    base_slug
                } else {
                    format!("{}-{}", base_slug, count)
                };
                *count += 1;

                let level = usize::from(nh.level).min(6);
                entries.push(HeadingEntry {
                    level: nh.level,
                    anchor_id,
                    occurrence: emitted[level],
                });
                emitted[level] += 1;
            }
            // Raw HTML is only emitted verbatim when it is allowed through.
            NodeValue::HtmlBlock(block) if render.raw_html => {
                count_raw_headings(&block.literal, &mut emitted);
            }
            NodeValue::HtmlInline(literal) if render.raw_html => {
                count_raw_headings(literal, &mut emitted);
            }
            _ => {}
        }
    }
    entries
}

fn count_raw_headings(literal: &str, emitted: &mut [usize; 7]) {
    for level in 1..=6u8 {
        emitted[usize::from(level)] += literal.matches(&heading_tag(level)).count();
    }
}

/// Rewrite the opening tag of each markdown heading to `<hN id="...">`.
///
/// Headings are located by occurrence index, so raw HTML headings keep
/// their markup untouched. Headings with an empty slug are left without an
/// id.
fn inject_heading_ids(html: &str, headings: &[HeadingEntry]) -> String {
    let mut positions: Vec<Vec<usize>> = vec![Vec::new(); 7];
    for level in 1..=6u8 {
        positions[usize::from(level)] = html
            .match_indices(&heading_tag(level))
            .map(|(pos, _)| pos)
            .collect();
    }

    let mut edits: Vec<(usize, &HeadingEntry)> = headings
        .iter()
        .filter(|h| !h.anchor_id.is_empty())
        .filter_map(|h| {
            let pos = *positions.get(usize::from(h.level))?.get(h.occurrence)?;
            Some((pos, h))
        })
        .collect();
    edits.sort_by_key(|(pos, _)| *pos);

    let mut result = String::with_capacity(html.len());
    let mut copied = 0;
    for (pos, heading) in edits {
        result.push_str(&html[copied..pos]);
        result.push_str(&format!("<h{} id=\"{}\">", heading.level, heading.anchor_id));
        copied = pos + heading_tag(heading.level).len();
    }
    result.push_str(&html[copied..]);
    result
}

/// Convert markdown source to an HTML fragment.
pub fn render_markdown(input: &str, render: RenderOptions) -> String {
    let arena = Arena::new();
    let options = make_options(render);
    let root = parse_document(&arena, input, &options);

    let headings = collect_headings(root, render);

    let mut html_bytes = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = format_html(root, &options, &mut html_bytes);
    let html = String::from_utf8_lossy(&html_bytes);

    inject_heading_ids(&html, &headings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(input: &str) -> String {
        render_markdown(input, RenderOptions::default())
    }

    #[test]
    fn paragraph_renders() {
        assert!(render("hello world\n").contains("<p>hello world</p>"));
    }

    #[test]
    fn emphasis_and_strong_render() {
        let html = render("*a* **b**\n");
        assert!(html.contains("<em>a</em>"), "got: {html}");
        assert!(html.contains("<strong>b</strong>"), "got: {html}");
    }

    #[test]
    fn link_renders() {
        let html = render("[text](https://example.com)\n");
        assert!(html.contains("href=\"https://example.com\""), "got: {html}");
    }

    #[test]
    fn gfm_table_renders() {
        let html = render("| A | B |\n|---|---|\n| 1 | 2 |\n");
        assert!(html.contains("<table>"), "got: {html}");
        assert!(html.contains("<td>"), "got: {html}");
    }

    #[test]
    fn strikethrough_and_tasklist_render() {
        let html = render("~~gone~~\n\n- [x] done\n");
        assert!(html.contains("<del>"), "got: {html}");
        assert!(html.contains("checkbox"), "got: {html}");
    }

    #[test]
    fn fenced_code_keeps_language_hint() {
        let html = render("```rust\nfn main() {}\n```\n");
        assert!(html.contains("language-rust"), "got: {html}");
    }

    #[test]
    fn headings_get_ids() {
        let html = render("# Getting Started\n\n## Install_Steps\n");
        assert!(html.contains("<h1 id=\"getting-started\">"), "got: {html}");
        assert!(html.contains("<h2 id=\"install-steps\">"), "got: {html}");
    }

    #[test]
    fn duplicate_headings_get_suffixes() {
        let html = render("## Usage\n\n## Usage\n\n## Usage\n");
        assert!(html.contains("id=\"usage\""), "got: {html}");
        assert!(html.contains("id=\"usage-1\""), "got: {html}");
        assert!(html.contains("id=\"usage-2\""), "got: {html}");
    }

    #[test]
    fn punctuation_only_heading_has_no_id() {
        let html = render("# ???\n");
        assert!(html.contains("<h1>???</h1>"), "got: {html}");
    }

    #[test]
    fn raw_html_passes_through_by_default() {
        let html = render("<div class=\"note\">hi</div>\n");
        assert!(html.contains("<div class=\"note\">hi</div>"), "got: {html}");
    }

    #[test]
    fn raw_html_heading_does_not_take_markdown_id() {
        let html = render("<h2>Raw</h2>\n\n## Real\n");
        assert!(html.contains("<h2>Raw</h2>"), "got: {html}");
        assert!(html.contains("<h2 id=\"real\">Real</h2>"), "got: {html}");
    }

    #[test]
    fn inline_raw_heading_before_markdown_heading() {
        let html = render("text <h3>x</h3>\n\n### Next\n");
        assert!(html.contains("<h3>x</h3>"), "got: {html}");
        assert!(html.contains("<h3 id=\"next\">Next</h3>"), "got: {html}");
    }

    #[test]
    fn stripped_raw_heading_does_not_shift_ids() {
        let html = render_markdown("<h2>Raw</h2>\n\n## Real\n", RenderOptions { raw_html: false });
        assert!(html.contains("<h2 id=\"real\">Real</h2>"), "got: {html}");
    }

    #[test]
    fn raw_html_stripped_when_disabled() {
        let html = render_markdown(
            "<script>alert(1)</script>\n",
            RenderOptions { raw_html: false },
        );
        assert!(!html.contains("<script>"), "got: {html}");
        assert!(html.contains("raw HTML omitted"), "got: {html}");
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Hello -- World"), "hello-world");
        assert_eq!(slugify("  trim  "), "trim");
        assert_eq!(slugify("a_b c"), "a-b-c");
    }
}
