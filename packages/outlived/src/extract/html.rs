//! DOM helpers over `scraper`.
//!
//! Searches are iterative depth-first walks with an explicit stack, in
//! document order. `scraper::Html` is not `Send`, so callers parse and
//! extract inside synchronous functions and hand back owned values.

use scraper::{ElementRef, Node};

/// First element under `root` (excluding `root`) matching `pred`, in
/// document order.
pub fn find_element<'a>(
    root: ElementRef<'a>,
    mut pred: impl FnMut(ElementRef<'a>) -> bool,
) -> Option<ElementRef<'a>> {
    let mut stack: Vec<_> = root.children().rev().collect();
    while let Some(node) = stack.pop() {
        if let Some(el) = ElementRef::wrap(node) {
            if pred(el) {
                return Some(el);
            }
            stack.extend(node.children().rev());
        }
    }
    None
}

/// All elements under `root` matching `pred`, in document order. Matched
/// elements are not searched further, so nested matches are skipped.
pub fn find_outermost<'a>(
    root: ElementRef<'a>,
    mut pred: impl FnMut(ElementRef<'a>) -> bool,
) -> Vec<ElementRef<'a>> {
    let mut found = Vec::new();
    let mut stack: Vec<_> = root.children().rev().collect();
    while let Some(node) = stack.pop() {
        if let Some(el) = ElementRef::wrap(node) {
            if pred(el) {
                found.push(el);
            } else {
                stack.extend(node.children().rev());
            }
        }
    }
    found
}

/// Plain text of an element and its descendants.
///
/// `<br>` becomes a newline. Elements named in `prune` are skipped along
/// with everything inside them.
pub fn plain_text(el: ElementRef<'_>, prune: &[&str]) -> String {
    let mut out = String::new();
    let mut stack = vec![*el];
    while let Some(node) = stack.pop() {
        match node.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) => {
                let name = element.name();
                if name == "br" {
                    out.push('\n');
                } else if !prune.contains(&name) {
                    stack.extend(node.children().rev());
                }
            }
            _ => {}
        }
    }
    out
}

/// Collapse runs of whitespace (including newlines and non-breaking
/// spaces) to single spaces and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn is_tag(el: ElementRef<'_>, name: &str) -> bool {
    el.value().name() == name
}

pub fn has_class(el: ElementRef<'_>, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}

/// Whether `el` sits inside a `tag` element, stopping at `boundary`.
pub fn inside<'a>(el: ElementRef<'a>, tag: &str, boundary: ElementRef<'a>) -> bool {
    el.ancestors()
        .take_while(|node| node.id() != boundary.id())
        .filter_map(ElementRef::wrap)
        .any(|ancestor| is_tag(ancestor, tag))
}
