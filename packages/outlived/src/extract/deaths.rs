//! Death list extraction from calendar-day pages.
//!
//! A day page has a level-2 "Deaths" heading followed by one or more lists.
//! Each well-formed item reads `1995 – <a>Jerry Garcia</a>, American
//! musician (b. 1942)<sup>[12]</sup>`: a year, an en dash, a link to the
//! person and a short description.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};

use super::html::{collapse_whitespace, find_element, find_outermost, has_class, is_tag, plain_text};
use crate::error::{ExtractError, ExtractResult};

/// Separator between year and person. An en dash, not a hyphen.
const DASH: char = '\u{2013}';

static TRAILING_PAREN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*\S)\s*\([^()]*\)$").expect("parenthetical pattern"));

static BORN_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(b\.\s*\d+\)$").expect("birth year pattern"));

/// One person listed under "Deaths".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathEntry {
    /// Page path, e.g. `Jerry_Garcia`
    pub href: String,
    /// Display title without disambiguation, e.g. `Jerry Garcia`
    pub title: String,
    pub description: String,
}

/// Entries of one day page, in document order. Consumed once.
#[derive(Debug)]
pub struct DeathEntries {
    inner: std::vec::IntoIter<DeathEntry>,
}

impl Iterator for DeathEntries {
    type Item = DeathEntry;

    fn next(&mut self) -> Option<DeathEntry> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for DeathEntries {}

/// Extract the death list from a day page.
///
/// Items without the dash-then-link shape are skipped. Fails only when the
/// page has no "Deaths" heading.
pub fn extract_deaths(html: &str) -> ExtractResult<DeathEntries> {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let heading = find_element(root, is_deaths_heading)
        .ok_or_else(|| ExtractError::not_found("Deaths heading"))?;

    // Newer markup wraps the heading in <div class="mw-heading">
    let anchor = heading
        .parent()
        .and_then(ElementRef::wrap)
        .filter(|parent| is_tag(*parent, "div") && has_class(*parent, "mw-heading"))
        .unwrap_or(heading);

    let mut entries = Vec::new();
    for sibling in anchor.next_siblings().filter_map(ElementRef::wrap) {
        if is_section_heading(sibling) {
            break;
        }
        let lists = if is_tag(sibling, "ul") {
            vec![sibling]
        } else {
            find_outermost(sibling, |el| is_tag(el, "ul"))
        };
        for list in lists {
            entries.extend(
                list.children()
                    .filter_map(ElementRef::wrap)
                    .filter(|el| is_tag(*el, "li"))
                    .filter_map(parse_item),
            );
        }
    }

    Ok(DeathEntries {
        inner: entries.into_iter(),
    })
}

fn is_deaths_heading(el: ElementRef<'_>) -> bool {
    is_tag(el, "h2")
        && (el.value().id() == Some("Deaths")
            || find_element(el, |child| child.value().id() == Some("Deaths")).is_some())
}

/// A level-2 heading ends the Deaths section.
fn is_section_heading(el: ElementRef<'_>) -> bool {
    if is_tag(el, "h2") {
        return true;
    }
    is_tag(el, "div")
        && has_class(el, "mw-heading")
        && el
            .children()
            .filter_map(ElementRef::wrap)
            .any(|child| is_tag(child, "h2"))
}

fn parse_item(item: ElementRef<'_>) -> Option<DeathEntry> {
    let link = find_link_after_dash(item)?;
    if has_class(link, "new") {
        return None;
    }

    let href = link.value().attr("href")?;
    let href = href
        .trim_start_matches("./")
        .trim_start_matches("/wiki/")
        .to_string();
    if href.is_empty() {
        return None;
    }

    let title = link
        .value()
        .attr("title")
        .map(str::to_string)
        .unwrap_or_else(|| collapse_whitespace(&plain_text(link, &[])));
    let title = TRAILING_PAREN.replace(title.trim(), "$1").into_owned();

    Some(DeathEntry {
        href,
        title,
        description: description_after(link),
    })
}

/// The first link following the dash marker.
///
/// The marker is either a text node ending in a dash (`"1995 – "`) or an
/// element whose whole text is a dash (`<span>–</span>`).
fn find_link_after_dash(item: ElementRef<'_>) -> Option<ElementRef<'_>> {
    let mut stack: Vec<_> = item.children().rev().collect();
    while let Some(node) = stack.pop() {
        let is_marker = if let Some(text) = node.value().as_text() {
            text.trim_end().ends_with(DASH)
        } else if let Some(el) = ElementRef::wrap(node) {
            if is_tag(el, "ul") {
                continue;
            }
            let text = plain_text(el, &[]);
            if text.trim() == DASH.to_string() {
                true
            } else {
                stack.extend(node.children().rev());
                false
            }
        } else {
            false
        };

        if is_marker {
            return node
                .next_siblings()
                .filter_map(ElementRef::wrap)
                .find(|el| is_tag(*el, "a"));
        }
    }
    None
}

/// Inline text after the link, up to the first citation superscript.
fn description_after(link: ElementRef<'_>) -> String {
    let mut text = String::new();
    for node in link.next_siblings() {
        if let Some(el) = ElementRef::wrap(node) {
            if is_tag(el, "sup") {
                break;
            }
            text.push_str(&plain_text(el, &[]));
        } else if let Some(t) = node.value().as_text() {
            text.push_str(t);
        }
    }

    let text = text.trim();
    let text = text.strip_prefix(',').unwrap_or(text).trim_end();
    let text = match BORN_SUFFIX.find(text) {
        Some(m) => &text[..m.start()],
        None => text,
    };
    collapse_whitespace(text)
}
